// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/coopcam

//! CallMeBot WhatsApp gateway client

use async_trait::async_trait;
use reqwest::{header, StatusCode, Url};
use tracing::{debug, info, warn};

use super::Notifier;
use crate::config::NotifyConfig;
use crate::error::NotifyError;

const USER_AGENT: &str = concat!("coopcam/", env!("CARGO_PKG_VERSION"));

pub struct CallMeBotNotifier {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl CallMeBotNotifier {
    pub fn new(config: &NotifyConfig) -> Result<Self, NotifyError> {
        if !config.has_credentials() {
            return Err(NotifyError::MissingCredentials);
        }
        let api_key = config.api_key.clone().ok_or(NotifyError::MissingCredentials)?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(USER_AGENT)
            .build()?;

        // Reject a bad endpoint at start-up rather than on first detection
        Url::parse(&config.api_url).map_err(|e| NotifyError::Url(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
        })
    }

    /// Full GET URL; every parameter is form-encoded
    pub fn request_url(&self, recipient: &str, message: &str) -> Result<Url, NotifyError> {
        Url::parse_with_params(
            &self.api_url,
            &[
                ("phone", recipient),
                ("text", message),
                ("apikey", self.api_key.as_str()),
            ],
        )
        .map_err(|e| NotifyError::Url(e.to_string()))
    }
}

#[async_trait]
impl Notifier for CallMeBotNotifier {
    fn name(&self) -> &str {
        "callmebot"
    }

    async fn send(&self, recipient: &str, message: &str) -> Result<(), NotifyError> {
        let url = self.request_url(recipient, message)?;
        debug!("CallMeBot request to {}", self.api_url);

        let response = self
            .client
            .get(url)
            .header(header::CONNECTION, "close")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK {
            info!("WhatsApp message sent");
            Ok(())
        } else {
            warn!("CallMeBot returned status {}", status);
            Err(NotifyError::Status(status.as_u16()))
        }
    }
}
