// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/coopcam

//! Status web server
//!
//! Three read-only routes over the state cache and capture store:
//! `/` (auto-refreshing HTML page), `/status` (JSON snapshot) and
//! `/photo` (current JPEG, 404 before the first capture).

use std::sync::Arc;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::camera::{CameraInfo, CaptureStore};
use crate::clock::{format_timestamp, WallClock};
use crate::config::WebConfig;
use crate::core::{ServerStateSnapshot, StateCache};
use crate::error::CaptureError;

const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

#[derive(Clone)]
pub struct WebState {
    pub cache: Arc<StateCache>,
    pub store: Arc<CaptureStore>,
    pub clock: WallClock,
    pub refresh_secs: u32,
}

/// `/status` body
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub state: ServerStateSnapshot,
    pub camera: CameraInfo,
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/status", get(status))
        .route("/photo", get(photo))
        .with_state(state)
}

/// Serve until the shutdown channel fires
pub async fn serve(config: &WebConfig, state: WebState, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind web server to {}", addr))?;

    info!("Web server listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
        .context("Web server error")?;

    info!("Web server stopped");
    Ok(())
}

async fn status(State(state): State<WebState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        state: state.cache.read(),
        camera: state.store.info(),
    })
}

async fn photo(State(state): State<WebState>) -> Response {
    match state.store.read().await {
        Ok(Some(photo)) => (
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                (header::CACHE_CONTROL, NO_CACHE),
            ],
            photo.data().clone(),
        )
            .into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "No photo available").into_response(),
        Err(CaptureError::LockTimeout) => {
            warn!("Photo request timed out waiting for the camera");
            (StatusCode::SERVICE_UNAVAILABLE, "Camera busy").into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn index(State(state): State<WebState>) -> Html<String> {
    Html(render_page(&state.cache.read(), &state.clock, state.refresh_secs))
}

fn render_page(snap: &ServerStateSnapshot, clock: &WallClock, refresh_secs: u32) -> String {
    let presence = if snap.currently_detected {
        "<span class=\"on\">Object present</span>"
    } else {
        "<span class=\"off\">Clear</span>"
    };
    let updated = match snap.last_update_time {
        Some(at) => format_timestamp(&at.with_timezone(&clock.offset())),
        None => "never".to_string(),
    };
    let picture = if snap.has_photo {
        // Query keeps the browser from reusing a cached frame
        let tag = snap.last_update_time.map_or(0, |t| t.timestamp_millis());
        format!("<img src=\"/photo?t={}\" alt=\"Latest photo\">", tag)
    } else {
        "<p>No photo yet</p>".to_string()
    };
    let stale = if snap.stale { "<p class=\"stale\">Status may be out of date</p>" } else { "" };

    format!(
        "<!DOCTYPE html>\n\
         <html><head><meta charset=\"utf-8\">\
         <meta http-equiv=\"refresh\" content=\"{refresh}\">\
         <title>Coop camera</title>\
         <style>body{{font-family:sans-serif;margin:2em}}img{{max-width:100%}}\
         .on{{color:#c00}}.off{{color:#080}}.stale{{color:#888}}</style>\
         </head><body>\
         <h1>Coop camera</h1>\
         <p>Status: {presence}</p>\
         <p>Total detections: {total}</p>\
         <p>Sensor level: {level}</p>\
         <p>Last update: {updated}</p>\
         {stale}{picture}\
         </body></html>\n",
        refresh = refresh_secs,
        presence = presence,
        total = snap.total_detections,
        level = snap.sensor_level,
        updated = updated,
        stale = stale,
        picture = picture,
    )
}
