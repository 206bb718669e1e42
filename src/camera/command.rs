// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/coopcam

//! Camera backed by an external still-capture command
//! (e.g. `libcamera-still -n -o -`) writing JPEG to stdout.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{CaptureDevice, TuneParam};
use crate::error::DeviceError;

pub struct CommandCamera {
    name: String,
    program: String,
    args: Vec<String>,
}

impl CommandCamera {
    /// `argv[0]` is the program; returns None for an empty command
    pub fn new(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            name: format!("command:{}", program),
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl CaptureDevice for CommandCamera {
    fn name(&self) -> &str {
        &self.name
    }

    async fn capture(&mut self) -> Result<Vec<u8>, DeviceError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeviceError::Transient(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(DeviceError::Transient(format!("{} produced no data", self.program)));
        }

        debug!("{} produced {} bytes", self.program, output.stdout.len());
        Ok(output.stdout)
    }

    async fn tune(&mut self, param: TuneParam) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported(format!("{:?} on {}", param, self.name)))
    }
}
