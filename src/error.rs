// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/coopcam

//! Error types for the capture, notification and pipeline subsystems

use thiserror::Error;

/// Failure reported by a capture device
#[derive(Debug, Error)]
pub enum DeviceError {
    /// A single capture attempt failed; retrying may succeed
    #[error("transient capture failure: {0}")]
    Transient(String),

    /// The device does not support the requested tuning parameter
    #[error("unsupported device operation: {0}")]
    Unsupported(String),

    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capture store errors
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Operation invoked before `init` (or after `deinit`)
    #[error("camera not initialized")]
    NotInitialized,

    #[error("camera already initialized")]
    AlreadyInitialized,

    /// Every capture attempt failed
    #[error("capture failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: DeviceError },

    /// Device or photo lock could not be acquired in time
    #[error("timed out waiting for camera lock")]
    LockTimeout,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("tuning failed: {0}")]
    Tune(DeviceError),
}

impl CaptureError {
    /// Transient errors are logged and skipped, never treated as fatal
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptureError::LockTimeout)
    }
}

/// Outbound notification errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification API returned status {0}")]
    Status(u16),

    #[error("invalid notification URL: {0}")]
    Url(String),

    #[error("notifier credentials not configured")]
    MissingCredentials,
}

/// Pipeline construction errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot create {name} queue with capacity {capacity}")]
    QueueCreation { name: &'static str, capacity: usize },

    #[error("monitor node already started")]
    AlreadyStarted,
}
