// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/coopcam

//! Coopcam - motion-triggered capture and notify node
//!
//! A presence sensor on one GPIO line drives a camera: every confirmed
//! arrival takes a photo, keeps taking one every couple of seconds while the
//! object stays, and sends a rate-limited alert. A small web server shows the
//! latest photo and status.
//!
//! # Architecture
//!
//! ```text
//!  edge (IRQ / poller / simulator)
//!        │ EdgeTrigger (non-blocking)
//!        ▼
//!  ┌──────────────┐   arm/disarm   ┌────────────────────┐
//!  │MotionDetector│───────────────▶│ RecaptureScheduler │
//!  └──────────────┘                └────────────────────┘
//!     │      │   capture                   │ capture
//!     │      └──────────────┐   ┌──────────┘
//!     │ notices             ▼   ▼
//!     │               ┌──────────────┐
//!     ▼               │ CaptureStore │──── /photo
//!  NotificationGate   └──────────────┘
//!     │                     │ PhotoTaken
//!     ▼                     ▼
//!  Notifier        EventChannel ──▶ StateCache ──── /status, /
//! ```

pub mod camera;
pub mod clock;
pub mod config;
pub mod core;
pub mod error;
pub mod notify;
pub mod sensors;

#[cfg(feature = "web")]
pub mod web;

// Re-exports for convenience
pub use camera::{CaptureDevice, CaptureReason, CaptureStore, Photo};
pub use clock::WallClock;
pub use config::Config;
pub use core::{EventChannel, MonitorNode, ServerEvent, ServerEventKind, ServerStateSnapshot, StateCache};
pub use error::{CaptureError, DeviceError, NotifyError, PipelineError};
pub use notify::{NotificationGate, Notifier};
pub use sensors::{EdgeTrigger, InputPin, Level, MotionDetector};

/// Coopcam version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Coopcam name
pub const NAME: &str = "Coopcam";

/// Build info
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: VERSION.to_string(),
        target: std::env::consts::ARCH.to_string(),
        os: std::env::consts::OS.to_string(),
        features: enabled_features(),
    }
}

/// Build information
#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: String,
    pub target: String,
    pub os: String,
    pub features: Vec<String>,
}

fn enabled_features() -> Vec<String> {
    let mut features = vec![];

    #[cfg(feature = "web")]
    features.push("web".to_string());

    features
}
