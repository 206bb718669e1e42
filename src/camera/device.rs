// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/coopcam

//! Capture device trait and tuning parameters

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// Output resolution presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameSize {
    Qvga,   // 320x240
    Vga,    // 640x480
    Svga,   // 800x600
    Xga,    // 1024x768
    Hd,     // 1280x720
    Sxga,   // 1280x1024
    Uxga,   // 1600x1200
}

impl FrameSize {
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            FrameSize::Qvga => (320, 240),
            FrameSize::Vga => (640, 480),
            FrameSize::Svga => (800, 600),
            FrameSize::Xga => (1024, 768),
            FrameSize::Hd => (1280, 720),
            FrameSize::Sxga => (1280, 1024),
            FrameSize::Uxga => (1600, 1200),
        }
    }

    pub fn pixels(self) -> u64 {
        let (w, h) = self.dimensions();
        w as u64 * h as u64
    }
}

/// Exposure/gain presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposurePreset {
    Daylight,
    LowLight,
}

/// A single device tuning change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuneParam {
    /// JPEG quality, 10 (best) to 63
    Quality(u8),
    FrameSize(FrameSize),
    /// -2 to +2
    Brightness(i8),
    Exposure(ExposurePreset),
}

/// Camera hardware (or stand-in) owned by the capture store
#[async_trait]
pub trait CaptureDevice: Send {
    /// Human-readable device name
    fn name(&self) -> &str;

    /// Grab one encoded frame
    async fn capture(&mut self) -> Result<Vec<u8>, DeviceError>;

    /// Apply a tuning change
    async fn tune(&mut self, param: TuneParam) -> Result<(), DeviceError>;
}
