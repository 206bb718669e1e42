// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/coopcam

//! Simulated camera for demo mode

use async_trait::async_trait;
use rand::prelude::*;
use tokio::time::{sleep, Duration};

use super::{CaptureDevice, ExposurePreset, FrameSize, TuneParam};
use crate::error::DeviceError;

/// Produces JPEG-framed payloads (SOI ... EOI) whose size tracks frame size
/// and quality, and fails transiently at a configurable rate.
pub struct SimulatedCamera {
    name: String,
    rng: rand::rngs::StdRng,
    failure_rate: f64,
    frame_size: FrameSize,
    quality: u8,
    brightness: i8,
    exposure: ExposurePreset,
    frames: u64,
}

impl SimulatedCamera {
    pub fn new(failure_rate: f64) -> Self {
        Self {
            name: "simulated-ov2640".to_string(),
            rng: rand::rngs::StdRng::from_entropy(),
            failure_rate: failure_rate.clamp(0.0, 1.0),
            frame_size: FrameSize::Svga,
            quality: 45,
            brightness: 0,
            exposure: ExposurePreset::Daylight,
            frames: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = rand::rngs::StdRng::seed_from_u64(seed);
        self
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames
    }

    /// Rough compressed size: more pixels, better quality and sensor noise
    /// from low-light gain all mean more bytes
    fn payload_len(&self) -> usize {
        let pixels = self.frame_size.pixels() as f64;
        let mut bits_per_pixel = 2.0 / (self.quality.max(10) as f64 / 10.0);
        if self.exposure == ExposurePreset::LowLight {
            bits_per_pixel *= 1.3;
        }
        bits_per_pixel *= 1.0 + self.brightness as f64 * 0.05;
        ((pixels * bits_per_pixel / 8.0) as usize).max(512)
    }
}

#[async_trait]
impl CaptureDevice for SimulatedCamera {
    fn name(&self) -> &str {
        &self.name
    }

    async fn capture(&mut self) -> Result<Vec<u8>, DeviceError> {
        // Sensor exposure + readout
        sleep(Duration::from_millis(30)).await;

        if self.rng.gen_bool(self.failure_rate) {
            return Err(DeviceError::Transient("frame buffer not ready".to_string()));
        }

        self.frames += 1;
        let len = self.payload_len();
        let mut frame = Vec::with_capacity(len + 4);
        frame.extend_from_slice(&[0xFF, 0xD8]);
        frame.extend((0..len).map(|_| self.rng.gen::<u8>()));
        frame.extend_from_slice(&[0xFF, 0xD9]);
        Ok(frame)
    }

    async fn tune(&mut self, param: TuneParam) -> Result<(), DeviceError> {
        match param {
            TuneParam::Quality(q) => self.quality = q,
            TuneParam::FrameSize(size) => self.frame_size = size,
            TuneParam::Brightness(b) => self.brightness = b,
            TuneParam::Exposure(preset) => self.exposure = preset,
        }
        Ok(())
    }
}
