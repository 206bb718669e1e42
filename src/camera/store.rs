// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/coopcam

//! Capture store - owns the capture device and the single current photo
//!
//! Captures are serialised on the device lock and the swap of the current
//! photo happens under the photo lock, so photo metadata is monotonic even
//! with the initial and periodic captures racing. Every lock acquisition is
//! bounded by a timeout.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, info, warn};

use super::{CaptureDevice, ExposurePreset, FrameSize, TuneParam};
use crate::config::CameraConfig;
use crate::core::{EventSender, ServerEventKind};
use crate::error::{CaptureError, DeviceError};

/// Why a photo was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureReason {
    InitialDetection,
    ObjectRemainsPresent,
}

impl fmt::Display for CaptureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureReason::InitialDetection => write!(f, "initial detection"),
            CaptureReason::ObjectRemainsPresent => write!(f, "object remains present"),
        }
    }
}

/// The current photo. Shared as `Arc<Photo>`; the store drops its reference
/// when a newer photo replaces it.
#[derive(Debug)]
pub struct Photo {
    data: Bytes,
    captured_at: DateTime<Utc>,
    sequence: u64,
}

impl Photo {
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// 1-based photo number since init
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Result of a successful capture
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CaptureMeta {
    pub sequence: u64,
    pub size: usize,
    pub captured_at: DateTime<Utc>,
    pub reason: CaptureReason,
    pub attempts: u32,
}

/// Camera status and capture counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub initialized: bool,
    pub device: Option<String>,
    pub frame_size: FrameSize,
    pub jpeg_quality: u8,
    pub brightness: i8,
    pub night_mode: bool,
    pub photo_count: u64,
    pub last_photo_size: usize,
    pub last_photo_time: Option<DateTime<Utc>>,
}

impl CameraInfo {
    fn from_config(config: &CameraConfig) -> Self {
        Self {
            initialized: false,
            device: None,
            frame_size: config.frame_size,
            jpeg_quality: config.jpeg_quality,
            brightness: 0,
            night_mode: false,
            photo_count: 0,
            last_photo_size: 0,
            last_photo_time: None,
        }
    }
}

pub struct CaptureStore {
    config: CameraConfig,
    device: Mutex<Option<Box<dyn CaptureDevice>>>,
    current: Mutex<Option<Arc<Photo>>>,
    info: parking_lot::Mutex<CameraInfo>,
    initialized: AtomicBool,
    events: Option<EventSender>,
}

impl CaptureStore {
    pub fn new(config: CameraConfig) -> Self {
        let info = CameraInfo::from_config(&config);
        Self {
            config,
            device: Mutex::new(None),
            current: Mutex::new(None),
            info: parking_lot::Mutex::new(info),
            initialized: AtomicBool::new(false),
            events: None,
        }
    }

    /// Emit `PhotoTaken` on the given channel after each capture
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Take ownership of the device and apply the configured frame size and
    /// quality. Tuning a device that does not support it is not an error.
    pub async fn init(&self, mut device: Box<dyn CaptureDevice>) -> Result<(), CaptureError> {
        let mut slot = self.lock(&self.device).await?;
        if slot.is_some() {
            return Err(CaptureError::AlreadyInitialized);
        }

        info!("Initializing camera {}...", device.name());
        for param in [
            TuneParam::FrameSize(self.config.frame_size),
            TuneParam::Quality(self.config.jpeg_quality),
        ] {
            match device.tune(param).await {
                Ok(()) => {}
                Err(DeviceError::Unsupported(what)) => {
                    warn!("Camera ignores initial tuning: {}", what);
                }
                Err(e) => {
                    error!("Camera init failed: {}", e);
                    return Err(CaptureError::Tune(e));
                }
            }
        }

        {
            let mut info = self.info.lock();
            info.initialized = true;
            info.device = Some(device.name().to_string());
        }
        *slot = Some(device);
        self.initialized.store(true, Ordering::SeqCst);

        info!("Camera initialized");
        Ok(())
    }

    /// Release the current photo and the device
    pub async fn deinit(&self) -> Result<(), CaptureError> {
        info!("Deinitializing camera...");
        self.initialized.store(false, Ordering::SeqCst);

        let mut device = self.lock(&self.device).await?;
        let mut current = self.lock(&self.current).await?;
        current.take();
        device.take();

        *self.info.lock() = CameraInfo::from_config(&self.config);
        info!("Camera deinitialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Capture a photo and make it the current one
    pub async fn capture(&self, reason: CaptureReason) -> Result<CaptureMeta, CaptureError> {
        if !self.is_initialized() {
            error!("Camera not initialized");
            return Err(CaptureError::NotInitialized);
        }

        let mut device_guard = self.lock(&self.device).await?;
        let device = device_guard.as_mut().ok_or(CaptureError::NotInitialized)?;

        info!("Taking photo: {}", reason);

        let max_attempts = self.config.capture_attempts.max(1);
        let mut attempts = 0;
        let frame = loop {
            attempts += 1;
            match device.capture().await {
                Ok(frame) => break frame,
                Err(e) if attempts < max_attempts => {
                    warn!("Capture attempt {}/{} failed: {}", attempts, max_attempts, e);
                    sleep(self.config.retry_backoff()).await;
                }
                Err(e) => {
                    error!("Capture failed after {} attempts: {}", attempts, e);
                    return Err(CaptureError::Exhausted { attempts, last: e });
                }
            }
        };

        // Device stays locked until the swap so captures are totally ordered
        let meta = {
            let mut current = self.lock(&self.current).await?;
            let mut info = self.info.lock();

            let photo = Photo {
                data: Bytes::from(frame),
                captured_at: Utc::now(),
                sequence: info.photo_count + 1,
            };
            let meta = CaptureMeta {
                sequence: photo.sequence,
                size: photo.len(),
                captured_at: photo.captured_at,
                reason,
                attempts,
            };

            if current.replace(Arc::new(photo)).is_some() {
                debug!("Previous photo released");
            }
            info.photo_count = meta.sequence;
            info.last_photo_size = meta.size;
            info.last_photo_time = Some(meta.captured_at);
            meta
        };
        drop(device_guard);

        info!("Stored photo #{} - {} bytes", meta.sequence, meta.size);

        if let Some(events) = &self.events {
            events
                .emit(ServerEventKind::PhotoTaken { size: meta.size, reason })
                .await;
        }

        Ok(meta)
    }

    /// Shared handle to the current photo, `None` if nothing has been
    /// captured. Holding the handle keeps those bytes alive, not the slot.
    pub async fn read(&self) -> Result<Option<Arc<Photo>>, CaptureError> {
        let current = self.lock(&self.current).await?;
        Ok(current.clone())
    }

    /// Borrow the current photo bytes inside the critical section
    pub async fn with_photo<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<Option<R>, CaptureError> {
        let current = self.lock(&self.current).await?;
        Ok(current.as_ref().map(|photo| f(photo.data())))
    }

    /// Existence check bounded by the short status timeout; a lock timeout
    /// reports `false` so status requests never stall behind a capture.
    pub async fn has_photo(&self) -> bool {
        match timeout(self.config.has_photo_timeout(), self.current.lock()).await {
            Ok(current) => current.is_some(),
            Err(_) => {
                debug!("has_photo lock timeout");
                false
            }
        }
    }

    pub fn info(&self) -> CameraInfo {
        self.info.lock().clone()
    }

    pub fn photo_count(&self) -> u64 {
        self.info.lock().photo_count
    }

    pub async fn tune(&self, param: TuneParam) -> Result<(), CaptureError> {
        if !self.is_initialized() {
            return Err(CaptureError::NotInitialized);
        }
        let mut device_guard = self.lock(&self.device).await?;
        let device = device_guard.as_mut().ok_or(CaptureError::NotInitialized)?;
        device.tune(param).await.map_err(CaptureError::Tune)?;

        let mut info = self.info.lock();
        match param {
            TuneParam::Quality(q) => info.jpeg_quality = q,
            TuneParam::FrameSize(size) => info.frame_size = size,
            TuneParam::Brightness(b) => info.brightness = b,
            TuneParam::Exposure(preset) => info.night_mode = preset == ExposurePreset::LowLight,
        }
        Ok(())
    }

    /// JPEG quality, 10 (best) to 63
    pub async fn set_quality(&self, quality: u8) -> Result<(), CaptureError> {
        if !(10..=63).contains(&quality) {
            error!("Invalid JPEG quality: {} (range 10-63)", quality);
            return Err(CaptureError::InvalidArgument(format!(
                "quality {} outside 10..=63",
                quality
            )));
        }
        self.tune(TuneParam::Quality(quality)).await?;
        info!("JPEG quality set to {}", quality);
        Ok(())
    }

    pub async fn set_frame_size(&self, frame_size: FrameSize) -> Result<(), CaptureError> {
        self.tune(TuneParam::FrameSize(frame_size)).await?;
        info!("Frame size set to {:?}", frame_size);
        Ok(())
    }

    /// -2 (darkest) to +2 (brightest)
    pub async fn set_brightness(&self, brightness: i8) -> Result<(), CaptureError> {
        if !(-2..=2).contains(&brightness) {
            return Err(CaptureError::InvalidArgument(format!(
                "brightness {} outside -2..=2",
                brightness
            )));
        }
        self.tune(TuneParam::Brightness(brightness)).await?;
        info!("Brightness set to {}", brightness);
        Ok(())
    }

    pub async fn optimize_for_low_light(&self) -> Result<(), CaptureError> {
        self.tune(TuneParam::Exposure(ExposurePreset::LowLight)).await?;
        self.tune(TuneParam::Brightness(2)).await?;
        info!("Camera tuned for low light");
        Ok(())
    }

    pub async fn optimize_for_daylight(&self) -> Result<(), CaptureError> {
        self.tune(TuneParam::Exposure(ExposurePreset::Daylight)).await?;
        self.tune(TuneParam::Brightness(0)).await?;
        info!("Camera tuned for daylight");
        Ok(())
    }

    pub async fn set_night_mode(&self, night_mode: bool) -> Result<(), CaptureError> {
        if night_mode {
            self.optimize_for_low_light().await
        } else {
            self.optimize_for_daylight().await
        }
    }

    async fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> Result<MutexGuard<'a, T>, CaptureError> {
        bounded(self.config.lock_timeout(), mutex.lock()).await
    }
}

async fn bounded<F: Future>(limit: Duration, fut: F) -> Result<F::Output, CaptureError> {
    timeout(limit, fut).await.map_err(|_| {
        warn!("Camera lock not acquired within {:?}", limit);
        CaptureError::LockTimeout
    })
}
