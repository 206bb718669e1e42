//! Scripted capture device for tests

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{sleep, Duration};

use super::{CaptureDevice, TuneParam};
use crate::error::DeviceError;

/// Shared view into a [`ScriptedCamera`] after it has been boxed
#[derive(Clone, Default)]
pub struct CameraLog {
    attempts: Arc<AtomicU32>,
    tunes: Arc<Mutex<Vec<TuneParam>>>,
}

impl CameraLog {
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn tunes(&self) -> Vec<TuneParam> {
        self.tunes.lock().clone()
    }
}

/// Fails the first `failures` attempts, then returns frames filled with the
/// attempt number so consecutive photos are distinguishable.
pub struct ScriptedCamera {
    failures: u32,
    delay: Duration,
    reject_tuning: bool,
    log: CameraLog,
}

impl ScriptedCamera {
    pub const FRAME_LEN: usize = 1024;

    pub fn new() -> Self {
        Self {
            failures: 0,
            delay: Duration::ZERO,
            reject_tuning: false,
            log: CameraLog::default(),
        }
    }

    pub fn failing_first(mut self, failures: u32) -> Self {
        self.failures = failures;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn rejecting_tuning(mut self) -> Self {
        self.reject_tuning = true;
        self
    }

    pub fn log(&self) -> CameraLog {
        self.log.clone()
    }
}

#[async_trait]
impl CaptureDevice for ScriptedCamera {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn capture(&mut self) -> Result<Vec<u8>, DeviceError> {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        let attempt = self.log.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(DeviceError::Transient(format!("scripted failure {}", attempt)));
        }
        Ok(vec![attempt as u8; Self::FRAME_LEN])
    }

    async fn tune(&mut self, param: TuneParam) -> Result<(), DeviceError> {
        if self.reject_tuning {
            return Err(DeviceError::Transient("sensor did not ack".to_string()));
        }
        self.log.tunes.lock().push(param);
        Ok(())
    }
}
