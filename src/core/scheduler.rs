// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/coopcam

//! Periodic recapture while presence stays confirmed

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::camera::{CaptureReason, CaptureStore};
use crate::sensors::{InputPin, Level, PresenceTracker};

struct ArmedTicker {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Captured,
    /// Re-check found the object gone
    Skipped,
    Failed,
}

/// Tick counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub captures: u64,
    pub skipped: u64,
    pub failures: u64,
}

pub struct RecaptureScheduler {
    interval: Duration,
    pin: Arc<dyn InputPin>,
    active_level: Level,
    presence: Arc<PresenceTracker>,
    store: Arc<CaptureStore>,
    armed: Mutex<Option<ArmedTicker>>,
    ticks: AtomicU64,
    captures: AtomicU64,
    skipped: AtomicU64,
    failures: AtomicU64,
}

impl RecaptureScheduler {
    pub fn new(
        interval: Duration,
        pin: Arc<dyn InputPin>,
        active_level: Level,
        presence: Arc<PresenceTracker>,
        store: Arc<CaptureStore>,
    ) -> Self {
        Self {
            interval,
            pin,
            active_level,
            presence,
            store,
            armed: Mutex::new(None),
            ticks: AtomicU64::new(0),
            captures: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Start ticking one interval from now. No-op if already armed; returns
    /// whether a new ticker was started.
    pub fn arm(self: &Arc<Self>) -> bool {
        let mut armed = self.armed.lock();
        if armed.is_some() {
            debug!("Recapture already armed");
            return false;
        }

        let (stop, mut stop_rx) = oneshot::channel();
        let period = self.interval;
        let this = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {}
                }
                let Some(this) = this.upgrade() else { break };
                // Outside select: a disarm never cancels a tick in flight
                this.tick().await;
            }
            debug!("Recapture ticker exited");
        });

        *armed = Some(ArmedTicker { stop, handle });
        true
    }

    /// Stop future ticks; returns whether a ticker was running
    pub fn disarm(&self) -> bool {
        match self.armed.lock().take() {
            Some(ticker) => {
                let _ = ticker.stop.send(());
                drop(ticker.handle);
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.lock().is_some()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            captures: self.captures.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    /// Re-validate presence with a direct pin read, then capture
    pub async fn tick(&self) -> TickOutcome {
        self.ticks.fetch_add(1, Ordering::Relaxed);

        let level = self.pin.level();
        if level != self.active_level || !self.presence.is_present() {
            debug!("Recapture skipped, pin reads {}", level);
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return TickOutcome::Skipped;
        }

        info!("Periodic photo - object still present");
        match self.store.capture(CaptureReason::ObjectRemainsPresent).await {
            Ok(_) => {
                self.captures.fetch_add(1, Ordering::Relaxed);
                TickOutcome::Captured
            }
            Err(e) => {
                if e.is_transient() {
                    debug!("Periodic photo skipped: {}", e);
                } else {
                    warn!("Periodic photo failed: {}", e);
                }
                self.failures.fetch_add(1, Ordering::Relaxed);
                TickOutcome::Failed
            }
        }
    }
}

impl Drop for RecaptureScheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::testing::ScriptedCamera;
    use crate::config::CameraConfig;
    use crate::sensors::SimulatedPin;

    async fn scheduler(pin: Arc<SimulatedPin>, presence: Arc<PresenceTracker>) -> Arc<RecaptureScheduler> {
        let store = Arc::new(CaptureStore::new(CameraConfig::default()));
        store.init(Box::new(ScriptedCamera::new())).await.unwrap();
        Arc::new(RecaptureScheduler::new(
            Duration::from_secs(2),
            pin,
            Level::High,
            presence,
            store,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_is_idempotent() {
        let pin = Arc::new(SimulatedPin::new(13, Level::Low));
        let sched = scheduler(pin, Arc::new(PresenceTracker::new())).await;

        assert!(sched.arm());
        assert!(!sched.arm());
        assert!(sched.is_armed());

        tokio::time::sleep(Duration::from_millis(2100)).await;
        // One ticker, one tick
        assert_eq!(sched.stats().ticks, 1);

        assert!(sched.disarm());
        assert!(!sched.disarm());
        assert!(!sched.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_skips_when_pin_inactive() {
        let pin = Arc::new(SimulatedPin::new(13, Level::Low));
        let sched = scheduler(pin, Arc::new(PresenceTracker::new())).await;

        assert_eq!(sched.tick().await, TickOutcome::Skipped);
        assert_eq!(sched.store.photo_count(), 0);
        assert_eq!(sched.stats().skipped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_captures_while_present() {
        let pin = Arc::new(SimulatedPin::new(13, Level::High));
        let presence = Arc::new(PresenceTracker::new());
        presence.set_present(true);
        let sched = scheduler(pin, presence).await;

        assert_eq!(sched.tick().await, TickOutcome::Captured);
        let photo = sched.store.read().await.unwrap().unwrap();
        assert_eq!(photo.sequence(), 1);
        assert_eq!(sched.stats().captures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_tick_leaves_scheduler_running() {
        let pin = Arc::new(SimulatedPin::new(13, Level::Low));
        let sched = scheduler(pin, Arc::new(PresenceTracker::new())).await;

        sched.arm();
        tokio::time::sleep(Duration::from_millis(4100)).await;

        let stats = sched.stats();
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.skipped, 2);
        assert!(sched.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ticks_after_disarm() {
        let pin = Arc::new(SimulatedPin::new(13, Level::Low));
        let sched = scheduler(pin, Arc::new(PresenceTracker::new())).await;

        sched.arm();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        sched.disarm();
        tokio::time::sleep(Duration::from_millis(5000)).await;

        assert_eq!(sched.stats().ticks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_lets_inflight_tick_finish() {
        let pin = Arc::new(SimulatedPin::new(13, Level::High));
        let presence = Arc::new(PresenceTracker::new());
        presence.set_present(true);
        let store = Arc::new(CaptureStore::new(CameraConfig::default()));
        let camera = ScriptedCamera::new().with_delay(Duration::from_millis(500));
        store.init(Box::new(camera)).await.unwrap();
        let sched = Arc::new(RecaptureScheduler::new(
            Duration::from_secs(2),
            pin,
            Level::High,
            presence,
            store.clone(),
        ));

        sched.arm();
        // Tick fires at 2.0s; its capture runs until 2.5s
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(store.photo_count(), 0);
        assert!(sched.disarm());

        tokio::time::sleep(Duration::from_millis(4000)).await;
        assert_eq!(store.photo_count(), 1);
        let stats = sched.stats();
        assert_eq!(stats.ticks, 1);
        assert_eq!(stats.captures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_after_disarm_starts_fresh() {
        let pin = Arc::new(SimulatedPin::new(13, Level::Low));
        let sched = scheduler(pin, Arc::new(PresenceTracker::new())).await;

        assert!(sched.arm());
        sched.disarm();
        assert!(sched.arm());
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(sched.stats().ticks, 1);
    }
}
