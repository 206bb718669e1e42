// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/coopcam

//! Outbound alerts on confirmed detection starts
//!
//! The [`NotificationGate`] subscribes to detection notices and lets at most
//! one alert through per cooldown window. The cooldown only starts on a
//! successful dispatch, so a failed send is naturally retried by the next
//! qualifying detection.

mod callmebot;

pub use callmebot::CallMeBotNotifier;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::camera::CaptureStore;
use crate::clock::WallClock;
use crate::error::NotifyError;
use crate::sensors::DetectionNotice;

/// Delivers a pre-built message
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, recipient: &str, message: &str) -> Result<(), NotifyError>;
}

/// Writes alerts to the log; used when no gateway is configured
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, recipient: &str, message: &str) -> Result<(), NotifyError> {
        info!("ALERT to {}: {}", if recipient.is_empty() { "-" } else { recipient }, message);
        Ok(())
    }
}

/// Result of one gate evaluation
#[derive(Debug)]
pub enum GateOutcome {
    Dispatched,
    CoolingDown { remaining: Duration },
    /// Another dispatch is still running
    InFlight,
    Failed(NotifyError),
}

/// Gate counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateStats {
    pub attempts: u64,
    pub dispatched: u64,
    pub suppressed: u64,
}

pub struct NotificationGate {
    notifier: Arc<dyn Notifier>,
    recipient: String,
    window: Duration,
    photo_url: String,
    store: Arc<CaptureStore>,
    clock: WallClock,
    last_fired: Mutex<Option<Instant>>,
    in_flight: tokio::sync::Mutex<()>,
    attempts: AtomicU64,
    dispatched: AtomicU64,
    suppressed: AtomicU64,
}

impl NotificationGate {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        recipient: impl Into<String>,
        window: Duration,
        photo_url: impl Into<String>,
        store: Arc<CaptureStore>,
        clock: WallClock,
    ) -> Self {
        Self {
            notifier,
            recipient: recipient.into(),
            window,
            photo_url: photo_url.into(),
            store,
            clock,
            last_fired: Mutex::new(None),
            in_flight: tokio::sync::Mutex::new(()),
            attempts: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
        }
    }

    /// `Motion detected <time> <photo link>`. The photo count in the query
    /// keeps chat clients from previewing a cached image.
    pub fn build_message(&self) -> String {
        format!(
            "Motion detected {} {}?n={}",
            self.clock.formatted_now(),
            self.photo_url,
            self.store.photo_count()
        )
    }

    /// Evaluate one confirmed detection start
    pub async fn on_detected(&self) -> GateOutcome {
        let Ok(_in_flight) = self.in_flight.try_lock() else {
            debug!("Notification already in flight, skipping");
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            return GateOutcome::InFlight;
        };

        let now = Instant::now();
        if let Some(last) = *self.last_fired.lock() {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.window {
                let remaining = self.window - elapsed;
                info!("Notification cooldown active, {}s remaining", remaining.as_secs());
                self.suppressed.fetch_add(1, Ordering::Relaxed);
                return GateOutcome::CoolingDown { remaining };
            }
        }

        let message = self.build_message();
        self.attempts.fetch_add(1, Ordering::Relaxed);
        info!("Sending alert via {}", self.notifier.name());

        match self.notifier.send(&self.recipient, &message).await {
            Ok(()) => {
                *self.last_fired.lock() = Some(now);
                self.dispatched.fetch_add(1, Ordering::Relaxed);
                GateOutcome::Dispatched
            }
            Err(e) => {
                warn!("Alert dispatch failed: {}", e);
                GateOutcome::Failed(e)
            }
        }
    }

    /// Consume detection notices until shutdown
    pub async fn run(
        self: Arc<Self>,
        mut notices: broadcast::Receiver<DetectionNotice>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!("Notification gate started ({}s cooldown)", self.window.as_secs());
        loop {
            tokio::select! {
                notice = notices.recv() => match notice {
                    Ok(notice) => {
                        debug!("Detection #{} reached notification gate", notice.count);
                        self.on_detected().await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Notification gate lagged, {} detection(s) skipped", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.recv() => break,
            }
        }
        info!("Notification gate stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use chrono::Utc;
    use crate::config::CameraConfig;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
        fail: AtomicBool,
    }

    impl RecordingNotifier {
        fn calls(&self) -> usize {
            self.sent.lock().len()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, recipient: &str, message: &str) -> Result<(), NotifyError> {
            self.sent.lock().push((recipient.to_string(), message.to_string()));
            if self.fail.load(Ordering::SeqCst) {
                Err(NotifyError::Status(500))
            } else {
                Ok(())
            }
        }
    }

    fn gate(notifier: Arc<RecordingNotifier>) -> NotificationGate {
        let store = Arc::new(CaptureStore::new(CameraConfig::default()));
        let clock = WallClock::new(0);
        clock.mark_synced();
        NotificationGate::new(
            notifier,
            "+570000000",
            Duration::from_secs(10),
            "http://cam.local/photo",
            store,
            clock,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_detections_inside_window_dispatch_once() {
        let notifier = Arc::new(RecordingNotifier::default());
        let gate = gate(notifier.clone());

        assert!(matches!(gate.on_detected().await, GateOutcome::Dispatched));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(matches!(
            gate.on_detected().await,
            GateOutcome::CoolingDown { remaining } if remaining == Duration::from_secs(5)
        ));

        assert_eq!(notifier.calls(), 1);
        assert_eq!(gate.stats().suppressed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detections_outside_window_dispatch_twice() {
        let notifier = Arc::new(RecordingNotifier::default());
        let gate = gate(notifier.clone());

        gate.on_detected().await;
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert!(matches!(gate.on_detected().await, GateOutcome::Dispatched));
        assert_eq!(notifier.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_start_cooldown() {
        let notifier = Arc::new(RecordingNotifier::default());
        notifier.fail.store(true, Ordering::SeqCst);
        let gate = gate(notifier.clone());

        assert!(matches!(gate.on_detected().await, GateOutcome::Failed(_)));
        notifier.fail.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(matches!(gate.on_detected().await, GateOutcome::Dispatched));

        assert_eq!(notifier.calls(), 2);
        assert_eq!(gate.stats(), GateStats { attempts: 2, dispatched: 1, suppressed: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_format() {
        let notifier = Arc::new(RecordingNotifier::default());
        let gate = gate(notifier.clone());
        gate.on_detected().await;

        let (recipient, message) = notifier.sent.lock()[0].clone();
        assert_eq!(recipient, "+570000000");
        assert!(message.starts_with("Motion detected "));
        assert!(message.ends_with(" http://cam.local/photo?n=0"));
        assert!(message.contains('/'));
        assert!(message.contains("AM") || message.contains("PM"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_consumes_notices() {
        let notifier = Arc::new(RecordingNotifier::default());
        let gate = Arc::new(gate(notifier.clone()));
        let (notice_tx, notice_rx) = broadcast::channel(4);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = tokio::spawn(gate.clone().run(notice_rx, shutdown_rx));
        notice_tx.send(DetectionNotice { count: 1, at: Utc::now() }).unwrap();
        notice_tx.send(DetectionNotice { count: 2, at: Utc::now() }).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
        assert_eq!(notifier.calls(), 1);
        assert_eq!(gate.stats().suppressed, 1);
    }
}
