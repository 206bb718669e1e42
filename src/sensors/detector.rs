// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/coopcam

//! Debounced presence detector
//!
//! Edges arrive from an [`EdgeTrigger`] (interrupt handler, poller or
//! simulator) as bare tokens on a bounded queue. The worker waits out the
//! debounce interval, reads the pin once and only acts when the confirmed
//! level differs from the current presence state.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::{EdgeToken, InputPin, Level};
use crate::camera::{CaptureReason, CaptureStore};
use crate::config::SensorConfig;
use crate::core::{EventSender, RecaptureScheduler, ServerEventKind};
use crate::error::PipelineError;

/// Confirmed presence plus the last raw level read by the detector.
///
/// Only the detector writes it; everything else reads.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    present: AtomicBool,
    last_level: AtomicU8,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_present(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }

    pub fn last_level(&self) -> Level {
        Level::from_raw(self.last_level.load(Ordering::SeqCst))
    }

    pub(crate) fn set_present(&self, present: bool) {
        self.present.store(present, Ordering::SeqCst);
    }

    pub(crate) fn record_level(&self, level: Level) {
        self.last_level.store(level.as_raw(), Ordering::SeqCst);
    }
}

/// Detection counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionStatistics {
    pub detection_count: u64,
    pub object_detected: bool,
    pub last_detection_time: Option<DateTime<Utc>>,
}

/// Published once per confirmed not-present -> present transition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionNotice {
    pub count: u64,
    pub at: DateTime<Utc>,
}

/// Producer half of the edge queue.
///
/// `notify` never blocks, allocates or logs, so it is safe to call from an
/// interrupt-like context. A full queue drops the edge.
#[derive(Clone)]
pub struct EdgeTrigger {
    pin: u32,
    tx: mpsc::Sender<EdgeToken>,
    dropped: Arc<AtomicU64>,
}

impl EdgeTrigger {
    /// Enqueue an edge; returns false if it was dropped
    pub fn notify(&self) -> bool {
        match self.tx.try_send(EdgeToken { pin: self.pin }) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Edges dropped because the queue was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn dropped_counter(&self) -> Arc<AtomicU64> {
        self.dropped.clone()
    }
}

/// Create the bounded edge queue
pub fn edge_channel(
    pin: u32,
    capacity: usize,
) -> Result<(EdgeTrigger, mpsc::Receiver<EdgeToken>), PipelineError> {
    if capacity == 0 {
        return Err(PipelineError::QueueCreation { name: "edge", capacity });
    }
    let (tx, rx) = mpsc::channel(capacity);
    let trigger = EdgeTrigger {
        pin,
        tx,
        dropped: Arc::new(AtomicU64::new(0)),
    };
    Ok((trigger, rx))
}

/// Turns debounced edges into presence transitions and drives capture,
/// recapture scheduling, event emission and detection observers.
pub struct MotionDetector {
    config: SensorConfig,
    pin: Arc<dyn InputPin>,
    presence: Arc<PresenceTracker>,
    stats: Mutex<DetectionStatistics>,
    store: Arc<CaptureStore>,
    scheduler: Arc<RecaptureScheduler>,
    events: EventSender,
    detection_tx: broadcast::Sender<DetectionNotice>,
    dropped_edges: Arc<AtomicU64>,
    reported_drops: AtomicU64,
}

impl MotionDetector {
    pub fn new(
        config: SensorConfig,
        pin: Arc<dyn InputPin>,
        presence: Arc<PresenceTracker>,
        trigger: &EdgeTrigger,
        store: Arc<CaptureStore>,
        scheduler: Arc<RecaptureScheduler>,
        events: EventSender,
    ) -> Self {
        let (detection_tx, _) = broadcast::channel(16);
        Self {
            config,
            pin,
            presence,
            stats: Mutex::new(DetectionStatistics::default()),
            store,
            scheduler,
            events,
            detection_tx,
            dropped_edges: trigger.dropped_counter(),
            reported_drops: AtomicU64::new(0),
        }
    }

    /// Observe confirmed detection starts
    pub fn subscribe_detections(&self) -> broadcast::Receiver<DetectionNotice> {
        self.detection_tx.subscribe()
    }

    pub fn statistics(&self) -> DetectionStatistics {
        *self.stats.lock()
    }

    /// Direct, undebounced pin read
    pub fn read_level(&self) -> Level {
        self.pin.level()
    }

    pub fn is_active(&self, level: Level) -> bool {
        level == self.config.active_level
    }

    /// Clear counters and presence, stop recapture
    pub fn reset(&self) {
        *self.stats.lock() = DetectionStatistics::default();
        self.presence.set_present(false);
        self.scheduler.disarm();
        info!("Detector state reset");
    }

    /// Edge worker loop
    pub async fn run(
        self: Arc<Self>,
        mut edges: mpsc::Receiver<EdgeToken>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(
            "Detection task started on GPIO {} (active level {})",
            self.pin.number(),
            self.config.active_level
        );

        loop {
            tokio::select! {
                Some(token) = edges.recv() => {
                    self.handle_edge(token).await;
                }
                _ = shutdown.recv() => {
                    info!("Detection task shutting down...");
                    break;
                }
                else => break,
            }
        }
    }

    /// Debounce one edge and apply the resulting transition, if any
    pub async fn handle_edge(&self, token: EdgeToken) {
        self.report_dropped_edges();
        debug!("Edge received on GPIO {}", token.pin);

        tokio::time::sleep(self.config.debounce()).await;

        let level = self.pin.level();
        self.presence.record_level(level);
        let present = self.is_active(level);
        debug!("Debounced level: {}", level);

        match (self.presence.is_present(), present) {
            (false, true) => self.on_presence_started().await,
            (true, false) => self.on_presence_ended().await,
            _ => debug!("Level matches confirmed state, ignoring edge"),
        }
    }

    async fn on_presence_started(&self) {
        let notice = {
            let mut stats = self.stats.lock();
            stats.object_detected = true;
            stats.detection_count += 1;
            let at = Utc::now();
            stats.last_detection_time = Some(at);
            DetectionNotice { count: stats.detection_count, at }
        };
        self.presence.set_present(true);

        info!("New object detected #{}", notice.count);
        self.events
            .emit(ServerEventKind::DetectionStarted { count: notice.count })
            .await;

        if let Err(e) = self.store.capture(CaptureReason::InitialDetection).await {
            warn!("Initial detection photo failed: {}", e);
        }

        if self.scheduler.arm() {
            info!("Periodic recapture armed");
        }

        // No subscribers is fine
        let _ = self.detection_tx.send(notice);
    }

    async fn on_presence_ended(&self) {
        let total = {
            let mut stats = self.stats.lock();
            stats.object_detected = false;
            stats.detection_count
        };
        self.presence.set_present(false);

        info!("Object gone - total detections: {}", total);
        self.events.emit(ServerEventKind::DetectionEnded).await;

        if self.scheduler.disarm() {
            info!("Periodic recapture stopped");
        }
    }

    fn report_dropped_edges(&self) {
        let dropped = self.dropped_edges.load(Ordering::Relaxed);
        let reported = self.reported_drops.swap(dropped, Ordering::Relaxed);
        if dropped > reported {
            warn!("Edge queue full, dropped {} edge(s)", dropped - reported);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::testing::ScriptedCamera;
    use crate::camera::CaptureStore;
    use crate::config::{CameraConfig, EventConfig};
    use crate::core::{EventChannel, EventReceiver, RecvOutcome, ServerEvent};
    use crate::sensors::SimulatedPin;
    use tokio::time::Duration;

    struct Rig {
        pin: Arc<SimulatedPin>,
        trigger: EdgeTrigger,
        detector: Arc<MotionDetector>,
        store: Arc<CaptureStore>,
        events: EventReceiver,
        shutdown: broadcast::Sender<()>,
    }

    async fn rig(active_level: Level) -> Rig {
        let config = SensorConfig { active_level, ..SensorConfig::default() };
        let pin = Arc::new(SimulatedPin::new(13, active_level.inverted()));
        let presence = Arc::new(PresenceTracker::new());
        let (sender, events) = EventChannel::new(&EventConfig::default(), presence.clone()).unwrap();

        let store = Arc::new(
            CaptureStore::new(CameraConfig::default()).with_events(sender.clone()),
        );
        store.init(Box::new(ScriptedCamera::new())).await.unwrap();

        let scheduler = Arc::new(RecaptureScheduler::new(
            Duration::from_secs(3600),
            pin.clone(),
            active_level,
            presence.clone(),
            store.clone(),
        ));

        let (trigger, edges) = edge_channel(13, 10).unwrap();
        let detector = Arc::new(MotionDetector::new(
            config,
            pin.clone(),
            presence,
            &trigger,
            store.clone(),
            scheduler,
            sender,
        ));

        let (shutdown, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(detector.clone().run(edges, shutdown_rx));

        Rig { pin, trigger, detector, store, events, shutdown }
    }

    async fn drain(events: &mut EventReceiver) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let RecvOutcome::Event(event) = events.recv().await {
            out.push(event);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounce_collapses_to_one_detection() {
        let rig = rig(Level::High).await;

        // Contact bounce: several edges, level settles high
        for _ in 0..5 {
            rig.pin.toggle();
            assert!(rig.trigger.notify());
        }
        rig.pin.set_level(Level::High);
        tokio::time::sleep(Duration::from_millis(500)).await;

        let stats = rig.detector.statistics();
        assert_eq!(stats.detection_count, 1);
        assert!(stats.object_detected);
        assert!(stats.last_detection_time.is_some());

        // Bounce on release
        for _ in 0..3 {
            rig.pin.toggle();
            rig.trigger.notify();
        }
        rig.pin.set_level(Level::Low);
        tokio::time::sleep(Duration::from_millis(500)).await;

        let stats = rig.detector.statistics();
        assert_eq!(stats.detection_count, 1);
        assert!(!stats.object_detected);

        rig.pin.set_level(Level::High);
        rig.trigger.notify();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(rig.detector.statistics().detection_count, 2);

        rig.shutdown.send(()).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_edges_are_ignored() {
        let rig = rig(Level::High).await;

        rig.pin.set_level(Level::High);
        rig.trigger.notify();
        tokio::time::sleep(Duration::from_millis(200)).await;
        rig.trigger.notify();
        rig.trigger.notify();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(rig.detector.statistics().detection_count, 1);
        assert_eq!(rig.store.photo_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_precedes_photo_and_ended_has_no_photo() {
        let mut rig = rig(Level::High).await;

        rig.pin.set_level(Level::High);
        rig.trigger.notify();
        tokio::time::sleep(Duration::from_millis(200)).await;
        rig.pin.set_level(Level::Low);
        rig.trigger.notify();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let events = drain(&mut rig.events).await;
        let kinds: Vec<_> = events.iter().map(|e| e.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                ServerEventKind::DetectionStarted { count: 1 },
                ServerEventKind::PhotoTaken {
                    size: ScriptedCamera::FRAME_LEN,
                    reason: CaptureReason::InitialDetection,
                },
                ServerEventKind::DetectionEnded,
            ]
        );
        assert!(events[0].object_detected);
        assert_eq!(events[0].sensor_level, Level::High);
        assert!(!events[2].object_detected);
        assert_eq!(events[2].sensor_level, Level::Low);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_fires_once_per_start() {
        let rig = rig(Level::High).await;
        let mut notices = rig.detector.subscribe_detections();

        rig.pin.set_level(Level::High);
        rig.trigger.notify();
        rig.trigger.notify();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.count, 1);
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_low_polarity() {
        let rig = rig(Level::Low).await;
        assert_eq!(rig.pin.level(), Level::High);

        rig.pin.set_level(Level::Low);
        rig.trigger.notify();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(rig.detector.statistics().detection_count, 1);
        assert!(rig.detector.is_active(Level::Low));
    }

    #[test]
    fn test_full_queue_drops_edges() {
        let (trigger, _rx) = edge_channel(13, 2).unwrap();
        assert!(trigger.notify());
        assert!(trigger.notify());
        assert!(!trigger.notify());
        assert!(!trigger.notify());
        assert_eq!(trigger.dropped(), 2);
    }

    #[test]
    fn test_zero_capacity_queue_is_rejected() {
        assert!(matches!(
            edge_channel(13, 0),
            Err(PipelineError::QueueCreation { capacity: 0, .. })
        ));
    }
}
