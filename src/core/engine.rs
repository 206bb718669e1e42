// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/coopcam

//! Monitor node - owns every component and the tasks that drive them

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use anyhow::{Context, Result};
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{EventChannel, EventReceiver, RecaptureScheduler, StateCache};
use crate::camera::{CaptureDevice, CaptureStore};
use crate::clock::WallClock;
use crate::config::Config;
use crate::error::PipelineError;
use crate::notify::{NotificationGate, Notifier};
use crate::sensors::{edge_channel, EdgeToken, EdgeTrigger, InputPin, MotionDetector, PresenceTracker};

/// Queue ends handed to the worker tasks on start
struct Pending {
    edges: mpsc::Receiver<EdgeToken>,
    events: EventReceiver,
}

/// The node context. Built once at start-up and shared by reference.
pub struct MonitorNode {
    config: Config,
    presence: Arc<PresenceTracker>,
    store: Arc<CaptureStore>,
    scheduler: Arc<RecaptureScheduler>,
    detector: Arc<MotionDetector>,
    cache: Arc<StateCache>,
    gate: Option<Arc<NotificationGate>>,
    clock: WallClock,
    trigger: EdgeTrigger,
    pending: Mutex<Option<Pending>>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    start_time: Mutex<Option<Instant>>,
}

impl MonitorNode {
    /// Wire the pipeline. A camera that fails to initialize leaves the
    /// node running without photos; queue creation failures are fatal.
    pub async fn new(
        config: Config,
        pin: Arc<dyn InputPin>,
        camera: Box<dyn CaptureDevice>,
        notifier: Option<Arc<dyn Notifier>>,
        clock: WallClock,
    ) -> Result<Self> {
        info!("Initializing monitor node on GPIO {}", pin.number());

        let presence = Arc::new(PresenceTracker::new());
        presence.record_level(pin.level());

        let (events_tx, events_rx) = EventChannel::new(&config.events, presence.clone())
            .context("Failed to create event queue")?;

        let store = Arc::new(CaptureStore::new(config.camera.clone()).with_events(events_tx.clone()));
        if let Err(e) = store.init(camera).await {
            error!("Camera init failed, continuing without photos: {}", e);
        }

        let scheduler = Arc::new(RecaptureScheduler::new(
            config.camera.recapture_interval(),
            pin.clone(),
            config.sensor.active_level,
            presence.clone(),
            store.clone(),
        ));

        let (trigger, edges) = edge_channel(pin.number(), config.sensor.edge_queue_capacity)
            .context("Failed to create edge queue")?;

        let detector = Arc::new(MotionDetector::new(
            config.sensor.clone(),
            pin,
            presence.clone(),
            &trigger,
            store.clone(),
            scheduler.clone(),
            events_tx,
        ));

        let cache = Arc::new(StateCache::new(config.events.state_lock_timeout()));

        let gate = notifier.map(|notifier| {
            info!("Notifications via {}", notifier.name());
            Arc::new(NotificationGate::new(
                notifier,
                config.notify.phone.clone().unwrap_or_default(),
                config.notify.cooldown(),
                format!("{}/photo", config.web.base_url()),
                store.clone(),
                clock.clone(),
            ))
        });

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            presence,
            store,
            scheduler,
            detector,
            cache,
            gate,
            clock,
            trigger,
            pending: Mutex::new(Some(Pending { edges, events: events_rx })),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            start_time: Mutex::new(None),
        })
    }

    /// Spawn the edge worker, state consumer and notification gate
    pub fn start(&self) -> Result<(), PipelineError> {
        let Pending { edges, events } = self.pending.lock().take().ok_or(PipelineError::AlreadyStarted)?;

        info!("Starting monitor node...");
        self.running.store(true, Ordering::SeqCst);
        *self.start_time.lock() = Some(Instant::now());

        let mut tasks = self.tasks.lock();

        if let Some(gate) = &self.gate {
            // Subscribe before the detector can publish anything
            let notices = self.detector.subscribe_detections();
            tasks.push(tokio::spawn(gate.clone().run(notices, self.shutdown_tx.subscribe())));
        }

        tasks.push(tokio::spawn(self.cache.clone().run(events, self.running.clone())));
        tasks.push(tokio::spawn(
            self.detector.clone().run(edges, self.shutdown_tx.subscribe()),
        ));

        info!("Monitor node started with {} task(s)", tasks.len());
        Ok(())
    }

    /// Stop every task and release the camera
    pub async fn stop(&self) {
        info!("Stopping monitor node...");
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!("Task ended abnormally: {}", e);
            }
        }

        self.detector.reset();
        if let Err(e) = self.store.deinit().await {
            debug!("Camera deinit: {}", e);
        }
        info!("Monitor node stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Producer handle for whatever delivers pin edges
    pub fn edge_trigger(&self) -> EdgeTrigger {
        self.trigger.clone()
    }

    /// Receiver that fires when the node is stopping
    pub fn shutdown_rx(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn presence(&self) -> &Arc<PresenceTracker> {
        &self.presence
    }

    pub fn store(&self) -> &Arc<CaptureStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<StateCache> {
        &self.cache
    }

    pub fn detector(&self) -> &Arc<MotionDetector> {
        &self.detector
    }

    pub fn scheduler(&self) -> &Arc<RecaptureScheduler> {
        &self.scheduler
    }

    pub fn gate(&self) -> Option<&Arc<NotificationGate>> {
        self.gate.as_ref()
    }

    pub fn clock(&self) -> &WallClock {
        &self.clock
    }

    pub fn uptime(&self) -> u64 {
        self.start_time.lock().map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }
}
