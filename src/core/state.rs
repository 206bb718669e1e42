// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/coopcam

//! Externally readable snapshot of the node, fed by the event channel

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;
use tracing::{debug, info, warn};

use super::{EventReceiver, RecvOutcome, ServerEvent, ServerEventKind};
use crate::sensors::Level;

const NO_UPDATE: i64 = i64::MIN;

/// Last-known node state
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerStateSnapshot {
    pub total_detections: u64,
    pub currently_detected: bool,
    pub sensor_level: Level,
    pub has_photo: bool,
    pub last_update_time: Option<DateTime<Utc>>,
    /// Set when a reader timed out on the lock and got the mirrored values
    #[serde(default)]
    pub stale: bool,
}

impl ServerStateSnapshot {
    /// Fold one event into the snapshot. Fields the event does not
    /// describe are carried over unchanged.
    pub fn apply(mut self, event: &ServerEvent) -> Self {
        match &event.kind {
            ServerEventKind::DetectionStarted { count } => {
                self.total_detections = *count;
                self.currently_detected = event.object_detected;
                self.sensor_level = event.sensor_level;
            }
            ServerEventKind::DetectionEnded => {
                self.currently_detected = event.object_detected;
                self.sensor_level = event.sensor_level;
            }
            ServerEventKind::PhotoTaken { .. } => {
                self.has_photo = true;
            }
        }
        self.last_update_time = Some(event.timestamp);
        self.stale = false;
        self
    }
}

/// Lock-free copy of the last published snapshot
#[derive(Debug)]
struct Mirror {
    total_detections: AtomicU64,
    currently_detected: AtomicBool,
    sensor_level: AtomicU8,
    has_photo: AtomicBool,
    last_update_ms: AtomicI64,
}

impl Mirror {
    fn new() -> Self {
        Self {
            total_detections: AtomicU64::new(0),
            currently_detected: AtomicBool::new(false),
            sensor_level: AtomicU8::new(0),
            has_photo: AtomicBool::new(false),
            last_update_ms: AtomicI64::new(NO_UPDATE),
        }
    }

    fn store(&self, snap: &ServerStateSnapshot) {
        self.total_detections.store(snap.total_detections, Ordering::Release);
        self.currently_detected.store(snap.currently_detected, Ordering::Release);
        self.sensor_level.store(snap.sensor_level.as_raw(), Ordering::Release);
        self.has_photo.store(snap.has_photo, Ordering::Release);
        let ms = snap.last_update_time.map_or(NO_UPDATE, |t| t.timestamp_millis());
        self.last_update_ms.store(ms, Ordering::Release);
    }

    fn load(&self) -> ServerStateSnapshot {
        let ms = self.last_update_ms.load(Ordering::Acquire);
        let last_update_time = if ms == NO_UPDATE {
            None
        } else {
            Utc.timestamp_millis_opt(ms).single()
        };
        ServerStateSnapshot {
            total_detections: self.total_detections.load(Ordering::Acquire),
            currently_detected: self.currently_detected.load(Ordering::Acquire),
            sensor_level: Level::from_raw(self.sensor_level.load(Ordering::Acquire)),
            has_photo: self.has_photo.load(Ordering::Acquire),
            last_update_time,
            stale: true,
        }
    }
}

/// Single-writer, many-reader snapshot holder
pub struct StateCache {
    snapshot: RwLock<ServerStateSnapshot>,
    mirror: Mirror,
    lock_timeout: Duration,
    applied: AtomicU64,
    missed_writes: AtomicU64,
}

impl StateCache {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            snapshot: RwLock::new(ServerStateSnapshot::default()),
            mirror: Mirror::new(),
            lock_timeout,
            applied: AtomicU64::new(0),
            missed_writes: AtomicU64::new(0),
        }
    }

    /// Apply an event; returns false if the write lock could not be taken
    pub fn apply_event(&self, event: &ServerEvent) -> bool {
        let Some(mut guard) = self.snapshot.try_write_for(self.lock_timeout) else {
            self.missed_writes.fetch_add(1, Ordering::Relaxed);
            warn!("State cache write lock timed out, event {} not applied", event.id);
            return false;
        };
        *guard = guard.apply(event);
        self.mirror.store(&guard);
        drop(guard);

        self.applied.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Copy of the current snapshot. On lock timeout the last published
    /// values are returned with `stale` set.
    pub fn read(&self) -> ServerStateSnapshot {
        match self.snapshot.try_read_for(self.lock_timeout) {
            Some(guard) => *guard,
            None => {
                debug!("State cache read lock timed out, serving mirror");
                self.mirror.load()
            }
        }
    }

    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    pub fn missed_writes(&self) -> u64 {
        self.missed_writes.load(Ordering::Relaxed)
    }

    /// Consumer loop: drain the event channel until it closes or the
    /// running flag is cleared.
    pub async fn run(self: Arc<Self>, mut events: EventReceiver, running: Arc<AtomicBool>) {
        info!("State consumer started");
        loop {
            match events.recv().await {
                RecvOutcome::Event(event) => {
                    debug!("Applying event {} ({:?})", event.id, event.kind);
                    self.apply_event(&event);
                }
                RecvOutcome::Idle => {
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                }
                RecvOutcome::Closed => break,
            }
        }
        info!("State consumer stopped after {} events", self.applied());
    }
}
