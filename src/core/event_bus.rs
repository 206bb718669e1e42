// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/coopcam

//! Event fan-out between producers (detector, capture store) and the state
//! consumer. Delivery is best effort: a producer waits a bounded time for
//! queue space and then drops the event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use crate::camera::CaptureReason;
use crate::config::EventConfig;
use crate::error::PipelineError;
use crate::sensors::{Level, PresenceTracker};

/// Event payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEventKind {
    DetectionStarted { count: u64 },
    DetectionEnded,
    PhotoTaken { size: usize, reason: CaptureReason },
}

/// Event plus the presence snapshot taken when it was emitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEvent {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub object_detected: bool,
    pub sensor_level: Level,
    pub kind: ServerEventKind,
}

/// Outcome of one bounded receive
#[derive(Debug)]
pub enum RecvOutcome {
    Event(ServerEvent),
    /// Timed out with nothing queued
    Idle,
    /// Every sender is gone
    Closed,
}

pub struct EventChannel;

impl EventChannel {
    pub fn new(
        config: &EventConfig,
        presence: Arc<PresenceTracker>,
    ) -> Result<(EventSender, EventReceiver), PipelineError> {
        if config.capacity == 0 {
            return Err(PipelineError::QueueCreation {
                name: "event",
                capacity: config.capacity,
            });
        }
        let (tx, rx) = mpsc::channel(config.capacity);

        let sender = EventSender {
            tx,
            presence,
            send_timeout: config.send_timeout(),
            counter: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
        };
        let receiver = EventReceiver {
            rx,
            recv_timeout: config.recv_timeout(),
        };
        Ok((sender, receiver))
    }
}

/// Producer handle; cheap to clone
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<ServerEvent>,
    presence: Arc<PresenceTracker>,
    send_timeout: Duration,
    counter: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    /// Stamp and enqueue an event; returns false if it was dropped
    pub async fn emit(&self, kind: ServerEventKind) -> bool {
        let event = ServerEvent {
            id: self.counter.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            object_detected: self.presence.is_present(),
            sensor_level: self.presence.last_level(),
            kind,
        };

        match self.tx.send_timeout(event, self.send_timeout).await {
            Ok(()) => {
                debug!("Event queued for state consumer");
                true
            }
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Could not deliver event to state consumer: {}", e);
                false
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer handle
pub struct EventReceiver {
    rx: mpsc::Receiver<ServerEvent>,
    recv_timeout: Duration,
}

impl EventReceiver {
    /// Wait up to the configured receive timeout for the next event
    pub async fn recv(&mut self) -> RecvOutcome {
        match timeout(self.recv_timeout, self.rx.recv()).await {
            Ok(Some(event)) => RecvOutcome::Event(event),
            Ok(None) => RecvOutcome::Closed,
            Err(_) => RecvOutcome::Idle,
        }
    }
}
