// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/coopcam

//! GPIO backends - injectable simulated pin and Linux sysfs pin

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};

use super::detector::EdgeTrigger;
use super::{InputPin, Level};

/// Pin whose level is set in software. Used by demo mode and tests.
pub struct SimulatedPin {
    number: u32,
    level: AtomicU8,
}

impl SimulatedPin {
    pub fn new(number: u32, initial: Level) -> Self {
        Self {
            number,
            level: AtomicU8::new(initial.as_raw()),
        }
    }

    pub fn set_level(&self, level: Level) {
        self.level.store(level.as_raw(), Ordering::SeqCst);
    }

    /// Flip the level and return the new one
    pub fn toggle(&self) -> Level {
        let previous = self.level.fetch_xor(1, Ordering::SeqCst);
        Level::from_raw(previous ^ 1)
    }
}

impl InputPin for SimulatedPin {
    fn number(&self) -> u32 {
        self.number
    }

    fn level(&self) -> Level {
        Level::from_raw(self.level.load(Ordering::SeqCst))
    }
}

/// Pin exported through `/sys/class/gpio/gpioN/value`
pub struct SysfsPin {
    number: u32,
    value_path: PathBuf,
    last: AtomicU8,
}

impl SysfsPin {
    pub fn new(number: u32, value_path: PathBuf) -> Self {
        Self {
            number,
            value_path,
            last: AtomicU8::new(0),
        }
    }

    /// Default sysfs value path for a pin number
    pub fn default_path(number: u32) -> PathBuf {
        PathBuf::from(format!("/sys/class/gpio/gpio{}/value", number))
    }
}

impl InputPin for SysfsPin {
    fn number(&self) -> u32 {
        self.number
    }

    fn level(&self) -> Level {
        match std::fs::read_to_string(&self.value_path) {
            Ok(text) => {
                let level = if text.trim() == "0" { Level::Low } else { Level::High };
                self.last.store(level.as_raw(), Ordering::Relaxed);
                level
            }
            Err(e) => {
                debug!("GPIO {} read failed ({}), using last level", self.number, e);
                Level::from_raw(self.last.load(Ordering::Relaxed))
            }
        }
    }
}

/// Software edge source for pins without interrupt support: samples the
/// level and pushes an edge token on every change.
pub async fn poll_edges(
    pin: Arc<dyn InputPin>,
    trigger: EdgeTrigger,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!("Polling GPIO {} for edges every {:?}", pin.number(), period);

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut previous = pin.level();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let level = pin.level();
                if level != previous {
                    previous = level;
                    trigger.notify();
                }
            }
            _ = shutdown.recv() => {
                info!("Edge poller for GPIO {} shutting down", pin.number());
                break;
            }
        }
    }
}
