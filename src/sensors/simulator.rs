// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/coopcam

//! Presence simulator for demo/testing

use rand::prelude::*;
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

use super::{EdgeTrigger, InputPin, Level, SimulatedPin};

/// Drives a [`SimulatedPin`] through arrive/leave cycles with contact bounce,
/// pushing an edge token for every level change like an interrupt would.
pub struct SensorSimulator {
    pin: Arc<SimulatedPin>,
    trigger: EdgeTrigger,
    active_level: Level,
    rng: rand::rngs::StdRng,

    absent_ms: Range<u64>,
    present_ms: Range<u64>,
    max_bounces: u32,
}

impl SensorSimulator {
    pub fn new(pin: Arc<SimulatedPin>, trigger: EdgeTrigger, active_level: Level) -> Self {
        Self {
            pin,
            trigger,
            active_level,
            rng: rand::rngs::StdRng::from_entropy(),
            absent_ms: 5_000..20_000,
            present_ms: 1_000..8_000,
            max_bounces: 4,
        }
    }

    /// Deterministic simulator for reproducible runs
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = rand::rngs::StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_timing(mut self, absent_ms: Range<u64>, present_ms: Range<u64>) -> Self {
        self.absent_ms = absent_ms;
        self.present_ms = present_ms;
        self
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("Presence simulator driving GPIO {}", self.trigger_pin());

        loop {
            tokio::select! {
                _ = self.cycle() => {}
                _ = shutdown.recv() => {
                    info!("Presence simulator shutting down");
                    break;
                }
            }
        }
    }

    /// One absent period followed by one visit
    pub async fn cycle(&mut self) {
        let absent = self.rng.gen_range(self.absent_ms.clone());
        sleep(Duration::from_millis(absent)).await;

        debug!("Simulated object arriving");
        self.settle_to(self.active_level).await;

        let present = self.rng.gen_range(self.present_ms.clone());
        sleep(Duration::from_millis(present)).await;

        debug!("Simulated object leaving");
        self.settle_to(self.active_level.inverted()).await;
    }

    /// Bounce a few times, then hold `target`
    async fn settle_to(&mut self, target: Level) {
        let bounces = self.rng.gen_range(0..=self.max_bounces);
        for _ in 0..bounces * 2 {
            self.pin.toggle();
            self.trigger.notify();
            let gap = self.rng.gen_range(1..8);
            sleep(Duration::from_millis(gap)).await;
        }

        if self.pin.level() != target {
            self.pin.set_level(target);
            self.trigger.notify();
        }
    }

    fn trigger_pin(&self) -> u32 {
        self.pin.number()
    }
}
