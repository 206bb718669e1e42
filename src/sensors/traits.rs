// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/coopcam

//! Sensor traits and common types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logic level of a digital input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Low,
    High,
}

impl Level {
    pub fn from_raw(raw: u8) -> Self {
        if raw == 0 {
            Level::Low
        } else {
            Level::High
        }
    }

    pub fn as_raw(self) -> u8 {
        match self {
            Level::Low => 0,
            Level::High => 1,
        }
    }

    pub fn inverted(self) -> Self {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_raw())
    }
}

/// A single digital input line.
///
/// Reads are synchronous and infallible: a backend that can fail reports its
/// last good level instead.
pub trait InputPin: Send + Sync {
    /// Pin number
    fn number(&self) -> u32;

    /// Current level
    fn level(&self) -> Level;
}

/// Minimal token pushed by the edge producer; carries no level on purpose,
/// the worker reads the pin itself after debouncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeToken {
    pub pin: u32,
}
