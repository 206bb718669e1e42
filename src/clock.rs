// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/coopcam

//! Wall clock for human-readable timestamps

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use chrono::{DateTime, FixedOffset, Offset, TimeZone, Utc};
use tracing::warn;

/// `DD/MM/YYYY H:MM AM|PM`
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %-I:%M %p";

pub const UNSYNCED_TEXT: &str = "No time sync";

/// Fixed-offset local clock with a synchronisation flag
#[derive(Debug, Clone)]
pub struct WallClock {
    offset: FixedOffset,
    synced: Arc<AtomicBool>,
}

impl WallClock {
    pub fn new(utc_offset_minutes: i32) -> Self {
        let offset = utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| {
                warn!("UTC offset of {} minutes is out of range, using UTC", utc_offset_minutes);
                Utc.fix()
            });
        Self {
            offset,
            synced: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn mark_synced(&self) {
        self.synced.store(true, Ordering::SeqCst);
    }

    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    /// Current local time, or a placeholder before the clock is synced
    pub fn formatted_now(&self) -> String {
        if !self.is_synced() {
            return UNSYNCED_TEXT.to_string();
        }
        format_timestamp(&self.now())
    }
}

pub fn format_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_afternoon_and_morning() {
        let offset = FixedOffset::east_opt(0).unwrap();
        let afternoon = offset.with_ymd_and_hms(2024, 3, 7, 15, 4, 0).unwrap();
        assert_eq!(format_timestamp(&afternoon), "07/03/2024 3:04 PM");

        let morning = offset.with_ymd_and_hms(2024, 12, 25, 9, 30, 0).unwrap();
        assert_eq!(format_timestamp(&morning), "25/12/2024 9:30 AM");

        let midnight = offset.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();
        assert_eq!(format_timestamp(&midnight), "01/01/2024 12:05 AM");
    }

    #[test]
    fn test_offset_is_applied() {
        let clock = WallClock::new(-300);
        let utc = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let local = utc.with_timezone(&clock.offset());
        assert_eq!(format_timestamp(&local), "01/06/2024 7:00 AM");
    }

    #[test]
    fn test_unsynced_placeholder() {
        let clock = WallClock::new(0);
        assert_eq!(clock.formatted_now(), UNSYNCED_TEXT);
        clock.mark_synced();
        assert_ne!(clock.formatted_now(), UNSYNCED_TEXT);
    }

    #[test]
    fn test_out_of_range_offset_falls_back_to_utc() {
        let clock = WallClock::new(24 * 60 * 2);
        assert_eq!(clock.offset().local_minus_utc(), 0);
        assert_eq!(WallClock::new(i32::MIN).offset().local_minus_utc(), 0);
        assert_eq!(WallClock::new(i32::MAX).offset().local_minus_utc(), 0);
    }
}
