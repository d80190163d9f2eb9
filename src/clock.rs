//! Time as a swappable collaborator, so state-file metadata timestamps are
//! deterministic under test.

use chrono::{DateTime, Utc};

/// Monotonic + wall-clock time source. Production code uses [`SystemClock`];
/// tests can substitute a fixed clock to make metadata timestamps
/// reproducible.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch, UTC.
    fn now_millis(&self) -> i64;

    /// ISO-8601 wall-clock string, e.g. `2026-07-31T12:00:00.000Z`.
    fn now_iso8601(&self) -> String {
        let ms = self.now_millis();
        let secs = ms.div_euclid(1000);
        let millis = ms.rem_euclid(1000) as u32;
        let dt = DateTime::<Utc>::from_timestamp(secs, millis * 1_000_000)
            .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap());
        dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }
}

/// The real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock pinned to a fixed instant, for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_round_trips_through_iso8601() {
        let clock = FixedClock(1_700_000_000_123);
        let iso = clock.now_iso8601();
        assert!(iso.ends_with('Z'));
        assert!(iso.contains('T'));
    }
}
