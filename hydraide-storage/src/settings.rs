use std::time::Duration;

use hydraide_base::{invalid_argument, Result};
use serde::{Deserialize, Serialize};

/// Default flush backoff parameters (spec §9's open question, resolved
/// here with concrete numbers exposed as configuration rather than left
/// unspecified).
pub const DEFAULT_FLUSH_BACKOFF_CAP: Duration = Duration::from_secs(60);
pub const DEFAULT_READ_ONLY_AFTER_FAILURES: u32 = 5;

/// Per-pattern configuration snapshot a Swamp is created with (spec §3's
/// "Settings snapshot").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SwampSettings {
    /// If true, the Swamp is never persisted to disk; it discards its
    /// Treasures on close (spec §4.E "idle close").
    pub is_in_memory: bool,
    pub close_after_idle: Duration,
    pub write_interval: Duration,
    pub max_file_size: u64,
    pub read_only_after_failures: u32,
}

impl SwampSettings {
    pub fn new(
        is_in_memory: bool,
        close_after_idle: Duration,
        write_interval: Duration,
        max_file_size: u64,
    ) -> Result<Self> {
        if !is_in_memory && close_after_idle.is_zero() {
            // See spec §9: "closeAfterIdle=0" is ambiguous for persistent
            // Swamps (never expire vs. expire immediately); we reject it
            // rather than guess.
            return Err(invalid_argument(
                "close_after_idle must be > 0 for a persistent swamp pattern",
            ));
        }
        if write_interval < Duration::from_secs(1) {
            return Err(invalid_argument("write_interval must be >= 1s"));
        }
        if max_file_size == 0 {
            return Err(invalid_argument("max_file_size must be > 0"));
        }
        Ok(SwampSettings {
            is_in_memory,
            close_after_idle,
            write_interval,
            max_file_size,
            read_only_after_failures: DEFAULT_READ_ONLY_AFTER_FAILURES,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn persistent_pattern_rejects_zero_close_after_idle() {
        let r = SwampSettings::new(false, Duration::ZERO, Duration::from_secs(1), 65536);
        assert!(r.is_err());
    }

    #[test]
    fn in_memory_pattern_allows_zero_close_after_idle_meaning_immediate() {
        let s = SwampSettings::new(true, Duration::ZERO, Duration::from_secs(1), 65536).unwrap();
        assert!(s.close_after_idle.is_zero());
    }

    #[test]
    fn write_interval_below_one_second_is_rejected() {
        let r = SwampSettings::new(true, Duration::ZERO, Duration::from_millis(500), 65536);
        assert!(r.is_err());
    }

    #[test]
    fn write_interval_of_exactly_one_second_is_accepted() {
        let s = SwampSettings::new(true, Duration::ZERO, Duration::from_secs(1), 65536).unwrap();
        assert_eq!(s.write_interval, Duration::from_secs(1));
    }
}
