//! Timestamp helpers. All coordination math in the store runs on epoch
//! milliseconds, so that is the only clock representation we carry.

/// Current time as milliseconds since the Unix epoch.
pub fn epoch_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_ms_is_monotonic_enough() {
        let a = epoch_ms();
        let b = epoch_ms();
        assert!(b >= a);
        // Sanity: after 2020, before 2100.
        assert!(a > 1_577_836_800_000);
        assert!(a < 4_102_444_800_000);
    }
}
