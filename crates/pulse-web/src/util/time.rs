use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch. Clamps to zero if the system clock
/// reports a time before the epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ms_is_monotonic_enough() {
        let a = now_ms();
        let b = now_ms();
        assert!(a > 0, "clock must be past the epoch");
        assert!(b >= a, "time must not run backwards between calls");
    }
}
