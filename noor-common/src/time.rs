//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Whether a stored deadline has passed at `at`
///
/// A session without a deadline never expires.
pub fn is_past(deadline: Option<DateTime<Utc>>, at: DateTime<Utc>) -> bool {
    deadline.map(|d| d <= at).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_is_past_without_deadline() {
        assert!(!is_past(None, now()));
    }

    #[test]
    fn test_is_past_boundaries() {
        let at = now();
        assert!(is_past(Some(at - Duration::seconds(1)), at));
        assert!(is_past(Some(at), at));
        assert!(!is_past(Some(at + Duration::seconds(1)), at));
    }
}
