//! Status derivation.

use crate::state::SignalStatus;
use chrono::{DateTime, Utc};

/// Derive a signal's status from the current time and its active window.
///
/// Assumes `close_time > open_time`; creation-time validation guarantees it.
pub fn derive_status(
    now: DateTime<Utc>,
    open_time: DateTime<Utc>,
    close_time: DateTime<Utc>,
) -> SignalStatus {
    if now < open_time {
        SignalStatus::NotOpened
    } else if now < close_time {
        SignalStatus::Open
    } else {
        SignalStatus::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let open = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        (open, open + Duration::hours(4))
    }

    #[test]
    fn test_before_open() {
        let (open, close) = window();
        let now = open - Duration::milliseconds(1);
        assert_eq!(derive_status(now, open, close), SignalStatus::NotOpened);
    }

    #[test]
    fn test_open_boundary_is_inclusive() {
        let (open, close) = window();
        assert_eq!(derive_status(open, open, close), SignalStatus::Open);
    }

    #[test]
    fn test_close_boundary_is_closed() {
        let (open, close) = window();
        assert_eq!(derive_status(close, open, close), SignalStatus::Closed);
        let just_before = close - Duration::milliseconds(1);
        assert_eq!(derive_status(just_before, open, close), SignalStatus::Open);
    }

    #[test]
    fn test_exactly_one_status_across_sweep() {
        let (open, close) = window();
        let mut now = open - Duration::hours(1);
        let mut last_rank = 0;
        while now <= close + Duration::hours(1) {
            let status = derive_status(now, open, close);
            let expected = if now < open {
                SignalStatus::NotOpened
            } else if now < close {
                SignalStatus::Open
            } else {
                SignalStatus::Closed
            };
            assert_eq!(status, expected);
            assert!(status.rank() >= last_rank);
            last_rank = status.rank();
            now += Duration::minutes(7);
        }
    }

    #[test]
    fn test_recently_closed_scenario() {
        let now = Utc::now();
        let status = derive_status(now, now - Duration::hours(1), now - Duration::seconds(1));
        assert_eq!(status, SignalStatus::Closed);
    }

    #[test]
    fn test_future_signal_scenario() {
        let now = Utc::now();
        let status = derive_status(now, now + Duration::hours(1), now + Duration::hours(2));
        assert_eq!(status, SignalStatus::NotOpened);
    }
}
