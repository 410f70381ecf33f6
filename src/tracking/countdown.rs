use chrono::{TimeZone, Utc};
use serde::Serialize;

/// Fixed recompute cadence for the countdown tick. The target timestamp is
/// never mutated by ticks, only `now` advances.
pub const COUNTDOWN_TICK_MS: u64 = 60_000;

const MS_PER_MINUTE: i64 = 60_000;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Countdown {
    pub minutes_remaining: Option<i64>,
    pub display_time: Option<String>,
    pub is_overdue: bool,
}

impl Countdown {
    pub fn inert() -> Self {
        Self {
            minutes_remaining: None,
            display_time: None,
            is_overdue: false,
        }
    }
}

/// Minutes left until the target, floored, clamped at zero. An absent target
/// (including one that failed timestamp parsing upstream) yields the inert
/// countdown.
pub fn compute_remaining(target_ms: Option<i64>, now_ms: i64) -> Countdown {
    let Some(target_ms) = target_ms else {
        return Countdown::inert();
    };

    let diff_ms = target_ms.saturating_sub(now_ms);
    Countdown {
        minutes_remaining: Some(diff_ms.div_euclid(MS_PER_MINUTE).max(0)),
        display_time: format_display_time(target_ms),
        is_overdue: diff_ms < 0,
    }
}

fn format_display_time(target_ms: i64) -> Option<String> {
    match Utc.timestamp_millis_opt(target_ms) {
        chrono::LocalResult::Single(datetime) => Some(datetime.format("%H:%M").to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW_MS: i64 = 1_717_243_200_000; // 2024-06-01T12:00:00Z

    #[test]
    fn twelve_minutes_out_is_not_overdue() {
        let countdown = compute_remaining(Some(NOW_MS + 12 * MS_PER_MINUTE), NOW_MS);

        assert_eq!(countdown.minutes_remaining, Some(12));
        assert!(!countdown.is_overdue);
        assert_eq!(countdown.display_time.as_deref(), Some("12:12"));
    }

    #[test]
    fn partial_minute_floors_down() {
        let countdown = compute_remaining(Some(NOW_MS + 90_000), NOW_MS);
        assert_eq!(countdown.minutes_remaining, Some(1));
        assert!(!countdown.is_overdue);
    }

    #[test]
    fn exact_target_time_is_zero_and_not_overdue() {
        let countdown = compute_remaining(Some(NOW_MS), NOW_MS);
        assert_eq!(countdown.minutes_remaining, Some(0));
        assert!(!countdown.is_overdue);
    }

    #[test]
    fn past_target_clamps_to_zero_and_flags_overdue() {
        let countdown = compute_remaining(Some(NOW_MS - MS_PER_MINUTE), NOW_MS);
        assert_eq!(countdown.minutes_remaining, Some(0));
        assert!(countdown.is_overdue);

        let barely = compute_remaining(Some(NOW_MS - 1), NOW_MS);
        assert_eq!(barely.minutes_remaining, Some(0));
        assert!(barely.is_overdue);
    }

    #[test]
    fn tick_recomputes_from_unchanged_target() {
        let target = Some(NOW_MS + 12 * MS_PER_MINUTE);

        let before = compute_remaining(target, NOW_MS);
        let after_tick = compute_remaining(target, NOW_MS + 13 * MS_PER_MINUTE);

        assert_eq!(before.minutes_remaining, Some(12));
        assert_eq!(after_tick.minutes_remaining, Some(0));
        assert!(after_tick.is_overdue);
        assert_eq!(before.display_time, after_tick.display_time);
    }

    #[test]
    fn absent_target_is_inert() {
        let countdown = compute_remaining(None, NOW_MS);
        assert_eq!(countdown, Countdown::inert());
    }
}
