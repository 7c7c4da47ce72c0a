use time::{Duration, OffsetDateTime};

use crate::storage::{Signal, SignalResult};

/// Trailing window used for the daily average.
pub const WINDOW_DAYS: i64 = 30;

/// Derived counters of a statistics snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub total: i32,
    pub win_count: i32,
    pub loss_count: i32,
    pub daily_average: i32,
}

/// Signals created strictly after this instant count towards the daily average.
pub fn window_start(now: OffsetDateTime) -> OffsetDateTime {
    now - Duration::days(WINDOW_DAYS)
}

/// `ceil(recent / WINDOW_DAYS)`.
pub fn daily_average(recent: i64) -> i32 {
    let recent = recent.max(0);
    clamp_count((recent + WINDOW_DAYS - 1) / WINDOW_DAYS)
}

pub(crate) fn clamp_count(n: i64) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// Counts over the full signal collection as seen at `now`.
pub fn aggregate<'a, I>(signals: I, now: OffsetDateTime) -> Counters
where
    I: IntoIterator<Item = &'a Signal>,
{
    let since = window_start(now);
    let (mut total, mut wins, mut losses, mut recent) = (0i64, 0i64, 0i64, 0i64);

    for s in signals {
        total += 1;
        match s.result {
            Some(SignalResult::Win) => wins += 1,
            Some(SignalResult::Loss) => losses += 1,
            None => {}
        }
        if s.created_at > since {
            recent += 1;
        }
    }

    Counters {
        total: clamp_count(total),
        win_count: clamp_count(wins),
        loss_count: clamp_count(losses),
        daily_average: daily_average(recent),
    }
}
