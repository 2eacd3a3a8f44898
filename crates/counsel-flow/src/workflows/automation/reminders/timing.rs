use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc};

use super::{Frequency, ReminderTiming};

/// Whether a reminder with this timing should fire at `now`. All times are UTC.
pub fn is_due(
    timing: &ReminderTiming,
    last_triggered: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window_minutes: u32,
) -> bool {
    let today = now.date_naive();
    let fired_today = last_triggered.is_some_and(|last| last.date_naive() == today);

    match timing.frequency {
        Frequency::Once => last_triggered.is_none(),
        Frequency::Daily => in_window(timing.time_of_day, now, window_minutes) && !fired_today,
        Frequency::Weekly => {
            let day_ok = timing.days_of_week.is_empty() || timing.days_of_week.contains(&now.weekday());
            let fired_this_week =
                last_triggered.is_some_and(|last| last.iso_week() == now.iso_week());
            day_ok && in_window(timing.time_of_day, now, window_minutes) && !fired_this_week
        }
        Frequency::OnDate => {
            timing.specific_date == Some(today)
                && in_window(timing.time_of_day, now, window_minutes)
                && !fired_today
        }
    }
}

/// `[time_of_day, time_of_day + window)`, clipped at midnight. No time means any time.
fn in_window(time_of_day: Option<NaiveTime>, now: DateTime<Utc>, window_minutes: u32) -> bool {
    let Some(start) = time_of_day else {
        return true;
    };
    let now_secs = i64::from(now.time().num_seconds_from_midnight());
    let start_secs = i64::from(start.num_seconds_from_midnight());
    let elapsed = now_secs - start_secs;
    elapsed >= 0 && elapsed < i64::from(window_minutes) * 60
}
