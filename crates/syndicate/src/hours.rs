//! Market-hours check driving the scheduler's dense/sparse cadence. A
//! weekday UTC window; holiday calendars are out of scope.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};

/// Whether `now` falls inside the configured weekday trading window.
/// `open_minute`/`close_minute` are minutes after midnight UTC; the close
/// minute is exclusive.
pub fn is_market_open(now: DateTime<Utc>, open_minute: u32, close_minute: u32) -> bool {
    match now.weekday() {
        Weekday::Sat | Weekday::Sun => return false,
        _ => {}
    }
    let minute_of_day = now.hour() * 60 + now.minute();
    minute_of_day >= open_minute && minute_of_day < close_minute
}
