use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde_json::json;

use crate::error::{AppError, AppResult};

/// Minimum gap kept after each placed task and after each busy interval.
pub const BUFFER_MINUTES: i64 = 15;

const QUARTER_HOUR_SECONDS: i64 = 15 * 60;

pub fn parse_timezone(name: &str) -> AppResult<Tz> {
    name.trim().parse::<Tz>().map_err(|err| {
        AppError::validation_with_details(
            "Unknown timezone",
            json!({"value": name, "error": err.to_string()}),
        )
    })
}

pub fn add_minutes(dt: DateTime<Utc>, minutes: i64) -> AppResult<DateTime<Utc>> {
    dt.checked_add_signed(Duration::minutes(minutes))
        .ok_or_else(|| AppError::validation("Time arithmetic out of range"))
}

/// Half-open interval intersection.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Smallest quarter-hour boundary at or after `dt`.
pub fn round_up_to_quarter(dt: DateTime<Utc>) -> DateTime<Utc> {
    let truncated = dt.with_nanosecond(0).unwrap_or(dt);
    let had_fraction = truncated != dt;
    let rem = truncated.timestamp().rem_euclid(QUARTER_HOUR_SECONDS);
    if rem == 0 && !had_fraction {
        return dt;
    }
    truncated + Duration::seconds(QUARTER_HOUR_SECONDS - rem)
}

/// Resolves a wall-clock time in `tz`; DST gaps resolve to the first valid instant after.
pub fn localize(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return dt.with_timezone(&Utc);
    }
    let mut probe = naive;
    for _ in 0..4 {
        probe += Duration::minutes(30);
        if let Some(dt) = tz.from_local_datetime(&probe).earliest() {
            return dt.with_timezone(&Utc);
        }
    }
    Utc.from_utc_datetime(&naive)
}

/// The daily `[start_hour, end_hour)` window in a user's timezone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkingHours {
    pub start_hour: u32,
    pub end_hour: u32,
    pub tz: Tz,
}

impl WorkingHours {
    pub fn new(start_hour: u32, end_hour: u32, tz: Tz) -> AppResult<Self> {
        if end_hour > 24 || start_hour >= end_hour {
            return Err(AppError::validation_with_details(
                "Working hours must satisfy 0 <= start < end <= 24",
                json!({"startHour": start_hour, "endHour": end_hour}),
            ));
        }
        Ok(Self {
            start_hour,
            end_hour,
            tz,
        })
    }

    pub fn window_minutes(&self) -> i64 {
        i64::from(self.end_hour - self.start_hour) * 60
    }

    pub fn local_date(&self, dt: DateTime<Utc>) -> NaiveDate {
        dt.with_timezone(&self.tz).date_naive()
    }

    /// Absolute bounds of the working window on `date`.
    pub fn window_for(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let midnight = date.and_time(chrono::NaiveTime::MIN);
        let start = localize(self.tz, midnight + Duration::hours(i64::from(self.start_hour)));
        let end = localize(self.tz, midnight + Duration::hours(i64::from(self.end_hour)));
        (start, end)
    }

    pub fn next_day_start(&self, dt: DateTime<Utc>) -> DateTime<Utc> {
        let next = self.local_date(dt) + Duration::days(1);
        self.window_for(next).0
    }

    /// Moves `cursor` into working hours: before the window snaps to today's start,
    /// at or past the end rolls over to tomorrow's start.
    pub fn clamp(&self, cursor: DateTime<Utc>) -> DateTime<Utc> {
        let (day_start, day_end) = self.window_for(self.local_date(cursor));
        if cursor < day_start {
            day_start
        } else if cursor >= day_end {
            self.next_day_start(cursor)
        } else {
            cursor
        }
    }

    /// True when `[start, end)` sits inside the working window of `start`'s day.
    pub fn contains(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        let (day_start, day_end) = self.window_for(self.local_date(start));
        start >= day_start && end <= day_end && start < end
    }
}
