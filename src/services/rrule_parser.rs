use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl FromStr for Frequency {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DAILY" => Ok(Frequency::Daily),
            "WEEKLY" => Ok(Frequency::Weekly),
            "MONTHLY" => Ok(Frequency::Monthly),
            "YEARLY" => Ok(Frequency::Yearly),
            _ => Err(AppError::invalid_recurrence(format!("Unsupported FREQ: {s}"))),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        })
    }
}

/// A BYDAY token such as `MO`, `1MO` or `-1FR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByDayEntry {
    pub weekday: Weekday,
    /// Ordinal within the month (`1` = first, `-1` = last); only valid for MONTHLY.
    pub position: Option<i8>,
}

impl ByDayEntry {
    pub fn new(weekday: Weekday, position: Option<i8>) -> Self {
        Self { weekday, position }
    }
}

impl fmt::Display for ByDayEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(position) = self.position {
            write!(f, "{position}")?;
        }
        f.write_str(weekday_code(self.weekday))
    }
}

impl FromStr for ByDayEntry {
    type Err = AppError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let normalized = token.trim().to_uppercase();
        if normalized.len() < 2 || !normalized.is_char_boundary(normalized.len() - 2) {
            return Err(AppError::invalid_recurrence(format!(
                "Invalid BYDAY entry: {token}"
            )));
        }

        let (ordinal, code) = normalized.split_at(normalized.len() - 2);
        let weekday = weekday_from_code(code)?;
        let position = if ordinal.is_empty() {
            None
        } else {
            let value = ordinal.parse::<i8>().map_err(|_| {
                AppError::invalid_recurrence(format!("Invalid BYDAY ordinal: {token}"))
            })?;
            if value == 0 || !(-5..=5).contains(&value) {
                return Err(AppError::invalid_recurrence(format!(
                    "BYDAY ordinal must be within -5..=5 and non-zero: {token}"
                )));
            }
            Some(value)
        };

        Ok(ByDayEntry { weekday, position })
    }
}

// Serialized in RRULE token form so stored templates stay readable.
impl Serialize for ByDayEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ByDayEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn weekday_code(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

fn weekday_from_code(code: &str) -> AppResult<Weekday> {
    match code {
        "MO" => Ok(Weekday::Mon),
        "TU" => Ok(Weekday::Tue),
        "WE" => Ok(Weekday::Wed),
        "TH" => Ok(Weekday::Thu),
        "FR" => Ok(Weekday::Fri),
        "SA" => Ok(Weekday::Sat),
        "SU" => Ok(Weekday::Sun),
        _ => Err(AppError::invalid_recurrence(format!("Invalid weekday: {code}"))),
    }
}

/// Parsed RRULE subset used by recurring templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceRule {
    pub freq: Frequency,
    #[serde(default)]
    pub interval: Option<u32>,
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub by_day: Option<Vec<ByDayEntry>>,
    #[serde(default)]
    pub by_month_day: Option<Vec<i8>>,
    #[serde(default)]
    pub by_month: Option<Vec<u8>>,
}

impl RecurrenceRule {
    pub fn new(freq: Frequency) -> Self {
        Self {
            freq,
            interval: None,
            count: None,
            until: None,
            by_day: None,
            by_month_day: None,
            by_month: None,
        }
    }

    /// Effective interval, `1` when unset.
    pub fn step(&self) -> u32 {
        self.interval.unwrap_or(1)
    }

    pub fn with_interval(mut self, interval: u32) -> AppResult<Self> {
        if !(1..=999).contains(&interval) {
            return Err(AppError::invalid_recurrence(
                "INTERVAL must be between 1 and 999",
            ));
        }
        self.interval = Some(interval);
        Ok(self)
    }

    pub fn with_count(mut self, count: u32) -> AppResult<Self> {
        if !(1..=9999).contains(&count) {
            return Err(AppError::invalid_recurrence(
                "COUNT must be between 1 and 9999",
            ));
        }
        self.count = Some(count);
        Ok(self)
    }

    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_by_day(mut self, entries: Vec<ByDayEntry>) -> AppResult<Self> {
        if entries.is_empty() {
            return Err(AppError::invalid_recurrence("BYDAY cannot be empty"));
        }
        self.by_day = Some(entries);
        Ok(self)
    }

    pub fn with_by_month_day(mut self, days: Vec<i8>) -> AppResult<Self> {
        if days.is_empty() {
            return Err(AppError::invalid_recurrence("BYMONTHDAY cannot be empty"));
        }
        if let Some(bad) = days.iter().find(|d| **d == 0 || !(-31..=31).contains(*d)) {
            return Err(AppError::invalid_recurrence(format!(
                "BYMONTHDAY must be within -31..=31 and non-zero: {bad}"
            )));
        }
        self.by_month_day = Some(days);
        Ok(self)
    }

    pub fn with_by_month(mut self, months: Vec<u8>) -> AppResult<Self> {
        if months.is_empty() {
            return Err(AppError::invalid_recurrence("BYMONTH cannot be empty"));
        }
        if let Some(bad) = months.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(AppError::invalid_recurrence(format!(
                "BYMONTH must be within 1..=12: {bad}"
            )));
        }
        self.by_month = Some(months);
        Ok(self)
    }

    /// Cross-field checks that single setters cannot see.
    pub fn validate(&self) -> AppResult<()> {
        if self.count.is_some() && self.until.is_some() {
            return Err(AppError::invalid_recurrence(
                "COUNT and UNTIL are mutually exclusive",
            ));
        }

        let positional = self
            .by_day
            .as_ref()
            .is_some_and(|days| days.iter().any(|entry| entry.position.is_some()));

        match self.freq {
            Frequency::Daily => {
                if self.by_day.is_some() || self.by_month_day.is_some() || self.by_month.is_some()
                {
                    return Err(AppError::invalid_recurrence(
                        "DAILY does not accept BYDAY, BYMONTHDAY or BYMONTH",
                    ));
                }
            }
            Frequency::Weekly => {
                if self.by_month_day.is_some() || self.by_month.is_some() {
                    return Err(AppError::invalid_recurrence(
                        "WEEKLY does not accept BYMONTHDAY or BYMONTH",
                    ));
                }
                if positional {
                    return Err(AppError::invalid_recurrence(
                        "WEEKLY does not accept ordinal BYDAY entries",
                    ));
                }
            }
            Frequency::Monthly => {
                if self.by_day.is_some() && self.by_month_day.is_some() {
                    return Err(AppError::invalid_recurrence(
                        "MONTHLY accepts BYDAY or BYMONTHDAY, not both",
                    ));
                }
                if self.by_month.is_some() {
                    return Err(AppError::invalid_recurrence("MONTHLY does not accept BYMONTH"));
                }
            }
            Frequency::Yearly => {
                if positional {
                    return Err(AppError::invalid_recurrence(
                        "YEARLY does not accept ordinal BYDAY entries",
                    ));
                }
            }
        }

        Ok(())
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&RRuleParser::to_string(self))
    }
}

pub struct RRuleParser;

/// Index order of the legacy `weekly:<n>` form.
const LEGACY_WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

impl RRuleParser {
    /// Accepts an RRULE or one of the legacy shorthand forms
    /// (`daily`, `weekly:<0-6>` with 0 = Monday, `monthly:<1-31>`).
    pub fn parse_any(raw: &str) -> AppResult<RecurrenceRule> {
        let trimmed = raw.trim();
        if trimmed.contains('=') {
            Self::parse(trimmed)
        } else {
            Self::parse_legacy(trimmed)
        }
    }

    pub fn parse_legacy(raw: &str) -> AppResult<RecurrenceRule> {
        let lowered = raw.trim().to_lowercase();
        let (kind, arg) = match lowered.split_once(':') {
            Some((kind, arg)) => (kind.trim(), Some(arg.trim())),
            None => (lowered.as_str(), None),
        };

        let parse_arg = |range: std::ops::RangeInclusive<i8>| -> AppResult<i8> {
            arg.and_then(|value| value.parse::<i8>().ok())
                .filter(|value| range.contains(value))
                .ok_or_else(|| {
                    AppError::invalid_recurrence(format!("Invalid legacy recurrence: {raw}"))
                })
        };

        let rule = match (kind, arg) {
            ("daily", None) => RecurrenceRule::new(Frequency::Daily),
            ("weekly", Some(_)) => {
                let weekday = LEGACY_WEEKDAYS[parse_arg(0..=6)? as usize];
                RecurrenceRule::new(Frequency::Weekly)
                    .with_by_day(vec![ByDayEntry::new(weekday, None)])?
            }
            ("monthly", Some(_)) => {
                RecurrenceRule::new(Frequency::Monthly).with_by_month_day(vec![parse_arg(1..=31)?])?
            }
            _ => {
                return Err(AppError::invalid_recurrence(format!(
                    "Unrecognised recurrence rule: {raw}"
                )))
            }
        };
        Ok(rule)
    }

    pub fn parse(rrule: &str) -> AppResult<RecurrenceRule> {
        let body = rrule.trim();
        let body = body.strip_prefix("RRULE:").unwrap_or(body);
        if body.is_empty() {
            return Err(AppError::invalid_recurrence("RRULE cannot be empty"));
        }

        let mut params: HashMap<String, &str> = HashMap::new();
        for part in body.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                AppError::invalid_recurrence(format!("Malformed RRULE part: {part}"))
            })?;
            let key = key.trim().to_uppercase();
            if params.insert(key.clone(), value.trim()).is_some() {
                return Err(AppError::invalid_recurrence(format!(
                    "Duplicate RRULE parameter: {key}"
                )));
            }
        }

        let freq = params
            .remove("FREQ")
            .ok_or_else(|| AppError::invalid_recurrence("FREQ is required"))?
            .parse::<Frequency>()?;
        let mut rule = RecurrenceRule::new(freq);

        for (key, value) in params {
            rule = match key.as_str() {
                "INTERVAL" => rule.with_interval(parse_number(&key, value)?)?,
                "COUNT" => rule.with_count(parse_number(&key, value)?)?,
                "UNTIL" => rule.with_until(Self::parse_until(value)?),
                "BYDAY" => rule.with_by_day(
                    split_list(value)
                        .map(str::parse::<ByDayEntry>)
                        .collect::<AppResult<Vec<_>>>()?,
                )?,
                "BYMONTHDAY" => rule.with_by_month_day(
                    split_list(value)
                        .map(|v| parse_number(&key, v))
                        .collect::<AppResult<Vec<_>>>()?,
                )?,
                "BYMONTH" => rule.with_by_month(
                    split_list(value)
                        .map(|v| parse_number(&key, v))
                        .collect::<AppResult<Vec<_>>>()?,
                )?,
                // Parameters we don't expand on are ignored.
                "WKST" | "DTSTART" => rule,
                other => {
                    return Err(AppError::invalid_recurrence(format!(
                        "Unsupported RRULE parameter: {other}"
                    )))
                }
            };
        }

        rule.validate()?;
        Ok(rule)
    }

    pub fn to_string(rule: &RecurrenceRule) -> String {
        let mut parts = vec![format!("FREQ={}", rule.freq)];
        if let Some(interval) = rule.interval {
            parts.push(format!("INTERVAL={interval}"));
        }
        if let Some(count) = rule.count {
            parts.push(format!("COUNT={count}"));
        }
        if let Some(until) = rule.until {
            parts.push(format!("UNTIL={}", until.format("%Y%m%dT%H%M%SZ")));
        }
        if let Some(by_day) = &rule.by_day {
            parts.push(format!("BYDAY={}", join(by_day)));
        }
        if let Some(days) = &rule.by_month_day {
            parts.push(format!("BYMONTHDAY={}", join(days)));
        }
        if let Some(months) = &rule.by_month {
            parts.push(format!("BYMONTH={}", join(months)));
        }
        parts.join(";")
    }

    /// `YYYYMMDD` (inclusive through end of day) or `YYYYMMDDTHHMMSSZ`.
    fn parse_until(raw: &str) -> AppResult<DateTime<Utc>> {
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y%m%d") {
            let end_of_day = date
                .and_hms_opt(23, 59, 59)
                .ok_or_else(|| AppError::invalid_recurrence("Invalid UNTIL date"))?;
            return Ok(end_of_day.and_utc());
        }
        NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%SZ")
            .map(|dt| dt.and_utc())
            .map_err(|_| {
                AppError::invalid_recurrence(
                    "UNTIL must be in YYYYMMDD or YYYYMMDDTHHMMSSZ format",
                )
            })
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|v| !v.is_empty())
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> AppResult<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| AppError::invalid_recurrence(format!("Invalid {key} value: {value}")))
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
