use std::collections::HashSet;

use chrono::{Datelike, Duration, NaiveDate};
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::models::recurring_task::RecurringTaskTemplate;
use crate::models::task::{Task, TaskStatus};
use crate::services::rrule_parser::{ByDayEntry, Frequency, RecurrenceRule};
use crate::services::schedule_utils::WorkingHours;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpansionConfig {
    /// Days covered by one expansion, starting at the window start.
    pub horizon_days: u32,
    /// Upper bound on stubs produced per template per call.
    pub max_instances: u32,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            horizon_days: 30,
            max_instances: 1000,
        }
    }
}

/// Turns recurring templates into dated task stubs ready for scheduling.
pub struct RecurrenceExpander {
    working_hours: WorkingHours,
    config: ExpansionConfig,
}

impl RecurrenceExpander {
    pub fn new(working_hours: WorkingHours, config: ExpansionConfig) -> Self {
        Self {
            working_hours,
            config,
        }
    }

    pub fn config(&self) -> ExpansionConfig {
        self.config
    }

    /// Stubs for every occurrence in `[window_start, window_start + horizon)` whose
    /// date is not already in `existing_dates`.
    ///
    /// Each stub may start no earlier than that day's working start and is due by
    /// that day's working end.
    pub fn expand(
        &self,
        template: &RecurringTaskTemplate,
        window_start: NaiveDate,
        existing_dates: &HashSet<NaiveDate>,
    ) -> AppResult<Vec<Task>> {
        if !template.is_active {
            debug!(
                target: "app::recurrence",
                template_id = %template.id,
                "template inactive, nothing to expand"
            );
            return Ok(Vec::new());
        }

        template.recurrence_rule.validate()?;
        let window_end = window_start + Duration::days(i64::from(self.config.horizon_days));
        let dates = occurrences(
            &template.recurrence_rule,
            template.start_date,
            template.end_date,
            window_start,
            window_end,
        );

        let mut stubs = Vec::new();
        for date in dates {
            if existing_dates.contains(&date) {
                continue;
            }
            if stubs.len() >= self.config.max_instances as usize {
                warn!(
                    target: "app::recurrence",
                    template_id = %template.id,
                    max_instances = self.config.max_instances,
                    "instance cap reached, truncating expansion"
                );
                break;
            }
            stubs.push(self.stub_for(template, date));
        }

        info!(
            target: "app::recurrence",
            template_id = %template.id,
            window_start = %window_start,
            generated = stubs.len(),
            "expanded recurring template"
        );
        Ok(stubs)
    }

    fn stub_for(&self, template: &RecurringTaskTemplate, date: NaiveDate) -> Task {
        let (day_start, day_end) = self.working_hours.window_for(date);
        Task {
            id: uuid::Uuid::new_v4().to_string(),
            title: template.title.clone(),
            description: template.description.clone(),
            task_type: template.task_type.clone(),
            owner_id: template.owner_id.clone(),
            parent_id: None,
            status: TaskStatus::Todo,
            priority: template.priority,
            dependencies: Vec::new(),
            planned_start: None,
            planned_end: None,
            deadline: Some(day_end),
            earliest_start: Some(day_start),
            estimated_minutes: template.estimated_minutes,
            reminder_interval: None,
            recurrence_id: Some(template.id.clone()),
            generated_date: Some(date),
        }
    }
}

/// Occurrence dates of `rule` anchored at `anchor`, restricted to `[from, to)`.
///
/// COUNT is counted from the anchor, so occurrences before `from` still use it up.
pub fn occurrences(
    rule: &RecurrenceRule,
    anchor: NaiveDate,
    end_date: Option<NaiveDate>,
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<NaiveDate> {
    let mut last = to.pred_opt().unwrap_or(to);
    if let Some(until) = rule.until {
        last = last.min(until.date_naive());
    }
    if let Some(end) = end_date {
        last = last.min(end);
    }

    let mut dates = Vec::new();
    let mut seen = 0u32;
    let mut day = anchor;
    while day <= last {
        if matches_rule(rule, anchor, day) {
            seen += 1;
            if rule.count.is_some_and(|count| seen > count) {
                break;
            }
            if day >= from {
                dates.push(day);
            }
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    dates
}

fn matches_rule(rule: &RecurrenceRule, anchor: NaiveDate, day: NaiveDate) -> bool {
    let step = i64::from(rule.step());
    match rule.freq {
        Frequency::Daily => (day - anchor).num_days() % step == 0,
        Frequency::Weekly => {
            let weeks = (week_start(day) - week_start(anchor)).num_days() / 7;
            let weekday_ok = match &rule.by_day {
                Some(entries) => entries.iter().any(|entry| entry.weekday == day.weekday()),
                None => day.weekday() == anchor.weekday(),
            };
            weeks % step == 0 && weekday_ok
        }
        Frequency::Monthly => {
            let months = month_index(day) - month_index(anchor);
            let day_ok = if let Some(days) = &rule.by_month_day {
                days.iter().any(|d| month_day_matches(*d, day))
            } else if let Some(entries) = &rule.by_day {
                entries.iter().any(|entry| by_day_matches(entry, day))
            } else {
                day.day() == anchor.day()
            };
            months % step == 0 && day_ok
        }
        Frequency::Yearly => {
            let years = i64::from(day.year() - anchor.year());
            let has_day_filter = rule.by_month_day.is_some() || rule.by_day.is_some();
            let month_ok = match &rule.by_month {
                Some(months) => months.iter().any(|m| u32::from(*m) == day.month()),
                None if has_day_filter => true,
                None => day.month() == anchor.month(),
            };
            let day_ok = if let Some(days) = &rule.by_month_day {
                days.iter().any(|d| month_day_matches(*d, day))
            } else if let Some(entries) = &rule.by_day {
                entries.iter().any(|entry| entry.weekday == day.weekday())
            } else {
                day.day() == anchor.day()
            };
            years % step == 0 && month_ok && day_ok
        }
    }
}

fn week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(i64::from(day.weekday().num_days_from_monday()))
}

fn month_index(day: NaiveDate) -> i64 {
    i64::from(day.year()) * 12 + i64::from(day.month0())
}

fn days_in_month(day: NaiveDate) -> u32 {
    let (year, month) = if day.month() == 12 {
        (day.year() + 1, 1)
    } else {
        (day.year(), day.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(31, |last| last.day())
}

/// Positive values count from the first of the month, negative from the last.
fn month_day_matches(value: i8, day: NaiveDate) -> bool {
    let value = i64::from(value);
    let dom = i64::from(day.day());
    if value > 0 {
        dom == value
    } else {
        dom == i64::from(days_in_month(day)) + value + 1
    }
}

fn by_day_matches(entry: &ByDayEntry, day: NaiveDate) -> bool {
    if entry.weekday != day.weekday() {
        return false;
    }
    match entry.position {
        None => true,
        Some(n) if n > 0 => (day.day() - 1) / 7 + 1 == u32::from(n.unsigned_abs()),
        Some(n) => (days_in_month(day) - day.day()) / 7 + 1 == u32::from(n.unsigned_abs()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rrule_parser::RRuleParser;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Tz;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dates_for(rule: &str, anchor: NaiveDate, from: NaiveDate, days: i64) -> Vec<NaiveDate> {
        let rule = RRuleParser::parse_any(rule).unwrap();
        occurrences(&rule, anchor, None, from, from + Duration::days(days))
    }

    #[test]
    fn weekly_byday_within_window() {
        // 2025-05-05 is a Monday
        let got = dates_for("FREQ=WEEKLY;BYDAY=MO,WE", date(2025, 5, 5), date(2025, 5, 5), 14);
        assert_eq!(
            got,
            vec![date(2025, 5, 5), date(2025, 5, 7), date(2025, 5, 12), date(2025, 5, 14)]
        );
    }

    #[test]
    fn biweekly_skips_alternate_weeks() {
        let got = dates_for("FREQ=WEEKLY;INTERVAL=2", date(2025, 5, 5), date(2025, 5, 5), 28);
        assert_eq!(got, vec![date(2025, 5, 5), date(2025, 5, 19)]);
    }

    #[test]
    fn count_is_consumed_before_window() {
        let got = dates_for("FREQ=DAILY;COUNT=5", date(2025, 5, 1), date(2025, 5, 4), 30);
        assert_eq!(got, vec![date(2025, 5, 4), date(2025, 5, 5)]);
    }

    #[test]
    fn monthly_last_day_and_ordinal_weekday() {
        let last = dates_for("FREQ=MONTHLY;BYMONTHDAY=-1", date(2025, 1, 1), date(2025, 1, 1), 90);
        assert_eq!(last, vec![date(2025, 1, 31), date(2025, 2, 28), date(2025, 3, 31)]);

        let first_monday =
            dates_for("FREQ=MONTHLY;BYDAY=1MO", date(2025, 1, 1), date(2025, 1, 1), 60);
        assert_eq!(first_monday, vec![date(2025, 1, 6), date(2025, 2, 3)]);

        let last_friday =
            dates_for("FREQ=MONTHLY;BYDAY=-1FR", date(2025, 1, 1), date(2025, 1, 1), 59);
        assert_eq!(last_friday, vec![date(2025, 1, 31), date(2025, 2, 28)]);
    }

    #[test]
    fn monthly_without_filter_skips_short_months() {
        let got = dates_for("FREQ=MONTHLY", date(2025, 1, 31), date(2025, 1, 1), 90);
        assert_eq!(got, vec![date(2025, 1, 31), date(2025, 3, 31)]);
    }

    #[test]
    fn yearly_bymonth_bymonthday() {
        let got = dates_for(
            "FREQ=YEARLY;BYMONTH=1,7;BYMONTHDAY=1",
            date(2025, 1, 1),
            date(2025, 1, 1),
            400,
        );
        assert_eq!(got, vec![date(2025, 1, 1), date(2025, 7, 1), date(2026, 1, 1)]);
    }

    #[test]
    fn until_and_end_date_cap_the_series() {
        let rule = RRuleParser::parse("FREQ=DAILY;UNTIL=20250503").unwrap();
        let got = occurrences(&rule, date(2025, 5, 1), None, date(2025, 5, 1), date(2025, 6, 1));
        assert_eq!(got.len(), 3);

        let daily = RRuleParser::parse("FREQ=DAILY").unwrap();
        let got = occurrences(
            &daily,
            date(2025, 5, 1),
            Some(date(2025, 5, 2)),
            date(2025, 5, 1),
            date(2025, 6, 1),
        );
        assert_eq!(got, vec![date(2025, 5, 1), date(2025, 5, 2)]);
    }

    #[test]
    fn expand_builds_stubs_and_skips_existing_dates() {
        let hours = WorkingHours::new(9, 17, Tz::UTC).unwrap();
        let expander = RecurrenceExpander::new(
            hours,
            ExpansionConfig {
                horizon_days: 7,
                ..ExpansionConfig::default()
            },
        );
        let rule = RRuleParser::parse_any("daily").unwrap();
        let mut template = RecurringTaskTemplate::new("Stand-up".into(), rule, date(2025, 5, 1))
            .with_estimated_minutes(Some(15));
        let existing = HashSet::from([date(2025, 5, 2)]);

        let stubs = expander.expand(&template, date(2025, 5, 1), &existing).unwrap();
        assert_eq!(stubs.len(), 6);
        let first = &stubs[0];
        assert_eq!(first.recurrence_id.as_deref(), Some(template.id.as_str()));
        assert_eq!(first.generated_date, Some(date(2025, 5, 1)));
        assert_eq!(
            first.earliest_start,
            Some(Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap())
        );
        assert_eq!(
            first.deadline,
            Some(Utc.with_ymd_and_hms(2025, 5, 1, 17, 0, 0).unwrap())
        );
        assert!(!first.is_planned());
        assert!(stubs.iter().all(|t| t.generated_date != Some(date(2025, 5, 2))));

        template.deactivate();
        assert!(expander
            .expand(&template, date(2025, 5, 1), &HashSet::new())
            .unwrap()
            .is_empty());
    }
}
