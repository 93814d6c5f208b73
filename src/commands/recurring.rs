use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::recurring_task::{RecurringTaskTemplate, RecurringTaskTemplateCreate};
use crate::models::task::Task;
use crate::services::recurrence_expander::{ExpansionConfig, RecurrenceExpander};
use crate::services::schedule_utils::{self, WorkingHours};

use super::{AppState, CommandResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringGeneratePayload {
    pub template: RecurringTaskTemplateCreate,
    /// Defaults to today in the configured timezone.
    #[serde(default)]
    pub window_start: Option<NaiveDate>,
    /// Dates that already have a generated task for this template.
    #[serde(default)]
    pub existing_dates: Vec<NaiveDate>,
    #[serde(default)]
    pub horizon_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringGenerateResponse {
    pub template: RecurringTaskTemplate,
    pub rrule: String,
    pub tasks: Vec<Task>,
}

pub fn recurring_generate(
    state: &AppState,
    payload: RecurringGeneratePayload,
) -> CommandResult<RecurringGenerateResponse> {
    let settings = state.settings();
    let tz = schedule_utils::parse_timezone(&settings.timezone)?;
    let working_hours = WorkingHours::new(settings.daily_start_hour, settings.daily_end_hour, tz)?;

    let template = payload.template.into_template()?;
    let expander = RecurrenceExpander::new(
        working_hours,
        ExpansionConfig {
            horizon_days: payload
                .horizon_days
                .unwrap_or(settings.recurrence_horizon_days),
            ..ExpansionConfig::default()
        },
    );

    let window_start = payload
        .window_start
        .unwrap_or_else(|| working_hours.local_date(Utc::now()));
    let existing: HashSet<NaiveDate> = payload.existing_dates.into_iter().collect();
    let tasks = expander.expand(&template, window_start, &existing)?;

    Ok(RecurringGenerateResponse {
        rrule: template.recurrence_rule.to_string(),
        template,
        tasks,
    })
}
