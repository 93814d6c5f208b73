use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::reminder::PlannedReminder;
use crate::models::task::Task;

use super::{AppState, CommandResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemindersPayload {
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RemindersResponse {
    pub reminders: Vec<PlannedReminder>,
    /// Tasks without a plan, for which no reminder can be computed.
    pub unplanned: Vec<String>,
}

pub fn reminders_plan(
    state: &AppState,
    payload: RemindersPayload,
) -> CommandResult<RemindersResponse> {
    let planner = state.reminders();
    let now = payload.now.unwrap_or_else(Utc::now);

    let mut response = RemindersResponse::default();
    for task in &payload.tasks {
        if task.status.is_closed() {
            continue;
        }
        match planner.plan(task, now) {
            Some(reminder) => response.reminders.push(reminder),
            None => response.unplanned.push(task.id.clone()),
        }
    }
    response.reminders.sort_by(|a, b| a.remind_at.cmp(&b.remind_at));
    Ok(response)
}
