use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::calendar::BusyInterval;
use crate::models::task::{Task, TaskStatus};
use crate::services::planning_service::PlanningRequest;
use crate::services::scheduler::ScheduleResult;

use super::{AppState, CommandResult};

const DEFAULT_USER_ID: &str = "default";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTasksPayload {
    #[serde(default)]
    pub user_id: Option<String>,
    pub tasks: Vec<Task>,
    /// Defaults to the current time.
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
    #[serde(default)]
    pub busy: Vec<BusyInterval>,
    #[serde(default)]
    pub known_statuses: HashMap<String, TaskStatus>,
}

pub fn schedule_tasks(
    state: &AppState,
    payload: ScheduleTasksPayload,
) -> CommandResult<ScheduleResult> {
    let request = PlanningRequest {
        user_id: payload
            .user_id
            .unwrap_or_else(|| DEFAULT_USER_ID.to_string()),
        tasks: payload.tasks,
        now: payload.now.unwrap_or_else(Utc::now),
        known_statuses: payload.known_statuses,
        busy: payload.busy,
    };
    Ok(state.planning().schedule_for_user(request)?)
}
