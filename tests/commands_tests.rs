use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use goal_planner_lib::commands::recurring::{recurring_generate, RecurringGeneratePayload};
use goal_planner_lib::commands::reminders::{reminders_plan, RemindersPayload};
use goal_planner_lib::commands::schedule::{schedule_tasks, ScheduleTasksPayload};
use goal_planner_lib::commands::AppState;
use goal_planner_lib::models::calendar::BusyInterval;
use goal_planner_lib::models::reminder::ReminderIntensity;
use goal_planner_lib::models::settings::PlannerSettings;
use goal_planner_lib::services::planning_service::StaticCalendarSource;
use serde_json::json;

fn state() -> AppState {
    AppState::new(PlannerSettings::default()).expect("app state")
}

fn ts(day: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, day, h, m, 0).unwrap()
}

fn schedule_payload(value: serde_json::Value) -> ScheduleTasksPayload {
    serde_json::from_value(value).expect("schedule payload")
}

#[test]
fn schedule_command_places_tasks_from_json() {
    let payload = schedule_payload(json!({
        "now": "2025-04-30T08:00:00Z",
        "tasks": [
            { "id": "b", "title": "Second", "priority": 1, "estimatedMinutes": 60 },
            { "id": "a", "title": "First", "priority": 0, "estimatedMinutes": 60 },
            { "id": "c", "title": "Blocked", "dependencies": ["a"] }
        ]
    }));

    let result = schedule_tasks(&state(), payload).expect("schedule");
    assert_eq!(result.scheduled_ids(), vec!["a", "b"]);
    assert_eq!(result.scheduled[0].planned_start, Some(ts(1, 9, 0)));
    assert_eq!(result.scheduled[1].planned_start, Some(ts(1, 10, 15)));

    let body = serde_json::to_value(&result).expect("serialize");
    assert_eq!(body["skipped"][0]["taskId"], "c");
    assert_eq!(body["skipped"][0]["reason"]["kind"], "unmet_dependency");
    assert_eq!(body["skipped"][0]["reason"]["dependencyId"], "a");
}

#[test]
fn schedule_command_uses_registered_calendar_sources() {
    let source = StaticCalendarSource::new("google")
        .with_interval("default", BusyInterval::new(ts(1, 9, 0), ts(1, 12, 0)));
    let state = AppState::with_sources(PlannerSettings::default(), vec![Arc::new(source)])
        .expect("app state");

    let payload = schedule_payload(json!({
        "now": "2025-04-30T08:00:00Z",
        "tasks": [{ "id": "t", "title": "Review", "estimatedMinutes": 30 }]
    }));
    let result = schedule_tasks(&state, payload).expect("schedule");
    assert_eq!(result.scheduled[0].planned_start, Some(ts(1, 12, 15)));
}

#[test]
fn legacy_dependency_string_is_parsed_at_ingestion() {
    let blocked = schedule_payload(json!({
        "now": "2025-04-30T08:00:00Z",
        "tasks": [{ "id": "c", "title": "Ship", "dependencies": "a, b" }],
        "knownStatuses": { "a": "done", "b": "in_progress" }
    }));
    assert_eq!(blocked.tasks[0].dependencies, vec!["a", "b"]);

    let result = schedule_tasks(&state(), blocked).expect("schedule");
    assert!(result.scheduled.is_empty());
    let body = serde_json::to_value(&result).expect("serialize");
    assert_eq!(body["skipped"][0]["reason"]["dependencyId"], "b");

    let ready = schedule_payload(json!({
        "now": "2025-04-30T08:00:00Z",
        "tasks": [{ "id": "c", "title": "Ship", "dependencies": "a,b" }],
        "knownStatuses": { "a": "done", "b": "done" }
    }));
    let result = schedule_tasks(&state(), ready).expect("schedule");
    assert_eq!(result.scheduled_ids(), vec!["c"]);
}

#[test]
fn cycle_maps_to_circular_dependency_code() {
    let payload = schedule_payload(json!({
        "now": "2025-04-30T08:00:00Z",
        "tasks": [
            { "id": "a", "title": "A", "dependencies": ["b"] },
            { "id": "b", "title": "B", "dependencies": ["a"] }
        ]
    }));

    let err = schedule_tasks(&state(), payload).expect_err("cycle");
    assert_eq!(err.code, "CIRCULAR_DEPENDENCY");
    let cycle = err
        .details
        .as_ref()
        .and_then(|d| d["cycle"].as_array())
        .expect("cycle details");
    assert!(cycle.len() >= 2);
}

#[test]
fn recurring_command_expands_legacy_rule() {
    let payload: RecurringGeneratePayload = serde_json::from_value(json!({
        "template": {
            "id": "tpl",
            "title": "Water plants",
            "recurrenceRuleString": "weekly:3",
            "startDate": "2025-05-01",
            "estimatedMinutes": 15
        },
        "windowStart": "2025-05-01",
        "existingDates": ["2025-05-08"],
        "horizonDays": 28
    }))
    .expect("payload");

    let response = recurring_generate(&state(), payload).expect("generate");
    assert_eq!(response.rrule, "FREQ=WEEKLY;BYDAY=TH");
    let dates: Vec<String> = response
        .tasks
        .iter()
        .filter_map(|t| t.generated_date.map(|d| d.to_string()))
        .collect();
    assert_eq!(dates, vec!["2025-05-01", "2025-05-15", "2025-05-22"]);
    assert!(response
        .tasks
        .iter()
        .all(|t| t.recurrence_id.as_deref() == Some("tpl")));
}

#[test]
fn recurring_command_error_codes() {
    let bad_rule: RecurringGeneratePayload = serde_json::from_value(json!({
        "template": {
            "title": "Broken",
            "recurrenceRuleString": "FREQ=HOURLY",
            "startDate": "2025-05-01"
        }
    }))
    .expect("payload");
    let err = recurring_generate(&state(), bad_rule).expect_err("bad rule");
    assert_eq!(err.code, "INVALID_RECURRENCE");

    let blank_title: RecurringGeneratePayload = serde_json::from_value(json!({
        "template": {
            "title": "   ",
            "recurrenceRuleString": "daily",
            "startDate": "2025-05-01"
        }
    }))
    .expect("payload");
    let err = recurring_generate(&state(), blank_title).expect_err("blank title");
    assert_eq!(err.code, "VALIDATION_ERROR");
}

#[test]
fn reminders_command_orders_and_reports_unplanned() {
    let payload: RemindersPayload = serde_json::from_value(json!({
        "now": "2025-05-01T08:30:00Z",
        "tasks": [
            {
                "id": "late", "title": "Late", "priority": 2,
                "plannedStart": "2025-05-01T15:00:00Z", "plannedEnd": "2025-05-01T16:00:00Z"
            },
            {
                "id": "early", "title": "Early", "priority": 0,
                "plannedStart": "2025-05-01T09:00:00Z", "plannedEnd": "2025-05-01T09:30:00Z",
                "deadline": "2025-05-01T09:15:00Z", "reminderInterval": 10
            },
            { "id": "floating", "title": "No plan" },
            {
                "id": "finished", "title": "Done", "status": "done",
                "plannedStart": "2025-05-01T11:00:00Z", "plannedEnd": "2025-05-01T12:00:00Z"
            }
        ]
    }))
    .expect("payload");

    let response = reminders_plan(&state(), payload).expect("reminders");
    let ids: Vec<&str> = response.reminders.iter().map(|r| r.task_id.as_str()).collect();
    assert_eq!(ids, vec!["early", "late"]);
    assert_eq!(response.reminders[0].remind_at, ts(1, 8, 50));
    assert_eq!(response.reminders[0].strategy.intensity, ReminderIntensity::Urgent);
    assert!(response.reminders[0].strategy.escalation_enabled);
    assert_eq!(response.reminders[1].remind_at, ts(1, 14, 30));
    assert_eq!(response.reminders[1].strategy.intensity, ReminderIntensity::Gentle);
    assert_eq!(response.unplanned, vec!["floating"]);
}
