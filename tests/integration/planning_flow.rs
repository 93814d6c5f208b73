use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use goal_planner_lib::models::calendar::BusyInterval;
use goal_planner_lib::models::recurring_task::RecurringTaskTemplateCreate;
use goal_planner_lib::models::settings::{PlannerSettings, SchedulingStrategy};
use goal_planner_lib::models::task::{Task, TaskStatus};
use goal_planner_lib::services::planning_service::{
    PlanningRequest, PlanningService, StaticCalendarSource,
};
use goal_planner_lib::services::recurrence_expander::{ExpansionConfig, RecurrenceExpander};
use goal_planner_lib::services::reminder_planner::ReminderPlanner;
use goal_planner_lib::services::schedule_utils::{self, WorkingHours};

#[test]
fn recurring_stubs_flow_through_scheduler_and_reminders() {
    let settings = PlannerSettings {
        timezone: "Europe/Berlin".into(),
        ..PlannerSettings::default()
    };
    let tz = schedule_utils::parse_timezone(&settings.timezone).expect("tz");
    let hours = WorkingHours::new(settings.daily_start_hour, settings.daily_end_hour, tz)
        .expect("working hours");

    // Tuesday 2025-05-06, 06:00 UTC
    let now = Utc.with_ymd_and_hms(2025, 5, 6, 6, 0, 0).unwrap();
    let today = hours.local_date(now);

    let template = RecurringTaskTemplateCreate {
        id: Some("standup".into()),
        owner_id: Some("alice".into()),
        title: "Stand-up notes".into(),
        description: None,
        recurrence_rule_string: "FREQ=WEEKLY;BYDAY=MO,WE,FR".into(),
        start_date: NaiveDate::from_ymd_opt(2025, 5, 5).expect("date"),
        end_date: None,
        priority: Some(0),
        estimated_minutes: Some(30),
        task_type: None,
    }
    .into_template()
    .expect("template");

    let stubs = RecurrenceExpander::new(
        hours,
        ExpansionConfig {
            horizon_days: 7,
            ..ExpansionConfig::default()
        },
    )
    .expand(&template, today, &HashSet::new())
    .expect("expand");
    // Wed 7, Fri 9, Mon 12
    assert_eq!(stubs.len(), 3);

    let calendar = StaticCalendarSource::new("google").with_interval(
        "alice",
        BusyInterval::new(
            Utc.with_ymd_and_hms(2025, 5, 7, 7, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 5, 7, 9, 0, 0).unwrap(),
        )
        .with_provider("google"),
    );
    let service = PlanningService::new(settings.clone())
        .expect("planning service")
        .with_source(Arc::new(calendar));

    let mut tasks = stubs.clone();
    tasks.push(
        Task::new("report", "Write quarterly report")
            .with_estimated_minutes(120)
            .with_priority(1),
    );
    tasks.push(
        Task::new("publish", "Publish report")
            .with_dependencies(["report"])
            .with_estimated_minutes(30),
    );

    let result = service
        .schedule_for_user(PlanningRequest {
            user_id: "alice".into(),
            tasks,
            now,
            known_statuses: Default::default(),
            busy: Vec::new(),
        })
        .expect("schedule");

    // The dependent waits for its prerequisite to be done.
    assert!(!result.scheduled_ids().contains(&"publish"));
    assert_eq!(result.scheduled.len(), 4);

    for task in &result.scheduled {
        let start = task.planned_start.expect("start");
        let end = task.planned_end.expect("end");
        assert!(hours.contains(start, end));
        if let Some(earliest) = task.earliest_start {
            assert!(start >= earliest);
        }
        if task.recurrence_id.is_some() {
            assert!(end <= task.deadline.expect("deadline"));
        }
    }

    let wednesday = result
        .scheduled
        .iter()
        .find(|t| t.generated_date == NaiveDate::from_ymd_opt(2025, 5, 7))
        .expect("wednesday stub");
    // Busy 09:00-11:00 local, so the stub starts after the buffer.
    assert!(wednesday.planned_start.expect("start") >= Utc.with_ymd_and_hms(2025, 5, 7, 9, 15, 0).unwrap());

    let reminders = ReminderPlanner::from_settings(&settings);
    for task in &result.scheduled {
        let remind_at = reminders.reminder_at(task).expect("reminder");
        assert_eq!(
            task.planned_start.expect("start") - remind_at,
            Duration::minutes(settings.default_reminder_minutes)
        );
    }

    // A second run after the prerequisite is done picks up the dependent.
    let mut done = result.scheduled.clone();
    for task in &mut done {
        if task.id == "report" {
            task.status = TaskStatus::Done;
        }
    }
    let follow_up = service
        .schedule_for_user(PlanningRequest {
            user_id: "alice".into(),
            tasks: vec![Task::new("publish", "Publish report")
                .with_dependencies(["report"])
                .with_estimated_minutes(30)],
            now,
            known_statuses: done.iter().map(|t| (t.id.clone(), t.status)).collect(),
            busy: Vec::new(),
        })
        .expect("follow-up");
    assert_eq!(follow_up.scheduled_ids(), vec!["publish"]);
}

#[test]
fn best_of_window_service_respects_request_busy_time() {
    let settings = PlannerSettings {
        strategy: SchedulingStrategy::BestOfWindow,
        ..PlannerSettings::default()
    };
    let service = PlanningService::new(settings).expect("planning service");
    let now = Utc.with_ymd_and_hms(2025, 4, 30, 8, 0, 0).unwrap();
    let busy_day = BusyInterval::new(
        Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2025, 5, 2, 0, 0, 0).unwrap(),
    );

    let result = service
        .schedule_for_user(PlanningRequest {
            user_id: "bob".into(),
            tasks: vec![Task::new("t", "Plan sprint").with_estimated_minutes(45)],
            now,
            known_statuses: Default::default(),
            busy: vec![busy_day],
        })
        .expect("schedule");

    assert_eq!(
        result.scheduled[0].planned_start,
        Some(Utc.with_ymd_and_hms(2025, 5, 2, 9, 0, 0).unwrap())
    );
}
