use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::calendar::{BusyInterval, ProviderBusyBatch};
use crate::models::settings::PlannerSettings;
use crate::models::task::{Task, TaskStatus};
use crate::services::busy_set::BusySet;
use crate::services::schedule_utils;
use crate::services::scheduler::{ScheduleResult, Scheduler, SchedulingContext};

/// Provider label used for busy intervals supplied with the request itself.
pub const REQUEST_PROVIDER: &str = "request";

/// A calendar-sync collaborator that can report a user's busy time.
pub trait CalendarSource: Send + Sync {
    fn provider(&self) -> &str;

    /// Intervals intersecting `[from, to)`.
    fn busy_intervals(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<BusyInterval>>;
}

/// In-memory source keyed by user id.
#[derive(Debug, Clone, Default)]
pub struct StaticCalendarSource {
    provider: String,
    intervals: HashMap<String, Vec<BusyInterval>>,
}

impl StaticCalendarSource {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            intervals: HashMap::new(),
        }
    }

    pub fn with_interval(mut self, user_id: impl Into<String>, interval: BusyInterval) -> Self {
        self.add(user_id, interval);
        self
    }

    pub fn add(&mut self, user_id: impl Into<String>, interval: BusyInterval) {
        self.intervals
            .entry(user_id.into())
            .or_default()
            .push(interval);
    }
}

impl CalendarSource for StaticCalendarSource {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn busy_intervals(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<BusyInterval>> {
        Ok(self
            .intervals
            .get(user_id)
            .map(|all| {
                all.iter()
                    .filter(|interval| interval.overlaps(from, to))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningRequest {
    pub user_id: String,
    pub tasks: Vec<Task>,
    pub now: DateTime<Utc>,
    #[serde(default)]
    pub known_statuses: HashMap<String, TaskStatus>,
    /// Extra busy time supplied by the caller, merged with every calendar source.
    #[serde(default)]
    pub busy: Vec<BusyInterval>,
}

/// Runs the scheduler per user, serialising runs for the same user.
pub struct PlanningService {
    settings: PlannerSettings,
    scheduler: Scheduler,
    sources: Vec<Arc<dyn CalendarSource>>,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PlanningService {
    pub fn new(settings: PlannerSettings) -> AppResult<Self> {
        let scheduler = Scheduler::from_settings(&settings)?;
        Ok(Self {
            settings,
            scheduler,
            sources: Vec::new(),
            user_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_source(mut self, source: Arc<dyn CalendarSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    pub fn schedule_for_user(&self, request: PlanningRequest) -> AppResult<ScheduleResult> {
        let lock = self.user_lock(&request.user_id)?;
        let _guard = lock
            .lock()
            .map_err(|_| AppError::other("planning lock poisoned"))?;

        let tz = schedule_utils::parse_timezone(&self.settings.timezone)?;
        let ctx = SchedulingContext::new(
            self.settings.daily_start_hour,
            self.settings.daily_end_hour,
            tz,
            request.now,
        )?
        .with_known_statuses(request.known_statuses);
        let busy_window_end = self.scheduler.busy_horizon(&request.tasks, &ctx)?;

        let mut batches = Vec::with_capacity(self.sources.len() + 1);
        for source in &self.sources {
            let intervals =
                source.busy_intervals(&request.user_id, request.now, busy_window_end)?;
            debug!(
                target: "app::planning",
                user_id = %request.user_id,
                provider = source.provider(),
                count = intervals.len(),
                "busy intervals fetched"
            );
            batches.push(ProviderBusyBatch {
                provider: source.provider().to_string(),
                intervals,
            });
        }
        if !request.busy.is_empty() {
            batches.push(ProviderBusyBatch {
                provider: REQUEST_PROVIDER.to_string(),
                intervals: request.busy,
            });
        }

        let mut ctx = ctx.with_busy(BusySet::from_sources(batches)?);
        if !self.sources.is_empty() {
            ctx = ctx.with_busy_until(busy_window_end);
        }

        let result = self.scheduler.schedule(&request.tasks, &ctx)?;
        info!(
            target: "app::planning",
            user_id = %request.user_id,
            scheduled = result.scheduled.len(),
            skipped = result.skipped.len(),
            "planning run complete"
        );
        Ok(result)
    }

    fn user_lock(&self, user_id: &str) -> AppResult<Arc<Mutex<()>>> {
        let mut locks = self
            .user_locks
            .lock()
            .map_err(|_| AppError::other("planning lock table poisoned"))?;
        Ok(Arc::clone(locks.entry(user_id.to_string()).or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::thread;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 30, 8, 0, 0).unwrap()
    }

    fn may1(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, h, 0, 0).unwrap()
    }

    fn request(user: &str, tasks: Vec<Task>) -> PlanningRequest {
        PlanningRequest {
            user_id: user.to_string(),
            tasks,
            now: now(),
            known_statuses: HashMap::new(),
            busy: Vec::new(),
        }
    }

    #[test]
    fn calendar_sources_block_slots_for_their_user_only() {
        let source = StaticCalendarSource::new("google")
            .with_interval("alice", BusyInterval::new(may1(9), may1(12)));
        let service = PlanningService::new(PlannerSettings::default())
            .unwrap()
            .with_source(Arc::new(source));
        let task = Task::new("t", "T").with_estimated_minutes(60);

        let alice = service
            .schedule_for_user(request("alice", vec![task.clone()]))
            .unwrap();
        let bob = service.schedule_for_user(request("bob", vec![task])).unwrap();

        assert_eq!(
            alice.scheduled[0].planned_start,
            Some(Utc.with_ymd_and_hms(2025, 5, 1, 12, 15, 0).unwrap())
        );
        assert_eq!(bob.scheduled[0].planned_start, Some(may1(9)));
    }

    #[test]
    fn calendar_events_near_a_far_earliest_start_are_respected() {
        let day = |h: u32| Utc.with_ymd_and_hms(2025, 7, 9, h, 0, 0).unwrap();
        let source = StaticCalendarSource::new("google")
            .with_interval("alice", BusyInterval::new(day(9), day(12)));
        let service = PlanningService::new(PlannerSettings::default())
            .unwrap()
            .with_source(Arc::new(source));
        let task = Task::new("t", "T")
            .with_estimated_minutes(60)
            .with_earliest_start(day(9));

        let result = service.schedule_for_user(request("alice", vec![task])).unwrap();
        assert_eq!(
            result.scheduled[0].planned_start,
            Some(Utc.with_ymd_and_hms(2025, 7, 9, 12, 15, 0).unwrap())
        );
    }

    #[test]
    fn long_batch_sees_events_beyond_the_search_window() {
        let settings = PlannerSettings {
            max_search_days: 2,
            look_ahead_days: 1,
            ..PlannerSettings::default()
        };
        let may8 = |h: u32| Utc.with_ymd_and_hms(2025, 5, 8, h, 0, 0).unwrap();
        let source = StaticCalendarSource::new("outlook")
            .with_interval("alice", BusyInterval::new(may8(9), may8(17)));
        let service = PlanningService::new(settings)
            .unwrap()
            .with_source(Arc::new(source));
        // One four-hour task per working day.
        let tasks: Vec<Task> = (0..10)
            .map(|i| Task::new(format!("t{i}"), "Block").with_estimated_minutes(240))
            .collect();

        let result = service.schedule_for_user(request("alice", tasks)).unwrap();
        assert_eq!(result.scheduled.len(), 10);
        for task in &result.scheduled {
            let start = task.planned_start.unwrap();
            let end = task.planned_end.unwrap();
            assert!(!schedule_utils::overlaps(start, end, may8(9), may8(17)));
        }
        assert_eq!(
            result.scheduled[7].planned_start,
            Some(Utc.with_ymd_and_hms(2025, 5, 9, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn request_busy_intervals_are_merged() {
        let service = PlanningService::new(PlannerSettings::default()).unwrap();
        let mut req = request("alice", vec![Task::new("t", "T").with_estimated_minutes(30)]);
        req.busy = vec![BusyInterval::new(may1(9), may1(10))];
        let result = service.schedule_for_user(req).unwrap();
        assert_eq!(
            result.scheduled[0].planned_start,
            Some(Utc.with_ymd_and_hms(2025, 5, 1, 10, 15, 0).unwrap())
        );
    }

    #[test]
    fn same_user_shares_one_lock() {
        let service = PlanningService::new(PlannerSettings::default()).unwrap();
        let a1 = service.user_lock("alice").unwrap();
        let a2 = service.user_lock("alice").unwrap();
        let b = service.user_lock("bob").unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
    }

    #[test]
    fn concurrent_runs_for_different_users_complete() {
        let service = Arc::new(PlanningService::new(PlannerSettings::default()).unwrap());
        let handles: Vec<_> = ["alice", "bob", "alice"]
            .into_iter()
            .map(|user| {
                let service = Arc::clone(&service);
                thread::spawn(move || {
                    service
                        .schedule_for_user(request(user, vec![Task::new("t", "T")]))
                        .map(|result| result.scheduled.len())
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 1);
        }
    }
}
