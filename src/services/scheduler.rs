use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::models::settings::{PlannerSettings, SchedulingStrategy};
use crate::models::task::{Task, TaskStatus};
use crate::services::busy_set::BusySet;
use crate::services::dependency_gate::{DependencyGate, Eligibility};
use crate::services::duration_estimator::{
    DurationEstimator, DurationRequest, RuleBasedDurationEstimator, DEFAULT_DURATION_MINUTES,
};
use crate::services::priority_scorer::{DeadlinePriorityScorer, PriorityRequest, PriorityScorer};
use crate::services::schedule_utils::{self, WorkingHours, BUFFER_MINUTES};
use crate::services::slot_scorer::{RuleBasedSlotScorer, SlotScorer};

/// Inputs that stay fixed for one scheduling run.
#[derive(Debug, Clone)]
pub struct SchedulingContext {
    pub working_hours: WorkingHours,
    pub now: DateTime<Utc>,
    pub busy: BusySet,
    /// Statuses of tasks referenced as dependencies but not part of the batch.
    pub known_statuses: HashMap<String, TaskStatus>,
    /// End of the range `busy` was gathered for. Nothing is placed past it.
    pub busy_until: Option<DateTime<Utc>>,
}

impl SchedulingContext {
    pub fn new(
        daily_start_hour: u32,
        daily_end_hour: u32,
        tz: Tz,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        Ok(Self {
            working_hours: WorkingHours::new(daily_start_hour, daily_end_hour, tz)?,
            now,
            busy: BusySet::default(),
            known_statuses: HashMap::new(),
            busy_until: None,
        })
    }

    pub fn with_busy(mut self, busy: BusySet) -> Self {
        self.busy = busy;
        self
    }

    pub fn with_known_statuses(mut self, known_statuses: HashMap<String, TaskStatus>) -> Self {
        self.known_statuses = known_statuses;
        self
    }

    pub fn with_busy_until(mut self, busy_until: DateTime<Utc>) -> Self {
        self.busy_until = Some(busy_until);
        self
    }

    /// Working-hours start on the day after `now`.
    pub fn initial_cursor(&self) -> DateTime<Utc> {
        self.working_hours.next_day_start(self.now)
    }

    /// Whether busy time is known for a slot ending at `end`.
    fn busy_known_through(&self, end: DateTime<Utc>) -> bool {
        self.busy_until.map_or(true, |until| end <= until)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    UnmetDependency {
        #[serde(rename = "dependencyId")]
        dependency_id: String,
    },
    Closed,
    ExceedsWorkingWindow {
        #[serde(rename = "requiredMinutes")]
        required_minutes: i64,
        #[serde(rename = "windowMinutes")]
        window_minutes: i64,
    },
    NoFeasibleSlot,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SkippedTask {
    pub task_id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResult {
    /// Placed tasks in placement order, plan fields populated.
    pub scheduled: Vec<Task>,
    /// Ids in `scheduled` that kept their previous plan instead of a new slot.
    pub retained: Vec<String>,
    pub skipped: Vec<SkippedTask>,
}

impl ScheduleResult {
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }

    pub fn scheduled_ids(&self) -> Vec<&str> {
        self.scheduled.iter().map(|task| task.id.as_str()).collect()
    }
}

/// Termination bounds for slot search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchLimits {
    /// Window searched by best-of-window, from the cursor.
    pub look_ahead_days: u32,
    /// Horizon after which first-fit gives up on a task.
    pub max_search_days: u32,
    /// Candidate evaluations allowed per task.
    pub max_iterations: u32,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            look_ahead_days: 7,
            max_search_days: 60,
            max_iterations: 10_000,
        }
    }
}

type Interval = (DateTime<Utc>, DateTime<Utc>);

pub struct Scheduler {
    strategy: SchedulingStrategy,
    limits: SearchLimits,
    duration_estimator: Arc<dyn DurationEstimator>,
    priority_scorer: Arc<dyn PriorityScorer>,
    slot_scorer: Arc<dyn SlotScorer>,
}

impl Scheduler {
    pub fn new(strategy: SchedulingStrategy) -> Self {
        Self {
            strategy,
            limits: SearchLimits::default(),
            duration_estimator: Arc::new(RuleBasedDurationEstimator),
            priority_scorer: Arc::new(DeadlinePriorityScorer),
            slot_scorer: Arc::new(RuleBasedSlotScorer::default()),
        }
    }

    pub fn from_settings(settings: &PlannerSettings) -> AppResult<Self> {
        let tz = schedule_utils::parse_timezone(&settings.timezone)?;
        Ok(Self::new(settings.strategy)
            .with_limits(SearchLimits {
                look_ahead_days: settings.look_ahead_days,
                max_search_days: settings.max_search_days,
                max_iterations: settings.max_iterations,
            })
            .with_slot_scorer(Arc::new(RuleBasedSlotScorer::new(tz))))
    }

    pub fn with_limits(mut self, limits: SearchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_duration_estimator(mut self, estimator: Arc<dyn DurationEstimator>) -> Self {
        self.duration_estimator = estimator;
        self
    }

    pub fn with_priority_scorer(mut self, scorer: Arc<dyn PriorityScorer>) -> Self {
        self.priority_scorer = scorer;
        self
    }

    pub fn with_slot_scorer(mut self, scorer: Arc<dyn SlotScorer>) -> Self {
        self.slot_scorer = scorer;
        self
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// End of the range callers should gather busy time for before running `tasks`.
    ///
    /// Starts from the latest of the initial cursor and every `earliest_start`, then adds
    /// the search window plus one day per open task. Pass the result to
    /// [`SchedulingContext::with_busy_until`] so the run never places past it.
    pub fn busy_horizon(
        &self,
        tasks: &[Task],
        ctx: &SchedulingContext,
    ) -> AppResult<DateTime<Utc>> {
        let furthest_start = tasks
            .iter()
            .filter_map(|task| task.earliest_start)
            .fold(ctx.initial_cursor(), |latest, earliest| latest.max(earliest));
        let open_tasks = tasks.iter().filter(|task| !task.status.is_closed()).count() as i64;
        let search_days = i64::from(self.limits.max_search_days.max(self.limits.look_ahead_days));
        let days = search_days + open_tasks + 1;
        schedule_utils::add_minutes(furthest_start, days * 24 * 60)
    }

    /// Assigns plans to the eligible tasks of `tasks`.
    ///
    /// The input is never mutated; placed tasks are returned as updated copies.
    /// A dependency cycle inside the batch aborts the run with
    /// [`crate::error::AppError::CircularDependency`].
    pub fn schedule(&self, tasks: &[Task], ctx: &SchedulingContext) -> AppResult<ScheduleResult> {
        let mut result = ScheduleResult::default();
        if tasks.is_empty() {
            debug!(target: "app::scheduler", "empty batch, nothing to schedule");
            return Ok(result);
        }

        DependencyGate::ensure_acyclic(tasks)?;
        let gate = DependencyGate::new(tasks, &ctx.known_statuses);
        let ordered = self.order_tasks(tasks, ctx.now);

        info!(
            target: "app::scheduler",
            strategy = ?self.strategy,
            tasks = tasks.len(),
            busy = ctx.busy.len(),
            "scheduling run started"
        );

        let working_hours = ctx.working_hours;
        let mut cursor = ctx.initial_cursor();
        let mut occupied: Vec<Interval> = Vec::new();

        for task in ordered {
            if task.status.is_closed() {
                result.skipped.push(skip(task, SkipReason::Closed));
                continue;
            }

            if let Eligibility::Blocked { dependency_id } = gate.check(task) {
                info!(
                    target: "app::scheduler",
                    task_id = %task.id,
                    dependency_id = %dependency_id,
                    "skipping task with unmet dependency"
                );
                result
                    .skipped
                    .push(skip(task, SkipReason::UnmetDependency { dependency_id }));
                continue;
            }

            let duration = self.duration_for(task);
            if duration > working_hours.window_minutes() {
                info!(
                    target: "app::scheduler",
                    task_id = %task.id,
                    duration,
                    "task longer than the working window"
                );
                result.skipped.push(skip(
                    task,
                    SkipReason::ExceedsWorkingWindow {
                        required_minutes: duration,
                        window_minutes: working_hours.window_minutes(),
                    },
                ));
                continue;
            }

            let search_from = match task.earliest_start {
                Some(earliest) if earliest > cursor => earliest,
                _ => cursor,
            };

            let slot = match self.strategy {
                SchedulingStrategy::FirstFit => {
                    self.first_fit(search_from, duration, ctx, &occupied)?
                }
                SchedulingStrategy::BestOfWindow => {
                    self.best_of_window(search_from, duration, ctx, &occupied)?
                }
            };

            match slot {
                Some((start, end)) => {
                    debug!(
                        target: "app::scheduler",
                        task_id = %task.id,
                        start = %start.to_rfc3339(),
                        end = %end.to_rfc3339(),
                        "task placed"
                    );
                    let mut placed = task.clone();
                    placed.planned_start = Some(start);
                    placed.planned_end = Some(end);
                    result.scheduled.push(placed);
                    occupied.push((start, end));
                    // A jump to `earliest_start` does not drag later tasks along.
                    if search_from == cursor {
                        cursor = schedule_utils::add_minutes(end, BUFFER_MINUTES)?;
                    }
                }
                None if self.strategy == SchedulingStrategy::BestOfWindow
                    && self.prior_plan_still_valid(task, ctx, &occupied) =>
                {
                    info!(
                        target: "app::scheduler",
                        task_id = %task.id,
                        "no slot in window, retaining previous plan"
                    );
                    if let (Some(start), Some(end)) = (task.planned_start, task.planned_end) {
                        occupied.push((start, end));
                    }
                    result.retained.push(task.id.clone());
                    result.scheduled.push(task.clone());
                }
                None => {
                    warn!(
                        target: "app::scheduler",
                        task_id = %task.id,
                        duration,
                        "no feasible slot within search bounds"
                    );
                    result.skipped.push(skip(task, SkipReason::NoFeasibleSlot));
                }
            }
        }

        info!(
            target: "app::scheduler",
            scheduled = result.scheduled.len(),
            retained = result.retained.len(),
            skipped = result.skipped.len(),
            "scheduling run finished"
        );

        Ok(result)
    }

    /// Ascending by scorer rank, then stored priority, then input order.
    fn order_tasks<'a>(&self, tasks: &'a [Task], now: DateTime<Utc>) -> Vec<&'a Task> {
        let mut keyed: Vec<(i32, i32, &Task)> = tasks
            .iter()
            .map(|task| {
                let rank = self
                    .priority_scorer
                    .rank(&PriorityRequest::for_task(task, now));
                (rank, task.priority, task)
            })
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        keyed.into_iter().map(|(_, _, task)| task).collect()
    }

    fn duration_for(&self, task: &Task) -> i64 {
        let minutes = self
            .duration_estimator
            .estimate(&DurationRequest::for_task(task));
        if minutes > 0 {
            minutes
        } else {
            DEFAULT_DURATION_MINUTES
        }
    }

    /// Forward scan: clamp into working hours, jump past each conflict, first fit wins.
    fn first_fit(
        &self,
        from: DateTime<Utc>,
        duration: i64,
        ctx: &SchedulingContext,
        occupied: &[Interval],
    ) -> AppResult<Option<Interval>> {
        let working_hours = ctx.working_hours;
        let mut horizon = from + Duration::days(i64::from(self.limits.max_search_days));
        if let Some(until) = ctx.busy_until {
            horizon = horizon.min(until);
        }
        let mut start = from;

        for _ in 0..self.limits.max_iterations {
            start = working_hours.clamp(start);
            if start >= horizon {
                return Ok(None);
            }

            let end = schedule_utils::add_minutes(start, duration)?;
            if !ctx.busy_known_through(end) {
                return Ok(None);
            }
            if !working_hours.contains(start, end) {
                start = working_hours.next_day_start(start);
                continue;
            }

            match next_attempt(start, end, &ctx.busy, occupied)? {
                Some(next) => start = next,
                None => return Ok(Some((start, end))),
            }
        }

        Ok(None)
    }

    /// Evaluates every quarter-hour start in the look-ahead window, keeps the best score.
    fn best_of_window(
        &self,
        from: DateTime<Utc>,
        duration: i64,
        ctx: &SchedulingContext,
        occupied: &[Interval],
    ) -> AppResult<Option<Interval>> {
        let working_hours = ctx.working_hours;
        let mut until = from + Duration::days(i64::from(self.limits.look_ahead_days));
        if let Some(known) = ctx.busy_until {
            until = until.min(known);
        }
        let step = Duration::minutes(15);

        let mut candidate = schedule_utils::round_up_to_quarter(from);
        let mut best: Option<(f64, Interval)> = None;
        let mut iterations = 0u32;

        while candidate < until {
            if iterations >= self.limits.max_iterations {
                warn!(target: "app::scheduler", "slot search hit iteration limit");
                break;
            }
            iterations += 1;

            let aligned = schedule_utils::round_up_to_quarter(working_hours.clamp(candidate));
            if aligned != candidate {
                candidate = aligned;
                continue;
            }

            let end = schedule_utils::add_minutes(candidate, duration)?;
            if working_hours.contains(candidate, end)
                && ctx.busy_known_through(end)
                && next_attempt(candidate, end, &ctx.busy, occupied)?.is_none()
            {
                let raw = self.slot_scorer.score(candidate, end);
                let score = if raw.is_finite() { raw.clamp(0.0, 1.0) } else { 0.0 };
                if best.map_or(true, |(best_score, _)| score > best_score) {
                    best = Some((score, (candidate, end)));
                }
            }

            candidate += step;
        }

        Ok(best.map(|(_, slot)| slot))
    }

    fn prior_plan_still_valid(
        &self,
        task: &Task,
        ctx: &SchedulingContext,
        occupied: &[Interval],
    ) -> bool {
        let (Some(start), Some(end)) = (task.planned_start, task.planned_end) else {
            return false;
        };
        if start < ctx.now || task.earliest_start.is_some_and(|earliest| start < earliest) {
            return false;
        }
        ctx.working_hours.contains(start, end)
            && ctx.busy_known_through(end)
            && matches!(next_attempt(start, end, &ctx.busy, occupied), Ok(None))
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulingStrategy::default())
    }
}

/// Earliest start worth retrying after a conflict, or `None` when `[start, end)` is free.
fn next_attempt(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    busy: &BusySet,
    occupied: &[Interval],
) -> AppResult<Option<DateTime<Utc>>> {
    if let Some(event) = busy.first_conflict(start, end) {
        return Ok(Some(schedule_utils::add_minutes(event.end, BUFFER_MINUTES)?));
    }

    for &(occupied_start, occupied_end) in occupied {
        let padded_start = schedule_utils::add_minutes(occupied_start, -BUFFER_MINUTES)?;
        let padded_end = schedule_utils::add_minutes(occupied_end, BUFFER_MINUTES)?;
        if schedule_utils::overlaps(start, end, padded_start, padded_end) {
            return Ok(Some(padded_end));
        }
    }

    Ok(None)
}

fn skip(task: &Task, reason: SkipReason) -> SkippedTask {
    SkippedTask {
        task_id: task.id.clone(),
        reason,
    }
}
