use chrono::{DateTime, Utc};

use crate::models::task::Task;

#[derive(Debug, Clone, Copy)]
pub struct PriorityRequest<'a> {
    pub description: &'a str,
    /// Task deadline, or its previous planned end when no deadline is set.
    pub deadline: Option<DateTime<Utc>>,
    pub owner_id: Option<&'a str>,
    pub stored_priority: i32,
    pub now: DateTime<Utc>,
}

impl<'a> PriorityRequest<'a> {
    pub fn for_task(task: &'a Task, now: DateTime<Utc>) -> Self {
        Self {
            description: task.context_text(),
            deadline: task.deadline.or(task.planned_end),
            owner_id: task.owner_id.as_deref(),
            stored_priority: task.priority,
            now,
        }
    }
}

/// Produces a sort rank; lower ranks are scheduled first.
///
/// Implementations must be pure functions of the request so the scheduler's
/// ordering is reproducible.
pub trait PriorityScorer: Send + Sync {
    fn rank(&self, request: &PriorityRequest<'_>) -> i32;
}

/// Deadline proximity buckets, falling back to the stored priority.
#[derive(Debug, Clone, Default)]
pub struct DeadlinePriorityScorer;

impl PriorityScorer for DeadlinePriorityScorer {
    fn rank(&self, request: &PriorityRequest<'_>) -> i32 {
        let Some(deadline) = request.deadline else {
            return request.stored_priority;
        };

        let days_left = deadline.signed_duration_since(request.now).num_days();
        if days_left <= 1 {
            1
        } else if days_left <= 7 {
            2
        } else {
            3
        }
    }
}

/// Ranks purely by the stored priority field.
#[derive(Debug, Clone, Default)]
pub struct StoredPriorityScorer;

impl PriorityScorer for StoredPriorityScorer {
    fn rank(&self, request: &PriorityRequest<'_>) -> i32 {
        request.stored_priority
    }
}
