use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::task::Task;

/// Returned when nothing more specific is known.
pub const DEFAULT_DURATION_MINUTES: i64 = 90;

#[derive(Debug, Clone, Copy)]
pub struct DurationRequest<'a> {
    pub description: &'a str,
    pub task_type: Option<&'a str>,
    pub owner_id: Option<&'a str>,
    pub explicit_minutes: Option<i64>,
}

impl<'a> DurationRequest<'a> {
    pub fn for_task(task: &'a Task) -> Self {
        Self {
            description: task.context_text(),
            task_type: task.task_type.as_deref(),
            owner_id: task.owner_id.as_deref(),
            explicit_minutes: task.estimated_minutes,
        }
    }
}

/// Estimates how many minutes a task needs. Implementations must return a positive value.
pub trait DurationEstimator: Send + Sync {
    fn estimate(&self, request: &DurationRequest<'_>) -> i64;
}

static KEYWORD_RULES: Lazy<Vec<(Regex, i64)>> = Lazy::new(|| {
    [
        (r"(?i)\bresearch", 180),
        (r"(?i)\bwrite\s+code\b", 240),
        (r"(?i)\bmeeting\b", 60),
    ]
    .into_iter()
    .filter_map(|(pattern, minutes)| Regex::new(pattern).ok().map(|re| (re, minutes)))
    .collect()
});

/// Keyword heuristics; an explicit positive estimate on the task always wins.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedDurationEstimator;

impl DurationEstimator for RuleBasedDurationEstimator {
    fn estimate(&self, request: &DurationRequest<'_>) -> i64 {
        if let Some(minutes) = request.explicit_minutes.filter(|m| *m > 0) {
            return minutes;
        }

        if let Some(task_type) = request.task_type {
            if task_type.eq_ignore_ascii_case("meeting") {
                return 60;
            }
        }

        KEYWORD_RULES
            .iter()
            .find(|(re, _)| re.is_match(request.description))
            .map(|(_, minutes)| *minutes)
            .unwrap_or(DEFAULT_DURATION_MINUTES)
    }
}
