use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingStrategy {
    /// Single forward cursor, first conflict-free slot wins.
    #[default]
    FirstFit,
    /// Quarter-hour search over a bounded window, best slot score wins.
    BestOfWindow,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PlannerSettings {
    pub strategy: SchedulingStrategy,
    pub daily_start_hour: u32,
    pub daily_end_hour: u32,
    pub timezone: String,
    pub look_ahead_days: u32,
    pub max_search_days: u32,
    pub max_iterations: u32,
    pub recurrence_horizon_days: u32,
    pub default_reminder_minutes: i64,
    pub preferred_reminder_channels: Vec<String>,
    pub log_directives: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            strategy: SchedulingStrategy::FirstFit,
            daily_start_hour: 9,
            daily_end_hour: 17,
            timezone: "UTC".to_string(),
            look_ahead_days: 7,
            max_search_days: 60,
            max_iterations: 10_000,
            recurrence_horizon_days: 30,
            default_reminder_minutes: 30,
            preferred_reminder_channels: vec!["push".to_string()],
            log_directives: "info,app::scheduler=debug".to_string(),
            log_dir: None,
        }
    }
}
