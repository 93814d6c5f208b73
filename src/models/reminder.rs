use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReminderIntensity {
    Gentle,
    Moderate,
    Urgent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReminderStrategy {
    pub frequency_minutes: i64,
    pub intensity: ReminderIntensity,
    pub channels: Vec<String>,
    pub escalation_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlannedReminder {
    pub task_id: String,
    pub remind_at: DateTime<Utc>,
    pub strategy: ReminderStrategy,
}
