use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::models::reminder::{PlannedReminder, ReminderIntensity, ReminderStrategy};
use crate::models::settings::PlannerSettings;
use crate::models::task::{Task, PRIORITY_HIGH, PRIORITY_LOW};

/// Computes when and how loudly to remind about planned tasks. Delivery lives elsewhere.
#[derive(Debug, Clone)]
pub struct ReminderPlanner {
    default_minutes: i64,
    preferred_channels: Vec<String>,
}

impl ReminderPlanner {
    pub fn new(default_minutes: i64, preferred_channels: Vec<String>) -> Self {
        Self {
            default_minutes,
            preferred_channels,
        }
    }

    pub fn from_settings(settings: &PlannerSettings) -> Self {
        Self::new(
            settings.default_reminder_minutes,
            settings.preferred_reminder_channels.clone(),
        )
    }

    /// `planned_start` minus the task's reminder interval; `None` for unplanned tasks.
    pub fn reminder_at(&self, task: &Task) -> Option<DateTime<Utc>> {
        let start = task.planned_start?;
        let lead = task
            .reminder_interval
            .filter(|minutes| *minutes > 0)
            .unwrap_or(self.default_minutes);
        start.checked_sub_signed(Duration::minutes(lead))
    }

    pub fn strategy(
        &self,
        priority: i32,
        deadline: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> ReminderStrategy {
        let hours_left = deadline.map(|d| d.signed_duration_since(now).num_minutes() as f64 / 60.0);
        let priority = priority.clamp(PRIORITY_HIGH, PRIORITY_LOW);

        let mut frequency_hours: f64 = match hours_left {
            Some(h) if h < 1.0 => 0.5,
            Some(h) if h < 24.0 => 2.0,
            Some(h) if h < 72.0 => 6.0,
            Some(h) if h < 168.0 => 12.0,
            _ => 24.0,
        };
        if priority == PRIORITY_HIGH {
            frequency_hours = f64::max(1.0, (frequency_hours / 2.0).floor());
        } else if priority == PRIORITY_LOW {
            frequency_hours *= 2.0;
        }

        let urgency = urgency_score(priority, hours_left);
        let intensity = if urgency > 0.8 {
            ReminderIntensity::Urgent
        } else if urgency > 0.5 {
            ReminderIntensity::Moderate
        } else {
            ReminderIntensity::Gentle
        };

        ReminderStrategy {
            frequency_minutes: (frequency_hours * 60.0).round() as i64,
            intensity,
            channels: self.channels_for(intensity),
            escalation_enabled: urgency > 0.8,
        }
    }

    /// Reminder for a planned task, using its deadline for urgency.
    pub fn plan(&self, task: &Task, now: DateTime<Utc>) -> Option<PlannedReminder> {
        let remind_at = self.reminder_at(task)?;
        let strategy = self.strategy(task.priority, task.deadline, now);
        debug!(
            target: "app::reminders",
            task_id = %task.id,
            remind_at = %remind_at.to_rfc3339(),
            intensity = ?strategy.intensity,
            "reminder planned"
        );
        Some(PlannedReminder {
            task_id: task.id.clone(),
            remind_at,
            strategy,
        })
    }

    fn channels_for(&self, intensity: ReminderIntensity) -> Vec<String> {
        let prefers = |name: &str| self.preferred_channels.iter().any(|c| c == name);
        match intensity {
            ReminderIntensity::Urgent if prefers("email") => {
                vec!["push".to_string(), "email".to_string()]
            }
            ReminderIntensity::Urgent | ReminderIntensity::Moderate => vec!["push".to_string()],
            ReminderIntensity::Gentle => self
                .preferred_channels
                .first()
                .cloned()
                .map_or_else(|| vec!["push".to_string()], |c| vec![c]),
        }
    }
}

impl Default for ReminderPlanner {
    fn default() -> Self {
        Self::from_settings(&PlannerSettings::default())
    }
}

/// Average of a priority weight (high = 1.0, low = 0.0) and a deadline-proximity weight.
fn urgency_score(priority: i32, hours_left: Option<f64>) -> f64 {
    let priority_weight = 1.0 - f64::from(priority) / 2.0;
    let deadline_weight = match hours_left {
        Some(h) if h < 1.0 => 1.0,
        Some(h) if h < 24.0 => 0.8,
        Some(h) if h < 72.0 => 0.6,
        Some(h) if h < 168.0 => 0.4,
        _ => 0.2,
    };
    (priority_weight + deadline_weight) / 2.0
}
