pub mod recurring;
pub mod reminders;
pub mod schedule;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::error;

use crate::error::{AppError, AppResult};
use crate::models::settings::PlannerSettings;
use crate::services::planning_service::{CalendarSource, PlanningService};
use crate::services::reminder_planner::ReminderPlanner;

#[derive(Clone)]
pub struct AppState {
    settings: Arc<PlannerSettings>,
    planning_service: Arc<PlanningService>,
    reminder_planner: Arc<ReminderPlanner>,
}

impl AppState {
    pub fn new(settings: PlannerSettings) -> AppResult<Self> {
        Self::with_sources(settings, Vec::new())
    }

    pub fn with_sources(
        settings: PlannerSettings,
        sources: Vec<Arc<dyn CalendarSource>>,
    ) -> AppResult<Self> {
        let planning_service = sources
            .into_iter()
            .fold(PlanningService::new(settings.clone())?, |service, source| {
                service.with_source(source)
            });
        let reminder_planner = ReminderPlanner::from_settings(&settings);

        Ok(Self {
            settings: Arc::new(settings),
            planning_service: Arc::new(planning_service),
            reminder_planner: Arc::new(reminder_planner),
        })
    }

    pub fn settings(&self) -> Arc<PlannerSettings> {
        Arc::clone(&self.settings)
    }

    pub fn planning(&self) -> Arc<PlanningService> {
        Arc::clone(&self.planning_service)
    }

    pub fn reminders(&self) -> Arc<ReminderPlanner> {
        Arc::clone(&self.reminder_planner)
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl CommandError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<JsonValue>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details,
        }
    }
}

impl From<AppError> for CommandError {
    fn from(error: AppError) -> Self {
        match error {
            AppError::Validation {
                message, details, ..
            } => CommandError::new("VALIDATION_ERROR", message, details),
            AppError::CircularDependency { cycle } => CommandError::new(
                "CIRCULAR_DEPENDENCY",
                format!("Circular dependency: {}", cycle.join(" -> ")),
                Some(serde_json::json!({ "cycle": cycle })),
            ),
            AppError::InvalidRecurrence { message } => {
                CommandError::new("INVALID_RECURRENCE", message, None)
            }
            AppError::Config { message } => CommandError::new("CONFIG_ERROR", message, None),
            AppError::Serialization(error) => {
                CommandError::new("VALIDATION_ERROR", format!("Malformed payload: {error}"), None)
            }
            AppError::Yaml(error) => {
                error!(target: "app::command", error = %error, "yaml error in command");
                CommandError::new("CONFIG_ERROR", error.to_string(), None)
            }
            AppError::Io(error) => {
                error!(target: "app::command", error = %error, "io error in command");
                CommandError::new("UNKNOWN", "File system read/write failed", None)
            }
            AppError::Other(message) => {
                error!(target: "app::command", %message, "unexpected error in command");
                CommandError::new("UNKNOWN", message, None)
            }
        }
    }
}
