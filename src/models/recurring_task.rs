use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::task::PRIORITY_MEDIUM;
use crate::services::rrule_parser::{RRuleParser, RecurrenceRule};

/// Recurring task template that defines how task stubs are generated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringTaskTemplate {
    pub id: String,
    pub owner_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub recurrence_rule: RecurrenceRule,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub priority: i32,
    pub estimated_minutes: Option<i64>,
    pub task_type: Option<String>,
    pub is_active: bool,
}

impl RecurringTaskTemplate {
    /// Create a new recurring task template
    pub fn new(title: String, recurrence_rule: RecurrenceRule, start_date: NaiveDate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: None,
            title,
            description: None,
            recurrence_rule,
            start_date,
            end_date: None,
            priority: PRIORITY_MEDIUM,
            estimated_minutes: None,
            task_type: None,
            is_active: true,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_end_date(mut self, end_date: Option<NaiveDate>) -> Self {
        self.end_date = end_date;
        self
    }

    pub fn with_estimated_minutes(mut self, estimated_minutes: Option<i64>) -> Self {
        self.estimated_minutes = estimated_minutes;
        self
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }
}

/// Input for creating a recurring task template from a raw rule string
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringTaskTemplateCreate {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub recurrence_rule_string: String, // RRULE or legacy "weekly:2" form
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub estimated_minutes: Option<i64>,
    #[serde(default)]
    pub task_type: Option<String>,
}

impl RecurringTaskTemplateCreate {
    pub fn into_template(self) -> AppResult<RecurringTaskTemplate> {
        if self.title.trim().is_empty() {
            return Err(AppError::validation("Template title cannot be empty"));
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(AppError::invalid_recurrence(
                    "Template end date must not precede its start date",
                ));
            }
        }

        let rule = RRuleParser::parse_any(&self.recurrence_rule_string)?;
        let mut template = RecurringTaskTemplate::new(self.title, rule, self.start_date)
            .with_description(self.description)
            .with_end_date(self.end_date)
            .with_estimated_minutes(self.estimated_minutes);
        if let Some(id) = self.id {
            template.id = id;
        }
        template.owner_id = self.owner_id;
        template.task_type = self.task_type;
        if let Some(priority) = self.priority {
            template.priority = priority;
        }
        Ok(template)
    }
}
