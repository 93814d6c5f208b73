use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::settings::{PlannerSettings, SchedulingStrategy};
use crate::services::schedule_utils;

pub const ENV_STRATEGY: &str = "PLANNER_STRATEGY";
pub const ENV_TIMEZONE: &str = "PLANNER_TIMEZONE";
pub const ENV_DAILY_START_HOUR: &str = "PLANNER_DAILY_START_HOUR";
pub const ENV_DAILY_END_HOUR: &str = "PLANNER_DAILY_END_HOUR";

/// Loads planner settings from an optional YAML/JSON file plus environment overrides.
pub struct SettingsService {
    path: Option<PathBuf>,
    cache: RwLock<Option<PlannerSettings>>,
}

impl SettingsService {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            cache: RwLock::new(None),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Cached settings, loading them on first use.
    pub fn get(&self) -> AppResult<PlannerSettings> {
        if let Ok(guard) = self.cache.read() {
            if let Some(settings) = guard.as_ref() {
                return Ok(settings.clone());
            }
        }
        self.reload()
    }

    pub fn reload(&self) -> AppResult<PlannerSettings> {
        let mut settings = match &self.path {
            Some(path) => load_file(path)?,
            None => PlannerSettings::default(),
        };
        apply_overrides(&mut settings, |key| std::env::var(key).ok())?;
        validate(&settings)?;

        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(settings.clone());
        }
        Ok(settings)
    }
}

/// Missing files fall back to defaults; unreadable or malformed files are errors.
pub fn load_file(path: &Path) -> AppResult<PlannerSettings> {
    if !path.exists() {
        warn!(
            target: "app::config",
            path = %path.display(),
            "settings file not found, using defaults"
        );
        return Ok(PlannerSettings::default());
    }

    let raw = std::fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(PlannerSettings::default());
    }
    // serde_yaml also reads JSON documents.
    let settings: PlannerSettings = serde_yaml::from_str(&raw).map_err(|err| {
        AppError::config(format!("failed to parse {}: {err}", path.display()))
    })?;
    info!(target: "app::config", path = %path.display(), "settings loaded");
    Ok(settings)
}

/// Applies `PLANNER_*` overrides read through `lookup`.
pub fn apply_overrides<F>(settings: &mut PlannerSettings, lookup: F) -> AppResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(ENV_STRATEGY) {
        settings.strategy = parse_strategy(&raw)?;
    }
    if let Some(raw) = lookup(ENV_TIMEZONE) {
        settings.timezone = raw.trim().to_string();
    }
    if let Some(raw) = lookup(ENV_DAILY_START_HOUR) {
        settings.daily_start_hour = parse_hour(ENV_DAILY_START_HOUR, &raw)?;
    }
    if let Some(raw) = lookup(ENV_DAILY_END_HOUR) {
        settings.daily_end_hour = parse_hour(ENV_DAILY_END_HOUR, &raw)?;
    }
    Ok(())
}

pub fn validate(settings: &PlannerSettings) -> AppResult<()> {
    if settings.daily_end_hour > 24 || settings.daily_start_hour >= settings.daily_end_hour {
        return Err(AppError::config(format!(
            "working hours must satisfy 0 <= start < end <= 24 (got {}..{})",
            settings.daily_start_hour, settings.daily_end_hour
        )));
    }
    if settings.look_ahead_days == 0 {
        return Err(AppError::config("lookAheadDays must be at least 1"));
    }
    if settings.max_search_days == 0 {
        return Err(AppError::config("maxSearchDays must be at least 1"));
    }
    if settings.max_iterations == 0 {
        return Err(AppError::config("maxIterations must be at least 1"));
    }
    if settings.recurrence_horizon_days == 0 {
        return Err(AppError::config("recurrenceHorizonDays must be at least 1"));
    }
    if settings.default_reminder_minutes < 0 {
        return Err(AppError::config("defaultReminderMinutes must not be negative"));
    }
    if schedule_utils::parse_timezone(&settings.timezone).is_err() {
        return Err(AppError::config(format!(
            "unknown timezone: {}",
            settings.timezone
        )));
    }
    Ok(())
}

fn parse_strategy(raw: &str) -> AppResult<SchedulingStrategy> {
    match raw.trim().to_lowercase().replace('-', "_").as_str() {
        "first_fit" => Ok(SchedulingStrategy::FirstFit),
        "best_of_window" => Ok(SchedulingStrategy::BestOfWindow),
        other => Err(AppError::config(format!("unknown strategy: {other}"))),
    }
}

fn parse_hour(key: &str, raw: &str) -> AppResult<u32> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| AppError::config(format!("{key} must be an hour between 0 and 24")))
}
