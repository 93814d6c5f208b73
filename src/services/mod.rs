pub mod busy_set;
pub mod dependency_gate;
pub mod duration_estimator;
pub mod planning_service;
pub mod priority_scorer;
pub mod recurrence_expander;
pub mod reminder_planner;
pub mod rrule_parser;
pub mod schedule_utils;
pub mod scheduler;
pub mod settings_service;
pub mod slot_scorer;
