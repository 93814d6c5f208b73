pub mod calendar;
pub mod recurring_task;
pub mod reminder;
pub mod settings;
pub mod task;
