pub mod commands;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::commands::{AppState, CommandError, CommandResult};
use crate::error::AppError;
use crate::services::settings_service::SettingsService;

#[derive(Parser)]
#[command(name = "goal-planner", version, about = "Automatic task scheduler")]
struct Cli {
    /// YAML or JSON settings file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Place a batch of tasks into working hours.
    Schedule { payload: PathBuf },
    /// Expand a recurring template into task stubs.
    RecurringGenerate { payload: PathBuf },
    /// Compute reminder times and strategies for planned tasks.
    RemindersPlan { payload: PathBuf },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    match try_run(cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            let rendered = serde_json::to_string_pretty(&error)
                .unwrap_or_else(|_| format!("{{\"code\":\"{}\"}}", error.code));
            println!("{rendered}");
            ExitCode::FAILURE
        }
    }
}

fn try_run(cli: Cli) -> Result<String, CommandError> {
    let settings = SettingsService::new(cli.config).get()?;
    crate::utils::logger::init_logging(&settings)?;
    let state = AppState::new(settings)?;

    match cli.command {
        Command::Schedule { payload } => respond(commands::schedule::schedule_tasks(
            &state,
            read_payload(&payload)?,
        )),
        Command::RecurringGenerate { payload } => respond(
            commands::recurring::recurring_generate(&state, read_payload(&payload)?),
        ),
        Command::RemindersPlan { payload } => respond(commands::reminders::reminders_plan(
            &state,
            read_payload(&payload)?,
        )),
    }
}

fn read_payload<T: DeserializeOwned>(path: &Path) -> Result<T, CommandError> {
    let raw = std::fs::read_to_string(path).map_err(AppError::from)?;
    Ok(serde_json::from_str(&raw).map_err(AppError::from)?)
}

fn respond<T: Serialize>(result: CommandResult<T>) -> Result<String, CommandError> {
    let value = result?;
    Ok(serde_json::to_string_pretty(&value).map_err(AppError::from)?)
}
