mod auth;
mod backup;
mod cache;
mod config_cmd;
mod fee;
mod school;
mod student;
mod sync_cmd;

pub use auth::{LoginCommand, PasswdCommand, RegisterCommand};
pub use backup::BackupCommand;
pub use cache::CacheCommand;
pub use config_cmd::ConfigCommand;
pub use fee::FeeCommand;
pub use school::SchoolCommand;
pub use student::StudentCommand;
pub use sync_cmd::SyncCommand;

pub(crate) use auth::{logout, whoami};

use chrono::NaiveDate;
use clap::ValueEnum;
use std::io::{BufRead, Write};

use crate::error::CliError;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Asks for confirmation of a destructive action unless `yes` was passed.
pub(crate) fn confirm(prompt: &str, yes: bool) -> Result<(), CliError> {
    if yes {
        return Ok(());
    }
    let answer = prompt_line(&format!("{} [y/N]", prompt))?;
    if matches!(answer.to_lowercase().as_str(), "y" | "yes") {
        Ok(())
    } else {
        Err(CliError::Aborted)
    }
}

pub(crate) fn prompt_line(label: &str) -> Result<String, CliError> {
    print!("{}: ", label);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| CliError::Input(format!("Invalid date '{}'. Use YYYY-MM-DD.", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirm_with_yes_skips_prompt() {
        assert!(confirm("Delete everything?", true).is_ok());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-03-15").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
        );
        assert!(matches!(parse_date("15/03/2024"), Err(CliError::Input(_))));
    }
}
