use crate::backup::command::runner::CommandRunner;
use crate::backup::command::CommandSpec;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::result::Result;
use crate::backup::retention::BackupFile;
use crate::backup::validate::validate_file_name_prefix;
use bon::Builder;
use chrono::NaiveDate;
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use validator::Validate;

/// Suffix of the dump files ZBackup writes.
pub static BACKUP_SUFFIX: &str = ".zbcp";
/// Suffix of the log ZBackup writes next to each dump.
pub static TOOL_LOG_SUFFIX: &str = ".log";

/// Where SQL dumps live and how they are named: `<prefix><YYYY-MM-DD>.zbcp`.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct SqlBackupConfig {
    #[builder(into)]
    sql_backup_path: PathBuf,
    #[validate(custom(function = validate_file_name_prefix))]
    #[builder(into)]
    backup_name_prefix: String,
}

impl SqlBackupConfig {
    pub fn backup_file(&self, date: NaiveDate) -> PathBuf {
        self.sql_backup_path.join(BackupFile::file_name_for(
            &self.backup_name_prefix,
            date,
            BACKUP_SUFFIX,
        ))
    }

    /// The log ZBackup leaves next to the dump of `date`.
    pub fn tool_log(&self, date: NaiveDate) -> PathBuf {
        self.sql_backup_path.join(BackupFile::file_name_for(
            &self.backup_name_prefix,
            date,
            TOOL_LOG_SUFFIX,
        ))
    }
}

/// The ZBackup executable and the SQL Server database it dumps.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct ZBackupConfig {
    #[builder(into)]
    executable_path: PathBuf,
    #[validate(length(min = 1))]
    #[builder(into)]
    server: String,
    #[validate(length(min = 1))]
    #[builder(into)]
    database_name: String,
    #[validate(length(min = 1))]
    #[builder(into)]
    username: String,
    #[validate(nested)]
    password: RedactedString,
    /// Unbounded unless set; dump time grows with the database.
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
}

impl ZBackupConfig {
    pub fn backup_command(&self, backup_file: &Path) -> CommandSpec {
        CommandSpec::new(&self.executable_path, "SQL Backup with ZBackup")
            .args([
                "out",
                "-s",
                self.server.as_str(),
                "-d",
                self.database_name.as_str(),
                "-u",
                self.username.as_str(),
                "-p",
            ])
            .secret(&self.password)
            .arg("-f")
            .arg(backup_file.display().to_string())
            .timeout(self.timeout)
    }

    /// Dumps the database to today's backup file.
    pub fn run_backup(
        &self,
        target: &SqlBackupConfig,
        today: NaiveDate,
        runner: &CommandRunner,
    ) -> Result<PathBuf> {
        let backup_file = target.backup_file(today);
        info!("Backing up SQL Database to {}", backup_file.display());
        runner.run(&self.backup_command(&backup_file))?;
        Ok(backup_file)
    }
}
