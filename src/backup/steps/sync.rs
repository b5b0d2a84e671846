use crate::backup::command::runner::CommandRunner;
use crate::backup::command::CommandSpec;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::validate::{has_drive_prefix, validate_source_dirs};
use bon::Builder;
use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use validator::Validate;

fn default_rclone_executable() -> PathBuf {
    PathBuf::from("rclone")
}

/// Directories mirrored with rclone, each to `backup_destination_prefix` plus the
/// source path without its drive letter.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct SyncConfig {
    #[validate(custom(function = validate_source_dirs))]
    #[serde(default)]
    #[builder(default, into)]
    directories_to_backup: Vec<String>,
    #[validate(length(min = 1))]
    #[builder(into)]
    backup_destination_prefix: String,
    /// Passed to `--bwlimit`, e.g. `10M`.
    #[serde(default)]
    #[builder(into)]
    rclone_bandwidth_limit: Option<String>,
    #[serde(default = "default_rclone_executable")]
    #[builder(default = default_rclone_executable(), into)]
    rclone_executable: PathBuf,
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
}

impl SyncConfig {
    /// `C:/data/erp` with prefix `Z:/Backup` maps to `Z:/Backup/data/erp`.
    pub fn destination_for(&self, src: &str) -> String {
        let rest = if has_drive_prefix(src) { &src[2..] } else { src };
        format!("{}{}", self.backup_destination_prefix, rest)
    }

    pub fn sync_command(&self, src: &str, dest: &str, sync_log: &Path) -> CommandSpec {
        let mut spec = CommandSpec::new(
            &self.rclone_executable,
            format!("Backing up {} to {}", src, dest),
        )
        .args(["sync", src, dest, "--create-empty-src-dirs", "-v"])
        .arg(format!("--log-file={}", sync_log.display()));
        if let Some(limit) = &self.rclone_bandwidth_limit {
            spec = spec.arg(format!("--bwlimit={}", limit));
        }
        spec.timeout(self.timeout)
    }

    /// Syncs one directory, then moves rclone's own log into the command log.
    pub fn sync_directory(&self, src: &str, runner: &CommandRunner, sync_log: &Path) -> Result<()> {
        let dest = self.destination_for(src);
        info!("Backing up {} to {}", src, dest);
        let spec = self.sync_command(src, &dest, sync_log);
        runner.run(&spec)?;

        if sync_log.exists() {
            let tool_log = std::fs::read(sync_log)
                .map_err(Error::from)
                .with_msg(format!("Cannot read rclone log {:?}", sync_log))?;
            runner
                .log()
                .append_tool_log(&spec.command_line(), &String::from_utf8_lossy(&tool_log))?;
            std::fs::remove_file(sync_log)
                .map_err(Error::from)
                .with_msg(format!("Cannot remove rclone log {:?}", sync_log))?;
        }
        Ok(())
    }
}
