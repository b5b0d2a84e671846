use crate::backup::command::decode::TextDecoding;
use crate::backup::notifications::smtp::SmtpNotificationConfig;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::retention::RetentionConfig;
use crate::backup::steps::mount::NetworkShareConfig;
use crate::backup::steps::sql::{SqlBackupConfig, ZBackupConfig};
use crate::backup::steps::sync::SyncConfig;
use crate::backup::validate::{validate_http_url, validate_writable_dir};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fs::File;
use std::path::{Path, PathBuf};
use validator::{Validate, ValidationError, ValidationErrors};

/// Schema version this build understands.
pub const EXPECTED_CONFIG_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct FeatureFlags {
    pub mount_network_share: bool,
    pub perform_sql_backup: bool,
    pub prune_old_backups: bool,
}

/// What to do when `version` differs from [`EXPECTED_CONFIG_VERSION`].
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VersionCheck {
    #[default]
    Warn,
    Strict,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_script_log() -> String {
    "log-script.txt".to_string()
}

fn default_command_log() -> String {
    "log-cmd.txt".to_string()
}

fn default_sync_log() -> String {
    "log-rclone.txt".to_string()
}

/// Log files of a run, all relative to `dir`. Error dumps are written to `dir` too.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    #[serde(default = "default_log_dir")]
    #[validate(custom(function = validate_writable_dir))]
    pub dir: PathBuf,
    #[serde(default = "default_script_log")]
    pub script_log: String,
    #[serde(default = "default_command_log")]
    pub command_log: String,
    #[serde(default = "default_sync_log")]
    pub sync_log: String,
    /// Other logs to include in reports, e.g. the task scheduler's `log-task.txt`.
    #[serde(default)]
    pub extra_logs: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            script_log: default_script_log(),
            command_log: default_command_log(),
            sync_log: default_sync_log(),
            extra_logs: Vec::new(),
        }
    }
}

impl LogConfig {
    pub fn script_log_path(&self) -> PathBuf {
        self.dir.join(&self.script_log)
    }

    pub fn command_log_path(&self) -> PathBuf {
        self.dir.join(&self.command_log)
    }

    pub fn sync_log_path(&self) -> PathBuf {
        self.dir.join(&self.sync_log)
    }

    pub fn extra_log_paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.extra_logs.iter().map(|l| self.dir.join(l))
    }
}

#[skip_serializing_none]
#[derive(Clone, Serialize, Deserialize, Debug, Validate)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    pub version: u32,
    #[serde(default)]
    pub version_check: VersionCheck,
    #[serde(default)]
    pub features: FeatureFlags,
    #[validate(nested)]
    pub email: SmtpNotificationConfig,
    #[validate(custom(function = validate_http_url))]
    pub health_check_url: String,
    #[validate(nested)]
    pub network_share: Option<NetworkShareConfig>,
    #[validate(nested)]
    pub backup: SyncConfig,
    #[validate(nested)]
    pub sql_backup: SqlBackupConfig,
    #[validate(nested)]
    pub zbackup: Option<ZBackupConfig>,
    #[validate(nested)]
    pub retention: Option<RetentionConfig>,
    #[serde(default)]
    #[validate(nested)]
    pub logs: LogConfig,
    #[serde(default)]
    pub output_decoding: TextDecoding,
}

impl BackupConfig {
    /// Reads and validates the YAML config at `path`.
    ///
    /// The schema version is not checked here; call [`BackupConfig::check_version`]
    /// once logging is up so a mismatch warning ends up in the script log.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<BackupConfig> {
        let path = path.as_ref();
        let config = File::open(path)
            .map_err(Error::from)
            .with_msg(format!(
                "Config file {:?} does not exist or cannot be opened",
                path
            ))
            .and_then(|f| {
                serde_yml::from_reader::<_, BackupConfig>(f)
                    .map_err(Error::from)
                    .with_msg(format!("Parse YAML config failed: {:?}", path))
            })?;

        config
            .validate()
            .map_err(Error::from)
            .and_then(|_| config.check_feature_sections())
            .with_msg(format!("Config validation failed: {:?}", path))?;
        Ok(config)
    }

    /// Compares `version` with [`EXPECTED_CONFIG_VERSION`].
    ///
    /// Returns the warning to log when they differ under `version_check: warn`,
    /// and `Error::ConfigVersionMismatch` under `strict`.
    pub fn check_version(&self) -> Result<Option<String>> {
        if self.version == EXPECTED_CONFIG_VERSION {
            return Ok(None);
        }
        match self.version_check {
            VersionCheck::Warn => Ok(Some(format!(
                "Config version is {} but {} is expected, check the example config for \
                 changes. Continuing anyway.",
                self.version, EXPECTED_CONFIG_VERSION
            ))),
            VersionCheck::Strict => Err(Error::ConfigVersionMismatch {
                expected: EXPECTED_CONFIG_VERSION,
                found: self.version,
            }),
        }
    }

    /// Enabled features need their sections.
    fn check_feature_sections(&self) -> Result<()> {
        let mut errors = ValidationErrors::new();
        let missing = |feature: &str| {
            ValidationError::new("MissingSection")
                .with_message(format!("required when {} is enabled", feature).into())
        };
        if self.features.mount_network_share && self.network_share.is_none() {
            errors.add("network_share", missing("mount_network_share"));
        }
        if self.features.perform_sql_backup && self.zbackup.is_none() {
            errors.add("zbackup", missing("perform_sql_backup"));
        }
        if self.features.prune_old_backups && self.retention.is_none() {
            errors.add("retention", missing("prune_old_backups"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }
}
