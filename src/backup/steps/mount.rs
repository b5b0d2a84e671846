use crate::backup::command::runner::CommandRunner;
use crate::backup::command::CommandSpec;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::failure::FailureCategory;
use crate::backup::result_error::result::{escalate, Result};
use bon::Builder;
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;
use validator::Validate;

const MOUNT_DESCRIPTION: &str = "Mounting Network Share";

fn default_mount_timeout() -> Option<Duration> {
    Some(Duration::from_secs(60))
}

/// The network share backups are written to.
///
/// `drive_letter` is where the share shows up once mounted: a drive such as `Z:`
/// on Windows, a mount point directory elsewhere.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct NetworkShareConfig {
    #[validate(length(min = 1))]
    #[builder(into)]
    path: String,
    #[validate(length(min = 1))]
    #[builder(into)]
    drive_letter: String,
    #[serde(default)]
    #[builder(into)]
    username: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    password: Option<RedactedString>,
    #[serde(default = "default_mount_timeout", with = "humantime_serde")]
    timeout: Option<Duration>,
}

impl NetworkShareConfig {
    pub fn is_mounted(&self) -> bool {
        Path::new(&self.drive_letter).exists()
    }

    #[cfg(windows)]
    pub fn mount_command(&self) -> CommandSpec {
        self.net_use_command()
    }

    #[cfg(not(windows))]
    pub fn mount_command(&self) -> CommandSpec {
        self.cifs_mount_command()
    }

    /// `net use Z: \\share [password] [/user:name]`, password before the switch.
    pub fn net_use_command(&self) -> CommandSpec {
        let mut spec = CommandSpec::new("net", MOUNT_DESCRIPTION).args([
            "use",
            self.drive_letter.as_str(),
            self.path.as_str(),
        ]);
        if let Some(password) = &self.password {
            spec = spec.secret(password);
        }
        if let Some(username) = &self.username {
            spec = spec.arg(format!("/user:{}", username));
        }
        spec.timeout(self.timeout)
    }

    pub fn cifs_mount_command(&self) -> CommandSpec {
        let mut spec = CommandSpec::new("mount", MOUNT_DESCRIPTION).args([
            "-t",
            "cifs",
            self.path.as_str(),
            self.drive_letter.as_str(),
        ]);
        let mut options = Vec::new();
        if let Some(username) = &self.username {
            options.push(format!("username={}", username));
        }
        if let Some(password) = &self.password {
            options.push(format!("password={}", password.inner()));
        }
        if !options.is_empty() {
            spec = spec
                .arg("-o")
                .secret(&RedactedString::new(options.join(",")));
        }
        spec.timeout(self.timeout)
    }

    /// Mounts the share unless its mount point already exists.
    pub fn mount_if_needed(&self, runner: &CommandRunner) -> Result<()> {
        if self.is_mounted() {
            info!("Network share already mounted at {}", self.drive_letter);
            return Ok(());
        }

        info!("Network share wasn't mounted - Mounting Network Share");
        runner.run(&self.mount_command())?;

        if !self.is_mounted() {
            return escalate(
                FailureCategory::BackupError,
                MOUNT_DESCRIPTION,
                format!(
                    "Mount command succeeded but {} is still missing (share {})",
                    self.drive_letter, self.path
                ),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::command::decode::TextDecoder;
    use crate::backup::command::log::CommandLog;
    use tempfile::TempDir;

    fn share(drive: &str) -> NetworkShareConfig {
        NetworkShareConfig::builder()
            .path("//nas/backups")
            .drive_letter(drive)
            .username("backup")
            .password(RedactedString::new("sh4re-pass"))
            .timeout(Duration::from_secs(60))
            .build()
    }

    #[test]
    fn test_mount_command_hides_password() {
        let spec = share("Z:").mount_command();
        let line = spec.command_line();
        assert!(!line.contains("sh4re-pass"));
        assert!(line.contains("//nas/backups"));
        assert_eq!(spec.timeout_duration(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_net_use_puts_password_before_user_switch() {
        let spec = share("Z:").net_use_command();
        assert_eq!(
            spec.command_line(),
            "net use Z: //nas/backups ###REDACTED### /user:backup"
        );
        let command = spec.to_command();
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(
            args,
            ["use", "Z:", "//nas/backups", "sh4re-pass", "/user:backup"]
                .map(std::ffi::OsStr::new)
                .to_vec()
        );
    }

    #[test]
    fn test_cifs_mount_passes_credentials_as_options() {
        let spec = share("/mnt/nas").cifs_mount_command();
        assert_eq!(
            spec.command_line(),
            "mount -t cifs //nas/backups /mnt/nas -o ###REDACTED###"
        );
        let command = spec.to_command();
        let last = command.get_args().last().unwrap();
        assert_eq!(last, "username=backup,password=sh4re-pass");
    }

    #[test]
    fn test_already_mounted_runs_nothing() {
        let dir = TempDir::new().unwrap();
        let log = CommandLog::new(dir.path().join("log-cmd.txt"));
        let runner = CommandRunner::new(log, TextDecoder::default());

        let mounted = share(dir.path().to_str().unwrap());
        mounted.mount_if_needed(&runner).unwrap();
        assert!(!runner.log().path().exists());
    }

    #[test]
    fn test_deserialize_defaults_timeout() {
        let yaml = "path: //nas/share\ndrive_letter: /mnt/nas\n";
        let cfg: NetworkShareConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(cfg.timeout(), &Some(Duration::from_secs(60)));
        assert!(cfg.username().is_none());

        let yaml = "path: //nas/share\ndrive_letter: /mnt/nas\ntimeout: 2m\n";
        let cfg: NetworkShareConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(cfg.timeout(), &Some(Duration::from_secs(120)));
    }
}
