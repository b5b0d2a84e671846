use crate::backup::backup_config::BackupConfig;
use crate::backup::notifications::health_check::HealthCheck;
use crate::backup::notifications::report::LogSources;
use crate::backup::notifications::smtp::SmtpNotificationConfig;
use crate::backup::notifications::{FailurePing, LogAttachment, Notification};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::failure::Failure;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use chrono::{Local, NaiveDate};
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub static SCRIPT_FAILURE_SUBJECT: &str = "Backup Script Failure";

/// Reports a failed run by mail, falling back to an error dump and the health
/// check `/fail` ping when the mail itself cannot be sent.
pub struct Notifier<N: Notification, P: FailurePing> {
    notification: N,
    ping: P,
    sources: LogSources,
    dump_dir: PathBuf,
    attach_logs: bool,
}

impl Notifier<SmtpNotificationConfig, HealthCheck> {
    pub fn for_config(config: &BackupConfig, today: NaiveDate) -> Self {
        let logs = &config.logs;
        let sources = logs.extra_log_paths().fold(
            LogSources::new()
                .with("Log from the backup script", logs.script_log_path())
                .with("Log from the cmd commands pipe", logs.command_log_path())
                .with("Log from rclone", logs.sync_log_path())
                .with("Log from ZBackup", config.sql_backup.tool_log(today)),
            |sources, path| {
                let label = format!("Log from {}", display_name(&path));
                sources.with(label, path)
            },
        );

        Notifier::new(
            config.email.clone(),
            HealthCheck::new(config.health_check_url.clone()),
            sources,
            logs.dir.clone(),
        )
        .attach_logs(*config.email.attach_logs())
    }
}

impl<N: Notification, P: FailurePing> Notifier<N, P> {
    pub fn new<D: Into<PathBuf>>(notification: N, ping: P, sources: LogSources, dump_dir: D) -> Self {
        Self {
            notification,
            ping,
            sources,
            dump_dir: dump_dir.into(),
            attach_logs: false,
        }
    }

    pub fn attach_logs(mut self, attach_logs: bool) -> Self {
        self.attach_logs = attach_logs;
        self
    }

    /// Mails `failure` with the run's logs appended to its detail.
    pub fn notify_failure(&self, failure: &Failure) -> Result<()> {
        let subject = failure.subject();
        error!("{}\n{}", subject, failure.detail());
        let body = self.sources.compose_body(failure.detail());
        let attachments = if self.attach_logs {
            self.sources.attachments()
        } else {
            Vec::new()
        };
        self.deliver(&subject, &body, &attachments, "email-error")
    }

    /// Mails the logs of a run that died without reporting on its own, e.g.
    /// when the scheduler saw a non-zero exit. Logs are always attached.
    pub fn report_script_failure(&self) -> Result<()> {
        let body = self.sources.compose_body(
            "The backup script failed. The server logs are included below and attached.",
        );
        let attachments = self.sources.attachments();
        self.deliver(SCRIPT_FAILURE_SUBJECT, &body, &attachments, "send-email-error")
    }

    fn deliver(
        &self,
        subject: &str,
        body: &str,
        attachments: &[LogAttachment],
        dump_prefix: &str,
    ) -> Result<()> {
        let send_error = match self.notification.send(subject, body, attachments) {
            Ok(()) => {
                info!("Failure report sent: {}", subject);
                return Ok(());
            }
            Err(e) => e,
        };
        error!("Sending failure report failed: {}", send_error);

        let dump = self.dump_path(dump_prefix);
        let mut result = std::fs::write(&dump, format!("{}\n\n{}\n\n{}", send_error, subject, body))
            .map_err(Error::from)
            .with_msg(format!("Cannot write error dump {:?}", dump))
            .map(|_| error!("Wrote undelivered report to {}", dump.display()));
        if let Err(e) = self.ping.ping_fail() {
            error!("Health check ping failed: {}", e);
            result = match result {
                Ok(()) => Err(e),
                Err(prev) => Err(prev.chain(e)),
            };
        }

        Err(match result {
            Ok(()) => send_error,
            Err(e) => send_error.chain(e),
        })
    }

    fn dump_path(&self, prefix: &str) -> PathBuf {
        self.dump_dir.join(format!(
            "{}-{}.txt",
            prefix,
            Local::now().format("%Y-%m-%d-%H-%M-%S")
        ))
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::result_error::failure::FailureCategory;
    use std::cell::{Cell, RefCell};
    use std::fmt::Display;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingMail {
        fail: bool,
        sent: RefCell<Vec<(String, String, usize)>>,
    }

    impl Notification for RecordingMail {
        fn send<D1: Display, D2: Display>(
            &self,
            topic: D1,
            msg: D2,
            attachments: &[LogAttachment],
        ) -> Result<()> {
            self.sent
                .borrow_mut()
                .push((topic.to_string(), msg.to_string(), attachments.len()));
            if self.fail {
                Err(Error::SmtpSendError("554 relay denied".into()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct CountingPing {
        pings: Cell<usize>,
    }

    impl FailurePing for CountingPing {
        fn ping_fail(&self) -> Result<()> {
            self.pings.set(self.pings.get() + 1);
            Ok(())
        }
    }

    fn notifier(dir: &TempDir, fail: bool) -> Notifier<RecordingMail, CountingPing> {
        std::fs::write(dir.path().join("log-cmd.txt"), "==== Mounting Network Share ====\n").unwrap();
        let sources = LogSources::new()
            .with("Log from the backup script", dir.path().join("log-script.txt"))
            .with("Log from the cmd commands pipe", dir.path().join("log-cmd.txt"));
        Notifier::new(
            RecordingMail {
                fail,
                ..Default::default()
            },
            CountingPing::default(),
            sources,
            dir.path(),
        )
    }

    fn dumps(dir: &TempDir, prefix: &str) -> Vec<PathBuf> {
        std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.file_name()
                    .unwrap()
                    .to_string_lossy()
                    .starts_with(&format!("{}-", prefix))
            })
            .collect()
    }

    #[test]
    fn test_timeout_sends_exactly_one_mail() {
        let dir = TempDir::new().unwrap();
        let notifier = notifier(&dir, false);
        let failure = Failure::new(
            FailureCategory::CommandTimeout,
            "Mounting Network Share",
            "The command was:\nnet use Z: \\\\nas\\backups",
        );

        notifier.notify_failure(&failure).unwrap();

        let sent = notifier.notification.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "Backup Command Timeout: Mounting Network Share");
        assert!(sent[0].1.starts_with("The command was:\nnet use"));
        assert!(sent[0].1.contains("----==== SERVER LOGS ====----"));
        assert!(sent[0].1.contains("Log from the cmd commands pipe: \n==== Mounting"));
        assert_eq!(sent[0].2, 0);
        assert_eq!(notifier.ping.pings.get(), 0);
        assert!(dumps(&dir, "email-error").is_empty());
    }

    #[test]
    fn test_attach_logs_adds_existing_logs() {
        let dir = TempDir::new().unwrap();
        let notifier = notifier(&dir, false).attach_logs(true);

        notifier
            .notify_failure(&Failure::new(FailureCategory::BackupError, "", "disk full"))
            .unwrap();

        assert_eq!(notifier.notification.sent.borrow()[0].2, 1);
    }

    #[test]
    fn test_failed_mail_writes_dump_and_pings_once() {
        let dir = TempDir::new().unwrap();
        let notifier = notifier(&dir, true);
        let failure = Failure::new(FailureCategory::CommandError, "Backing up C:/data", "Exit code: 1");

        let err = notifier.notify_failure(&failure).unwrap_err();

        assert!(err.to_string().contains("554 relay denied"));
        assert_eq!(notifier.ping.pings.get(), 1);
        let dumps = dumps(&dir, "email-error");
        assert_eq!(dumps.len(), 1);
        let content = std::fs::read_to_string(&dumps[0]).unwrap();
        assert!(content.starts_with("SMTP server rejected message: 554 relay denied\n\n"));
        assert!(content.contains("Backup Command Error: Backing up C:/data\n\nExit code: 1"));
    }

    #[test]
    fn test_script_failure_report_attaches_logs() {
        let dir = TempDir::new().unwrap();
        let notifier = notifier(&dir, false);

        notifier.report_script_failure().unwrap();

        let sent = notifier.notification.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, SCRIPT_FAILURE_SUBJECT);
        assert_eq!(sent[0].2, 1);
    }

    #[test]
    fn test_failed_script_report_uses_its_own_dump_prefix() {
        let dir = TempDir::new().unwrap();
        let notifier = notifier(&dir, true);

        assert!(notifier.report_script_failure().is_err());
        assert_eq!(dumps(&dir, "send-email-error").len(), 1);
        assert_eq!(notifier.ping.pings.get(), 1);
    }
}
