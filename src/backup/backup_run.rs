use crate::backup::backup_config::BackupConfig;
use crate::backup::command::log::CommandLog;
use crate::backup::command::runner::CommandRunner;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use crate::backup::steps::sql::BACKUP_SUFFIX;
use chrono::NaiveDate;
use function_name::named;
use tracing::info;

/// One pass of the backup: mount, SQL dump, prune, sync. The first failing step
/// ends the run and its error carries what to report.
pub struct BackupRun<'a> {
    config: &'a BackupConfig,
    runner: CommandRunner,
    today: NaiveDate,
}

impl<'a> BackupRun<'a> {
    pub fn new(config: &'a BackupConfig, today: NaiveDate) -> Result<Self> {
        let decoder = config.output_decoding.resolve()?;
        let runner = CommandRunner::new(CommandLog::new(config.logs.command_log_path()), decoder);
        Ok(Self {
            config,
            runner,
            today,
        })
    }

    pub fn run(&self) -> Result<()> {
        info!("Starting backup run for {}", self.today);
        self.clear_logs()?;
        self.mount_network_share()?;
        self.sql_backup()?;
        self.prune_old_backups()?;
        self.sync_directories()?;
        info!("Backup run finished");
        Ok(())
    }

    /// The command log is cumulative per run; a stale rclone log would be folded
    /// into the first sync entry.
    fn clear_logs(&self) -> Result<()> {
        self.runner.log().truncate()?;
        let sync_log = self.config.logs.sync_log_path();
        if sync_log.exists() {
            std::fs::remove_file(&sync_log)
                .map_err(Error::from)
                .with_msg(format!("Cannot remove stale rclone log {:?}", sync_log))?;
        }
        Ok(())
    }

    fn mount_network_share(&self) -> Result<()> {
        match (
            self.config.features.mount_network_share,
            &self.config.network_share,
        ) {
            (true, Some(share)) => share.mount_if_needed(&self.runner),
            _ => {
                info!("Skipping network share mount as it's disabled in the configuration.");
                Ok(())
            }
        }
    }

    fn sql_backup(&self) -> Result<()> {
        match (self.config.features.perform_sql_backup, &self.config.zbackup) {
            (true, Some(zbackup)) => zbackup
                .run_backup(&self.config.sql_backup, self.today, &self.runner)
                .map(|file| info!("SQL backup written to {}", file.display())),
            _ => {
                info!("Skipping SQL backup as it's disabled in the configuration.");
                Ok(())
            }
        }
    }

    #[named]
    fn prune_old_backups(&self) -> Result<()> {
        let retention = match (self.config.features.prune_old_backups, &self.config.retention) {
            (true, Some(retention)) => retention,
            _ => {
                info!("Skipping pruning of old backups as it's disabled in the configuration.");
                return Ok(());
            }
        };

        let sql_backup = &self.config.sql_backup;
        info!("Pruning old backups in {}", sql_backup.sql_backup_path().display());
        let report = retention
            .prune(
                sql_backup.sql_backup_path(),
                sql_backup.backup_name_prefix(),
                BACKUP_SUFFIX,
                self.today,
            )
            .with_debug_object_and_fn_name(*retention, function_path!())?;
        info!(
            "Pruned {} old backups, kept {}",
            report.deleted().len(),
            report.kept().len()
        );
        Ok(())
    }

    fn sync_directories(&self) -> Result<()> {
        let sync_log = self.config.logs.sync_log_path();
        self.config
            .backup
            .directories_to_backup()
            .iter()
            .try_for_each(|src| self.config.backup.sync_directory(src, &self.runner, &sync_log))
    }
}
