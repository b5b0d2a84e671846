use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info, warn};
use zbackup_runner::backup::backup_config::BackupConfig;
use zbackup_runner::backup::backup_run::BackupRun;
use zbackup_runner::backup::logging::init_logger;
use zbackup_runner::backup::notifications::notifier::Notifier;

/// Mount the backup share, dump the database, prune old dumps and sync directories
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long, default_value = "config.yml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug, Default)]
enum Cmd {
    /// Run the backup (default)
    #[default]
    Run,
    /// Mail the logs of the last run, for schedulers that saw it exit non-zero
    ReportFailure,
}

fn main() {
    let args = Args::parse();

    let config = match BackupConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt::init();
            error!("{e}");
            exit(1);
        }
    };

    let command = args.command.unwrap_or_default();
    if let Err(e) = init_logger(&config.logs.script_log_path(), matches!(command, Cmd::Run)) {
        tracing_subscriber::fmt::init();
        error!("{e}");
        exit(1);
    }

    match config.check_version() {
        Ok(Some(warning)) => warn!("{warning}"),
        Ok(None) => {}
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    }

    let today = Local::now().date_naive();
    let notifier = Notifier::for_config(&config, today);

    let code = match command {
        Cmd::Run => match BackupRun::new(&config, today).and_then(|run| run.run()) {
            Ok(()) => 0,
            Err(e) => {
                let failure = e.failure();
                if let Err(e) = notifier.notify_failure(&failure) {
                    error!("Failure report was not delivered: {e}");
                }
                1
            }
        },
        Cmd::ReportFailure => match notifier.report_script_failure() {
            Ok(()) => {
                info!("Reported script failure");
                0
            }
            Err(e) => {
                error!("{e}");
                1
            }
        },
    };
    exit(code);
}
