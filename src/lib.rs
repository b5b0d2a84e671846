//! # zbackup-runner
//!
//! A scheduled backup runner for a Windows server hosting a SQL Server database.
//!
//! ## Features
//!
//! - **Network Share**: Mounts the backup share when it is missing
//! - **SQL Dumps**: Runs ZBackup to write a dated dump of the database
//! - **Retention Management**: Keeps recent dumps plus the newest dump of each older month
//! - **Directory Sync**: Mirrors directories to the share with rclone
//! - **Failure Reports**: Mails the failing step with all logs, or leaves a dump file and
//!   pings the health check when mail is down
//!
//! ## Quick Start
//!
//! ```no_run
//! use chrono::Local;
//! use zbackup_runner::backup::backup_config::BackupConfig;
//! use zbackup_runner::backup::backup_run::BackupRun;
//!
//! let config = BackupConfig::load("config.yml")?;
//! BackupRun::new(&config, Local::now().date_naive())?.run()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
