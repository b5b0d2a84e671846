use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use std::fs::OpenOptions;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

/// Logs to stdout and to the script log.
///
/// The file writer is synchronous so the script log is complete on disk when a
/// failure report reads it back. `fresh` truncates the log first, once per run.
/// The level comes from `RUST_LOG` and defaults to info.
pub fn init_logger(script_log: &Path, fresh: bool) -> Result<()> {
    let dir = match script_log.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = script_log
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            Error::from(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "script log has no file name",
            ))
        })?;

    if fresh {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(script_log)
            .map_err(Error::from)
            .with_msg(format!("Cannot truncate script log {:?}", script_log))?;
    }

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
        .map_err(Error::from)
        .with_msg(format!("Cannot open script log {:?}", script_log))?;

    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stdout))
        .with(fmt::layer().with_writer(file_appender).with_ansi(false))
        .with(filter_layer)
        .init();
    Ok(())
}
