//! Failure report content: the log files of the run, inlined under headings or
//! attached as files.

use crate::backup::notifications::LogAttachment;
use getset::Getters;
use std::path::{Path, PathBuf};
use tracing::warn;

pub static LOG_BANNER: &str = "\n\n----==== SERVER LOGS ====----\n";

#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct LogSource {
    label: String,
    path: PathBuf,
}

/// The log files a report is built from, in report order. Missing files are
/// skipped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogSources {
    sources: Vec<LogSource>,
}

impl LogSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<S: Into<String>, P: Into<PathBuf>>(mut self, label: S, path: P) -> Self {
        self.sources.push(LogSource {
            label: label.into(),
            path: path.into(),
        });
        self
    }

    pub fn sources(&self) -> &[LogSource] {
        &self.sources
    }

    /// `prefix`, the log banner, then every existing log under its heading.
    pub fn compose_body(&self, prefix: &str) -> String {
        let mut body = format!("{}{}", prefix, LOG_BANNER);
        for source in self.existing() {
            let content = match std::fs::read(&source.path) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    warn!("Cannot read {:?} for report: {}", source.path, e);
                    format!("(could not read {}: {})", source.path.display(), e)
                }
            };
            body.push_str(&format!("\n{}: \n{}\n\n", source.label, content));
        }
        body
    }

    pub fn attachments(&self) -> Vec<LogAttachment> {
        self.existing()
            .filter_map(|source| match std::fs::read(&source.path) {
                Ok(content) => Some(LogAttachment::new(file_name(&source.path), content)),
                Err(e) => {
                    warn!("Cannot attach {:?}: {}", source.path, e);
                    None
                }
            })
            .collect()
    }

    fn existing(&self) -> impl Iterator<Item = &LogSource> {
        self.sources.iter().filter(|s| s.path.is_file())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sources(dir: &TempDir) -> LogSources {
        LogSources::new()
            .with("Log from the backup script", dir.path().join("log-script.txt"))
            .with("Log from the cmd commands pipe", dir.path().join("log-cmd.txt"))
            .with("Log from rclone", dir.path().join("log-rclone.txt"))
    }

    #[test]
    fn test_body_has_banner_and_existing_logs_in_order() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("log-cmd.txt"), "mount ok\n").unwrap();
        std::fs::write(dir.path().join("log-script.txt"), "starting\n").unwrap();

        let body = sources(&dir).compose_body("The command was:\nrclone sync");

        assert!(body.starts_with("The command was:\nrclone sync\n\n----==== SERVER LOGS ====----\n"));
        assert!(body.contains("\nLog from the backup script: \nstarting\n"));
        assert!(body.contains("\nLog from the cmd commands pipe: \nmount ok\n"));
        assert!(!body.contains("Log from rclone"));
        assert!(body.find("backup script").unwrap() < body.find("cmd commands").unwrap());
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("log-rclone.txt"), b"bad \xff byte").unwrap();

        let body = sources(&dir).compose_body("");
        assert!(body.contains("bad \u{FFFD} byte"));
    }

    #[test]
    fn test_attachments_use_file_names() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("log-rclone.txt"), b"sync").unwrap();

        let attachments = sources(&dir).attachments();
        assert_eq!(
            attachments,
            vec![LogAttachment::new("log-rclone.txt", b"sync".to_vec())]
        );
    }
}
