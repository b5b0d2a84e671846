use crate::backup::command::runner::CommandResult;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// The cumulative command log of one run.
///
/// Truncated once when the run starts, then only ever appended to.
#[derive(Clone, Debug)]
pub struct CommandLog {
    path: PathBuf,
}

impl CommandLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn truncate(&self) -> Result<()> {
        File::create(&self.path)
            .map(|_| ())
            .map_err(Error::from)
            .with_msg(format!("Failed to truncate command log {:?}", self.path))
    }

    pub fn append_result(&self, result: &CommandResult) -> Result<()> {
        let mut entry = format!(
            "\n==== {} ====\n$ {}\n",
            result.description(),
            result.command_line()
        );
        if !result.stdout().is_empty() {
            entry.push_str("-- stdout --\n");
            entry.push_str(result.stdout());
            if !result.stdout().ends_with('\n') {
                entry.push('\n');
            }
        }
        if !result.stderr().is_empty() {
            entry.push_str("-- stderr --\n");
            entry.push_str(result.stderr());
            if !result.stderr().ends_with('\n') {
                entry.push('\n');
            }
        }
        entry.push_str(&format!("-- {} --\n", result.outcome()));
        self.append(&entry)
    }

    pub fn append_spawn_error(
        &self,
        description: &str,
        command_line: &str,
        error: &std::io::Error,
    ) -> Result<()> {
        self.append(&format!(
            "\n==== {} ====\n$ {}\n-- failed to start: {} --\n",
            description, command_line, error
        ))
    }

    /// Folds another tool's own log file into this one.
    pub fn append_tool_log(&self, command_line: &str, tool_log: &str) -> Result<()> {
        self.append(&format!(
            "\nRan Rclone command '{}' with output:\n{}\n\n",
            command_line, tool_log
        ))
    }

    fn append(&self, text: &str) -> Result<()> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(text.as_bytes()))
            .map_err(Error::from)
            .with_msg(format!("Failed to append to command log {:?}", self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_truncate_then_append_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log-cmd.txt");
        std::fs::write(&path, "previous run\n").unwrap();

        let log = CommandLog::new(&path);
        log.truncate().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        log.append_tool_log("rclone sync a b", "copied 3 files").unwrap();
        log.append_tool_log("rclone sync c d", "copied 1 file").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Ran Rclone command 'rclone sync a b' with output:\ncopied 3 files"));
        assert!(content.find("sync a b").unwrap() < content.find("sync c d").unwrap());
    }

    #[test]
    fn test_spawn_error_entry() {
        let dir = TempDir::new().unwrap();
        let log = CommandLog::new(dir.path().join("log-cmd.txt"));
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "No such file");
        log.append_spawn_error("SQL Backup", "zbackup out", &err).unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.contains("==== SQL Backup ===="));
        assert!(content.contains("failed to start: No such file"));
    }
}
