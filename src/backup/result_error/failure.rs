//! Escalated failures.
//!
//! A [`Failure`] is what ends a run: it is carried up the call chain inside
//! [`Error::Failure`](crate::backup::result_error::error::Error::Failure) and handed
//! to the notifier by `main`, which then exits with status 1.

use derive_more::Display;
use getset::Getters;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize)]
pub enum FailureCategory {
    #[display("Command Error")]
    CommandError,
    #[display("Command Timeout")]
    CommandTimeout,
    #[display("Error")]
    BackupError,
}

#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct Failure {
    category: FailureCategory,
    /// Human label of the failing step, e.g. "SQL Backup with ZBackup".
    description: String,
    /// Explanatory text placed at the top of the mail body.
    detail: String,
}

impl Failure {
    pub fn new<D1: Into<String>, D2: Into<String>>(
        category: FailureCategory,
        description: D1,
        detail: D2,
    ) -> Self {
        Self {
            category,
            description: description.into(),
            detail: detail.into(),
        }
    }

    pub fn subject(&self) -> String {
        match self.category {
            FailureCategory::BackupError if self.description.is_empty() => {
                format!("Backup {}", self.category)
            }
            _ => format!("Backup {}: {}", self.category, self.description),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n{}", self.subject(), self.detail)
    }
}
