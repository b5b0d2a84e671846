use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::failure::FailureCategory;
use crate::backup::result_error::result::{escalate, Result};
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use chrono::{Datelike, NaiveDate};
use function_name::named;
use getset::Getters;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};
use validator::Validate;

static DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone, Copy, Debug, Default, Validate, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Every backup younger than or exactly this many days is kept.
    pub days_to_keep: u32,
    /// Outside the window, keep the newest backup of each calendar month.
    #[serde(default)]
    pub keep_first_of_month: bool,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct BackupFile {
    file_name: String,
    date: NaiveDate,
}

impl BackupFile {
    /// `None` unless `file_name` is `<prefix><YYYY-MM-DD><suffix>`.
    pub fn parse(file_name: &str, prefix: &str, suffix: &str) -> Option<BackupFile> {
        let date = file_name.strip_prefix(prefix)?.strip_suffix(suffix)?;
        NaiveDate::parse_from_str(date, DATE_FORMAT)
            .ok()
            .map(|date| BackupFile {
                file_name: file_name.to_owned(),
                date,
            })
    }

    pub fn file_name_for(prefix: &str, date: NaiveDate, suffix: &str) -> String {
        format!("{}{}{}", prefix, date.format(DATE_FORMAT), suffix)
    }

    fn month_key(&self) -> (i32, u32) {
        (self.date.year(), self.date.month())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct PruneReport {
    kept: Vec<String>,
    deleted: Vec<String>,
    /// Candidates whose date part did not parse; left alone.
    skipped: Vec<String>,
}

impl RetentionConfig {
    /// Returns the candidates that fall outside retention, newest first.
    ///
    /// Candidates are walked by file name descending, which for ISO dates is newest
    /// first, so the first out-of-window file met in a month is that month's newest
    /// and becomes its representative.
    pub fn get_delete<I>(&self, candidates: I, today: NaiveDate) -> impl Iterator<Item = BackupFile>
    where
        I: IntoIterator<Item = BackupFile>,
    {
        let policy = *self;
        let mut seen_months = HashSet::new();

        candidates
            .into_iter()
            .sorted_unstable_by_key(|file| Reverse(file.file_name.clone()))
            .filter(move |file| {
                let days_since = (today - file.date).num_days();
                if days_since <= i64::from(policy.days_to_keep) {
                    return false;
                }
                if !policy.keep_first_of_month {
                    return true;
                }
                // insert returns false when the month already has a representative
                !seen_months.insert(file.month_key())
            })
    }

    /// Deletes the backups in `backup_dir` that fall outside retention.
    #[named]
    pub fn prune<P: AsRef<Path>>(
        &self,
        backup_dir: P,
        prefix: &str,
        suffix: &str,
        today: NaiveDate,
    ) -> Result<PruneReport> {
        let backup_dir = backup_dir.as_ref();
        if !backup_dir.is_dir() {
            info!("Backup directory does not exist: {:?}", backup_dir);
            return escalate(
                FailureCategory::BackupError,
                "",
                format!("Backup directory does not exist: {}", backup_dir.display()),
            );
        }

        let mut report = PruneReport::default();
        let mut candidates = Vec::new();
        for entry in std::fs::read_dir(backup_dir)
            .map_err(Error::from)
            .with_msg(format!("Cannot list backup directory {:?}", backup_dir))?
        {
            let entry = entry?;
            let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if !file_name.starts_with(prefix) || !file_name.ends_with(suffix) {
                continue;
            }
            match BackupFile::parse(&file_name, prefix, suffix) {
                Some(file) => candidates.push(file),
                None => {
                    debug!("Skipping backup with unparseable date: {}", file_name);
                    report.skipped.push(file_name);
                }
            }
        }

        let all_names = candidates.iter().map(|f| f.file_name.clone()).collect_vec();
        for file in self.get_delete(candidates, today) {
            let path = backup_dir.join(&file.file_name);
            std::fs::remove_file(&path)
                .map_err(Error::from)
                .with_msg(format!("Failed to delete old backup {:?}", path))
                .with_debug_object_and_fn_name(*self, function_path!())?;
            info!("Deleted old backup: {}", file.file_name);
            report.deleted.push(file.file_name);
        }

        report.kept = all_names
            .into_iter()
            .filter(|n| !report.deleted.contains(n))
            .sorted_unstable_by(|a, b| b.cmp(a))
            .collect();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PREFIX: &str = "PRE-";
    const SUFFIX: &str = ".zbcp";

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn file(d: &str) -> BackupFile {
        BackupFile::parse(&format!("{PREFIX}{d}{SUFFIX}"), PREFIX, SUFFIX).unwrap()
    }

    fn deleted_dates(policy: RetentionConfig, files: &[&str], today: &str) -> Vec<String> {
        policy
            .get_delete(files.iter().map(|d| file(d)), date(today))
            .map(|f| f.date.format(DATE_FORMAT).to_string())
            .collect()
    }

    fn touch(dir: &TempDir, names: &[&str]) {
        for n in names {
            std::fs::write(dir.path().join(n), b"backup").unwrap();
        }
    }

    fn remaining(dir: &TempDir) -> Vec<String> {
        std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .sorted()
            .collect()
    }

    #[test]
    fn test_parse_backup_file() {
        let f = BackupFile::parse("PRE-2024-01-05.zbcp", PREFIX, SUFFIX).unwrap();
        assert_eq!(f.date(), &date("2024-01-05"));
        assert!(BackupFile::parse("PRE-2024-13-05.zbcp", PREFIX, SUFFIX).is_none());
        assert!(BackupFile::parse("PRE-latest.zbcp", PREFIX, SUFFIX).is_none());
        assert!(BackupFile::parse("OTHER-2024-01-05.zbcp", PREFIX, SUFFIX).is_none());
        assert!(BackupFile::parse("PRE-2024-01-05.log", PREFIX, SUFFIX).is_none());
        assert_eq!(
            BackupFile::file_name_for(PREFIX, date("2024-03-01"), SUFFIX),
            "PRE-2024-03-01.zbcp"
        );
    }

    #[test]
    fn test_boundary_day_is_retained() {
        let policy = RetentionConfig {
            days_to_keep: 30,
            keep_first_of_month: false,
        };
        // 2024-02-14 is exactly 30 days before 2024-03-15, 2024-02-13 is 31
        let deleted = deleted_dates(policy, &["2024-02-14", "2024-02-13"], "2024-03-15");
        assert_eq!(deleted, vec!["2024-02-13"]);
    }

    #[test]
    fn test_zero_days_keeps_only_today() {
        let policy = RetentionConfig {
            days_to_keep: 0,
            keep_first_of_month: false,
        };
        let deleted = deleted_dates(policy, &["2024-03-15", "2024-03-14"], "2024-03-15");
        assert_eq!(deleted, vec!["2024-03-14"]);
    }

    #[test]
    fn test_without_keep_first_of_month_everything_old_goes() {
        let policy = RetentionConfig {
            days_to_keep: 10,
            keep_first_of_month: false,
        };
        let deleted = deleted_dates(
            policy,
            &["2023-11-30", "2024-01-01", "2024-03-10", "2023-12-15"],
            "2024-03-15",
        );
        assert_eq!(deleted, vec!["2024-01-01", "2023-12-15", "2023-11-30"]);
    }

    #[test]
    fn test_newest_of_each_month_survives() {
        let policy = RetentionConfig {
            days_to_keep: 30,
            keep_first_of_month: true,
        };
        let deleted = deleted_dates(
            policy,
            &[
                "2023-12-01",
                "2023-12-31",
                "2024-01-03",
                "2024-01-17",
                "2024-01-28",
                "2024-02-10",
            ],
            "2024-03-15",
        );
        assert_eq!(deleted, vec!["2024-01-17", "2024-01-03", "2023-12-01"]);
    }

    #[test]
    fn test_in_window_files_do_not_claim_their_month() {
        let policy = RetentionConfig {
            days_to_keep: 20,
            keep_first_of_month: true,
        };
        // 2024-02-29 is inside the window, so February still needs a representative
        let deleted = deleted_dates(
            policy,
            &["2024-02-29", "2024-02-20", "2024-02-05"],
            "2024-03-15",
        );
        assert_eq!(deleted, vec!["2024-02-05"]);
    }

    #[test]
    fn test_prune_example_scenario() {
        let dir = TempDir::new().unwrap();
        touch(
            &dir,
            &["PRE-2024-01-05.zbcp", "PRE-2024-01-20.zbcp", "PRE-2024-02-10.zbcp"],
        );
        let policy = RetentionConfig {
            days_to_keep: 30,
            keep_first_of_month: true,
        };

        let report = policy
            .prune(dir.path(), PREFIX, SUFFIX, date("2024-03-15"))
            .unwrap();

        assert_eq!(report.deleted(), &vec!["PRE-2024-01-05.zbcp".to_string()]);
        assert_eq!(
            report.kept(),
            &vec![
                "PRE-2024-02-10.zbcp".to_string(),
                "PRE-2024-01-20.zbcp".to_string()
            ]
        );
        assert_eq!(
            remaining(&dir),
            vec!["PRE-2024-01-20.zbcp", "PRE-2024-02-10.zbcp"]
        );
    }

    #[test]
    fn test_prune_leaves_unrelated_and_unparseable_files() {
        let dir = TempDir::new().unwrap();
        touch(
            &dir,
            &[
                "PRE-2023-06-01.zbcp",
                "PRE-2023-06-02.zbcp",
                "PRE-2023-06-02.log",
                "PRE-broken.zbcp",
                "PRE-2023-06-31.zbcp",
                "notes.txt",
            ],
        );
        let policy = RetentionConfig {
            days_to_keep: 7,
            keep_first_of_month: true,
        };

        let report = policy
            .prune(dir.path(), PREFIX, SUFFIX, date("2024-03-15"))
            .unwrap();

        assert_eq!(report.deleted(), &vec!["PRE-2023-06-01.zbcp".to_string()]);
        assert_eq!(report.skipped().len(), 2);
        assert_eq!(
            remaining(&dir),
            vec![
                "PRE-2023-06-02.log",
                "PRE-2023-06-02.zbcp",
                "PRE-2023-06-31.zbcp",
                "PRE-broken.zbcp",
                "notes.txt"
            ]
        );
    }

    #[test]
    fn test_prune_twice_is_idempotent() {
        let dir = TempDir::new().unwrap();
        touch(
            &dir,
            &[
                "PRE-2023-10-02.zbcp",
                "PRE-2023-10-09.zbcp",
                "PRE-2023-11-20.zbcp",
                "PRE-2024-03-01.zbcp",
                "PRE-2024-03-14.zbcp",
            ],
        );
        let policy = RetentionConfig {
            days_to_keep: 14,
            keep_first_of_month: true,
        };
        let today = date("2024-03-15");

        policy.prune(dir.path(), PREFIX, SUFFIX, today).unwrap();
        let once = remaining(&dir);
        let second = policy.prune(dir.path(), PREFIX, SUFFIX, today).unwrap();

        assert!(second.deleted().is_empty());
        assert_eq!(remaining(&dir), once);
        assert_eq!(
            once,
            vec![
                "PRE-2023-10-09.zbcp",
                "PRE-2023-11-20.zbcp",
                "PRE-2024-03-01.zbcp",
                "PRE-2024-03-14.zbcp"
            ]
        );
    }

    #[test]
    fn test_empty_directory_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let report = RetentionConfig::default()
            .prune(dir.path(), PREFIX, SUFFIX, date("2024-03-15"))
            .unwrap();
        assert_eq!(report, PruneReport::default());
    }

    #[test]
    fn test_missing_directory_escalates() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone");
        let err = RetentionConfig::default()
            .prune(&missing, PREFIX, SUFFIX, date("2024-03-15"))
            .unwrap_err();

        let failure = err.as_failure().unwrap();
        assert_eq!(*failure.category(), FailureCategory::BackupError);
        assert!(failure.detail().starts_with("Backup directory does not exist"));
    }
}
