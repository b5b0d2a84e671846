//! Validation functions for configuration values.
//!
//! Custom validators for file name prefixes, source directories, URLs and the log
//! directory, used through `#[validate(custom(function = ...))]`.

use reqwest::Url;
use sanitize_filename::{is_sanitized, sanitize};
use std::path::Path;
use validator::ValidationError;

pub fn validate_file_name_prefix<S: AsRef<str>>(prefix: S) -> Result<(), ValidationError> {
    let prefix = prefix.as_ref();
    if prefix.is_empty() {
        return Err(ValidationError::new("InvalidFileNamePrefix")
            .with_message("backup_name_prefix must not be empty".into()));
    }
    if !is_sanitized(prefix) {
        return Err(ValidationError::new("InvalidFileNamePrefix").with_message(
            format!(
                "Invalid file name prefix, try sanitizing like {:?}",
                sanitize(prefix)
            )
            .into(),
        ));
    }

    Ok(())
}

/// Source directories are mapped onto the destination by dropping their drive or
/// root, so relative paths are rejected.
pub fn validate_source_dirs<S: AsRef<str>>(dirs: &[S]) -> Result<(), ValidationError> {
    for dir in dirs {
        let dir = dir.as_ref();
        if !(has_drive_prefix(dir) || dir.starts_with('/')) {
            return Err(ValidationError::new("InvalidSourceDirectory").with_message(
                format!("{:?} must be an absolute path like C:/path/to/dir", dir).into(),
            ));
        }
    }

    Ok(())
}

pub(crate) fn has_drive_prefix(path: &str) -> bool {
    let mut chars = path.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic()
    )
}

pub fn validate_http_url<S: AsRef<str>>(url: S) -> Result<(), ValidationError> {
    let url = url.as_ref();
    match Url::parse(url) {
        Ok(u) if u.scheme() == "http" || u.scheme() == "https" => Ok(()),
        Ok(u) => Err(ValidationError::new("InvalidUrl")
            .with_message(format!("unsupported scheme {:?} in {:?}", u.scheme(), url).into())),
        Err(e) => Err(ValidationError::new("InvalidUrl")
            .with_message(format!("cannot parse {:?}: {}", url, e).into())),
    }
}

pub fn validate_writable_dir<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        std::fs::create_dir_all(dir).map_err(|e| {
            ValidationError::new("InvalidDirectory").with_message(
                format!("cannot create or access log dir {:?}: {}", dir, e).into(),
            )
        })?;
    }

    let md = std::fs::metadata(dir).map_err(|e| {
        ValidationError::new("InvalidDirectory")
            .with_message(format!("cannot access metadata for {:?}: {}", dir, e).into())
    })?;
    if md.permissions().readonly() {
        Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("cannot write to dir {:?}", dir).into()))
    } else {
        Ok(())
    }
}
