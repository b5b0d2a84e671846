use crate::backup::result_error::failure::{Failure, FailureCategory};
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use itertools::Itertools;
use std::fmt::Debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    Address(#[from] lettre::address::AddressError),
    #[error(transparent)]
    EmailBuild(#[from] lettre::error::Error),
    #[error(transparent)]
    ContentType(#[from] lettre::message::header::ContentTypeErr),
    #[error(transparent)]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    LogInit(#[from] tracing_appender::rolling::InitError),
    #[error("SMTP server rejected message: {0}")]
    SmtpSendError(String),
    #[error("Unknown text encoding label: {0:?}")]
    UnknownEncoding(String),
    #[error("Config version mismatch: expected {expected}, found {found}")]
    ConfigVersionMismatch { expected: u32, found: u32 },
    #[error("{0}")]
    Failure(Failure),
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{:?} {} failed:\n{}", obj_debug, fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithDebugObjAndFnName {
        error: Box<Error>,
        obj_debug: Box<dyn Debug + Send>,
        fn_name: String,
    },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

impl<S: Into<String>, O: Debug + Send + 'static> WithDebugObjectAndFnName<S, O> for Error {
    fn with_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        Error::WithDebugObjAndFnName {
            error: Box::new(self),
            obj_debug: Box::new(obj),
            fn_name: fn_name.into(),
        }
    }
}

impl<S: Into<String>> WithMsg<S> for Error {
    fn with_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl From<Failure> for Error {
    fn from(value: Failure) -> Self {
        Self::Failure(value)
    }
}

impl Error {
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(|e| e.into_iter())),
            e => Box::new(std::iter::once(e)),
        }
    }

    pub fn chain(self, other: Error) -> Error {
        Error::LotsOfError(self.into_iter().chain(other.into_iter()).collect_vec())
    }

    /// Finds the escalation wrapped anywhere inside this error.
    pub fn as_failure(&self) -> Option<&Failure> {
        match self {
            Error::Failure(f) => Some(f),
            Error::WithMsg { error, .. } | Error::WithDebugObjAndFnName { error, .. } => {
                error.as_failure()
            }
            Error::LotsOfError(v) => v.iter().find_map(Error::as_failure),
            _ => None,
        }
    }

    /// The failure to report for this error.
    ///
    /// Escalations keep their category and description. Anything else (an I/O
    /// error while pruning, a bad mail address) is reported as a plain backup
    /// error whose detail is the full error text.
    pub fn failure(&self) -> Failure {
        match self {
            Error::Failure(f) => f.clone(),
            e => match e.as_failure() {
                Some(f) => Failure::new(
                    *f.category(),
                    f.description().clone(),
                    format!("{}\n\n{}", f.detail(), e),
                ),
                None => Failure::new(FailureCategory::BackupError, "", e.to_string()),
            },
        }
    }
}
