use crate::backup::result_error::result::Result;
use getset::Getters;
use std::fmt::Display;

pub mod health_check;
pub mod notifier;
pub mod report;
pub mod smtp;

/// A file sent along with a notification.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct LogAttachment {
    file_name: String,
    content: Vec<u8>,
}

impl LogAttachment {
    pub fn new<S: Into<String>>(file_name: S, content: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content,
        }
    }
}

pub trait Notification {
    fn send<D1: Display, D2: Display>(
        &self,
        topic: D1,
        msg: D2,
        attachments: &[LogAttachment],
    ) -> Result<()>;
}

/// Out-of-band signal used when a notification itself could not be delivered.
pub trait FailurePing {
    fn ping_fail(&self) -> Result<()>;
}
