use crate::backup::function_path;
use crate::backup::notifications::{LogAttachment, Notification};
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use bon::Builder;
use function_name::named;
use getset::Getters;
use itertools::Itertools;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use validator::Validate;

fn default_smtp_port() -> u16 {
    587
}

/// Where failure reports are mailed.
///
/// Subjects are prefixed with `machine_name` so reports from several servers can be
/// told apart. The password is kept in a `RedactedString`.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct SmtpNotificationConfig {
    #[validate(length(min = 1))]
    #[builder(into)]
    machine_name: String,
    #[validate(length(min = 1))]
    #[builder(into)]
    smtp_server: String,
    #[serde(default = "default_smtp_port")]
    #[builder(default = default_smtp_port())]
    smtp_port: u16,
    #[serde(default)]
    #[builder(default)]
    smtp_mode: SmtpMode,
    #[builder(into)]
    email_from: Mailbox,
    #[builder(into)]
    email_to: Mailbox,
    #[builder(into)]
    email_username: String,
    #[validate(nested)]
    email_password: RedactedString,
    /// Also attach the log files to failure mails, not only inline them.
    #[serde(default)]
    #[builder(default)]
    attach_logs: bool,
}

/// SMTP connection security modes
///
/// - `StartTls`: Start with plain text, then upgrade to TLS
/// - `Ssl`: TLS from the first byte (SMTPS)
/// - `Unsecured`: Plain text, for local relays and tests
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SmtpMode {
    #[default]
    StartTls,
    Ssl,
    Unsecured,
}

impl SmtpNotificationConfig {
    #[named]
    fn build_message(
        &self,
        subject: String,
        body: String,
        attachments: &[LogAttachment],
    ) -> Result<Message> {
        let builder = Message::builder()
            .from(self.email_from.clone())
            .to(self.email_to.clone())
            .subject(format!("{} - {}", self.machine_name, subject));

        let message = if attachments.is_empty() {
            builder.header(ContentType::TEXT_PLAIN).body(body)
        } else {
            let octet_stream = ContentType::parse("application/octet-stream")?;
            let multipart = attachments.iter().fold(
                MultiPart::mixed().singlepart(SinglePart::plain(body)),
                |multipart, attachment| {
                    multipart.singlepart(
                        Attachment::new(attachment.file_name().clone())
                            .body(attachment.content().clone(), octet_stream.clone()),
                    )
                },
            );
            builder.multipart(multipart)
        };

        message
            .map_err(Error::from)
            .with_msg(format!(
                "Fail to build notification email from {:?} to {:?}",
                self.email_from, self.email_to
            ))
            .with_debug_object_and_fn_name(self.smtp_server.clone(), function_path!())
    }

    fn transport(&self) -> Result<SmtpTransport> {
        let creds = Credentials::new(
            self.email_username.clone(),
            self.email_password.inner().to_string(),
        );

        let builder = match self.smtp_mode {
            SmtpMode::Unsecured => Ok(SmtpTransport::builder_dangerous(self.smtp_server.as_str())),
            SmtpMode::Ssl => SmtpTransport::relay(self.smtp_server.as_str()),
            SmtpMode::StartTls => SmtpTransport::starttls_relay(self.smtp_server.as_str()),
        }
        .map_err(Error::from)
        .with_msg(format!(
            "Failed to build smtp client for host: {:?} with mode {:?}",
            self.smtp_server, self.smtp_mode
        ))?;

        Ok(builder.port(self.smtp_port).credentials(creds).build())
    }
}

impl Notification for SmtpNotificationConfig {
    #[named]
    fn send<D1: Display, D2: Display>(
        &self,
        topic: D1,
        msg: D2,
        attachments: &[LogAttachment],
    ) -> Result<()> {
        tracing::info!(
            "Started smtp email notification from {} to {}",
            self.email_from,
            self.email_to
        );
        let email = self.build_message(topic.to_string(), msg.to_string(), attachments)?;
        let mailer = self.transport()?;

        tracing::info!("Sending email...");
        let response = mailer
            .send(&email)
            .map_err(Error::from)
            .with_debug_object_and_fn_name(self.smtp_server.clone(), function_path!())?;
        if response.is_positive() {
            tracing::info!("Sent email");
            Ok(())
        } else {
            let error_vec = response
                .message()
                .map(|m| Error::SmtpSendError(m.to_owned()))
                .collect_vec();
            Err(Error::LotsOfError(error_vec))
        }
    }
}
