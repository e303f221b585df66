//! Reply/forward setup and pre-send validation.

use chrono::{DateTime, Utc};

use super::model::{Editor, EditorId, EditorText, Recipients, ReplyType, SavedAttachment};
use crate::address::{EmailAddress, Participant, ParticipantType};
use crate::api::UploadStatus;

/// Why a composition cannot be sent yet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComposeError {
    /// No recipient in any field.
    #[error("Please enter at least one recipient")]
    NoRecipients,
    /// Some attachments are still uploading.
    #[error("{0} attachment(s) still uploading")]
    UploadsPending(usize),
}

/// The message being replied to or forwarded.
#[derive(Debug, Clone)]
pub struct OriginalMessage {
    /// Server message id.
    pub id: String,
    /// Subject.
    pub subject: String,
    /// Author.
    pub from: Participant,
    /// Reply-to address, if the author asked for replies elsewhere.
    pub reply_to: Option<Participant>,
    /// Primary recipients.
    pub to: Vec<Participant>,
    /// Cc recipients.
    pub cc: Vec<Participant>,
    /// Send date.
    pub date: Option<DateTime<Utc>>,
    /// Plain text body.
    pub body: String,
    /// Attachments on the original message.
    pub attachments: Vec<SavedAttachment>,
}

fn prefixed(prefix: &str, subject: &str) -> String {
    let lower = subject.trim_start().to_lowercase();
    if lower.starts_with(&prefix.to_lowercase()) {
        subject.to_string()
    } else {
        format!("{prefix} {subject}")
    }
}

impl Editor {
    /// Creates an editor replying to `original`.
    ///
    /// With `reply_all`, the original To and Cc recipients are kept, minus
    /// `own_address` and duplicates.
    #[must_use]
    pub fn reply(
        id: impl Into<EditorId>,
        original: &OriginalMessage,
        reply_all: bool,
        own_address: Option<&EmailAddress>,
    ) -> Self {
        let target = original
            .reply_to
            .as_ref()
            .unwrap_or(&original.from)
            .clone()
            .with_kind(ParticipantType::To);
        let mut seen = vec![target.address.clone()];
        if let Some(own) = own_address {
            seen.push(own.clone());
        }

        let mut recipients = Recipients {
            to: vec![target],
            ..Recipients::default()
        };

        if reply_all {
            for p in &original.to {
                if !seen.contains(&p.address) {
                    seen.push(p.address.clone());
                    recipients.to.push(p.clone().with_kind(ParticipantType::To));
                }
            }
            for p in &original.cc {
                if !seen.contains(&p.address) {
                    seen.push(p.address.clone());
                    recipients.cc.push(p.clone().with_kind(ParticipantType::Cc));
                }
            }
        }

        let quoted = format!("\n\n> {}", original.body.replace('\n', "\n> "));

        let mut editor = Self::new(id);
        editor.subject = prefixed("Re:", &original.subject);
        editor.text = EditorText::new(quoted, String::new());
        editor.recipients = recipients;
        editor.original_message_id = Some(original.id.clone());
        editor.reply_type = Some(ReplyType::Reply);
        editor
    }

    /// Creates an editor forwarding `original` with its attachments.
    #[must_use]
    pub fn forward(id: impl Into<EditorId>, original: &OriginalMessage) -> Self {
        let date = original
            .date
            .map(|d| format!("Date: {}\n", d.format("%a, %d %b %Y %H:%M:%S %z")))
            .unwrap_or_default();

        let body = format!(
            "\n\n---------- Forwarded message ----------\nFrom: {}\n{date}Subject: {}\n\n{}",
            original.from.display(),
            original.subject,
            original.body
        );

        let mut editor = Self::new(id);
        editor.subject = prefixed("Fwd:", &original.subject);
        editor.text = EditorText::new(body, String::new());
        editor.saved_attachments.clone_from(&original.attachments);
        editor.original_message_id = Some(original.id.clone());
        editor.reply_type = Some(ReplyType::Forward);
        editor
    }

    /// Checks that the composition can be sent.
    ///
    /// # Errors
    ///
    /// Returns the first blocking problem found.
    pub fn validate(&self) -> Result<(), ComposeError> {
        if self.recipients.is_empty() {
            return Err(ComposeError::NoRecipients);
        }

        let pending = self
            .unsaved_attachments
            .iter()
            .filter(|a| matches!(a.status, UploadStatus::Running(_)))
            .count();
        if pending > 0 {
            return Err(ComposeError::UploadsPending(pending));
        }

        Ok(())
    }
}
