//! Request and response shapes exchanged with the mail server.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use webmail_soap::Fault;

use crate::address::{Participant, ParticipantType, Sender};
use crate::editor::{Editor, ReplyType, SavedAttachment};

/// Failure of a mail server call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The request did not reach the server or the reply was lost.
    #[error("Network error: {0}")]
    Transport(String),

    /// The server rejected the request.
    #[error("{0}")]
    Fault(Fault),

    /// The server replied with something we could not interpret.
    #[error("Unexpected server response: {0}")]
    Protocol(String),
}

impl ApiError {
    /// Only transport failures are worth retrying automatically.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<webmail_soap::Error> for ApiError {
    fn from(error: webmail_soap::Error) -> Self {
        match error {
            webmail_soap::Error::Fault(fault) => Self::Fault(fault),
            e if e.is_transport() => Self::Transport(e.to_string()),
            e => Self::Protocol(e.to_string()),
        }
    }
}

/// Progress or outcome of one attachment upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStatus {
    /// Transfer in progress, percent complete (0-100).
    Running(u8),
    /// Server accepted the file.
    Completed(UploadedAttachment),
    /// Transfer stopped, with the reason.
    Aborted(String),
}

impl UploadStatus {
    /// Returns true once the upload can no longer change.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running(_))
    }
}

/// A file the server accepted for attaching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedAttachment {
    /// Attachment id to reference from a draft.
    pub aid: String,
    /// MIME type.
    pub content_type: String,
    /// Filename.
    pub filename: String,
    /// Size in bytes.
    pub size: u64,
}

/// A local file to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// Filename.
    pub filename: String,
    /// MIME type.
    pub content_type: String,
    /// File contents.
    pub data: Vec<u8>,
    /// Shown inline in the body.
    pub is_inline: bool,
}

impl UploadFile {
    /// Creates a regular (non-inline) attachment file.
    #[must_use]
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            data: data.into(),
            is_inline: false,
        }
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Message payload for save-draft and send calls, built from an editor snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingDraft {
    /// Existing server draft to update in place.
    pub draft_id: Option<String>,
    /// Sender, recipients and read receipt address.
    pub participants: Vec<Participant>,
    /// Subject.
    pub subject: String,
    /// Plain text body.
    pub plain: String,
    /// HTML body when composing rich text.
    pub html: Option<String>,
    /// Ids of completed uploads to attach.
    pub upload_ids: Vec<String>,
    /// Server attachments to keep.
    pub kept_attachments: Vec<SavedAttachment>,
    /// Message replied to or forwarded.
    pub original_message_id: Option<String>,
    /// Reply or forward.
    pub reply_type: Option<ReplyType>,
    /// High priority.
    pub is_urgent: bool,
}

impl OutgoingDraft {
    /// Builds the payload for the current editor state.
    ///
    /// Uploads that have not completed are left out.
    #[must_use]
    pub fn from_editor(editor: &Editor) -> Self {
        let mut participants = editor
            .sender
            .as_ref()
            .map(Sender::participants)
            .unwrap_or_default();
        participants.extend(editor.recipients.all());

        if editor.request_read_receipt {
            if let Some(sender) = &editor.sender {
                if let Some(from) = sender.participants().into_iter().next() {
                    participants.push(from.with_kind(ParticipantType::ReadReceipt));
                }
            }
        }

        Self {
            draft_id: editor.draft_id.clone(),
            participants,
            subject: editor.subject.clone(),
            plain: editor.text.plain.clone(),
            html: editor.is_rich_text.then(|| editor.text.rich.clone()),
            upload_ids: editor
                .unsaved_attachments
                .iter()
                .filter_map(|a| a.aid().map(str::to_string))
                .collect(),
            kept_attachments: editor.saved_attachments.clone(),
            original_message_id: editor.original_message_id.clone(),
            reply_type: editor.reply_type,
            is_urgent: editor.is_urgent,
        }
    }

    /// Upload ids carried by this payload, for reconciliation after a save.
    #[must_use]
    pub fn upload_id_set(&self) -> HashSet<&str> {
        self.upload_ids.iter().map(String::as_str).collect()
    }
}

/// Server confirmation of a saved draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedDraft {
    /// Server draft id.
    pub draft_id: String,
    /// Conversation the draft belongs to.
    pub conversation_id: Option<String>,
    /// Save time as recorded by the server.
    pub saved_at: Option<DateTime<Utc>>,
    /// Participants as stored by the server.
    pub participants: Vec<Participant>,
    /// Attachments now stored on the draft.
    pub attachments: Vec<SavedAttachment>,
}

/// Server confirmation of a sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Id of the message in the sent folder.
    pub message_id: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::editor::{EditorText, UnsavedAttachment, UploadId};

    fn participant(kind: ParticipantType, address: &str) -> Participant {
        Participant::new(kind, address).unwrap()
    }

    #[test]
    fn test_error_classification() {
        assert!(ApiError::Transport("reset".into()).is_retryable());
        assert!(!ApiError::Fault(Fault::new("quota", "mail.QUOTA_EXCEEDED")).is_retryable());
        assert!(!ApiError::Protocol("bad json".into()).is_retryable());

        let soap = webmail_soap::Error::Fault(Fault::new("nope", "mail.NO_SUCH_MSG"));
        assert!(matches!(ApiError::from(soap), ApiError::Fault(_)));
        let soap = webmail_soap::Error::InvalidResponse("missing Body".into());
        assert!(matches!(ApiError::from(soap), ApiError::Protocol(_)));
    }

    #[test]
    fn test_from_editor() {
        let mut editor = Editor::new("e1");
        editor.draft_id = Some("312".into());
        editor.sender = Some(Sender::Own(participant(ParticipantType::From, "me@x.it")));
        editor.recipients.to.push(participant(ParticipantType::To, "a@x.it"));
        editor.recipients.bcc.push(participant(ParticipantType::To, "b@x.it"));
        editor.subject = "Hi".into();
        editor.text = EditorText::new("hello", "<b>hello</b>");
        editor.request_read_receipt = true;
        editor.unsaved_attachments = vec![
            UnsavedAttachment {
                upload_id: UploadId(1),
                filename: "a.txt".into(),
                content_type: "text/plain".into(),
                size: 1,
                is_inline: false,
                status: UploadStatus::Completed(UploadedAttachment {
                    aid: "aid-1".into(),
                    content_type: "text/plain".into(),
                    filename: "a.txt".into(),
                    size: 1,
                }),
            },
            UnsavedAttachment {
                upload_id: UploadId(2),
                filename: "b.txt".into(),
                content_type: "text/plain".into(),
                size: 1,
                is_inline: false,
                status: UploadStatus::Running(10),
            },
        ];

        let draft = OutgoingDraft::from_editor(&editor);
        assert_eq!(draft.draft_id.as_deref(), Some("312"));
        assert_eq!(draft.html, None);
        assert_eq!(draft.upload_ids, vec!["aid-1"]);

        let kinds: Vec<_> = draft.participants.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ParticipantType::From,
                ParticipantType::To,
                ParticipantType::Bcc,
                ParticipantType::ReadReceipt
            ]
        );

        editor.is_rich_text = true;
        let draft = OutgoingDraft::from_editor(&editor);
        assert_eq!(draft.html.as_deref(), Some("<b>hello</b>"));
    }
}
