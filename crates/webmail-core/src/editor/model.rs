//! Draft editor data model.

use serde::{Deserialize, Serialize};

use crate::address::{Participant, ParticipantType, Sender};
use crate::api::UploadStatus;

/// Identifier of an open composition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EditorId(pub String);

impl EditorId {
    /// Creates an editor id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EditorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EditorId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identifier of a tracked attachment upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UploadId(pub u64);

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "upload-{}", self.0)
    }
}

/// Body text in both editing modes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorText {
    /// Plain text variant.
    pub plain: String,
    /// HTML variant, used when the editor is in rich text mode.
    pub rich: String,
}

impl EditorText {
    /// Creates body text.
    #[must_use]
    pub fn new(plain: impl Into<String>, rich: impl Into<String>) -> Self {
        Self {
            plain: plain.into(),
            rich: rich.into(),
        }
    }
}

/// Recipients in their three address fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipients {
    /// To.
    pub to: Vec<Participant>,
    /// Cc.
    pub cc: Vec<Participant>,
    /// Bcc.
    pub bcc: Vec<Participant>,
}

impl Recipients {
    /// Returns true if no field has a recipient.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty()
    }

    /// All recipients with their role set from the field they are in.
    #[must_use]
    pub fn all(&self) -> Vec<Participant> {
        let tagged = |list: &[Participant], kind| {
            list.iter()
                .cloned()
                .map(move |p| p.with_kind(kind))
                .collect::<Vec<_>>()
        };

        let mut all = tagged(&self.to, ParticipantType::To);
        all.extend(tagged(&self.cc, ParticipantType::Cc));
        all.extend(tagged(&self.bcc, ParticipantType::Bcc));
        all
    }
}

/// Attachment already stored on the server as part of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedAttachment {
    /// Message holding the part.
    pub message_id: String,
    /// MIME part number.
    pub part: String,
    /// Filename.
    pub filename: String,
    /// MIME type.
    pub content_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Shown inline in the body rather than as a file.
    pub is_inline: bool,
    /// Content id referenced by inline images (`cid:`).
    pub content_id: Option<String>,
    /// Upload this part came from, while it was uploaded in this session.
    #[serde(default)]
    pub upload_id: Option<UploadId>,
}

/// Attachment picked locally and not yet part of a saved draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsavedAttachment {
    /// Tracker id.
    pub upload_id: UploadId,
    /// Filename.
    pub filename: String,
    /// MIME type.
    pub content_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Shown inline in the body rather than as a file.
    pub is_inline: bool,
    /// Upload progress or result.
    pub status: UploadStatus,
}

impl UnsavedAttachment {
    /// Server attachment id once the upload completed.
    #[must_use]
    pub fn aid(&self) -> Option<&str> {
        match &self.status {
            UploadStatus::Completed(uploaded) => Some(&uploaded.aid),
            _ => None,
        }
    }
}

/// How a composition relates to an existing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyType {
    /// Reply or reply-all.
    Reply,
    /// Forward.
    Forward,
}

impl ReplyType {
    /// Server code (`r` or `w`).
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Reply => "r",
            Self::Forward => "w",
        }
    }
}

/// In-memory state of one open composition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Editor {
    /// Editor id.
    pub id: EditorId,
    /// Server-assigned draft id once the draft has been saved.
    pub draft_id: Option<String>,
    /// Identity the message is sent as; `None` uses the account default.
    pub sender: Option<Sender>,
    /// Whether the body is edited as HTML.
    pub is_rich_text: bool,
    /// Body.
    pub text: EditorText,
    /// Recipients.
    pub recipients: Recipients,
    /// Subject line.
    pub subject: String,
    /// Attachments already on the server.
    pub saved_attachments: Vec<SavedAttachment>,
    /// Attachments being uploaded or uploaded since the last save.
    pub unsaved_attachments: Vec<UnsavedAttachment>,
    /// Message replied to or forwarded.
    pub original_message_id: Option<String>,
    /// Reply or forward.
    pub reply_type: Option<ReplyType>,
    /// High priority.
    pub is_urgent: bool,
    /// Ask recipients for a read receipt.
    pub request_read_receipt: bool,
}

impl Editor {
    /// Creates an empty plain text editor.
    #[must_use]
    pub fn new(id: impl Into<EditorId>) -> Self {
        Self {
            id: id.into(),
            draft_id: None,
            sender: None,
            is_rich_text: false,
            text: EditorText::default(),
            recipients: Recipients::default(),
            subject: String::new(),
            saved_attachments: Vec::new(),
            unsaved_attachments: Vec::new(),
            original_message_id: None,
            reply_type: None,
            is_urgent: false,
            request_read_receipt: false,
        }
    }

    /// Finds an unsaved attachment by upload id.
    #[must_use]
    pub fn unsaved_attachment(&self, upload_id: UploadId) -> Option<&UnsavedAttachment> {
        self.unsaved_attachments
            .iter()
            .find(|a| a.upload_id == upload_id)
    }
}

/// Partial update to an editor. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorPatch {
    /// New sender identity.
    pub sender: Option<Sender>,
    /// New editing mode.
    pub is_rich_text: Option<bool>,
    /// New body.
    pub text: Option<EditorText>,
    /// New recipients.
    pub recipients: Option<Recipients>,
    /// New subject.
    pub subject: Option<String>,
    /// New set of kept server attachments.
    pub saved_attachments: Option<Vec<SavedAttachment>>,
    /// New urgent flag.
    pub is_urgent: Option<bool>,
    /// New read receipt flag.
    pub request_read_receipt: Option<bool>,
}

impl EditorPatch {
    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn text(mut self, plain: impl Into<String>, rich: impl Into<String>) -> Self {
        self.text = Some(EditorText::new(plain, rich));
        self
    }

    /// Sets the recipients.
    #[must_use]
    pub fn recipients(mut self, recipients: Recipients) -> Self {
        self.recipients = Some(recipients);
        self
    }

    /// Sets the urgent flag.
    #[must_use]
    pub const fn urgent(mut self, urgent: bool) -> Self {
        self.is_urgent = Some(urgent);
        self
    }

    /// Sets the read receipt flag.
    #[must_use]
    pub const fn read_receipt(mut self, request: bool) -> Self {
        self.request_read_receipt = Some(request);
        self
    }

    /// Sets the editing mode.
    #[must_use]
    pub const fn rich_text(mut self, rich: bool) -> Self {
        self.is_rich_text = Some(rich);
        self
    }

    /// Merges the present fields into `editor`.
    pub fn apply(self, editor: &mut Editor) {
        if let Some(sender) = self.sender {
            editor.sender = Some(sender);
        }
        if let Some(rich) = self.is_rich_text {
            editor.is_rich_text = rich;
        }
        if let Some(text) = self.text {
            editor.text = text;
        }
        if let Some(recipients) = self.recipients {
            editor.recipients = recipients;
        }
        if let Some(subject) = self.subject {
            editor.subject = subject;
        }
        if let Some(saved) = self.saved_attachments {
            editor.saved_attachments = saved;
        }
        if let Some(urgent) = self.is_urgent {
            editor.is_urgent = urgent;
        }
        if let Some(receipt) = self.request_read_receipt {
            editor.request_read_receipt = receipt;
        }
    }
}
