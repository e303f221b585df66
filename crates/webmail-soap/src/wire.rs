//! Wire structs for the mail service requests used by the composer.
//!
//! Field names follow the server's compact JSON encoding (`e` for
//! participants, `su` for subject, `mp` for MIME parts and so on).

use serde::{Deserialize, Serialize};

/// Namespace of mail service requests.
pub const MAIL_NAMESPACE: &str = "urn:zimbraMail";

/// Text node (`{"_content": "..."}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    /// Text value.
    #[serde(rename = "_content")]
    pub content: String,
}

impl Content {
    /// Wraps a string.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Participant of an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddr {
    /// Participant type code (`f`, `t`, `c`, `b`, `r`, `s`, `n`).
    pub t: String,
    /// Address.
    pub a: String,
    /// Personal name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
}

/// Participant as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmailInfo {
    /// Participant type code.
    pub t: String,
    /// Address.
    #[serde(default)]
    pub a: String,
    /// Personal name.
    #[serde(default)]
    pub p: Option<String>,
    /// Display (short) name.
    #[serde(default)]
    pub d: Option<String>,
}

/// MIME part of an outgoing message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MimePart {
    /// Content type.
    pub ct: String,
    /// Part body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    /// Content id for inline parts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci: Option<String>,
    /// Child parts.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mp: Vec<MimePart>,
}

impl MimePart {
    /// Creates a leaf part.
    #[must_use]
    pub fn leaf(ct: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            ct: ct.into(),
            content: Some(Content::new(body)),
            ..Self::default()
        }
    }

    /// Creates a container part.
    #[must_use]
    pub fn multipart(ct: impl Into<String>, parts: Vec<Self>) -> Self {
        Self {
            ct: ct.into(),
            mp: parts,
            ..Self::default()
        }
    }
}

/// Reference to a part of an existing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachedPart {
    /// Message id.
    pub mid: String,
    /// Part number within the message.
    pub part: String,
}

/// Attachments of an outgoing message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttachSpec {
    /// Comma-separated ids of freshly uploaded files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aid: Option<String>,
    /// Parts kept from a previously saved draft or forwarded message.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mp: Vec<AttachedPart>,
}

impl AttachSpec {
    /// Returns true if nothing is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aid.is_none() && self.mp.is_empty()
    }
}

/// Message payload shared by `SaveDraft` and `SendMsg`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MsgToSend {
    /// Existing draft id; updates the draft in place.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Message being replied to or forwarded.
    #[serde(rename = "origid", skip_serializing_if = "Option::is_none")]
    pub orig_id: Option<String>,
    /// Reply type: `r` reply, `w` forward.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rt: Option<String>,
    /// Flags; `!` marks the message urgent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub f: Option<String>,
    /// Participants.
    pub e: Vec<EmailAddr>,
    /// Subject.
    pub su: Content,
    /// Body parts.
    pub mp: Vec<MimePart>,
    /// Attachments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attach: Option<AttachSpec>,
}

/// MIME part as reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MimePartInfo {
    /// Part number, e.g. `2` or `2.1`.
    #[serde(default)]
    pub part: String,
    /// Content type.
    #[serde(default)]
    pub ct: String,
    /// Filename of attachment parts.
    #[serde(default)]
    pub filename: Option<String>,
    /// Size in bytes.
    #[serde(default)]
    pub s: Option<u64>,
    /// Content disposition (`attachment` or `inline`).
    #[serde(default)]
    pub cd: Option<String>,
    /// Content id.
    #[serde(default)]
    pub ci: Option<String>,
    /// Child parts.
    #[serde(default)]
    pub mp: Vec<MimePartInfo>,
}

impl MimePartInfo {
    /// Leaf parts that carry a file, depth first.
    #[must_use]
    pub fn attachments(&self) -> Vec<&Self> {
        let mut found = Vec::new();
        self.collect_attachments(&mut found);
        found
    }

    fn collect_attachments<'a>(&'a self, found: &mut Vec<&'a Self>) {
        if self.mp.is_empty() {
            if self.filename.is_some() || self.cd.as_deref() == Some("attachment") {
                found.push(self);
            }
            return;
        }
        for child in &self.mp {
            child.collect_attachments(found);
        }
    }
}

/// Message summary returned by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MsgInfo {
    /// Message id.
    pub id: String,
    /// Conversation id.
    #[serde(default)]
    pub cid: Option<String>,
    /// Date in milliseconds since the epoch.
    #[serde(default)]
    pub d: Option<i64>,
    /// Subject.
    #[serde(default)]
    pub su: Option<String>,
    /// Body fragment.
    #[serde(default)]
    pub fr: Option<String>,
    /// Flags (`u` unread, `f` flagged, `a` attachment, `!` urgent, ...).
    #[serde(default)]
    pub f: Option<String>,
    /// Folder id.
    #[serde(default)]
    pub l: Option<String>,
    /// Participants.
    #[serde(default)]
    pub e: Vec<EmailInfo>,
    /// MIME structure, present on full message replies.
    #[serde(default)]
    pub mp: Vec<MimePartInfo>,
}

/// Conversation summary returned by search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConvInfo {
    /// Conversation id.
    pub id: String,
    /// Subject.
    #[serde(default)]
    pub su: Option<String>,
    /// Fragment of the newest message.
    #[serde(default)]
    pub fr: Option<String>,
    /// Number of messages.
    #[serde(default)]
    pub n: u32,
    /// Date of the newest message in milliseconds since the epoch.
    #[serde(default)]
    pub d: Option<i64>,
    /// Flags.
    #[serde(default)]
    pub f: Option<String>,
    /// Participants.
    #[serde(default)]
    pub e: Vec<EmailInfo>,
}

/// `SaveDraftRequest`.
#[derive(Debug, Clone, Serialize)]
pub struct SaveDraftRequest {
    /// Draft contents.
    pub m: MsgToSend,
}

/// `SaveDraftResponse`.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveDraftResponse {
    /// The saved draft.
    #[serde(default)]
    pub m: Vec<MsgInfo>,
}

/// `SendMsgRequest`.
#[derive(Debug, Clone, Serialize)]
pub struct SendMsgRequest {
    /// Message contents.
    pub m: MsgToSend,
    /// Send uid; the server ignores a repeated send with the same uid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suid: Option<String>,
}

/// `SendMsgResponse`.
#[derive(Debug, Clone, Deserialize)]
pub struct SendMsgResponse {
    /// The sent message.
    #[serde(default)]
    pub m: Vec<MsgInfo>,
}

/// Action applied to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgAction {
    /// Operation (`delete`, `move`, `read`, ...).
    pub op: String,
    /// Target message ids, comma separated.
    pub id: String,
}

/// `MsgActionRequest`.
#[derive(Debug, Clone, Serialize)]
pub struct MsgActionRequest {
    /// Action to apply.
    pub action: MsgAction,
}

/// `MsgActionResponse`.
#[derive(Debug, Clone, Deserialize)]
pub struct MsgActionResponse {
    /// Applied action.
    pub action: MsgAction,
}

/// `SearchRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    /// Query in the server query language.
    pub query: String,
    /// Sort order, e.g. `dateDesc`.
    #[serde(rename = "sortBy")]
    pub sort_by: String,
    /// Page size.
    pub limit: u32,
    /// Page offset.
    pub offset: u32,
    /// `conversation` or `message`.
    pub types: String,
}

/// `SearchResponse`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    /// Matching conversations.
    #[serde(default)]
    pub c: Vec<ConvInfo>,
    /// Matching messages.
    #[serde(default)]
    pub m: Vec<MsgInfo>,
    /// Whether more results are available.
    #[serde(default)]
    pub more: bool,
    /// Offset of this page.
    #[serde(default)]
    pub offset: u32,
}
