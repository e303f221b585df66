//! Search result pages.

use chrono::{DateTime, Utc};

use crate::address::Participant;

/// A message in a result page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    /// Message id.
    pub id: String,
    /// Conversation id.
    pub conversation_id: Option<String>,
    /// Subject.
    pub subject: String,
    /// Start of the body.
    pub fragment: String,
    /// Participants with a valid address.
    pub participants: Vec<Participant>,
    /// Received date.
    pub date: Option<DateTime<Utc>>,
    /// Folder id.
    pub folder_id: Option<String>,
    /// Server flag letters.
    pub flags: String,
}

impl MessageSummary {
    /// Unread.
    #[must_use]
    pub fn is_unread(&self) -> bool {
        self.flags.contains('u')
    }

    /// Flagged.
    #[must_use]
    pub fn is_flagged(&self) -> bool {
        self.flags.contains('f')
    }

    /// Has at least one attachment.
    #[must_use]
    pub fn has_attachment(&self) -> bool {
        self.flags.contains('a')
    }

    /// High priority.
    #[must_use]
    pub fn is_urgent(&self) -> bool {
        self.flags.contains('!')
    }
}

/// A conversation in a result page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    /// Conversation id.
    pub id: String,
    /// Subject.
    pub subject: String,
    /// Start of the newest message.
    pub fragment: String,
    /// Participants with a valid address.
    pub participants: Vec<Participant>,
    /// Number of messages.
    pub message_count: u32,
    /// Date of the newest message.
    pub date: Option<DateTime<Utc>>,
    /// Server flag letters.
    pub flags: String,
}

impl ConversationSummary {
    /// Contains unread messages.
    #[must_use]
    pub fn is_unread(&self) -> bool {
        self.flags.contains('u')
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResults {
    /// Conversations, for conversation searches.
    pub conversations: Vec<ConversationSummary>,
    /// Messages, for message searches.
    pub messages: Vec<MessageSummary>,
    /// Whether another page exists.
    pub more: bool,
    /// Offset of this page.
    pub offset: u32,
}

impl SearchResults {
    /// Number of hits on this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.conversations.len() + self.messages.len()
    }

    /// Returns true if the page is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
