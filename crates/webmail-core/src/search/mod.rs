//! Search query building.
//!
//! Filters are turned into the server's query language and a sort key. The
//! server cannot order by read state, priority, flag or attachment presence,
//! so those orderings become an extra filter term on a newest-first list.
//!
//! # Example
//!
//! ```
//! use webmail_core::search::{SearchFilters, SortDirection, SortField, SortOrder, build_query};
//!
//! let built = build_query(
//!     &SearchFilters::default(),
//!     SortOrder::new(SortField::Read, SortDirection::Desc),
//! );
//! assert_eq!(built.query, "is:unread");
//! assert_eq!(built.sort_by, "dateDesc");
//! ```

mod query;
mod results;

use serde::{Deserialize, Serialize};

pub use query::{
    BuiltQuery, SearchFilters, SearchTerm, SortDirection, SortField, SortOrder, build_query,
    write_term,
};
pub use results::{ConversationSummary, MessageSummary, SearchResults};

/// What a search returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchType {
    /// Conversations.
    #[default]
    Conversation,
    /// Individual messages.
    Message,
}

impl SearchType {
    /// Server name of the result type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Message => "message",
        }
    }
}

/// A search to run against the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Query string.
    pub query: String,
    /// Server sort key.
    pub sort_by: String,
    /// Page size.
    pub limit: u32,
    /// Page offset.
    pub offset: u32,
    /// Restricts the search to a folder by id.
    pub folder_id: Option<String>,
    /// Result type.
    pub types: SearchType,
}

impl SearchRequest {
    /// First page of `built`, `page_size` hits per page.
    #[must_use]
    pub fn new(built: BuiltQuery, page_size: u32) -> Self {
        Self {
            query: built.query,
            sort_by: built.sort_by,
            limit: page_size,
            offset: 0,
            folder_id: None,
            types: SearchType::default(),
        }
    }

    /// Restricts the search to a folder id.
    #[must_use]
    pub fn in_folder(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }

    /// Sets the result type.
    #[must_use]
    pub const fn with_types(mut self, types: SearchType) -> Self {
        self.types = types;
        self
    }

    /// The page after this one.
    #[must_use]
    pub fn next_page(&self) -> Self {
        Self {
            offset: self.offset.saturating_add(self.limit),
            ..self.clone()
        }
    }
}
