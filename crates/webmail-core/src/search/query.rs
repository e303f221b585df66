//! Query string construction.

use std::fmt::{self, Write as _};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One term of a server search query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTerm {
    /// Free text, passed through unquoted.
    Text(String),
    /// Messages in a folder (`in:`).
    In(String),
    /// Sender contains text.
    From(String),
    /// Recipient contains text.
    To(String),
    /// Subject contains text.
    Subject(String),
    /// Received before a day.
    Before(NaiveDate),
    /// Received after a day.
    After(NaiveDate),
    /// Unread messages.
    Unread,
    /// Read messages.
    Read,
    /// Flagged messages.
    Flagged,
    /// Unflagged messages.
    Unflagged,
    /// Messages with at least one attachment.
    HasAttachment,
    /// Messages with an attachment of a type (`pdf`, `image`, ...).
    AttachmentType(String),
    /// High priority messages.
    PriorityHigh,
    /// Low priority messages.
    PriorityLow,
    /// Larger than a size in KB.
    Larger(u64),
    /// Smaller than a size in KB.
    Smaller(u64),
    /// Negated term.
    Not(Box<SearchTerm>),
}

/// Returns true if the value must be quoted.
fn needs_quoting(value: &str) -> bool {
    value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\\' | '(' | ')' | ':'))
}

/// Writes a value, quoting and escaping it when needed.
fn write_value(out: &mut String, value: &str) {
    if needs_quoting(value) {
        out.push('"');
        for c in value.chars() {
            if c == '"' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('"');
    } else {
        out.push_str(value);
    }
}

/// Writes `in:` targets, which the server expects quoted.
fn write_folder(out: &mut String, folder: &str) {
    out.push('"');
    for c in folder.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

fn write_date(out: &mut String, date: NaiveDate) {
    let _ = write!(out, "{}", date.format("%m/%d/%Y"));
}

/// Appends the textual form of `term` to `out`.
pub fn write_term(out: &mut String, term: &SearchTerm) {
    match term {
        SearchTerm::Text(text) => out.push_str(text.trim()),
        SearchTerm::In(folder) => {
            out.push_str("in:");
            write_folder(out, folder);
        }
        SearchTerm::From(s) => {
            out.push_str("from:");
            write_value(out, s);
        }
        SearchTerm::To(s) => {
            out.push_str("to:");
            write_value(out, s);
        }
        SearchTerm::Subject(s) => {
            out.push_str("subject:");
            write_value(out, s);
        }
        SearchTerm::Before(date) => {
            out.push_str("before:");
            write_date(out, *date);
        }
        SearchTerm::After(date) => {
            out.push_str("after:");
            write_date(out, *date);
        }
        SearchTerm::Unread => out.push_str("is:unread"),
        SearchTerm::Read => out.push_str("is:read"),
        SearchTerm::Flagged => out.push_str("is:flagged"),
        SearchTerm::Unflagged => out.push_str("is:unflagged"),
        SearchTerm::HasAttachment => out.push_str("has:attachment"),
        SearchTerm::AttachmentType(kind) => {
            out.push_str("attachment:");
            write_value(out, kind);
        }
        SearchTerm::PriorityHigh => out.push_str("priority:high"),
        SearchTerm::PriorityLow => out.push_str("priority:low"),
        SearchTerm::Larger(kb) => {
            let _ = write!(out, "larger:{kb}KB");
        }
        SearchTerm::Smaller(kb) => {
            let _ = write!(out, "smaller:{kb}KB");
        }
        SearchTerm::Not(inner) => {
            out.push_str("NOT ");
            write_term(out, inner);
        }
    }
}

/// Message property a flag-like term selects on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Facet {
    Read,
    Flag,
    Attachment,
    Priority,
}

impl SearchTerm {
    fn facet(&self) -> Option<Facet> {
        match self {
            Self::Unread | Self::Read => Some(Facet::Read),
            Self::Flagged | Self::Unflagged => Some(Facet::Flag),
            Self::HasAttachment => Some(Facet::Attachment),
            Self::PriorityHigh | Self::PriorityLow => Some(Facet::Priority),
            Self::Not(inner) => inner.facet(),
            _ => None,
        }
    }
}

impl fmt::Display for SearchTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        write_term(&mut out, self);
        f.write_str(&out)
    }
}

/// User-facing search filters. Unset fields add no term.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Free text.
    pub keywords: Option<String>,
    /// Sender.
    pub from: Option<String>,
    /// Recipient.
    pub to: Option<String>,
    /// Subject.
    pub subject: Option<String>,
    /// Folder path, e.g. `Inbox` or `Work/Projects`.
    pub folder: Option<String>,
    /// Received before this day.
    pub before: Option<NaiveDate>,
    /// Received after this day.
    pub after: Option<NaiveDate>,
    /// `Some(true)` unread only, `Some(false)` read only.
    pub unread: Option<bool>,
    /// `Some(true)` flagged only, `Some(false)` unflagged only.
    pub flagged: Option<bool>,
    /// `Some(true)` with attachments only, `Some(false)` without.
    pub has_attachment: Option<bool>,
    /// Attachment type.
    pub attachment_type: Option<String>,
    /// Minimum size in KB.
    pub larger_than_kb: Option<u64>,
    /// Maximum size in KB.
    pub smaller_than_kb: Option<u64>,
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl SearchFilters {
    /// Terms for the set filters, in a stable order.
    #[must_use]
    pub fn terms(&self) -> Vec<SearchTerm> {
        let mut terms = Vec::new();

        if let Some(folder) = non_blank(self.folder.as_ref()) {
            terms.push(SearchTerm::In(folder));
        }
        if let Some(text) = non_blank(self.keywords.as_ref()) {
            terms.push(SearchTerm::Text(text));
        }
        if let Some(from) = non_blank(self.from.as_ref()) {
            terms.push(SearchTerm::From(from));
        }
        if let Some(to) = non_blank(self.to.as_ref()) {
            terms.push(SearchTerm::To(to));
        }
        if let Some(subject) = non_blank(self.subject.as_ref()) {
            terms.push(SearchTerm::Subject(subject));
        }
        if let Some(after) = self.after {
            terms.push(SearchTerm::After(after));
        }
        if let Some(before) = self.before {
            terms.push(SearchTerm::Before(before));
        }
        match self.unread {
            Some(true) => terms.push(SearchTerm::Unread),
            Some(false) => terms.push(SearchTerm::Read),
            None => {}
        }
        match self.flagged {
            Some(true) => terms.push(SearchTerm::Flagged),
            Some(false) => terms.push(SearchTerm::Unflagged),
            None => {}
        }
        match self.has_attachment {
            Some(true) => terms.push(SearchTerm::HasAttachment),
            Some(false) => terms.push(SearchTerm::Not(Box::new(SearchTerm::HasAttachment))),
            None => {}
        }
        if let Some(kind) = non_blank(self.attachment_type.as_ref()) {
            terms.push(SearchTerm::AttachmentType(kind));
        }
        if let Some(kb) = self.larger_than_kb {
            terms.push(SearchTerm::Larger(kb));
        }
        if let Some(kb) = self.smaller_than_kb {
            terms.push(SearchTerm::Smaller(kb));
        }

        terms
    }
}

/// Field a result list is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortField {
    /// Date.
    #[default]
    Date,
    /// Subject.
    Subject,
    /// Sender name.
    Name,
    /// Size.
    Size,
    /// Read state.
    Read,
    /// Priority.
    Priority,
    /// Flag.
    Flag,
    /// Attachment presence.
    Attachment,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    /// Ascending.
    Asc,
    /// Descending.
    #[default]
    Desc,
}

/// Requested ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortOrder {
    /// Field.
    pub field: SortField,
    /// Direction.
    pub direction: SortDirection,
}

impl SortOrder {
    /// Creates a sort order.
    #[must_use]
    pub const fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// Newest first.
    #[must_use]
    pub const fn newest_first() -> Self {
        Self::new(SortField::Date, SortDirection::Desc)
    }

    /// Server sort key plus an extra filter term for fields the server
    /// cannot sort on.
    ///
    /// Those fields are served as a filter (descending lists the matching
    /// messages, ascending the complement) ordered newest first.
    #[must_use]
    pub fn plan(self) -> (&'static str, Option<SearchTerm>) {
        use SortDirection::{Asc, Desc};

        match (self.field, self.direction) {
            (SortField::Date, Asc) => ("dateAsc", None),
            (SortField::Date, Desc) => ("dateDesc", None),
            (SortField::Subject, Asc) => ("subjAsc", None),
            (SortField::Subject, Desc) => ("subjDesc", None),
            (SortField::Name, Asc) => ("nameAsc", None),
            (SortField::Name, Desc) => ("nameDesc", None),
            (SortField::Size, Asc) => ("sizeAsc", None),
            (SortField::Size, Desc) => ("sizeDesc", None),
            (SortField::Read, Desc) => ("dateDesc", Some(SearchTerm::Unread)),
            (SortField::Read, Asc) => ("dateDesc", Some(SearchTerm::Read)),
            (SortField::Priority, Desc) => ("dateDesc", Some(SearchTerm::PriorityHigh)),
            (SortField::Priority, Asc) => ("dateDesc", Some(SearchTerm::PriorityLow)),
            (SortField::Flag, Desc) => ("dateDesc", Some(SearchTerm::Flagged)),
            (SortField::Flag, Asc) => ("dateDesc", Some(SearchTerm::Unflagged)),
            (SortField::Attachment, Desc) => ("dateDesc", Some(SearchTerm::HasAttachment)),
            (SortField::Attachment, Asc) => (
                "dateDesc",
                Some(SearchTerm::Not(Box::new(SearchTerm::HasAttachment))),
            ),
        }
    }
}

/// Query string and server sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltQuery {
    /// Query in the server query language.
    pub query: String,
    /// Server sort key.
    pub sort_by: String,
}

/// Builds the query string and sort key for `filters` ordered by `sort`.
#[must_use]
pub fn build_query(filters: &SearchFilters, sort: SortOrder) -> BuiltQuery {
    let mut terms = filters.terms();
    let (sort_by, extra) = sort.plan();
    // An explicit filter on the same property wins over the sort's term.
    if let Some(term) = extra {
        let facet = term.facet();
        if !terms.iter().any(|t| t.facet() == facet) {
            terms.push(term);
        }
    }

    let mut query = String::new();
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            query.push(' ');
        }
        write_term(&mut query, term);
    }

    BuiltQuery {
        query,
        sort_by: sort_by.to_string(),
    }
}
