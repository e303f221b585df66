//! # webmail-core
//!
//! Composer logic for the webmail client.
//!
//! This crate provides:
//! - Recipient address parsing and validation
//! - Draft editor state, one [`Editor`] per open composition
//! - Debounced autosave and the undo-send countdown ([`DraftSync`])
//! - Attachment upload tracking with cancellation ([`UploadTracker`])
//! - Search query building for the server query language
//!
//! All server traffic goes through the [`MailApi`] trait, implemented for
//! `webmail_soap::SoapClient` in [`service`].
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use webmail_core::{ComposerConfig, DraftSync, Editor, EditorId, EditorStore, service};
//!
//! let config = ComposerConfig::load_or_default(&ComposerConfig::default_path()).await;
//! let api = Arc::new(service::connect(&config)?);
//! let store = Arc::new(EditorStore::new());
//! let sync = DraftSync::spawn(Arc::clone(&store), api, config);
//!
//! let id = EditorId::new("compose-1");
//! store.create_editor(id.clone(), Editor::new(id.clone()), false)?;
//! store.update_subject(&id, "Lunch")?;
//! let handle = sync.send(&id)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod address;
pub mod api;
pub mod config;
pub mod editor;
mod error;
pub mod pipeline;
pub mod search;
pub mod service;
pub mod upload;

pub use address::{
    EmailAddress, InvalidAddress, Participant, ParticipantType, Sender, is_valid_email,
    parse_multiple_emails,
};
pub use api::{
    ApiError, MailApi, OutgoingDraft, SavedDraft, SentMessage, UploadFile, UploadStatus,
    UploadedAttachment,
};
pub use config::{ComposerConfig, RetryPolicy};
pub use editor::{
    ChangeOrigin, ComposeError, Editor, EditorEvent, EditorId, EditorPatch, EditorStore,
    OriginalMessage, Recipients, ReplyType, UploadId,
};
pub use error::{Error, Result};
pub use pipeline::{DraftPhase, DraftStatus, DraftSync, SendHandle, SendOutcome};
pub use search::{
    SearchFilters, SearchRequest, SearchResults, SortDirection, SortField, SortOrder, build_query,
};
pub use upload::{UploadProgress, UploadTracker};
