//! The seam between composer logic and the mail server.
//!
//! [`MailApi`] is what the pipeline, upload tracker and search talk to. The
//! production implementation sits on top of `webmail_soap::SoapClient` (see
//! [`crate::service`]); tests substitute an in-memory recorder.

mod types;

use std::future::Future;

pub use types::{
    ApiError, OutgoingDraft, SavedDraft, SentMessage, UploadFile, UploadStatus, UploadedAttachment,
};

use crate::search::{SearchRequest, SearchResults};
use crate::upload::UploadProgress;

/// Mail server operations used by the composer.
pub trait MailApi: Send + Sync + 'static {
    /// Creates or updates (when `draft.draft_id` is set) a server draft.
    fn save_draft(
        &self,
        draft: &OutgoingDraft,
    ) -> impl Future<Output = Result<SavedDraft, ApiError>> + Send;

    /// Sends a message. `send_uid` lets the server drop duplicate sends.
    fn send_message(
        &self,
        draft: &OutgoingDraft,
        send_uid: &str,
    ) -> impl Future<Output = Result<SentMessage, ApiError>> + Send;

    /// Deletes a saved draft.
    fn delete_draft(&self, draft_id: &str) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Uploads a file, reporting progress through `progress`.
    fn upload(
        &self,
        file: UploadFile,
        progress: UploadProgress,
    ) -> impl Future<Output = Result<UploadedAttachment, ApiError>> + Send;

    /// Runs a search.
    fn search(
        &self,
        request: &SearchRequest,
    ) -> impl Future<Output = Result<SearchResults, ApiError>> + Send;
}
