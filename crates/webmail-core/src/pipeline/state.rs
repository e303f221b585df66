//! Observable pipeline state.

use crate::api::{ApiError, SentMessage};

/// Lifecycle phase of one editor's draft.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DraftPhase {
    /// Nothing edited since the editor was opened.
    #[default]
    Idle,
    /// Local changes not yet confirmed by the server.
    Dirty,
    /// A save is in flight.
    Saving,
    /// The server holds the latest state.
    Saved,
    /// Waiting out the undo-send window.
    SendCountdown,
    /// The send request is in flight.
    Sending,
    /// Sent; the editor is gone.
    Sent,
    /// Send was cancelled during the countdown.
    Cancelled,
}

/// Phase plus the details a composer view needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftStatus {
    /// Current phase.
    pub phase: DraftPhase,
    /// Failure of the last save or send, cleared by the next success.
    pub last_error: Option<ApiError>,
    /// Seconds left while in `SendCountdown`.
    pub countdown: Option<u32>,
}

/// How a send ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Delivered to the server.
    Sent(SentMessage),
    /// Cancelled before the countdown ran out.
    Cancelled,
    /// The server call failed; the editor is back to `Dirty`.
    Failed(ApiError),
}

/// Whether a send process is still active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendProcess {
    /// Finished or cancelled.
    Idle,
    /// Counting down or dispatching.
    Running,
}

/// Snapshot of a send process for countdown views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendProcessStatus {
    /// Activity.
    pub status: SendProcess,
    /// Seconds left before dispatch.
    pub countdown: u32,
}
