//! Autosave and send pipeline.
//!
//! Per editor the pipeline moves through
//!
//! ```text
//! Idle -> Dirty -> Saving -> Saved -> (edit) -> Dirty ...
//! Dirty|Saved -> SendCountdown -> Sending -> Sent
//!                SendCountdown -> Cancelled -> Dirty
//! ```
//!
//! Saves are debounced and never overlap for one editor. A send first waits
//! out a cancellable countdown; dispatch then waits for any in-flight save
//! and sends the latest editor state exactly once.

mod send;
mod state;
mod sync;

pub use send::SendHandle;
pub use state::{DraftPhase, DraftStatus, SendOutcome, SendProcess, SendProcessStatus};
pub use sync::DraftSync;
