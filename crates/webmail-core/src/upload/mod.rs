//! Attachment upload tracking.
//!
//! Each upload runs as its own task. Its status is published on a `watch`
//! channel and its final outcome is merged into the owning editor's unsaved
//! attachment entry.

mod tracker;

pub use tracker::{UploadProgress, UploadTracker};
