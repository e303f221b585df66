//! Draft editor state.
//!
//! Every open composition (new message, reply, forward, reopened draft) is an
//! [`Editor`] owned by the [`EditorStore`] under its [`EditorId`].

mod compose;
mod model;
mod store;

pub use compose::{ComposeError, OriginalMessage};
pub use model::{
    Editor, EditorId, EditorPatch, EditorText, Recipients, ReplyType, SavedAttachment,
    UnsavedAttachment, UploadId,
};
pub use store::{ChangeOrigin, EditorEvent, EditorStore};
