//! Upload bookkeeping and transfer tasks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{MailApi, UploadFile, UploadStatus};
use crate::editor::{ChangeOrigin, EditorEvent, EditorId, EditorStore, UnsavedAttachment, UploadId};
use crate::{Error, Result};

const CANCELLED: &str = "cancelled";
const REMOVED: &str = "removed";

/// Progress reporter handed to [`MailApi::upload`].
#[derive(Debug, Clone)]
pub struct UploadProgress {
    status: Arc<watch::Sender<UploadStatus>>,
}

impl UploadProgress {
    pub(crate) const fn new(status: Arc<watch::Sender<UploadStatus>>) -> Self {
        Self { status }
    }

    /// Creates a reporter that nothing observes.
    #[must_use]
    pub fn detached() -> Self {
        let (status, _) = watch::channel(UploadStatus::Running(0));
        Self::new(Arc::new(status))
    }

    /// Publishes percent complete, clamped to 100.
    ///
    /// Ignored once the upload has finished or was cancelled.
    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        self.status.send_if_modified(|status| match status {
            UploadStatus::Running(current) if *current != percent => {
                *current = percent;
                true
            }
            _ => false,
        });
    }
}

/// Moves `status` to `outcome` unless it already reached a terminal state.
fn finish(status: &watch::Sender<UploadStatus>, outcome: UploadStatus) -> bool {
    status.send_if_modified(|current| {
        if current.is_terminal() {
            false
        } else {
            *current = outcome;
            true
        }
    })
}

#[derive(Debug)]
struct TrackedUpload {
    editor: EditorId,
    status: Arc<watch::Sender<UploadStatus>>,
    /// Present while the transfer task is still running.
    cancel: Option<oneshot::Sender<()>>,
}

struct Inner<A> {
    api: Arc<A>,
    store: Arc<EditorStore>,
    next_id: AtomicU64,
    uploads: Mutex<HashMap<UploadId, TrackedUpload>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl<A> Inner<A> {
    fn uploads(&self) -> MutexGuard<'_, HashMap<UploadId, TrackedUpload>> {
        self.uploads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops the uploads of editors matching `closed`. Running transfers
    /// see their cancel channel close and stop.
    fn forget_where(&self, mut closed: impl FnMut(&EditorId) -> bool) {
        let mut uploads = self.uploads();
        uploads.retain(|id, entry| {
            if !closed(&entry.editor) {
                return true;
            }
            finish(&entry.status, UploadStatus::Aborted(REMOVED.into()));
            debug!(upload = %id, editor = %entry.editor, "Forgetting upload");
            false
        });
    }

    /// Drops the uploads of editors no longer in the store.
    fn forget_closed(&self) {
        self.forget_where(|editor| !self.store.contains(editor));
    }
}

impl<A> Drop for Inner<A> {
    fn drop(&mut self) {
        let listener = self
            .listener
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(listener) = listener {
            listener.abort();
        }
    }
}

async fn listen<A: MailApi>(inner: Weak<Inner<A>>, mut events: broadcast::Receiver<EditorEvent>) {
    loop {
        let event = events.recv().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };

        match event {
            Ok(EditorEvent::Deleted(_) | EditorEvent::Cleared) => inner.forget_closed(),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Upload tracker lagged behind editor events");
                inner.forget_closed();
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!("Upload tracker listener stopped");
}

impl<A: MailApi> Inner<A> {
    async fn transfer(
        &self,
        id: UploadId,
        editor: EditorId,
        file: UploadFile,
        status: Arc<watch::Sender<UploadStatus>>,
        cancel: oneshot::Receiver<()>,
    ) {
        let progress = UploadProgress::new(Arc::clone(&status));
        let outcome = tokio::select! {
            result = self.api.upload(file, progress) => match result {
                Ok(uploaded) => UploadStatus::Completed(uploaded),
                Err(e) => {
                    warn!(upload = %id, error = %e, "Upload failed");
                    UploadStatus::Aborted(e.to_string())
                }
            },
            // Fires on cancel and when the entry is removed.
            _ = cancel => UploadStatus::Aborted(CANCELLED.into()),
        };

        // Whoever settles the status first under the lock wins.
        let settled = {
            let mut uploads = self.uploads();
            if let Some(entry) = uploads.get_mut(&id) {
                entry.cancel = None;
            }
            finish(&status, outcome);
            status.borrow().clone()
        };

        match &settled {
            UploadStatus::Completed(uploaded) => {
                info!(upload = %id, aid = %uploaded.aid, "Upload completed");
            }
            UploadStatus::Aborted(reason) => info!(upload = %id, reason, "Upload aborted"),
            UploadStatus::Running(_) => {}
        }

        self.merge(id, &editor, settled);
    }

    fn merge(&self, id: UploadId, editor: &EditorId, status: UploadStatus) {
        // A finished file changes what the next save sends.
        let origin = if matches!(status, UploadStatus::Completed(_)) {
            ChangeOrigin::User
        } else {
            ChangeOrigin::Sync
        };

        let merged = self.store.modify(editor, origin, |e| {
            if let Some(entry) = e.unsaved_attachments.iter_mut().find(|a| a.upload_id == id) {
                entry.status = status;
            }
        });
        if merged.is_err() {
            debug!(upload = %id, editor = %editor, "Editor closed before upload finished");
        }
    }
}

/// Tracks attachment uploads for every open editor.
pub struct UploadTracker<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for UploadTracker<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> std::fmt::Debug for UploadTracker<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadTracker")
            .field("uploads", &self.inner.uploads().len())
            .finish_non_exhaustive()
    }
}

impl<A: MailApi> UploadTracker<A> {
    /// Creates a tracker writing results into `store`.
    ///
    /// Uploads are dropped when their editor is deleted from the store. Must
    /// be called inside a Tokio runtime.
    #[must_use]
    pub fn new(api: Arc<A>, store: Arc<EditorStore>) -> Self {
        let events = store.subscribe();
        let inner = Arc::new(Inner {
            api,
            store,
            next_id: AtomicU64::new(0),
            uploads: Mutex::new(HashMap::new()),
            listener: Mutex::new(None),
        });

        let listener = tokio::spawn(listen(Arc::downgrade(&inner), events));
        *inner.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
        Self { inner }
    }

    /// Starts uploading `file` for `editor`.
    ///
    /// The editor immediately gets an unsaved attachment entry in
    /// `Running(0)`; the transfer runs in the background.
    ///
    /// # Errors
    ///
    /// Returns `Error::EditorNotFound` if `editor` is not open.
    pub fn upload(&self, editor: &EditorId, file: UploadFile) -> Result<UploadId> {
        let id = UploadId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let entry = UnsavedAttachment {
            upload_id: id,
            filename: file.filename.clone(),
            content_type: file.content_type.clone(),
            size: file.size(),
            is_inline: file.is_inline,
            status: UploadStatus::Running(0),
        };
        self.inner
            .store
            .sync_update(editor, |e| e.unsaved_attachments.push(entry))?;

        let (status, _) = watch::channel(UploadStatus::Running(0));
        let status = Arc::new(status);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.inner.uploads().insert(id, TrackedUpload {
            editor: editor.clone(),
            status: Arc::clone(&status),
            cancel: Some(cancel_tx),
        });

        info!(
            upload = %id,
            editor = %editor,
            filename = %file.filename,
            size = file.size(),
            "Starting upload"
        );

        let inner = Arc::clone(&self.inner);
        let editor = editor.clone();
        tokio::spawn(async move {
            inner.transfer(id, editor, file, status, cancel_rx).await;
        });

        Ok(id)
    }

    /// Aborts a running upload.
    ///
    /// The editor's entry is `Aborted` when this returns. Returns `false` if
    /// the upload had already finished.
    ///
    /// # Errors
    ///
    /// Returns `Error::UploadNotFound` if `id` is not tracked.
    pub fn cancel_upload(&self, id: UploadId) -> Result<bool> {
        let mut uploads = self.inner.uploads();
        let entry = uploads.get_mut(&id).ok_or(Error::UploadNotFound(id))?;
        let Some(cancel) = entry.cancel.take() else {
            debug!(upload = %id, "Cancel after upload finished");
            return Ok(false);
        };

        let aborted = UploadStatus::Aborted(CANCELLED.into());
        finish(&entry.status, aborted.clone());
        self.inner.merge(id, &entry.editor, aborted);
        let _ = cancel.send(());
        info!(upload = %id, "Upload cancelled");
        Ok(true)
    }

    /// Stops tracking an upload and removes it from its editor, including
    /// the saved draft part it became after an autosave.
    ///
    /// # Errors
    ///
    /// Returns `Error::UploadNotFound` if `id` is not tracked.
    pub fn remove(&self, id: UploadId) -> Result<()> {
        let entry = self
            .inner
            .uploads()
            .remove(&id)
            .ok_or(Error::UploadNotFound(id))?;
        finish(&entry.status, UploadStatus::Aborted(REMOVED.into()));

        if self.inner.store.contains(&entry.editor) {
            self.inner.store.modify(&entry.editor, ChangeOrigin::User, |e| {
                e.unsaved_attachments.retain(|a| a.upload_id != id);
                e.saved_attachments.retain(|a| a.upload_id != Some(id));
            })?;
        }
        debug!(upload = %id, editor = %entry.editor, "Upload removed");
        Ok(())
    }

    /// Drops every upload of a closed editor, aborting those still running.
    pub fn forget_editor(&self, editor: &EditorId) {
        self.inner.forget_where(|e| e == editor);
    }

    /// Current status of an upload.
    #[must_use]
    pub fn status(&self, id: UploadId) -> Option<UploadStatus> {
        self.inner
            .uploads()
            .get(&id)
            .map(|entry| entry.status.borrow().clone())
    }

    /// Subscribes to status changes of an upload.
    #[must_use]
    pub fn watch(&self, id: UploadId) -> Option<watch::Receiver<UploadStatus>> {
        self.inner
            .uploads()
            .get(&id)
            .map(|entry| entry.status.subscribe())
    }

    /// Uploads of `editor` still transferring, in start order.
    #[must_use]
    pub fn pending_for(&self, editor: &EditorId) -> Vec<UploadId> {
        let mut pending: Vec<_> = self
            .inner
            .uploads()
            .iter()
            .filter(|(_, entry)| &entry.editor == editor && !entry.status.borrow().is_terminal())
            .map(|(id, _)| *id)
            .collect();
        pending.sort();
        pending
    }
}
