//! Debounced, serialized draft saves.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::send::{SendHandle, SendShared};
use super::state::{DraftPhase, DraftStatus};
use crate::api::{ApiError, MailApi, OutgoingDraft};
use crate::config::ComposerConfig;
use crate::editor::{
    ChangeOrigin, EditorEvent, EditorId, EditorStore, SavedAttachment, UnsavedAttachment, UploadId,
};
use crate::{Error, Result};

/// Per-editor pipeline bookkeeping.
#[derive(Debug)]
pub(super) struct Slot {
    pub(super) status: Arc<watch::Sender<DraftStatus>>,
    debounce: Option<JoinHandle<()>>,
    /// A save task owns the editor's save lock.
    saving: bool,
    /// Another save was requested while one was in flight.
    resave: bool,
    edited_during_save: bool,
    /// Held for the duration of every save and of the send dispatch.
    pub(super) save_lock: Arc<tokio::sync::Mutex<()>>,
    pub(super) send: Option<Arc<SendShared>>,
    /// The user kept editing while the countdown ran.
    pub(super) edited_during_send: bool,
    /// Reused when a failed send is retried, so the server can drop duplicates.
    send_uid: Option<String>,
}

impl Slot {
    fn new() -> Self {
        let (status, _) = watch::channel(DraftStatus::default());
        Self {
            status: Arc::new(status),
            debounce: None,
            saving: false,
            resave: false,
            edited_during_save: false,
            save_lock: Arc::new(tokio::sync::Mutex::new(())),
            send: None,
            edited_during_send: false,
            send_uid: None,
        }
    }

    /// Stops the pending debounce timer. Returns true if one was pending.
    pub(super) fn abort_debounce(&mut self) -> bool {
        self.debounce.take().is_some_and(|timer| {
            let pending = !timer.is_finished();
            timer.abort();
            pending
        })
    }

    pub(super) fn set_phase(&self, phase: DraftPhase) {
        self.status.send_modify(|status| {
            status.phase = phase;
            status.countdown = None;
        });
    }

    /// Returns true if `shared` is this editor's current send.
    pub(super) fn owns(&self, shared: &Arc<SendShared>) -> bool {
        self.send.as_ref().is_some_and(|s| Arc::ptr_eq(s, shared))
    }
}

/// Result of one call into the save loop.
#[derive(Debug)]
pub(super) enum SaveRun {
    /// A save ran; this is its final result.
    Done(std::result::Result<(), ApiError>),
    /// A save was already in flight and will run once more afterwards.
    Coalesced,
    /// Nothing to do: the editor is gone or being sent.
    Skipped,
}

pub(super) struct Inner<A> {
    pub(super) store: Arc<EditorStore>,
    pub(super) api: Arc<A>,
    pub(super) config: ComposerConfig,
    slots: Mutex<HashMap<EditorId, Slot>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl<A> Inner<A> {
    pub(super) fn slots(&self) -> MutexGuard<'_, HashMap<EditorId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
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

        let slots = self.slots.get_mut().unwrap_or_else(PoisonError::into_inner);
        for slot in slots.values_mut() {
            slot.abort_debounce();
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
            Ok(event) => inner.on_event(event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Draft sync lagged behind editor events, rescheduling all saves");
                for id in inner.store.ids() {
                    inner.on_edit(&id);
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!("Draft sync listener stopped");
}

impl<A: MailApi> Inner<A> {
    fn on_event(self: &Arc<Self>, event: EditorEvent) {
        match event {
            EditorEvent::Created(id) => {
                let mut slots = self.slots();
                let slot = slots.entry(id).or_insert_with(Slot::new);
                if slot.send.is_none() {
                    slot.abort_debounce();
                    slot.status.send_replace(DraftStatus::default());
                }
            }
            EditorEvent::Updated {
                id,
                origin: ChangeOrigin::User,
            } => self.on_edit(&id),
            EditorEvent::Updated { .. } => {}
            EditorEvent::Deleted(id) => self.forget(&id),
            EditorEvent::Cleared => {
                let ids: Vec<_> = self.slots().keys().cloned().collect();
                for id in ids {
                    self.forget(&id);
                }
            }
        }
    }

    fn on_edit(self: &Arc<Self>, id: &EditorId) {
        let mut slots = self.slots();
        let slot = slots.entry(id.clone()).or_insert_with(Slot::new);

        // The send picks up the latest state when it dispatches.
        if slot.send.is_some() {
            slot.edited_during_send = true;
            return;
        }

        if slot.saving {
            slot.edited_during_save = true;
        } else {
            slot.set_phase(DraftPhase::Dirty);
        }
        self.arm_debounce(slot, id);
    }

    fn forget(&self, id: &EditorId) {
        let slot = self.slots().remove(id);
        if let Some(mut slot) = slot {
            slot.abort_debounce();
            if let Some(send) = &slot.send {
                send.cancel();
            }
            debug!(editor = %id, "Stopped tracking editor");
        }
    }

    /// (Re)starts the quiet-period timer that leads to a save.
    pub(super) fn arm_debounce(self: &Arc<Self>, slot: &mut Slot, id: &EditorId) {
        slot.abort_debounce();

        let inner = Arc::downgrade(self);
        let delay = self.config.autosave_debounce();
        let id = id.clone();
        slot.debounce = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Nothing can abort us between the wake-up and the hand-off.
            if let Some(inner) = inner.upgrade() {
                tokio::spawn(async move {
                    inner.save(&id).await;
                });
            }
        }));
    }

    /// Saves the editor, or queues one follow-up save if a save is in flight.
    pub(super) async fn save(&self, id: &EditorId) -> SaveRun {
        loop {
            let guard = {
                let mut slots = self.slots();
                let Some(slot) = slots.get_mut(id) else {
                    return SaveRun::Skipped;
                };
                if slot.send.is_some() {
                    return SaveRun::Skipped;
                }
                if slot.saving {
                    debug!(editor = %id, "Save in flight, coalescing");
                    slot.resave = true;
                    return SaveRun::Coalesced;
                }
                let Ok(guard) = Arc::clone(&slot.save_lock).try_lock_owned() else {
                    return SaveRun::Skipped;
                };

                slot.saving = true;
                slot.resave = false;
                slot.edited_during_save = false;
                slot.abort_debounce();
                slot.set_phase(DraftPhase::Saving);
                guard
            };

            let result = self.save_once(id).await;
            drop(guard);

            let again = {
                let mut slots = self.slots();
                let Some(slot) = slots.get_mut(id) else {
                    return SaveRun::Done(result);
                };
                slot.saving = false;

                if slot.send.is_some() {
                    // The send owns the phase now.
                    slot.resave = false;
                    false
                } else {
                    match &result {
                        Ok(()) => {
                            let again = slot.resave;
                            let phase = if again || slot.edited_during_save {
                                DraftPhase::Dirty
                            } else {
                                DraftPhase::Saved
                            };
                            slot.status.send_modify(|status| {
                                status.phase = phase;
                                status.last_error = None;
                            });
                            again
                        }
                        Err(e) => {
                            slot.resave = false;
                            slot.status.send_modify(|status| {
                                status.phase = DraftPhase::Dirty;
                                status.last_error = Some(e.clone());
                            });
                            false
                        }
                    }
                }
            };

            if !again {
                return SaveRun::Done(result);
            }
            debug!(editor = %id, "Running coalesced save");
        }
    }

    /// Shows a scheduled retry as `Dirty` with its error, and the next
    /// attempt as `Saving` again. A running send owns the phase.
    fn show_retry(&self, id: &EditorId, error: Option<&ApiError>) {
        let slots = self.slots();
        let Some(slot) = slots.get(id) else {
            return;
        };
        if slot.send.is_some() {
            return;
        }
        slot.status.send_modify(|status| match error {
            Some(e) => {
                status.phase = DraftPhase::Dirty;
                status.last_error = Some(e.clone());
            }
            None => status.phase = DraftPhase::Saving,
        });
    }

    /// One save of the current snapshot, with retries on transport failures.
    async fn save_once(&self, id: &EditorId) -> std::result::Result<(), ApiError> {
        let Some(editor) = self.store.get(id) else {
            debug!(editor = %id, "Editor closed before save");
            return Ok(());
        };
        let draft = OutgoingDraft::from_editor(&editor);
        let policy = &self.config.retry;

        let mut attempt = 1;
        let saved = loop {
            match self.api.save_draft(&draft).await {
                Ok(saved) => break saved,
                Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                    let delay = policy.delay_for(attempt);
                    warn!(
                        editor = %id,
                        attempt,
                        error = %e,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Draft save failed, retrying"
                    );
                    self.show_retry(id, Some(&e));
                    tokio::time::sleep(delay).await;
                    self.show_retry(id, None);
                    attempt += 1;
                }
                Err(e) => {
                    warn!(editor = %id, attempt, error = %e, "Draft save failed");
                    return Err(e);
                }
            }
        };

        info!(editor = %id, draft = %saved.draft_id, "Draft saved");

        let uploaded = draft.upload_id_set();
        let sent: Vec<&UnsavedAttachment> = editor
            .unsaved_attachments
            .iter()
            .filter(|a| a.aid().is_some_and(|aid| uploaded.contains(aid)))
            .collect();

        let written = self.store.sync_update(id, |e| {
            e.draft_id = Some(saved.draft_id.clone());

            // Files the user took off while the save was in flight.
            let mut dropped: Vec<FileKey> = draft
                .kept_attachments
                .iter()
                .filter(|kept| !e.saved_attachments.contains(*kept))
                .map(FileKey::saved)
                .collect();
            let mut tagged: Vec<(FileKey, UploadId)> = e
                .saved_attachments
                .iter()
                .filter_map(|a| a.upload_id.map(|upload| (FileKey::saved(a), upload)))
                .collect();
            for upload in &sent {
                if e.unsaved_attachment(upload.upload_id).is_some() {
                    tagged.push((FileKey::unsaved(upload), upload.upload_id));
                } else {
                    dropped.push(FileKey::unsaved(upload));
                }
            }

            // Uploads that went out with this save now live on the draft.
            e.unsaved_attachments
                .retain(|a| a.aid().is_none_or(|aid| !uploaded.contains(aid)));

            e.saved_attachments = saved
                .attachments
                .iter()
                .filter_map(|a| {
                    let key = FileKey::saved(a);
                    if let Some(pos) = dropped.iter().position(|d| *d == key) {
                        dropped.swap_remove(pos);
                        return None;
                    }
                    let mut a = a.clone();
                    a.upload_id = tagged
                        .iter()
                        .position(|(k, _)| *k == key)
                        .map(|pos| tagged.swap_remove(pos).1);
                    Some(a)
                })
                .collect();
        });
        if written.is_err() {
            debug!(editor = %id, "Editor closed during save");
        }
        Ok(())
    }
}

/// What the user sees of an attachment. Part numbers change between saves.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileKey {
    filename: String,
    content_type: String,
    size: u64,
}

impl FileKey {
    fn saved(a: &SavedAttachment) -> Self {
        Self {
            filename: a.filename.clone(),
            content_type: a.content_type.clone(),
            size: a.size,
        }
    }

    fn unsaved(a: &UnsavedAttachment) -> Self {
        Self {
            filename: a.filename.clone(),
            content_type: a.content_type.clone(),
            size: a.size,
        }
    }
}

/// Autosave and send pipeline for every editor in a store.
///
/// Listens to store events: user edits mark the editor `Dirty` and restart
/// its debounce timer, and the timer saves the latest snapshot. At most one
/// save per editor is in flight; requests arriving meanwhile collapse into a
/// single follow-up save.
pub struct DraftSync<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for DraftSync<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> std::fmt::Debug for DraftSync<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftSync")
            .field("editors", &self.inner.slots().len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl<A: MailApi> DraftSync<A> {
    /// Starts syncing `store` to the server. Must be called inside a Tokio
    /// runtime.
    #[must_use]
    pub fn spawn(store: Arc<EditorStore>, api: Arc<A>, config: ComposerConfig) -> Self {
        let events = store.subscribe();
        let inner = Arc::new(Inner {
            store,
            api,
            config,
            slots: Mutex::new(HashMap::new()),
            listener: Mutex::new(None),
        });

        let listener = tokio::spawn(listen(Arc::downgrade(&inner), events));
        *inner.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);

        info!(
            debounce_ms = inner.config.autosave_debounce_ms,
            countdown_secs = inner.config.send_countdown_secs,
            "Draft sync started"
        );
        Self { inner }
    }

    /// The synced store.
    #[must_use]
    pub fn store(&self) -> &Arc<EditorStore> {
        &self.inner.store
    }

    /// Current status of an open editor.
    #[must_use]
    pub fn status(&self, id: &EditorId) -> Option<DraftStatus> {
        if let Some(slot) = self.inner.slots().get(id) {
            return Some(slot.status.borrow().clone());
        }
        self.inner.store.contains(id).then(DraftStatus::default)
    }

    /// Subscribes to status changes of an open editor.
    #[must_use]
    pub fn watch(&self, id: &EditorId) -> Option<watch::Receiver<DraftStatus>> {
        let mut slots = self.inner.slots();
        if let Some(slot) = slots.get(id) {
            return Some(slot.status.subscribe());
        }
        if !self.inner.store.contains(id) {
            return None;
        }
        let slot = slots.entry(id.clone()).or_insert_with(Slot::new);
        Some(slot.status.subscribe())
    }

    /// Saves immediately instead of waiting for the debounce timer.
    ///
    /// If a save is already in flight this returns right away and the
    /// latest state is saved once that save completes.
    ///
    /// # Errors
    ///
    /// Returns `Error::EditorNotFound` for unknown editors,
    /// `Error::SendInProgress` during a send, or the save failure.
    pub async fn save_now(&self, id: &EditorId) -> Result<()> {
        if !self.inner.store.contains(id) {
            return Err(Error::EditorNotFound(id.clone()));
        }
        {
            let mut slots = self.inner.slots();
            let slot = slots.entry(id.clone()).or_insert_with(Slot::new);
            if slot.send.is_some() {
                return Err(Error::SendInProgress(id.clone()));
            }
            slot.abort_debounce();
        }

        match self.inner.save(id).await {
            SaveRun::Done(result) => result.map_err(Error::from),
            SaveRun::Coalesced | SaveRun::Skipped => Ok(()),
        }
    }

    /// Starts the undo-send countdown.
    ///
    /// Calling this again while the countdown runs returns the running
    /// countdown's handle; the timer is not restarted.
    ///
    /// # Errors
    ///
    /// Returns `Error::EditorNotFound`, `Error::Validation` when the message
    /// cannot be sent yet, or `Error::SendInProgress` while the message is
    /// already being handed to the server.
    pub fn send(&self, id: &EditorId) -> Result<SendHandle> {
        let editor = self
            .inner
            .store
            .get(id)
            .ok_or_else(|| Error::EditorNotFound(id.clone()))?;

        let mut slots = self.inner.slots();
        let slot = slots.entry(id.clone()).or_insert_with(Slot::new);
        if let Some(active) = &slot.send {
            if active.is_counting_down() {
                debug!(editor = %id, "Send countdown already running");
                return Ok(SendHandle::new(Arc::clone(active)));
            }
            if active.is_dispatching() {
                return Err(Error::SendInProgress(id.clone()));
            }
        }

        editor.validate()?;

        let phase = slot.status.borrow().phase;
        let unsaved = slot.abort_debounce() || !matches!(phase, DraftPhase::Idle | DraftPhase::Saved);
        let seconds = self.inner.config.send_countdown_secs;
        let send_uid = slot
            .send_uid
            .get_or_insert_with(|| format!("{id}-{}", Utc::now().timestamp_millis()))
            .clone();

        let shared = Arc::new(SendShared::new(
            id.clone(),
            send_uid,
            seconds,
            Arc::clone(&slot.status),
            Arc::clone(&slot.save_lock),
            unsaved,
        ));
        slot.send = Some(Arc::clone(&shared));
        slot.edited_during_send = false;
        slot.status.send_modify(|status| {
            status.phase = DraftPhase::SendCountdown;
            status.countdown = Some(seconds);
            status.last_error = None;
        });
        drop(slots);

        info!(editor = %id, countdown_secs = seconds, "Send scheduled");
        tokio::spawn(Arc::clone(&self.inner).run_countdown(Arc::clone(&shared)));
        Ok(SendHandle::new(shared))
    }

    /// Handle of the send in progress for an editor.
    #[must_use]
    pub fn active_send(&self, id: &EditorId) -> Option<SendHandle> {
        self.inner
            .slots()
            .get(id)
            .and_then(|slot| slot.send.clone())
            .map(SendHandle::new)
    }

    /// Closes an editor without sending and deletes its server draft.
    ///
    /// A running countdown is cancelled. An in-flight save is allowed to
    /// finish first so the draft it creates is deleted too.
    ///
    /// # Errors
    ///
    /// Returns `Error::EditorNotFound`, `Error::SendInProgress` once the
    /// message is being handed to the server, or the delete failure.
    pub async fn discard(&self, id: &EditorId) -> Result<()> {
        let save_lock = {
            let mut slots = self.inner.slots();
            match slots.get_mut(id) {
                Some(slot) => {
                    if let Some(send) = &slot.send {
                        if send.is_dispatching() {
                            return Err(Error::SendInProgress(id.clone()));
                        }
                        send.cancel();
                    }
                    slot.abort_debounce();
                    Some(Arc::clone(&slot.save_lock))
                }
                None => None,
            }
        };

        let _guard = match save_lock {
            Some(lock) => Some(lock.lock_owned().await),
            None => None,
        };

        let editor = self
            .inner
            .store
            .delete_editor(id)
            .ok_or_else(|| Error::EditorNotFound(id.clone()))?;
        self.inner.slots().remove(id);

        if let Some(draft_id) = editor.draft_id {
            info!(editor = %id, draft = %draft_id, "Deleting discarded draft");
            self.inner.api.delete_draft(&draft_id).await?;
        } else {
            debug!(editor = %id, "Discarded unsaved editor");
        }
        Ok(())
    }
}
