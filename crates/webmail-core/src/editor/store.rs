//! Keyed store of open editors.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::model::{Editor, EditorId, EditorPatch, EditorText, Recipients};
use crate::{Error, Result};

/// Buffered events per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 256;

/// Who caused a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Message content changed: a user edit or a finished upload.
    User,
    /// Server state written back (draft id, upload bookkeeping).
    Sync,
}

/// Change notification published by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    /// Editor created or replaced.
    Created(EditorId),
    /// Editor modified.
    Updated {
        /// Editor id.
        id: EditorId,
        /// Source of the change.
        origin: ChangeOrigin,
    },
    /// Editor removed.
    Deleted(EditorId),
    /// All editors removed.
    Cleared,
}

/// Shared store of editor state.
///
/// All mutations take a single write lock, so readers only ever observe whole
/// updates. Each mutation is published to subscribers while the lock is held,
/// which keeps event order identical to mutation order.
#[derive(Debug)]
pub struct EditorStore {
    editors: RwLock<HashMap<EditorId, Editor>>,
    events: broadcast::Sender<EditorEvent>,
}

impl Default for EditorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            editors: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<EditorId, Editor>> {
        self.editors.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<EditorId, Editor>> {
        self.editors.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: EditorEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Subscribes to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EditorEvent> {
        self.events.subscribe()
    }

    /// Registers an editor under `id`.
    ///
    /// `initial.id` is overwritten with `id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::EditorExists` if `id` is taken and `overwrite` is false.
    pub fn create_editor(&self, id: EditorId, mut initial: Editor, overwrite: bool) -> Result<()> {
        let mut editors = self.write();
        if !overwrite && editors.contains_key(&id) {
            return Err(Error::EditorExists(id));
        }

        debug!(editor = %id, overwrite, "Creating editor");
        initial.id = id.clone();
        editors.insert(id.clone(), initial);
        self.publish(EditorEvent::Created(id));
        Ok(())
    }

    /// Merges `patch` into the editor.
    ///
    /// # Errors
    ///
    /// Returns `Error::EditorNotFound` if `id` is unknown.
    pub fn update_editor(&self, id: &EditorId, patch: EditorPatch) -> Result<()> {
        self.modify(id, ChangeOrigin::User, |editor| patch.apply(editor))
    }

    /// Replaces the recipients.
    ///
    /// # Errors
    ///
    /// Returns `Error::EditorNotFound` if `id` is unknown.
    pub fn update_recipients(&self, id: &EditorId, recipients: Recipients) -> Result<()> {
        self.update_editor(id, EditorPatch::default().recipients(recipients))
    }

    /// Replaces the subject.
    ///
    /// # Errors
    ///
    /// Returns `Error::EditorNotFound` if `id` is unknown.
    pub fn update_subject(&self, id: &EditorId, subject: impl Into<String>) -> Result<()> {
        self.update_editor(id, EditorPatch::default().subject(subject))
    }

    /// Replaces both body variants.
    ///
    /// # Errors
    ///
    /// Returns `Error::EditorNotFound` if `id` is unknown.
    pub fn update_text(
        &self,
        id: &EditorId,
        plain: impl Into<String>,
        rich: impl Into<String>,
    ) -> Result<()> {
        self.update_editor(id, EditorPatch {
            text: Some(EditorText::new(plain, rich)),
            ..EditorPatch::default()
        })
    }

    /// Applies a pipeline write-back.
    pub(crate) fn sync_update(&self, id: &EditorId, f: impl FnOnce(&mut Editor)) -> Result<()> {
        self.modify(id, ChangeOrigin::Sync, f)
    }

    pub(crate) fn modify(
        &self,
        id: &EditorId,
        origin: ChangeOrigin,
        f: impl FnOnce(&mut Editor),
    ) -> Result<()> {
        let mut editors = self.write();
        let Some(editor) = editors.get_mut(id) else {
            warn!(editor = %id, "Update for unknown editor");
            return Err(Error::EditorNotFound(id.clone()));
        };

        f(editor);
        self.publish(EditorEvent::Updated {
            id: id.clone(),
            origin,
        });
        Ok(())
    }

    /// Removes an editor, returning its last state.
    pub fn delete_editor(&self, id: &EditorId) -> Option<Editor> {
        let mut editors = self.write();
        let removed = editors.remove(id);
        if removed.is_some() {
            debug!(editor = %id, "Deleted editor");
            self.publish(EditorEvent::Deleted(id.clone()));
        }
        removed
    }

    /// Removes all editors.
    pub fn clear_editors(&self) {
        let mut editors = self.write();
        editors.clear();
        self.publish(EditorEvent::Cleared);
    }

    /// Snapshot of an editor.
    #[must_use]
    pub fn get(&self, id: &EditorId) -> Option<Editor> {
        self.read().get(id).cloned()
    }

    /// Returns true if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &EditorId) -> bool {
        self.read().contains_key(id)
    }

    /// Ids of all open editors, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<EditorId> {
        let mut ids: Vec<_> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of open editors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if no editor is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::address::{Participant, ParticipantType};

    fn id(s: &str) -> EditorId {
        EditorId::new(s)
    }

    #[test]
    fn test_create_rejects_duplicate_unless_overwrite() {
        let store = EditorStore::new();
        store.create_editor(id("e1"), Editor::new("ignored"), false).unwrap();
        assert_eq!(store.get(&id("e1")).unwrap().id, id("e1"));

        let err = store.create_editor(id("e1"), Editor::new("e1"), false).unwrap_err();
        assert!(matches!(err, Error::EditorExists(_)));

        let mut replacement = Editor::new("e1");
        replacement.subject = "Fresh".into();
        store.create_editor(id("e1"), replacement, true).unwrap();
        assert_eq!(store.get(&id("e1")).unwrap().subject, "Fresh");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_unknown_editor() {
        let store = EditorStore::new();
        let err = store.update_subject(&id("nope"), "x").unwrap_err();
        assert!(matches!(err, Error::EditorNotFound(_)));
    }

    #[test]
    fn test_field_setters() {
        let store = EditorStore::new();
        store.create_editor(id("e1"), Editor::new("e1"), false).unwrap();

        let recipients = Recipients {
            to: vec![Participant::new(ParticipantType::To, "a@x.it").unwrap()],
            ..Recipients::default()
        };
        store.update_recipients(&id("e1"), recipients.clone()).unwrap();
        store.update_subject(&id("e1"), "Hello").unwrap();
        store.update_text(&id("e1"), "hi", "<p>hi</p>").unwrap();

        let editor = store.get(&id("e1")).unwrap();
        assert_eq!(editor.recipients, recipients);
        assert_eq!(editor.subject, "Hello");
        assert_eq!(editor.text.rich, "<p>hi</p>");
    }

    #[test]
    fn test_events_follow_mutations() {
        let store = EditorStore::new();
        let mut events = store.subscribe();

        store.create_editor(id("e1"), Editor::new("e1"), false).unwrap();
        store.update_subject(&id("e1"), "s").unwrap();
        store.sync_update(&id("e1"), |e| e.draft_id = Some("9".into())).unwrap();
        store.delete_editor(&id("e1"));
        store.clear_editors();

        assert_eq!(events.try_recv().unwrap(), EditorEvent::Created(id("e1")));
        assert_eq!(
            events.try_recv().unwrap(),
            EditorEvent::Updated {
                id: id("e1"),
                origin: ChangeOrigin::User
            }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            EditorEvent::Updated {
                id: id("e1"),
                origin: ChangeOrigin::Sync
            }
        );
        assert_eq!(events.try_recv().unwrap(), EditorEvent::Deleted(id("e1")));
        assert_eq!(events.try_recv().unwrap(), EditorEvent::Cleared);
    }

    #[test]
    fn test_delete_missing_is_silent() {
        let store = EditorStore::new();
        let mut events = store.subscribe();
        assert!(store.delete_editor(&id("ghost")).is_none());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_ids_sorted() {
        let store = EditorStore::new();
        for name in ["b", "a", "c"] {
            store.create_editor(id(name), Editor::new(name), false).unwrap();
        }
        assert_eq!(store.ids(), vec![id("a"), id("b"), id("c")]);
        store.clear_editors();
        assert!(store.is_empty());
    }
}
