//! Integration tests for the autosave and send pipeline.
//!
//! These tests drive a real `EditorStore`, `DraftSync` and `UploadTracker`
//! against a recording mock server, with Tokio's clock paused so debounce
//! and countdown timers run instantly.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::sleep;
use tokio_test::{assert_err, assert_ok};

use webmail_core::api::{SavedDraft, SentMessage};
use webmail_core::editor::SavedAttachment;
use webmail_core::upload::UploadProgress;
use webmail_core::{
    ApiError, ComposeError, ComposerConfig, DraftPhase, DraftSync, Editor, EditorId, EditorStore,
    Error, MailApi, OutgoingDraft, Participant, ParticipantType, Recipients, RetryPolicy,
    SearchRequest, SearchResults, SendOutcome, UploadFile, UploadTracker, UploadedAttachment,
};

/// Everything the mock server has been asked to do.
#[derive(Default)]
struct Calls {
    saves: Vec<OutgoingDraft>,
    sends: Vec<(OutgoingDraft, String)>,
    deletes: Vec<String>,
    /// Failures returned by the next save attempts (in order).
    save_failures: VecDeque<ApiError>,
    /// Failures returned by the next send attempts (in order).
    send_failures: VecDeque<ApiError>,
    in_flight: usize,
    max_in_flight: usize,
}

/// Mock mail server that records calls and answers after `latency`.
#[derive(Default)]
struct MockApi {
    calls: Mutex<Calls>,
    latency: Duration,
}

impl MockApi {
    fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    fn calls(&self) -> MutexGuard<'_, Calls> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fail_saves(&self, errors: impl IntoIterator<Item = ApiError>) {
        self.calls().save_failures.extend(errors);
    }

    fn fail_sends(&self, errors: impl IntoIterator<Item = ApiError>) {
        self.calls().send_failures.extend(errors);
    }
}

impl MailApi for MockApi {
    async fn save_draft(&self, draft: &OutgoingDraft) -> Result<SavedDraft, ApiError> {
        let failure = {
            let mut calls = self.calls();
            calls.saves.push(draft.clone());
            calls.in_flight += 1;
            calls.max_in_flight = calls.max_in_flight.max(calls.in_flight);
            calls.save_failures.pop_front()
        };

        sleep(self.latency).await;
        self.calls().in_flight -= 1;
        if let Some(error) = failure {
            return Err(error);
        }

        let draft_id = draft.draft_id.clone().unwrap_or_else(|| "draft-1".into());
        let mut attachments = draft.kept_attachments.clone();
        for aid in &draft.upload_ids {
            attachments.push(SavedAttachment {
                message_id: draft_id.clone(),
                part: (attachments.len() + 2).to_string(),
                filename: aid.trim_start_matches("aid-").to_string(),
                content_type: "application/pdf".into(),
                size: 3,
                is_inline: false,
                content_id: None,
                upload_id: None,
            });
        }

        Ok(SavedDraft {
            draft_id,
            conversation_id: None,
            saved_at: None,
            participants: draft.participants.clone(),
            attachments,
        })
    }

    async fn send_message(
        &self,
        draft: &OutgoingDraft,
        send_uid: &str,
    ) -> Result<SentMessage, ApiError> {
        let failure = {
            let mut calls = self.calls();
            calls.sends.push((draft.clone(), send_uid.to_string()));
            calls.send_failures.pop_front()
        };

        sleep(self.latency).await;
        match failure {
            Some(error) => Err(error),
            None => Ok(SentMessage {
                message_id: Some("sent-1".into()),
            }),
        }
    }

    async fn delete_draft(&self, draft_id: &str) -> Result<(), ApiError> {
        self.calls().deletes.push(draft_id.to_string());
        Ok(())
    }

    async fn upload(
        &self,
        file: UploadFile,
        progress: UploadProgress,
    ) -> Result<UploadedAttachment, ApiError> {
        sleep(self.latency).await;
        progress.report(100);
        let size = file.size();
        Ok(UploadedAttachment {
            aid: format!("aid-{}", file.filename),
            content_type: file.content_type,
            filename: file.filename,
            size,
        })
    }

    async fn search(&self, _request: &SearchRequest) -> Result<SearchResults, ApiError> {
        Ok(SearchResults::default())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config() -> ComposerConfig {
    ComposerConfig {
        autosave_debounce_ms: 500,
        send_countdown_secs: 3,
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 100,
            multiplier: 2,
            max_backoff_ms: 1_000,
        },
        ..ComposerConfig::default()
    }
}

fn recipients() -> Recipients {
    Recipients {
        to: vec![Participant::new(ParticipantType::To, "anna@email.it").unwrap()],
        ..Recipients::default()
    }
}

struct Harness {
    api: Arc<MockApi>,
    store: Arc<EditorStore>,
    sync: DraftSync<MockApi>,
    id: EditorId,
}

impl Harness {
    fn new(api: MockApi) -> Self {
        init_tracing();
        let api = Arc::new(api);
        let store = Arc::new(EditorStore::new());
        let sync = DraftSync::spawn(Arc::clone(&store), Arc::clone(&api), config());
        Self {
            api,
            store,
            sync,
            id: EditorId::new("compose-1"),
        }
    }

    /// Opens an editor with one recipient and the given subject.
    async fn open(&self, subject: &str) {
        assert_ok!(
            self.store
                .create_editor(self.id.clone(), Editor::new(self.id.clone()), false)
        );
        assert_ok!(self.store.update_recipients(&self.id, recipients()));
        assert_ok!(self.store.update_subject(&self.id, subject));
        settle_events().await;
    }

    fn phase(&self) -> DraftPhase {
        self.sync.status(&self.id).unwrap().phase
    }
}

/// Lets the pipeline consume pending store events.
async fn settle_events() {
    sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_debounce_saves_latest_state_once() {
    let h = Harness::new(MockApi::default());
    h.open("L").await;
    assert_eq!(h.phase(), DraftPhase::Dirty);

    for subject in ["Lu", "Lun", "Lunch"] {
        sleep(Duration::from_millis(200)).await;
        assert_ok!(h.store.update_subject(&h.id, subject));
    }
    sleep(Duration::from_secs(5)).await;

    let calls = h.api.calls();
    assert_eq!(calls.saves.len(), 1);
    assert_eq!(calls.saves[0].subject, "Lunch");
    assert_eq!(calls.saves[0].draft_id, None);
    drop(calls);

    assert_eq!(h.phase(), DraftPhase::Saved);
    assert_eq!(h.store.get(&h.id).unwrap().draft_id.as_deref(), Some("draft-1"));
}

#[tokio::test(start_paused = true)]
async fn test_edit_during_save_runs_one_follow_up() {
    let h = Harness::new(MockApi::with_latency(Duration::from_secs(1)));
    h.open("first").await;

    // Debounce fires at 500ms; the save is in flight until 1500ms.
    sleep(Duration::from_millis(600)).await;
    assert_eq!(h.phase(), DraftPhase::Saving);
    assert_ok!(h.store.update_subject(&h.id, "second"));
    sleep(Duration::from_secs(10)).await;

    let calls = h.api.calls();
    assert_eq!(calls.saves.len(), 2);
    assert_eq!(calls.max_in_flight, 1);
    assert_eq!(calls.saves[0].subject, "first");
    assert_eq!(calls.saves[1].subject, "second");
    assert_eq!(calls.saves[1].draft_id.as_deref(), Some("draft-1"));
    drop(calls);

    assert_eq!(h.phase(), DraftPhase::Saved);
}

#[tokio::test(start_paused = true)]
async fn test_save_now_coalesces_with_save_in_flight() {
    let h = Harness::new(MockApi::with_latency(Duration::from_secs(1)));
    h.open("first").await;

    let sync = h.sync.clone();
    let id = h.id.clone();
    let first = tokio::spawn(async move { sync.save_now(&id).await });
    settle_events().await;

    assert_ok!(h.store.update_subject(&h.id, "second"));
    settle_events().await;
    // Returns at once; the in-flight save picks the edit up afterwards.
    assert_ok!(h.sync.save_now(&h.id).await);
    assert_eq!(h.api.calls().saves.len(), 1);

    assert_ok!(assert_ok!(first.await));
    let calls = h.api.calls();
    assert_eq!(calls.saves.len(), 2);
    assert_eq!(calls.max_in_flight, 1);
    assert_eq!(calls.saves[1].subject, "second");
}

#[tokio::test(start_paused = true)]
async fn test_save_retries_transport_errors_until_exhausted() {
    let h = Harness::new(MockApi::default());
    h.open("Lunch").await;
    h.api
        .fail_saves((0..3).map(|_| ApiError::Transport("connection reset".into())));

    let err = assert_err!(h.sync.save_now(&h.id).await);
    assert!(matches!(err, Error::Api(ApiError::Transport(_))));
    assert_eq!(h.api.calls().saves.len(), 3);

    let status = h.sync.status(&h.id).unwrap();
    assert_eq!(status.phase, DraftPhase::Dirty);
    assert_eq!(
        status.last_error,
        Some(ApiError::Transport("connection reset".into()))
    );

    // The next save succeeds and clears the error.
    assert_ok!(h.sync.save_now(&h.id).await);
    let status = h.sync.status(&h.id).unwrap();
    assert_eq!(status.phase, DraftPhase::Saved);
    assert_eq!(status.last_error, None);
}

#[tokio::test(start_paused = true)]
async fn test_save_recovers_after_one_transport_error() {
    let h = Harness::new(MockApi::default());
    h.open("Lunch").await;
    h.api
        .fail_saves([ApiError::Transport("timeout".into())]);

    let sync = h.sync.clone();
    let id = h.id.clone();
    let save = tokio::spawn(async move { sync.save_now(&id).await });

    // First attempt failed; the retry is 100ms away.
    sleep(Duration::from_millis(50)).await;
    let status = h.sync.status(&h.id).unwrap();
    assert_eq!(status.phase, DraftPhase::Dirty);
    assert_eq!(status.last_error, Some(ApiError::Transport("timeout".into())));

    assert_ok!(assert_ok!(save.await));
    assert_eq!(h.api.calls().saves.len(), 2);
    let status = h.sync.status(&h.id).unwrap();
    assert_eq!(status.phase, DraftPhase::Saved);
    assert_eq!(status.last_error, None);
}

#[tokio::test(start_paused = true)]
async fn test_server_fault_is_not_retried() {
    let h = Harness::new(MockApi::default());
    h.open("Lunch").await;
    h.api.fail_saves([ApiError::Fault(webmail_soap::Fault::new(
        "permission denied",
        "service.PERM_DENIED",
    ))]);

    let err = assert_err!(h.sync.save_now(&h.id).await);
    assert!(matches!(err, Error::Api(ApiError::Fault(_))));
    assert_eq!(h.api.calls().saves.len(), 1);
    assert_eq!(h.phase(), DraftPhase::Dirty);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_countdown_prevents_send() {
    let h = Harness::new(MockApi::default());
    h.open("Lunch").await;

    let handle = assert_ok!(h.sync.send(&h.id));
    assert_eq!(h.phase(), DraftPhase::SendCountdown);
    assert_eq!(handle.countdown(), 3);

    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(handle.countdown(), 2);
    assert!(handle.cancel());
    assert!(!handle.cancel());
    assert_eq!(handle.wait().await, SendOutcome::Cancelled);

    sleep(Duration::from_secs(10)).await;
    let calls = h.api.calls();
    assert!(calls.sends.is_empty());
    // The edits that were pending when send was pressed get autosaved.
    assert_eq!(calls.saves.len(), 1);
    drop(calls);

    assert!(h.store.contains(&h.id));
    assert_eq!(h.phase(), DraftPhase::Saved);
}

#[tokio::test(start_paused = true)]
async fn test_countdown_expiry_sends_exactly_once() {
    let h = Harness::new(MockApi::default());
    h.open("Lunch").await;

    let handle = assert_ok!(h.sync.send(&h.id));
    let outcome = handle.wait().await;
    assert_eq!(
        outcome,
        SendOutcome::Sent(SentMessage {
            message_id: Some("sent-1".into()),
        })
    );
    assert!(!handle.cancel());

    sleep(Duration::from_secs(10)).await;
    let calls = h.api.calls();
    assert_eq!(calls.sends.len(), 1);
    assert!(calls.saves.is_empty());
    assert_eq!(calls.sends[0].0.subject, "Lunch");
    drop(calls);

    assert!(!h.store.contains(&h.id));
    assert!(h.sync.status(&h.id).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_second_send_returns_running_countdown() {
    let h = Harness::new(MockApi::default());
    h.open("Lunch").await;

    let first = assert_ok!(h.sync.send(&h.id));
    sleep(Duration::from_millis(1_500)).await;
    let second = assert_ok!(h.sync.send(&h.id));
    assert_eq!(second.countdown(), first.countdown());

    assert!(second.cancel());
    assert_eq!(first.wait().await, SendOutcome::Cancelled);
    assert!(h.api.calls().sends.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_send_dispatches_edits_made_during_countdown() {
    let h = Harness::new(MockApi::default());
    h.open("Lunch").await;

    let handle = assert_ok!(h.sync.send(&h.id));
    sleep(Duration::from_secs(1)).await;
    assert_ok!(h.store.update_subject(&h.id, "Lunch at noon"));

    assert!(matches!(handle.wait().await, SendOutcome::Sent(_)));
    let calls = h.api.calls();
    assert_eq!(calls.sends.len(), 1);
    assert_eq!(calls.sends[0].0.subject, "Lunch at noon");
    assert!(calls.saves.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_send_waits_for_save_in_flight() {
    let h = Harness::new(MockApi::with_latency(Duration::from_secs(5)));
    h.open("Lunch").await;

    // Save in flight from 500ms to 5500ms; the countdown ends at 3600ms.
    sleep(Duration::from_millis(600)).await;
    let handle = assert_ok!(h.sync.send(&h.id));
    assert!(matches!(handle.wait().await, SendOutcome::Sent(_)));

    let calls = h.api.calls();
    assert_eq!(calls.saves.len(), 1);
    assert_eq!(calls.sends.len(), 1);
    assert_eq!(calls.sends[0].0.draft_id.as_deref(), Some("draft-1"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_send_leaves_draft_dirty_and_reuses_send_uid() {
    let h = Harness::new(MockApi::default());
    h.open("Lunch").await;
    h.api
        .fail_sends([ApiError::Transport("connection reset".into())]);

    let handle = assert_ok!(h.sync.send(&h.id));
    assert_eq!(
        handle.wait().await,
        SendOutcome::Failed(ApiError::Transport("connection reset".into()))
    );

    let status = h.sync.status(&h.id).unwrap();
    assert_eq!(status.phase, DraftPhase::Dirty);
    assert!(status.last_error.is_some());
    assert!(h.store.contains(&h.id));
    assert!(h.sync.active_send(&h.id).is_none());

    let retry = assert_ok!(h.sync.send(&h.id));
    assert!(matches!(retry.wait().await, SendOutcome::Sent(_)));

    let calls = h.api.calls();
    assert_eq!(calls.sends.len(), 2);
    assert_eq!(calls.sends[0].1, calls.sends[1].1);
}

#[tokio::test(start_paused = true)]
async fn test_send_requires_recipients() {
    let h = Harness::new(MockApi::default());
    assert_ok!(
        h.store
            .create_editor(h.id.clone(), Editor::new(h.id.clone()), false)
    );

    let err = assert_err!(h.sync.send(&h.id));
    assert!(matches!(err, Error::Validation(ComposeError::NoRecipients)));
    assert!(h.sync.active_send(&h.id).is_none());

    let err = assert_err!(h.sync.send(&EditorId::new("missing")));
    assert!(matches!(err, Error::EditorNotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn test_discard_deletes_server_draft() {
    let h = Harness::new(MockApi::default());
    h.open("Lunch").await;
    assert_ok!(h.sync.save_now(&h.id).await);

    assert_ok!(h.sync.discard(&h.id).await);
    assert_eq!(h.api.calls().deletes, vec!["draft-1".to_string()]);
    assert!(!h.store.contains(&h.id));
    assert!(h.sync.status(&h.id).is_none());

    let err = assert_err!(h.sync.discard(&h.id).await);
    assert!(matches!(err, Error::EditorNotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn test_discard_during_countdown_cancels_send() {
    let h = Harness::new(MockApi::default());
    h.open("Lunch").await;

    let handle = assert_ok!(h.sync.send(&h.id));
    sleep(Duration::from_secs(1)).await;
    assert_ok!(h.sync.discard(&h.id).await);

    assert_eq!(handle.wait().await, SendOutcome::Cancelled);
    sleep(Duration::from_secs(10)).await;
    let calls = h.api.calls();
    assert!(calls.sends.is_empty());
    // Never saved, so there is nothing to delete on the server.
    assert!(calls.deletes.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_deleting_editor_stops_pending_save() {
    let h = Harness::new(MockApi::default());
    h.open("Lunch").await;

    assert!(h.store.delete_editor(&h.id).is_some());
    sleep(Duration::from_secs(5)).await;
    assert!(h.api.calls().saves.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_completed_upload_is_autosaved() {
    let h = Harness::new(MockApi::default());
    h.open("Report").await;
    assert_ok!(h.sync.save_now(&h.id).await);
    assert_eq!(h.phase(), DraftPhase::Saved);

    let tracker = UploadTracker::new(Arc::clone(&h.api), Arc::clone(&h.store));
    let upload = assert_ok!(tracker.upload(
        &h.id,
        UploadFile::new("report.pdf", "application/pdf", b"pdf".to_vec()),
    ));
    sleep(Duration::from_secs(5)).await;

    let calls = h.api.calls();
    assert_eq!(calls.saves.len(), 2);
    assert_eq!(calls.saves[1].upload_ids, vec!["aid-report.pdf".to_string()]);
    drop(calls);

    let editor = h.store.get(&h.id).unwrap();
    assert!(editor.unsaved_attachment(upload).is_none());
    assert_eq!(editor.saved_attachments.len(), 1);
    assert_eq!(editor.saved_attachments[0].filename, "report.pdf");
    assert_eq!(h.phase(), DraftPhase::Saved);
}

#[tokio::test(start_paused = true)]
async fn test_send_blocked_while_upload_running() {
    let h = Harness::new(MockApi::with_latency(Duration::from_secs(5)));
    h.open("Report").await;

    let tracker = UploadTracker::new(Arc::clone(&h.api), Arc::clone(&h.store));
    let upload = assert_ok!(tracker.upload(
        &h.id,
        UploadFile::new("report.pdf", "application/pdf", b"pdf".to_vec()),
    ));

    let err = assert_err!(h.sync.send(&h.id));
    assert!(matches!(
        err,
        Error::Validation(ComposeError::UploadsPending(1))
    ));

    assert_ok!(tracker.cancel_upload(upload));
    assert_ok!(tracker.remove(upload));
    assert_ok!(h.sync.send(&h.id));
}

#[tokio::test(start_paused = true)]
async fn test_removing_autosaved_upload_detaches_it() {
    let h = Harness::new(MockApi::default());
    h.open("Report").await;

    let tracker = UploadTracker::new(Arc::clone(&h.api), Arc::clone(&h.store));
    let upload = assert_ok!(tracker.upload(
        &h.id,
        UploadFile::new("report.pdf", "application/pdf", b"pdf".to_vec()),
    ));
    sleep(Duration::from_secs(5)).await;
    let editor = h.store.get(&h.id).unwrap();
    assert_eq!(editor.saved_attachments.len(), 1);
    assert_eq!(editor.saved_attachments[0].upload_id, Some(upload));

    assert_ok!(tracker.remove(upload));
    assert!(h.store.get(&h.id).unwrap().saved_attachments.is_empty());
    settle_events().await;
    assert_eq!(h.phase(), DraftPhase::Dirty);
    sleep(Duration::from_secs(5)).await;

    let calls = h.api.calls();
    let last = calls.saves.last().unwrap();
    assert!(last.kept_attachments.is_empty());
    assert!(last.upload_ids.is_empty());
    drop(calls);

    assert!(h.store.get(&h.id).unwrap().saved_attachments.is_empty());
    assert_eq!(h.phase(), DraftPhase::Saved);
}

#[tokio::test(start_paused = true)]
async fn test_send_allowed_right_after_cancelling_upload() {
    let h = Harness::new(MockApi::with_latency(Duration::from_secs(5)));
    h.open("Report").await;

    let tracker = UploadTracker::new(Arc::clone(&h.api), Arc::clone(&h.store));
    let upload = assert_ok!(tracker.upload(
        &h.id,
        UploadFile::new("report.pdf", "application/pdf", b"pdf".to_vec()),
    ));
    assert!(assert_ok!(tracker.cancel_upload(upload)));

    let handle = assert_ok!(h.sync.send(&h.id));
    assert!(matches!(handle.wait().await, SendOutcome::Sent(_)));
    assert!(h.api.calls().sends[0].0.upload_ids.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_sent_editor_releases_its_uploads() {
    let h = Harness::new(MockApi::default());
    h.open("Report").await;

    let tracker = UploadTracker::new(Arc::clone(&h.api), Arc::clone(&h.store));
    let upload = assert_ok!(tracker.upload(
        &h.id,
        UploadFile::new("report.pdf", "application/pdf", b"pdf".to_vec()),
    ));
    sleep(Duration::from_secs(5)).await;
    assert!(tracker.status(upload).is_some());

    let handle = assert_ok!(h.sync.send(&h.id));
    assert!(matches!(handle.wait().await, SendOutcome::Sent(_)));
    settle_events().await;

    assert!(!h.store.contains(&h.id));
    assert!(tracker.status(upload).is_none());
    assert!(tracker.pending_for(&h.id).is_empty());
}
