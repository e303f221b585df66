//! Undo-send countdown and dispatch.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tracing::{debug, info, warn};

use super::state::{DraftPhase, DraftStatus, SendOutcome, SendProcess, SendProcessStatus};
use super::sync::Inner;
use crate::api::{MailApi, OutgoingDraft};
use crate::editor::EditorId;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Countdown,
    Cancelled,
    Dispatching,
    Finished,
}

#[derive(Debug)]
struct Progress {
    stage: Stage,
    remaining: u32,
}

/// State shared between a countdown task and its handles.
///
/// `progress` is the single point where cancel and dispatch race: whichever
/// moves the stage out of `Countdown` first wins.
#[derive(Debug)]
pub(super) struct SendShared {
    editor: EditorId,
    send_uid: String,
    progress: Mutex<Progress>,
    wake: Notify,
    status: Arc<watch::Sender<DraftStatus>>,
    save_lock: Arc<tokio::sync::Mutex<()>>,
    /// Restart autosave after a cancel; the draft had unsaved edits.
    resume_autosave: bool,
    outcome: watch::Sender<Option<SendOutcome>>,
}

impl SendShared {
    pub(super) fn new(
        editor: EditorId,
        send_uid: String,
        seconds: u32,
        status: Arc<watch::Sender<DraftStatus>>,
        save_lock: Arc<tokio::sync::Mutex<()>>,
        resume_autosave: bool,
    ) -> Self {
        Self {
            editor,
            send_uid,
            progress: Mutex::new(Progress {
                stage: Stage::Countdown,
                remaining: seconds,
            }),
            wake: Notify::new(),
            status,
            save_lock,
            resume_autosave,
            outcome: watch::channel(None).0,
        }
    }

    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn is_counting_down(&self) -> bool {
        self.progress().stage == Stage::Countdown
    }

    pub(super) fn is_dispatching(&self) -> bool {
        self.progress().stage == Stage::Dispatching
    }

    /// Seconds left while counting down.
    fn counting_down(&self) -> Option<u32> {
        let progress = self.progress();
        (progress.stage == Stage::Countdown).then_some(progress.remaining)
    }

    /// Stops the countdown. Returns false once dispatch has begun.
    pub(super) fn cancel(&self) -> bool {
        {
            let mut progress = self.progress();
            if progress.stage != Stage::Countdown {
                return false;
            }
            progress.stage = Stage::Cancelled;
            progress.remaining = 0;
            self.status.send_modify(|status| {
                status.phase = DraftPhase::Cancelled;
                status.countdown = None;
            });
        }

        self.wake.notify_one();
        info!(editor = %self.editor, "Send cancelled");
        true
    }

    fn tick(&self) {
        let mut progress = self.progress();
        if progress.stage == Stage::Countdown && progress.remaining > 0 {
            progress.remaining -= 1;
            let remaining = progress.remaining;
            self.status
                .send_modify(|status| status.countdown = Some(remaining));
        }
    }

    fn begin_dispatch(&self) -> bool {
        let mut progress = self.progress();
        if progress.stage != Stage::Countdown {
            return false;
        }
        progress.stage = Stage::Dispatching;
        progress.remaining = 0;
        true
    }

    fn finish(&self, outcome: SendOutcome) {
        self.progress().stage = Stage::Finished;
        self.outcome.send_replace(Some(outcome));
    }
}

/// Handle to a scheduled send.
///
/// Cloning yields another handle to the same send.
#[derive(Debug, Clone)]
pub struct SendHandle {
    shared: Arc<SendShared>,
}

impl SendHandle {
    pub(super) const fn new(shared: Arc<SendShared>) -> Self {
        Self { shared }
    }

    /// Editor being sent.
    #[must_use]
    pub fn editor_id(&self) -> &EditorId {
        &self.shared.editor
    }

    /// Cancels the send if the countdown is still running.
    ///
    /// Returns true if this call prevented the send. Once it returns true no
    /// send request is issued; once dispatch has begun it returns false and
    /// the send is not repeated.
    pub fn cancel(&self) -> bool {
        self.shared.cancel()
    }

    /// Seconds left before dispatch.
    #[must_use]
    pub fn countdown(&self) -> u32 {
        self.shared.progress().remaining
    }

    /// Activity and remaining seconds.
    #[must_use]
    pub fn status(&self) -> SendProcessStatus {
        let progress = self.shared.progress();
        let status = match progress.stage {
            Stage::Countdown | Stage::Dispatching => SendProcess::Running,
            Stage::Cancelled | Stage::Finished => SendProcess::Idle,
        };
        SendProcessStatus {
            status,
            countdown: progress.remaining,
        }
    }

    /// Outcome, once known.
    #[must_use]
    pub fn outcome(&self) -> Option<SendOutcome> {
        self.shared.outcome.borrow().clone()
    }

    /// Waits until the send is sent, cancelled or failed.
    pub async fn wait(&self) -> SendOutcome {
        let mut outcome = self.shared.outcome.subscribe();
        let settled = match outcome.wait_for(Option::is_some).await {
            Ok(settled) => settled.clone(),
            Err(_) => None,
        };
        settled.unwrap_or(SendOutcome::Cancelled)
    }
}

impl<A: MailApi> Inner<A> {
    /// Counts down once per second, then dispatches unless cancelled.
    pub(super) async fn run_countdown(self: Arc<Self>, shared: Arc<SendShared>) {
        loop {
            match shared.counting_down() {
                Some(remaining) if remaining > 0 => {}
                _ => break,
            }
            tokio::select! {
                () = shared.wake.notified() => {}
                () = tokio::time::sleep(TICK) => shared.tick(),
            }
        }

        if shared.begin_dispatch() {
            self.dispatch(&shared).await;
        } else {
            self.finish_cancel(&shared);
        }
    }

    fn finish_cancel(self: &Arc<Self>, shared: &Arc<SendShared>) {
        let id = &shared.editor;
        {
            let mut slots = self.slots();
            if let Some(slot) = slots.get_mut(id) {
                if slot.owns(shared) {
                    slot.send = None;
                    slot.set_phase(DraftPhase::Dirty);
                    let unsaved = shared.resume_autosave || slot.edited_during_send;
                    slot.edited_during_send = false;
                    if unsaved && self.store.contains(id) {
                        self.arm_debounce(slot, id);
                    }
                }
            }
        }
        debug!(editor = %id, "Send countdown stopped");
        shared.finish(SendOutcome::Cancelled);
    }

    async fn dispatch(&self, shared: &SendShared) {
        let id = &shared.editor;

        // Lets an in-flight save land first, and keeps new ones out.
        let guard = Arc::clone(&shared.save_lock).lock_owned().await;
        shared.status.send_modify(|status| {
            status.phase = DraftPhase::Sending;
            status.countdown = None;
        });

        let Some(editor) = self.store.get(id) else {
            warn!(editor = %id, "Editor closed before dispatch");
            shared.finish(SendOutcome::Cancelled);
            return;
        };
        let draft = OutgoingDraft::from_editor(&editor);

        info!(
            editor = %id,
            draft = ?draft.draft_id,
            recipients = editor.recipients.all().len(),
            "Sending message"
        );
        let result = self.api.send_message(&draft, &shared.send_uid).await;
        drop(guard);

        match result {
            Ok(sent) => {
                info!(editor = %id, message = ?sent.message_id, "Message sent");
                let slot = self.slots().remove(id);
                if let Some(mut slot) = slot {
                    slot.abort_debounce();
                }
                shared.status.send_modify(|status| {
                    status.phase = DraftPhase::Sent;
                    status.last_error = None;
                });
                self.store.delete_editor(id);
                shared.finish(SendOutcome::Sent(sent));
            }
            Err(e) => {
                warn!(editor = %id, error = %e, "Send failed");
                {
                    let mut slots = self.slots();
                    if let Some(slot) = slots.get_mut(id) {
                        if slot.send.as_ref().is_some_and(|s| std::ptr::eq(&**s, shared)) {
                            slot.send = None;
                            slot.edited_during_send = false;
                        }
                    }
                }
                shared.status.send_modify(|status| {
                    status.phase = DraftPhase::Dirty;
                    status.last_error = Some(e.clone());
                });
                shared.finish(SendOutcome::Failed(e));
            }
        }
    }
}
