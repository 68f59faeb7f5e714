use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use modelshop_common::chat::{ChatStats, MessageLog, SessionBoard, SessionId};

use crate::api::ApiClient;
use crate::error::{ApiError, StreamError};
use crate::scope::{SequenceClock, TaskScope};

#[derive(Debug, Clone, Default)]
pub struct AdminDeskView {
    pub board: SessionBoard,
    pub stats: Option<ChatStats>,
    pub selected: Option<SessionId>,
    /// Messages of the selected session.
    pub log: MessageLog,
    pub streaming: bool,
    pub error_message: Option<String>,
}

/// Staff side of the support chat: every open session, plus one selected conversation.
///
/// The session list is fed by periodic snapshots and by the selected
/// session's stream. Both go through [`SessionBoard`] stamped with a
/// [`SequenceClock`] ticket, so a slow snapshot cannot undo a newer push.
pub struct AdminChatDesk {
    api: ApiClient,
    poll_interval: Duration,
    clock: Arc<SequenceClock>,
    view: Arc<watch::Sender<AdminDeskView>>,
    polling: Mutex<Option<TaskScope>>,
    selection: Mutex<TaskScope>,
}

fn apply<F>(view: &watch::Sender<AdminDeskView>, token: &CancellationToken, f: F) -> bool
where
    F: FnOnce(&mut AdminDeskView),
{
    view.send_if_modified(|v| {
        if token.is_cancelled() {
            return false;
        }
        f(v);
        true
    })
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AdminChatDesk {
    pub fn new(api: ApiClient) -> Self {
        let poll_interval = api.config().poll_interval;
        let (view, _) = watch::channel(AdminDeskView::default());
        Self {
            api,
            poll_interval,
            clock: Arc::new(SequenceClock::new()),
            view: Arc::new(view),
            polling: Mutex::new(None),
            selection: Mutex::new(TaskScope::new()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AdminDeskView> {
        self.view.subscribe()
    }

    pub fn snapshot(&self) -> AdminDeskView {
        self.view.borrow().clone()
    }

    /// Start polling sessions and stats. Calling it again restarts the loop.
    pub fn start(&self) {
        let scope = TaskScope::new();
        let api = self.api.clone();
        let clock = self.clock.clone();
        let view = self.view.clone();
        let token = scope.token();
        let every = self.poll_interval;
        scope.spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                refresh_board(&api, &clock, &view, &token).await;
            }
        });
        *lock(&self.polling) = Some(scope);
    }

    /// One immediate refresh of sessions and stats.
    pub async fn refresh(&self) {
        let token = CancellationToken::new();
        refresh_board(&self.api, &self.clock, &self.view, &token).await;
    }

    /// Open a conversation: load its history and follow its stream.
    pub fn select(&self, session: SessionId) {
        let mut scope = lock(&self.selection);
        if self.view.borrow().selected.as_ref() == Some(&session) && !scope.is_cancelled() {
            return;
        }
        let fresh = TaskScope::new();
        self.view.send_modify(|v| {
            scope.cancel();
            v.selected = Some(session.clone());
            v.log = MessageLog::new();
            v.streaming = false;
        });
        *scope = fresh;

        let api = self.api.clone();
        let clock = self.clock.clone();
        let view = self.view.clone();
        let token = scope.token();
        scope.spawn(follow_selected(api, clock, view, token, session));
    }

    pub fn deselect(&self) {
        let scope = lock(&self.selection);
        self.view.send_modify(|v| {
            scope.cancel();
            v.selected = None;
            v.log = MessageLog::new();
            v.streaming = false;
        });
    }

    /// Answer in the selected conversation.
    pub async fn reply(&self, text: &str) -> Result<(), ApiError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ApiError::Invalid("reply is empty".into()));
        }
        let session = self
            .view
            .borrow()
            .selected
            .clone()
            .ok_or_else(|| ApiError::Invalid("no conversation selected".into()))?;
        let token = lock(&self.selection).token();

        match self.api.chat_reply(&session, text).await {
            Ok(Some(message)) => {
                let seq = self.clock.next();
                apply(&self.view, &token, |v| {
                    v.board.apply_push(&session, &message, seq);
                    v.log.merge(message);
                });
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                let message = e.user_message();
                self.view.send_modify(|v| v.error_message = Some(message));
                Err(e)
            }
        }
    }

    /// Close a conversation on the server and drop it from the board.
    pub async fn close_session(&self, session: &SessionId) -> Result<(), ApiError> {
        self.api.chat_close(session).await?;
        tracing::info!(%session, "Chat session closed");
        let seq = self.clock.next();
        self.view.send_modify(|v| v.board.remove(session, seq));
        if self.view.borrow().selected.as_ref() == Some(session) {
            self.deselect();
        }
        self.refresh().await;
        Ok(())
    }

    /// Stop polling and release the selected stream.
    pub fn shutdown(&self) {
        if let Some(polling) = lock(&self.polling).take() {
            polling.cancel();
        }
        let scope = lock(&self.selection);
        self.view.send_modify(|v| {
            scope.cancel();
            v.streaming = false;
        });
    }
}

impl Drop for AdminChatDesk {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Read sessions and stats. The ticket is taken before the requests go out.
async fn refresh_board(
    api: &ApiClient,
    clock: &SequenceClock,
    view: &watch::Sender<AdminDeskView>,
    token: &CancellationToken,
) {
    let seq = clock.next();
    let (sessions, stats) = tokio::join!(api.chat_sessions(), api.chat_stats());

    match sessions {
        Ok(sessions) => {
            apply(view, token, |v| {
                if !v.board.apply_snapshot(sessions, seq) {
                    tracing::debug!(seq, "Dropped stale session snapshot");
                }
                v.error_message = None;
            });
        }
        Err(e) => {
            tracing::warn!("Session poll failed: {e}");
            let message = e.user_message();
            apply(view, token, |v| v.error_message = Some(message));
        }
    }
    // A failed stats read keeps the previous numbers.
    match stats {
        Ok(stats) => {
            apply(view, token, |v| v.stats = Some(stats));
        }
        Err(e) => tracing::warn!("Stats poll failed: {e}"),
    }
}

async fn follow_selected(
    api: ApiClient,
    clock: Arc<SequenceClock>,
    view: Arc<watch::Sender<AdminDeskView>>,
    token: CancellationToken,
    session: SessionId,
) {
    match api.chat_history(&session).await {
        Ok(history) => {
            apply(&view, &token, |v| {
                v.log.merge_history(history);
            });
        }
        Err(e) => tracing::warn!(%session, "Could not load conversation: {e}"),
    }

    let mut stream = match api.chat_stream(&session).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(%session, "Could not open chat stream: {e}");
            return;
        }
    };
    apply(&view, &token, |v| v.streaming = true);

    while let Some(item) = stream.next_message().await {
        match item {
            Ok(message) => {
                let seq = clock.next();
                apply(&view, &token, |v| {
                    v.board.apply_push(&session, &message, seq);
                    v.log.merge(message);
                });
            }
            Err(StreamError::Payload(e)) => {
                tracing::warn!(%session, "Ignoring malformed chat event: {e}");
            }
            Err(e) => {
                tracing::warn!(%session, "Chat stream failed: {e}");
                break;
            }
        }
    }
    apply(&view, &token, |v| v.streaming = false);
}
