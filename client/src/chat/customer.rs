use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use modelshop_common::chat::{ChatMessage, MessageLog, SessionId, APOLOGY_REPLY, PLACEHOLDER_BOT_REPLY};
use modelshop_common::identity::UserSession;

use super::SendResponse;
use crate::api::ApiClient;
use crate::config::ChatTimings;
use crate::error::StreamError;
use crate::scope::TaskScope;

/// Which pane of the help widget is showing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChatTab {
    #[default]
    Faq,
    Chat,
}

/// Everything the live connection depends on. A change tears the connection down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatBinding {
    pub session_id: Option<SessionId>,
    pub user_id: Option<String>,
    pub tab: ChatTab,
}

#[derive(Debug, Clone, Default)]
pub struct CustomerChatView {
    pub binding: ChatBinding,
    pub log: MessageLog,
    pub streaming: bool,
    pub sending: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank input, nothing sent.
    Empty,
    /// The backend attached the message to a session; history will be re-read.
    Delivered { session_id: SessionId },
    /// No session, but the backend answered directly.
    Replied,
    /// No session and no answer; a placeholder reply follows.
    Anonymous,
    /// Not delivered; an apology follows.
    Failed { reason: String },
}

/// Customer side of the support chat.
///
/// Follows the signed-in user and the stored chat session in [`AppContext`]:
/// when either changes the widget rebinds, so signing out releases the stream.
///
/// [`AppContext`]: crate::context::AppContext
pub struct CustomerChat {
    inner: Arc<ChatInner>,
    context_watch: TaskScope,
}

struct ChatInner {
    api: ApiClient,
    timings: ChatTimings,
    view: Arc<watch::Sender<CustomerChatView>>,
    scope: Mutex<TaskScope>,
}

/// Write to the view unless the scope that owns the write has been torn down.
fn apply<F>(view: &watch::Sender<CustomerChatView>, token: &CancellationToken, f: F) -> bool
where
    F: FnOnce(&mut CustomerChatView),
{
    view.send_if_modified(|v| {
        if token.is_cancelled() {
            return false;
        }
        f(v);
        true
    })
}

impl CustomerChat {
    pub fn new(api: ApiClient) -> Self {
        let timings = api.config().chat;
        let binding = ChatBinding {
            session_id: api.context().chat_session(),
            user_id: api.context().user_id(),
            tab: ChatTab::Faq,
        };
        let (view, _) = watch::channel(CustomerChatView {
            binding,
            ..Default::default()
        });
        let users = api.context().subscribe_user();
        let sessions = api.context().subscribe_chat_session();
        let inner = Arc::new(ChatInner {
            api,
            timings,
            view: Arc::new(view),
            scope: Mutex::new(TaskScope::new()),
        });
        let context_watch = TaskScope::new();
        context_watch.spawn(follow_context(inner.clone(), users, sessions));
        Self {
            inner,
            context_watch,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<CustomerChatView> {
        self.inner.view.subscribe()
    }

    pub fn snapshot(&self) -> CustomerChatView {
        self.inner.view.borrow().clone()
    }

    pub fn binding(&self) -> ChatBinding {
        self.inner.binding()
    }

    /// Switch tabs, keeping session and user.
    pub fn set_tab(&self, tab: ChatTab) {
        let binding = ChatBinding {
            tab,
            ..self.binding()
        };
        self.bind(binding);
    }

    /// Point the widget at a session, user and tab.
    ///
    /// When anything changed, the previous stream and pending timers are
    /// released. With a session on the chat tab, history is fetched and one
    /// stream is opened for that session.
    pub fn bind(&self, binding: ChatBinding) {
        self.inner.bind(binding);
    }

    /// Send a message. Never retried; failures end in an apology message.
    pub async fn send(&self, text: &str) -> SendOutcome {
        self.inner.send(text).await
    }

    /// Release the stream and any pending timers, and stop following the context.
    pub fn shutdown(&self) {
        self.context_watch.cancel();
        let scope = self.inner.lock_scope();
        self.inner.view.send_modify(|v| {
            scope.cancel();
            v.streaming = false;
        });
    }
}

impl ChatInner {
    fn binding(&self) -> ChatBinding {
        self.view.borrow().binding.clone()
    }

    fn bind(&self, binding: ChatBinding) {
        let mut scope = self.lock_scope();
        if self.view.borrow().binding == binding && !scope.is_cancelled() {
            return;
        }

        let fresh = TaskScope::new();
        self.view.send_modify(|v| {
            // Cancel under the view lock so no old task can write after this point.
            scope.cancel();
            let switched_session =
                v.binding.session_id.is_some() && v.binding.session_id != binding.session_id;
            if switched_session || binding.user_id != v.binding.user_id {
                v.log = MessageLog::new();
            }
            v.binding = binding.clone();
            v.streaming = false;
            v.error_message = None;
        });
        *scope = fresh;

        if let (Some(session), ChatTab::Chat) = (binding.session_id, binding.tab) {
            let api = self.api.clone();
            let view = self.view.clone();
            let token = scope.token();
            scope.spawn(follow_session(api, view, token, session));
        }
    }

    async fn send(&self, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Empty;
        }
        let (binding, token) = self.current();
        let sender_name = self.api.context().username().unwrap_or_else(|| "You".into());

        apply(&self.view, &token, |v| {
            v.log.push_local_echo(text, &sender_name, Utc::now());
            v.sending = true;
            v.error_message = None;
        });

        let result = self
            .api
            .chat_send(binding.session_id.as_ref(), binding.user_id.as_deref(), text)
            .await;
        apply(&self.view, &token, |v| v.sending = false);

        match result {
            Ok(SendResponse {
                session_id: Some(session_id),
                ..
            }) => {
                self.api.context().set_chat_session(Some(session_id.clone()));
                if binding.session_id.as_ref() != Some(&session_id) {
                    self.bind(ChatBinding {
                        session_id: Some(session_id.clone()),
                        ..binding
                    });
                }
                self.schedule_refetch(session_id.clone());
                SendOutcome::Delivered { session_id }
            }
            Ok(SendResponse {
                session_id: None,
                reply: Some(reply),
            }) => {
                apply(&self.view, &token, |v| {
                    v.log.merge(ChatMessage::local_bot(&reply, Utc::now()));
                });
                SendOutcome::Replied
            }
            Ok(SendResponse { .. }) => {
                self.schedule_local_reply(PLACEHOLDER_BOT_REPLY, self.timings.placeholder_delay);
                SendOutcome::Anonymous
            }
            Err(e) => {
                tracing::warn!("Chat message not delivered: {e}");
                self.schedule_local_reply(APOLOGY_REPLY, self.timings.apology_delay);
                SendOutcome::Failed {
                    reason: e.user_message(),
                }
            }
        }
    }

    fn lock_scope(&self) -> MutexGuard<'_, TaskScope> {
        self.scope.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current(&self) -> (ChatBinding, CancellationToken) {
        let scope = self.lock_scope();
        (self.binding(), scope.token())
    }

    fn with_scope(&self, f: impl FnOnce(&TaskScope)) {
        let scope = self.lock_scope();
        f(&scope);
    }

    fn schedule_refetch(&self, session: SessionId) {
        let api = self.api.clone();
        let view = self.view.clone();
        let delay = self.timings.refetch_delay;
        self.with_scope(|scope| {
            let token = scope.token();
            scope.spawn(async move {
                tokio::time::sleep(delay).await;
                match api.chat_history(&session).await {
                    Ok(history) => {
                        apply(&view, &token, |v| {
                            v.log.reconcile(history);
                        });
                    }
                    Err(e) => tracing::warn!(%session, "History refetch failed: {e}"),
                }
            });
        });
    }

    fn schedule_local_reply(&self, text: &'static str, delay: std::time::Duration) {
        let view = self.view.clone();
        self.with_scope(|scope| {
            let token = scope.token();
            scope.spawn(async move {
                tokio::time::sleep(delay).await;
                apply(&view, &token, |v| {
                    v.log.merge(ChatMessage::local_bot(text, Utc::now()));
                });
            });
        });
    }
}

/// Rebind whenever the signed-in user or the stored chat session changes.
async fn follow_context(
    inner: Arc<ChatInner>,
    mut users: watch::Receiver<Option<UserSession>>,
    mut sessions: watch::Receiver<Option<SessionId>>,
) {
    loop {
        tokio::select! {
            changed = users.changed() => if changed.is_err() { break },
            changed = sessions.changed() => if changed.is_err() { break },
        }
        let user_id = users.borrow_and_update().as_ref().map(|u| u.user_id.clone());
        let session_id = sessions.borrow_and_update().clone();
        let current = inner.binding();
        if current.user_id != user_id || current.session_id != session_id {
            tracing::debug!(?user_id, ?session_id, "Chat follows context change");
        }
        inner.bind(ChatBinding {
            session_id,
            user_id,
            ..current
        });
    }
}

/// Load a session's history, then merge everything its stream pushes until
/// the stream ends or the scope is cancelled. No reconnect.
async fn follow_session(
    api: ApiClient,
    view: Arc<watch::Sender<CustomerChatView>>,
    token: CancellationToken,
    session: SessionId,
) {
    match api.chat_history(&session).await {
        Ok(history) => {
            apply(&view, &token, |v| {
                v.log.reconcile(history);
            });
        }
        Err(e) => {
            tracing::warn!(%session, "Could not load chat history: {e}");
            let message = e.user_message();
            apply(&view, &token, |v| v.error_message = Some(message));
        }
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
                apply(&view, &token, |v| {
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
    tracing::debug!(%session, "Chat stream ended");
    apply(&view, &token, |v| v.streaming = false);
}

impl Drop for CustomerChat {
    fn drop(&mut self) {
        self.shutdown();
    }
}
