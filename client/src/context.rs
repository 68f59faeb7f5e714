//! Application-wide session state shared by reference.
//!
//! Holds the signed-in user and the visitor's chat session. Components that
//! care about changes subscribe to the watch channels instead of polling.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use modelshop_common::auth::{self, Access, Claims, RouteRequirement};
use modelshop_common::chat::SessionId;
use modelshop_common::identity::UserSession;

struct Inner {
    user: watch::Sender<Option<UserSession>>,
    chat_session: watch::Sender<Option<SessionId>>,
}

#[derive(Clone)]
pub struct AppContext {
    inner: Arc<Inner>,
}

impl Default for AppContext {
    fn default() -> Self {
        Self::new(None)
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("user", &self.username())
            .field("chat_session", &self.chat_session())
            .finish()
    }
}

impl AppContext {
    pub fn new(user: Option<UserSession>) -> Self {
        let (user, _) = watch::channel(user);
        let (chat_session, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner { user, chat_session }),
        }
    }

    pub fn user(&self) -> Option<UserSession> {
        self.inner.user.borrow().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.inner.user.borrow().as_ref().map(|u| u.token.clone())
    }

    pub fn user_id(&self) -> Option<String> {
        self.inner.user.borrow().as_ref().map(|u| u.user_id.clone())
    }

    pub fn username(&self) -> Option<String> {
        self.inner.user.borrow().as_ref().map(|u| u.username.clone())
    }

    pub fn sign_in(&self, session: UserSession) {
        tracing::info!(user = %session.username, "Signed in");
        self.inner.user.send_replace(Some(session));
    }

    /// Forget the user and their chat session.
    pub fn sign_out(&self) {
        if self.inner.user.send_replace(None).is_some() {
            tracing::info!("Signed out");
        }
        self.inner.chat_session.send_replace(None);
    }

    pub fn subscribe_user(&self) -> watch::Receiver<Option<UserSession>> {
        self.inner.user.subscribe()
    }

    pub fn chat_session(&self) -> Option<SessionId> {
        self.inner.chat_session.borrow().clone()
    }

    pub fn set_chat_session(&self, session: Option<SessionId>) {
        self.inner.chat_session.send_if_modified(|current| {
            if *current == session {
                return false;
            }
            *current = session;
            true
        });
    }

    pub fn subscribe_chat_session(&self) -> watch::Receiver<Option<SessionId>> {
        self.inner.chat_session.subscribe()
    }

    /// Claims of the current token, if it can be read.
    pub fn claims(&self) -> Option<Claims> {
        let token = self.token()?;
        Claims::decode_unverified(&token).ok()
    }

    /// Apply the route guard to the current token. An unreadable or expired
    /// token is dropped from the context.
    pub fn guard(&self, requirement: RouteRequirement, now: DateTime<Utc>) -> Access {
        let token = self.token();
        let access = auth::guard(token.as_deref(), now, requirement);
        if let Access::RedirectLogin { clear_token: true } = access {
            self.sign_out();
        }
        access
    }
}
