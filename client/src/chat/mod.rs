//! Support chat: endpoint wrappers plus the customer and staff controllers.

mod admin;
mod customer;

pub use admin::{AdminChatDesk, AdminDeskView};
pub use customer::{ChatBinding, ChatTab, CustomerChat, CustomerChatView, SendOutcome};

use reqwest::Method;
use serde::{Deserialize, Serialize};

use modelshop_common::chat::{ChatMessage, ChatSession, ChatStats, SessionId};

use crate::api::{ApiClient, Auth};
use crate::error::ApiError;
use crate::sse::ChatStream;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    message: &'a str,
}

/// What the backend says after accepting a visitor's message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub reply: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    session_id: &'a str,
    message: &'a str,
}

#[derive(Deserialize)]
struct ReplyResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
}

impl ApiClient {
    pub async fn chat_history(&self, session: &SessionId) -> Result<Vec<ChatMessage>, ApiError> {
        let path = format!("/api/chat/messages/{session}");
        self.send_json(self.request(Method::GET, &path, Auth::Optional)?)
            .await
    }

    pub async fn chat_send(
        &self,
        session: Option<&SessionId>,
        user_id: Option<&str>,
        text: &str,
    ) -> Result<SendResponse, ApiError> {
        tracing::debug!(session = ?session, "Sending chat message");
        let rb = self
            .request(Method::POST, "/api/chat/send", Auth::Optional)?
            .json(&SendRequest {
                session_id: session.map(|s| s.0.as_str()),
                user_id,
                message: text,
            });
        self.send_json(rb).await
    }

    /// Open the event stream of one session.
    pub async fn chat_stream(&self, session: &SessionId) -> Result<ChatStream, ApiError> {
        let path = format!("/api/chat/stream/{session}");
        let resp = self
            .send_raw(self.stream_request(&path, Auth::Optional)?)
            .await?;
        tracing::debug!(%session, "Chat stream open");
        Ok(ChatStream::from_response(resp))
    }

    pub async fn chat_sessions(&self) -> Result<Vec<ChatSession>, ApiError> {
        self.send_json(self.request(Method::GET, "/api/chat/sessions", Auth::Bearer)?)
            .await
    }

    pub async fn chat_stats(&self) -> Result<ChatStats, ApiError> {
        self.send_json(self.request(Method::GET, "/api/chat/stats", Auth::Bearer)?)
            .await
    }

    /// Answer a visitor as staff. Returns the stored message when the backend echoes it.
    pub async fn chat_reply(&self, session: &SessionId, text: &str) -> Result<Option<ChatMessage>, ApiError> {
        let rb = self
            .request(Method::POST, "/api/chat/reply", Auth::Bearer)?
            .json(&ReplyRequest {
                session_id: &session.0,
                message: text,
            });
        let resp: ReplyResponse = self.send_json(rb).await?;
        Ok(resp.message)
    }

    pub async fn chat_close(&self, session: &SessionId) -> Result<(), ApiError> {
        let path = format!("/api/chat/sessions/{session}/close");
        self.send_unit(self.request(Method::POST, &path, Auth::Bearer)?)
            .await
    }
}
