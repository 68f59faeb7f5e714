use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reply shown when an anonymous visitor writes and the backend opens no session.
pub const PLACEHOLDER_BOT_REPLY: &str =
    "Thanks for your message! A member of our team will get back to you shortly.";

/// Reply shown when a message could not be delivered.
pub const APOLOGY_REPLY: &str =
    "Sorry, we couldn't send your message right now. Please try again in a moment.";

/// How far the server's timestamp on a confirmed message may trail the local echo.
pub const ECHO_CLOCK_SKEW_SECS: i64 = 5;

/// Prefix for ids of optimistic messages that the server has not confirmed yet.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Server-assigned message identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }
}

/// Server-assigned chat session identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    User,
    Admin,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "MessageID")]
    pub id: MessageId,
    #[serde(rename = "SenderType")]
    pub sender_type: SenderType,
    #[serde(rename = "SenderName", default)]
    pub sender_name: String,
    #[serde(rename = "MessageText")]
    pub text: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// A bot message generated on this side (placeholder or apology).
    pub fn local_bot(text: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: MessageId(format!("{LOCAL_ID_PREFIX}bot-{}", uuid::Uuid::new_v4())),
            sender_type: SenderType::Bot,
            sender_name: "Support Bot".into(),
            text: text.to_string(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    #[serde(rename = "SessionID")]
    pub id: SessionId,
    #[serde(rename = "Username", default)]
    pub username: String,
    #[serde(rename = "LastMessage", default)]
    pub last_message: Option<String>,
    #[serde(rename = "LastMessageTimestamp", default)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(rename = "StartTime")]
    pub started_at: DateTime<Utc>,
}

/// Counters shown on the support dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStats {
    #[serde(default)]
    pub active_sessions: u32,
    #[serde(default)]
    pub messages_today: u32,
    #[serde(default)]
    pub awaiting_reply: u32,
}

// ---------- Stream envelope ----------

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<serde_json::Value>,
}

/// Decoder for the JSON payload of one event on a chat stream.
pub struct StreamEnvelope;

impl StreamEnvelope {
    /// Decode an event payload. Only `type == "message"` carries a chat message;
    /// every other type yields `Ok(None)`.
    pub fn decode(payload: &str) -> Result<Option<ChatMessage>, serde_json::Error> {
        let raw: RawEnvelope = serde_json::from_str(payload)?;
        if raw.kind != "message" {
            return Ok(None);
        }
        match raw.message {
            Some(value) => serde_json::from_value(value).map(Some),
            None => Ok(None),
        }
    }
}

// ---------- Message log ----------

/// The displayed message list of one conversation.
///
/// Keyed by `MessageID`: an id is stored at most once. Messages stay sorted by
/// timestamp, ties keep arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageLog {
    messages: Vec<ChatMessage>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| &m.id == id)
    }

    /// Insert a message unless its id is already present. Returns `true` if inserted.
    ///
    /// A server copy of the user's own message takes the place of the oldest
    /// matching local echo, so the log never shows it twice and never shrinks.
    pub fn merge(&mut self, message: ChatMessage) -> bool {
        if self.contains(&message.id) {
            return false;
        }
        if let Some(echo) = self.echo_confirmed_by(&message) {
            self.messages.remove(echo);
        }
        let pos = self
            .messages
            .partition_point(|m| m.timestamp <= message.timestamp);
        self.messages.insert(pos, message);
        true
    }

    /// Index of the oldest local echo that `message` confirms.
    ///
    /// Same text, sent by the user, stamped at or after the echo. The server
    /// clock may lag ours by up to [`ECHO_CLOCK_SKEW_SECS`].
    fn echo_confirmed_by(&self, message: &ChatMessage) -> Option<usize> {
        if message.id.is_local() || message.sender_type != SenderType::User {
            return None;
        }
        let latest_echo = message.timestamp + chrono::Duration::seconds(ECHO_CLOCK_SKEW_SECS);
        self.messages.iter().position(|m| {
            m.id.is_local()
                && m.sender_type == SenderType::User
                && m.text == message.text
                && m.timestamp <= latest_echo
        })
    }

    /// Merge a fetched history. Returns the number of new messages.
    pub fn merge_history<I>(&mut self, history: I) -> usize
    where
        I: IntoIterator<Item = ChatMessage>,
    {
        history.into_iter().filter(|m| self.merge(m.clone())).count()
    }

    /// Append an optimistic copy of a message the user just sent.
    pub fn push_local_echo(
        &mut self,
        text: &str,
        sender_name: &str,
        timestamp: DateTime<Utc>,
    ) -> MessageId {
        let id = MessageId(format!("{LOCAL_ID_PREFIX}{}", uuid::Uuid::new_v4()));
        self.merge(ChatMessage {
            id: id.clone(),
            sender_type: SenderType::User,
            sender_name: sender_name.to_string(),
            text: text.to_string(),
            timestamp,
        });
        id
    }

    /// Merge a full history fetch. Echoes the history confirms are retired one
    /// for one by [`merge`](Self::merge). Returns the number of new messages.
    pub fn reconcile(&mut self, history: Vec<ChatMessage>) -> usize {
        self.merge_history(history)
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

// ---------- Session board ----------

#[derive(Debug, Clone, PartialEq)]
struct BoardEntry {
    session: ChatSession,
    seq: u64,
}

/// The admin's view of all open chat sessions.
///
/// Both periodic snapshots and pushed messages write here. Every write carries
/// the sequence number taken when its request was issued, and an older write
/// never replaces a newer one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionBoard {
    entries: std::collections::BTreeMap<SessionId, BoardEntry>,
    snapshot_seq: Option<u64>,
    /// Sessions closed here, with the sequence number of the close.
    removed: std::collections::BTreeMap<SessionId, u64>,
}

impl SessionBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a full session list. Returns `false` if the snapshot was stale and dropped.
    pub fn apply_snapshot(&mut self, sessions: Vec<ChatSession>, seq: u64) -> bool {
        if matches!(self.snapshot_seq, Some(applied) if applied > seq) {
            return false;
        }
        self.snapshot_seq = Some(seq);
        // A snapshot issued after a close is authoritative again.
        self.removed.retain(|_, closed| *closed > seq);

        let present: std::collections::BTreeSet<SessionId> =
            sessions.iter().map(|s| s.id.clone()).collect();
        // Sessions absent from the snapshot were closed, unless a newer push revived them.
        self.entries
            .retain(|id, entry| present.contains(id) || entry.seq > seq);

        for session in sessions {
            if self.removed.contains_key(&session.id) {
                continue;
            }
            match self.entries.get(&session.id) {
                Some(existing) if existing.seq > seq => {}
                _ => {
                    self.entries
                        .insert(session.id.clone(), BoardEntry { session, seq });
                }
            }
        }
        true
    }

    /// Apply a message pushed on a session's stream.
    pub fn apply_push(&mut self, session_id: &SessionId, message: &ChatMessage, seq: u64) -> bool {
        let Some(entry) = self.entries.get_mut(session_id) else {
            return false;
        };
        if entry.seq > seq {
            return false;
        }
        let newer = entry
            .session
            .last_message_at
            .map_or(true, |at| message.timestamp >= at);
        if newer {
            entry.session.last_message = Some(message.text.clone());
            entry.session.last_message_at = Some(message.timestamp);
        }
        entry.seq = seq;
        true
    }

    /// Drop a session immediately (e.g. after staff closed it).
    ///
    /// Snapshots issued before `seq` cannot bring it back.
    pub fn remove(&mut self, session_id: &SessionId, seq: u64) {
        if matches!(self.entries.get(session_id), Some(entry) if entry.seq > seq) {
            return;
        }
        self.entries.remove(session_id);
        let closed = self.removed.entry(session_id.clone()).or_insert(seq);
        *closed = (*closed).max(seq);
    }

    pub fn get(&self, session_id: &SessionId) -> Option<&ChatSession> {
        self.entries.get(session_id).map(|e| &e.session)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sessions with the most recent activity first.
    pub fn sessions(&self) -> Vec<&ChatSession> {
        let mut sessions: Vec<_> = self.entries.values().map(|e| &e.session).collect();
        sessions.sort_by(|a, b| {
            let a_at = a.last_message_at.unwrap_or(a.started_at);
            let b_at = b.last_message_at.unwrap_or(b.started_at);
            b_at.cmp(&a_at)
        });
        sessions
    }
}
