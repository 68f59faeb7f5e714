//! In-process stand-in for the storefront backend.
//!
//! Serves the chat and order endpoints the controllers use, keeps its data in
//! memory and records every request so tests can assert on what went out.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use modelshop_common::chat::{ChatMessage, ChatSession, ChatStats, MessageId, SenderType, SessionId};
use modelshop_common::order::{Order, OrderId, OrderStatus, TrackingDraft, TrackingId, TrackingUpdate};
use modelshop_common::product::Product;

type Fail = (StatusCode, Json<Value>);

fn fail(status: StatusCode, message: &str) -> Fail {
    (status, Json(json!({ "message": message })))
}

/// How `/api/chat/send` answers.
#[derive(Debug, Clone, PartialEq)]
pub enum SendMode {
    /// Attach the message to this session (or to the one the client named).
    AssignSession(String),
    /// No session and no reply.
    Anonymous,
    /// No session, but an immediate answer.
    Reply(String),
    /// Respond with a server error.
    Fail,
}

#[derive(Default)]
struct Data {
    next_id: u64,
    messages: HashMap<String, Vec<ChatMessage>>,
    sessions: Vec<ChatSession>,
    stats: ChatStats,
    send_mode: Option<SendMode>,
    echo_to_stream: bool,
    orders: HashMap<String, Order>,
    tracking: HashMap<String, Vec<TrackingUpdate>>,
    forced_status: Option<OrderStatus>,
    products: Vec<Product>,
    requests: Vec<String>,
    stream_opens: HashMap<String, usize>,
    sessions_delay: Option<Duration>,
}

pub struct MockState {
    data: Mutex<Data>,
    streams: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl MockState {
    fn data(&self) -> MutexGuard<'_, Data> {
        self.data.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn channel(&self, session: &str) -> broadcast::Sender<String> {
        let mut streams = self.streams.lock().unwrap_or_else(|p| p.into_inner());
        streams
            .entry(session.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }

    fn store(&self, session: &str, sender: SenderType, name: &str, text: &str) -> ChatMessage {
        let mut data = self.data();
        data.next_id += 1;
        let message = ChatMessage {
            id: MessageId(format!("m-{}", data.next_id)),
            sender_type: sender,
            sender_name: name.to_string(),
            text: text.to_string(),
            timestamp: Utc::now(),
        };
        data.messages
            .entry(session.to_string())
            .or_default()
            .push(message.clone());
        if let Some(s) = data.sessions.iter_mut().find(|s| s.id.0 == session) {
            s.last_message = Some(text.to_string());
            s.last_message_at = Some(message.timestamp);
        }
        message
    }

    fn broadcast(&self, session: &str, payload: String) {
        // No subscribers is fine.
        let _ = self.channel(session).send(payload);
    }
}

/// A running mock backend bound to a loopback port.
pub struct MockBackend {
    pub addr: SocketAddr,
    state: Arc<MockState>,
    server: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> MockBackend {
        let state = Arc::new(MockState {
            data: Mutex::new(Data {
                send_mode: Some(SendMode::Anonymous),
                ..Default::default()
            }),
            streams: Mutex::new(HashMap::new()),
        });
        let app = router(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("local addr");
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("mock backend stopped: {e}");
            }
        });
        tracing::debug!(%addr, "Mock backend listening");
        MockBackend {
            addr,
            state,
            server,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_send_mode(&self, mode: SendMode) {
        self.state.data().send_mode = Some(mode);
    }

    /// Also push accepted messages onto the session's stream.
    pub fn set_echo_to_stream(&self, echo: bool) {
        self.state.data().echo_to_stream = echo;
    }

    /// Hold `/api/chat/sessions` responses for `delay`.
    pub fn set_sessions_delay(&self, delay: Option<Duration>) {
        self.state.data().sessions_delay = delay;
    }

    pub fn seed_session(&self, id: &str, username: &str) {
        let now = Utc::now();
        self.state.data().sessions.push(ChatSession {
            id: SessionId(id.to_string()),
            username: username.to_string(),
            last_message: None,
            last_message_at: None,
            started_at: now,
        });
    }

    pub fn set_stats(&self, stats: ChatStats) {
        self.state.data().stats = stats;
    }

    /// Store a message in history without streaming it.
    pub fn seed_message(&self, session: &str, sender: SenderType, text: &str) -> ChatMessage {
        self.state.store(session, sender, "seed", text)
    }

    /// Store a message and stream it to subscribers.
    pub fn push_message(&self, session: &str, sender: SenderType, text: &str) -> ChatMessage {
        let message = self.state.store(session, sender, "Support", text);
        self.stream_message(session, &message);
        message
    }

    /// Stream a message without storing it.
    pub fn stream_message(&self, session: &str, message: &ChatMessage) {
        let payload = json!({ "type": "message", "message": message }).to_string();
        self.state.broadcast(session, payload);
    }

    /// Stream an arbitrary event payload.
    pub fn stream_raw(&self, session: &str, payload: &str) {
        self.state.broadcast(session, payload.to_string());
    }

    pub fn history(&self, session: &str) -> Vec<ChatMessage> {
        self.state.data().messages.get(session).cloned().unwrap_or_default()
    }

    /// Open event streams on a session right now.
    pub fn stream_receivers(&self, session: &str) -> usize {
        self.state.channel(session).receiver_count()
    }

    /// Event streams ever opened on a session.
    pub fn stream_opens(&self, session: &str) -> usize {
        self.state.data().stream_opens.get(session).copied().unwrap_or(0)
    }

    pub fn seed_order(&self, order: Order) {
        self.state.data().orders.insert(order.id.0.clone(), order);
    }

    pub fn order(&self, id: &str) -> Option<Order> {
        self.state.data().orders.get(id).cloned()
    }

    pub fn tracking(&self, id: &str) -> Vec<TrackingUpdate> {
        self.state.data().tracking.get(id).cloned().unwrap_or_default()
    }

    /// Make every accepted transition land on `status` instead of the usual next one.
    pub fn force_status(&self, status: Option<OrderStatus>) {
        self.state.data().forced_status = status;
    }

    pub fn seed_product(&self, product: Product) {
        self.state.data().products.push(product);
    }

    /// `"METHOD /path"` of every request served so far.
    pub fn requests(&self) -> Vec<String> {
        self.state.data().requests.clone()
    }

    pub fn count_requests(&self, prefix: &str) -> usize {
        self.requests().iter().filter(|r| r.starts_with(prefix)).count()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/products", get(products))
        .route("/api/chat/messages/{id}", get(chat_history))
        .route("/api/chat/send", post(chat_send))
        .route("/api/chat/stream/{id}", get(chat_stream))
        .route("/api/chat/sessions", get(chat_sessions))
        .route("/api/chat/stats", get(chat_stats))
        .route("/api/chat/reply", post(chat_reply))
        .route("/api/chat/sessions/{id}/close", post(chat_close))
        .route("/api/orders/{id}", get(order_detail))
        .route("/api/orders/{id}/received", post(order_received))
        .route("/api/admin/orders/{id}/tracking", post(tracking_add))
        .route(
            "/api/admin/orders/{id}/tracking/{tid}",
            put(tracking_edit).delete(tracking_delete),
        )
        .route("/api/admin/orders/{id}/{action}", post(order_transition))
        .layer(middleware::from_fn_with_state(state.clone(), record))
        .with_state(state)
}

async fn record(State(state): State<Arc<MockState>>, req: Request, next: Next) -> Response {
    state
        .data()
        .requests
        .push(format!("{} {}", req.method(), req.uri().path()));
    next.run(req).await
}

fn require_bearer(headers: &HeaderMap) -> Result<(), Fail> {
    let ok = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer "));
    if ok {
        Ok(())
    } else {
        Err(fail(StatusCode::UNAUTHORIZED, "missing token"))
    }
}

#[derive(Deserialize)]
struct LoginBody {
    username: String,
}

async fn login(Json(body): Json<LoginBody>) -> Json<Value> {
    let session = if body.username.starts_with("admin") {
        crate::staff_session(&body.username, &[])
    } else {
        crate::customer_session(&body.username)
    };
    Json(json!({
        "token": session.token,
        "userId": session.user_id,
        "username": session.username,
    }))
}

async fn products(State(state): State<Arc<MockState>>) -> Json<Vec<Product>> {
    Json(state.data().products.clone())
}

async fn chat_history(State(state): State<Arc<MockState>>, Path(id): Path<String>) -> Json<Vec<ChatMessage>> {
    Json(state.data().messages.get(&id).cloned().unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendBody {
    #[serde(default)]
    session_id: Option<String>,
    message: String,
}

async fn chat_send(State(state): State<Arc<MockState>>, Json(body): Json<SendBody>) -> Result<Json<Value>, Fail> {
    let (mode, echo) = {
        let data = state.data();
        (data.send_mode.clone(), data.echo_to_stream)
    };
    match mode.unwrap_or(SendMode::Anonymous) {
        SendMode::Fail => Err(fail(StatusCode::INTERNAL_SERVER_ERROR, "chat is unavailable")),
        SendMode::Anonymous => Ok(Json(json!({ "sessionId": null, "reply": null }))),
        SendMode::Reply(text) => Ok(Json(json!({ "sessionId": null, "reply": text }))),
        SendMode::AssignSession(assigned) => {
            let session = body.session_id.unwrap_or(assigned);
            let message = state.store(&session, SenderType::User, "customer", &body.message);
            if echo {
                let payload = json!({ "type": "message", "message": message }).to_string();
                state.broadcast(&session, payload);
            }
            Ok(Json(json!({ "sessionId": session, "reply": null })))
        }
    }
}

async fn chat_stream(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    *state.data().stream_opens.entry(id.clone()).or_default() += 1;
    let rx = state.channel(&id).subscribe();
    let stream = BroadcastStream::new(rx)
        .filter_map(|res| res.ok())
        .map(|payload| Ok(Event::default().data(payload)));
    // Frequent keep-alives make a disconnected client show up quickly.
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_millis(50)))
}

async fn chat_sessions(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ChatSession>>, Fail> {
    require_bearer(&headers)?;
    let (sessions, delay) = {
        let data = state.data();
        (data.sessions.clone(), data.sessions_delay)
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    Ok(Json(sessions))
}

async fn chat_stats(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Result<Json<ChatStats>, Fail> {
    require_bearer(&headers)?;
    Ok(Json(state.data().stats.clone()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyBody {
    session_id: String,
    message: String,
}

async fn chat_reply(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<ReplyBody>,
) -> Result<Json<Value>, Fail> {
    require_bearer(&headers)?;
    let message = state.store(&body.session_id, SenderType::Admin, "Support", &body.message);
    let payload = json!({ "type": "message", "message": message }).to_string();
    state.broadcast(&body.session_id, payload);
    Ok(Json(json!({ "message": message })))
}

async fn chat_close(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, Fail> {
    require_bearer(&headers)?;
    let mut data = state.data();
    let before = data.sessions.len();
    data.sessions.retain(|s| s.id.0 != id);
    if data.sessions.len() == before {
        return Err(fail(StatusCode::NOT_FOUND, "no such session"));
    }
    Ok(Json(json!({ "closed": id })))
}

async fn order_detail(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, Fail> {
    require_bearer(&headers)?;
    let data = state.data();
    let order = data
        .orders
        .get(&id)
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, "order not found"))?;
    let tracking = data.tracking.get(&id).cloned().unwrap_or_default();
    Ok(Json(json!({ "order": order, "tracking": tracking })))
}

/// Apply a transition if the order is in one of `from`.
fn transition(state: &MockState, id: &str, from: &[OrderStatus], to: OrderStatus) -> Result<Json<Value>, Fail> {
    let mut data = state.data();
    let forced = data.forced_status.clone();
    let order = data
        .orders
        .get_mut(id)
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, "order not found"))?;
    if !from.contains(&order.status) {
        return Err(fail(
            StatusCode::CONFLICT,
            &format!("cannot move a {} order to {}", order.status, to),
        ));
    }
    let now = Utc::now();
    match to {
        OrderStatus::Verified => order.verified_at = Some(now),
        OrderStatus::Shipping => order.shipping_at = Some(now),
        OrderStatus::Received => order.received_at = Some(now),
        OrderStatus::Completed => order.completed_at = Some(now),
        _ => {}
    }
    order.status = forced.unwrap_or(to);
    Ok(Json(json!({ "status": order.status })))
}

async fn order_transition(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path((id, action)): Path<(String, String)>,
) -> Result<Json<Value>, Fail> {
    require_bearer(&headers)?;
    use OrderStatus::*;
    match action.as_str() {
        "verify" => transition(&state, &id, &[Processing], Verified),
        "cancel" => transition(&state, &id, &[Processing, Verified], Cancelled),
        "start-shipping" => transition(&state, &id, &[Verified], Shipping),
        "finish-shipping" => {
            if state.data().tracking.get(&id).map_or(true, Vec::is_empty) {
                return Err(fail(StatusCode::CONFLICT, "add a tracking update first"));
            }
            transition(&state, &id, &[Shipping], Received)
        }
        _ => Err(fail(StatusCode::NOT_FOUND, "unknown action")),
    }
}

async fn order_received(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, Fail> {
    require_bearer(&headers)?;
    transition(&state, &id, &[OrderStatus::Received], OrderStatus::Completed)
}

async fn tracking_add(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(draft): Json<TrackingDraft>,
) -> Result<Json<TrackingUpdate>, Fail> {
    require_bearer(&headers)?;
    let mut data = state.data();
    if !data.orders.contains_key(&id) {
        return Err(fail(StatusCode::NOT_FOUND, "order not found"));
    }
    data.next_id += 1;
    let update = TrackingUpdate {
        id: TrackingId(format!("t-{}", data.next_id)),
        status: draft.status,
        location: draft.location,
        timestamp: Utc::now(),
    };
    data.tracking.entry(id).or_default().push(update.clone());
    Ok(Json(update))
}

async fn tracking_edit(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path((id, tid)): Path<(String, String)>,
    Json(draft): Json<TrackingDraft>,
) -> Result<Json<Value>, Fail> {
    require_bearer(&headers)?;
    let mut data = state.data();
    let update = data
        .tracking
        .get_mut(&id)
        .and_then(|list| list.iter_mut().find(|u| u.id.0 == tid))
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, "tracking update not found"))?;
    update.status = draft.status;
    update.location = draft.location;
    Ok(Json(json!({ "updated": tid })))
}

async fn tracking_delete(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path((id, tid)): Path<(String, String)>,
) -> Result<Json<Value>, Fail> {
    require_bearer(&headers)?;
    let mut data = state.data();
    let list = data
        .tracking
        .get_mut(&id)
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, "tracking update not found"))?;
    let before = list.len();
    list.retain(|u| u.id.0 != tid);
    if list.len() == before {
        return Err(fail(StatusCode::NOT_FOUND, "tracking update not found"));
    }
    Ok(Json(json!({ "deleted": tid })))
}

/// Id helper for tests that build orders by hand.
pub fn order_id(id: &str) -> OrderId {
    OrderId(id.to_string())
}
