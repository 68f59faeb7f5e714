//! Customer chat widget and support desk against the mock backend.

use std::time::Duration;

use modelshop_api_integration::{
    client, customer_session, init_tracing, staff_session, wait_until, MockBackend, SendMode,
};
use modelshop_client::chat::{AdminChatDesk, ChatBinding, ChatTab, CustomerChat, SendOutcome};
use modelshop_common::auth::permissions;
use modelshop_common::chat::{ChatStats, SenderType, SessionId, APOLOGY_REPLY, PLACEHOLDER_BOT_REPLY};

const TIMEOUT: Duration = Duration::from_secs(3);

fn sid(id: &str) -> SessionId {
    SessionId(id.to_string())
}

fn chat_binding(session: Option<&str>, user: Option<&str>) -> ChatBinding {
    ChatBinding {
        session_id: session.map(sid),
        user_id: user.map(str::to_string),
        tab: ChatTab::Chat,
    }
}

fn texts(chat: &CustomerChat) -> Vec<String> {
    chat.snapshot()
        .log
        .messages()
        .iter()
        .map(|m| m.text.clone())
        .collect()
}

#[tokio::test]
async fn first_message_adopts_server_session() {
    init_tracing();
    let backend = MockBackend::start().await;
    backend.set_send_mode(SendMode::AssignSession("abc123".into()));
    let api = client(&backend, None);
    let chat = CustomerChat::new(api.clone());
    chat.bind(chat_binding(None, None));

    let outcome = chat.send("  Do you ship to Cebu?  ").await;
    assert_eq!(
        outcome,
        SendOutcome::Delivered {
            session_id: sid("abc123")
        }
    );
    assert_eq!(api.context().chat_session(), Some(sid("abc123")));
    assert_eq!(chat.binding().session_id, Some(sid("abc123")));

    // History is re-read and the optimistic echo gives way to the stored message.
    assert!(
        wait_until(TIMEOUT, || {
            let view = chat.snapshot();
            view.log.len() == 1 && view.log.messages().iter().all(|m| !m.id.is_local())
        })
        .await,
        "log: {:?}",
        chat.snapshot().log
    );
    assert!(backend.count_requests("GET /api/chat/messages/abc123") >= 1);
    assert_eq!(texts(&chat), vec!["Do you ship to Cebu?"]);

    // No placeholder for a message that reached a session.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(chat
        .snapshot()
        .log
        .messages()
        .iter()
        .all(|m| m.sender_type != SenderType::Bot));
    assert!(wait_until(TIMEOUT, || backend.stream_opens("abc123") == 1).await);
}

#[tokio::test]
async fn history_and_stream_duplicates_show_once() {
    init_tracing();
    let backend = MockBackend::start().await;
    backend.set_send_mode(SendMode::AssignSession("s1".into()));
    backend.set_echo_to_stream(true);
    backend.seed_message("s1", SenderType::User, "Hi");
    backend.seed_message("s1", SenderType::Admin, "Hello! How can we help?");

    let user = customer_session("mika");
    let api = client(&backend, Some(user.clone()));
    let chat = CustomerChat::new(api);
    chat.bind(chat_binding(Some("s1"), Some(&user.user_id)));

    assert!(wait_until(TIMEOUT, || chat.snapshot().log.len() == 2 && chat.snapshot().streaming).await);
    assert!(wait_until(TIMEOUT, || backend.stream_receivers("s1") == 1).await);

    // Accepted, streamed back and re-read from history: one entry.
    chat.send("Is the Gundam kit in stock?").await;
    assert!(
        wait_until(TIMEOUT, || {
            chat.snapshot().log.len() == 3
                && chat.snapshot().log.messages().iter().all(|m| !m.id.is_local())
        })
        .await
    );

    // The same event delivered twice is merged once.
    let reply = backend.push_message("s1", SenderType::Admin, "Yes, two left.");
    backend.stream_message("s1", &reply);
    assert!(wait_until(TIMEOUT, || chat.snapshot().log.contains(&reply.id)).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(chat.snapshot().log.len(), 4);
    assert_eq!(
        texts(&chat),
        vec![
            "Hi",
            "Hello! How can we help?",
            "Is the Gundam kit in stock?",
            "Yes, two left."
        ]
    );
}

#[tokio::test]
async fn malformed_and_foreign_events_are_skipped() {
    init_tracing();
    let backend = MockBackend::start().await;
    let chat = CustomerChat::new(client(&backend, None));
    chat.bind(chat_binding(Some("s9"), None));
    assert!(wait_until(TIMEOUT, || backend.stream_receivers("s9") == 1).await);

    backend.stream_raw("s9", "{not json");
    backend.stream_raw("s9", r#"{"type":"typing"}"#);
    let message = backend.push_message("s9", SenderType::Admin, "Still there?");

    assert!(wait_until(TIMEOUT, || chat.snapshot().log.contains(&message.id)).await);
    assert_eq!(chat.snapshot().log.len(), 1);
    assert!(chat.snapshot().streaming);
}

#[tokio::test]
async fn anonymous_visitor_gets_placeholder() {
    init_tracing();
    let backend = MockBackend::start().await;
    backend.set_send_mode(SendMode::Anonymous);
    let api = client(&backend, None);
    let chat = CustomerChat::new(api.clone());
    chat.bind(chat_binding(None, None));

    assert_eq!(chat.send("hello?").await, SendOutcome::Anonymous);
    assert!(
        wait_until(TIMEOUT, || texts(&chat)
            == vec!["hello?".to_string(), PLACEHOLDER_BOT_REPLY.to_string()])
        .await
    );
    assert_eq!(api.context().chat_session(), None);
    assert_eq!(backend.count_requests("GET /api/chat/stream"), 0);
}

#[tokio::test]
async fn direct_reply_is_shown_without_session() {
    init_tracing();
    let backend = MockBackend::start().await;
    backend.set_send_mode(SendMode::Reply("We open at 10am.".into()));
    let chat = CustomerChat::new(client(&backend, None));
    chat.bind(chat_binding(None, None));

    assert_eq!(chat.send("opening hours").await, SendOutcome::Replied);
    let view = chat.snapshot();
    let bot = view.log.last().expect("reply");
    assert_eq!(bot.sender_type, SenderType::Bot);
    assert_eq!(bot.text, "We open at 10am.");
}

#[tokio::test]
async fn failed_send_apologises_once() {
    init_tracing();
    let backend = MockBackend::start().await;
    backend.set_send_mode(SendMode::Fail);
    let chat = CustomerChat::new(client(&backend, None));
    chat.bind(chat_binding(None, None));

    let outcome = chat.send("anyone?").await;
    assert_eq!(
        outcome,
        SendOutcome::Failed {
            reason: "chat is unavailable".into()
        }
    );
    assert!(wait_until(TIMEOUT, || texts(&chat).last().map(String::as_str) == Some(APOLOGY_REPLY)).await);
    // The echo stays and the message is not retried.
    assert_eq!(texts(&chat).first().map(String::as_str), Some("anyone?"));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(backend.count_requests("POST /api/chat/send"), 1);
}

#[tokio::test]
async fn blank_message_is_not_sent() {
    let backend = MockBackend::start().await;
    let chat = CustomerChat::new(client(&backend, None));
    assert_eq!(chat.send("   ").await, SendOutcome::Empty);
    assert!(chat.snapshot().log.is_empty());
    assert_eq!(backend.count_requests("POST"), 0);
}

#[tokio::test]
async fn switching_sessions_releases_the_old_stream() {
    init_tracing();
    let backend = MockBackend::start().await;
    backend.seed_message("s1", SenderType::Admin, "about order 1");
    backend.seed_message("s2", SenderType::Admin, "about order 2");
    let chat = CustomerChat::new(client(&backend, None));

    chat.bind(chat_binding(Some("s1"), None));
    assert!(wait_until(TIMEOUT, || backend.stream_receivers("s1") == 1).await);
    assert!(wait_until(TIMEOUT, || texts(&chat) == vec!["about order 1"]).await);

    chat.bind(chat_binding(Some("s2"), None));
    assert!(wait_until(TIMEOUT, || backend.stream_receivers("s1") == 0).await);
    assert!(wait_until(TIMEOUT, || backend.stream_receivers("s2") == 1).await);
    assert!(wait_until(TIMEOUT, || texts(&chat) == vec!["about order 2"]).await);

    // The released session can no longer write into the widget.
    backend.push_message("s1", SenderType::Admin, "late");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(texts(&chat), vec!["about order 2"]);
    assert_eq!(backend.stream_opens("s2"), 1);
}

#[tokio::test]
async fn faq_tab_holds_no_stream() {
    let backend = MockBackend::start().await;
    let chat = CustomerChat::new(client(&backend, None));
    chat.bind(chat_binding(Some("s1"), None));
    assert!(wait_until(TIMEOUT, || backend.stream_receivers("s1") == 1).await);

    chat.set_tab(ChatTab::Faq);
    assert!(wait_until(TIMEOUT, || backend.stream_receivers("s1") == 0).await);
    assert!(!chat.snapshot().streaming);
}

#[tokio::test]
async fn dropping_the_widget_closes_its_stream() {
    init_tracing();
    let backend = MockBackend::start().await;
    let chat = CustomerChat::new(client(&backend, None));
    chat.bind(chat_binding(Some("s1"), None));
    assert!(wait_until(TIMEOUT, || backend.stream_receivers("s1") == 1).await);

    drop(chat);
    assert!(wait_until(TIMEOUT, || backend.stream_receivers("s1") == 0).await);
}

#[tokio::test]
async fn signing_out_releases_the_stream() {
    init_tracing();
    let backend = MockBackend::start().await;
    backend.seed_message("s1", SenderType::Admin, "Your kit shipped.");
    let user = customer_session("mika");
    let api = client(&backend, Some(user.clone()));
    api.context().set_chat_session(Some(sid("s1")));
    let chat = CustomerChat::new(api.clone());
    chat.bind(chat_binding(Some("s1"), Some(&user.user_id)));
    assert!(wait_until(TIMEOUT, || backend.stream_receivers("s1") == 1).await);
    assert!(wait_until(TIMEOUT, || texts(&chat) == vec!["Your kit shipped."]).await);

    api.logout();
    assert!(wait_until(TIMEOUT, || backend.stream_receivers("s1") == 0).await);
    let view = chat.snapshot();
    assert_eq!(view.binding.user_id, None);
    assert_eq!(view.binding.session_id, None);
    assert!(view.log.is_empty());
    assert!(!view.streaming);
}

#[tokio::test]
async fn stored_session_change_rebinds_the_widget() {
    init_tracing();
    let backend = MockBackend::start().await;
    backend.seed_message("s2", SenderType::Admin, "Picked up where we left off.");
    let api = client(&backend, None);
    let chat = CustomerChat::new(api.clone());
    chat.set_tab(ChatTab::Chat);

    api.context().set_chat_session(Some(sid("s2")));
    assert!(wait_until(TIMEOUT, || backend.stream_receivers("s2") == 1).await);
    assert!(wait_until(TIMEOUT, || texts(&chat) == vec!["Picked up where we left off."]).await);
    assert_eq!(chat.binding().tab, ChatTab::Chat);
}

// ---------- Support desk ----------

fn desk_backend_seed(backend: &MockBackend) {
    backend.seed_session("s1", "mika");
    backend.seed_session("s2", "jo");
    backend.set_stats(ChatStats {
        active_sessions: 2,
        messages_today: 5,
        awaiting_reply: 1,
    });
}

#[tokio::test]
async fn desk_polls_sessions_and_stats() {
    init_tracing();
    let backend = MockBackend::start().await;
    desk_backend_seed(&backend);
    let desk = AdminChatDesk::new(client(
        &backend,
        Some(staff_session("rina", &[permissions::HANDLE_CHAT])),
    ));

    desk.start();
    assert!(wait_until(TIMEOUT, || desk.snapshot().board.len() == 2).await);
    assert_eq!(desk.snapshot().stats.map(|s| s.active_sessions), Some(2));

    // A new session shows up on a later poll.
    backend.seed_session("s3", "ana");
    assert!(wait_until(TIMEOUT, || desk.snapshot().board.len() == 3).await);
    desk.shutdown();
}

#[tokio::test]
async fn desk_requires_sign_in() {
    let backend = MockBackend::start().await;
    desk_backend_seed(&backend);
    let desk = AdminChatDesk::new(client(&backend, None));
    desk.refresh().await;
    let view = desk.snapshot();
    assert!(view.board.is_empty());
    assert_eq!(view.error_message.as_deref(), Some("Please sign in to continue."));
}

#[tokio::test]
async fn desk_follows_replies_and_closes() {
    init_tracing();
    let backend = MockBackend::start().await;
    desk_backend_seed(&backend);
    backend.seed_message("s1", SenderType::User, "Where is my order?");
    let desk = AdminChatDesk::new(client(&backend, Some(staff_session("root", &[]))));

    desk.refresh().await;
    desk.select(sid("s1"));
    assert!(wait_until(TIMEOUT, || desk.snapshot().log.len() == 1).await);
    assert!(wait_until(TIMEOUT, || backend.stream_receivers("s1") == 1).await);

    // Customer writes; the stream updates both the log and the board.
    backend.push_message("s1", SenderType::User, "Order o-77");
    assert!(wait_until(TIMEOUT, || desk.snapshot().log.len() == 2).await);
    assert_eq!(
        desk.snapshot().board.get(&sid("s1")).and_then(|s| s.last_message.clone()),
        Some("Order o-77".into())
    );

    // The reply comes back on the stream too, and is kept once.
    desk.reply("It ships tomorrow.").await.unwrap();
    assert!(wait_until(TIMEOUT, || desk.snapshot().log.len() == 3).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(desk.snapshot().log.len(), 3);
    let stored = backend.history("s1");
    assert_eq!(stored.last().map(|m| m.sender_type), Some(SenderType::Admin));

    desk.close_session(&sid("s1")).await.unwrap();
    let view = desk.snapshot();
    assert!(view.board.get(&sid("s1")).is_none());
    assert_eq!(view.selected, None);
    assert!(wait_until(TIMEOUT, || backend.stream_receivers("s1") == 0).await);
}

#[tokio::test]
async fn slow_snapshot_does_not_undo_newer_push() {
    init_tracing();
    let backend = MockBackend::start().await;
    desk_backend_seed(&backend);
    let desk = AdminChatDesk::new(client(&backend, Some(staff_session("root", &[]))));
    desk.refresh().await;
    desk.select(sid("s1"));
    assert!(wait_until(TIMEOUT, || backend.stream_receivers("s1") == 1).await);

    backend.set_sessions_delay(Some(Duration::from_millis(300)));
    tokio::join!(desk.refresh(), async {
        // The snapshot request is already out and holds the old session list.
        tokio::time::sleep(Duration::from_millis(100)).await;
        backend.push_message("s1", SenderType::User, "newest");
    });

    assert_eq!(
        desk.snapshot().board.get(&sid("s1")).and_then(|s| s.last_message.clone()),
        Some("newest".into())
    );
}

#[tokio::test]
async fn empty_reply_is_rejected_locally() {
    let backend = MockBackend::start().await;
    desk_backend_seed(&backend);
    let desk = AdminChatDesk::new(client(&backend, Some(staff_session("root", &[]))));
    desk.select(sid("s1"));
    assert!(desk.reply("  ").await.is_err());
    assert_eq!(backend.count_requests("POST /api/chat/reply"), 0);
}
