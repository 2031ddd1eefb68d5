// REST contract tests for the messaging endpoints, driven through the
// full router with in-memory stores.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header::AUTHORIZATION, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use roomline_server::api::ApiState;
use roomline_server::auth::jwt::AccessTokenService;
use roomline_server::build_router;
use roomline_server::fanout::FanoutDispatcher;
use roomline_server::registry::ConnectionRegistry;
use roomline_server::store::{MessageStore, UserDirectory};

const TEST_SECRET: &str = "roomline_test_secret_that_is_definitely_long_enough";

struct TestApp {
    app: Router,
    tokens: Arc<AccessTokenService>,
    state: ApiState,
}

impl TestApp {
    fn new() -> Self {
        let tokens = Arc::new(AccessTokenService::new(TEST_SECRET).unwrap());
        let registry = Arc::new(ConnectionRegistry::new());
        let state = ApiState {
            store: MessageStore::memory(),
            directory: UserDirectory::memory(),
            fanout: Arc::new(FanoutDispatcher::new(Arc::clone(&registry))),
            registry,
        };
        let app = build_router(Arc::clone(&tokens), state.clone(), None);
        Self { app, tokens, state }
    }

    async fn seed_user(&self, id: Uuid, name: &str) {
        self.state
            .directory
            .upsert(roomline_common::types::UserProfile {
                id,
                display_name: name.into(),
                avatar_url: None,
            })
            .await
            .unwrap();
    }

    async fn request(
        &self,
        method: Method,
        uri: &str,
        caller: Uuid,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let token = self.tokens.issue_token(caller).unwrap();
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {token}"));
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&value).unwrap())
            }
            None => Body::empty(),
        };
        let response =
            self.app.clone().oneshot(builder.body(body).unwrap()).await.expect("request");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("response body should be json")
        };
        (status, value)
    }

    async fn send_message(&self, sender: Uuid, receiver: Uuid, body: &str) -> Value {
        let (status, value) = self
            .request(
                Method::POST,
                "/v1/messages",
                sender,
                Some(json!({ "receiverId": receiver, "body": body })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "send should succeed: {value}");
        value
    }
}

#[tokio::test]
async fn create_message_persists_unread_and_history_includes_it_once() {
    let app = TestApp::new();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    app.seed_user(alice, "Alice").await;
    app.seed_user(bob, "Bob").await;

    let created = app.send_message(alice, bob, "is the flat still available?").await;
    assert_eq!(created["isRead"], false);
    assert_eq!(created["senderId"], alice.to_string());

    let (status, history) = app
        .request(Method::GET, &format!("/v1/messages?counterpartId={alice}"), bob, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["id"], created["id"]);
}

#[tokio::test]
async fn create_message_rejects_empty_body_and_self_sends() {
    let app = TestApp::new();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    app.seed_user(alice, "Alice").await;
    app.seed_user(bob, "Bob").await;

    let (status, error) = app
        .request(
            Method::POST,
            "/v1/messages",
            alice,
            Some(json!({ "receiverId": bob, "body": "   " })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"]["code"], "VALIDATION_FAILED");

    let (status, _) = app
        .request(
            Method::POST,
            "/v1/messages",
            alice,
            Some(json!({ "receiverId": alice, "body": "hi me" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_message_rejects_unknown_receiver() {
    let app = TestApp::new();
    let alice = Uuid::new_v4();
    app.seed_user(alice, "Alice").await;

    let (status, error) = app
        .request(
            Method::POST,
            "/v1/messages",
            alice,
            Some(json!({ "receiverId": Uuid::new_v4(), "body": "anyone there?" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() {
    let app = TestApp::new();
    let response = app
        .app
        .clone()
        .oneshot(Request::builder().uri("/v1/conversations").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn history_fetch_marks_thread_read() {
    let app = TestApp::new();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    app.seed_user(alice, "Alice").await;
    app.seed_user(bob, "Bob").await;
    app.send_message(alice, bob, "one").await;
    app.send_message(alice, bob, "two").await;

    let (_, history) = app
        .request(Method::GET, &format!("/v1/messages?counterpartId={alice}"), bob, None)
        .await;
    for message in history.as_array().unwrap() {
        assert_eq!(message["isRead"], true);
    }

    // The bulk endpoint now has nothing left to flip.
    let (status, body) = app
        .request(
            Method::POST,
            "/v1/messages/read-all",
            bob,
            Some(json!({ "senderId": alice })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updatedCount"], 0);
}

#[tokio::test]
async fn mark_all_read_reports_count_then_zero() {
    let app = TestApp::new();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    app.seed_user(alice, "Alice").await;
    app.seed_user(bob, "Bob").await;
    app.send_message(alice, bob, "one").await;
    app.send_message(alice, bob, "two").await;

    let (status, body) = app
        .request(
            Method::POST,
            "/v1/messages/read-all",
            bob,
            Some(json!({ "senderId": alice })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updatedCount"], 2);

    let (_, body) = app
        .request(
            Method::POST,
            "/v1/messages/read-all",
            bob,
            Some(json!({ "senderId": alice })),
        )
        .await;
    assert_eq!(body["updatedCount"], 0);
}

#[tokio::test]
async fn mark_one_read_enforces_receiver_and_idempotence() {
    let app = TestApp::new();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    app.seed_user(alice, "Alice").await;
    app.seed_user(bob, "Bob").await;
    let created = app.send_message(alice, bob, "hello").await;
    let message_id = created["id"].as_str().unwrap();

    // The sender may not mark their own outbound message read.
    let (status, error) =
        app.request(Method::POST, &format!("/v1/messages/{message_id}/read"), alice, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error["error"]["code"], "READ_NOT_ALLOWED");

    let (status, body) =
        app.request(Method::POST, &format!("/v1/messages/{message_id}/read"), bob, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], true);

    let (status, error) =
        app.request(Method::POST, &format!("/v1/messages/{message_id}/read"), bob, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"]["code"], "ALREADY_READ");

    let (status, _) = app
        .request(Method::POST, &format!("/v1/messages/{}/read", Uuid::new_v4()), bob, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn offline_receiver_sees_unread_summary_after_connecting() {
    let app = TestApp::new();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    app.seed_user(alice, "Alice").await;
    app.seed_user(bob, "Bob").await;

    // Bob is offline; the send still succeeds.
    let created = app.send_message(alice, bob, "hello").await;
    assert_eq!(created["isRead"], false);

    // Bob comes back and fetches his chat list.
    let (status, summaries) = app.request(Method::GET, "/v1/conversations", bob, None).await;
    assert_eq!(status, StatusCode::OK);
    let summaries = summaries.as_array().unwrap();
    assert_eq!(summaries.len(), 1);
    let summary = &summaries[0];
    assert_eq!(summary["counterpart"]["displayName"], "Alice");
    assert_eq!(summary["unreadCount"], 1);
    assert_eq!(summary["lastMessage"]["body"], "hello");
    assert_eq!(summary["online"], false);
}

#[tokio::test]
async fn conversations_reflect_live_presence() {
    let app = TestApp::new();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    app.seed_user(alice, "Alice").await;
    app.seed_user(bob, "Bob").await;
    app.send_message(alice, bob, "hello").await;

    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let conn = Uuid::new_v4();
    app.state.registry.register(alice, conn, tx).await;

    let (_, summaries) = app.request(Method::GET, "/v1/conversations", bob, None).await;
    assert_eq!(summaries[0]["online"], true);

    app.state.registry.unregister(alice, conn).await;
    let (_, summaries) = app.request(Method::GET, "/v1/conversations", bob, None).await;
    assert_eq!(summaries[0]["online"], false);
}
