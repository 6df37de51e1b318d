use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use felicity_api::directory::{Directory, StaticDirectory};
use felicity_api::{AppState, AppStateInner, router};
use felicity_db::Database;
use felicity_gateway::dispatcher::Dispatcher;
use felicity_types::api::Claims;
use felicity_types::events::GatewayEvent;
use felicity_types::models::{EventInfo, Role};
use felicity_types::thread::MAX_DEPTH;

const SECRET: &str = "test-secret";

struct User {
    id: Uuid,
    token: String,
}

impl User {
    fn new(name: &str, role: Role) -> Self {
        let id = Uuid::new_v4();
        let claims = Claims {
            sub: id,
            name: name.to_string(),
            role,
            exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();
        Self { id, token }
    }
}

struct Harness {
    app: Router,
    state: AppState,
    event_id: Uuid,
    other_event_id: Uuid,
    organizer: User,
    alice: User,
    bob: User,
    outsider: User,
    admin: User,
}

impl Harness {
    fn new() -> Self {
        let organizer = User::new("Robotics Club", Role::Organizer);
        let alice = User::new("alice", Role::Participant);
        let bob = User::new("bob", Role::Participant);
        let outsider = User::new("mallory", Role::Participant);
        let admin = User::new("admin", Role::Admin);

        let event_id = Uuid::new_v4();
        let other_event_id = Uuid::new_v4();
        let roster = StaticDirectory::new()
            .with_event(EventInfo {
                id: event_id,
                name: "Robo Wars".into(),
                organizer_id: organizer.id,
            })
            .with_event(EventInfo {
                id: other_event_id,
                name: "Quiz Night".into(),
                organizer_id: Uuid::new_v4(),
            })
            .with_registration(event_id, alice.id)
            .with_registration(event_id, bob.id)
            .with_registration(other_event_id, alice.id);

        let state = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: SECRET.into(),
            dispatcher: Dispatcher::new(),
            directory: Directory::Static(roster),
        });

        Self {
            app: router(state.clone()),
            state,
            event_id,
            other_event_id,
            organizer,
            alice,
            bob,
            outsider,
            admin,
        }
    }

    async fn call(&self, method: Method, uri: &str, user: Option<&User>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", user.token));
        }
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn messages_uri(&self) -> String {
        format!("/api/forum/{}/messages", self.event_id)
    }

    async fn post(&self, user: &User, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, &self.messages_uri(), Some(user), Some(body)).await
    }

    async fn post_ok(&self, user: &User, content: &str, parent: Option<&str>) -> String {
        let (status, body) = self
            .post(user, json!({ "content": content, "parent_id": parent }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn list(&self, user: &User) -> Vec<Value> {
        let (status, body) = self.call(Method::GET, &self.messages_uri(), Some(user), None).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body.as_array().unwrap().clone()
    }

    async fn vote(&self, user: &User, message_id: &str, value: i64) -> (StatusCode, Value) {
        let uri = format!("{}/{}/vote", self.messages_uri(), message_id);
        self.call(Method::POST, &uri, Some(user), Some(json!({ "value": value }))).await
    }
}

#[tokio::test]
async fn health_is_public() {
    let h = Harness::new();
    let resp = h
        .app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn rejects_missing_and_forged_tokens() {
    let h = Harness::new();
    let (status, _) = h.call(Method::GET, &h.messages_uri(), None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let forged = User {
        id: h.alice.id,
        token: "not.a.jwt".into(),
    };
    let (status, body) = h.call(Method::GET, &h.messages_uri(), Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn access_check_reflects_roles() {
    let h = Harness::new();
    let uri = format!("/api/forum/{}/access", h.event_id);

    let (_, organizer) = h.call(Method::GET, &uri, Some(&h.organizer), None).await;
    assert_eq!(organizer, json!({ "can_view": true, "can_post": true, "can_moderate": true }));

    let (_, alice) = h.call(Method::GET, &uri, Some(&h.alice), None).await;
    assert_eq!(alice, json!({ "can_view": true, "can_post": true, "can_moderate": false }));

    let (status, outsider) = h.call(Method::GET, &uri, Some(&h.outsider), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outsider["can_view"], false);

    let (_, admin) = h.call(Method::GET, &uri, Some(&h.admin), None).await;
    assert_eq!(admin["can_moderate"], true);

    let unknown = format!("/api/forum/{}/access", Uuid::new_v4());
    let (status, _) = h.call(Method::GET, &unknown, Some(&h.alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unregistered_users_cannot_read_or_post() {
    let h = Harness::new();
    let (status, _) = h.call(Method::GET, &h.messages_uri(), Some(&h.outsider), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = h.post(&h.outsider, json!({ "content": "let me in" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Access is decided before the body is looked at
    let (status, _) = h.post(&h.outsider, json!({ "content": "   " })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn replies_are_returned_as_a_tree() {
    let h = Harness::new();
    let root = h.post_ok(&h.alice, "When does registration close?", None).await;
    let reply = h.post_ok(&h.organizer, "Friday midnight", Some(&root)).await;
    h.post_ok(&h.alice, "Thanks!", Some(&reply)).await;
    h.post_ok(&h.bob, "Is there a team size limit?", None).await;

    let tree = h.list(&h.bob).await;
    assert_eq!(tree.len(), 2);

    let thread = tree.iter().find(|n| n["id"] == root.as_str()).unwrap();
    assert_eq!(thread["reply_count"], 2);
    assert_eq!(thread["author_name"], "alice");
    assert_eq!(thread["children"][0]["id"], reply.as_str());
    assert_eq!(thread["children"][0]["author_role"], "organizer");
    assert_eq!(thread["children"][0]["children"][0]["depth"], 2);
}

#[tokio::test]
async fn validates_content_and_parents() {
    let h = Harness::new();

    let (status, _) = h.post(&h.alice, json!({ "content": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h.post(&h.alice, json!({ "content": "x".repeat(2001) })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = h.post(&h.alice, json!({ "content": "  padded  " })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["content"], "padded");

    // Parent from a different event
    let foreign_uri = format!("/api/forum/{}/messages", h.other_event_id);
    let (status, foreign) = h
        .call(Method::POST, &foreign_uri, Some(&h.alice), Some(json!({ "content": "quiz?" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = h
        .post(&h.alice, json!({ "content": "cross-post", "parent_id": foreign["id"] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .post(&h.alice, json!({ "content": "orphan", "parent_id": Uuid::new_v4() }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn only_moderators_post_announcements() {
    let h = Harness::new();

    let (status, _) = h
        .post(&h.alice, json!({ "content": "Free pizza", "is_announcement": true }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = h
        .post(&h.organizer, json!({ "content": "Venue moved to Hall B", "is_announcement": true }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["is_announcement"], true);

    let parent = body["id"].clone();
    let (status, _) = h
        .post(
            &h.organizer,
            json!({ "content": "Also parking", "is_announcement": true, "parent_id": parent }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Announcements sort above newer ordinary posts
    h.post_ok(&h.bob, "newer chatter", None).await;
    let tree = h.list(&h.alice).await;
    assert_eq!(tree[0]["is_announcement"], true);
}

#[tokio::test]
async fn delete_is_soft_and_restricted() {
    let h = Harness::new();
    let root = h.post_ok(&h.alice, "my question", None).await;
    let reply = h.post_ok(&h.bob, "an answer", Some(&root)).await;
    let uri = format!("{}/{}", h.messages_uri(), root);

    let (status, _) = h.call(Method::DELETE, &uri, Some(&h.bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = h.call(Method::DELETE, &uri, Some(&h.alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = h.call(Method::DELETE, &uri, Some(&h.alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let tree = h.list(&h.bob).await;
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0]["is_deleted"], true);
    assert_eq!(tree[0]["content"], Value::Null);
    assert_eq!(tree[0]["children"][0]["id"], reply.as_str());

    let (status, _) = h.post(&h.bob, json!({ "content": "late", "parent_id": root })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Moderators may delete anyone's message
    let reply_uri = format!("{}/{}", h.messages_uri(), reply);
    let (status, _) = h.call(Method::DELETE, &reply_uri, Some(&h.organizer), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn messages_must_belong_to_the_path_event() {
    let h = Harness::new();
    let root = h.post_ok(&h.alice, "hello", None).await;
    let wrong = format!("/api/forum/{}/messages/{}/vote", h.other_event_id, root);
    let (status, _) = h
        .call(Method::POST, &wrong, Some(&h.alice), Some(json!({ "value": 1 })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pin_toggles_for_moderators_only() {
    let h = Harness::new();
    let old = h.post_ok(&h.alice, "important", None).await;
    h.post_ok(&h.bob, "newer", None).await;
    let uri = format!("{}/{}/pin", h.messages_uri(), old);

    let (status, _) = h.call(Method::POST, &uri, Some(&h.alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = h.call(Method::POST, &uri, Some(&h.organizer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pinned"], true);

    let tree = h.list(&h.alice).await;
    assert_eq!(tree[0]["id"], old.as_str());
    assert_eq!(tree[0]["is_pinned"], true);

    let (_, body) = h.call(Method::POST, &uri, Some(&h.organizer), None).await;
    assert_eq!(body["pinned"], false);
}

#[tokio::test]
async fn votes_toggle_and_report_the_callers_vote() {
    let h = Harness::new();
    let root = h.post_ok(&h.alice, "vote on me", None).await;

    let (status, body) = h.vote(&h.bob, &root, 1).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["score"], 1);
    assert_eq!(body["my_vote"], 1);

    let (_, body) = h.vote(&h.alice, &root, -1).await;
    assert_eq!(body["score"], 0);

    let tree = h.list(&h.bob).await;
    assert_eq!(tree[0]["my_vote"], 1);
    assert_eq!(tree[0]["score"], 0);

    // Same value again clears it
    let (_, body) = h.vote(&h.bob, &root, 1).await;
    assert_eq!(body["score"], -1);
    assert_eq!(body["my_vote"], 0);

    let (status, _) = h.vote(&h.bob, &root, 3).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = h.vote(&h.outsider, &root, 1).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    h.call(Method::DELETE, &format!("{}/{}", h.messages_uri(), root), Some(&h.alice), None)
        .await;
    let (status, _) = h.vote(&h.bob, &root, 1).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn forum_actions_are_broadcast_to_the_event_room() {
    let h = Harness::new();
    let mut rx = h.state.dispatcher.subscribe();

    let root = h.post_ok(&h.alice, "broadcast me", None).await;
    h.vote(&h.bob, &root, 1).await;
    h.call(Method::POST, &format!("{}/{}/pin", h.messages_uri(), root), Some(&h.organizer), None)
        .await;
    h.call(Method::DELETE, &format!("{}/{}", h.messages_uri(), root), Some(&h.alice), None)
        .await;

    let mut kinds = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        assert_eq!(msg.event_id, h.event_id);
        let event: GatewayEvent = serde_json::from_str(&msg.json).unwrap();
        kinds.push(serde_json::to_value(&event).unwrap()["type"].as_str().unwrap().to_string());
    }
    assert_eq!(kinds, vec!["new_message", "message_voted", "message_pinned", "message_deleted"]);
}

#[tokio::test]
async fn replies_notify_the_parent_author() {
    let h = Harness::new();
    let (_, mut alice_rx) = h.state.dispatcher.register_connection(h.alice.id).await;

    let root = h.post_ok(&h.alice, "anyone have a spare soldering iron?", None).await;
    h.post_ok(&h.alice, "bump", Some(&root)).await;
    h.post_ok(&h.bob, "I do", Some(&root)).await;

    let pushed = alice_rx.try_recv().unwrap();
    assert!(matches!(pushed, GatewayEvent::Notification { ref notification } if notification.kind == "forum_reply"));
    assert!(alice_rx.try_recv().is_err());

    let (status, list) = h.call(Method::GET, "/api/notifications", Some(&h.alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["unread"], 1);
    let notification = &list["notifications"][0];
    assert_eq!(notification["title"], "New reply in Robo Wars");
    assert_eq!(notification["event_id"], h.event_id.to_string());

    let read_uri = format!("/api/notifications/{}/read", notification["id"].as_str().unwrap());
    let (status, _) = h.call(Method::PATCH, &read_uri, Some(&h.bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = h.call(Method::PATCH, &read_uri, Some(&h.alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, list) = h.call(Method::GET, "/api/notifications", Some(&h.alice), None).await;
    assert_eq!(list["unread"], 0);

    let (_, bob_list) = h.call(Method::GET, "/api/notifications", Some(&h.bob), None).await;
    assert_eq!(bob_list["notifications"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn mark_all_read_counts_updates() {
    let h = Harness::new();
    let first = h.post_ok(&h.alice, "one", None).await;
    let second = h.post_ok(&h.alice, "two", None).await;
    h.post_ok(&h.bob, "re one", Some(&first)).await;
    h.post_ok(&h.bob, "re two", Some(&second)).await;

    let (status, body) = h
        .call(Method::PATCH, "/api/notifications/read-all", Some(&h.alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 2);

    let (_, body) = h
        .call(Method::PATCH, "/api/notifications/read-all", Some(&h.alice), None)
        .await;
    assert_eq!(body["updated"], 0);
}

#[tokio::test]
async fn reply_chains_stop_at_max_depth() {
    let h = Harness::new();
    let mut parent = h.post_ok(&h.alice, "level 0", None).await;
    for depth in 1..=MAX_DEPTH {
        let author = if depth % 2 == 0 { &h.alice } else { &h.bob };
        parent = h.post_ok(author, &format!("level {depth}"), Some(&parent)).await;
    }

    let (status, body) = h
        .post(&h.alice, json!({ "content": "one too deep", "parent_id": parent }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let tree = h.list(&h.bob).await;
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0]["reply_count"], MAX_DEPTH);

    let mut node = &tree[0];
    while let Some(child) = node["children"].get(0) {
        node = child;
    }
    assert_eq!(node["depth"], MAX_DEPTH);
    assert_eq!(node["id"], parent.as_str());
}

#[tokio::test]
async fn announcements_notify_forum_members() {
    let h = Harness::new();
    h.post_ok(&h.alice, "what time is check-in?", None).await;
    h.post_ok(&h.bob, "same question", None).await;
    h.post_ok(&h.organizer, "welcome everyone", None).await;
    let (_, mut bob_rx) = h.state.dispatcher.register_connection(h.bob.id).await;

    let (status, _) = h
        .post(&h.organizer, json!({ "content": "Check-in opens at 9", "is_announcement": true }))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let pushed = bob_rx.try_recv().unwrap();
    assert!(
        matches!(pushed, GatewayEvent::Notification { ref notification } if notification.kind == "forum_announcement")
    );

    for user in [&h.alice, &h.bob] {
        let (_, list) = h.call(Method::GET, "/api/notifications", Some(user), None).await;
        assert_eq!(list["unread"], 1);
        assert_eq!(list["notifications"][0]["title"], "Announcement in Robo Wars");
    }
    let (_, list) = h.call(Method::GET, "/api/notifications", Some(&h.organizer), None).await;
    assert_eq!(list["unread"], 0);
}
