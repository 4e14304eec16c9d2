use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use kinship_crypto::keys::generate_token_key;
use kinship_crypto::token::{TokenFormat, new_maker};
use kinship_db::Database;

use crate::router;
use crate::state::AppStateInner;

fn test_app(format: TokenFormat) -> (TempDir, Router) {
    let tmp = TempDir::new().unwrap();
    let db = Database::open(&tmp.path().join("kinship.db")).unwrap();
    let state = Arc::new(AppStateInner {
        db,
        tokens: new_maker(format, &generate_token_key()).unwrap(),
        access_token_ttl: chrono::Duration::minutes(15),
        // Argon2 is slow in debug builds.
        request_timeout: Duration::from_secs(60),
    });
    (tmp, router(state))
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

async fn register(app: &Router, username: &str) -> i64 {
    let (status, body) = send(
        app,
        Method::POST,
        "/user",
        None,
        Some(json!({
            "username": username,
            "password": "P@ssw0rd1",
            "check_password": "P@ssw0rd1",
            "nickname": format!("{}-nick", username),
            "email": format!("{}@example.com", username),
            "gender": 0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_i64().unwrap()
}

async fn login(app: &Router, username: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/user/login",
        None,
        Some(json!({ "username": username, "password": "P@ssw0rd1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn register_login_befriend() {
    for format in [TokenFormat::Sealed, TokenFormat::Jwt] {
        let (_tmp, app) = test_app(format);

        let alice = register(&app, "alice").await;
        let bob = register(&app, "bob").await;
        let alice_token = login(&app, "alice").await;
        let bob_token = login(&app, "bob").await;

        let (status, profile) = send(&app, Method::GET, "/user", Some(&alice_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["username"], "alice");
        assert!(profile.get("password").is_none());
        assert!(profile.get("salt").is_none());

        let (status, edge) = send(
            &app,
            Method::POST,
            "/friends/requests",
            Some(&bob_token),
            Some(json!({ "friend_id": alice, "message": "hey" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{edge}");
        assert_eq!(edge["status"], "pending");

        let (_, incoming) =
            send(&app, Method::GET, "/friends/requests/incoming", Some(&alice_token), None).await;
        assert_eq!(incoming["edges"].as_array().unwrap().len(), 1);
        assert_eq!(incoming["edges"][0]["user_id"], bob);

        let (_, outgoing) =
            send(&app, Method::GET, "/friends/requests/outgoing", Some(&bob_token), None).await;
        assert_eq!(outgoing["edges"].as_array().unwrap().len(), 1);

        let (status, edge) = send(
            &app,
            Method::POST,
            &format!("/friends/requests/{}/accept", bob),
            Some(&alice_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{edge}");
        assert_eq!(edge["status"], "accepted");
        assert_eq!(edge["user_id"], alice);

        for token in [&alice_token, &bob_token] {
            let (status, friends) = send(&app, Method::GET, "/friends", Some(token), None).await;
            assert_eq!(status, StatusCode::OK);
            let edges = friends["edges"].as_array().unwrap();
            assert_eq!(edges.len(), 1);
            assert_eq!(edges[0]["status"], "accepted");
        }
    }
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let (_tmp, app) = test_app(TokenFormat::Sealed);
    register(&app, "alice").await;

    let (s1, b1) = send(
        &app,
        Method::POST,
        "/user/login",
        None,
        Some(json!({ "username": "alice", "password": "wrong-pass1" })),
    )
    .await;
    let (s2, b2) = send(
        &app,
        Method::POST,
        "/user/login",
        None,
        Some(json!({ "username": "nobody", "password": "wrong-pass1" })),
    )
    .await;

    assert_eq!(s1, StatusCode::UNAUTHORIZED);
    assert_eq!((s1, &b1), (s2, &b2));
    assert_eq!(b1["kind"], "unauthorized");
}

#[tokio::test]
async fn protected_routes_require_bearer_token() {
    let (_tmp, app) = test_app(TokenFormat::Sealed);
    register(&app, "alice").await;
    let token = login(&app, "alice").await;

    let (status, body) = send(&app, Method::GET, "/user", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unauthorized");
    assert_eq!(body["message"], "authorization header is not provided");

    let request = Request::builder()
        .uri("/friends")
        .header(header::AUTHORIZATION, format!("Token {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut tampered = token.into_bytes();
    let last = tampered.len() - 1;
    tampered[last - 5] ^= 0x01;
    let tampered = String::from_utf8(tampered).unwrap();
    let (status, body) = send(&app, Method::GET, "/user", Some(&tampered), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "token is invalid");
}

#[tokio::test]
async fn friend_request_errors() {
    let (_tmp, app) = test_app(TokenFormat::Sealed);
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    let alice_token = login(&app, "alice").await;
    let bob_token = login(&app, "bob").await;

    // Accept without a request
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/friends/requests/{}/accept", bob),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");

    let request = json!({ "friend_id": alice });
    let (status, _) =
        send(&app, Method::POST, "/friends/requests", Some(&bob_token), Some(request.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) =
        send(&app, Method::POST, "/friends/requests", Some(&bob_token), Some(request)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");

    let (status, body) = send(
        &app,
        Method::POST,
        "/friends/requests",
        Some(&bob_token),
        Some(json!({ "friend_id": bob })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, _) = send(
        &app,
        Method::POST,
        "/friends/requests",
        Some(&bob_token),
        Some(json!({ "friend_id": 9999 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Reject, then the request is gone
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/friends/requests/{}/reject", bob),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/friends/requests/{}/accept", bob),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn registration_rules() {
    let (_tmp, app) = test_app(TokenFormat::Sealed);
    register(&app, "alice").await;

    let base = json!({
        "username": "alice",
        "password": "P@ssw0rd1",
        "check_password": "P@ssw0rd1",
        "nickname": "other",
        "email": "other@example.com"
    });
    let (status, body) = send(&app, Method::POST, "/user", None, Some(base.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "username already taken");

    let mut bad_gender = base.clone();
    bad_gender["username"] = json!("carol");
    bad_gender["gender"] = json!(9);
    let (status, body) = send(&app, Method::POST, "/user", None, Some(bad_gender)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");

    let mut mismatch = base;
    mismatch["username"] = json!("dave");
    mismatch["check_password"] = json!("P@ssw0rd2");
    let (status, _) = send(&app, Method::POST, "/user", None, Some(mismatch)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_profile() {
    let (_tmp, app) = test_app(TokenFormat::Sealed);
    register(&app, "alice").await;
    register(&app, "bob").await;
    let token = login(&app, "alice").await;

    let (status, body) = send(
        &app,
        Method::PUT,
        "/user",
        Some(&token),
        Some(json!({ "nickname": "bob-nick" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "nickname already taken");

    let (status, body) = send(
        &app,
        Method::PUT,
        "/user",
        Some(&token),
        Some(json!({ "nickname": "Ally", "gender": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["nickname"], "Ally");
    assert_eq!(body["gender"], 2);

    // Gender only; nickname is kept.
    let (status, body) =
        send(&app, Method::PUT, "/user", Some(&token), Some(json!({ "gender": 1 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nickname"], "Ally");
    assert_eq!(body["gender"], 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_profile_updates_keep_nickname() {
    let (_tmp, app) = test_app(TokenFormat::Sealed);
    register(&app, "alice").await;
    let token = login(&app, "alice").await;

    for round in 0..10 {
        let nickname = format!("nick{}", round);

        let mut tasks = Vec::new();
        {
            let (app, token, nickname) = (app.clone(), token.clone(), nickname.clone());
            tasks.push(tokio::spawn(async move {
                send(&app, Method::PUT, "/user", Some(&token), Some(json!({ "nickname": nickname }))).await
            }));
        }
        for g in 0..6 {
            let (app, token) = (app.clone(), token.clone());
            tasks.push(tokio::spawn(async move {
                send(&app, Method::PUT, "/user", Some(&token), Some(json!({ "gender": g % 3 }))).await
            }));
        }
        for task in tasks {
            let (status, body) = task.await.unwrap();
            assert_eq!(status, StatusCode::OK, "{body}");
        }

        let (_, profile) = send(&app, Method::GET, "/user", Some(&token), None).await;
        assert_eq!(profile["nickname"], nickname.as_str(), "round {}", round);
    }
}
