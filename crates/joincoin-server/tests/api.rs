use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use joincoin_core::membership::{MembershipStatus, MockMembershipProvider};
use joincoin_core::{EconomyConfig, SystemClock};
use joincoin_db::Database;
use joincoin_server::state::AppStateInner;

const ADMIN_TOKEN: &str = "test-admin-token";

fn app() -> Router {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let mut provider = MockMembershipProvider::new();
    provider
        .expect_membership_status()
        .returning(|channel, _| {
            if channel == "@joined" {
                Ok(MembershipStatus::Member)
            } else {
                Ok(MembershipStatus::None)
            }
        });
    let config = EconomyConfig {
        initial_coins: 10,
        ..EconomyConfig::default()
    };
    let state = Arc::new(AppStateInner::new(
        db,
        Arc::new(SystemClock),
        Arc::new(provider),
        config,
        ADMIN_TOKEN.to_string(),
    ));
    joincoin_server::router(state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>, admin: bool) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if admin {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_TOKEN));
    }
    let req = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn register(app: &Router, user_id: i64) {
    let (status, _) = send(app, "POST", "/users", Some(json!({ "user_id": user_id })), false).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn health_is_public() {
    let app = app();
    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn order_join_flow() {
    let app = app();
    register(&app, 1).await;
    register(&app, 2).await;

    let (status, placed) = send(
        &app,
        "POST",
        "/orders",
        Some(json!({ "owner_id": 1, "channel_username": "t.me/Shop", "required": 2 })),
        false,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(placed["cost"], 4);
    let order_id = placed["order"]["id"].as_i64().unwrap();

    let (status, listed) = send(&app, "GET", "/collectors/2/orders?policy=near_completion", None, false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let join = json!({ "user_id": 2, "channel_username": "@shop", "order_id": order_id });
    let (status, body) = send(&app, "POST", "/joins", Some(join.clone()), false).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["recorded"], true);

    let (status, body) = send(&app, "POST", "/joins", Some(join), false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recorded"], false);

    let (_, user) = send(&app, "GET", "/users/2", None, false).await;
    assert_eq!(user["coin_balance"], 11);
}

#[tokio::test]
async fn ledger_errors_become_status_codes() {
    let app = app();
    register(&app, 1).await;

    let (status, body) = send(
        &app,
        "POST",
        "/orders",
        Some(json!({ "owner_id": 1, "channel_username": "@big", "required": 100 })),
        false,
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], 402);

    let (status, _) = send(&app, "GET", "/users/404", None, false).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "POST",
        "/referrals",
        Some(json!({ "referrer_id": 1, "referred_user_id": 1 })),
        false,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "PUT", "/admin/welcome-message", Some(json!({ "message": " " })), true).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("welcome message"));
}

#[tokio::test]
async fn admin_routes_require_the_token() {
    let app = app();
    let (status, body) = send(&app, "GET", "/admin/coin-orders/pending", None, false).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 401);

    let (status, _) = send(&app, "GET", "/admin/coin-orders/pending", None, true).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn coin_order_is_resolved_once() {
    let app = app();
    register(&app, 5).await;

    let (status, created) = send(
        &app,
        "POST",
        "/coin-orders",
        Some(json!({ "user_id": 5, "quantity": 10, "price": 5.0, "receipt_file_id": "photo-1" })),
        false,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = created["order_id"].as_i64().unwrap();

    let uri = format!("/admin/coin-orders/{}/resolve", order_id);
    let decision = json!({ "resolution": "approved", "admin_id": 900 });
    let (status, order) = send(&app, "POST", &uri, Some(decision.clone()), true).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "approved");

    let (status, _) = send(&app, "POST", &uri, Some(decision), true).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, user) = send(&app, "GET", "/users/5", None, false).await;
    assert_eq!(user["coin_balance"], 20);
}

#[tokio::test]
async fn gate_reports_unmet_channels() {
    let app = app();
    register(&app, 3).await;

    for channel in ["@joined", "@missing"] {
        let (status, _) = send(
            &app,
            "POST",
            "/admin/forced-channels",
            Some(json!({ "channel_username": channel, "limit": { "type": "members", "quota": 5 } })),
            true,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, gate) = send(&app, "GET", "/users/3/gate", None, false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(gate["status"], "blocked");
    assert_eq!(gate["unmet"], json!(["@missing"]));

    let (_, confirmation) = send(&app, "POST", "/users/3/gate/confirm", None, false).await;
    assert_eq!(confirmation["newly_joined"], json!(["@joined"]));

    let (status, _) = send(&app, "DELETE", "/admin/forced-channels/missing", None, true).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, gate) = send(&app, "GET", "/users/3/gate", None, false).await;
    assert_eq!(gate["status"], "pass");
}
