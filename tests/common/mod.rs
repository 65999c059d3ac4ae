//! Test utilities and fixtures for toolvault integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, StatusCode},
    routing::post,
};
use rusqlite::Connection;
use serde_json::Value;
use tempfile::TempDir;

pub use toolvault::config::NotifyConfig;
pub use toolvault::crypto;
pub use toolvault::db::{AppState, create_pool, init_db, queries};
pub use toolvault::handlers;
pub use toolvault::licensing::{self, KeySource, RandomKeySource, ValidationOutcome, ValidationPolicy};
pub use toolvault::models::*;
pub use toolvault::notifications::NotificationService;

pub const TEST_ADMIN_KEY: &str = "test-admin-key";
pub const TEST_CRON_SECRET: &str = "test-cron-secret";
pub const TEST_WEBHOOK_SECRET: &str = "test-webhook-secret";

pub const ONE_DAY: i64 = 86_400;

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Get a future timestamp (days from now)
pub fn future_timestamp(days: i64) -> i64 {
    now() + days * ONE_DAY
}

/// Get a past timestamp (days ago)
pub fn past_timestamp(days: i64) -> i64 {
    now() - days * ONE_DAY
}

/// App state backed by a temp-file database. File-backed so every pooled
/// connection sees the same data, which the concurrency tests rely on.
pub struct TestApp {
    pub state: AppState,
    _dir: TempDir,
}

impl std::ops::Deref for TestApp {
    type Target = AppState;

    fn deref(&self) -> &AppState {
        &self.state
    }
}

pub fn create_test_app_state() -> TestApp {
    create_test_app_state_with_policy(ValidationPolicy::default())
}

pub fn create_test_app_state_with_policy(policy: ValidationPolicy) -> TestApp {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("toolvault-test.db");
    let pool = create_pool(path.to_str().expect("utf-8 temp path")).expect("Failed to create pool");
    {
        let conn = pool.get().unwrap();
        init_db(&conn).expect("Failed to initialize schema");
    }

    TestApp {
        state: AppState {
            db: pool,
            base_url: "http://localhost:3000".to_string(),
            cron_secret: Some(TEST_CRON_SECRET.to_string()),
            admin_api_key: Some(TEST_ADMIN_KEY.to_string()),
            payment_webhook_secret: Some(TEST_WEBHOOK_SECRET.to_string()),
            license_key_prefix: "GT".to_string(),
            validation_policy: policy,
            notifier: Arc::new(NotificationService::disabled()),
        },
        _dir: dir,
    }
}

/// Full router, as served by main (minus the trace layer)
pub fn app(state: &AppState) -> Router {
    handlers::router(state.clone())
}

/// Local HTTP endpoint that accepts notification webhooks and keeps every
/// JSON body it receives. Returns the hook URL.
pub async fn spawn_webhook_sink() -> (String, Arc<Mutex<Vec<Value>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let router = Router::new().route(
        "/hook",
        post(move |axum::Json(body): axum::Json<Value>| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(body);
                StatusCode::NO_CONTENT
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    (format!("http://{}/hook", addr), received)
}

/// Route outbound notices to `webhook_url`
pub fn use_webhook_notifier(test: &mut TestApp, webhook_url: &str) {
    let config = NotifyConfig {
        webhook_url: Some(webhook_url.to_string()),
        ..Default::default()
    };
    test.state.notifier = Arc::new(NotificationService::new(&config, "http://localhost:3000"));
}

// ============ Factories ============

pub fn create_test_user(conn: &Connection, email: &str) -> User {
    queries::create_user(
        conn,
        &CreateUser {
            email: email.to_string(),
            name: format!("Player {}", email.split('@').next().unwrap_or("x")),
        },
    )
    .expect("Failed to create test user")
}

pub fn create_test_product(
    conn: &Connection,
    slug: &str,
    duration_days: Option<i32>,
    requires_hardware_binding: bool,
) -> Product {
    queries::create_product(
        conn,
        &CreateProduct {
            name: format!("Tool {}", slug),
            slug: slug.to_string(),
            description: None,
            price_cents: 1500,
            currency: "usd".to_string(),
            duration_days,
            requires_hardware_binding,
            download_url: Some(format!("https://cdn.example.com/{}.zip", slug)),
        },
    )
    .expect("Failed to create test product")
}

/// Pending order with one line per `(product, quantity)`
pub fn create_test_order(
    conn: &mut Connection,
    user_id: &str,
    lines: &[(&Product, i32)],
) -> OrderWithItems {
    let items: Vec<NewOrderItem> = lines
        .iter()
        .map(|(product, quantity)| NewOrderItem {
            product_id: product.id.clone(),
            quantity: *quantity,
            unit_price_cents: product.price_cents,
        })
        .collect();
    queries::create_order(conn, user_id, "usd", &items).expect("Failed to create test order")
}

/// License inserted directly, bypassing orders (admin-grant shape)
pub fn create_test_license(
    conn: &Connection,
    user: &User,
    product: &Product,
    expires_at: Option<i64>,
) -> License {
    let input = CreateLicense {
        license_key: crypto::generate_license_key("GT"),
        user_id: user.id.clone(),
        product_id: product.id.clone(),
        order_id: None,
        order_item_id: None,
        expires_at,
        requires_hardware_binding: product.requires_hardware_binding,
    };
    queries::try_insert_license(conn, &input, now())
        .expect("Failed to insert test license")
        .expect("Test license key collided")
}

/// Mark `order_id` paid and issue its licenses in one transaction, like the callback does.
pub fn pay_and_issue(conn: &mut Connection, order_id: &str) -> licensing::Issuance {
    let tx = conn.transaction().unwrap();
    assert!(queries::try_mark_order_paid(&tx, order_id, "txn-test", now()).unwrap());
    let issuance =
        licensing::issue_licenses_for_order(&tx, order_id, &mut RandomKeySource::new("GT"), now())
            .expect("Issuance failed");
    tx.commit().unwrap();
    issuance
}

/// Key source that replays a fixed list, then falls back to random keys.
pub struct FixedKeySource {
    keys: VecDeque<String>,
}

impl FixedKeySource {
    pub fn new(keys: &[&str]) -> Self {
        Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl KeySource for FixedKeySource {
    fn next_key(&mut self) -> String {
        self.keys
            .pop_front()
            .unwrap_or_else(|| crypto::generate_license_key("GT"))
    }
}

pub fn license_status(conn: &Connection, license_id: &str) -> LicenseStatus {
    queries::get_license_by_id(conn, license_id)
        .unwrap()
        .expect("license exists")
        .status
}

// ============ HTTP helpers ============

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
}

pub fn bearer_request(method: &str, uri: &str, token: &str, body: Option<&Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token));
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn admin_request(method: &str, uri: &str, body: Option<&Value>) -> Request<Body> {
    bearer_request(method, uri, TEST_ADMIN_KEY, body)
}

/// Payment callback signed with the test webhook secret
pub fn signed_callback(body: &Value) -> Request<Body> {
    let bytes = serde_json::to_vec(body).unwrap();
    let signature = crypto::sign_payload(TEST_WEBHOOK_SECRET, &bytes);
    Request::builder()
        .method("POST")
        .uri("/payments/callback")
        .header("content-type", "application/json")
        .header("x-signature", signature)
        .body(Body::from(bytes))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).expect("response body is JSON")
}
