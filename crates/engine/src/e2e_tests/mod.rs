//! End-to-end tests through the HTTP router.
//!
//! Every test builds the full App over an in-memory SQLite database with no
//! LLM configured, so generation runs in placeholder mode. Requests are driven
//! with `tower::ServiceExt::oneshot`; no socket is opened.
//!
//! ```bash
//! cargo test -p visualdm-engine --lib e2e_tests
//! ```

mod analytics_tests;
mod quest_flow_tests;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::app::App;
use crate::infrastructure::clock::{FixedClock, FixedRandom};
use crate::infrastructure::ports::{ClockPort, QuestGeneratorPort, RandomPort, WorldSystemsPort};
use crate::infrastructure::quest_generator::LocalQuestGenerator;
use crate::infrastructure::sqlite::memory_repositories;
use crate::infrastructure::world_systems::PlaceholderWorldSystems;

pub(crate) fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Router over a fresh in-memory database.
///
/// `draw` is the value every random draw returns; 0.0 always passes a quest
/// probability check.
pub(crate) async fn test_router_with(now: DateTime<Utc>, draw: f64) -> Router {
    let repos = memory_repositories().await;
    let clock: Arc<dyn ClockPort> = Arc::new(FixedClock(now));
    let random: Arc<dyn RandomPort> = Arc::new(FixedRandom(draw));
    let world: Arc<dyn WorldSystemsPort> = Arc::new(PlaceholderWorldSystems::new(random.clone()));
    let quests: Arc<dyn QuestGeneratorPort> = Arc::new(LocalQuestGenerator::new(clock.clone()));

    let app = Arc::new(App::new(repos, None, world, quests, clock, random));
    crate::api::http::routes().with_state(app)
}

pub(crate) async fn test_router() -> Router {
    test_router_with(test_now(), 0.0).await
}

/// Send one request and decode the JSON response. Empty bodies decode to `Null`.
pub(crate) async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

pub(crate) async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    send(router, Method::GET, uri, None).await
}

pub(crate) async fn post(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(router, Method::POST, uri, Some(body)).await
}

pub(crate) async fn post_empty(router: &Router, uri: &str) -> (StatusCode, Value) {
    send(router, Method::POST, uri, None).await
}

/// Create an arc and return its id.
pub(crate) async fn create_arc(router: &Router, body: Value) -> String {
    let (status, arc) = post(router, "/arcs", body).await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {arc}");
    arc["id"].as_str().unwrap().to_string()
}

pub(crate) fn character_arc(title: &str, total_steps: u32) -> Value {
    json!({
        "title": title,
        "description": "A personal reckoning",
        "arc_type": "character",
        "total_steps": total_steps,
        "character_id": "char-aria",
    })
}
