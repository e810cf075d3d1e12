//! Steps, quest opportunities and quest feedback.

use axum::http::StatusCode;
use serde_json::{json, Value};

use super::*;

/// A pending regional arc in `thornhaven` with three placeholder steps.
async fn arc_with_steps(router: &axum::Router) -> (String, Vec<Value>) {
    let arc_id = create_arc(
        router,
        json!({
            "title": "Shadows over Thornhaven",
            "arc_type": "regional",
            "region_id": "thornhaven",
            "total_steps": 3,
        }),
    )
    .await;

    let (status, steps) =
        post_empty(router, &format!("/arcs/{arc_id}/steps/generate?step_count=3")).await;
    assert_eq!(status, StatusCode::CREATED, "step generation failed: {steps}");
    let steps = steps.as_array().cloned().unwrap_or_default();
    (arc_id, steps)
}

#[tokio::test]
async fn generated_steps_are_indexed_and_tagged() {
    let router = test_router().await;
    let (arc_id, steps) = arc_with_steps(&router).await;

    assert_eq!(steps.len(), 3);
    let indexes: Vec<u64> = steps
        .iter()
        .filter_map(|s| s["step_index"].as_u64())
        .collect();
    assert_eq!(indexes, vec![0, 1, 2]);

    let (status, listed) = get(&router, &format!("/arcs/{arc_id}/steps")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(3));
    assert_eq!(listed[0]["tags"][0]["key"], "location");
    assert_eq!(listed[0]["tags"][0]["value"], "thornhaven");
}

#[tokio::test]
async fn opportunities_are_scored_only_with_context() {
    let router = test_router().await;
    let (arc_id, _) = arc_with_steps(&router).await;

    let (status, plain) = get(&router, &format!("/arcs/{arc_id}/quest-opportunities")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(plain.as_array().map(Vec::len), Some(3));
    assert!(plain[0].get("context_match_score").is_none());

    let (status, scored) = get(
        &router,
        &format!("/arcs/{arc_id}/quest-opportunities?location=thornhaven"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let score = scored[0]["context_match_score"].as_f64().unwrap();
    assert!(score > 0.0);

    let (_, elsewhere) = get(
        &router,
        &format!("/arcs/{arc_id}/quest-opportunities?location=millbrook"),
    )
    .await;
    assert_eq!(elsewhere[0]["context_match_score"].as_f64(), Some(0.0));
}

#[tokio::test]
async fn quest_generation_and_completion_feedback() {
    let router = test_router().await;
    let (arc_id, steps) = arc_with_steps(&router).await;
    let step_id = steps[0]["id"].as_str().unwrap().to_string();

    let (status, created) = post(
        &router,
        &format!("/arcs/{arc_id}/generate-quest"),
        json!({
            "step_id": step_id,
            "context": { "location": "thornhaven" },
            "force_generation": true,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "quest generation failed: {created}");
    assert_eq!(created["arc_id"], arc_id.as_str());
    assert_eq!(created["step_id"], step_id.as_str());
    let quest_id = created["quest_id"].as_str().unwrap().to_string();

    let (status, impact) = post(
        &router,
        &format!("/arcs/quests/{quest_id}/completion"),
        json!({ "outcome": "SUCCESS" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(impact["affected_arcs"], json!([arc_id]));

    let (_, impact) = post(
        &router,
        &format!("/arcs/quests/{quest_id}/completion"),
        json!({ "outcome": "partial" }),
    )
    .await;
    assert_eq!(impact["affected_arcs"], json!([]));

    let (status, _) = post(
        &router,
        &format!("/arcs/quests/{quest_id}/completion"),
        json!({ "outcome": "exploded" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn completed_quest_advances_its_secondary_arc() {
    let router = test_router().await;
    let (arc_id, steps) = arc_with_steps(&router).await;
    post_empty(&router, &format!("/arcs/{arc_id}/activate")).await;

    let (_, created) = post(
        &router,
        &format!("/arcs/{arc_id}/generate-quest"),
        json!({ "step_id": steps[0]["id"], "force_generation": true }),
    )
    .await;
    let quest_id = created["quest_id"].clone();

    let (status, summary) = post(
        &router,
        "/arcs/system/advance-secondary",
        json!({ "completed_quests": [quest_id] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["advanced"], json!([arc_id]));

    let (_, listed) = get(&router, &format!("/arcs/{arc_id}/steps")).await;
    assert_eq!(listed[0]["status"], "completed");
}

#[tokio::test]
async fn unlucky_draw_without_force_produces_no_quest() {
    let router = test_router_with(test_now(), 0.99).await;
    let (arc_id, steps) = arc_with_steps(&router).await;

    let (status, body) = post(
        &router,
        &format!("/arcs/{arc_id}/generate-quest"),
        json!({ "step_id": steps[0]["id"] }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Failed to generate quest");
}

#[tokio::test]
async fn quest_for_a_step_of_another_arc_is_not_found() {
    let router = test_router().await;
    let (_, steps) = arc_with_steps(&router).await;
    let other = create_arc(&router, character_arc("Unrelated", 2)).await;

    let (status, body) = post(
        &router,
        &format!("/arcs/{other}/generate-quest"),
        json!({ "step_id": steps[0]["id"], "force_generation": true }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Arc step not found");
}
