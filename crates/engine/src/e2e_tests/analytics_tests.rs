//! Analytics endpoints: computed reports and placeholder shapes.

use axum::http::StatusCode;
use serde_json::json;

use super::*;

#[tokio::test]
async fn overview_counts_recent_arcs() {
    let router = test_router().await;
    let done = create_arc(&router, character_arc("Closed Book", 1)).await;
    create_arc(&router, character_arc("Open Book", 2)).await;
    post_empty(&router, &format!("/arcs/{done}/activate")).await;
    post(
        &router,
        &format!("/arcs/{done}/complete"),
        json!({ "result": "success" }),
    )
    .await;

    let (status, report) = get(&router, "/arcs/analytics/overview").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["status"], "computed");
    assert_eq!(report["data"]["days_back"], 30);
    assert_eq!(report["data"]["total_arcs"], 2);
    assert_eq!(report["data"]["completed_arcs"], 1);
    assert_eq!(report["data"]["overall_completion_rate"], 0.5);

    let (_, filtered) = get(&router, "/arcs/analytics/overview?arc_type=global").await;
    assert_eq!(filtered["data"]["total_arcs"], 0);
}

#[tokio::test]
async fn out_of_range_parameters_are_unprocessable() {
    let router = test_router().await;

    let (status, body) = get(&router, "/arcs/analytics/overview?days_back=0").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().is_some_and(|d| d.contains("days_back")));

    let (status, _) = get(&router, "/arcs/analytics/overview?arc_type=cosmic").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = get(&router, "/arcs/analytics/completion-trends?period=hourly").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = get(
        &router,
        "/arcs/analytics/cohort-analysis?look_back_months=25",
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn placeholder_analytics_say_so() {
    let router = test_router().await;

    for uri in [
        "/arcs/analytics/completion-trends",
        "/arcs/analytics/failure-analysis",
        "/arcs/analytics/engagement",
        "/arcs/analytics/bottlenecks",
        "/arcs/analytics/success-patterns",
        "/arcs/analytics/prediction-accuracy",
        "/arcs/analytics/cohort-analysis",
    ] {
        let (status, report) = get(&router, uri).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(report["status"], "not_implemented", "{uri}");
    }

    let (_, trends) = get(&router, "/arcs/analytics/completion-trends").await;
    assert_eq!(trends["data"]["period"], "weekly");

    let (_, cohorts) = get(&router, "/arcs/analytics/cohort-analysis").await;
    assert_eq!(cohorts["data"]["cohort_type"], "creation_month");
    assert_eq!(cohorts["data"]["metric"], "completion_rate");
    assert_eq!(cohorts["data"]["look_back_months"], 6);
}

#[tokio::test]
async fn system_health_and_performance_are_computed() {
    let router = test_router().await;
    create_arc(&router, character_arc("Steady", 3)).await;

    let (status, health) = get(&router, "/arcs/analytics/system-health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "computed");
    assert!(health["data"]["status"].is_string());

    let (status, metrics) = get(&router, "/arcs/analytics/performance").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metrics["status"], "computed");
    assert_eq!(metrics["data"]["total_arcs"], 1);
}

#[tokio::test]
async fn effectiveness_needs_an_existing_arc() {
    let router = test_router().await;
    let missing = uuid::Uuid::new_v4();

    let (status, body) = get(
        &router,
        &format!("/arcs/analytics/effectiveness/{missing}"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Arc effectiveness data not found");

    let arc_id = create_arc(&router, character_arc("Measured", 2)).await;
    let (status, report) = get(
        &router,
        &format!("/arcs/analytics/effectiveness/{arc_id}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(report["status"].is_string());
}

#[tokio::test]
async fn custom_report_echoes_its_request() {
    let router = test_router().await;

    let (status, report) = post(
        &router,
        "/arcs/analytics/custom-report?export_format=csv",
        json!({ "filters": { "arc_type": "regional" }, "metrics": ["completion_rate"] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["status"], "not_implemented");

    let (status, _) = post(
        &router,
        "/arcs/analytics/custom-report?export_format=xml",
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn health_check() {
    let router = test_router().await;
    let (status, body) = get(&router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}
