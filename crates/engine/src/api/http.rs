//! HTTP routes.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use uuid::Uuid;
use visualdm_domain::{
    ArcCompletionRecord, ArcCompletionResult, ArcId, ArcPriority, ArcProgression,
    ArcRelationship, ArcStatus, ArcStep, ArcStepId, ArcType, ProgressionMethod, QuestContext,
    RelationshipId, StoryArc,
};

use crate::app::App;
use crate::infrastructure::ports::ArcFilter;
use crate::use_cases::arc::{
    AnalyticsOverview, AnalyticsPeriod, AnalyticsReport, ArcComplexityReport, ArcEffectiveness,
    ArcError, ArcImpact, ArcPatch, ArcQuestOpportunity, ArcStatistics, Bottleneck,
    CohortAnalysis, CohortMetric, CohortType, CompletionTrends, CustomReport,
    CustomReportRequest, EngagementMetrics, ExportFormat, FailureAnalysis, FollowUpArc,
    FollowUpRequest, GenerationContext, NewArc, NewRelationship, PerformanceMetrics,
    PredictionAccuracy, ProgressionReport, RelationshipNetwork, RelationshipSuggestion,
    SecondaryAdvanceSummary, SuccessPatterns, SystemHealth, WorldEvent,
};

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/health", get(health))
        .route("/arcs", get(list_arcs).post(create_arc))
        // Generation
        .route("/arcs/generate", post(generate_arc))
        .route("/arcs/generate/primary", post(generate_primary_arc))
        // System sweeps
        .route("/arcs/system/advance-secondary", post(advance_secondary))
        .route("/arcs/system/statistics", get(arc_statistics))
        .route("/arcs/system/stalled", get(stalled_arcs))
        .route("/arcs/system/overdue", get(overdue_arcs))
        // Quest feedback
        .route("/arcs/quests/{quest_id}/completion", post(quest_completion))
        // Analytics
        .route("/arcs/analytics/overview", get(analytics_overview))
        .route("/arcs/analytics/performance", get(performance_metrics))
        .route(
            "/arcs/analytics/effectiveness/{arc_id}",
            get(arc_effectiveness),
        )
        .route("/arcs/analytics/completion-trends", get(completion_trends))
        .route("/arcs/analytics/failure-analysis", get(failure_analysis))
        .route("/arcs/analytics/system-health", get(system_health))
        .route("/arcs/analytics/engagement", get(engagement_metrics))
        .route("/arcs/analytics/bottlenecks", get(bottlenecks))
        .route("/arcs/analytics/success-patterns", get(success_patterns))
        .route("/arcs/analytics/impact/{arc_id}", get(arc_impact))
        .route(
            "/arcs/analytics/prediction-accuracy",
            get(prediction_accuracy),
        )
        .route("/arcs/analytics/cohort-analysis", get(cohort_analysis))
        .route("/arcs/analytics/custom-report", post(custom_report))
        // Relationships
        .route("/arcs/relationships/network", get(relationship_network))
        .route("/arcs/relationships/suggestions", get(relationship_suggestions))
        .route(
            "/arcs/relationships/{relationship_id}",
            delete(delete_relationship),
        )
        // Single arc
        .route(
            "/arcs/{id}",
            get(get_arc).put(update_arc).delete(delete_arc),
        )
        .route("/arcs/{id}/activate", post(activate_arc))
        .route("/arcs/{id}/advance", post(advance_arc))
        .route("/arcs/{id}/fail-step", post(fail_step))
        .route("/arcs/{id}/complete", post(complete_arc))
        .route("/arcs/{id}/fail", post(fail_arc))
        .route("/arcs/{id}/abandon", post(abandon_arc))
        .route("/arcs/{id}/steps", get(list_steps))
        .route("/arcs/{id}/steps/generate", post(generate_steps))
        .route("/arcs/{id}/steps/{step_index}/skip", post(skip_step))
        .route("/arcs/{id}/quest-opportunities", get(quest_opportunities))
        .route("/arcs/{id}/generate-quest", post(generate_quest))
        .route("/arcs/{id}/progression", get(progression_report))
        .route("/arcs/{id}/complexity", get(arc_complexity))
        .route("/arcs/{id}/successor", post(generate_successor))
        .route(
            "/arcs/{id}/relationships",
            get(list_relationships).post(create_relationship),
        )
        .route("/arcs/{id}/follow-ups", post(generate_follow_ups))
}

async fn health() -> &'static str {
    "OK"
}

// =============================================================================
// Arc CRUD
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct ListArcsQuery {
    status: Option<String>,
    arc_type: Option<String>,
}

async fn list_arcs(
    State(app): State<Arc<App>>,
    ApiQuery(query): ApiQuery<ListArcsQuery>,
) -> Result<Json<Vec<StoryArc>>, ApiError> {
    let mut filter = ArcFilter::default();
    if let Some(status) = query.status.as_deref() {
        filter = filter.with_status(parse_param::<ArcStatus>(status)?);
    }
    if let Some(arc_type) = query.arc_type.as_deref() {
        filter = filter.with_type(parse_param::<ArcType>(arc_type)?);
    }

    let arcs = app
        .use_cases
        .manager
        .list_arcs(filter)
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to list arcs"))?;
    Ok(Json(arcs))
}

async fn create_arc(
    State(app): State<Arc<App>>,
    Json(request): Json<NewArc>,
) -> Result<(StatusCode, Json<StoryArc>), ApiError> {
    let arc = app
        .use_cases
        .manager
        .create_arc(request)
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to create arc"))?;
    Ok((StatusCode::CREATED, Json(arc)))
}

async fn get_arc(
    State(app): State<Arc<App>>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<StoryArc>, ApiError> {
    let arc = app
        .use_cases
        .manager
        .get_arc(ArcId::from_uuid(id))
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to retrieve arc"))?;
    Ok(Json(arc))
}

async fn update_arc(
    State(app): State<Arc<App>>,
    ApiPath(id): ApiPath<Uuid>,
    Json(patch): Json<ArcPatch>,
) -> Result<Json<StoryArc>, ApiError> {
    let arc = app
        .use_cases
        .manager
        .update_arc(ArcId::from_uuid(id), patch)
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to update arc"))?;
    Ok(Json(arc))
}

async fn delete_arc(
    State(app): State<Arc<App>>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    app.use_cases
        .manager
        .delete_arc(ArcId::from_uuid(id))
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to delete arc"))?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Lifecycle
// =============================================================================

async fn activate_arc(
    State(app): State<Arc<App>>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<StoryArc>, ApiError> {
    let arc = app
        .use_cases
        .manager
        .activate_arc(ArcId::from_uuid(id))
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to activate arc"))?;
    Ok(Json(arc))
}

#[derive(Debug, Deserialize)]
struct AdvanceQuery {
    step_index: u32,
    method: Option<String>,
}

async fn advance_arc(
    State(app): State<Arc<App>>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<AdvanceQuery>,
) -> Result<Json<StoryArc>, ApiError> {
    let method = match query.method.as_deref() {
        Some(method) => parse_param::<ProgressionMethod>(method)?,
        None => ProgressionMethod::default(),
    };

    let arc = app
        .use_cases
        .manager
        .advance_arc_step(ArcId::from_uuid(id), query.step_index, method)
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to advance arc"))?;
    Ok(Json(arc))
}

#[derive(Debug, Deserialize)]
struct FailStepQuery {
    step_index: u32,
    #[serde(default)]
    reason: String,
}

async fn fail_step(
    State(app): State<Arc<App>>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<FailStepQuery>,
) -> Result<Json<ArcProgression>, ApiError> {
    let progression = app
        .use_cases
        .manager
        .fail_arc_step(ArcId::from_uuid(id), query.step_index, &query.reason)
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to record step failure"))?;
    Ok(Json(progression))
}

#[derive(Debug, Deserialize)]
struct CompleteArcRequest {
    result: ArcCompletionResult,
    #[serde(default)]
    narrative_outcome: String,
    #[serde(default)]
    world_consequences: Vec<String>,
}

async fn complete_arc(
    State(app): State<Arc<App>>,
    ApiPath(id): ApiPath<Uuid>,
    Json(request): Json<CompleteArcRequest>,
) -> Result<Json<ArcCompletionRecord>, ApiError> {
    let record = app
        .use_cases
        .manager
        .complete_arc(
            ArcId::from_uuid(id),
            request.result,
            &request.narrative_outcome,
            request.world_consequences,
        )
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to complete arc"))?;
    Ok(Json(record))
}

#[derive(Debug, Default, Deserialize)]
struct TerminateQuery {
    #[serde(default)]
    reason: String,
}

async fn fail_arc(
    State(app): State<Arc<App>>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<TerminateQuery>,
) -> Result<Json<StoryArc>, ApiError> {
    let arc = app
        .use_cases
        .manager
        .fail_arc(ArcId::from_uuid(id), &query.reason)
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to fail arc"))?;
    Ok(Json(arc))
}

async fn abandon_arc(
    State(app): State<Arc<App>>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<TerminateQuery>,
) -> Result<Json<StoryArc>, ApiError> {
    let arc = app
        .use_cases
        .manager
        .abandon_arc(ArcId::from_uuid(id), &query.reason)
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to abandon arc"))?;
    Ok(Json(arc))
}

// =============================================================================
// Steps and quests
// =============================================================================

async fn list_steps(
    State(app): State<Arc<App>>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Vec<ArcStep>>, ApiError> {
    let steps = app
        .use_cases
        .manager
        .list_steps(ArcId::from_uuid(id))
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to retrieve arc steps"))?;
    Ok(Json(steps))
}

async fn skip_step(
    State(app): State<Arc<App>>,
    ApiPath((id, step_index)): ApiPath<(Uuid, u32)>,
) -> Result<Json<ArcStep>, ApiError> {
    let step = app
        .use_cases
        .manager
        .skip_arc_step(ArcId::from_uuid(id), step_index)
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc step not found", "Failed to skip arc step"))?;
    Ok(Json(step))
}

#[derive(Debug, Default, Deserialize)]
struct GenerateStepsQuery {
    step_count: Option<u32>,
}

async fn generate_steps(
    State(app): State<Arc<App>>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<GenerateStepsQuery>,
) -> Result<(StatusCode, Json<Vec<ArcStep>>), ApiError> {
    let steps = app
        .use_cases
        .manager
        .generate_steps(ArcId::from_uuid(id), query.step_count)
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to generate arc steps"))?;
    Ok((StatusCode::CREATED, Json(steps)))
}

/// Every query parameter becomes a context entry.
async fn quest_opportunities(
    State(app): State<Arc<App>>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<BTreeMap<String, String>>,
) -> Result<Json<Vec<ArcQuestOpportunity>>, ApiError> {
    let arc_id = ArcId::from_uuid(id);
    app.use_cases
        .manager
        .get_arc(arc_id)
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to retrieve arc"))?;

    let context: QuestContext = params.into_iter().collect();
    let context = (!context.is_empty()).then_some(context);

    let opportunities = app
        .use_cases
        .quests
        .get_arc_quest_opportunities(arc_id, context.as_ref())
        .await
        .map_err(|e| {
            ApiError::from_arc(e, "Arc not found", "Failed to retrieve quest opportunities")
        })?;
    Ok(Json(opportunities))
}

#[derive(Debug, Deserialize)]
struct GenerateQuestRequest {
    step_id: ArcStepId,
    #[serde(default)]
    context: QuestContext,
    #[serde(default)]
    force_generation: bool,
}

async fn generate_quest(
    State(app): State<Arc<App>>,
    ApiPath(id): ApiPath<Uuid>,
    Json(request): Json<GenerateQuestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let arc_id = ArcId::from_uuid(id);
    let steps = app
        .use_cases
        .manager
        .list_steps(arc_id)
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to generate quest"))?;
    if !steps.iter().any(|s| s.id() == request.step_id) {
        return Err(ApiError::NotFound("Arc step not found".into()));
    }

    let quest_id = app
        .use_cases
        .quests
        .generate_quest_from_arc_step(request.step_id, &request.context, request.force_generation)
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc step not found", "Failed to generate quest"))?
        .ok_or_else(|| ApiError::BadRequest("Failed to generate quest".into()))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "quest_id": quest_id,
            "arc_id": arc_id,
            "step_id": request.step_id,
        })),
    ))
}

#[derive(Debug, Deserialize)]
struct QuestCompletionRequest {
    outcome: String,
    #[serde(default)]
    context: QuestContext,
}

async fn quest_completion(
    State(app): State<Arc<App>>,
    ApiPath(quest_id): ApiPath<String>,
    Json(request): Json<QuestCompletionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let affected = app
        .use_cases
        .quests
        .check_quest_completion_impact(&quest_id, &request.outcome, &request.context)
        .await
        .map_err(|e| {
            ApiError::from_arc(e, "Quest mapping not found", "Failed to check quest impact")
        })?;

    Ok(Json(json!({
        "quest_id": quest_id,
        "outcome": request.outcome.to_lowercase(),
        "affected_arcs": affected,
    })))
}

#[derive(Debug, Default, Deserialize)]
struct ProgressionQuery {
    #[serde(default)]
    include_events: bool,
}

async fn progression_report(
    State(app): State<Arc<App>>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ProgressionQuery>,
) -> Result<Json<ProgressionReport>, ApiError> {
    let report = app
        .use_cases
        .tracker
        .generate_progression_report(ArcId::from_uuid(id), query.include_events)
        .await
        .map_err(|e| {
            ApiError::from_arc(
                e,
                "Arc progression not found",
                "Failed to generate progression report",
            )
        })?;
    Ok(Json(report))
}

async fn arc_complexity(
    State(app): State<Arc<App>>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ArcComplexityReport>, ApiError> {
    let report = app
        .use_cases
        .manager
        .validate_arc(ArcId::from_uuid(id))
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to analyze arc"))?;
    Ok(Json(report))
}

// =============================================================================
// Generation
// =============================================================================

#[derive(Debug, Deserialize)]
struct GenerateArcRequest {
    arc_type: ArcType,
    #[serde(default)]
    context: GenerationContext,
    #[serde(default)]
    custom_requirements: BTreeMap<String, String>,
}

async fn generate_arc(
    State(app): State<Arc<App>>,
    Json(request): Json<GenerateArcRequest>,
) -> Result<(StatusCode, Json<StoryArc>), ApiError> {
    let arc = app
        .use_cases
        .manager
        .generate_arc(
            request.arc_type,
            &request.context,
            &request.custom_requirements,
        )
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to generate arc"))?
        .ok_or_else(|| ApiError::BadRequest("Failed to generate arc".into()))?;
    Ok((StatusCode::CREATED, Json(arc)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PrimaryArcRequest {
    context: GenerationContext,
    priority: Option<ArcPriority>,
}

/// `null` when the primary arc limit is reached.
async fn generate_primary_arc(
    State(app): State<Arc<App>>,
    Json(request): Json<PrimaryArcRequest>,
) -> Result<Json<Option<StoryArc>>, ApiError> {
    let arc = app
        .use_cases
        .manager
        .generate_primary_arc(&request.context, request.priority)
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to generate primary arc"))?;
    Ok(Json(arc))
}

async fn generate_successor(
    State(app): State<Arc<App>>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<(StatusCode, Json<StoryArc>), ApiError> {
    let arc = app
        .use_cases
        .manager
        .generate_successor_arc(ArcId::from_uuid(id))
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to generate successor arc"))?
        .ok_or_else(|| ApiError::BadRequest("Failed to generate successor arc".into()))?;
    Ok((StatusCode::CREATED, Json(arc)))
}

// =============================================================================
// Relationships
// =============================================================================

async fn create_relationship(
    State(app): State<Arc<App>>,
    ApiPath(id): ApiPath<Uuid>,
    Json(request): Json<NewRelationship>,
) -> Result<(StatusCode, Json<ArcRelationship>), ApiError> {
    let relationship = app
        .use_cases
        .relationships
        .create_relationship(ArcId::from_uuid(id), request)
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to create relationship"))?;
    Ok((StatusCode::CREATED, Json(relationship)))
}

async fn list_relationships(
    State(app): State<Arc<App>>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Vec<ArcRelationship>>, ApiError> {
    let relationships = app
        .use_cases
        .relationships
        .list_relationships(ArcId::from_uuid(id))
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to list relationships"))?;
    Ok(Json(relationships))
}

async fn delete_relationship(
    State(app): State<Arc<App>>,
    ApiPath(relationship_id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    app.use_cases
        .relationships
        .delete_relationship(RelationshipId::from_uuid(relationship_id))
        .await
        .map_err(|e| {
            ApiError::from_arc(e, "Relationship not found", "Failed to delete relationship")
        })?;
    Ok(StatusCode::NO_CONTENT)
}

async fn relationship_network(
    State(app): State<Arc<App>>,
) -> Result<Json<RelationshipNetwork>, ApiError> {
    let network = app
        .use_cases
        .relationships
        .analyze_relationship_network()
        .await
        .map_err(|e| ApiError::from_arc(e, "", "Failed to analyze relationship network"))?;
    Ok(Json(network))
}

async fn relationship_suggestions(
    State(app): State<Arc<App>>,
) -> Result<Json<Vec<RelationshipSuggestion>>, ApiError> {
    let suggestions = app
        .use_cases
        .relationships
        .suggest_relationship_opportunities()
        .await
        .map_err(|e| ApiError::from_arc(e, "", "Failed to suggest relationships"))?;
    Ok(Json(suggestions))
}

async fn generate_follow_ups(
    State(app): State<Arc<App>>,
    ApiPath(id): ApiPath<Uuid>,
    Json(request): Json<FollowUpRequest>,
) -> Result<Json<Vec<FollowUpArc>>, ApiError> {
    let follow_ups = app
        .use_cases
        .relationships
        .generate_dynamic_follow_up_arcs(ArcId::from_uuid(id), request)
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to generate follow-up arcs"))?;
    Ok(Json(follow_ups))
}

// =============================================================================
// System
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AdvanceSecondaryRequest {
    world_events: Vec<WorldEvent>,
    completed_quests: Vec<String>,
    time_passed_days: u32,
}

async fn advance_secondary(
    State(app): State<Arc<App>>,
    Json(request): Json<AdvanceSecondaryRequest>,
) -> Result<Json<SecondaryAdvanceSummary>, ApiError> {
    let summary = app
        .use_cases
        .manager
        .advance_secondary_tertiary_arcs(
            &request.world_events,
            &request.completed_quests,
            request.time_passed_days,
        )
        .await
        .map_err(|e| {
            ApiError::from_arc(e, "Arc not found", "Failed to advance secondary arcs")
        })?;
    Ok(Json(summary))
}

async fn arc_statistics(State(app): State<Arc<App>>) -> Result<Json<ArcStatistics>, ApiError> {
    let stats = app
        .use_cases
        .manager
        .get_arc_statistics()
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to retrieve arc statistics"))?;
    Ok(Json(stats))
}

async fn stalled_arcs(State(app): State<Arc<App>>) -> Result<Json<Vec<ArcId>>, ApiError> {
    let stalled = app
        .use_cases
        .manager
        .check_stalled_arcs()
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to check stalled arcs"))?;
    Ok(Json(stalled))
}

async fn overdue_arcs(State(app): State<Arc<App>>) -> Result<Json<Vec<ArcId>>, ApiError> {
    let overdue = app
        .use_cases
        .manager
        .check_overdue_arcs()
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to check overdue arcs"))?;
    Ok(Json(overdue))
}

// =============================================================================
// Analytics
// =============================================================================

#[derive(Debug, Deserialize)]
struct OverviewQuery {
    #[serde(default = "default_days_back")]
    days_back: u32,
    arc_type: Option<String>,
}

fn default_days_back() -> u32 {
    30
}

async fn analytics_overview(
    State(app): State<Arc<App>>,
    ApiQuery(query): ApiQuery<OverviewQuery>,
) -> Result<Json<AnalyticsReport<AnalyticsOverview>>, ApiError> {
    let arc_type = query
        .arc_type
        .as_deref()
        .map(parse_param::<ArcType>)
        .transpose()?;

    let report = app
        .use_cases
        .tracker
        .get_analytics_overview(query.days_back, arc_type)
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to retrieve analytics overview"))?;
    Ok(Json(report))
}

async fn performance_metrics(
    State(app): State<Arc<App>>,
) -> Result<Json<AnalyticsReport<PerformanceMetrics>>, ApiError> {
    let report = app
        .use_cases
        .tracker
        .calculate_performance_metrics()
        .await
        .map_err(|e| {
            ApiError::from_arc(e, "Arc not found", "Failed to retrieve performance metrics")
        })?;
    Ok(Json(report))
}

async fn arc_effectiveness(
    State(app): State<Arc<App>>,
    ApiPath(arc_id): ApiPath<Uuid>,
) -> Result<Json<AnalyticsReport<ArcEffectiveness>>, ApiError> {
    let report = app
        .use_cases
        .tracker
        .analyze_arc_effectiveness(ArcId::from_uuid(arc_id))
        .await
        .map_err(|e| {
            ApiError::from_arc(
                e,
                "Arc effectiveness data not found",
                "Failed to analyze arc effectiveness",
            )
        })?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct TrendsQuery {
    #[serde(default = "default_period")]
    period: String,
}

fn default_period() -> String {
    AnalyticsPeriod::Weekly.as_str().to_string()
}

async fn completion_trends(
    State(app): State<Arc<App>>,
    ApiQuery(query): ApiQuery<TrendsQuery>,
) -> Result<Json<AnalyticsReport<CompletionTrends>>, ApiError> {
    let period = parse_param::<AnalyticsPeriod>(&query.period)?;
    Ok(Json(app.use_cases.tracker.get_completion_trends(period)))
}

async fn failure_analysis(
    State(app): State<Arc<App>>,
) -> Json<AnalyticsReport<FailureAnalysis>> {
    Json(app.use_cases.tracker.analyze_failures())
}

async fn system_health(
    State(app): State<Arc<App>>,
) -> Result<Json<AnalyticsReport<SystemHealth>>, ApiError> {
    let report = app
        .use_cases
        .tracker
        .get_system_health()
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to retrieve system health"))?;
    Ok(Json(report))
}

async fn engagement_metrics(
    State(app): State<Arc<App>>,
) -> Json<AnalyticsReport<EngagementMetrics>> {
    Json(app.use_cases.tracker.get_engagement_metrics())
}

async fn bottlenecks(State(app): State<Arc<App>>) -> Json<AnalyticsReport<Vec<Bottleneck>>> {
    Json(app.use_cases.tracker.identify_bottlenecks())
}

async fn success_patterns(
    State(app): State<Arc<App>>,
) -> Json<AnalyticsReport<SuccessPatterns>> {
    Json(app.use_cases.tracker.analyze_success_patterns())
}

async fn arc_impact(
    State(app): State<Arc<App>>,
    ApiPath(arc_id): ApiPath<Uuid>,
) -> Result<Json<AnalyticsReport<ArcImpact>>, ApiError> {
    let report = app
        .use_cases
        .tracker
        .assess_arc_impact(ArcId::from_uuid(arc_id))
        .await
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to assess arc impact"))?;
    Ok(Json(report))
}

async fn prediction_accuracy(
    State(app): State<Arc<App>>,
) -> Json<AnalyticsReport<PredictionAccuracy>> {
    Json(app.use_cases.tracker.get_prediction_accuracy())
}

#[derive(Debug, Deserialize)]
struct CohortQuery {
    #[serde(default = "default_cohort_type")]
    cohort_type: String,
    #[serde(default = "default_cohort_metric")]
    metric: String,
    #[serde(default = "default_look_back_months")]
    look_back_months: u32,
}

fn default_cohort_type() -> String {
    CohortType::CreationMonth.as_str().to_string()
}

fn default_cohort_metric() -> String {
    CohortMetric::CompletionRate.as_str().to_string()
}

fn default_look_back_months() -> u32 {
    6
}

async fn cohort_analysis(
    State(app): State<Arc<App>>,
    ApiQuery(query): ApiQuery<CohortQuery>,
) -> Result<Json<AnalyticsReport<CohortAnalysis>>, ApiError> {
    let cohort_type = parse_param::<CohortType>(&query.cohort_type)?;
    let metric = parse_param::<CohortMetric>(&query.metric)?;

    let report = app
        .use_cases
        .tracker
        .perform_cohort_analysis(cohort_type, metric, query.look_back_months)
        .map_err(|e| ApiError::from_arc(e, "Arc not found", "Failed to perform cohort analysis"))?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct CustomReportQuery {
    #[serde(default = "default_export_format")]
    export_format: String,
}

fn default_export_format() -> String {
    ExportFormat::Json.as_str().to_string()
}

async fn custom_report(
    State(app): State<Arc<App>>,
    ApiQuery(query): ApiQuery<CustomReportQuery>,
    Json(request): Json<CustomReportRequest>,
) -> Result<Json<AnalyticsReport<CustomReport>>, ApiError> {
    let format = parse_param::<ExportFormat>(&query.export_format)?;
    Ok(Json(
        app.use_cases.tracker.generate_custom_report(request, format),
    ))
}

// =============================================================================
// Errors
// =============================================================================

/// `Query` that rejects with `{"detail"}` and 422 like the rest of the API.
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::Unprocessable(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// `Path` with the same rejection shape as [`ApiQuery`].
pub struct ApiPath<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::Unprocessable(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Parse a query value, reporting failures as 422.
fn parse_param<T>(value: &str) -> Result<T, ApiError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| ApiError::Unprocessable(e.to_string()))
}

/// API error type, rendered as `{"detail": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unprocessable(String),
    Internal(String),
}

impl ApiError {
    /// Map a use-case error. Storage failures are logged and reported with
    /// `internal_detail` only.
    fn from_arc(err: ArcError, not_found_detail: &str, internal_detail: &str) -> Self {
        match err {
            ArcError::NotFound { .. } => ApiError::NotFound(not_found_detail.to_string()),
            ArcError::InvalidTransition(msg) => ApiError::BadRequest(msg),
            ArcError::Validation(msg) => ApiError::Unprocessable(msg),
            ArcError::Repo(e) => {
                tracing::error!(error = %e, "{}", internal_detail);
                ApiError::Internal(internal_detail.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, detail) = match self {
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            ApiError::Unprocessable(detail) => (StatusCode::UNPROCESSABLE_ENTITY, detail),
            ApiError::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::RepoError;

    #[test]
    fn storage_failures_hide_internal_detail() {
        let err = ApiError::from_arc(
            ArcError::Repo(RepoError::database("get_arc", "disk I/O error")),
            "Arc not found",
            "Failed to retrieve arc",
        );
        assert!(matches!(err, ApiError::Internal(ref d) if d == "Failed to retrieve arc"));
    }

    #[test]
    fn domain_errors_map_to_client_statuses() {
        let missing = ApiError::from_arc(ArcError::not_found("Arc", "x"), "Arc not found", "");
        assert!(matches!(missing, ApiError::NotFound(ref d) if d == "Arc not found"));

        let transition = ApiError::from_arc(
            ArcError::InvalidTransition("Arc not in pending status".into()),
            "",
            "",
        );
        assert_eq!(
            transition.into_response().status(),
            StatusCode::BAD_REQUEST
        );

        let invalid = ApiError::from_arc(ArcError::Validation("bad".into()), "", "");
        assert_eq!(
            invalid.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn bad_query_values_are_unprocessable() {
        assert!(matches!(
            parse_param::<ArcStatus>("sleeping"),
            Err(ApiError::Unprocessable(_))
        ));
        assert!(parse_param::<AnalyticsPeriod>("daily").is_ok());
    }
}
