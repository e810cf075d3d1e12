//! Read-side reporting over arcs and their progressions.
//!
//! Overview, performance and system health are computed from stored data.
//! The other analytics have no data source yet and answer with
//! [`AnalyticsReport::NotImplemented`] carrying a zero-filled body, so callers
//! can tell "nothing measured" apart from "measured zero".

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use visualdm_domain::{
    ArcCompletionResult, ArcId, ArcStatus, ArcSystemIntegration, ArcType, IntegrationStatus,
    ProgressionEvent, StoryArc,
};

use super::ArcError;
use crate::infrastructure::ports::{ArcFilter, ArcRepo, ClockPort, IntegrationRepo, ProgressionRepo};

pub const DAYS_BACK_RANGE: std::ops::RangeInclusive<u32> = 1..=365;
pub const LOOK_BACK_MONTHS_RANGE: std::ops::RangeInclusive<u32> = 1..=24;

/// Health at or above this is "healthy"
const HEALTHY_AT: f64 = 0.7;
/// Health below this is "critical"
const CRITICAL_BELOW: f64 = 0.3;
/// Share of stalled arcs that raises a warning
const STALLED_WARNING_RATIO: f64 = 0.25;

/// Analytics payload tagged with whether it was actually computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum AnalyticsReport<T> {
    Computed(T),
    NotImplemented(T),
}

impl<T> AnalyticsReport<T> {
    pub fn data(&self) -> &T {
        match self {
            Self::Computed(data) | Self::NotImplemented(data) => data,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, Self::Computed(_))
    }
}

// =============================================================================
// Query parameters
// =============================================================================

fn out_of_range(name: &str, value: u32, range: &std::ops::RangeInclusive<u32>) -> ArcError {
    ArcError::Validation(format!(
        "{} must be between {} and {}, got {}",
        name,
        range.start(),
        range.end(),
        value
    ))
}

fn check_range(
    name: &str,
    value: u32,
    range: &std::ops::RangeInclusive<u32>,
) -> Result<u32, ArcError> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(out_of_range(name, value, range))
    }
}

macro_rules! query_enum {
    ($name:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ArcError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ArcError::Validation(format!(
                        concat!("Invalid ", $label, ": {}"),
                        s
                    ))),
                }
            }
        }
    };
}

query_enum!(AnalyticsPeriod, "period", {
    Daily => "daily",
    Weekly => "weekly",
    Monthly => "monthly",
});

query_enum!(CohortType, "cohort type", {
    CreationMonth => "creation_month",
    ArcType => "arc_type",
    Priority => "priority",
});

query_enum!(CohortMetric, "cohort metric", {
    CompletionRate => "completion_rate",
    AverageDuration => "average_duration",
    Engagement => "engagement",
});

query_enum!(ExportFormat, "export format", {
    Json => "json",
    Csv => "csv",
});

// =============================================================================
// Report bodies
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressionReport {
    pub arc_id: ArcId,
    pub arc_title: String,
    pub arc_status: ArcStatus,
    pub current_step: u32,
    pub total_steps: u32,
    /// Completed steps over total steps, not the arc's cursor
    pub completion_percentage: f64,
    pub completed_steps: Vec<u32>,
    pub failed_steps: Vec<u32>,
    pub last_updated: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<ProgressionEvent>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsOverview {
    pub days_back: u32,
    pub arc_type: Option<ArcType>,
    pub total_arcs: usize,
    pub active_arcs: usize,
    pub completed_arcs: usize,
    pub failed_arcs: usize,
    pub stalled_arcs: usize,
    pub overall_completion_rate: f64,
    /// Hours from activation to completion
    pub average_arc_duration: f64,
    pub average_progress: f64,
    pub player_engagement_score: f64,
    pub system_health_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub completion_rate: f64,
    pub average_duration: f64,
    pub success_rate: f64,
    pub player_engagement: f64,
    pub total_arcs: usize,
    pub active_arcs: usize,
    pub failed_arcs: usize,
    pub stalled_arcs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArcEffectiveness {
    pub arc_id: ArcId,
    pub effectiveness_score: f64,
    pub engagement_score: f64,
    pub completion_score: f64,
    pub quest_integration_score: f64,
    pub narrative_coherence_score: f64,
    pub player_satisfaction_score: f64,
    pub recommendations: Vec<String>,
    pub analysis_details: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub period_start: DateTime<Utc>,
    pub completions: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrendSummary {
    pub total_completions: usize,
    pub total_failures: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionTrends {
    pub period: AnalyticsPeriod,
    pub trends: Vec<TrendPoint>,
    pub summary: TrendSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FailureAnalysis {
    pub failure_rate: f64,
    pub common_failure_points: Vec<u32>,
    pub failure_reasons: BTreeMap<String, usize>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemHealth {
    /// "healthy", "degraded" or "critical"
    pub status: &'static str,
    pub health_score: f64,
    pub active_arcs: usize,
    pub pending_arcs: usize,
    pub stalled_arcs: usize,
    pub stalled_ratio: f64,
    pub integrations: Vec<ArcSystemIntegration>,
    pub warnings: Vec<String>,
    pub alerts: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngagementMetrics {
    pub average_session_length: f64,
    pub player_retention_rate: f64,
    pub arc_completion_rate: f64,
    pub player_satisfaction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bottleneck {
    pub step_index: u32,
    pub occurrence_count: usize,
    pub average_time_stuck: f64,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SuccessPatterns {
    pub successful_arcs: usize,
    pub common_patterns: Vec<String>,
    pub success_factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArcImpact {
    pub arc_id: ArcId,
    pub overall_impact: f64,
    pub narrative_impact: f64,
    pub gameplay_impact: f64,
    pub downstream_effects: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PredictionAccuracy {
    pub overall_accuracy: f64,
    pub prediction_types: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortRow {
    pub cohort: String,
    pub value: f64,
    pub sample_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortAnalysis {
    pub cohort_type: CohortType,
    pub metric: CohortMetric,
    pub look_back_months: u32,
    pub cohorts: Vec<CohortRow>,
}

/// Body of a custom report request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CustomReportRequest {
    pub filters: BTreeMap<String, String>,
    pub metrics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomReport {
    pub report_id: Uuid,
    pub export_format: ExportFormat,
    pub filters_applied: BTreeMap<String, String>,
    pub metrics: Vec<String>,
    pub data_points: Vec<BTreeMap<String, f64>>,
    pub generated_at: DateTime<Utc>,
}

// =============================================================================
// Tracker
// =============================================================================

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Hours between activation and completion, for arcs that have both.
fn average_duration_hours(arcs: &[StoryArc]) -> f64 {
    mean(arcs.iter().filter_map(|arc| {
        let started = arc.started_at()?;
        let finished = arc.completed_at()?;
        Some(finished.signed_duration_since(started).num_minutes() as f64 / 60.0)
    }))
}

fn count_status(arcs: &[StoryArc], status: ArcStatus) -> usize {
    arcs.iter().filter(|a| a.status() == status).count()
}

fn integration_health(integrations: &[ArcSystemIntegration]) -> f64 {
    if integrations.is_empty() {
        1.0
    } else {
        mean(integrations.iter().map(|i| i.health_score))
    }
}

pub struct ProgressionTracker {
    arcs: Arc<dyn ArcRepo>,
    progressions: Arc<dyn ProgressionRepo>,
    integrations: Arc<dyn IntegrationRepo>,
    clock: Arc<dyn ClockPort>,
}

impl ProgressionTracker {
    pub fn new(
        arcs: Arc<dyn ArcRepo>,
        progressions: Arc<dyn ProgressionRepo>,
        integrations: Arc<dyn IntegrationRepo>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            arcs,
            progressions,
            integrations,
            clock,
        }
    }

    async fn require_arc(&self, arc_id: ArcId) -> Result<StoryArc, ArcError> {
        self.arcs
            .get(arc_id)
            .await?
            .ok_or_else(|| ArcError::not_found("Arc", arc_id))
    }

    pub async fn generate_progression_report(
        &self,
        arc_id: ArcId,
        include_events: bool,
    ) -> Result<ProgressionReport, ArcError> {
        let progression = self
            .progressions
            .get_for_arc(arc_id)
            .await?
            .ok_or_else(|| ArcError::not_found("ArcProgression", arc_id))?;
        let arc = self.require_arc(arc_id).await?;

        Ok(ProgressionReport {
            arc_id,
            arc_title: arc.title().to_string(),
            arc_status: arc.status(),
            current_step: arc.current_step(),
            total_steps: arc.total_steps(),
            completion_percentage: progression.completion_percentage(arc.total_steps()),
            completed_steps: progression.completed_steps().iter().copied().collect(),
            failed_steps: progression.failed_steps().iter().copied().collect(),
            last_updated: progression.last_updated(),
            events: include_events.then(|| progression.progression_events().to_vec()),
        })
    }

    // -------------------------------------------------------------------------
    // Computed analytics
    // -------------------------------------------------------------------------

    pub async fn get_analytics_overview(
        &self,
        days_back: u32,
        arc_type: Option<ArcType>,
    ) -> Result<AnalyticsReport<AnalyticsOverview>, ArcError> {
        let days_back = check_range("days_back", days_back, &DAYS_BACK_RANGE)?;

        let since = self.clock.now() - Duration::days(i64::from(days_back));
        let mut filter = ArcFilter::default().created_after(since);
        if let Some(arc_type) = arc_type {
            filter = filter.with_type(arc_type);
        }
        let arcs = self.arcs.list(filter).await?;
        let integrations = self.integrations.list_integrations().await?;

        let completed = count_status(&arcs, ArcStatus::Completed);
        Ok(AnalyticsReport::Computed(AnalyticsOverview {
            days_back,
            arc_type,
            total_arcs: arcs.len(),
            active_arcs: count_status(&arcs, ArcStatus::Active),
            completed_arcs: completed,
            failed_arcs: count_status(&arcs, ArcStatus::Failed),
            stalled_arcs: count_status(&arcs, ArcStatus::Stalled),
            overall_completion_rate: ratio(completed, arcs.len()),
            average_arc_duration: average_duration_hours(&arcs),
            average_progress: mean(arcs.iter().map(|a| a.completion_percentage())),
            player_engagement_score: 0.0,
            system_health_score: integration_health(&integrations),
        }))
    }

    pub async fn calculate_performance_metrics(
        &self,
    ) -> Result<AnalyticsReport<PerformanceMetrics>, ArcError> {
        let arcs = self.arcs.list(ArcFilter::default()).await?;
        let completions = self.arcs.list_completions().await?;

        let successes = completions
            .iter()
            .filter(|c| c.completion_result() == ArcCompletionResult::Success)
            .count();

        Ok(AnalyticsReport::Computed(PerformanceMetrics {
            completion_rate: ratio(count_status(&arcs, ArcStatus::Completed), arcs.len()),
            average_duration: average_duration_hours(&arcs),
            success_rate: ratio(successes, completions.len()),
            player_engagement: 0.0,
            total_arcs: arcs.len(),
            active_arcs: count_status(&arcs, ArcStatus::Active),
            failed_arcs: count_status(&arcs, ArcStatus::Failed),
            stalled_arcs: count_status(&arcs, ArcStatus::Stalled),
        }))
    }

    /// Stalled share of running arcs combined with integration health.
    pub async fn get_system_health(&self) -> Result<AnalyticsReport<SystemHealth>, ArcError> {
        let arcs = self.arcs.list(ArcFilter::default()).await?;
        let integrations = self.integrations.list_integrations().await?;

        let active = count_status(&arcs, ArcStatus::Active);
        let stalled = count_status(&arcs, ArcStatus::Stalled);
        let stalled_ratio = ratio(stalled, active + stalled);
        let health_score = integration_health(&integrations) * (1.0 - stalled_ratio);

        let mut warnings = Vec::new();
        let mut alerts = Vec::new();
        if stalled_ratio > STALLED_WARNING_RATIO {
            warnings.push(format!(
                "{:.0}% of running arcs are stalled",
                stalled_ratio * 100.0
            ));
        }
        for integration in &integrations {
            match integration.status {
                IntegrationStatus::Degraded => warnings.push(format!(
                    "{} integration is degraded",
                    integration.system_name
                )),
                IntegrationStatus::Offline => alerts.push(format!(
                    "{} integration is offline",
                    integration.system_name
                )),
                IntegrationStatus::Active => {}
            }
        }

        let status = if health_score >= HEALTHY_AT {
            "healthy"
        } else if health_score >= CRITICAL_BELOW {
            "degraded"
        } else {
            "critical"
        };

        Ok(AnalyticsReport::Computed(SystemHealth {
            status,
            health_score,
            active_arcs: active,
            pending_arcs: count_status(&arcs, ArcStatus::Pending),
            stalled_arcs: stalled,
            stalled_ratio,
            integrations,
            warnings,
            alerts,
        }))
    }

    // -------------------------------------------------------------------------
    // Not yet backed by data
    // -------------------------------------------------------------------------

    pub async fn analyze_arc_effectiveness(
        &self,
        arc_id: ArcId,
    ) -> Result<AnalyticsReport<ArcEffectiveness>, ArcError> {
        self.require_arc(arc_id).await?;
        Ok(AnalyticsReport::NotImplemented(ArcEffectiveness {
            arc_id,
            effectiveness_score: 0.0,
            engagement_score: 0.0,
            completion_score: 0.0,
            quest_integration_score: 0.0,
            narrative_coherence_score: 0.0,
            player_satisfaction_score: 0.0,
            recommendations: Vec::new(),
            analysis_details: BTreeMap::new(),
        }))
    }

    pub fn get_completion_trends(&self, period: AnalyticsPeriod) -> AnalyticsReport<CompletionTrends> {
        AnalyticsReport::NotImplemented(CompletionTrends {
            period,
            trends: Vec::new(),
            summary: TrendSummary::default(),
        })
    }

    pub fn analyze_failures(&self) -> AnalyticsReport<FailureAnalysis> {
        AnalyticsReport::NotImplemented(FailureAnalysis::default())
    }

    pub fn get_engagement_metrics(&self) -> AnalyticsReport<EngagementMetrics> {
        AnalyticsReport::NotImplemented(EngagementMetrics::default())
    }

    pub fn identify_bottlenecks(&self) -> AnalyticsReport<Vec<Bottleneck>> {
        AnalyticsReport::NotImplemented(Vec::new())
    }

    pub fn analyze_success_patterns(&self) -> AnalyticsReport<SuccessPatterns> {
        AnalyticsReport::NotImplemented(SuccessPatterns::default())
    }

    pub async fn assess_arc_impact(
        &self,
        arc_id: ArcId,
    ) -> Result<AnalyticsReport<ArcImpact>, ArcError> {
        self.require_arc(arc_id).await?;
        Ok(AnalyticsReport::NotImplemented(ArcImpact {
            arc_id,
            overall_impact: 0.0,
            narrative_impact: 0.0,
            gameplay_impact: 0.0,
            downstream_effects: Vec::new(),
        }))
    }

    pub fn get_prediction_accuracy(&self) -> AnalyticsReport<PredictionAccuracy> {
        AnalyticsReport::NotImplemented(PredictionAccuracy::default())
    }

    pub fn perform_cohort_analysis(
        &self,
        cohort_type: CohortType,
        metric: CohortMetric,
        look_back_months: u32,
    ) -> Result<AnalyticsReport<CohortAnalysis>, ArcError> {
        let look_back_months =
            check_range("look_back_months", look_back_months, &LOOK_BACK_MONTHS_RANGE)?;
        Ok(AnalyticsReport::NotImplemented(CohortAnalysis {
            cohort_type,
            metric,
            look_back_months,
            cohorts: Vec::new(),
        }))
    }

    pub fn generate_custom_report(
        &self,
        request: CustomReportRequest,
        export_format: ExportFormat,
    ) -> AnalyticsReport<CustomReport> {
        AnalyticsReport::NotImplemented(CustomReport {
            report_id: Uuid::new_v4(),
            export_format,
            filters_applied: request.filters,
            metrics: request.metrics,
            data_points: Vec::new(),
            generated_at: self.clock.now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::ports::{MockArcRepo, MockIntegrationRepo, MockProgressionRepo};
    use chrono::TimeZone;
    use visualdm_domain::{ArcCompletionRecord, ArcProgression, ProgressionMethod};

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn tracker(
        arcs: MockArcRepo,
        progressions: MockProgressionRepo,
        integrations: MockIntegrationRepo,
    ) -> ProgressionTracker {
        ProgressionTracker::new(
            Arc::new(arcs),
            Arc::new(progressions),
            Arc::new(integrations),
            Arc::new(FixedClock(now())),
        )
    }

    fn active_arc(total_steps: u32) -> StoryArc {
        let mut arc = StoryArc::new("Ashes of the Keep", "", ArcType::Regional, now())
            .with_total_steps(total_steps);
        arc.activate(now()).unwrap();
        arc
    }

    #[tokio::test]
    async fn report_uses_completed_set_not_cursor() {
        let mut arc = active_arc(4);
        arc.advance_step(now()).unwrap();
        arc.advance_step(now()).unwrap();
        let arc_id = arc.id();

        let mut progression = ArcProgression::new(arc_id, now());
        progression.record_step_completion(0, ProgressionMethod::QuestCompletion, now());
        progression.record_step_completion(0, ProgressionMethod::QuestCompletion, now());

        let mut arcs = MockArcRepo::new();
        arcs.expect_get().returning(move |_| Ok(Some(arc.clone())));
        let mut progressions = MockProgressionRepo::new();
        progressions
            .expect_get_for_arc()
            .returning(move |_| Ok(Some(progression.clone())));

        let tracker = tracker(arcs, progressions, MockIntegrationRepo::new());
        let report = tracker.generate_progression_report(arc_id, false).await.unwrap();

        assert_eq!(report.current_step, 2);
        assert_eq!(report.completion_percentage, 25.0);
        assert!(report.events.is_none());

        let with_events = tracker.generate_progression_report(arc_id, true).await.unwrap();
        assert_eq!(with_events.events.map(|e| e.len()), Some(2));
    }

    #[tokio::test]
    async fn report_without_progression_is_not_found() {
        let mut progressions = MockProgressionRepo::new();
        progressions.expect_get_for_arc().returning(|_| Ok(None));

        let tracker = tracker(MockArcRepo::new(), progressions, MockIntegrationRepo::new());
        let err = tracker
            .generate_progression_report(ArcId::new(), false)
            .await
            .unwrap_err();

        assert!(matches!(err, ArcError::NotFound { entity: "ArcProgression", .. }));
    }

    #[tokio::test]
    async fn overview_counts_window_and_validates_range() {
        let mut completed = active_arc(2);
        completed.complete(now()).unwrap();
        let listed = vec![active_arc(3), completed];

        let mut arcs = MockArcRepo::new();
        arcs.expect_list()
            .withf(|filter| {
                filter.arc_type == Some(ArcType::Regional)
                    && filter.created_after == Some(now() - Duration::days(30))
            })
            .returning(move |_| Ok(listed.clone()));
        let mut integrations = MockIntegrationRepo::new();
        integrations.expect_list_integrations().returning(|| Ok(Vec::new()));

        let tracker = tracker(arcs, MockProgressionRepo::new(), integrations);
        let report = tracker
            .get_analytics_overview(30, Some(ArcType::Regional))
            .await
            .unwrap();

        assert!(report.is_computed());
        let overview = report.data();
        assert_eq!(overview.total_arcs, 2);
        assert_eq!(overview.active_arcs, 1);
        assert_eq!(overview.completed_arcs, 1);
        assert_eq!(overview.overall_completion_rate, 0.5);
        assert_eq!(overview.system_health_score, 1.0);

        let err = tracker.get_analytics_overview(0, None).await.unwrap_err();
        assert!(matches!(err, ArcError::Validation(_)));
        let err = tracker.get_analytics_overview(366, None).await.unwrap_err();
        assert!(matches!(err, ArcError::Validation(_)));
    }

    #[tokio::test]
    async fn performance_success_rate_reads_completion_records() {
        let mut won = active_arc(1);
        won.complete(now()).unwrap();
        let mut lost = active_arc(1);
        lost.complete(now()).unwrap();
        let records = vec![
            ArcCompletionRecord::new(&won, ArcCompletionResult::Success, "", Vec::new(), now()),
            ArcCompletionRecord::new(&lost, ArcCompletionResult::Failure, "", Vec::new(), now()),
        ];
        let listed = vec![won, lost, active_arc(2)];

        let mut arcs = MockArcRepo::new();
        arcs.expect_list().returning(move |_| Ok(listed.clone()));
        arcs.expect_list_completions()
            .returning(move || Ok(records.clone()));

        let tracker = tracker(arcs, MockProgressionRepo::new(), MockIntegrationRepo::new());
        let report = tracker.calculate_performance_metrics().await.unwrap();

        assert_eq!(report.data().success_rate, 0.5);
        assert_eq!(report.data().total_arcs, 3);
        assert_eq!(report.data().active_arcs, 1);
    }

    #[tokio::test]
    async fn system_health_flags_offline_integrations() {
        let mut stalled = active_arc(3);
        stalled.mark_stalled(now()).unwrap();
        let listed = vec![active_arc(3), stalled];

        let mut offline = ArcSystemIntegration::new("quest");
        for _ in 0..10 {
            offline.update_metrics(false, 10.0, now());
        }

        let mut arcs = MockArcRepo::new();
        arcs.expect_list().returning(move |_| Ok(listed.clone()));
        let mut integrations = MockIntegrationRepo::new();
        integrations
            .expect_list_integrations()
            .returning(move || Ok(vec![offline.clone()]));

        let tracker = tracker(arcs, MockProgressionRepo::new(), integrations);
        let report = tracker.get_system_health().await.unwrap();
        let health = report.data();

        assert_eq!(health.stalled_ratio, 0.5);
        assert_eq!(health.status, "critical");
        assert_eq!(health.alerts, vec!["quest integration is offline".to_string()]);
        assert_eq!(health.warnings.len(), 1);
    }

    #[tokio::test]
    async fn healthy_when_nothing_is_stalled() {
        let listed = vec![active_arc(3)];
        let mut arcs = MockArcRepo::new();
        arcs.expect_list().returning(move |_| Ok(listed.clone()));
        let mut integrations = MockIntegrationRepo::new();
        integrations.expect_list_integrations().returning(|| Ok(Vec::new()));

        let tracker = tracker(arcs, MockProgressionRepo::new(), integrations);
        let report = tracker.get_system_health().await.unwrap();

        assert_eq!(report.data().status, "healthy");
        assert!(report.data().warnings.is_empty());
    }

    #[tokio::test]
    async fn effectiveness_requires_the_arc() {
        let mut arcs = MockArcRepo::new();
        arcs.expect_get().returning(|_| Ok(None));

        let tracker = tracker(arcs, MockProgressionRepo::new(), MockIntegrationRepo::new());
        let err = tracker.analyze_arc_effectiveness(ArcId::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn placeholder_analytics_are_tagged_not_implemented() {
        let tracker = tracker(
            MockArcRepo::new(),
            MockProgressionRepo::new(),
            MockIntegrationRepo::new(),
        );

        let json = serde_json::to_value(tracker.analyze_failures()).unwrap();
        assert_eq!(json["status"], "not_implemented");
        assert_eq!(json["data"]["failure_rate"], 0.0);

        let trends = serde_json::to_value(tracker.get_completion_trends(AnalyticsPeriod::Weekly))
            .unwrap();
        assert_eq!(trends["data"]["period"], "weekly");
        assert_eq!(trends["data"]["summary"]["total_completions"], 0);
    }

    #[test]
    fn query_parameters_parse_or_fail_validation() {
        assert_eq!("Monthly".parse::<AnalyticsPeriod>().unwrap(), AnalyticsPeriod::Monthly);
        assert_eq!(
            "creation_month".parse::<CohortType>().unwrap(),
            CohortType::CreationMonth
        );
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!(matches!(
            "hourly".parse::<AnalyticsPeriod>(),
            Err(ArcError::Validation(_))
        ));
        assert!("revenue".parse::<CohortMetric>().is_err());
    }

    #[test]
    fn cohort_analysis_checks_look_back() {
        let tracker = tracker(
            MockArcRepo::new(),
            MockProgressionRepo::new(),
            MockIntegrationRepo::new(),
        );

        assert!(tracker
            .perform_cohort_analysis(CohortType::ArcType, CohortMetric::CompletionRate, 6)
            .is_ok());
        assert!(tracker
            .perform_cohort_analysis(CohortType::ArcType, CohortMetric::CompletionRate, 25)
            .is_err());
    }
}
