//! Arc lifecycle: creation, activation, step advancement, completion and the
//! stall/overdue sweeps.
//!
//! Mutations on one arc are serialized through a per-arc mutex, and every
//! arc + progression write goes through a single repository transaction.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use visualdm_domain::business_rules::{
    calculate_arc_complexity_score, should_arc_be_expanded, validate_arc_business_rules,
    validate_arc_progression_rules, validate_step_completion_criteria, ComplexityScore,
};
use visualdm_domain::{
    ArcCompletionRecord, ArcCompletionResult, ArcId, ArcPriority, ArcProgression, ArcStatus,
    ArcStep, ArcStepStatus, ArcType, ProgressionEventType, ProgressionMethod, StoryArc,
    SystemHookConfiguration,
};

use super::{ArcError, ArcGenerator, GenerationContext};
use crate::infrastructure::ports::{
    ArcFilter, ArcRepo, ArcStepRepo, ClockPort, IntegrationRepo, ProgressionRepo,
    RelationshipRepo,
};

/// Hooks a primary arc registers when the generator supplied none.
const PRIMARY_ARC_HOOKS: [&str; 4] = ["quest", "faction", "rumor", "world_state"];

/// Events below this significance never move an arc.
pub const WORLD_EVENT_SIGNIFICANCE: u8 = 5;

const SECONDARY_TYPES: [ArcType; 3] = [ArcType::Regional, ArcType::Character, ArcType::Npc];

/// Request to create an arc.
#[derive(Debug, Clone, Deserialize)]
pub struct NewArc {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub arc_type: ArcType,
    #[serde(default)]
    pub starting_point: String,
    #[serde(default)]
    pub preferred_ending: String,
    #[serde(default)]
    pub priority: Option<ArcPriority>,
    #[serde(default)]
    pub total_steps: Option<u32>,
    #[serde(default)]
    pub faction_ids: Vec<String>,
    #[serde(default)]
    pub system_hooks: Vec<String>,
    #[serde(default)]
    pub time_sensitivity: Option<f64>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stall_threshold_days: Option<u32>,
    #[serde(default)]
    pub difficulty_level: Option<u8>,
    #[serde(default)]
    pub estimated_duration_hours: Option<f64>,
    #[serde(default)]
    pub region_id: Option<String>,
    #[serde(default)]
    pub character_id: Option<String>,
    #[serde(default)]
    pub npc_id: Option<String>,
    #[serde(default)]
    pub classification_tags: BTreeMap<String, String>,
    #[serde(default)]
    pub themes: Vec<String>,
}

impl NewArc {
    pub fn new(title: impl Into<String>, arc_type: ArcType) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            arc_type,
            starting_point: String::new(),
            preferred_ending: String::new(),
            priority: None,
            total_steps: None,
            faction_ids: Vec::new(),
            system_hooks: Vec::new(),
            time_sensitivity: None,
            deadline: None,
            stall_threshold_days: None,
            difficulty_level: None,
            estimated_duration_hours: None,
            region_id: None,
            character_id: None,
            npc_id: None,
            classification_tags: BTreeMap::new(),
            themes: Vec::new(),
        }
    }

    fn into_arc(self, now: DateTime<Utc>) -> StoryArc {
        let mut arc = StoryArc::new(self.title, self.description, self.arc_type, now)
            .with_starting_point(self.starting_point)
            .with_preferred_ending(self.preferred_ending)
            .with_faction_ids(self.faction_ids)
            .with_system_hooks(self.system_hooks)
            .with_themes(self.themes);

        if let Some(priority) = self.priority {
            arc = arc.with_priority(priority);
        }
        if let Some(total) = self.total_steps {
            arc = arc.with_total_steps(total);
        }
        if let Some(ts) = self.time_sensitivity {
            arc = arc.with_time_sensitivity(ts);
        }
        if let Some(deadline) = self.deadline {
            arc = arc.with_deadline(deadline);
        }
        if let Some(days) = self.stall_threshold_days {
            arc = arc.with_stall_threshold_days(days);
        }
        if let Some(level) = self.difficulty_level {
            arc = arc.with_difficulty_level(level);
        }
        if let Some(hours) = self.estimated_duration_hours {
            arc = arc.with_estimated_duration_hours(hours);
        }
        if let Some(region_id) = self.region_id {
            arc = arc.with_region_id(region_id);
        }
        if let Some(character_id) = self.character_id {
            arc = arc.with_character_id(character_id);
        }
        if let Some(npc_id) = self.npc_id {
            arc = arc.with_npc_id(npc_id);
        }
        for (key, value) in self.classification_tags {
            arc = arc.with_classification_tag(key, value);
        }
        arc
    }
}

/// Partial update of an arc. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ArcPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<ArcPriority>,
    pub starting_point: Option<String>,
    pub preferred_ending: Option<String>,
    pub total_steps: Option<u32>,
    pub faction_ids: Option<Vec<String>>,
    pub system_hooks: Option<Vec<String>>,
    pub time_sensitivity: Option<f64>,
    pub deadline: Option<DateTime<Utc>>,
    pub stall_threshold_days: Option<u32>,
    pub difficulty_level: Option<u8>,
    pub estimated_duration_hours: Option<f64>,
    pub themes: Option<Vec<String>>,
}

impl ArcPatch {
    fn apply(self, arc: &mut StoryArc, now: DateTime<Utc>) {
        if let Some(title) = self.title {
            arc.set_title(title, now);
        }
        if let Some(description) = self.description {
            arc.set_description(description, now);
        }
        if let Some(priority) = self.priority {
            arc.set_priority(priority, now);
        }
        if let Some(starting_point) = self.starting_point {
            arc.set_starting_point(starting_point, now);
        }
        if let Some(preferred_ending) = self.preferred_ending {
            arc.set_preferred_ending(preferred_ending, now);
        }
        if let Some(total) = self.total_steps {
            arc.set_total_steps(total, now);
        }
        if let Some(faction_ids) = self.faction_ids {
            arc.set_faction_ids(faction_ids, now);
        }
        if let Some(system_hooks) = self.system_hooks {
            arc.set_system_hooks(system_hooks, now);
        }
        if let Some(themes) = self.themes {
            arc.set_themes(themes, now);
        }
        if self.time_sensitivity.is_some() {
            arc.set_time_sensitivity(self.time_sensitivity, now);
        }
        if self.deadline.is_some() {
            arc.set_deadline(self.deadline, now);
        }
        if let Some(days) = self.stall_threshold_days {
            arc.set_stall_threshold_days(days, now);
        }
        if let Some(level) = self.difficulty_level {
            arc.set_difficulty_level(level, now);
        }
        if self.estimated_duration_hours.is_some() {
            arc.set_estimated_duration_hours(self.estimated_duration_hours, now);
        }
    }
}

/// Something that happened in the world and may push arcs forward.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorldEvent {
    #[serde(rename = "type", alias = "event_type", default)]
    pub event_type: String,
    #[serde(alias = "location", default)]
    pub region_id: Option<String>,
    #[serde(default)]
    pub affected_factions: Vec<String>,
    /// 1-10
    #[serde(default)]
    pub significance: u8,
}

impl WorldEvent {
    fn touches(&self, arc: &StoryArc) -> bool {
        if self.significance < WORLD_EVENT_SIGNIFICANCE {
            return false;
        }
        let region_hit = matches!(
            (self.region_id.as_deref(), arc.region_id()),
            (Some(event_region), Some(arc_region)) if event_region == arc_region
        );
        region_hit
            || self
                .affected_factions
                .iter()
                .any(|f| arc.faction_ids().contains(f))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SecondaryAdvanceSummary {
    pub advanced: Vec<ArcId>,
    pub stalled: Vec<ArcId>,
    pub completed: Vec<ArcId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArcStatistics {
    pub total_arcs: usize,
    pub active_arcs: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    /// Active arcs already past their stall threshold
    pub stalled: usize,
    /// Active arcs past their deadline
    pub overdue: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArcComplexityReport {
    pub arc_id: ArcId,
    pub complexity: ComplexityScore,
    pub should_expand: bool,
    pub violations: Vec<String>,
    pub progression_violations: Vec<String>,
}

/// Holds one arc's mutex. Dropping it evicts the map entry once no other
/// task holds or waits on that mutex.
struct ArcLock<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    locks: &'a DashMap<ArcId, Arc<Mutex<()>>>,
    arc_id: ArcId,
}

impl Drop for ArcLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold a clone of the Arc, so a count of one means only the map is left.
        self.locks
            .remove_if(&self.arc_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

fn check_step_index(arc: &StoryArc, step_index: u32) -> Result<(), ArcError> {
    if step_index >= arc.total_steps() {
        return Err(ArcError::Validation(format!(
            "Step index {} is out of range for an arc with {} steps",
            step_index,
            arc.total_steps()
        )));
    }
    Ok(())
}

fn check_step_criteria(steps: &[ArcStep]) -> Result<(), ArcError> {
    for step in steps {
        let violations = validate_step_completion_criteria(step.completion_criteria());
        if !violations.is_empty() {
            return Err(ArcError::Validation(format!(
                "Step \"{}\": {}",
                step.title(),
                violations.join("; ")
            )));
        }
    }
    Ok(())
}

pub struct ArcManager {
    arcs: Arc<dyn ArcRepo>,
    steps: Arc<dyn ArcStepRepo>,
    progressions: Arc<dyn ProgressionRepo>,
    integrations: Arc<dyn IntegrationRepo>,
    relationships: Arc<dyn RelationshipRepo>,
    generator: Arc<ArcGenerator>,
    clock: Arc<dyn ClockPort>,
    locks: DashMap<ArcId, Arc<Mutex<()>>>,
}

impl ArcManager {
    pub fn new(
        arcs: Arc<dyn ArcRepo>,
        steps: Arc<dyn ArcStepRepo>,
        progressions: Arc<dyn ProgressionRepo>,
        integrations: Arc<dyn IntegrationRepo>,
        relationships: Arc<dyn RelationshipRepo>,
        generator: Arc<ArcGenerator>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            arcs,
            steps,
            progressions,
            integrations,
            relationships,
            generator,
            clock,
            locks: DashMap::new(),
        }
    }

    async fn lock(&self, arc_id: ArcId) -> ArcLock<'_> {
        let lock = self
            .locks
            .entry(arc_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        ArcLock {
            guard: Some(lock.lock_owned().await),
            locks: &self.locks,
            arc_id,
        }
    }

    async fn load(&self, arc_id: ArcId) -> Result<StoryArc, ArcError> {
        self.arcs
            .get(arc_id)
            .await?
            .ok_or_else(|| ArcError::not_found("Arc", arc_id))
    }

    async fn load_progression(&self, arc_id: ArcId) -> Result<ArcProgression, ArcError> {
        self.progressions
            .get_for_arc(arc_id)
            .await?
            .ok_or_else(|| ArcError::not_found("ArcProgression", arc_id))
    }

    // =========================================================================
    // CRUD
    // =========================================================================

    pub async fn create_arc(&self, request: NewArc) -> Result<StoryArc, ArcError> {
        let arc = request.into_arc(self.clock.now());
        self.register_arc(arc, Vec::new()).await
    }

    /// Validate, then persist a fresh arc with an empty progression, its hooks
    /// and any steps in one transaction.
    ///
    /// Every creation path ends here, generated arcs included.
    async fn register_arc(
        &self,
        mut arc: StoryArc,
        steps: Vec<ArcStep>,
    ) -> Result<StoryArc, ArcError> {
        let now = self.clock.now();
        let arc_type = arc.arc_type();

        let active = self
            .arcs
            .count_by_type_and_status(arc_type, ArcStatus::Active)
            .await?;
        let limit = arc_type.config().active_soft_limit;
        if active >= limit {
            tracing::warn!(
                arc_type = %arc_type,
                active,
                limit,
                "Active arc soft limit reached, creating anyway"
            );
        }

        let steps: Vec<ArcStep> = steps
            .into_iter()
            .enumerate()
            .map(|(i, step)| step.reindexed(arc.id(), i as u32))
            .collect();
        if !steps.is_empty() {
            arc.set_total_steps(arc.total_steps().max(steps.len() as u32), now);
        }
        arc.validate()?;
        check_step_criteria(&steps)?;

        let hooks: Vec<SystemHookConfiguration> = arc
            .system_hooks()
            .iter()
            .map(|system| SystemHookConfiguration::new(arc.id(), system.clone(), now))
            .collect();
        let progression = ArcProgression::new(arc.id(), now);
        self.arcs
            .register(&arc, &progression, &steps, &hooks)
            .await?;

        tracing::info!(
            arc_id = %arc.id(),
            arc_type = %arc_type,
            title = %arc.title(),
            steps = steps.len(),
            "Arc created"
        );
        Ok(arc)
    }

    pub async fn get_arc(&self, arc_id: ArcId) -> Result<StoryArc, ArcError> {
        self.load(arc_id).await
    }

    pub async fn list_arcs(&self, filter: ArcFilter) -> Result<Vec<StoryArc>, ArcError> {
        Ok(self.arcs.list(filter).await?)
    }

    pub async fn update_arc(&self, arc_id: ArcId, patch: ArcPatch) -> Result<StoryArc, ArcError> {
        let _guard = self.lock(arc_id).await;
        let mut arc = self.load(arc_id).await?;

        patch.apply(&mut arc, self.clock.now());
        arc.validate()?;
        self.arcs.save(&arc).await?;

        tracing::info!(arc_id = %arc_id, "Arc updated");
        Ok(arc)
    }

    /// Remove the arc with its steps, progression, relationships and quest mappings.
    pub async fn delete_arc(&self, arc_id: ArcId) -> Result<(), ArcError> {
        let _guard = self.lock(arc_id).await;
        self.load(arc_id).await?;
        self.arcs.delete(arc_id).await?;

        tracing::info!(arc_id = %arc_id, "Arc deleted");
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// PENDING -> ACTIVE.
    pub async fn activate_arc(&self, arc_id: ArcId) -> Result<StoryArc, ArcError> {
        let _guard = self.lock(arc_id).await;
        let now = self.clock.now();

        let mut arc = self.load(arc_id).await?;
        arc.activate(now)?;

        let mut progression = self
            .progressions
            .get_for_arc(arc_id)
            .await?
            .unwrap_or_else(|| ArcProgression::new(arc_id, now));
        progression.record_activation(now);

        self.arcs.save_with_progression(&arc, &progression).await?;
        self.open_step(arc_id, 0, now).await?;

        tracing::info!(arc_id = %arc_id, "Arc activated");
        Ok(arc)
    }

    /// ACTIVE or STALLED -> FAILED. No completion record is written.
    pub async fn fail_arc(&self, arc_id: ArcId, reason: &str) -> Result<StoryArc, ArcError> {
        self.terminate(arc_id, ArcStatus::Failed, reason).await
    }

    /// Any non-terminal status -> ABANDONED.
    pub async fn abandon_arc(&self, arc_id: ArcId, reason: &str) -> Result<StoryArc, ArcError> {
        self.terminate(arc_id, ArcStatus::Abandoned, reason).await
    }

    async fn terminate(
        &self,
        arc_id: ArcId,
        status: ArcStatus,
        reason: &str,
    ) -> Result<StoryArc, ArcError> {
        let _guard = self.lock(arc_id).await;
        let now = self.clock.now();

        let mut arc = self.load(arc_id).await?;
        let event_type = if status == ArcStatus::Failed {
            arc.fail(now)?;
            ProgressionEventType::ArcFailed
        } else {
            arc.abandon(now)?;
            ProgressionEventType::ArcAbandoned
        };

        let mut progression = self
            .progressions
            .get_for_arc(arc_id)
            .await?
            .unwrap_or_else(|| ArcProgression::new(arc_id, now));
        progression.record_termination(event_type, reason, now);
        self.arcs.save_with_progression(&arc, &progression).await?;

        tracing::info!(arc_id = %arc_id, status = %arc.status(), reason, "Arc closed");
        Ok(arc)
    }

    /// Make a stored PENDING step available to the quest system.
    async fn open_step(
        &self,
        arc_id: ArcId,
        step_index: u32,
        now: DateTime<Utc>,
    ) -> Result<(), ArcError> {
        if let Some(mut step) = self.steps.get_by_index(arc_id, step_index).await? {
            if step.status() == ArcStepStatus::Pending {
                step.make_available(now)?;
                self.steps.save(&step).await?;
            }
        }
        Ok(())
    }

    /// Record `step_index` as completed and move the arc's cursor forward.
    ///
    /// The cursor moves on every call; the completed set records each index once.
    pub async fn advance_arc_step(
        &self,
        arc_id: ArcId,
        step_index: u32,
        method: ProgressionMethod,
    ) -> Result<StoryArc, ArcError> {
        let _guard = self.lock(arc_id).await;

        let mut arc = self.load(arc_id).await?;
        let mut progression = self.load_progression(arc_id).await?;
        self.advance_locked(&mut arc, &mut progression, step_index, method)
            .await?;
        Ok(arc)
    }

    async fn advance_locked(
        &self,
        arc: &mut StoryArc,
        progression: &mut ArcProgression,
        step_index: u32,
        method: ProgressionMethod,
    ) -> Result<(), ArcError> {
        check_step_index(arc, step_index)?;

        let now = self.clock.now();
        arc.advance_step(now)?;
        progression.record_step_completion(step_index, method, now);
        self.arcs.save_with_progression(arc, progression).await?;

        if let Some(mut step) = self.steps.get_by_index(arc.id(), step_index).await? {
            if !step.status().is_terminal() {
                step.complete(now)?;
                self.steps.save(&step).await?;
            }
        }
        // In range, so `step_index + 1` cannot overflow.
        if step_index + 1 < arc.total_steps() {
            self.open_step(arc.id(), step_index + 1, now).await?;
        }

        tracing::info!(
            arc_id = %arc.id(),
            step_index,
            method = %method,
            current_step = arc.current_step(),
            total_steps = arc.total_steps(),
            "Arc step advanced"
        );
        Ok(())
    }

    /// Record a failed attempt at a step. The arc's status is left alone.
    pub async fn fail_arc_step(
        &self,
        arc_id: ArcId,
        step_index: u32,
        reason: &str,
    ) -> Result<ArcProgression, ArcError> {
        let _guard = self.lock(arc_id).await;
        let now = self.clock.now();

        let mut arc = self.load(arc_id).await?;
        check_step_index(&arc, step_index)?;
        let mut progression = self.load_progression(arc_id).await?;

        progression.record_step_failure(step_index, reason, now)?;
        arc.touch(now);
        self.arcs.save_with_progression(&arc, &progression).await?;

        if let Some(mut step) = self.steps.get_by_index(arc_id, step_index).await? {
            if step.status().can_transition_to(&ArcStepStatus::Failed) {
                step.fail(reason, now)?;
                self.steps.save(&step).await?;
            }
        }

        tracing::info!(arc_id = %arc_id, step_index, reason, "Arc step failed");
        Ok(progression)
    }

    /// Mark a stored step SKIPPED. The cursor and completed set are left alone,
    /// and the next step opens for quests.
    pub async fn skip_arc_step(&self, arc_id: ArcId, step_index: u32) -> Result<ArcStep, ArcError> {
        let _guard = self.lock(arc_id).await;
        let now = self.clock.now();

        let mut arc = self.load(arc_id).await?;
        check_step_index(&arc, step_index)?;
        if arc.status().is_terminal() {
            return Err(ArcError::InvalidTransition(format!(
                "Arc {} is {} and its steps cannot be skipped",
                arc_id,
                arc.status()
            )));
        }
        let mut step = self
            .steps
            .get_by_index(arc_id, step_index)
            .await?
            .ok_or_else(|| ArcError::not_found("ArcStep", format!("{}#{}", arc_id, step_index)))?;
        let mut progression = self.load_progression(arc_id).await?;

        step.skip(now)?;
        progression.record_step_skip(step_index, now);
        arc.touch(now);
        self.arcs.save_with_progression(&arc, &progression).await?;
        self.steps.save(&step).await?;
        if step_index + 1 < arc.total_steps() {
            self.open_step(arc_id, step_index + 1, now).await?;
        }

        tracing::info!(arc_id = %arc_id, step_index, "Arc step skipped");
        Ok(step)
    }

    /// Close the arc. The arc always ends COMPLETED; `result` lives on the record.
    pub async fn complete_arc(
        &self,
        arc_id: ArcId,
        result: ArcCompletionResult,
        narrative_outcome: &str,
        world_consequences: Vec<String>,
    ) -> Result<ArcCompletionRecord, ArcError> {
        let _guard = self.lock(arc_id).await;

        let mut arc = self.load(arc_id).await?;
        let mut progression = self
            .progressions
            .get_for_arc(arc_id)
            .await?
            .unwrap_or_else(|| ArcProgression::new(arc_id, self.clock.now()));
        self.complete_locked(
            &mut arc,
            &mut progression,
            result,
            narrative_outcome,
            world_consequences,
        )
        .await
    }

    async fn complete_locked(
        &self,
        arc: &mut StoryArc,
        progression: &mut ArcProgression,
        result: ArcCompletionResult,
        narrative_outcome: &str,
        world_consequences: Vec<String>,
    ) -> Result<ArcCompletionRecord, ArcError> {
        let now = self.clock.now();
        arc.complete(now)?;
        progression.record_completion(result, now);

        let record =
            ArcCompletionRecord::new(arc, result, narrative_outcome, world_consequences, now);
        self.arcs.save_completion(arc, progression, &record).await?;

        tracing::info!(arc_id = %arc.id(), result = %result, "Arc completed");
        Ok(record)
    }

    // =========================================================================
    // Sweeps
    // =========================================================================

    /// Flip idle ACTIVE arcs to STALLED. Returns the arcs that were flipped.
    pub async fn check_stalled_arcs(&self) -> Result<Vec<ArcId>, ArcError> {
        let now = self.clock.now();
        let candidates = self
            .arcs
            .list(ArcFilter::default().with_status(ArcStatus::Active))
            .await?;

        let mut stalled = Vec::new();
        for candidate in candidates.iter().filter(|a| a.is_stalled_at(now)) {
            let _guard = self.lock(candidate.id()).await;
            // Re-read under the lock: the arc may have moved since the listing.
            let mut arc = self.load(candidate.id()).await?;
            if !arc.is_stalled_at(now) {
                continue;
            }
            self.stall_locked(&mut arc, now).await?;
            stalled.push(arc.id());
        }

        if !stalled.is_empty() {
            tracing::warn!(count = stalled.len(), "Stalled arcs detected");
        }
        Ok(stalled)
    }

    /// `at` is the instant inactivity is measured against.
    async fn stall_locked(&self, arc: &mut StoryArc, at: DateTime<Utc>) -> Result<(), ArcError> {
        let now = self.clock.now();
        let days_inactive = arc.days_since_activity(at);
        arc.mark_stalled(now)?;

        let mut progression = self
            .progressions
            .get_for_arc(arc.id())
            .await?
            .unwrap_or_else(|| ArcProgression::new(arc.id(), now));
        progression.record_stall(days_inactive, now);
        self.arcs.save_with_progression(arc, &progression).await?;

        tracing::warn!(arc_id = %arc.id(), days_inactive, "Arc stalled");
        Ok(())
    }

    /// Time-sensitive ACTIVE arcs past their deadline. Read-only.
    pub async fn check_overdue_arcs(&self) -> Result<Vec<ArcId>, ArcError> {
        let now = self.clock.now();
        let overdue: Vec<ArcId> = self
            .arcs
            .list(ArcFilter::default().with_status(ArcStatus::Active))
            .await?
            .into_iter()
            .filter(|arc| arc.is_overdue_at(now))
            .map(|arc| arc.id())
            .collect();

        for arc_id in &overdue {
            tracing::warn!(arc_id = %arc_id, "Arc is overdue");
        }
        Ok(overdue)
    }

    pub async fn get_arc_statistics(&self) -> Result<ArcStatistics, ArcError> {
        let now = self.clock.now();
        let arcs = self.arcs.list(ArcFilter::default()).await?;

        let mut by_status = BTreeMap::new();
        let mut by_type = BTreeMap::new();
        for arc in &arcs {
            *by_status.entry(arc.status().to_string()).or_insert(0) += 1;
            *by_type.entry(arc.arc_type().to_string()).or_insert(0) += 1;
        }

        let active: Vec<&StoryArc> = arcs
            .iter()
            .filter(|a| a.status() == ArcStatus::Active)
            .collect();

        Ok(ArcStatistics {
            total_arcs: arcs.len(),
            active_arcs: active.len(),
            stalled: active.iter().filter(|a| a.is_stalled_at(now)).count(),
            overdue: active.iter().filter(|a| a.is_overdue_at(now)).count(),
            by_status,
            by_type,
        })
    }

    // =========================================================================
    // Steps
    // =========================================================================

    /// Append steps after the ones already stored and grow `total_steps` to fit.
    pub async fn add_steps(
        &self,
        arc_id: ArcId,
        steps: Vec<ArcStep>,
    ) -> Result<Vec<ArcStep>, ArcError> {
        let _guard = self.lock(arc_id).await;
        let now = self.clock.now();

        let mut arc = self.load(arc_id).await?;
        let start = self.steps.list_for_arc(arc_id).await?.len() as u32;

        let steps: Vec<ArcStep> = steps
            .into_iter()
            .enumerate()
            .map(|(i, step)| step.reindexed(arc_id, start + i as u32))
            .collect();
        if steps.is_empty() {
            return Ok(steps);
        }
        check_step_criteria(&steps)?;

        self.steps.save_all(&steps).await?;

        let needed = start + steps.len() as u32;
        if needed > arc.total_steps() {
            arc.set_total_steps(needed, now);
            self.arcs.save(&arc).await?;
        }

        tracing::info!(arc_id = %arc_id, added = steps.len(), first_index = start, "Arc steps added");
        Ok(steps)
    }

    pub async fn list_steps(&self, arc_id: ArcId) -> Result<Vec<ArcStep>, ArcError> {
        self.load(arc_id).await?;
        Ok(self.steps.list_for_arc(arc_id).await?)
    }

    // =========================================================================
    // Generation-driven flows
    // =========================================================================

    /// Generate and register a GLOBAL arc with its steps.
    ///
    /// `Ok(None)` when GLOBAL arcs are at their active limit or the generator
    /// produced nothing usable.
    pub async fn generate_primary_arc(
        &self,
        context: &GenerationContext,
        priority: Option<ArcPriority>,
    ) -> Result<Option<StoryArc>, ArcError> {
        let limit = ArcType::Global.config().active_soft_limit;
        let active = self
            .arcs
            .count_by_type_and_status(ArcType::Global, ArcStatus::Active)
            .await?;
        if active >= limit {
            tracing::info!(active, limit, "Primary arc limit reached, not generating");
            return Ok(None);
        }

        let Some(arc) = self
            .generator
            .generate_arc(ArcType::Global, context, &[], &BTreeMap::new())
            .await
        else {
            tracing::warn!("Primary arc generation produced no arc");
            return Ok(None);
        };

        let mut arc = arc
            .with_classification_tag("tier", "primary")
            .with_priority(priority.unwrap_or(ArcPriority::High));
        if arc.system_hooks().is_empty() {
            arc = arc.with_system_hooks(PRIMARY_ARC_HOOKS.iter().map(|s| s.to_string()).collect());
        }

        let steps = self.generator.generate_arc_steps(&arc, None, context).await;
        self.register_arc(arc, steps).await.map(Some)
    }

    /// Generate an arc of any type and register it with its steps.
    ///
    /// Completed arcs of the same type are handed to the generator as history.
    pub async fn generate_arc(
        &self,
        arc_type: ArcType,
        context: &GenerationContext,
        custom_requirements: &BTreeMap<String, String>,
    ) -> Result<Option<StoryArc>, ArcError> {
        let history = self
            .arcs
            .list(
                ArcFilter::default()
                    .with_type(arc_type)
                    .with_status(ArcStatus::Completed),
            )
            .await?;

        let Some(arc) = self
            .generator
            .generate_arc(arc_type, context, &history, custom_requirements)
            .await
        else {
            return Ok(None);
        };

        let steps = self.generator.generate_arc_steps(&arc, None, context).await;
        self.register_arc(arc, steps).await.map(Some)
    }

    /// Generate steps for an existing arc and append them.
    pub async fn generate_steps(
        &self,
        arc_id: ArcId,
        step_count: Option<u32>,
    ) -> Result<Vec<ArcStep>, ArcError> {
        let arc = self.load(arc_id).await?;
        let context = GenerationContext::from_arc(&arc);
        let steps = self
            .generator
            .generate_next_arc_steps(&arc, &context, step_count)
            .await;
        self.add_steps(arc_id, steps).await
    }

    /// Chain a new arc onto a completed one.
    pub async fn generate_successor_arc(
        &self,
        arc_id: ArcId,
    ) -> Result<Option<StoryArc>, ArcError> {
        let completed = self.load(arc_id).await?;
        if completed.status() != ArcStatus::Completed {
            return Err(ArcError::InvalidTransition(
                "Arc must be completed before generating a successor".into(),
            ));
        }
        let record = self.arcs.get_completion(arc_id).await?;

        let Some(successor) = self
            .generator
            .generate_successor_arc(&completed, record.as_ref())
            .await
        else {
            return Ok(None);
        };

        tracing::info!(predecessor = %arc_id, successor = %successor.id(), "Successor arc generated");
        self.register_arc(successor, Vec::new()).await.map(Some)
    }

    /// Push REGIONAL, CHARACTER and NPC arcs forward from what happened in the world.
    ///
    /// A completed quest mapped to the arc wins over a world event. Arcs that
    /// neither advance nor are within their threshold are stalled.
    pub async fn advance_secondary_tertiary_arcs(
        &self,
        world_events: &[WorldEvent],
        completed_quests: &[String],
        time_passed_days: u32,
    ) -> Result<SecondaryAdvanceSummary, ArcError> {
        let mut quest_arcs = BTreeSet::new();
        for quest_id in completed_quests {
            for mapping in self.integrations.list_mappings_for_quest(quest_id).await? {
                quest_arcs.insert(mapping.arc_id());
            }
        }

        let candidates: Vec<ArcId> = self
            .arcs
            .list(ArcFilter::default())
            .await?
            .into_iter()
            .filter(|arc| {
                SECONDARY_TYPES.contains(&arc.arc_type())
                    && matches!(arc.status(), ArcStatus::Active | ArcStatus::Stalled)
            })
            .map(|arc| arc.id())
            .collect();

        let effective_now = self.clock.now() + Duration::days(i64::from(time_passed_days));
        let mut summary = SecondaryAdvanceSummary::default();

        for arc_id in candidates {
            let _guard = self.lock(arc_id).await;
            let mut arc = self.load(arc_id).await?;

            let method = if arc.total_steps() == 0 {
                // Nothing to advance into; only the stall check applies.
                None
            } else if quest_arcs.contains(&arc_id) {
                Some(ProgressionMethod::QuestCompletion)
            } else if world_events.iter().any(|event| event.touches(&arc)) {
                Some(ProgressionMethod::WorldEvent)
            } else {
                None
            };

            let Some(method) = method else {
                if arc.is_stalled_at(effective_now) {
                    self.stall_locked(&mut arc, effective_now).await?;
                    summary.stalled.push(arc_id);
                }
                continue;
            };

            let mut progression = self
                .progressions
                .get_for_arc(arc_id)
                .await?
                .unwrap_or_else(|| ArcProgression::new(arc_id, self.clock.now()));
            let step_index = arc.current_step().min(arc.total_steps().saturating_sub(1));
            self.advance_locked(&mut arc, &mut progression, step_index, method)
                .await?;
            summary.advanced.push(arc_id);

            if arc.is_complete() {
                self.complete_locked(
                    &mut arc,
                    &mut progression,
                    ArcCompletionResult::Success,
                    "Resolved through world progression",
                    Vec::new(),
                )
                .await?;
                summary.completed.push(arc_id);
            }
        }

        tracing::info!(
            advanced = summary.advanced.len(),
            stalled = summary.stalled.len(),
            completed = summary.completed.len(),
            "Secondary arcs processed"
        );
        Ok(summary)
    }

    // =========================================================================
    // Analysis
    // =========================================================================

    /// Business-rule violations plus the complexity score of one arc.
    pub async fn validate_arc(&self, arc_id: ArcId) -> Result<ArcComplexityReport, ArcError> {
        let arc = self.load(arc_id).await?;
        let links = self.relationships.list_for_arc(arc_id).await?;

        // The predecessor counts unless a stored link already connects the two.
        let implicit = arc
            .predecessor_arc_id()
            .is_some_and(|prev| !links.iter().any(|link| link.involves(prev)));
        let relationships = links.len() as u32 + u32::from(implicit);
        let complexity = calculate_arc_complexity_score(&arc, relationships);
        let progression_violations = match self.progressions.get_for_arc(arc_id).await? {
            Some(progression) => validate_arc_progression_rules(&arc, &progression),
            None => Vec::new(),
        };

        Ok(ArcComplexityReport {
            arc_id,
            should_expand: should_arc_be_expanded(&arc, complexity.score),
            violations: validate_arc_business_rules(&arc),
            progression_violations,
            complexity,
        })
    }
}
