//! Bridges arc steps to the quest system.
//!
//! A step's tags are scored against the current [`QuestContext`]; the score
//! raises the chance that the step spawns a quest.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use visualdm_domain::{
    ArcCompletionResult, ArcId, ArcQuestMapping, ArcStep, ArcStepId, ArcStepTag, ArcStepType,
    ArcSystemIntegration, QuestContext,
};

use super::ArcError;
use crate::infrastructure::ports::{
    ArcStepRepo, ClockPort, IntegrationRepo, QuestGeneratorPort, RandomPort,
};

/// Name under which quest traffic is tracked in system integration health.
pub const QUEST_SYSTEM: &str = "quest";

pub const LOCATION_MATCH_BOOST: f64 = 0.4;
pub const NPC_MATCH_BOOST: f64 = 0.3;
pub const FACTION_MATCH_BOOST: f64 = 0.2;
pub const SKILL_MATCH_BOOST: f64 = 0.1;
pub const DEFAULT_MATCH_BOOST: f64 = 0.1;

/// Boost for a tag key. The category is the key's first `_`-separated
/// segment, so `npc_type` counts as `npc`.
pub fn tag_boost(key: &str) -> f64 {
    match key.split('_').next().unwrap_or(key) {
        "location" => LOCATION_MATCH_BOOST,
        "npc" => NPC_MATCH_BOOST,
        "faction" => FACTION_MATCH_BOOST,
        "skill" => SKILL_MATCH_BOOST,
        _ => DEFAULT_MATCH_BOOST,
    }
}

// Location proximity is exact equality until the region graph is consulted.
fn tag_matches_context(tag: &ArcStepTag, context: &QuestContext) -> bool {
    tag.matches(context)
}

/// Boosted, coverage-scaled match between a step's tags and a context.
///
/// Required tags are hard gates: one unmet required tag zeroes the score.
pub fn calculate_context_match(step: &ArcStep, context: &QuestContext) -> f64 {
    let tags = step.tags();
    if tags.is_empty() {
        return 0.0;
    }

    let mut boost = 0.0;
    let mut matched = 0usize;
    for tag in tags {
        let hit = tag_matches_context(tag, context);
        if tag.required && !hit {
            return 0.0;
        }
        if hit {
            boost += tag_boost(&tag.key) * tag.weight;
            matched += 1;
        }
    }

    boost * (matched as f64 / tags.len() as f64)
}

/// A candidate step with its chance of spawning a quest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestOpportunity {
    pub step: ArcStep,
    pub context_match_score: f64,
    /// `quest_probability + context_match_score`, not clamped
    pub probability: f64,
}

/// One open step of a specific arc, as listed for the quest system.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArcQuestOpportunity {
    pub step_id: ArcStepId,
    pub step_index: u32,
    pub step_title: String,
    pub step_type: ArcStepType,
    pub quest_probability: f64,
    pub tags: Vec<ArcStepTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_match_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_probability: Option<f64>,
    /// Share of tag weight the context covers, without boosts or gates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_coverage: Option<f64>,
}

pub struct QuestIntegrationService {
    steps: Arc<dyn ArcStepRepo>,
    integrations: Arc<dyn IntegrationRepo>,
    quest_generator: Arc<dyn QuestGeneratorPort>,
    random: Arc<dyn RandomPort>,
    clock: Arc<dyn ClockPort>,
}

impl QuestIntegrationService {
    pub fn new(
        steps: Arc<dyn ArcStepRepo>,
        integrations: Arc<dyn IntegrationRepo>,
        quest_generator: Arc<dyn QuestGeneratorPort>,
        random: Arc<dyn RandomPort>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            steps,
            integrations,
            quest_generator,
            random,
            clock,
        }
    }

    /// Open steps of active arcs that match the context at all.
    pub async fn evaluate_quest_generation_opportunity(
        &self,
        context: &QuestContext,
    ) -> Result<Vec<QuestOpportunity>, ArcError> {
        let candidates = self.steps.list_open_for_quests().await?;

        let opportunities: Vec<_> = candidates
            .into_iter()
            .filter_map(|step| {
                let score = calculate_context_match(&step, context);
                (score > 0.0).then(|| QuestOpportunity {
                    probability: step.quest_probability() + score,
                    context_match_score: score,
                    step,
                })
            })
            .collect();

        tracing::debug!(
            candidates = opportunities.len(),
            "Evaluated quest generation opportunities"
        );
        Ok(opportunities)
    }

    /// Try to spawn a quest from a step.
    ///
    /// Unless `force` is set a uniform draw must land below the step's
    /// quest probability. `Ok(None)` means no quest was produced.
    pub async fn generate_quest_from_arc_step(
        &self,
        step_id: ArcStepId,
        context: &QuestContext,
        force: bool,
    ) -> Result<Option<String>, ArcError> {
        let step = self
            .steps
            .get(step_id)
            .await?
            .ok_or_else(|| ArcError::not_found("ArcStep", step_id))?;

        if !force {
            let draw = self.random.gen_f64();
            if draw >= step.quest_probability() {
                tracing::debug!(step_id = %step_id, draw, "Quest draw missed");
                return Ok(None);
            }
        }

        let now = self.clock.now();
        let mut mapping = match self.integrations.get_mapping_for_step(step_id).await? {
            Some(mapping) => mapping,
            None => ArcQuestMapping::for_step(&step, now),
        };

        let started = Instant::now();
        let outcome = self.quest_generator.generate_quest(&step, context).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.record_quest_event(outcome.is_ok(), elapsed_ms).await;

        let quest_id = match outcome {
            Ok(Some(quest_id)) => quest_id,
            Ok(None) => {
                tracing::info!(step_id = %step_id, "Quest system declined to generate a quest");
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(error = %e, step_id = %step_id, "Quest generation failed");
                return Ok(None);
            }
        };

        mapping.add_generated_quest(quest_id.clone(), now);
        self.integrations.save_mapping(&mapping).await?;

        tracing::info!(
            step_id = %step_id,
            arc_id = %step.arc_id(),
            quest_id = %quest_id,
            "Quest generated from arc step"
        );
        Ok(Some(quest_id))
    }

    /// Arcs that should advance because `quest_id` finished with `outcome`.
    ///
    /// Only `success` moves arcs forward. `failure` and `partial` return nothing.
    pub async fn check_quest_completion_impact(
        &self,
        quest_id: &str,
        outcome: &str,
        context: &QuestContext,
    ) -> Result<Vec<ArcId>, ArcError> {
        let outcome: ArcCompletionResult = outcome.parse()?;

        let started = Instant::now();
        let mappings = self.integrations.list_mappings_for_quest(quest_id).await?;
        self.record_quest_event(true, started.elapsed().as_secs_f64() * 1000.0)
            .await;

        if outcome != ArcCompletionResult::Success {
            tracing::info!(
                quest_id,
                outcome = %outcome,
                "Quest did not succeed, arcs are not advanced"
            );
            return Ok(Vec::new());
        }

        let affected: BTreeSet<ArcId> = mappings.iter().map(|m| m.arc_id()).collect();
        tracing::info!(
            quest_id,
            arcs = affected.len(),
            context_keys = context.len(),
            "Quest completion affects arcs"
        );
        Ok(affected.into_iter().collect())
    }

    /// Open steps of one arc. Scores are only present when a context is given.
    pub async fn get_arc_quest_opportunities(
        &self,
        arc_id: ArcId,
        context: Option<&QuestContext>,
    ) -> Result<Vec<ArcQuestOpportunity>, ArcError> {
        let steps = self.steps.list_for_arc(arc_id).await?;

        Ok(steps
            .into_iter()
            .filter(|step| step.status().is_open_for_quests())
            .map(|step| {
                let score = context.map(|ctx| calculate_context_match(&step, ctx));
                ArcQuestOpportunity {
                    step_id: step.id(),
                    step_index: step.step_index(),
                    step_title: step.title().to_string(),
                    step_type: step.step_type(),
                    quest_probability: step.quest_probability(),
                    tags: step.tags().to_vec(),
                    final_probability: score.map(|s| step.quest_probability() + s),
                    context_match_score: score,
                    tag_coverage: context.map(|ctx| step.calculate_tag_match_score(ctx)),
                }
            })
            .collect())
    }

    // Health bookkeeping must never fail the caller.
    async fn record_quest_event(&self, success: bool, elapsed_ms: f64) {
        let mut integration = match self.integrations.get_integration(QUEST_SYSTEM).await {
            Ok(Some(integration)) => integration,
            Ok(None) => ArcSystemIntegration::new(QUEST_SYSTEM),
            Err(e) => {
                tracing::warn!(error = %e, "Could not load quest integration health");
                return;
            }
        };

        integration.update_metrics(success, elapsed_ms, self.clock.now());
        if let Err(e) = self.integrations.save_integration(&integration).await {
            tracing::warn!(error = %e, "Could not save quest integration health");
        }
    }
}
