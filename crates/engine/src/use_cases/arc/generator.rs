//! Arc and step content generation.
//!
//! Prompts an LLM for JSON and maps the reply onto domain types. Without an
//! LLM (or when the call fails) a deterministic placeholder keeps the rest of
//! the pipeline usable. A reply that cannot be parsed yields nothing.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use regex_lite::Regex;
use serde::Deserialize;
use visualdm_domain::business_rules::{
    estimate_difficulty, estimate_duration_hours, validate_step_completion_criteria,
};
use visualdm_domain::{
    ArcCompletionRecord, ArcStep, ArcStepTag, ArcStepType, ArcType, CompletionCriteria, StoryArc,
};

use crate::infrastructure::ports::{
    ChatMessage, ClockPort, LlmPort, LlmRequest, WorldSystemsPort,
};

const ARC_SYSTEM_PROMPT: &str = "You are a narrative designer for a tabletop RPG. \
Reply with a single JSON value and nothing else.";

static FENCED_JSON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("valid regex"));

/// Scope and hints a generated arc should be grounded in.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenerationContext {
    pub region_id: Option<String>,
    pub character_id: Option<String>,
    pub npc_id: Option<String>,
    pub faction_ids: Vec<String>,
    /// Free-form world facts ("season" => "winter", ...)
    pub notes: BTreeMap<String, String>,
}

impl GenerationContext {
    /// Scope of an existing arc, with no notes.
    pub fn from_arc(arc: &StoryArc) -> Self {
        Self {
            region_id: arc.region_id().map(str::to_string),
            character_id: arc.character_id().map(str::to_string),
            npc_id: arc.npc_id().map(str::to_string),
            faction_ids: arc.faction_ids().to_vec(),
            notes: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ArcDraft {
    title: String,
    description: String,
    #[serde(default)]
    starting_point: String,
    #[serde(default)]
    preferred_ending: String,
    #[serde(default)]
    difficulty_level: Option<u8>,
    #[serde(default)]
    faction_ids: Vec<String>,
    #[serde(default)]
    themes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StepDraft {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    narrative_text: String,
    #[serde(default)]
    step_type: Option<String>,
    #[serde(default)]
    completion_criteria: Option<serde_json::Value>,
    #[serde(default)]
    tags: Vec<TagDraft>,
    #[serde(default)]
    quest_probability: Option<f64>,
    #[serde(default, alias = "estimated_duration")]
    estimated_duration_hours: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TagDraft {
    key: String,
    value: serde_json::Value,
    #[serde(default)]
    weight: Option<f64>,
    #[serde(default)]
    required: bool,
}

pub struct ArcGenerator {
    llm: Option<Arc<dyn LlmPort>>,
    world: Arc<dyn WorldSystemsPort>,
    clock: Arc<dyn ClockPort>,
}

impl ArcGenerator {
    pub fn new(
        llm: Option<Arc<dyn LlmPort>>,
        world: Arc<dyn WorldSystemsPort>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self { llm, world, clock }
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    /// Generate a new arc of `arc_type`.
    ///
    /// Returns `None` only when the LLM replied with something unparseable.
    pub async fn generate_arc(
        &self,
        arc_type: ArcType,
        context: &GenerationContext,
        previous_arcs: &[StoryArc],
        custom_requirements: &BTreeMap<String, String>,
    ) -> Option<StoryArc> {
        let Some(llm) = &self.llm else {
            return Some(self.placeholder_arc(arc_type, context));
        };

        let world = self.describe_world(context).await;
        let prompt =
            build_arc_prompt(arc_type, context, &world, previous_arcs, custom_requirements);
        let request = LlmRequest::new(vec![ChatMessage::user(prompt)])
            .with_system_prompt(ARC_SYSTEM_PROMPT)
            .with_temperature(0.8)
            .with_max_tokens(1200)
            .expecting_json();

        match llm.generate(request).await {
            Ok(response) => match parse_json::<ArcDraft>(&response.content) {
                Some(draft) => Some(self.arc_from_draft(draft, arc_type, context)),
                None => {
                    tracing::warn!(arc_type = %arc_type, "Unparseable arc reply from LLM");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, arc_type = %arc_type, "LLM unavailable, using placeholder arc");
                Some(self.placeholder_arc(arc_type, context))
            }
        }
    }

    /// Steps for an arc, indexed from 0.
    pub async fn generate_arc_steps(
        &self,
        arc: &StoryArc,
        step_count: Option<u32>,
        context: &GenerationContext,
    ) -> Vec<ArcStep> {
        self.generate_steps_from(arc, 0, step_count, context).await
    }

    /// Steps continuing from the arc's current position.
    pub async fn generate_next_arc_steps(
        &self,
        arc: &StoryArc,
        context: &GenerationContext,
        step_count: Option<u32>,
    ) -> Vec<ArcStep> {
        self.generate_steps_from(arc, arc.current_step(), step_count, context)
            .await
    }

    /// A follow-up arc seeded with how `completed` resolved.
    pub async fn generate_successor_arc(
        &self,
        completed: &StoryArc,
        completion: Option<&ArcCompletionRecord>,
    ) -> Option<StoryArc> {
        let mut context = GenerationContext::from_arc(completed);
        context
            .notes
            .insert("previous_arc".into(), completed.title().to_string());
        if let Some(record) = completion {
            context.notes.insert(
                "previous_outcome".into(),
                record.completion_result().to_string(),
            );
            context
                .notes
                .insert("narrative_outcome".into(), record.narrative_outcome().to_string());
            if !record.world_consequences().is_empty() {
                context.notes.insert(
                    "world_consequences".into(),
                    record.world_consequences().join("; "),
                );
            }
            if !record.affected_regions().is_empty() {
                context
                    .notes
                    .insert("affected_regions".into(), record.affected_regions().join(", "));
            }
        }

        let arc = self
            .generate_arc(
                completed.arc_type(),
                &context,
                std::slice::from_ref(completed),
                &BTreeMap::new(),
            )
            .await?;
        Some(arc.with_predecessor(completed.id()))
    }

    async fn generate_steps_from(
        &self,
        arc: &StoryArc,
        first_index: u32,
        step_count: Option<u32>,
        context: &GenerationContext,
    ) -> Vec<ArcStep> {
        let count = step_count
            .unwrap_or_else(|| arc.arc_type().config().typical_steps)
            .max(1);

        let Some(llm) = &self.llm else {
            return self.placeholder_steps(arc, first_index, count);
        };

        let prompt = build_steps_prompt(arc, first_index, count, context);
        let request = LlmRequest::new(vec![ChatMessage::user(prompt)])
            .with_system_prompt(ARC_SYSTEM_PROMPT)
            .with_temperature(0.7)
            .with_max_tokens(2000)
            .expecting_json();

        match llm.generate(request).await {
            Ok(response) => match parse_step_drafts(&response.content) {
                Some(drafts) => drafts
                    .into_iter()
                    .take(count as usize)
                    .zip(first_index..)
                    .map(|(draft, index)| self.step_from_draft(arc, index, draft))
                    .collect(),
                None => {
                    tracing::warn!(arc_id = %arc.id(), "Unparseable step reply from LLM");
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, arc_id = %arc.id(), "LLM unavailable, using placeholder steps");
                self.placeholder_steps(arc, first_index, count)
            }
        }
    }

    async fn describe_world(&self, context: &GenerationContext) -> Vec<String> {
        let mut lines = Vec::new();

        if let Some(region_id) = &context.region_id {
            match self.world.region_summary(region_id).await {
                Ok(region) => lines.push(format!(
                    "{}: {} climate, tensions: {}",
                    region.name,
                    region.climate,
                    region.tensions.join(", ")
                )),
                Err(e) => tracing::debug!(error = %e, "Region summary unavailable"),
            }
        }
        if let Some(npc_id) = &context.npc_id {
            match self.world.npc_summary(npc_id).await {
                Ok(npc) => lines.push(format!(
                    "{}: {}, wants to {}",
                    npc.name,
                    npc.personality,
                    npc.goals.join(" and ")
                )),
                Err(e) => tracing::debug!(error = %e, "NPC summary unavailable"),
            }
        }
        for faction_id in &context.faction_ids {
            match self.world.faction_summary(faction_id).await {
                Ok(faction) => lines.push(format!(
                    "{} (power {}): seeks to {}",
                    faction.name, faction.power_level, faction.agenda
                )),
                Err(e) => tracing::debug!(error = %e, "Faction summary unavailable"),
            }
        }

        lines
    }

    fn arc_from_draft(
        &self,
        draft: ArcDraft,
        arc_type: ArcType,
        context: &GenerationContext,
    ) -> StoryArc {
        let mut factions = context.faction_ids.clone();
        for faction in draft.faction_ids {
            if !factions.contains(&faction) {
                factions.push(faction);
            }
        }

        let difficulty = draft
            .difficulty_level
            .filter(|d| (1..=10).contains(d))
            .unwrap_or_else(|| {
                estimate_difficulty(arc_type, arc_type.config().typical_steps, factions.len())
            });

        self.scaffold_arc(draft.title, draft.description, arc_type, context, factions, difficulty)
            .with_starting_point(draft.starting_point)
            .with_preferred_ending(draft.preferred_ending)
            .with_themes(draft.themes)
            .with_classification_tag("source", "llm")
    }

    fn placeholder_arc(&self, arc_type: ArcType, context: &GenerationContext) -> StoryArc {
        let config = arc_type.config();
        let factions = context.faction_ids.clone();
        let difficulty = estimate_difficulty(arc_type, config.typical_steps, factions.len());
        let label = capitalize(config.scope);

        self.scaffold_arc(
            format!("The Unfolding {} Tale", label),
            format!(
                "A {}-scale story whose details will be written as play continues.",
                config.scope
            ),
            arc_type,
            context,
            factions,
            difficulty,
        )
        .with_starting_point("An unresolved tension surfaces")
        .with_preferred_ending("The tension is resolved one way or another")
        .with_classification_tag("source", "fallback")
    }

    fn scaffold_arc(
        &self,
        title: String,
        description: String,
        arc_type: ArcType,
        context: &GenerationContext,
        factions: Vec<String>,
        difficulty: u8,
    ) -> StoryArc {
        let steps = arc_type.config().typical_steps;
        let mut arc = StoryArc::new(title, description, arc_type, self.clock.now())
            .with_total_steps(steps)
            .with_faction_ids(factions)
            .with_difficulty_level(difficulty)
            .with_estimated_duration_hours(estimate_duration_hours(arc_type, steps, difficulty));

        if let Some(region_id) = &context.region_id {
            arc = arc.with_region_id(region_id.clone());
        }
        if let Some(character_id) = &context.character_id {
            arc = arc.with_character_id(character_id.clone());
        }
        if let Some(npc_id) = &context.npc_id {
            arc = arc.with_npc_id(npc_id.clone());
        }
        arc
    }

    fn step_from_draft(&self, arc: &StoryArc, index: u32, draft: StepDraft) -> ArcStep {
        let step_type = draft
            .step_type
            .as_deref()
            .and_then(|s| s.to_lowercase().parse::<ArcStepType>().ok())
            .unwrap_or_default();

        let criteria = match draft.completion_criteria {
            Some(serde_json::Value::String(text)) => CompletionCriteria::manual(text),
            Some(value) => serde_json::from_value(value.clone())
                .unwrap_or_else(|_| CompletionCriteria::manual(value.to_string())),
            None => CompletionCriteria::manual(&draft.title),
        };
        // Criteria missing what their kind needs degrade to a manual check.
        let criteria = if validate_step_completion_criteria(&criteria).is_empty() {
            criteria
        } else {
            tracing::debug!(step = %draft.title, kind = ?criteria.kind, "Incomplete criteria from LLM");
            CompletionCriteria::manual(&draft.title)
        };

        let tags = draft
            .tags
            .into_iter()
            .map(|tag| {
                let value = match tag.value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                let mut built = ArcStepTag::new(tag.key, value);
                if let Some(weight) = tag.weight.filter(|w| *w > 0.0) {
                    built = built.with_weight(weight);
                }
                if tag.required {
                    built = built.required();
                }
                built
            })
            .collect();

        let mut step = ArcStep::new(arc.id(), index, draft.title, self.clock.now())
            .with_description(draft.description)
            .with_narrative_text(draft.narrative_text)
            .with_step_type(step_type)
            .with_completion_criteria(criteria)
            .with_tags(tags);
        if let Some(probability) = draft.quest_probability {
            step = step.with_quest_probability(probability);
        }
        if let Some(hours) = draft.estimated_duration_hours {
            step = step.with_estimated_duration_hours(hours);
        }
        step
    }

    fn placeholder_steps(&self, arc: &StoryArc, first_index: u32, count: u32) -> Vec<ArcStep> {
        const BEATS: [(&str, ArcStepType); 5] = [
            ("Uncover the first sign", ArcStepType::Discovery),
            ("Seek out those involved", ArcStepType::Interaction),
            ("Face the obstacle", ArcStepType::Challenge),
            ("Choose a side", ArcStepType::Decision),
            ("See the consequences unfold", ArcStepType::Narrative),
        ];
        let now = self.clock.now();

        (first_index..first_index + count)
            .map(|index| {
                let (beat, step_type) = BEATS[index as usize % BEATS.len()];
                let mut step =
                    ArcStep::new(arc.id(), index, format!("{}: {}", index + 1, beat), now)
                        .with_step_type(step_type)
                        .with_completion_criteria(CompletionCriteria::manual(beat));
                if let Some(region_id) = arc.region_id() {
                    step = step.with_tag(ArcStepTag::new("location", region_id));
                }
                if let Some(npc_id) = arc.npc_id() {
                    step = step.with_tag(ArcStepTag::new("npc", npc_id));
                }
                step
            })
            .collect()
    }
}

fn build_arc_prompt(
    arc_type: ArcType,
    context: &GenerationContext,
    world: &[String],
    previous_arcs: &[StoryArc],
    custom_requirements: &BTreeMap<String, String>,
) -> String {
    let config = arc_type.config();
    let mut prompt = format!(
        "Create a {} story arc.\n\
         Scope: {}\nTypical step count: {}\nComplexity: {}\nPriority: {}\n",
        arc_type.as_str(),
        config.scope,
        config.typical_steps,
        config.complexity.as_str(),
        config.default_priority,
    );

    if !world.is_empty() {
        prompt.push_str("\nWorld state:\n");
        for line in world {
            prompt.push_str(&format!("- {}\n", line));
        }
    }
    if !context.notes.is_empty() {
        prompt.push_str("\nContext:\n");
        for (key, value) in &context.notes {
            prompt.push_str(&format!("- {}: {}\n", key, value));
        }
    }
    if !previous_arcs.is_empty() {
        prompt.push_str("\nPrevious arcs:\n");
        for arc in previous_arcs {
            prompt.push_str(&format!("- {} ({}): {}\n", arc.title(), arc.status(), arc.description()));
        }
    }
    if !custom_requirements.is_empty() {
        prompt.push_str("\nRequirements:\n");
        for (key, value) in custom_requirements {
            prompt.push_str(&format!("- {}: {}\n", key, value));
        }
    }

    prompt.push_str(
        "\nRespond with JSON: {\"title\": ..., \"description\": ..., \
         \"starting_point\": ..., \"preferred_ending\": ..., \
         \"difficulty_level\": 1-10, \"faction_ids\": [...], \"themes\": [...]}",
    );
    prompt
}

fn build_steps_prompt(
    arc: &StoryArc,
    first_index: u32,
    count: u32,
    context: &GenerationContext,
) -> String {
    let mut prompt = format!(
        "Write {} steps for the {} arc \"{}\".\n{}\n\
         Starting point: {}\nPreferred ending: {}\n\
         Steps so far: {} of {}. Number the new steps from {}.\n",
        count,
        arc.arc_type().as_str(),
        arc.title(),
        arc.description(),
        arc.starting_point(),
        arc.preferred_ending(),
        arc.current_step(),
        arc.total_steps(),
        first_index,
    );
    for (key, value) in &context.notes {
        prompt.push_str(&format!("- {}: {}\n", key, value));
    }
    prompt.push_str(
        "\nRespond with a JSON object {\"steps\": [...]} whose items have keys: title, narrative_text, \
         step_type (discovery|challenge|decision|interaction|narrative|exploration), \
         completion_criteria, tags ([{\"key\", \"value\", \"weight\", \"required\"}]), \
         quest_probability (0-1), estimated_duration (hours).",
    );
    prompt
}

/// Pull the JSON payload out of an LLM reply: a fenced block if present,
/// otherwise the outermost braces or brackets.
fn extract_json(content: &str) -> Option<&str> {
    if let Some(captures) = FENCED_JSON_RE.captures(content) {
        if let Some(inner) = captures.get(1) {
            return Some(inner.as_str().trim());
        }
    }

    let start = content.find(['{', '['])?;
    let closing = if content[start..].starts_with('{') { '}' } else { ']' };
    let end = content.rfind(closing)?;
    (end > start).then(|| &content[start..=end])
}

pub(super) fn parse_json<T: serde::de::DeserializeOwned>(content: &str) -> Option<T> {
    serde_json::from_str(extract_json(content)?).ok()
}

fn parse_step_drafts(content: &str) -> Option<Vec<StepDraft>> {
    let value: serde_json::Value = parse_json(content)?;
    let array = match value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(mut map) => map.remove("steps")?,
        _ => return None,
    };
    serde_json::from_value(array).ok()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::{FixedClock, FixedRandom};
    use crate::infrastructure::ports::{
        FinishReason, LlmError, LlmResponse, MockLlmPort, OutputFormat,
    };
    use crate::infrastructure::world_systems::PlaceholderWorldSystems;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;
    use visualdm_domain::{ArcStatus, CriteriaKind};

    /// Returns canned replies and records prompts.
    struct ScriptedLlm {
        reply: Result<String, LlmError>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn replying(content: &str) -> Self {
            Self {
                reply: Ok(content.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(LlmError::RequestFailed("connection refused".into())),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmPort for ScriptedLlm {
        async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
            if let Some(message) = request.messages.first() {
                self.prompts.lock().unwrap().push(message.content.clone());
            }
            self.reply.clone().map(|content| LlmResponse {
                content,
                finish_reason: FinishReason::Stop,
                usage: None,
            })
        }
    }

    fn generator(llm: Option<Arc<dyn LlmPort>>) -> ArcGenerator {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        ArcGenerator::new(
            llm,
            Arc::new(PlaceholderWorldSystems::new(Arc::new(FixedRandom(0.0)))),
            Arc::new(FixedClock(now)),
        )
    }

    #[tokio::test]
    async fn without_llm_returns_placeholder_arc() {
        let generator = generator(None);
        let context = GenerationContext {
            character_id: Some("pc-1".into()),
            ..Default::default()
        };

        let arc = generator
            .generate_arc(ArcType::Character, &context, &[], &BTreeMap::new())
            .await
            .unwrap();

        assert_eq!(arc.arc_type(), ArcType::Character);
        assert_eq!(arc.status(), ArcStatus::Pending);
        assert_eq!(arc.total_steps(), 5);
        assert_eq!(arc.character_id(), Some("pc-1"));
        assert_eq!(arc.classification_tags().get("source").map(String::as_str), Some("fallback"));
    }

    #[tokio::test]
    async fn parses_fenced_json_reply() {
        let llm = Arc::new(ScriptedLlm::replying(
            "Here you go:\n```json\n{\"title\": \"The Salt Road\", \
             \"description\": \"Smugglers choke the coastal trade\", \
             \"starting_point\": \"A caravan vanishes\", \
             \"preferred_ending\": \"The road reopens\", \
             \"faction_ids\": [\"guild\"]}\n```",
        ));
        let generator = generator(Some(llm.clone()));
        let context = GenerationContext {
            region_id: Some("coast".into()),
            ..Default::default()
        };
        let requirements = BTreeMap::from([("tone".to_string(), "grim".to_string())]);

        let arc = generator
            .generate_arc(ArcType::Regional, &context, &[], &requirements)
            .await
            .unwrap();

        assert_eq!(arc.title(), "The Salt Road");
        assert_eq!(arc.starting_point(), "A caravan vanishes");
        assert_eq!(arc.region_id(), Some("coast"));
        assert_eq!(arc.faction_ids(), ["guild".to_string()]);

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].contains("Scope: region"));
        assert!(prompts[0].contains("tone: grim"));
        assert!(prompts[0].contains("Region coast"));
    }

    #[tokio::test]
    async fn malformed_reply_yields_none() {
        let llm = Arc::new(ScriptedLlm::replying("I would rather not."));
        let generator = generator(Some(llm));

        let arc = generator
            .generate_arc(ArcType::Npc, &GenerationContext::default(), &[], &BTreeMap::new())
            .await;

        assert!(arc.is_none());
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_placeholder() {
        let generator = generator(Some(Arc::new(ScriptedLlm::failing())));

        let arc = generator
            .generate_arc(ArcType::Global, &GenerationContext::default(), &[], &BTreeMap::new())
            .await
            .unwrap();

        assert_eq!(arc.total_steps(), 10);
    }

    #[tokio::test]
    async fn steps_are_indexed_from_current_position() {
        let llm = Arc::new(ScriptedLlm::replying(
            r#"{"steps": [
                {"title": "Bribe the harbormaster", "step_type": "INTERACTION",
                 "tags": [{"key": "location", "value": "docks", "required": true},
                          {"key": "skill", "value": "persuasion", "weight": 0.6}],
                 "quest_probability": 0.5, "estimated_duration": 2},
                {"title": "Board the ghost ship", "completion_criteria": "Reach the hold"}
            ]}"#,
        ));
        let generator = generator(Some(llm));
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut arc = StoryArc::new(
            "The Salt Road",
            "Smugglers choke the coastal trade",
            ArcType::Regional,
            now,
        )
        .with_total_steps(6);
        arc.activate(now).unwrap();
        arc.advance_step(now).unwrap();
        arc.advance_step(now).unwrap();

        let steps = generator
            .generate_next_arc_steps(&arc, &GenerationContext::default(), Some(2))
            .await;

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step_index(), 2);
        assert_eq!(steps[1].step_index(), 3);
        assert_eq!(steps[0].step_type(), ArcStepType::Interaction);
        assert_eq!(steps[0].tags().len(), 2);
        assert!(steps[0].tags()[0].required);
        assert_eq!(steps[0].quest_probability(), 0.5);
        assert_eq!(steps[1].completion_criteria().description, "Reach the hold");
    }

    #[tokio::test]
    async fn generation_requests_json_output() {
        let mut llm = MockLlmPort::new();
        llm.expect_generate()
            .withf(|request| request.output == OutputFormat::Json)
            .times(2)
            .returning(|_| {
                Ok(LlmResponse {
                    content: r#"{"title": "Tidewatch", "description": "The lighthouse goes dark"}"#
                        .to_string(),
                    finish_reason: FinishReason::Stop,
                    usage: None,
                })
            });
        let generator = generator(Some(Arc::new(llm)));

        let arc = generator
            .generate_arc(ArcType::Regional, &GenerationContext::default(), &[], &BTreeMap::new())
            .await
            .unwrap();
        generator
            .generate_arc_steps(&arc, Some(1), &GenerationContext::default())
            .await;

        assert_eq!(arc.title(), "Tidewatch");
    }

    #[tokio::test]
    async fn criteria_missing_their_payload_become_manual() {
        let llm = Arc::new(ScriptedLlm::replying(
            r#"{"steps": [
                {"title": "Wait out the siege", "completion_criteria": {"kind": "time_based"}},
                {"title": "Hear the horn", "completion_criteria":
                    {"kind": "event_triggered", "trigger_event": "horn_sounded"}}
            ]}"#,
        ));
        let generator = generator(Some(llm));
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let arc = StoryArc::new("The Long Siege", "Walls hold, barely", ArcType::Regional, now);

        let steps = generator
            .generate_arc_steps(&arc, Some(2), &GenerationContext::default())
            .await;

        assert_eq!(steps[0].completion_criteria().kind, CriteriaKind::Manual);
        assert_eq!(steps[0].completion_criteria().description, "Wait out the siege");
        assert_eq!(steps[1].completion_criteria().kind, CriteriaKind::EventTriggered);
    }

    #[tokio::test]
    async fn placeholder_steps_cover_requested_count() {
        let generator = generator(None);
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let arc = StoryArc::new("The Salt Road", "Smugglers", ArcType::Regional, now)
            .with_region_id("coast");

        let steps = generator
            .generate_arc_steps(&arc, Some(3), &GenerationContext::default())
            .await;

        let indices: Vec<_> = steps.iter().map(|s| s.step_index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(steps[0].tags()[0].key, "location");
    }

    #[tokio::test]
    async fn successor_points_back_to_predecessor() {
        let generator = generator(None);
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let completed = StoryArc::new("The Salt Road", "Smugglers", ArcType::Regional, now)
            .with_region_id("coast");

        let successor = generator
            .generate_successor_arc(&completed, None)
            .await
            .unwrap();

        assert_eq!(successor.predecessor_arc_id(), Some(completed.id()));
        assert_eq!(successor.region_id(), Some("coast"));
    }

    #[test]
    fn extracts_bare_json_from_prose() {
        assert_eq!(
            extract_json("Sure! {\"title\": \"x\"} Enjoy."),
            Some("{\"title\": \"x\"}")
        );
        assert_eq!(extract_json("[1, 2]"), Some("[1, 2]"));
        assert_eq!(extract_json("no json here"), None);
    }
}
