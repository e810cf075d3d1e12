//! Narrative business rules and complexity heuristics for arcs
//!
//! These checks never block persistence on their own. Callers decide whether a
//! violation is fatal (the API reports them, creation only logs them).

use serde::Serialize;

use crate::entities::{ArcProgression, ArcStatus, ArcType, CompletionCriteria, CriteriaKind, StoryArc};

pub const MIN_TITLE_LEN: usize = 5;
pub const MAX_TITLE_LEN: usize = 100;
pub const MIN_DESCRIPTION_LEN: usize = 20;
pub const PROHIBITED_WORDS: [&str; 4] = ["placeholder", "test", "todo", "fixme"];

/// Allowed gap between the arc's cursor percentage and its completed-step ratio
pub const PROGRESSION_TOLERANCE: f64 = 5.0;

pub const EXPANSION_SCORE: u32 = 25;
pub const EXPANSION_SCORE_WITH_STEPS: u32 = 15;
pub const EXPANSION_STEP_COUNT: u32 = 8;

/// Result of [`calculate_arc_complexity_score`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplexityScore {
    pub score: u32,
    pub factors: Vec<String>,
}

/// All rule violations for an arc, empty when the arc is sound.
pub fn validate_arc_business_rules(arc: &StoryArc) -> Vec<String> {
    let mut violations = Vec::new();
    validate_type_rules(arc, &mut violations);

    if !(1..=10).contains(&arc.difficulty_level()) {
        violations.push(format!(
            "Difficulty level must be between 1 and 10, got {}",
            arc.difficulty_level()
        ));
    }
    if arc.current_step() > arc.total_steps() {
        violations.push(format!(
            "Current step {} exceeds total steps {}",
            arc.current_step(),
            arc.total_steps()
        ));
    }

    // Temporal
    if let Some(deadline) = arc.deadline() {
        if deadline <= arc.created_at() {
            violations.push("Deadline must be after the arc was created".to_string());
        }
    }
    if arc.status() == ArcStatus::Completed && arc.completed_at().is_none() {
        violations.push("Completed arcs must record a completion time".to_string());
    }

    violations.extend(validate_narrative_text(arc.title(), arc.description()));
    violations
}

fn validate_type_rules(arc: &StoryArc, violations: &mut Vec<String>) {
    match arc.arc_type() {
        ArcType::Global => {
            if arc.faction_ids().len() < 2 {
                violations.push("Global arcs must involve at least 2 factions".to_string());
            }
            if let Some(hours) = arc.estimated_duration_hours() {
                if hours < 20.0 {
                    violations.push(format!(
                        "Global arcs must span at least 20 hours, estimated {}",
                        hours
                    ));
                }
            }
        }
        ArcType::Regional => {
            if arc.difficulty_level() > 8 {
                violations.push("Regional arcs cannot exceed difficulty 8".to_string());
            }
            if arc.region_id().is_none() {
                violations.push("Regional arcs must specify a region_id".to_string());
            }
        }
        ArcType::Character => {
            if arc.total_steps() > 10 {
                violations.push("Character arcs cannot exceed 10 steps".to_string());
            }
            if arc.character_id().is_none() {
                violations.push("Character arcs must specify a character_id".to_string());
            }
        }
        ArcType::Npc => {
            if arc.total_steps() > 6 {
                violations.push("NPC arcs cannot exceed 6 steps".to_string());
            }
            if arc.npc_id().is_none() {
                violations.push("NPC arcs must specify an npc_id".to_string());
            }
        }
    }
}

/// Title length, description length and prohibited words.
pub fn validate_narrative_text(title: &str, description: &str) -> Vec<String> {
    let mut violations = Vec::new();
    let title_len = title.trim().chars().count();
    if !(MIN_TITLE_LEN..=MAX_TITLE_LEN).contains(&title_len) {
        violations.push(format!(
            "Title must be between {} and {} characters",
            MIN_TITLE_LEN, MAX_TITLE_LEN
        ));
    }
    if description.trim().chars().count() < MIN_DESCRIPTION_LEN {
        violations.push(format!(
            "Description must be at least {} characters",
            MIN_DESCRIPTION_LEN
        ));
    }
    for (field, text) in [("Title", title), ("Description", description)] {
        if let Some(word) = find_prohibited_word(text) {
            violations.push(format!("{} contains prohibited word '{}'", field, word));
        }
    }
    violations
}

fn find_prohibited_word(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    PROHIBITED_WORDS
        .iter()
        .copied()
        .find(|prohibited| words.contains(prohibited))
}

/// Cross-check an arc against its progression record.
pub fn validate_arc_progression_rules(arc: &StoryArc, progression: &ArcProgression) -> Vec<String> {
    let mut violations = Vec::new();
    let total = arc.total_steps();

    if let Some(out_of_range) = progression
        .completed_steps()
        .iter()
        .chain(progression.failed_steps().iter())
        .find(|index| **index >= total)
    {
        violations.push(format!(
            "Step index {} is outside the arc's {} steps",
            out_of_range, total
        ));
    }

    if total > 0 {
        let recorded = progression.completion_percentage(total);
        if (arc.completion_percentage() - recorded).abs() > PROGRESSION_TOLERANCE {
            violations.push(format!(
                "Arc reports {:.1}% complete but {:.1}% of steps are completed",
                arc.completion_percentage(),
                recorded
            ));
        }
    }
    violations
}

/// Check that a step's completion criteria carry what their kind needs.
pub fn validate_step_completion_criteria(criteria: &CompletionCriteria) -> Vec<String> {
    let mut violations = Vec::new();
    match criteria.kind {
        CriteriaKind::Manual | CriteriaKind::Automatic => {
            if criteria.description.trim().is_empty() {
                violations.push("Completion criteria need a description".to_string());
            }
        }
        CriteriaKind::ConditionBased => {
            if criteria.conditions.is_empty() {
                violations.push("Condition-based criteria need at least one condition".to_string());
            }
        }
        CriteriaKind::TimeBased => {
            if !criteria.required_hours.is_some_and(|h| h > 0.0) {
                violations.push("Time-based criteria need a positive required_hours".to_string());
            }
        }
        CriteriaKind::EventTriggered => {
            if criteria
                .trigger_event
                .as_deref()
                .map_or(true, |e| e.trim().is_empty())
            {
                violations.push("Event-triggered criteria need a trigger_event".to_string());
            }
        }
    }
    violations
}

/// Weighted complexity of an arc.
///
/// `relationship_count` is the number of cross-arc or cross-system relationships
/// the caller knows about (hooks, predecessor links).
pub fn calculate_arc_complexity_score(arc: &StoryArc, relationship_count: u32) -> ComplexityScore {
    let mut score = 0u32;
    let mut factors = Vec::new();

    let difficulty = u32::from(arc.difficulty_level());
    score += difficulty;
    factors.push(format!("difficulty: +{}", difficulty));

    if arc.total_steps() > 5 {
        let bonus = (arc.total_steps() - 5).min(10);
        score += bonus;
        factors.push(format!("steps: +{}", bonus));
    }

    if let Some(hours) = arc.estimated_duration_hours() {
        if hours > 20.0 {
            let bonus = ((hours / 10.0) as u32).min(15);
            score += bonus;
            factors.push(format!("duration: +{}", bonus));
        }
    }

    let factions = arc.faction_ids().len() as u32;
    if factions > 2 {
        let bonus = (factions - 2).min(8);
        score += bonus;
        factors.push(format!("factions: +{}", bonus));
    }

    let type_weight = arc.arc_type().config().complexity_weight;
    score += type_weight;
    factors.push(format!("type {}: +{}", arc.arc_type(), type_weight));

    if relationship_count > 0 {
        let bonus = (relationship_count * 2).min(10);
        score += bonus;
        factors.push(format!("relationships: +{}", bonus));
    }

    ComplexityScore { score, factors }
}

pub fn should_arc_be_expanded(arc: &StoryArc, complexity_score: u32) -> bool {
    complexity_score >= EXPANSION_SCORE
        || (complexity_score >= EXPANSION_SCORE_WITH_STEPS
            && arc.total_steps() > EXPANSION_STEP_COUNT)
        || arc.arc_type() == ArcType::Global
}

/// Rough difficulty for an arc that was generated without one.
pub fn estimate_difficulty(arc_type: ArcType, total_steps: u32, faction_count: usize) -> u8 {
    let base: u32 = match arc_type {
        ArcType::Global => 7,
        ArcType::Regional => 5,
        ArcType::Character => 4,
        ArcType::Npc => 3,
    };
    let estimate = base + total_steps / 4 + (faction_count as u32) / 2;
    estimate.clamp(1, 10) as u8
}

/// Rough play time in hours.
pub fn estimate_duration_hours(arc_type: ArcType, total_steps: u32, difficulty: u8) -> f64 {
    let per_step = match arc_type {
        ArcType::Global => 4.0,
        ArcType::Regional => 3.0,
        ArcType::Character => 2.0,
        ArcType::Npc => 1.5,
    };
    let difficulty_factor = 1.0 + (f64::from(difficulty) - 5.0) * 0.1;
    f64::from(total_steps) * per_step * difficulty_factor
}
