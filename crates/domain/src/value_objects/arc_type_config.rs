//! Per-type arc configuration

use serde::Serialize;

use crate::entities::{ArcPriority, ArcType};

/// How involved an arc of a given type is expected to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    Low,
    Medium,
    High,
}

impl ComplexityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityTier::Low => "low",
            ComplexityTier::Medium => "medium",
            ComplexityTier::High => "high",
        }
    }
}

/// Static configuration for an [`ArcType`].
///
/// Feeds generation prompts, stall detection, and the soft limit on how many
/// arcs of one type may run at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ArcTypeConfig {
    pub arc_type: ArcType,
    /// Narrative scope in plain words ("world", "region", ...)
    pub scope: &'static str,
    pub typical_steps: u32,
    pub complexity: ComplexityTier,
    pub default_priority: ArcPriority,
    pub stall_threshold_days: u32,
    /// Logged, never enforced, by arc creation
    pub active_soft_limit: usize,
    /// Weight used by the complexity score
    pub complexity_weight: u32,
}

impl ArcTypeConfig {
    pub fn for_type(arc_type: ArcType) -> Self {
        match arc_type {
            ArcType::Global => Self {
                arc_type,
                scope: "world",
                typical_steps: 10,
                complexity: ComplexityTier::High,
                default_priority: ArcPriority::High,
                stall_threshold_days: 21,
                active_soft_limit: 2,
                complexity_weight: 8,
            },
            ArcType::Regional => Self {
                arc_type,
                scope: "region",
                typical_steps: 6,
                complexity: ComplexityTier::Medium,
                default_priority: ArcPriority::Medium,
                stall_threshold_days: 14,
                active_soft_limit: 5,
                complexity_weight: 4,
            },
            ArcType::Character => Self {
                arc_type,
                scope: "character",
                typical_steps: 5,
                complexity: ComplexityTier::Medium,
                default_priority: ArcPriority::Medium,
                stall_threshold_days: 7,
                active_soft_limit: 10,
                complexity_weight: 1,
            },
            ArcType::Npc => Self {
                arc_type,
                scope: "npc",
                typical_steps: 4,
                complexity: ComplexityTier::Low,
                default_priority: ArcPriority::Low,
                stall_threshold_days: 10,
                active_soft_limit: 20,
                complexity_weight: 2,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stall_thresholds_per_type() {
        assert_eq!(ArcTypeConfig::for_type(ArcType::Character).stall_threshold_days, 7);
        assert_eq!(ArcTypeConfig::for_type(ArcType::Npc).stall_threshold_days, 10);
        assert_eq!(ArcTypeConfig::for_type(ArcType::Regional).stall_threshold_days, 14);
        assert_eq!(ArcTypeConfig::for_type(ArcType::Global).stall_threshold_days, 21);
    }

    #[test]
    fn global_arcs_are_limited_to_two() {
        assert_eq!(ArcType::Global.config().active_soft_limit, 2);
    }
}
