//! Value objects - immutable types without identity

mod arc_type_config;
mod quest_context;

pub use arc_type_config::{ArcTypeConfig, ComplexityTier};
pub use quest_context::{ContextValue, QuestContext};
