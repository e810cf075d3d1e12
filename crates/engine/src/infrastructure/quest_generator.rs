//! In-process stand-in for the quest subsystem.
//!
//! Mints quest identifiers of the form `quest_{step_id}_{unix_millis}` so arc
//! steps can be wired to quests before a real quest service is attached.

use async_trait::async_trait;
use std::sync::Arc;
use visualdm_domain::{ArcStep, QuestContext};

use crate::infrastructure::ports::{ClockPort, QuestGenError, QuestGeneratorPort};

pub struct LocalQuestGenerator {
    clock: Arc<dyn ClockPort>,
}

impl LocalQuestGenerator {
    pub fn new(clock: Arc<dyn ClockPort>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl QuestGeneratorPort for LocalQuestGenerator {
    async fn generate_quest(
        &self,
        step: &ArcStep,
        context: &QuestContext,
    ) -> Result<Option<String>, QuestGenError> {
        if step.status().is_terminal() {
            tracing::debug!(step_id = %step.id(), "Step already resolved, no quest generated");
            return Ok(None);
        }

        let quest_id = format!(
            "quest_{}_{}",
            step.id(),
            self.clock.now().timestamp_millis()
        );
        tracing::info!(
            step_id = %step.id(),
            quest_id = %quest_id,
            context_keys = context.len(),
            "Generated quest for arc step"
        );
        Ok(Some(quest_id))
    }
}
