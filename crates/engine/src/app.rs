//! Application state and composition.

use std::sync::Arc;

use crate::infrastructure::{
    clock::{SystemClock, SystemRandom},
    ports::{ClockPort, LlmPort, QuestGeneratorPort, RandomPort, WorldSystemsPort},
    quest_generator::LocalQuestGenerator,
    sqlite::SqliteRepositories,
    world_systems::PlaceholderWorldSystems,
};
use crate::use_cases::arc::{
    ArcGenerator, ArcManager, ArcRelationshipService, ArcUseCases, OutcomeBranchingEngine,
    ProgressionTracker, QuestIntegrationService,
};

/// Main application state.
///
/// Passed to HTTP handlers via Axum state.
pub struct App {
    pub use_cases: ArcUseCases,
}

impl App {
    /// Wire every use case from explicit collaborators.
    pub fn new(
        repos: SqliteRepositories,
        llm: Option<Arc<dyn LlmPort>>,
        world: Arc<dyn WorldSystemsPort>,
        quest_generator: Arc<dyn QuestGeneratorPort>,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
    ) -> Self {
        if llm.is_none() {
            tracing::info!("No LLM configured, arc generation runs in placeholder mode");
        }

        let generator = Arc::new(ArcGenerator::new(llm.clone(), world, clock.clone()));

        let manager = Arc::new(ArcManager::new(
            repos.arc.clone(),
            repos.step.clone(),
            repos.progression.clone(),
            repos.integration.clone(),
            repos.relationship.clone(),
            generator.clone(),
            clock.clone(),
        ));

        let quests = Arc::new(QuestIntegrationService::new(
            repos.step.clone(),
            repos.integration.clone(),
            quest_generator,
            random,
            clock.clone(),
        ));

        let tracker = Arc::new(ProgressionTracker::new(
            repos.arc.clone(),
            repos.progression.clone(),
            repos.integration.clone(),
            clock.clone(),
        ));

        let relationships = Arc::new(ArcRelationshipService::new(
            repos.arc.clone(),
            repos.relationship.clone(),
            OutcomeBranchingEngine::new(llm),
            clock,
        ));

        Self {
            use_cases: ArcUseCases::new(manager, generator, quests, tracker, relationships),
        }
    }

    /// System clock and randomness, placeholder world systems and the local
    /// quest generator.
    pub fn with_defaults(repos: SqliteRepositories, llm: Option<Arc<dyn LlmPort>>) -> Self {
        let clock: Arc<dyn ClockPort> = Arc::new(SystemClock::new());
        let random: Arc<dyn RandomPort> = Arc::new(SystemRandom::new());
        let world: Arc<dyn WorldSystemsPort> =
            Arc::new(PlaceholderWorldSystems::new(random.clone()));
        let quest_generator: Arc<dyn QuestGeneratorPort> =
            Arc::new(LocalQuestGenerator::new(clock.clone()));

        Self::new(repos, llm, world, quest_generator, clock, random)
    }
}
