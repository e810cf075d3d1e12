//! Placeholder NPC/region/faction data used when no real world system is wired.

use async_trait::async_trait;
use std::sync::Arc;

use crate::infrastructure::ports::{
    FactionSummary, NpcSummary, RandomPort, RegionSummary, WorldSystemError, WorldSystemsPort,
};

const PERSONALITIES: [&str; 5] = ["cautious", "ambitious", "loyal", "secretive", "reckless"];
const GOALS: [&str; 5] = [
    "protect their family",
    "settle an old debt",
    "rise in standing",
    "uncover a hidden truth",
    "escape their past",
];
const CLIMATES: [&str; 4] = ["temperate", "arid", "frozen", "humid"];
const TENSIONS: [&str; 5] = [
    "border raids",
    "failing harvests",
    "a disputed succession",
    "smuggling rings",
    "religious unrest",
];
const AGENDAS: [&str; 4] = [
    "expand trade routes",
    "seize political power",
    "guard ancient secrets",
    "overthrow the current order",
];

/// Randomized stand-in for the sibling world systems.
pub struct PlaceholderWorldSystems {
    random: Arc<dyn RandomPort>,
}

impl PlaceholderWorldSystems {
    pub fn new(random: Arc<dyn RandomPort>) -> Self {
        Self { random }
    }

    fn pick<'a>(&self, options: &[&'a str]) -> &'a str {
        let max = options.len().saturating_sub(1) as i32;
        let index = self.random.gen_range(0, max).clamp(0, max) as usize;
        options[index]
    }
}

#[async_trait]
impl WorldSystemsPort for PlaceholderWorldSystems {
    async fn npc_summary(&self, npc_id: &str) -> Result<NpcSummary, WorldSystemError> {
        Ok(NpcSummary {
            id: npc_id.to_string(),
            name: format!("NPC {}", npc_id),
            personality: self.pick(&PERSONALITIES).to_string(),
            goals: vec![self.pick(&GOALS).to_string()],
        })
    }

    async fn region_summary(&self, region_id: &str) -> Result<RegionSummary, WorldSystemError> {
        Ok(RegionSummary {
            id: region_id.to_string(),
            name: format!("Region {}", region_id),
            climate: self.pick(&CLIMATES).to_string(),
            tensions: vec![self.pick(&TENSIONS).to_string()],
        })
    }

    async fn faction_summary(&self, faction_id: &str) -> Result<FactionSummary, WorldSystemError> {
        Ok(FactionSummary {
            id: faction_id.to_string(),
            name: format!("Faction {}", faction_id),
            agenda: self.pick(&AGENDAS).to_string(),
            power_level: self.random.gen_range(1, 10),
        })
    }
}
