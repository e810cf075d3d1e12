//! SQLite storage for quest mappings, system hooks and integration health.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};
use visualdm_domain::{
    ArcId, ArcQuestMapping, ArcStepId, ArcSystemIntegration, SystemHookConfiguration,
};

use super::{from_json, to_json};
use crate::infrastructure::ports::{IntegrationRepo, RepoError};

pub struct SqliteIntegrationRepo {
    pool: SqlitePool,
}

impl SqliteIntegrationRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    row: &SqliteRow,
    operation: &'static str,
) -> Result<T, RepoError> {
    let data: String = row
        .try_get("data")
        .map_err(|e| RepoError::database(operation, e))?;
    from_json(&data)
}

pub(super) async fn upsert_hook<'e, E>(
    executor: E,
    hook: &SystemHookConfiguration,
) -> Result<(), RepoError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO arc_system_hooks (id, arc_id, system_name, data)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            system_name = excluded.system_name,
            data = excluded.data
        "#,
    )
    .bind(hook.id.to_string())
    .bind(hook.arc_id.to_string())
    .bind(&hook.system_name)
    .bind(to_json(hook)?)
    .execute(executor)
    .await
    .map_err(|e| RepoError::database("save_hook", e))?;
    Ok(())
}

#[async_trait]
impl IntegrationRepo for SqliteIntegrationRepo {
    async fn get_mapping_for_step(
        &self,
        step_id: ArcStepId,
    ) -> Result<Option<ArcQuestMapping>, RepoError> {
        let row = sqlx::query("SELECT data FROM arc_quest_mappings WHERE step_id = ?")
            .bind(step_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("get_mapping", e))?;

        row.as_ref().map(|r| decode(r, "get_mapping")).transpose()
    }

    async fn save_mapping(&self, mapping: &ArcQuestMapping) -> Result<(), RepoError> {
        let mapping_id = mapping.id().to_string();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("save_mapping", e))?;

        sqlx::query(
            r#"
            INSERT INTO arc_quest_mappings (id, arc_id, step_id, data)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET data = excluded.data
            "#,
        )
        .bind(&mapping_id)
        .bind(mapping.arc_id().to_string())
        .bind(mapping.step_id().to_string())
        .bind(to_json(mapping)?)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepoError::database("save_mapping", e))?;

        // Quest index is rebuilt from the mapping on every save
        sqlx::query("DELETE FROM arc_mapping_quests WHERE mapping_id = ?")
            .bind(&mapping_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepoError::database("save_mapping", e))?;

        for quest_id in mapping.generated_quests() {
            sqlx::query("INSERT INTO arc_mapping_quests (mapping_id, quest_id) VALUES (?, ?)")
                .bind(&mapping_id)
                .bind(quest_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| RepoError::database("save_mapping", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| RepoError::database("save_mapping", e))?;
        Ok(())
    }

    async fn list_mappings_for_quest(
        &self,
        quest_id: &str,
    ) -> Result<Vec<ArcQuestMapping>, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT m.data FROM arc_quest_mappings m
            JOIN arc_mapping_quests q ON q.mapping_id = m.id
            WHERE q.quest_id = ?
            "#,
        )
        .bind(quest_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("list_mappings_for_quest", e))?;

        rows.iter()
            .map(|row| decode(row, "list_mappings_for_quest"))
            .collect()
    }

    async fn list_mappings_for_arc(
        &self,
        arc_id: ArcId,
    ) -> Result<Vec<ArcQuestMapping>, RepoError> {
        let rows = sqlx::query("SELECT data FROM arc_quest_mappings WHERE arc_id = ?")
            .bind(arc_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::database("list_mappings_for_arc", e))?;

        rows.iter()
            .map(|row| decode(row, "list_mappings_for_arc"))
            .collect()
    }

    async fn save_hook(&self, hook: &SystemHookConfiguration) -> Result<(), RepoError> {
        upsert_hook(&self.pool, hook).await
    }

    async fn list_hooks_for_arc(
        &self,
        arc_id: ArcId,
    ) -> Result<Vec<SystemHookConfiguration>, RepoError> {
        let rows =
            sqlx::query("SELECT data FROM arc_system_hooks WHERE arc_id = ? ORDER BY system_name")
                .bind(arc_id.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| RepoError::database("list_hooks", e))?;

        rows.iter().map(|row| decode(row, "list_hooks")).collect()
    }

    async fn get_integration(
        &self,
        system_name: &str,
    ) -> Result<Option<ArcSystemIntegration>, RepoError> {
        let row = sqlx::query("SELECT data FROM arc_system_integrations WHERE system_name = ?")
            .bind(system_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("get_integration", e))?;

        row.as_ref().map(|r| decode(r, "get_integration")).transpose()
    }

    async fn save_integration(&self, integration: &ArcSystemIntegration) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO arc_system_integrations (system_name, data)
            VALUES (?, ?)
            ON CONFLICT(system_name) DO UPDATE SET data = excluded.data
            "#,
        )
        .bind(&integration.system_name)
        .bind(to_json(integration)?)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("save_integration", e))?;
        Ok(())
    }

    async fn list_integrations(&self) -> Result<Vec<ArcSystemIntegration>, RepoError> {
        let rows = sqlx::query("SELECT data FROM arc_system_integrations ORDER BY system_name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::database("list_integrations", e))?;

        rows.iter()
            .map(|row| decode(row, "list_integrations"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::memory_repositories;
    use super::*;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn mappings_are_found_by_generated_quest() {
        let repos = memory_repositories().await;
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let arc_id = ArcId::new();
        let step_id = ArcStepId::new();

        let mut mapping = ArcQuestMapping::new(arc_id, step_id, now);
        repos.integration.save_mapping(&mapping).await.unwrap();
        assert!(repos
            .integration
            .list_mappings_for_quest("quest_a")
            .await
            .unwrap()
            .is_empty());

        mapping.add_generated_quest("quest_a", now);
        repos.integration.save_mapping(&mapping).await.unwrap();

        let found = repos
            .integration
            .list_mappings_for_quest("quest_a")
            .await
            .unwrap();
        assert_eq!(found, vec![mapping.clone()]);
        assert_eq!(
            repos.integration.get_mapping_for_step(step_id).await.unwrap(),
            Some(mapping)
        );
        assert_eq!(repos.integration.list_mappings_for_arc(arc_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn integration_health_is_upserted_by_system_name() {
        let repos = memory_repositories().await;
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let mut integration = ArcSystemIntegration::new("quest");
        repos.integration.save_integration(&integration).await.unwrap();
        integration.update_metrics(false, 120.0, now);
        repos.integration.save_integration(&integration).await.unwrap();

        let stored = repos.integration.get_integration("quest").await.unwrap().unwrap();
        assert_eq!(stored.total_events, 1);
        assert_eq!(repos.integration.list_integrations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn hooks_are_listed_per_arc() {
        let repos = memory_repositories().await;
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let arc_id = ArcId::new();

        repos
            .integration
            .save_hook(&SystemHookConfiguration::new(arc_id, "npc", now))
            .await
            .unwrap();
        repos
            .integration
            .save_hook(&SystemHookConfiguration::new(ArcId::new(), "faction", now))
            .await
            .unwrap();

        let hooks = repos.integration.list_hooks_for_arc(arc_id).await.unwrap();
        assert_eq!(hooks.len(), 1);
        assert_eq!(hooks[0].system_name, "npc");
    }
}
