//! SQLite arc storage, including the arc-level units of work.

use async_trait::async_trait;
use sqlx::{Row, Sqlite, SqlitePool};
use visualdm_domain::{
    ArcCompletionRecord, ArcId, ArcProgression, ArcStatus, ArcStep, ArcType, StoryArc,
    SystemHookConfiguration,
};

use super::integration_repo::upsert_hook;
use super::step_repo::upsert_step;
use super::{from_json, timestamp, to_json};
use crate::infrastructure::ports::{ArcFilter, ArcRepo, RepoError};

pub struct SqliteArcRepo {
    pool: SqlitePool,
}

impl SqliteArcRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

async fn upsert_arc<'e, E>(executor: E, arc: &StoryArc) -> Result<(), RepoError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO arcs (id, arc_type, status, created_at, updated_at, data)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            arc_type = excluded.arc_type,
            status = excluded.status,
            updated_at = excluded.updated_at,
            data = excluded.data
        "#,
    )
    .bind(arc.id().to_string())
    .bind(arc.arc_type().as_str())
    .bind(arc.status().as_str())
    .bind(timestamp(arc.created_at()))
    .bind(timestamp(arc.updated_at()))
    .bind(to_json(arc)?)
    .execute(executor)
    .await
    .map_err(|e| RepoError::database("save_arc", e))?;
    Ok(())
}

pub(super) async fn upsert_progression<'e, E>(
    executor: E,
    progression: &ArcProgression,
) -> Result<(), RepoError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO arc_progressions (arc_id, id, data)
        VALUES (?, ?, ?)
        ON CONFLICT(arc_id) DO UPDATE SET
            id = excluded.id,
            data = excluded.data
        "#,
    )
    .bind(progression.arc_id().to_string())
    .bind(progression.id().to_string())
    .bind(to_json(progression)?)
    .execute(executor)
    .await
    .map_err(|e| RepoError::database("save_progression", e))?;
    Ok(())
}

#[async_trait]
impl ArcRepo for SqliteArcRepo {
    async fn get(&self, id: ArcId) -> Result<Option<StoryArc>, RepoError> {
        let row = sqlx::query("SELECT data FROM arcs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("get_arc", e))?;

        row.map(|r| {
            let data: String = r
                .try_get("data")
                .map_err(|e| RepoError::database("get_arc", e))?;
            from_json(&data)
        })
        .transpose()
    }

    async fn save(&self, arc: &StoryArc) -> Result<(), RepoError> {
        upsert_arc(&self.pool, arc).await
    }

    async fn delete(&self, id: ArcId) -> Result<(), RepoError> {
        let id = id.to_string();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("delete_arc", e))?;

        let statements = [
            "DELETE FROM arc_mapping_quests WHERE mapping_id IN \
             (SELECT id FROM arc_quest_mappings WHERE arc_id = ?)",
            "DELETE FROM arc_quest_mappings WHERE arc_id = ?",
            "DELETE FROM arc_system_hooks WHERE arc_id = ?",
            "DELETE FROM arc_steps WHERE arc_id = ?",
            "DELETE FROM arc_progressions WHERE arc_id = ?",
            "DELETE FROM arc_completions WHERE arc_id = ?",
            "DELETE FROM arc_relationships WHERE source_arc_id = ?",
            "DELETE FROM arc_relationships WHERE target_arc_id = ?",
            "DELETE FROM arcs WHERE id = ?",
        ];
        for statement in statements {
            sqlx::query(statement)
                .bind(&id)
                .execute(&mut *tx)
                .await
                .map_err(|e| RepoError::database("delete_arc", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| RepoError::database("delete_arc", e))?;
        Ok(())
    }

    async fn list(&self, filter: ArcFilter) -> Result<Vec<StoryArc>, RepoError> {
        let mut sql = String::from("SELECT data FROM arcs WHERE 1 = 1");
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.arc_type.is_some() {
            sql.push_str(" AND arc_type = ?");
        }
        if filter.created_after.is_some() {
            sql.push_str(" AND created_at >= ?");
        }
        sql.push_str(" ORDER BY created_at, id");

        let mut query = sqlx::query(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(arc_type) = filter.arc_type {
            query = query.bind(arc_type.as_str());
        }
        if let Some(since) = filter.created_after {
            query = query.bind(timestamp(since));
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::database("list_arcs", e))?;

        rows.iter()
            .map(|row| {
                let data: String = row
                    .try_get("data")
                    .map_err(|e| RepoError::database("list_arcs", e))?;
                from_json(&data)
            })
            .collect()
    }

    async fn count_by_type_and_status(
        &self,
        arc_type: ArcType,
        status: ArcStatus,
    ) -> Result<usize, RepoError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM arcs WHERE arc_type = ? AND status = ?")
            .bind(arc_type.as_str())
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepoError::database("count_arcs", e))?;

        let count: i64 = row
            .try_get("n")
            .map_err(|e| RepoError::database("count_arcs", e))?;
        Ok(count.max(0) as usize)
    }

    async fn register(
        &self,
        arc: &StoryArc,
        progression: &ArcProgression,
        steps: &[ArcStep],
        hooks: &[SystemHookConfiguration],
    ) -> Result<(), RepoError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("register_arc", e))?;

        upsert_arc(&mut *tx, arc).await?;
        upsert_progression(&mut *tx, progression).await?;
        for step in steps {
            upsert_step(&mut *tx, step).await?;
        }
        for hook in hooks {
            upsert_hook(&mut *tx, hook).await?;
        }

        tx.commit()
            .await
            .map_err(|e| RepoError::database("register_arc", e))?;
        Ok(())
    }

    async fn save_with_progression(
        &self,
        arc: &StoryArc,
        progression: &ArcProgression,
    ) -> Result<(), RepoError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("save_with_progression", e))?;

        upsert_arc(&mut *tx, arc).await?;
        upsert_progression(&mut *tx, progression).await?;

        tx.commit()
            .await
            .map_err(|e| RepoError::database("save_with_progression", e))?;
        Ok(())
    }

    async fn save_completion(
        &self,
        arc: &StoryArc,
        progression: &ArcProgression,
        record: &ArcCompletionRecord,
    ) -> Result<(), RepoError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("save_completion", e))?;

        upsert_arc(&mut *tx, arc).await?;
        upsert_progression(&mut *tx, progression).await?;

        sqlx::query(
            r#"
            INSERT INTO arc_completions (arc_id, id, result, data)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(arc_id) DO UPDATE SET
                id = excluded.id,
                result = excluded.result,
                data = excluded.data
            "#,
        )
        .bind(record.arc_id().to_string())
        .bind(record.id().to_string())
        .bind(record.completion_result().as_str())
        .bind(to_json(record)?)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepoError::database("save_completion", e))?;

        tx.commit()
            .await
            .map_err(|e| RepoError::database("save_completion", e))?;
        Ok(())
    }

    async fn get_completion(
        &self,
        arc_id: ArcId,
    ) -> Result<Option<ArcCompletionRecord>, RepoError> {
        let row = sqlx::query("SELECT data FROM arc_completions WHERE arc_id = ?")
            .bind(arc_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("get_completion", e))?;

        row.map(|r| {
            let data: String = r
                .try_get("data")
                .map_err(|e| RepoError::database("get_completion", e))?;
            from_json(&data)
        })
        .transpose()
    }

    async fn list_completions(&self) -> Result<Vec<ArcCompletionRecord>, RepoError> {
        let rows = sqlx::query("SELECT data FROM arc_completions")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::database("list_completions", e))?;

        rows.iter()
            .map(|row| {
                let data: String = row
                    .try_get("data")
                    .map_err(|e| RepoError::database("list_completions", e))?;
                from_json(&data)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::memory_repositories;
    use super::*;
    use crate::infrastructure::ports::{
        ArcStepRepo, IntegrationRepo, ProgressionRepo, RelationshipRepo,
    };
    use chrono::{Duration, TimeZone, Utc};
    use visualdm_domain::{ArcCompletionResult, ArcRelationship, ArcRelationshipType};

    fn arc(arc_type: ArcType, at: chrono::DateTime<Utc>) -> StoryArc {
        StoryArc::new(
            "The Ashen Pact",
            "An old alliance between two houses begins to crack",
            arc_type,
            at,
        )
        .with_total_steps(3)
    }

    #[tokio::test]
    async fn list_filters_by_status_type_and_creation_time() {
        let repos = memory_repositories().await;
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let mut active = arc(ArcType::Character, t0);
        active.activate(t0).unwrap();
        let regional = arc(ArcType::Regional, t0 + Duration::days(2));
        repos.arc.save(&active).await.unwrap();
        repos.arc.save(&regional).await.unwrap();

        let all = repos.arc.list(ArcFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id(), active.id());

        let by_status = repos
            .arc
            .list(ArcFilter::default().with_status(ArcStatus::Active))
            .await
            .unwrap();
        assert_eq!(by_status, vec![active.clone()]);

        let by_type = repos
            .arc
            .list(ArcFilter::default().with_type(ArcType::Regional))
            .await
            .unwrap();
        assert_eq!(by_type, vec![regional.clone()]);

        let recent = repos
            .arc
            .list(ArcFilter::default().created_after(t0 + Duration::days(1)))
            .await
            .unwrap();
        assert_eq!(recent, vec![regional]);

        let count = repos
            .arc
            .count_by_type_and_status(ArcType::Character, ArcStatus::Active)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn save_completion_writes_arc_progression_and_record() {
        let repos = memory_repositories().await;
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let mut story = arc(ArcType::Npc, now);
        story.activate(now).unwrap();
        story.complete(now).unwrap();
        let mut progression = ArcProgression::new(story.id(), now);
        progression.record_completion(ArcCompletionResult::Success, now);
        let record = ArcCompletionRecord::new(
            &story,
            ArcCompletionResult::Success,
            "The pact holds",
            vec!["Trade resumes".into()],
            now,
        );

        repos
            .arc
            .save_completion(&story, &progression, &record)
            .await
            .unwrap();

        let stored = repos.arc.get(story.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), ArcStatus::Completed);
        assert_eq!(
            repos.progression.get_for_arc(story.id()).await.unwrap(),
            Some(progression)
        );
        assert_eq!(repos.arc.get_completion(story.id()).await.unwrap(), Some(record));
        assert_eq!(repos.arc.list_completions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn register_writes_arc_steps_and_hooks_together() {
        let repos = memory_repositories().await;
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let story = arc(ArcType::Regional, now);
        let progression = ArcProgression::new(story.id(), now);
        let steps = vec![
            ArcStep::new(story.id(), 0, "Scout the ruins", now),
            ArcStep::new(story.id(), 1, "Parley with the warden", now),
        ];
        let hooks = vec![SystemHookConfiguration::new(story.id(), "quest", now)];

        repos
            .arc
            .register(&story, &progression, &steps, &hooks)
            .await
            .unwrap();

        assert!(repos.arc.get(story.id()).await.unwrap().is_some());
        assert!(repos.progression.get_for_arc(story.id()).await.unwrap().is_some());
        assert_eq!(repos.step.list_for_arc(story.id()).await.unwrap().len(), 2);
        assert_eq!(
            repos.integration.list_hooks_for_arc(story.id()).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn failed_register_leaves_nothing_behind() {
        let repos = memory_repositories().await;
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let story = arc(ArcType::Regional, now);
        let progression = ArcProgression::new(story.id(), now);
        // Same (arc_id, step_index) twice trips the unique constraint mid-transaction.
        let steps = vec![
            ArcStep::new(story.id(), 0, "Scout the ruins", now),
            ArcStep::new(story.id(), 0, "Scout the ruins again", now),
        ];

        let result = repos.arc.register(&story, &progression, &steps, &[]).await;

        assert!(result.is_err());
        assert!(repos.arc.get(story.id()).await.unwrap().is_none());
        assert!(repos.progression.get_for_arc(story.id()).await.unwrap().is_none());
        assert!(repos.step.list_for_arc(story.id()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_cascades_to_children() {
        let repos = memory_repositories().await;
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let story = arc(ArcType::Character, now);
        let progression = ArcProgression::new(story.id(), now);
        repos
            .arc
            .save_with_progression(&story, &progression)
            .await
            .unwrap();
        repos
            .step
            .save(&ArcStep::new(story.id(), 0, "Find the envoy", now))
            .await
            .unwrap();

        let other = arc(ArcType::Regional, now);
        repos.arc.save(&other).await.unwrap();
        let link =
            ArcRelationship::new(other.id(), story.id(), ArcRelationshipType::Consequence, now);
        repos.relationship.save(&link).await.unwrap();

        repos.arc.delete(story.id()).await.unwrap();

        assert!(repos.arc.get(story.id()).await.unwrap().is_none());
        assert!(repos.progression.get_for_arc(story.id()).await.unwrap().is_none());
        assert!(repos.step.list_for_arc(story.id()).await.unwrap().is_empty());
        assert!(repos.relationship.get(link.id()).await.unwrap().is_none());
        assert!(repos.arc.get(other.id()).await.unwrap().is_some());
    }
}
