//! SQLite arc step storage.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};
use visualdm_domain::{ArcId, ArcStep, ArcStepId, ArcStepStatus};

use super::{from_json, to_json};
use crate::infrastructure::ports::{ArcStepRepo, RepoError};

pub struct SqliteArcStepRepo {
    pool: SqlitePool,
}

impl SqliteArcStepRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

pub(super) async fn upsert_step<'e, E>(executor: E, step: &ArcStep) -> Result<(), RepoError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO arc_steps (id, arc_id, step_index, status, data)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            step_index = excluded.step_index,
            status = excluded.status,
            data = excluded.data
        "#,
    )
    .bind(step.id().to_string())
    .bind(step.arc_id().to_string())
    .bind(i64::from(step.step_index()))
    .bind(step.status().as_str())
    .bind(to_json(step)?)
    .execute(executor)
    .await
    .map_err(|e| RepoError::database("save_step", e))?;
    Ok(())
}

fn decode(row: &SqliteRow, operation: &'static str) -> Result<ArcStep, RepoError> {
    let data: String = row
        .try_get("data")
        .map_err(|e| RepoError::database(operation, e))?;
    from_json(&data)
}

#[async_trait]
impl ArcStepRepo for SqliteArcStepRepo {
    async fn get(&self, id: ArcStepId) -> Result<Option<ArcStep>, RepoError> {
        let row = sqlx::query("SELECT data FROM arc_steps WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("get_step", e))?;

        row.as_ref().map(|r| decode(r, "get_step")).transpose()
    }

    async fn save(&self, step: &ArcStep) -> Result<(), RepoError> {
        upsert_step(&self.pool, step).await
    }

    async fn save_all(&self, steps: &[ArcStep]) -> Result<(), RepoError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("save_steps", e))?;

        for step in steps {
            upsert_step(&mut *tx, step).await?;
        }

        tx.commit()
            .await
            .map_err(|e| RepoError::database("save_steps", e))?;
        Ok(())
    }

    async fn list_for_arc(&self, arc_id: ArcId) -> Result<Vec<ArcStep>, RepoError> {
        let rows = sqlx::query("SELECT data FROM arc_steps WHERE arc_id = ? ORDER BY step_index")
            .bind(arc_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::database("list_steps", e))?;

        rows.iter().map(|row| decode(row, "list_steps")).collect()
    }

    async fn get_by_index(
        &self,
        arc_id: ArcId,
        step_index: u32,
    ) -> Result<Option<ArcStep>, RepoError> {
        let row = sqlx::query("SELECT data FROM arc_steps WHERE arc_id = ? AND step_index = ?")
            .bind(arc_id.to_string())
            .bind(i64::from(step_index))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("get_step_by_index", e))?;

        row.as_ref().map(|r| decode(r, "get_step_by_index")).transpose()
    }

    async fn list_open_for_quests(&self) -> Result<Vec<ArcStep>, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT s.data FROM arc_steps s
            JOIN arcs a ON a.id = s.arc_id
            WHERE a.status = 'active' AND s.status IN (?, ?)
            ORDER BY a.created_at, s.step_index
            "#,
        )
        .bind(ArcStepStatus::Pending.as_str())
        .bind(ArcStepStatus::Available.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("list_open_steps", e))?;

        rows.iter().map(|row| decode(row, "list_open_steps")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::memory_repositories;
    use super::*;
    use crate::infrastructure::ports::ArcRepo;
    use chrono::{TimeZone, Utc};
    use visualdm_domain::{ArcType, StoryArc};

    #[tokio::test]
    async fn steps_are_listed_in_index_order() {
        let repos = memory_repositories().await;
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let arc_id = ArcId::new();

        let steps = vec![
            ArcStep::new(arc_id, 2, "Confront the regent", now),
            ArcStep::new(arc_id, 0, "Hear the rumor", now),
            ArcStep::new(arc_id, 1, "Follow the courier", now),
        ];
        repos.step.save_all(&steps).await.unwrap();

        let titles: Vec<_> = repos
            .step
            .list_for_arc(arc_id)
            .await
            .unwrap()
            .iter()
            .map(|s| s.title().to_string())
            .collect();
        assert_eq!(
            titles,
            vec!["Hear the rumor", "Follow the courier", "Confront the regent"]
        );

        let second = repos.step.get_by_index(arc_id, 1).await.unwrap().unwrap();
        assert_eq!(second.title(), "Follow the courier");
        assert!(repos.step.get_by_index(arc_id, 9).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_index_rolls_back_whole_batch() {
        let repos = memory_repositories().await;
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let arc_id = ArcId::new();

        let steps = vec![
            ArcStep::new(arc_id, 0, "Hear the rumor", now),
            ArcStep::new(arc_id, 0, "Hear it again", now),
        ];
        assert!(repos.step.save_all(&steps).await.is_err());
        assert!(repos.step.list_for_arc(arc_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_steps_only_come_from_active_arcs() {
        let repos = memory_repositories().await;
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let mut active = StoryArc::new(
            "Embers of the Forge",
            "A smith's guild hides a forbidden craft",
            ArcType::Character,
            now,
        );
        active.activate(now).unwrap();
        let pending = StoryArc::new(
            "Quiet Waters",
            "The river spirits have gone silent this spring",
            ArcType::Regional,
            now,
        );
        repos.arc.save(&active).await.unwrap();
        repos.arc.save(&pending).await.unwrap();

        let mut done = ArcStep::new(active.id(), 0, "Visit the forge", now);
        done.complete(now).unwrap();
        let open = ArcStep::new(active.id(), 1, "Steal the ledger", now);
        let dormant = ArcStep::new(pending.id(), 0, "Listen at the ford", now);
        repos
            .step
            .save_all(&[done, open.clone(), dormant])
            .await
            .unwrap();

        let steps = repos.step.list_open_for_quests().await.unwrap();
        assert_eq!(steps, vec![open]);
    }
}
