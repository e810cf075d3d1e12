//! SQLite progression storage.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use visualdm_domain::{ArcId, ArcProgression};

use super::arc_repo::upsert_progression;
use super::from_json;
use crate::infrastructure::ports::{ProgressionRepo, RepoError};

pub struct SqliteProgressionRepo {
    pool: SqlitePool,
}

impl SqliteProgressionRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressionRepo for SqliteProgressionRepo {
    async fn get_for_arc(&self, arc_id: ArcId) -> Result<Option<ArcProgression>, RepoError> {
        let row = sqlx::query("SELECT data FROM arc_progressions WHERE arc_id = ?")
            .bind(arc_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("get_progression", e))?;

        row.map(|r| {
            let data: String = r
                .try_get("data")
                .map_err(|e| RepoError::database("get_progression", e))?;
            from_json(&data)
        })
        .transpose()
    }

    async fn save(&self, progression: &ArcProgression) -> Result<(), RepoError> {
        upsert_progression(&self.pool, progression).await
    }

    async fn list(&self) -> Result<Vec<ArcProgression>, RepoError> {
        let rows = sqlx::query("SELECT data FROM arc_progressions")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::database("list_progressions", e))?;

        rows.iter()
            .map(|row| {
                let data: String = row
                    .try_get("data")
                    .map_err(|e| RepoError::database("list_progressions", e))?;
                from_json(&data)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::memory_repositories;
    use super::*;
    use chrono::{TimeZone, Utc};
    use visualdm_domain::ProgressionMethod;

    #[tokio::test]
    async fn save_replaces_existing_progression() {
        let repos = memory_repositories().await;
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut progression = ArcProgression::new(ArcId::new(), now);
        repos.progression.save(&progression).await.unwrap();

        progression.record_step_completion(0, ProgressionMethod::QuestCompletion, now);
        repos.progression.save(&progression).await.unwrap();

        let stored = repos
            .progression
            .get_for_arc(progression.arc_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.current_step_index(), 1);
        assert_eq!(repos.progression.list().await.unwrap().len(), 1);
    }
}
