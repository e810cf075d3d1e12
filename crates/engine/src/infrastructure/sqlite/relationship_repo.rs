//! SQLite arc relationship storage.

use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use visualdm_domain::{ArcId, ArcRelationship, RelationshipId};

use super::{from_json, timestamp, to_json};
use crate::infrastructure::ports::{RelationshipRepo, RepoError};

pub struct SqliteRelationshipRepo {
    pool: SqlitePool,
}

impl SqliteRelationshipRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn decode(
    rows: &[SqliteRow],
    operation: &'static str,
) -> Result<Vec<ArcRelationship>, RepoError> {
    rows.iter()
        .map(|row| {
            let data: String = row
                .try_get("data")
                .map_err(|e| RepoError::database(operation, e))?;
            from_json(&data)
        })
        .collect()
}

#[async_trait]
impl RelationshipRepo for SqliteRelationshipRepo {
    async fn get(&self, id: RelationshipId) -> Result<Option<ArcRelationship>, RepoError> {
        let row = sqlx::query("SELECT data FROM arc_relationships WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("get_relationship", e))?;

        row.map(|r| {
            let data: String = r
                .try_get("data")
                .map_err(|e| RepoError::database("get_relationship", e))?;
            from_json(&data)
        })
        .transpose()
    }

    async fn save(&self, relationship: &ArcRelationship) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO arc_relationships (id, source_arc_id, target_arc_id, created_at, data)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                source_arc_id = excluded.source_arc_id,
                target_arc_id = excluded.target_arc_id,
                data = excluded.data
            "#,
        )
        .bind(relationship.id().to_string())
        .bind(relationship.source_arc_id().to_string())
        .bind(relationship.target_arc_id().to_string())
        .bind(timestamp(relationship.created_at()))
        .bind(to_json(relationship)?)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("save_relationship", e))?;
        Ok(())
    }

    async fn delete(&self, id: RelationshipId) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM arc_relationships WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::database("delete_relationship", e))?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ArcRelationship>, RepoError> {
        let rows = sqlx::query("SELECT data FROM arc_relationships ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::database("list_relationships", e))?;
        decode(&rows, "list_relationships")
    }

    async fn list_for_arc(&self, arc_id: ArcId) -> Result<Vec<ArcRelationship>, RepoError> {
        let id = arc_id.to_string();
        let rows = sqlx::query(
            "SELECT data FROM arc_relationships \
             WHERE source_arc_id = ? OR target_arc_id = ? \
             ORDER BY created_at, id",
        )
        .bind(&id)
        .bind(&id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("list_relationships_for_arc", e))?;
        decode(&rows, "list_relationships_for_arc")
    }
}

#[cfg(test)]
mod tests {
    use super::super::memory_repositories;
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use visualdm_domain::{ArcInfluenceLevel, ArcRelationshipType};

    #[tokio::test]
    async fn links_are_found_from_either_end() {
        let repos = memory_repositories().await;
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let (a, b, c) = (ArcId::new(), ArcId::new(), ArcId::new());

        let first = ArcRelationship::new(a, b, ArcRelationshipType::Sequel, now)
            .with_influence_level(ArcInfluenceLevel::Major);
        let second =
            ArcRelationship::new(c, a, ArcRelationshipType::ThematicLink, now + Duration::hours(1));
        let unrelated = ArcRelationship::new(b, c, ArcRelationshipType::Parallel, now);
        for link in [&first, &second, &unrelated] {
            repos.relationship.save(link).await.unwrap();
        }

        let for_a = repos.relationship.list_for_arc(a).await.unwrap();
        assert_eq!(for_a, vec![first.clone(), second]);
        assert_eq!(repos.relationship.list().await.unwrap().len(), 3);
        assert_eq!(
            repos.relationship.get(first.id()).await.unwrap(),
            Some(first)
        );
    }

    #[tokio::test]
    async fn delete_removes_only_that_link() {
        let repos = memory_repositories().await;
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let link = |kind| ArcRelationship::new(ArcId::new(), ArcId::new(), kind, now);
        let keep = link(ArcRelationshipType::Sequel);
        let gone = link(ArcRelationshipType::Consequence);
        repos.relationship.save(&keep).await.unwrap();
        repos.relationship.save(&gone).await.unwrap();

        repos.relationship.delete(gone.id()).await.unwrap();

        assert!(repos.relationship.get(gone.id()).await.unwrap().is_none());
        assert_eq!(repos.relationship.list().await.unwrap(), vec![keep]);
    }
}
