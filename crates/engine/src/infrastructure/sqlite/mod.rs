//! SQLite persistence for arcs, steps, progressions, relationships and
//! integration records.
//!
//! Every aggregate is stored as a JSON `data` column next to the handful of
//! columns queries filter on. Multi-record writes go through a transaction.

mod arc_repo;
mod integration_repo;
mod progression_repo;
mod relationship_repo;
mod step_repo;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::infrastructure::ports::RepoError;

pub use arc_repo::SqliteArcRepo;
pub use integration_repo::SqliteIntegrationRepo;
pub use progression_repo::SqliteProgressionRepo;
pub use relationship_repo::SqliteRelationshipRepo;
pub use step_repo::SqliteArcStepRepo;

pub const IN_MEMORY: &str = ":memory:";

const SCHEMA: [&str; 11] = [
    r#"
    CREATE TABLE IF NOT EXISTS arcs (
        id TEXT PRIMARY KEY,
        arc_type TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        data TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS arc_progressions (
        arc_id TEXT PRIMARY KEY,
        id TEXT NOT NULL,
        data TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS arc_steps (
        id TEXT PRIMARY KEY,
        arc_id TEXT NOT NULL,
        step_index INTEGER NOT NULL,
        status TEXT NOT NULL,
        data TEXT NOT NULL,
        UNIQUE (arc_id, step_index)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS arc_completions (
        arc_id TEXT PRIMARY KEY,
        id TEXT NOT NULL,
        result TEXT NOT NULL,
        data TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS arc_quest_mappings (
        id TEXT PRIMARY KEY,
        arc_id TEXT NOT NULL,
        step_id TEXT NOT NULL UNIQUE,
        data TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS arc_mapping_quests (
        mapping_id TEXT NOT NULL,
        quest_id TEXT NOT NULL,
        PRIMARY KEY (mapping_id, quest_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS arc_system_hooks (
        id TEXT PRIMARY KEY,
        arc_id TEXT NOT NULL,
        system_name TEXT NOT NULL,
        data TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS arc_system_integrations (
        system_name TEXT PRIMARY KEY,
        data TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS arc_relationships (
        id TEXT PRIMARY KEY,
        source_arc_id TEXT NOT NULL,
        target_arc_id TEXT NOT NULL,
        created_at TEXT NOT NULL,
        data TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_arc_mapping_quests_quest ON arc_mapping_quests (quest_id)",
    "CREATE INDEX IF NOT EXISTS idx_arc_relationships_target ON arc_relationships (target_arc_id)",
];

/// One pool shared by every repository.
#[derive(Clone)]
pub struct SqliteRepositories {
    pub arc: Arc<SqliteArcRepo>,
    pub step: Arc<SqliteArcStepRepo>,
    pub progression: Arc<SqliteProgressionRepo>,
    pub integration: Arc<SqliteIntegrationRepo>,
    pub relationship: Arc<SqliteRelationshipRepo>,
}

impl SqliteRepositories {
    /// Open (or create) the database at `db_path` and ensure the schema exists.
    ///
    /// `:memory:` keeps a single connection alive so every repository sees
    /// the same database.
    pub async fn connect(db_path: &str) -> Result<Self, RepoError> {
        let pool = if db_path == IN_MEMORY {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
        } else {
            SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path)).await
        }
        .map_err(|e| RepoError::database("connect", e))?;

        ensure_schema(&pool).await?;
        tracing::info!(db_path, "Arc database ready");

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            arc: Arc::new(SqliteArcRepo::new(pool.clone())),
            step: Arc::new(SqliteArcStepRepo::new(pool.clone())),
            progression: Arc::new(SqliteProgressionRepo::new(pool.clone())),
            integration: Arc::new(SqliteIntegrationRepo::new(pool.clone())),
            relationship: Arc::new(SqliteRelationshipRepo::new(pool)),
        }
    }
}

pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), RepoError> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| RepoError::database("ensure_schema", e))?;
    }
    Ok(())
}

// Fixed-width UTC timestamps so text comparison orders chronologically.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, RepoError> {
    serde_json::to_string(value).map_err(RepoError::serialization)
}

pub(crate) fn from_json<T: DeserializeOwned>(data: &str) -> Result<T, RepoError> {
    serde_json::from_str(data).map_err(RepoError::serialization)
}

#[cfg(test)]
pub(crate) async fn memory_repositories() -> SqliteRepositories {
    SqliteRepositories::connect(IN_MEMORY)
        .await
        .expect("in-memory database")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_database_survives_reconnect() {
        use crate::infrastructure::ports::ArcRepo;
        use visualdm_domain::{ArcType, StoryArc};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arcs.db");
        let path = path.to_str().unwrap();

        let arc = StoryArc::new(
            "The Sunken Crown",
            "A drowned kingdom stirs beneath the bay",
            ArcType::Regional,
            Utc::now(),
        );
        {
            let repos = SqliteRepositories::connect(path).await.unwrap();
            repos.arc.save(&arc).await.unwrap();
        }

        let repos = SqliteRepositories::connect(path).await.unwrap();
        let loaded = repos.arc.get(arc.id()).await.unwrap();
        assert_eq!(loaded, Some(arc));
    }

    #[test]
    fn timestamps_sort_lexically() {
        use chrono::TimeZone;
        let earlier = Utc.timestamp_opt(1_700_000_000, 5_000).unwrap();
        let later = Utc.timestamp_opt(1_700_000_001, 0).unwrap();
        assert!(timestamp(earlier) < timestamp(later));
    }
}
