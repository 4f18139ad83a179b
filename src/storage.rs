//! SQLite-backed profile store.
//!
//! The store is a tiny key-value table. The only record the application keeps
//! is the JSON-serialized [`UserProfile`] under [`PROFILE_KEY`]; there is no
//! versioning, so a shape change means clearing the record.

use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::warn;

use crate::model::UserProfile;

/// Fixed key the profile is stored under.
pub const PROFILE_KEY: &str = "aqi_user_profile";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct ProfileStore {
    pool: SqlitePool,
}

impl ProfileStore {
    /// Create a new store and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:aqi_tracker.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Every pooled connection to ":memory:" is its own database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;

        Ok(store)
    }

    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load the saved profile.
    ///
    /// A missing record and a record that no longer deserializes are both
    /// reported as `None`.
    pub async fn load(&self) -> anyhow::Result<Option<UserProfile>> {
        let row = sqlx::query(
            r#"
            SELECT value FROM kv_store WHERE key = ?
            "#,
        )
        .bind(PROFILE_KEY)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: String = row.get("value");
        match serde_json::from_str::<UserProfile>(&raw) {
            Ok(profile) => Ok(Some(profile)),
            Err(e) => {
                warn!(key = PROFILE_KEY, error = %e, "Stored profile is unreadable, treating as absent");
                Ok(None)
            }
        }
    }

    /// Save the profile, replacing any previous one in a single statement.
    pub async fn save(&self, profile: &UserProfile) -> anyhow::Result<()> {
        let raw = serde_json::to_string(profile)?;

        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(PROFILE_KEY)
        .bind(raw)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove the saved profile. Clearing an empty store is not an error.
    pub async fn clear(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            DELETE FROM kv_store WHERE key = ?
            "#,
        )
        .bind(PROFILE_KEY)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[cfg(test)]
    async fn put_raw(&self, raw: &str) -> anyhow::Result<()> {
        sqlx::query("INSERT OR REPLACE INTO kv_store (key, value) VALUES (?, ?)")
            .bind(PROFILE_KEY)
            .bind(raw)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CommuteMode, Sensitivity};

    fn profile(city: &str) -> UserProfile {
        UserProfile {
            name: "Ravi".to_string(),
            city: city.to_string(),
            sensitivity: Sensitivity::Moderate,
            commute_mode: CommuteMode::Bike,
            health_conditions: vec!["Asthma".to_string()],
        }
    }

    #[tokio::test]
    async fn test_load_empty() {
        let store = ProfileStore::new("sqlite::memory:").await.unwrap();

        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = ProfileStore::new("sqlite::memory:").await.unwrap();

        store.save(&profile("Mumbai")).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, Some(profile("Mumbai")));
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let store = ProfileStore::new("sqlite::memory:").await.unwrap();

        store.save(&profile("Mumbai")).await.unwrap();
        store.save(&profile("Chennai")).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.city, "Chennai");
    }

    #[tokio::test]
    async fn test_clear() {
        let store = ProfileStore::new("sqlite::memory:").await.unwrap();

        store.save(&profile("Mumbai")).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());

        // Clearing twice is fine
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_record_is_absent() {
        let store = ProfileStore::new("sqlite::memory:").await.unwrap();

        store.put_raw("{\"name\": \"Ravi\"").await.unwrap();
        assert!(store.load().await.unwrap().is_none());

        store.put_raw("{\"name\": \"Ravi\", \"city\": 7}").await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }
}
