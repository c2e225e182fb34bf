//! Persistence gateway: one write-once row per request id.
//!
//! Each artifact is stored as JSON text. There is no upsert; writing the same
//! id twice fails with `StoreError::Duplicate`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::attributes::{CanonicalAttributes, PerProvider};
use crate::error::StoreError;
use crate::merge::{ModelInfo, ProcessingMetrics};

/// The persisted triple plus its key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub attributes: CanonicalAttributes,
    pub model_info: PerProvider<ModelInfo>,
    pub processing: ProcessingMetrics,
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Insert a new record. Fails if the id already exists.
    async fn insert(&self, record: &AnalysisRecord) -> Result<(), StoreError>;

    async fn fetch(&self, id: &str) -> Result<Option<AnalysisRecord>, StoreError>;
}

pub type DynStore = Arc<dyn ResultStore>;

/// Build the store named by `database_url` (`"memory"` or a sqlx SQLite URL).
pub async fn open_store(database_url: &str) -> Result<DynStore, StoreError> {
    if database_url.trim().eq_ignore_ascii_case("memory") {
        info!("using in-memory result store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = SqliteStore::connect(database_url).await?;
    info!("sqlite result store ready");
    Ok(Arc::new(store))
}

// ------------------------------------------------------------
// SQLite
// ------------------------------------------------------------

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS inference_results (
    id          TEXT PRIMARY KEY NOT NULL,
    attributes  TEXT NOT NULL,
    model_info  TEXT NOT NULL,
    processing  TEXT NOT NULL,
    created_at  TEXT NOT NULL
)
"#;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and create the table if needed. In-memory URLs get a single
    /// connection so every query sees the same database.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::from_str(url)?;
        let max = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max)
            .connect_with(opts)
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ResultStore for SqliteStore {
    async fn insert(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        let attributes = serde_json::to_string(&record.attributes)?;
        let model_info = serde_json::to_string(&record.model_info)?;
        let processing = serde_json::to_string(&record.processing)?;

        let res = sqlx::query(
            r#"
            INSERT INTO inference_results (id, attributes, model_info, processing, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(attributes)
        .bind(model_info)
        .bind(processing)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Duplicate(record.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch(&self, id: &str) -> Result<Option<AnalysisRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, attributes, model_info, processing
            FROM inference_results
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let attributes: String = row.get("attributes");
                let model_info: String = row.get("model_info");
                let processing: String = row.get("processing");
                Ok(Some(AnalysisRecord {
                    id: row.get("id"),
                    attributes: serde_json::from_str(&attributes)?,
                    model_info: serde_json::from_str(&model_info)?,
                    processing: serde_json::from_str(&processing)?,
                }))
            }
            None => Ok(None),
        }
    }
}

// ------------------------------------------------------------
// In-memory
// ------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, AnalysisRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn insert(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap_or_else(|p| p.into_inner());
        if rows.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id.clone()));
        }
        rows.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn fetch(&self, id: &str) -> Result<Option<AnalysisRecord>, StoreError> {
        let rows = self.rows.lock().unwrap_or_else(|p| p.into_inner());
        Ok(rows.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{AttributeKey, ProviderId};

    pub(crate) fn sample(id: &str) -> AnalysisRecord {
        AnalysisRecord {
            id: id.to_string(),
            attributes: CanonicalAttributes::all_unknown(),
            model_info: PerProvider::from_fn(|p| ModelInfo {
                model_name: p.to_string(),
                latency_ms: 1.5,
                attribute_keys_owned: p.owned_keys(),
            }),
            processing: ProcessingMetrics {
                status_code: 200,
                total_latency_ms: 4.5,
                per_provider_latency_ms: PerProvider::from_fn(|_| 1.5),
            },
        }
    }

    #[tokio::test]
    async fn memory_store_is_write_once() {
        let store = MemoryStore::new();
        store.insert(&sample("a")).await.unwrap();
        let err = store.insert(&sample("a")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(id) if id == "a"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.fetch("a").await.unwrap(), Some(sample("a")));
        assert!(store.fetch("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_survives_a_poisoned_lock() {
        let store = Arc::new(MemoryStore::new());
        store.insert(&sample("before")).await.unwrap();

        let s2 = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = s2.rows.lock().unwrap();
            panic!("poison the lock");
        })
        .join();
        assert!(store.rows.is_poisoned());

        assert_eq!(store.len(), 1);
        assert!(!store.is_empty());
        store.insert(&sample("after")).await.unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.fetch("before").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sqlite_round_trip_and_duplicate() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        let rec = sample("req-1");
        store.insert(&rec).await.unwrap();

        let back = store.fetch("req-1").await.unwrap().unwrap();
        assert_eq!(back, rec);
        assert_eq!(back.attributes.get(AttributeKey::Color), "unknown");
        assert_eq!(back.model_info.get(ProviderId::Llama).attribute_keys_owned.len(), 3);

        let err = store.insert(&rec).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn sqlite_stores_json_text() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        store.insert(&sample("req-2")).await.unwrap();
        let row = sqlx::query(
            "SELECT attributes, processing, created_at FROM inference_results WHERE id = ?",
        )
            .bind("req-2")
            .fetch_one(store.pool())
            .await
            .unwrap();
        let attrs: String = row.get("attributes");
        let v: serde_json::Value = serde_json::from_str(&attrs).unwrap();
        assert_eq!(v.as_object().unwrap().len(), 13);
        let processing: String = row.get("processing");
        assert!(processing.contains("per_provider_latency_ms"));
        let created_at: String = row.get("created_at");
        assert!(chrono::DateTime::parse_from_rfc3339(&created_at).is_ok());
    }
}
