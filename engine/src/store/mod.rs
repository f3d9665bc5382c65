//! Durable collections
//!
//! Two JSON-backed ordered collections (leads and the content calendar)
//! share one contract:
//!
//! - `add` assigns `id = max(existing) + 1` (1 when empty), appends, and
//!   persists the whole collection.
//! - `update` replaces a record's domain fields by id. Id and creation time
//!   are kept.
//! - `view` returns a snapshot filtered by a predicate.
//! - There is no delete. Ids are never reused.
//!
//! Every write goes to `<file>.tmp.<pid>` and is renamed over the
//! collection file after an fsync, so a crash leaves either the old or the
//! new array on disk. The in-memory copy is only replaced after the rename
//! succeeds.

pub mod records;

use chrono::{DateTime, Utc};
use sdk::errors::EngineError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub use records::{CalendarEntry, EntryStatus, Lead, LeadStatus};

/// File name of the leads collection
pub const LEADS_FILE: &str = "leads.json";
/// File name of the content calendar collection
pub const CALENDAR_FILE: &str = "content_calendar.json";

/// One stored element: engine-owned metadata plus domain fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    pub id: u64,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    #[serde(flatten)]
    pub fields: T,
}

/// A JSON array on disk, guarded by a mutex in memory.
pub struct Collection<T> {
    name: &'static str,
    path: PathBuf,
    records: Mutex<Vec<Record<T>>>,
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// Open a collection, loading the existing file if present.
    ///
    /// A file that exists but cannot be parsed is an error; it is never
    /// silently replaced.
    pub async fn open(name: &'static str, path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let path = path.into();

        let records = match tokio::fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => Vec::new(),
            Ok(contents) => serde_json::from_str::<Vec<Record<T>>>(&contents).map_err(|e| {
                EngineError::Serialization(format!("{} is not a valid collection: {}", name, e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(collection = name, count = records.len(), "Loaded collection");

        Ok(Self {
            name,
            path,
            records: Mutex::new(records),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record and persist. Returns the stored record.
    pub async fn add(&self, fields: T) -> Result<Record<T>, EngineError> {
        let mut records = self.records.lock().await;

        let id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let record = Record {
            id,
            created_at: Utc::now(),
            fields,
        };

        let mut next = records.clone();
        next.push(record.clone());
        self.persist(&next).await?;
        *records = next;

        info!(collection = self.name, id, "Record added");
        Ok(record)
    }

    /// Replace the domain fields of record `id` and persist.
    pub async fn update(&self, id: u64, fields: T) -> Result<Record<T>, EngineError> {
        let mut records = self.records.lock().await;
        let index = self.position(&records, id)?;
        self.commit(&mut records, index, fields).await
    }

    /// Merge a JSON object into record `id`'s fields and persist.
    ///
    /// Keys in `patch` overwrite the stored values; `id` and `createdAt`
    /// are ignored. The merged value must still deserialize as `T`. The
    /// collection stays locked from read to rename.
    pub async fn patch(&self, id: u64, patch: &Value) -> Result<Record<T>, EngineError> {
        let Value::Object(changes) = patch else {
            return Err(EngineError::schema(
                self.name,
                "update must be a JSON object",
            ));
        };

        let mut records = self.records.lock().await;
        let index = self.position(&records, id)?;

        let mut merged = serde_json::to_value(&records[index].fields)?;
        if let Value::Object(target) = &mut merged {
            for (key, value) in changes {
                if key == "id" || key == "createdAt" {
                    continue;
                }
                target.insert(key.clone(), value.clone());
            }
        }

        let fields: T = serde_json::from_value(merged)
            .map_err(|e| EngineError::schema(self.name, e.to_string()))?;

        self.commit(&mut records, index, fields).await
    }

    fn position(&self, records: &[Record<T>], id: u64) -> Result<usize, EngineError> {
        records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| EngineError::RecordNotFound {
                collection: self.name.to_string(),
                id,
            })
    }

    async fn commit(
        &self,
        records: &mut Vec<Record<T>>,
        index: usize,
        fields: T,
    ) -> Result<Record<T>, EngineError> {
        let mut next = records.clone();
        next[index].fields = fields;
        let updated = next[index].clone();
        self.persist(&next).await?;
        *records = next;

        info!(collection = self.name, id = updated.id, "Record updated");
        Ok(updated)
    }

    /// Fetch one record by id.
    pub async fn get(&self, id: u64) -> Option<Record<T>> {
        self.records
            .lock()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// Snapshot of the records matching `predicate`, in insertion order.
    pub async fn view<F>(&self, predicate: F) -> Vec<Record<T>>
    where
        F: Fn(&Record<T>) -> bool,
    {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| predicate(r))
            .cloned()
            .collect()
    }

    /// Snapshot of every record.
    pub async fn all(&self) -> Vec<Record<T>> {
        self.view(|_| true).await
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn persist(&self, records: &[Record<T>]) -> Result<(), EngineError> {
        write_json_atomic(&self.path, &records)
            .await
            .map_err(|e| EngineError::StoreConflict(format!("{}: {}", self.name, e)))
    }
}

/// Write `value` as pretty JSON to `path` via a temp file and rename.
pub async fn write_json_atomic<V: Serialize + ?Sized>(
    path: &Path,
    value: &V,
) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| EngineError::Config(format!("invalid file name: {}", path.display())))?;
    let tmp_path = path.with_file_name(format!("{}.tmp.{}", filename, std::process::id()));

    let contents = serde_json::to_string_pretty(value)?;
    let written = async {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        tokio::fs::rename(&tmp_path, path).await
    }
    .await;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }

    Ok(())
}

/// Both durable collections.
pub struct Store {
    pub leads: Collection<Lead>,
    pub calendar: Collection<CalendarEntry>,
}

impl Store {
    /// Open (or create on first write) the collections under `data_dir`.
    pub async fn open(data_dir: &Path) -> Result<Self, EngineError> {
        tokio::fs::create_dir_all(data_dir).await?;

        Ok(Self {
            leads: Collection::open("leads", data_dir.join(LEADS_FILE)).await?,
            calendar: Collection::open("content_calendar", data_dir.join(CALENDAR_FILE)).await?,
        })
    }
}
