use crate::options::{OptionRecord, RawSettings, Sanitizer};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tokio::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("state serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Persists named option records. `set` runs the sanitizer before writing,
/// so only canonical records ever reach storage.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<OptionRecord>, StoreError>;
    async fn set(
        &self,
        name: &str,
        raw: &RawSettings,
        sanitizer: &dyn Sanitizer,
    ) -> Result<OptionRecord, StoreError>;
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, OptionRecord>>,
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<Option<OptionRecord>, StoreError> {
        Ok(self.records.read().await.get(name).cloned())
    }

    async fn set(
        &self,
        name: &str,
        raw: &RawSettings,
        sanitizer: &dyn Sanitizer,
    ) -> Result<OptionRecord, StoreError> {
        let record = sanitizer.sanitize(raw);
        self.records
            .write()
            .await
            .insert(name.to_string(), record.clone());
        Ok(record)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,
    #[serde(default)]
    records: BTreeMap<String, OptionRecord>,
}

/// Store backed by a single JSON state file.
///
/// Reads are fresh per request; `set` rewrites the whole document, so
/// concurrent writers are last-write-wins, which matches the host-storage
/// contract.
pub struct FsStore {
    path: PathBuf,
}

impl FsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn load(&self) -> Result<StateDocument, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(StateDocument::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, document: &StateDocument) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(document)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for FsStore {
    async fn get(&self, name: &str) -> Result<Option<OptionRecord>, StoreError> {
        Ok(self.load().await?.records.get(name).cloned())
    }

    async fn set(
        &self,
        name: &str,
        raw: &RawSettings,
        sanitizer: &dyn Sanitizer,
    ) -> Result<OptionRecord, StoreError> {
        let record = sanitizer.sanitize(raw);
        let mut document = self.load().await?;
        document.records.insert(name.to_string(), record.clone());
        document.updated_at = Some(chrono::Utc::now().to_rfc3339());
        self.save(&document).await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{OPTION_GROUP, OptionSanitizer};
    use crate::roles::StaticRoleTable;
    use std::sync::Arc;

    fn sanitizer() -> OptionSanitizer {
        OptionSanitizer::new(Arc::new(StaticRoleTable::builtin()))
    }

    fn raw(pairs: &[(&str, &str)]) -> RawSettings {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn memory_store_sanitizes_on_set() {
        let store = MemoryStore::default();
        let record = store
            .set(
                OPTION_GROUP,
                &raw(&[("code", "not-an-id"), ("ignore_admin_area", "true")]),
                &sanitizer(),
            )
            .await
            .unwrap();
        assert_eq!(record["code"], "");
        assert_eq!(record["ignore_admin_area"], "true");
        assert_eq!(store.get(OPTION_GROUP).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn fs_store_round_trips_through_the_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("tagfoot.json");
        let store = FsStore::new(path.clone());

        assert_eq!(store.get(OPTION_GROUP).await.unwrap(), None);

        let record = store
            .set(OPTION_GROUP, &raw(&[("code", "G-ABCD123456")]), &sanitizer())
            .await
            .unwrap();
        assert_eq!(record["code"], "G-ABCD123456");

        // A second store over the same file sees the persisted record.
        let reopened = FsStore::new(path.clone());
        assert_eq!(reopened.get(OPTION_GROUP).await.unwrap(), Some(record));

        let document: StateDocument =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(document.updated_at.is_some());
    }

    #[tokio::test]
    async fn fs_store_set_replaces_the_record_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().join("tagfoot.json"));

        store
            .set(OPTION_GROUP, &raw(&[("ignore_admin_area", "true")]), &sanitizer())
            .await
            .unwrap();
        let record = store
            .set(OPTION_GROUP, &raw(&[("code", "G-ABCD123456")]), &sanitizer())
            .await
            .unwrap();
        // The flag missing from the second submission resets to "false".
        assert_eq!(record["ignore_admin_area"], "false");
        assert_eq!(store.get(OPTION_GROUP).await.unwrap(), Some(record));
    }
}
