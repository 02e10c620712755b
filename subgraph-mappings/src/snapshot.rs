//! Engine state persistence.
//!
//! The state directory contains a `snapshot.json` with every entity, every
//! registered data source and the replay cursor, so that subsequent runs
//! only apply the triggers not yet consumed.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subgraph::{Cursor, DataSource, EngineState, EntityStore, StoredEntity};

const FILE_NAME: &str = "snapshot.json";
const TMP_FILE_NAME: &str = "snapshot.json.tmp";

/// Persisted engine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Resume point after the last processed (or skipped) trigger.
    pub cursor: Option<Cursor>,
    /// When the snapshot was taken.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub saved_at: DateTime<Utc>,
    /// Every stored entity, ordered by type then id.
    pub entities: Vec<StoredEntity>,
    /// Every registered data source: on-chain sources by address, then file
    /// sources by content id.
    pub data_sources: Vec<DataSource>,
}

impl Snapshot {
    /// Capture engine state at the current time.
    #[must_use]
    pub fn capture(state: &EngineState) -> Self {
        let mut entities: Vec<StoredEntity> = state.store.records().cloned().collect();
        entities.sort_by(|a, b| {
            (a.entity.entity_type(), a.entity.id()).cmp(&(b.entity.entity_type(), b.entity.id()))
        });
        Self {
            cursor: state.cursor,
            saved_at: Utc::now(),
            entities,
            data_sources: state.registry.iter().cloned().collect(),
        }
    }

    /// Rebuild engine state.
    #[must_use]
    pub fn into_state(self) -> EngineState {
        EngineState {
            store: EntityStore::from_records(self.entities),
            registry: self.data_sources.into_iter().collect(),
            cursor: self.cursor,
        }
    }

    /// Read the snapshot from `<dir>/snapshot.json`.
    ///
    /// Returns `None` if the file does not exist (first run) or contains
    /// invalid JSON (logs a warning and triggers a fresh replay).
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read (I/O error).
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        match serde_json::from_str::<Self>(&data) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupted snapshot, starting fresh");
                Ok(None)
            }
        }
    }

    /// Persist the snapshot to `<dir>/snapshot.json` atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

        let path = dir.join(FILE_NAME);
        let tmp = dir.join(TMP_FILE_NAME);

        std::fs::write(&tmp, serde_json::to_string_pretty(self)?.as_bytes())
            .with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subgraph::{DEFAULT_MOCK_ADDRESS, DataSourceContext, Entity, Position, Value};

    fn state() -> EngineState {
        let mut store = EntityStore::new();
        let mut wallet = Entity::new("TokenLockWallet", "0xabc");
        wallet.set("tokensReleased", subgraph::i256_from_u64(7));
        store.save(wallet.clone());
        store.save(wallet);
        store.save(Entity::new("Gravatar", "1"));

        let registry = [
            DataSource::on_chain("GraphTokenLockWallet", DEFAULT_MOCK_ADDRESS)
                .with_context(DataSourceContext::new().with("contextVal", 325))
                .created_at(9),
            DataSource::file("TokenLockMetadata", "QmDoc"),
        ]
        .into_iter()
        .collect();

        EngineState {
            store,
            registry,
            cursor: Some(Cursor {
                position: Position {
                    block: 9,
                    tx_index: 1,
                    log_index: 3,
                },
                consumed: 2,
            }),
        }
    }

    #[test]
    fn missing_snapshot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Snapshot::load(dir.path()).unwrap().is_none(), "first run has no snapshot");
    }

    #[test]
    fn save_then_load_restores_state() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        Snapshot::capture(&state()).save(&state_dir).unwrap();
        assert!(!state_dir.join(TMP_FILE_NAME).exists(), "temporary file renamed away");

        let snapshot = Snapshot::load(&state_dir).unwrap().unwrap();
        assert_eq!(
            snapshot.entities.iter().map(|r| r.entity.entity_type()).collect::<Vec<_>>(),
            ["Gravatar", "TokenLockWallet"],
            "entities sorted by type"
        );

        let restored = snapshot.into_state();
        assert_eq!(restored.cursor, state().cursor, "cursor");
        assert_eq!(restored.store.version("TokenLockWallet", "0xabc"), Some(2), "version kept");
        let wallet = restored.store.load("TokenLockWallet", "0xabc").unwrap();
        assert_eq!(wallet.big_int("tokensReleased").unwrap(), subgraph::i256_from_u64(7), "field kept");

        let source = restored.registry.by_address(&DEFAULT_MOCK_ADDRESS).unwrap();
        assert_eq!(source.created_at_block, 9, "creation block kept");
        assert_eq!(
            source.context.get("contextVal"),
            Some(&Value::Int(325)),
            "context kept"
        );
        assert!(restored.registry.by_content_id("QmDoc").is_some(), "file source kept");
    }

    #[test]
    fn corrupted_snapshot_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FILE_NAME), "{not json").unwrap();
        assert!(Snapshot::load(dir.path()).unwrap().is_none(), "corrupted file ignored");
    }
}
