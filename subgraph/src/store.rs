//! In-memory entity store.
//!
//! Entities are grouped by type and keyed by id. Every `save` is a full
//! replace and bumps the entity's version. Derived (reverse) relations are
//! never materialized: [`EntityStore::query_derived`] scans the referencing
//! type at call time, so removals and updates are always visible.
//!
//! The engine wraps each trigger in a journal ([`EntityStore::begin`]) so the
//! writes of a failed handler can be undone with [`EntityStore::rollback`].

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::entity::Entity;

/// An entity together with its store version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntity {
    /// Number of times this entity has been saved.
    pub version: u64,
    /// The latest saved record.
    pub entity: Entity,
}

/// Prior state of one key, recorded on first write inside a journal.
#[derive(Debug)]
struct JournalEntry {
    entity_type: String,
    id: String,
    previous: Option<StoredEntity>,
}

/// Keyed, versioned entity store.
#[derive(Debug, Default)]
pub struct EntityStore {
    entities: HashMap<String, BTreeMap<String, StoredEntity>>,
    journal: Option<Vec<JournalEntry>>,
}

impl EntityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from previously persisted records.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = StoredEntity>) -> Self {
        let mut store = Self::new();
        for record in records {
            store
                .entities
                .entry(record.entity.entity_type().to_owned())
                .or_default()
                .insert(record.entity.id().to_owned(), record);
        }
        store
    }

    /// Load an entity by type and id. Absent entities return `None`.
    #[must_use]
    pub fn load(&self, entity_type: &str, id: &str) -> Option<Entity> {
        self.entities
            .get(entity_type)
            .and_then(|by_id| by_id.get(id))
            .map(|stored| stored.entity.clone())
    }

    /// Whether an entity with this type and id exists.
    #[must_use]
    pub fn contains(&self, entity_type: &str, id: &str) -> bool {
        self.entities
            .get(entity_type)
            .is_some_and(|by_id| by_id.contains_key(id))
    }

    /// Current version of an entity, `None` if absent.
    #[must_use]
    pub fn version(&self, entity_type: &str, id: &str) -> Option<u64> {
        self.entities
            .get(entity_type)
            .and_then(|by_id| by_id.get(id))
            .map(|stored| stored.version)
    }

    /// Insert or fully replace an entity.
    pub fn save(&mut self, entity: Entity) {
        let by_id = self
            .entities
            .entry(entity.entity_type().to_owned())
            .or_default();
        let previous = by_id.get(entity.id()).cloned();
        let version = previous.as_ref().map_or(1, |p| p.version + 1);

        if let Some(journal) = self.journal.as_mut() {
            journal.push(JournalEntry {
                entity_type: entity.entity_type().to_owned(),
                id: entity.id().to_owned(),
                previous,
            });
        }

        by_id.insert(entity.id().to_owned(), StoredEntity { version, entity });
    }

    /// Remove an entity. Entities referencing it are left untouched.
    ///
    /// Returns `true` if the entity existed.
    pub fn remove(&mut self, entity_type: &str, id: &str) -> bool {
        let Some(previous) = self
            .entities
            .get_mut(entity_type)
            .and_then(|by_id| by_id.remove(id))
        else {
            return false;
        };

        if let Some(journal) = self.journal.as_mut() {
            journal.push(JournalEntry {
                entity_type: entity_type.to_owned(),
                id: id.to_owned(),
                previous: Some(previous),
            });
        }
        true
    }

    /// All entities of `entity_type` whose `field` references `target_id`,
    /// ordered by id.
    ///
    /// A field references the target when it is the target id itself or a
    /// list containing it.
    #[must_use]
    pub fn query_derived(&self, entity_type: &str, field: &str, target_id: &str) -> Vec<Entity> {
        self.entities
            .get(entity_type)
            .map(|by_id| {
                by_id
                    .values()
                    .filter(|stored| {
                        stored
                            .entity
                            .get(field)
                            .is_some_and(|v| v.references(target_id))
                    })
                    .map(|stored| stored.entity.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of stored entities of a type.
    #[must_use]
    pub fn entity_count(&self, entity_type: &str) -> usize {
        self.entities.get(entity_type).map_or(0, BTreeMap::len)
    }

    /// All entities of a type, ordered by id.
    pub fn entities(&self, entity_type: &str) -> impl Iterator<Item = &Entity> {
        self.entities
            .get(entity_type)
            .into_iter()
            .flat_map(BTreeMap::values)
            .map(|stored| &stored.entity)
    }

    /// Names of all entity types with at least one stored entity, sorted.
    #[must_use]
    pub fn entity_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self
            .entities
            .iter()
            .filter(|(_, by_id)| !by_id.is_empty())
            .map(|(name, _)| name.as_str())
            .collect();
        types.sort_unstable();
        types
    }

    /// Every stored record, for persistence.
    pub fn records(&self) -> impl Iterator<Item = &StoredEntity> {
        self.entities.values().flat_map(BTreeMap::values)
    }

    /// Remove every entity. Not journaled.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.journal = None;
    }

    /// Start recording prior state so the next writes can be rolled back.
    ///
    /// Starting a journal discards any journal that was not committed.
    pub fn begin(&mut self) {
        self.journal = Some(Vec::new());
    }

    /// Keep all writes made since [`begin`](Self::begin).
    pub fn commit(&mut self) {
        self.journal = None;
    }

    /// Undo all writes made since [`begin`](Self::begin).
    pub fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        for entry in journal.into_iter().rev() {
            let by_id = self.entities.entry(entry.entity_type).or_default();
            match entry.previous {
                Some(previous) => {
                    by_id.insert(entry.id, previous);
                }
                None => {
                    by_id.remove(&entry.id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::i256_from_u64;

    fn account(id: &str) -> Entity {
        Entity::new("GraphAccount", id)
    }

    fn name_signal_tx(id: &str, signer: &str) -> Entity {
        let mut nst = Entity::new("NameSignalTransaction", id);
        nst.set("signer", signer);
        nst.set("type", "stake");
        nst.set("tokens", i256_from_u64(1));
        nst
    }

    #[test]
    fn load_after_save_returns_saved_entity() {
        let mut store = EntityStore::new();
        let mut e = account("12");
        e.set("balance", i256_from_u64(100));
        store.save(e.clone());
        assert_eq!(store.load("GraphAccount", "12"), Some(e));
        assert_eq!(store.load("GraphAccount", "13"), None);
    }

    #[test]
    fn save_bumps_version() {
        let mut store = EntityStore::new();
        store.save(account("12"));
        store.save(account("12"));
        assert_eq!(store.version("GraphAccount", "12"), Some(2));
        assert_eq!(store.version("GraphAccount", "1"), None);
    }

    #[test]
    fn derived_relation_reflects_removal() {
        let mut store = EntityStore::new();
        store.save(account("12"));
        for id in ["1234", "2", "2345"] {
            store.save(name_signal_tx(id, "12"));
        }
        let derived = store.query_derived("NameSignalTransaction", "signer", "12");
        assert_eq!(derived.len(), 3, "three transactions reference the account");

        assert!(store.remove("NameSignalTransaction", "2"));
        let derived = store.query_derived("NameSignalTransaction", "signer", "12");
        assert_eq!(derived.len(), 2, "removed transaction must drop out");
        assert!(store.contains("GraphAccount", "12"), "no cascade to the target");
    }

    #[test]
    fn derived_relation_matches_list_fields() {
        let mut store = EntityStore::new();
        store.save(account("12"));
        let mut operated = account("1");
        operated.set("operators", crate::value::Value::List(vec!["12".into()]));
        store.save(operated);

        let operator_of = store.query_derived("GraphAccount", "operators", "12");
        assert_eq!(operator_of.len(), 1);
        assert_eq!(operator_of.first().map(Entity::id), Some("1"));
    }

    #[test]
    fn rollback_restores_prior_state() {
        let mut store = EntityStore::new();
        let mut e = account("12");
        e.set("balance", i256_from_u64(1));
        store.save(e.clone());

        store.begin();
        let mut changed = e.clone();
        changed.set("balance", i256_from_u64(2));
        store.save(changed);
        store.save(account("99"));
        store.remove("GraphAccount", "12");
        store.rollback();

        assert_eq!(store.load("GraphAccount", "12"), Some(e));
        assert_eq!(store.version("GraphAccount", "12"), Some(1));
        assert!(!store.contains("GraphAccount", "99"));
    }

    #[test]
    fn commit_keeps_writes() {
        let mut store = EntityStore::new();
        store.begin();
        store.save(account("1"));
        store.commit();
        store.rollback();
        assert_eq!(store.entity_count("GraphAccount"), 1);
    }

    #[test]
    fn from_records_round_trips() {
        let mut store = EntityStore::new();
        store.save(account("1"));
        store.save(name_signal_tx("2", "1"));
        let records: Vec<StoredEntity> = store.records().cloned().collect();
        let restored = EntityStore::from_records(records);
        assert_eq!(restored.entity_types(), vec!["GraphAccount", "NameSignalTransaction"]);
        assert_eq!(restored.load("NameSignalTransaction", "2"), store.load("NameSignalTransaction", "2"));
    }
}
