//! Data sources and their registry.
//!
//! A data source is an on-chain address or an off-chain content id bound to
//! a handler template. Sources are declared statically at run start or
//! created by handlers while processing. The registry only grows: a source
//! is never removed or replaced once registered.

use std::collections::BTreeMap;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::MappingError;
use crate::value::{Value, display_str};

/// Immutable parameter bag attached to a data source at registration time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataSourceContext(BTreeMap<String, Value>);

impl DataSourceContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry while building the context.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Raw entry, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Entry that the handler cannot proceed without.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::MissingContext`] if the key is absent.
    pub fn require(&self, key: &str) -> Result<&Value, MappingError> {
        self.0
            .get(key)
            .ok_or_else(|| MappingError::MissingContext(key.to_owned()))
    }

    /// Whether the context has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for DataSourceContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// What a data source watches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
    /// Logs, calls and blocks of a contract.
    OnChain {
        /// Contract address.
        #[serde(with = "display_str")]
        address: Address,
    },
    /// A content-addressed off-chain document.
    File {
        /// Content identifier (e.g. an IPFS CID).
        content_id: String,
        /// Whether the content has been handed to its handler.
        #[serde(default)]
        processed: bool,
    },
}

/// A registered data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    /// Name of the handler template bound to this source.
    pub template: String,
    /// Watched address or content.
    pub source: Source,
    /// Parameters supplied at creation.
    #[serde(default)]
    pub context: DataSourceContext,
    /// Block at which the source was created (0 for static sources).
    #[serde(default)]
    pub created_at_block: u64,
}

impl DataSource {
    /// An on-chain source with an empty context.
    #[must_use]
    pub fn on_chain(template: impl Into<String>, address: Address) -> Self {
        Self {
            template: template.into(),
            source: Source::OnChain { address },
            context: DataSourceContext::new(),
            created_at_block: 0,
        }
    }

    /// An off-chain file source.
    #[must_use]
    pub fn file(template: impl Into<String>, content_id: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            source: Source::File {
                content_id: content_id.into(),
                processed: false,
            },
            context: DataSourceContext::new(),
            created_at_block: 0,
        }
    }

    /// Attach a context.
    #[must_use]
    pub fn with_context(mut self, context: DataSourceContext) -> Self {
        self.context = context;
        self
    }

    /// Record the creation block.
    #[must_use]
    pub fn created_at(mut self, block: u64) -> Self {
        self.created_at_block = block;
        self
    }

    /// Watched address; the zero address for file sources.
    #[must_use]
    pub const fn address(&self) -> Address {
        match &self.source {
            Source::OnChain { address } => *address,
            Source::File { .. } => Address::ZERO,
        }
    }

    /// Content id for file sources, lowercase address hex for on-chain ones.
    #[must_use]
    pub fn string_param(&self) -> String {
        match &self.source {
            Source::OnChain { address } => format!("{address:#x}"),
            Source::File { content_id, .. } => content_id.clone(),
        }
    }

    /// Whether this is an off-chain file source.
    #[must_use]
    pub const fn is_file(&self) -> bool {
        matches!(self.source, Source::File { .. })
    }
}

/// All registered data sources, keyed by address or content id.
#[derive(Debug, Default)]
pub struct DataSourceRegistry {
    on_chain: BTreeMap<Address, DataSource>,
    files: BTreeMap<String, DataSource>,
}

impl DataSourceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source. Returns `false` if one already exists for the same
    /// address (or content id); the existing registration is kept as is.
    pub fn register(&mut self, data_source: DataSource) -> bool {
        match &data_source.source {
            Source::OnChain { address } => {
                let key = *address;
                if self.on_chain.contains_key(&key) {
                    return false;
                }
                self.on_chain.insert(key, data_source);
            }
            Source::File { content_id, .. } => {
                let key = content_id.clone();
                if self.files.contains_key(&key) {
                    return false;
                }
                self.files.insert(key, data_source);
            }
        }
        true
    }

    /// The on-chain source watching `address`.
    #[must_use]
    pub fn by_address(&self, address: &Address) -> Option<&DataSource> {
        self.on_chain.get(address)
    }

    /// The file source for `content_id`.
    #[must_use]
    pub fn by_content_id(&self, content_id: &str) -> Option<&DataSource> {
        self.files.get(content_id)
    }

    /// File sources whose content has not been processed yet.
    pub fn pending_files(&self) -> impl Iterator<Item = &DataSource> {
        self.files
            .values()
            .filter(|ds| matches!(ds.source, Source::File { processed: false, .. }))
    }

    /// Mark a file source as processed so it is never dispatched again.
    pub fn mark_processed(&mut self, content_id: &str) {
        if let Some(DataSource {
            source: Source::File { processed, .. },
            ..
        }) = self.files.get_mut(content_id)
        {
            *processed = true;
        }
    }

    /// Number of sources bound to `template`.
    #[must_use]
    pub fn count(&self, template: &str) -> usize {
        self.iter().filter(|ds| ds.template == template).count()
    }

    /// Whether `template` has a source with this string param (address hex
    /// or content id).
    #[must_use]
    pub fn exists(&self, template: &str, key: &str) -> bool {
        self.iter()
            .any(|ds| ds.template == template && ds.string_param().eq_ignore_ascii_case(key))
    }

    /// All sources: on-chain ones by address, then file ones by content id.
    pub fn iter(&self) -> impl Iterator<Item = &DataSource> {
        self.on_chain.values().chain(self.files.values())
    }

    /// Total number of registered sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.on_chain.len() + self.files.len()
    }

    /// Whether no source is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.on_chain.is_empty() && self.files.is_empty()
    }
}

impl FromIterator<DataSource> for DataSourceRegistry {
    fn from_iter<I: IntoIterator<Item = DataSource>>(iter: I) -> Self {
        let mut registry = Self::new();
        for ds in iter {
            registry.register(ds);
        }
        registry
    }
}
