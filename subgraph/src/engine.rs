//! The projection engine.
//!
//! The engine applies triggers to the entity store one at a time:
//! 1. Checks the trigger does not precede the last processed one.
//! 2. Routes it by address to a registered data source, then by event or
//!    function name to that source's template handlers. Block triggers go
//!    to every on-chain source whose template has a block handler.
//! 3. Runs the handlers inside a store journal. On success the journal is
//!    committed and requested data sources are registered; on failure the
//!    journal is rolled back and the [`FailurePolicy`] decides whether the
//!    run stops or the trigger is skipped.
//! 4. Polls off-chain content when new file sources appeared.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::chain::ChainClient;
use crate::content::{ContentFetcher, NoContent};
use crate::context::MappingContext;
use crate::data_source::{DataSource, DataSourceRegistry};
use crate::error::{Error, MappingError, Result};
use crate::event::{Block, Call, Cursor, Event, Position, Trigger};
use crate::handler::{BlockHandler, CallHandler, EventHandler, FileHandler, HandlerSet, HandlerTable};
use crate::store::EntityStore;

/// What happens when a handler fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Return the error and stop; the trigger is not marked processed.
    #[default]
    Abort,
    /// Undo the trigger's writes, log the error and continue.
    Skip,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            other => Err(format!("unknown failure policy `{other}` (expected abort or skip)")),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Abort => "abort",
            Self::Skip => "skip",
        })
    }
}

/// Counters for one engine lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Triggers handled by at least one handler.
    pub processed: u64,
    /// Triggers no handler was registered for.
    pub ignored: u64,
    /// Triggers whose handler failed under [`FailurePolicy::Skip`].
    pub skipped: u64,
    /// Off-chain content documents handed to a file handler.
    pub content_processed: u64,
}

/// Persistable engine state.
#[derive(Debug, Default)]
pub struct EngineState {
    /// Entity store.
    pub store: EntityStore,
    /// Registered data sources.
    pub registry: DataSourceRegistry,
    /// Resume point after the last processed (or skipped) trigger.
    pub cursor: Option<Cursor>,
}

/// Key of the data source a handler runs for.
enum SourceKey {
    Address(Address),
    Content(String),
}

/// A resolved handler together with its payload.
#[derive(Clone, Copy)]
enum Dispatch<'t> {
    Event(EventHandler, &'t Event),
    Call(CallHandler, &'t Call),
    Block(BlockHandler, &'t Block),
    File(FileHandler, &'t [u8]),
}

impl Dispatch<'_> {
    fn name(&self) -> &str {
        match self {
            Self::Event(_, e) => &e.name,
            Self::Call(_, c) => &c.function,
            Self::Block(..) => "block",
            Self::File(..) => "file",
        }
    }

    fn run(self, ctx: &mut MappingContext<'_>) -> std::result::Result<(), MappingError> {
        match self {
            Self::Event(f, e) => f(ctx, e),
            Self::Call(f, c) => f(ctx, c),
            Self::Block(f, b) => f(ctx, b),
            Self::File(f, bytes) => f(ctx, bytes),
        }
    }
}

/// A handler failure, labelled `Template.name`.
struct Failure {
    handler: String,
    source: MappingError,
}

/// Single-threaded projection engine owning the store and the registry.
#[derive(Debug)]
pub struct Engine {
    network: String,
    store: EntityStore,
    registry: DataSourceRegistry,
    handlers: HandlerTable,
    chain: Box<dyn ChainClient>,
    content: Box<dyn ContentFetcher>,
    policy: FailurePolicy,
    cursor: Option<Cursor>,
    stats: RunStats,
}

impl Engine {
    /// Create an engine with an empty store and registry.
    #[must_use]
    pub fn new(handlers: HandlerTable, chain: Box<dyn ChainClient>) -> Self {
        Self {
            network: "mainnet".to_owned(),
            store: EntityStore::new(),
            registry: DataSourceRegistry::new(),
            handlers,
            chain,
            content: Box::new(NoContent),
            policy: FailurePolicy::default(),
            cursor: None,
            stats: RunStats::default(),
        }
    }

    /// Set the network name handlers see.
    #[must_use]
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    /// Set the off-chain content fetcher.
    #[must_use]
    pub fn with_content(mut self, content: Box<dyn ContentFetcher>) -> Self {
        self.content = content;
        self
    }

    /// Set the failure policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Resume from previously persisted state.
    #[must_use]
    pub fn with_state(mut self, state: EngineState) -> Self {
        self.store = state.store;
        self.registry = state.registry;
        self.cursor = state.cursor;
        self
    }

    /// Register a static data source.
    ///
    /// Returns `false` if a source for the same address or content id is
    /// already registered; the existing one is kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTemplate`] if the template has no handlers.
    pub fn register_data_source(&mut self, data_source: DataSource) -> Result<bool> {
        if !self.handlers.contains(&data_source.template) {
            return Err(Error::UnknownTemplate(data_source.template));
        }
        Ok(self.registry.register(data_source))
    }

    /// Apply one trigger.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfOrder`] if the trigger precedes the last one
    /// processed, [`Error::Mapping`] if a handler fails under
    /// [`FailurePolicy::Abort`], and [`Error::Content`] if polling content
    /// created by the trigger fails.
    pub fn process(&mut self, trigger: &Trigger) -> Result<()> {
        let position = trigger.position();
        if let Some(previous) = self.cursor.map(|c| c.position).filter(|previous| position < *previous) {
            return Err(Error::OutOfOrder {
                previous,
                current: position,
            });
        }

        let dispatches = self.route(trigger);
        if dispatches.is_empty() {
            tracing::debug!(%position, trigger = trigger.name(), "no handler, ignored");
            self.stats.ignored += 1;
            self.advance(position);
            return Ok(());
        }

        self.store.begin();
        let mut created = Vec::new();
        for (key, dispatch) in dispatches {
            match self.invoke(&key, *trigger.block(), dispatch) {
                Ok(mut requested) => created.append(&mut requested),
                Err(failure) => {
                    self.store.rollback();
                    self.fail(failure, position)?;
                    self.stats.skipped += 1;
                    self.advance(position);
                    return Ok(());
                }
            }
        }
        self.store.commit();
        self.stats.processed += 1;
        self.advance(position);

        if self.register_created(created) {
            self.poll_content()?;
        }
        Ok(())
    }

    /// Apply triggers in order, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns the first error from [`process`](Self::process).
    pub fn process_all<'t>(&mut self, triggers: impl IntoIterator<Item = &'t Trigger>) -> Result<()> {
        for trigger in triggers {
            self.process(trigger)?;
        }
        Ok(())
    }

    /// Hand every available, unprocessed off-chain content to its file
    /// handler. Content that is not available yet stays pending.
    ///
    /// Returns the number of documents processed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Content`] if fetching fails and [`Error::Mapping`] if
    /// a file handler fails under [`FailurePolicy::Abort`].
    pub fn poll_content(&mut self) -> Result<usize> {
        let mut total = 0;
        loop {
            let pending: Vec<String> = self
                .registry
                .pending_files()
                .map(DataSource::string_param)
                .collect();

            let mut processed = 0;
            for id in pending {
                let bytes = self.content.fetch(&id).map_err(|e| Error::Content {
                    id: id.clone(),
                    message: e.to_string(),
                })?;
                let Some(bytes) = bytes else {
                    tracing::debug!(content_id = %id, "content not available yet");
                    continue;
                };
                self.process_file(&id, &bytes)?;
                processed += 1;
            }

            // Files created by file handlers are picked up by the next pass.
            total += processed;
            if processed == 0 {
                return Ok(total);
            }
        }
    }

    fn process_file(&mut self, id: &str, bytes: &[u8]) -> Result<()> {
        let Some(data_source) = self.registry.by_content_id(id) else {
            return Ok(());
        };
        let position = Position::end_of_block(data_source.created_at_block);
        let block = Block {
            number: data_source.created_at_block,
            ..Block::default()
        };
        let handler = self
            .handlers
            .get(&data_source.template)
            .and_then(|set| set.file_handler());
        let Some(handler) = handler else {
            tracing::warn!(content_id = id, template = %data_source.template, "no file handler, content dropped");
            self.registry.mark_processed(id);
            return Ok(());
        };

        self.store.begin();
        match self.invoke(&SourceKey::Content(id.to_owned()), block, Dispatch::File(handler, bytes)) {
            Ok(created) => {
                self.store.commit();
                self.registry.mark_processed(id);
                self.stats.content_processed += 1;
                self.register_created(created);
                tracing::debug!(content_id = id, "content processed");
                Ok(())
            }
            Err(failure) => {
                self.store.rollback();
                self.fail(failure, position)?;
                self.registry.mark_processed(id);
                self.stats.skipped += 1;
                Ok(())
            }
        }
    }

    fn handler_set(&self, address: &Address) -> Option<&HandlerSet> {
        self.registry
            .by_address(address)
            .and_then(|ds| self.handlers.get(&ds.template))
    }

    fn route<'t>(&self, trigger: &'t Trigger) -> Vec<(SourceKey, Dispatch<'t>)> {
        match trigger {
            Trigger::Log(event) => self
                .handler_set(&event.address)
                .and_then(|set| set.event_handler(&event.name))
                .map(|f| vec![(SourceKey::Address(event.address), Dispatch::Event(f, event))])
                .unwrap_or_default(),
            Trigger::Call(call) => self
                .handler_set(&call.to)
                .and_then(|set| set.call_handler(&call.function))
                .map(|f| vec![(SourceKey::Address(call.to), Dispatch::Call(f, call))])
                .unwrap_or_default(),
            Trigger::Block(block) => self
                .registry
                .iter()
                .filter(|ds| !ds.is_file())
                .filter_map(|ds| {
                    let f = self.handlers.get(&ds.template)?.block_handler()?;
                    Some((SourceKey::Address(ds.address()), Dispatch::Block(f, block)))
                })
                .collect(),
        }
    }

    fn invoke(
        &mut self,
        key: &SourceKey,
        block: Block,
        dispatch: Dispatch<'_>,
    ) -> std::result::Result<Vec<DataSource>, Failure> {
        let data_source = match key {
            SourceKey::Address(address) => self.registry.by_address(address),
            SourceKey::Content(id) => self.registry.by_content_id(id),
        };
        let Some(data_source) = data_source else {
            return Ok(Vec::new());
        };

        let handler = format!("{}.{}", data_source.template, dispatch.name());
        tracing::debug!(handler = %handler, block = block.number, "dispatching");

        let mut ctx = MappingContext::new(
            &mut self.store,
            &self.registry,
            &self.handlers,
            self.chain.as_ref(),
            data_source,
            &self.network,
            block,
        );
        let result = dispatch.run(&mut ctx);
        let created = ctx.into_created();
        result
            .map(|()| created)
            .map_err(|source| Failure { handler, source })
    }

    /// Apply the failure policy. `Ok` means the failure was skipped.
    fn fail(&self, failure: Failure, position: Position) -> Result<()> {
        let Failure { handler, source } = failure;
        match self.policy {
            FailurePolicy::Abort => Err(Error::Mapping {
                handler,
                position,
                source,
            }),
            FailurePolicy::Skip => {
                tracing::error!(%position, handler = %handler, error = %source, "handler failed, skipping");
                Ok(())
            }
        }
    }

    /// Register sources requested by a handler. Returns `true` if a new file
    /// source was added.
    fn register_created(&mut self, created: Vec<DataSource>) -> bool {
        let mut new_files = false;
        for data_source in created {
            let template = data_source.template.clone();
            let key = data_source.string_param();
            let is_file = data_source.is_file();
            if self.registry.register(data_source) {
                tracing::info!(template = %template, source = %key, "data source created");
                new_files |= is_file;
            } else {
                tracing::debug!(template = %template, source = %key, "data source already registered");
            }
        }
        new_files
    }

    /// The entity store.
    #[must_use]
    pub const fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Mutable access to the entity store, for seeding state.
    pub const fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }

    /// The data source registry.
    #[must_use]
    pub const fn registry(&self) -> &DataSourceRegistry {
        &self.registry
    }

    /// The handler table.
    #[must_use]
    pub const fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    /// Resume point after the last processed (or skipped) trigger.
    #[must_use]
    pub const fn cursor(&self) -> Option<Cursor> {
        self.cursor
    }

    fn advance(&mut self, position: Position) {
        self.cursor = Some(self.cursor.map_or_else(|| Cursor::at(position), |c| c.advance(position)));
    }

    /// Counters since the engine was created.
    #[must_use]
    pub const fn stats(&self) -> RunStats {
        self.stats
    }

    /// The current failure policy.
    #[must_use]
    pub const fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Consume the engine, keeping its persistable state.
    #[must_use]
    pub fn into_state(self) -> EngineState {
        EngineState {
            store: self.store,
            registry: self.registry,
            cursor: self.cursor,
        }
    }
}
