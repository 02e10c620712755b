//! The handle a mapping handler works through.
//!
//! A [`MappingContext`] is built by the engine for one handler invocation.
//! It gives the handler the entity store, a read-only view of the data
//! source being handled, contract reads at the trigger's block and the
//! ability to request new data sources. Requested sources are registered by
//! the engine only after the handler returns successfully.

use alloy::primitives::Address;

use crate::chain::{CallResult, ChainClient, ContractCall};
use crate::data_source::{DataSource, DataSourceContext, DataSourceRegistry};
use crate::entity::Entity;
use crate::error::MappingError;
use crate::event::Block;
use crate::handler::HandlerTable;
use crate::store::EntityStore;
use crate::value::Value;

/// Everything a handler may touch while processing one trigger.
#[derive(Debug)]
pub struct MappingContext<'a> {
    store: &'a mut EntityStore,
    registry: &'a DataSourceRegistry,
    handlers: &'a HandlerTable,
    chain: &'a dyn ChainClient,
    data_source: &'a DataSource,
    network: &'a str,
    block: Block,
    created: Vec<DataSource>,
}

impl<'a> MappingContext<'a> {
    /// Assemble a context. Normally only the engine does this.
    #[must_use]
    pub fn new(
        store: &'a mut EntityStore,
        registry: &'a DataSourceRegistry,
        handlers: &'a HandlerTable,
        chain: &'a dyn ChainClient,
        data_source: &'a DataSource,
        network: &'a str,
        block: Block,
    ) -> Self {
        Self {
            store,
            registry,
            handlers,
            chain,
            data_source,
            network,
            block,
            created: Vec::new(),
        }
    }

    // -- store --

    /// Load an entity, `None` if absent.
    #[must_use]
    pub fn load(&self, entity_type: &str, id: &str) -> Option<Entity> {
        self.store.load(entity_type, id)
    }

    /// Load an entity the handler cannot proceed without.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::MissingEntity`] if it is absent.
    pub fn require(&self, entity_type: &str, id: &str) -> Result<Entity, MappingError> {
        self.store
            .load(entity_type, id)
            .ok_or_else(|| MappingError::missing_entity(entity_type, id))
    }

    /// Load an entity, or start a new one with no fields set.
    #[must_use]
    pub fn load_or_new(&self, entity_type: &str, id: &str) -> Entity {
        self.store
            .load(entity_type, id)
            .unwrap_or_else(|| Entity::new(entity_type, id))
    }

    /// Insert or replace an entity.
    pub fn save(&mut self, entity: Entity) {
        self.store.save(entity);
    }

    /// Remove an entity. Returns `true` if it existed.
    pub fn remove(&mut self, entity_type: &str, id: &str) -> bool {
        self.store.remove(entity_type, id)
    }

    /// Entities of `entity_type` whose `field` references `id`.
    #[must_use]
    pub fn derived(&self, entity_type: &str, field: &str, id: &str) -> Vec<Entity> {
        self.store.query_derived(entity_type, field, id)
    }

    /// Number of stored entities of a type.
    #[must_use]
    pub fn entity_count(&self, entity_type: &str) -> usize {
        self.store.entity_count(entity_type)
    }

    // -- data source view --

    /// The data source whose trigger is being handled.
    #[must_use]
    pub const fn data_source(&self) -> &DataSource {
        self.data_source
    }

    /// Address of the handled data source (zero for file sources).
    #[must_use]
    pub const fn address(&self) -> Address {
        self.data_source.address()
    }

    /// Context attached to the handled data source.
    #[must_use]
    pub const fn context(&self) -> &DataSourceContext {
        &self.data_source.context
    }

    /// Name of the network being indexed.
    #[must_use]
    pub const fn network(&self) -> &str {
        self.network
    }

    /// Block of the trigger being handled.
    #[must_use]
    pub const fn block(&self) -> &Block {
        &self.block
    }

    /// Number of sources bound to `template`, including ones requested by
    /// this handler.
    #[must_use]
    pub fn data_source_count(&self, template: &str) -> usize {
        self.registry.count(template)
            + self
                .created
                .iter()
                .filter(|ds| ds.template == template)
                .count()
    }

    /// Whether `template` has a source for `key` (address hex or content id),
    /// including ones requested by this handler.
    #[must_use]
    pub fn data_source_exists(&self, template: &str, key: &str) -> bool {
        self.registry.exists(template, key)
            || self
                .created
                .iter()
                .any(|ds| ds.template == template && ds.string_param().eq_ignore_ascii_case(key))
    }

    // -- dynamic data sources --

    /// Start watching `address` with `template`.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::UnknownTemplate`] if no handler set exists for
    /// the template.
    pub fn create_data_source(&mut self, template: &str, address: Address) -> Result<(), MappingError> {
        self.create_data_source_with_context(template, address, DataSourceContext::new())
    }

    /// Start watching `address` with `template`, passing `context` to every
    /// handler invocation for that source.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::UnknownTemplate`] if no handler set exists for
    /// the template.
    pub fn create_data_source_with_context(
        &mut self,
        template: &str,
        address: Address,
        context: DataSourceContext,
    ) -> Result<(), MappingError> {
        self.push_created(DataSource::on_chain(template, address).with_context(context))
    }

    /// Start tracking off-chain content `content_id` with `template`.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::UnknownTemplate`] if no handler set exists for
    /// the template.
    pub fn create_file_data_source(&mut self, template: &str, content_id: &str) -> Result<(), MappingError> {
        self.push_created(DataSource::file(template, content_id))
    }

    fn push_created(&mut self, data_source: DataSource) -> Result<(), MappingError> {
        if !self.handlers.contains(&data_source.template) {
            return Err(MappingError::UnknownTemplate(data_source.template));
        }
        self.created.push(data_source.created_at(self.block.number));
        Ok(())
    }

    // -- contract reads --

    /// Read contract state at the current block. A revert is a result, not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::Chain`] if the chain client fails.
    pub fn try_call(
        &self,
        address: Address,
        signature: &str,
        args: Vec<Value>,
    ) -> Result<CallResult, MappingError> {
        let call = ContractCall {
            address,
            signature: signature.to_owned(),
            args,
            block: self.block.number,
        };
        Ok(self.chain.call(&call)?)
    }

    /// Read contract state at the current block, treating a revert as fatal.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::CallReverted`] if the call reverts and
    /// [`MappingError::Chain`] if the chain client fails.
    pub fn call(
        &self,
        address: Address,
        signature: &str,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, MappingError> {
        match self.try_call(address, signature, args)? {
            CallResult::Value(values) => Ok(values),
            CallResult::Reverted => Err(MappingError::CallReverted {
                address,
                function: signature.to_owned(),
            }),
        }
    }

    pub(crate) fn into_created(self) -> Vec<DataSource> {
        self.created
    }
}
