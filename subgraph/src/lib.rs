//! Native runtime for subgraph event mappings.
//!
//! Hosts the per-event mapping functions of a blockchain-indexing subgraph
//! outside their original sandbox. Decoded triggers (log events, contract
//! calls, blocks) flow through the [`Engine`], which routes each one to the
//! handler registered for its data source and lets the handler read and
//! write entities through a [`MappingContext`].
//!
//! # Example
//!
//! ```
//! use subgraph::{
//!     DataSource, Engine, Event, HandlerSet, HandlerTable, MappingContext, MappingError,
//!     MockChainClient, Parameters, Trigger, DEFAULT_MOCK_ADDRESS,
//! };
//!
//! fn on_transfer(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
//!     let mut account = ctx.load_or_new("Account", &format!("{:#x}", event.address("to")?));
//!     let balance = account.big_int("balance")? + event.big_int("value")?;
//!     account.set("balance", balance);
//!     ctx.save(account);
//!     Ok(())
//! }
//!
//! let handlers = HandlerTable::new().with("Token", HandlerSet::new().event("Transfer", on_transfer));
//! let mut engine = Engine::new(handlers, Box::new(MockChainClient::new()));
//! engine.register_data_source(DataSource::on_chain("Token", DEFAULT_MOCK_ADDRESS))?;
//!
//! let transfer = Event::new("Transfer")
//!     .with_param("to", DEFAULT_MOCK_ADDRESS)
//!     .with_param("value", subgraph::i256_from_u64(10));
//! engine.process(&Trigger::Log(transfer))?;
//! assert_eq!(engine.store().entity_count("Account"), 1);
//! # Ok::<(), subgraph::Error>(())
//! ```

pub mod chain;
pub mod content;
pub mod context;
pub mod data_source;
pub mod engine;
pub mod entity;
pub mod error;
pub mod event;
pub mod handler;
pub mod rpc;
pub mod store;
pub mod value;

pub use chain::{CallResult, ChainClient, ChainError, ContractCall, MockChainClient, MockedCall};
pub use content::{ContentFetcher, DirectoryContent, InMemoryContent, NoContent};
pub use context::MappingContext;
pub use data_source::{DataSource, DataSourceContext, DataSourceRegistry, Source};
pub use engine::{Engine, EngineState, FailurePolicy, RunStats};
pub use entity::Entity;
pub use error::{Error, MappingError, Result};
pub use event::{
    Block, Call, Cursor, DEFAULT_MOCK_ADDRESS, Event, Param, Parameters, Position, Transaction, Trigger,
};
pub use handler::{BlockHandler, CallHandler, EventHandler, FileHandler, HandlerSet, HandlerTable};
pub use rpc::RpcChainClient;
pub use store::{EntityStore, StoredEntity};
pub use value::{Value, i256_from_i64, i256_from_u64, parse_i256, parse_u256};
