//! Subgraph mappings on the native [`subgraph`] runtime.
//!
//! Handlers for lending pairs and their `BentoBox` factory, Graph token lock
//! wallets with their manager and vesting metadata, the gravatar registry,
//! and NFT vault eligibility modules. [`handler_table`] binds every template
//! name to its handlers; the engine is built from it once at startup.
//!
//! The binary replays a trigger file through the engine:
//!
//! ```bash
//! # Replay with recorded contract reads, keeping state in ./state
//! subgraph-mappings run --config config.toml --events triggers.ndjson --state-dir state
//!
//! # Look at what was projected
//! subgraph-mappings inspect --state-dir state --entity LendingPair
//! ```

use subgraph::HandlerTable;

pub mod bento_box;
pub mod config;
pub mod eligibility;
pub mod gravity;
pub mod lending_pair;
pub mod numeric;
pub mod schema;
pub mod snapshot;
pub mod source;
pub mod token_lock;

/// Every template this crate handles.
#[must_use]
pub fn handler_table() -> HandlerTable {
    use schema::templates;

    HandlerTable::new()
        .with(templates::BENTO_BOX, bento_box::handlers())
        .with(templates::LENDING_PAIR, lending_pair::handlers())
        .with(templates::TOKEN_LOCK_MANAGER, token_lock::manager_handlers())
        .with(templates::TOKEN_LOCK_WALLET, token_lock::wallet_handlers())
        .with(templates::TOKEN_LOCK_METADATA, token_lock::metadata_handlers())
        .with(templates::GRAVITY, gravity::handlers())
        .with(templates::ELIGIBILITY_MODULE, eligibility::handlers())
}
