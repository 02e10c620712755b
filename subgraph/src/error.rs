//! Error types for the projection runtime.

use alloy::primitives::Address;
use thiserror::Error;

use crate::chain::ChainError;
use crate::event::Position;

/// Failure raised by a mapping handler while processing one trigger.
///
/// Every variant is fatal for the trigger that raised it. Whether the run
/// aborts or skips the trigger is decided by the engine's
/// [`FailurePolicy`](crate::engine::FailurePolicy), never by the handler.
#[derive(Debug, Error)]
pub enum MappingError {
    /// A handler required an entity that is not in the store.
    #[error("missing required entity {entity_type} `{id}`")]
    MissingEntity {
        /// Entity type name.
        entity_type: String,
        /// Entity id that was looked up.
        id: String,
    },

    /// The trigger did not carry a parameter the handler reads.
    #[error("trigger `{trigger}` has no parameter `{name}`")]
    MissingParam {
        /// Event or function name.
        trigger: String,
        /// Parameter name.
        name: String,
    },

    /// A parameter, field or call output held a different kind of value.
    #[error("`{field}` expected {expected}, found {found}")]
    TypeMismatch {
        /// Parameter, field or output name.
        field: String,
        /// Expected value kind.
        expected: &'static str,
        /// Actual value kind.
        found: &'static str,
    },

    /// The data source context lacks a key the handler requires.
    #[error("data source context has no key `{0}`")]
    MissingContext(String),

    /// A non-`try` contract call reverted.
    #[error("call `{function}` on {address} reverted")]
    CallReverted {
        /// Contract address.
        address: Address,
        /// Function signature.
        function: String,
    },

    /// The chain client failed for a reason other than a revert.
    #[error("chain client error: {0}")]
    Chain(#[from] ChainError),

    /// A checked 256-bit operation overflowed.
    #[error("arithmetic overflow in `{0}`")]
    Arithmetic(String),

    /// An unsigned value does not fit the signed 256-bit range.
    #[error("`{field}` = {value} exceeds the signed 256-bit range")]
    OutOfRange {
        /// Parameter or field name.
        field: String,
        /// The unsigned value, in decimal.
        value: String,
    },

    /// A handler asked to create a data source from an unknown template.
    #[error("unknown data source template `{0}`")]
    UnknownTemplate(String),
}

impl MappingError {
    /// Shorthand for [`MappingError::MissingEntity`].
    pub fn missing_entity(entity_type: &str, id: &str) -> Self {
        Self::MissingEntity {
            entity_type: entity_type.to_owned(),
            id: id.to_owned(),
        }
    }

    /// Shorthand for [`MappingError::TypeMismatch`].
    pub fn type_mismatch(field: &str, expected: &'static str, found: &'static str) -> Self {
        Self::TypeMismatch {
            field: field.to_owned(),
            expected,
            found,
        }
    }
}

/// Engine-level failure surfaced to the caller of
/// [`Engine::process`](crate::engine::Engine::process).
#[derive(Debug, Error)]
pub enum Error {
    /// A handler failed and the failure policy is `abort`.
    #[error("handler `{handler}` failed at {position}: {source}")]
    Mapping {
        /// `Template.EventName` of the failing handler.
        handler: String,
        /// Position of the trigger being processed.
        position: Position,
        /// Underlying handler error.
        #[source]
        source: MappingError,
    },

    /// A trigger arrived before one that was already processed.
    #[error("trigger at {current} arrived after {previous}")]
    OutOfOrder {
        /// Last processed position.
        previous: Position,
        /// Offending position.
        current: Position,
    },

    /// A data source references a template with no handler set.
    #[error("unknown data source template `{0}`")]
    UnknownTemplate(String),

    /// The content fetcher failed.
    #[error("content fetch for `{id}` failed: {message}")]
    Content {
        /// Content identifier.
        id: String,
        /// Fetcher error message.
        message: String,
    },
}

/// Convenience alias for engine results.
pub type Result<T, E = Error> = std::result::Result<T, E>;
