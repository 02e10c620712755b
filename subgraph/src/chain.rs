//! Contract reads at handler time.
//!
//! Handlers read live contract state through a [`ChainClient`] handed to them
//! by the engine. A read either yields values or reports that the call
//! reverted; there is no retry. Everything else (transport failures,
//! encoding problems, unmocked calls in tests) is a [`ChainError`].

use std::fmt;
use std::time::Duration;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::{Value, display_str};

/// A read-only contract call, pinned to the block being processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    /// Contract to call.
    pub address: Address,
    /// Signature with inputs and outputs, e.g. `"finalized()(bool)"`.
    pub signature: String,
    /// Arguments matching the signature's inputs.
    pub args: Vec<Value>,
    /// Block to execute the call at.
    pub block: u64,
}

/// Result of a contract read that did not fail at the transport level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallResult {
    /// Decoded return values, in output order.
    Value(Vec<Value>),
    /// The call reverted.
    Reverted,
}

impl CallResult {
    /// Whether the call reverted.
    #[must_use]
    pub const fn is_reverted(&self) -> bool {
        matches!(self, Self::Reverted)
    }

    /// The return values, or `None` if the call reverted.
    #[must_use]
    pub fn into_values(self) -> Option<Vec<Value>> {
        match self {
            Self::Value(values) => Some(values),
            Self::Reverted => None,
        }
    }
}

/// Chain client failure other than a revert.
#[derive(Debug, Error)]
pub enum ChainError {
    /// No mocked result matches the call.
    #[error("no mocked result for `{signature}` on {address}")]
    NotMocked {
        /// Contract address.
        address: Address,
        /// Function signature.
        signature: String,
    },

    /// The signature or arguments could not be ABI encoded, or the
    /// return data could not be decoded.
    #[error("ABI error: {0}")]
    Abi(String),

    /// The RPC endpoint failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The RPC endpoint did not answer in time.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
}

/// Synchronous contract reads.
pub trait ChainClient: fmt::Debug {
    /// Execute a read-only call.
    ///
    /// # Errors
    ///
    /// Returns a [`ChainError`] if the call could not be executed. A revert
    /// is not an error; it is reported as [`CallResult::Reverted`].
    fn call(&self, call: &ContractCall) -> Result<CallResult, ChainError>;
}

/// One canned call result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockedCall {
    /// Contract address.
    #[serde(with = "display_str")]
    pub address: Address,
    /// Function signature, matched verbatim.
    pub signature: String,
    /// Arguments, matched exactly.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Values returned when not reverted.
    #[serde(default)]
    pub outputs: Vec<Value>,
    /// Whether the call reverts.
    #[serde(default)]
    pub reverted: bool,
}

/// Chain client answering from canned results, regardless of block.
///
/// Used by tests and by offline replays that recorded their contract reads.
/// Calls without a matching entry fail with [`ChainError::NotMocked`].
#[derive(Debug, Clone, Default)]
pub struct MockChainClient {
    calls: Vec<MockedCall>,
}

impl MockChainClient {
    /// Create a client with no canned results.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load canned results from a JSON array of [`MockedCall`]s.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            calls: serde_json::from_str(json)?,
        })
    }

    /// Return `outputs` for `signature(args)` on `address`.
    pub fn mock(
        &mut self,
        address: Address,
        signature: impl Into<String>,
        args: Vec<Value>,
        outputs: Vec<Value>,
    ) -> &mut Self {
        self.push(address, signature.into(), args, outputs, false)
    }

    /// Make `signature(args)` on `address` revert.
    pub fn mock_revert(
        &mut self,
        address: Address,
        signature: impl Into<String>,
        args: Vec<Value>,
    ) -> &mut Self {
        self.push(address, signature.into(), args, Vec::new(), true)
    }

    fn push(
        &mut self,
        address: Address,
        signature: String,
        args: Vec<Value>,
        outputs: Vec<Value>,
        reverted: bool,
    ) -> &mut Self {
        // Later mocks shadow earlier ones for the same call.
        self.calls.retain(|c| {
            !(c.address == address && c.signature == signature && c.args == args)
        });
        self.calls.push(MockedCall {
            address,
            signature,
            args,
            outputs,
            reverted,
        });
        self
    }
}

impl ChainClient for MockChainClient {
    fn call(&self, call: &ContractCall) -> Result<CallResult, ChainError> {
        let mocked = self
            .calls
            .iter()
            .find(|c| c.address == call.address && c.signature == call.signature && c.args == call.args)
            .ok_or_else(|| ChainError::NotMocked {
                address: call.address,
                signature: call.signature.clone(),
            })?;

        if mocked.reverted {
            Ok(CallResult::Reverted)
        } else {
            Ok(CallResult::Value(mocked.outputs.clone()))
        }
    }
}
