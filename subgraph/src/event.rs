//! Decoded triggers delivered by an event source.
//!
//! A [`Trigger`] is a decoded log event, a decoded contract call or a bare
//! block. ABI decoding happens upstream: parameters arrive already typed as
//! [`Value`]s, named after the contract's ABI.

use std::fmt;

use alloy::primitives::{Address, B256, address};
use serde::{Deserialize, Serialize};

use crate::error::MappingError;
use crate::value::{Value, display_str};

/// Address used by [`Event::new`] and [`Call::new`] when none is given.
pub const DEFAULT_MOCK_ADDRESS: Address = address!("A16081F360e3847006dB660bae1c6d1b2e17eC2A");

/// Dispatch position of a trigger within the chain.
///
/// Ordering is lexicographic over `(block, tx_index, log_index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Block number.
    pub block: u64,
    /// Transaction index within the block.
    pub tx_index: u64,
    /// Log index within the block.
    pub log_index: u64,
}

impl Position {
    /// Position after every log and call of `block`.
    #[must_use]
    pub const fn end_of_block(block: u64) -> Self {
        Self {
            block,
            tx_index: u64::MAX,
            log_index: u64::MAX,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tx_index == u64::MAX {
            write!(f, "block {} (end)", self.block)
        } else if self.log_index == u64::MAX {
            write!(f, "block {} tx {} (call)", self.block, self.tx_index)
        } else {
            write!(
                f,
                "block {} tx {} log {}",
                self.block, self.tx_index, self.log_index
            )
        }
    }
}

/// Resume point of a replay.
///
/// Several triggers can share a position (every call of a transaction does),
/// so the cursor also counts how many triggers at `position` were consumed.
/// A trigger that aborts the run is not counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Position of the last consumed trigger.
    pub position: Position,
    /// Triggers consumed at `position`, in input order.
    pub consumed: u64,
}

impl Cursor {
    /// Cursor after the first trigger at `position`.
    #[must_use]
    pub const fn at(position: Position) -> Self {
        Self {
            position,
            consumed: 1,
        }
    }

    /// Cursor after one more trigger at `position`.
    #[must_use]
    pub fn advance(self, position: Position) -> Self {
        if self.position == position {
            Self {
                position,
                consumed: self.consumed + 1,
            }
        } else {
            Self::at(position)
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{})", self.position, self.consumed)
    }
}

/// Block metadata attached to every trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Block {
    /// Block number.
    pub number: u64,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Block hash.
    #[serde(default, with = "display_str")]
    pub hash: B256,
}

/// Transaction metadata attached to log and call triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction hash.
    #[serde(with = "display_str")]
    pub hash: B256,
    /// Index of the transaction within its block.
    #[serde(default)]
    pub index: u64,
    /// Sender.
    #[serde(default, with = "display_str")]
    pub from: Address,
}

/// A named, typed parameter of an event or call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    /// ABI parameter name.
    pub name: String,
    /// Decoded value.
    #[serde(flatten)]
    pub value: Value,
}

impl Param {
    /// Create a parameter.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Typed access to the named parameters of a trigger.
///
/// Missing parameters are [`MappingError::MissingParam`]; parameters of the
/// wrong kind are [`MappingError::TypeMismatch`].
pub trait Parameters {
    /// Event or function name, used in error messages.
    fn trigger_name(&self) -> &str;

    /// The parameter list.
    fn params(&self) -> &[Param];

    /// Raw parameter value.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::MissingParam`] if no parameter has this name.
    fn param(&self, name: &str) -> Result<&Value, MappingError> {
        self.params()
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
            .ok_or_else(|| MappingError::MissingParam {
                trigger: self.trigger_name().to_owned(),
                name: name.to_owned(),
            })
    }

    /// 256-bit integer parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter is missing or not numeric.
    fn big_int(&self, name: &str) -> Result<alloy::primitives::I256, MappingError> {
        self.param(name)?.to_big_int(name)
    }

    /// Unsigned 256-bit integer parameter, over the full `uint256` range.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter is missing, negative or not numeric.
    fn uint256(&self, name: &str) -> Result<alloy::primitives::U256, MappingError> {
        let v = self.param(name)?;
        v.as_uint256()
            .ok_or_else(|| MappingError::type_mismatch(name, "uint256", v.kind()))
    }

    /// Address parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter is missing or not an address.
    fn address(&self, name: &str) -> Result<Address, MappingError> {
        let v = self.param(name)?;
        v.as_address()
            .ok_or_else(|| MappingError::type_mismatch(name, "address", v.kind()))
    }

    /// String parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter is missing or not a string.
    fn string(&self, name: &str) -> Result<&str, MappingError> {
        let v = self.param(name)?;
        v.as_str()
            .ok_or_else(|| MappingError::type_mismatch(name, "string", v.kind()))
    }

    /// Bool parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter is missing or not a bool.
    fn bool(&self, name: &str) -> Result<bool, MappingError> {
        let v = self.param(name)?;
        v.as_bool()
            .ok_or_else(|| MappingError::type_mismatch(name, "bool", v.kind()))
    }

    /// List parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter is missing or not a list.
    fn list(&self, name: &str) -> Result<&[Value], MappingError> {
        let v = self.param(name)?;
        v.as_list()
            .ok_or_else(|| MappingError::type_mismatch(name, "list", v.kind()))
    }
}

/// A decoded log event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Emitting contract.
    #[serde(with = "display_str")]
    pub address: Address,
    /// Event name, e.g. `LogAddAsset`.
    pub name: String,
    /// Enclosing block.
    pub block: Block,
    /// Enclosing transaction.
    pub transaction: Transaction,
    /// Log index within the block.
    pub log_index: u64,
    /// Decoded parameters.
    #[serde(default)]
    pub params: Vec<Param>,
}

impl Event {
    /// Create an event at block 1 with no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            address: DEFAULT_MOCK_ADDRESS,
            name: name.into(),
            block: Block {
                number: 1,
                timestamp: 1,
                hash: B256::ZERO,
            },
            transaction: Transaction::default(),
            log_index: 0,
            params: Vec::new(),
        }
    }

    /// Set the emitting contract.
    #[must_use]
    pub fn with_address(mut self, address: Address) -> Self {
        self.address = address;
        self
    }

    /// Append a parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.push(Param::new(name, value));
        self
    }

    /// Place the event at a block.
    #[must_use]
    pub fn at_block(mut self, number: u64, timestamp: u64) -> Self {
        self.block.number = number;
        self.block.timestamp = timestamp;
        self
    }

    /// Set the enclosing transaction hash and index.
    #[must_use]
    pub fn with_transaction(mut self, hash: B256, index: u64) -> Self {
        self.transaction.hash = hash;
        self.transaction.index = index;
        self
    }

    /// Set the log index.
    #[must_use]
    pub fn with_log_index(mut self, log_index: u64) -> Self {
        self.log_index = log_index;
        self
    }

    /// Unique id for per-event records: `"<txHash>-<logIndex>"`.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{:#x}-{}", self.transaction.hash, self.log_index)
    }

    /// Dispatch position.
    #[must_use]
    pub const fn position(&self) -> Position {
        Position {
            block: self.block.number,
            tx_index: self.transaction.index,
            log_index: self.log_index,
        }
    }
}

impl Parameters for Event {
    fn trigger_name(&self) -> &str {
        &self.name
    }

    fn params(&self) -> &[Param] {
        &self.params
    }
}

/// A decoded contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    /// Called contract.
    #[serde(with = "display_str")]
    pub to: Address,
    /// Caller.
    #[serde(default, with = "display_str")]
    pub from: Address,
    /// Function name, e.g. `createGravatar`.
    pub function: String,
    /// Enclosing block.
    pub block: Block,
    /// Enclosing transaction.
    pub transaction: Transaction,
    /// Decoded inputs.
    #[serde(default)]
    pub inputs: Vec<Param>,
    /// Decoded outputs.
    #[serde(default)]
    pub outputs: Vec<Param>,
}

impl Call {
    /// Create a call at block 1 with no inputs.
    #[must_use]
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            to: DEFAULT_MOCK_ADDRESS,
            from: Address::ZERO,
            function: function.into(),
            block: Block {
                number: 1,
                timestamp: 1,
                hash: B256::ZERO,
            },
            transaction: Transaction::default(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Set the called contract.
    #[must_use]
    pub fn with_to(mut self, to: Address) -> Self {
        self.to = to;
        self
    }

    /// Append an input.
    #[must_use]
    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.push(Param::new(name, value));
        self
    }

    /// Set the enclosing block number and timestamp.
    #[must_use]
    pub fn at_block(mut self, number: u64, timestamp: u64) -> Self {
        self.block.number = number;
        self.block.timestamp = timestamp;
        self
    }

    /// Set the enclosing transaction hash and index.
    #[must_use]
    pub fn with_transaction(mut self, hash: B256, index: u64) -> Self {
        self.transaction.hash = hash;
        self.transaction.index = index;
        self
    }

    /// Dispatch position: after every log of its transaction.
    #[must_use]
    pub const fn position(&self) -> Position {
        Position {
            block: self.block.number,
            tx_index: self.transaction.index,
            log_index: u64::MAX,
        }
    }
}

impl Parameters for Call {
    fn trigger_name(&self) -> &str {
        &self.function
    }

    fn params(&self) -> &[Param] {
        &self.inputs
    }
}

/// One unit of work for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// A decoded log event.
    Log(Event),
    /// A decoded contract call.
    Call(Call),
    /// A new block.
    Block(Block),
}

impl Trigger {
    /// Dispatch position.
    #[must_use]
    pub const fn position(&self) -> Position {
        match self {
            Self::Log(e) => e.position(),
            Self::Call(c) => c.position(),
            Self::Block(b) => Position::end_of_block(b.number),
        }
    }

    /// Enclosing block.
    #[must_use]
    pub const fn block(&self) -> &Block {
        match self {
            Self::Log(e) => &e.block,
            Self::Call(c) => &c.block,
            Self::Block(b) => b,
        }
    }

    /// Short description for logs: event name, function name or `block`.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Log(e) => &e.name,
            Self::Call(c) => &c.function,
            Self::Block(_) => "block",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::i256_from_u64;

    #[test]
    fn event_id_joins_hash_and_log_index() {
        let hash = B256::repeat_byte(0xab);
        let event = Event::new("LogAddAsset")
            .with_transaction(hash, 0)
            .with_log_index(7);
        assert_eq!(event.id(), format!("{hash:#x}-7"));
    }

    #[test]
    fn params_are_typed() {
        let event = Event::new("TokensReleased")
            .with_param("beneficiary", DEFAULT_MOCK_ADDRESS)
            .with_param("amount", i256_from_u64(15));
        assert_eq!(event.big_int("amount").unwrap(), i256_from_u64(15));
        assert_eq!(event.address("beneficiary").unwrap(), DEFAULT_MOCK_ADDRESS);
        assert!(matches!(
            event.big_int("beneficiary"),
            Err(MappingError::TypeMismatch { .. })
        ));
        assert!(matches!(
            event.param("missing"),
            Err(MappingError::MissingParam { .. })
        ));
    }

    #[test]
    fn positions_order_blocks_after_their_logs() {
        let log = Trigger::Log(Event::new("A").at_block(5, 0).with_log_index(900));
        let block = Trigger::Block(Block {
            number: 5,
            ..Block::default()
        });
        let next = Trigger::Log(Event::new("B").at_block(6, 0));
        assert!(log.position() < block.position());
        assert!(block.position() < next.position());
    }

    #[test]
    fn cursor_counts_triggers_sharing_a_position() {
        let call = Call::new("createGravatar").at_block(5, 50).position();
        let cursor = Cursor::at(call).advance(call);
        assert_eq!(cursor.consumed, 2, "second call in the same transaction");
        assert_eq!(cursor.to_string(), "block 5 tx 0 (call) (#2)");

        let next = cursor.advance(Position::end_of_block(5));
        assert_eq!(next, Cursor::at(Position::end_of_block(5)), "new position restarts the count");
    }

    #[test]
    fn trigger_deserializes_from_tagged_json() {
        let json = r#"{
            "type": "log",
            "address": "0xa16081f360e3847006db660bae1c6d1b2e17ec2a",
            "name": "TokensReleased",
            "block": {"number": 10, "timestamp": 1000},
            "transaction": {"hash": "0x0000000000000000000000000000000000000000000000000000000000000001", "index": 2},
            "log_index": 3,
            "params": [{"name": "amount", "kind": "uint256", "value": "15"}]
        }"#;
        let trigger: Trigger = serde_json::from_str(json).unwrap();
        let Trigger::Log(event) = trigger else {
            panic!("expected a log trigger");
        };
        assert_eq!(event.position(), Position { block: 10, tx_index: 2, log_index: 3 });
        assert_eq!(event.big_int("amount").unwrap(), i256_from_u64(15));
    }
}
