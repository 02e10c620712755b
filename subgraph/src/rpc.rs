//! `eth_call` chain client backed by an alloy HTTP provider.
//!
//! The engine is synchronous, so the client owns a current-thread tokio
//! runtime and blocks on each request. Calls are made at the block of the
//! trigger being processed, with a per-request timeout and no retry.

use std::fmt;
use std::time::Duration;

use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::network::TransactionBuilder;
use alloy::primitives::{B256, Bytes, keccak256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{BlockId, TransactionRequest};
use alloy::transports::{RpcError, TransportErrorKind};

use crate::chain::{CallResult, ChainClient, ChainError, ContractCall};
use crate::value::Value;

/// Per-request timeout for `eth_call`.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-RPC error code used by geth-compatible nodes for execution reverts.
const EXECUTION_REVERTED: i64 = 3;

/// Chain client issuing `eth_call` against a JSON-RPC endpoint.
pub struct RpcChainClient {
    url: String,
    provider: DynProvider,
    runtime: tokio::runtime::Runtime,
}

impl RpcChainClient {
    /// Connect to an HTTP JSON-RPC endpoint.
    ///
    /// No request is made until the first call.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the runtime cannot start.
    pub fn connect(url: &str) -> Result<Self, ChainError> {
        let parsed = url
            .parse()
            .map_err(|e| ChainError::Transport(format!("invalid RPC URL {url}: {e}")))?;
        let provider = ProviderBuilder::new().connect_http(parsed).erased();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ChainError::Transport(format!("failed to start runtime: {e}")))?;

        tracing::info!(rpc = url, "chain client connected");
        Ok(Self {
            url: url.to_owned(),
            provider,
            runtime,
        })
    }
}

impl fmt::Debug for RpcChainClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcChainClient")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl ChainClient for RpcChainClient {
    fn call(&self, call: &ContractCall) -> Result<CallResult, ChainError> {
        let signature = Signature::parse(&call.signature)?;
        let calldata = signature.encode_call(&call.args)?;
        let tx = TransactionRequest::default()
            .with_to(call.address)
            .with_input(calldata);

        let response = self.runtime.block_on(async {
            tokio::time::timeout(
                REQUEST_TIMEOUT,
                self.provider.call(tx).block(BlockId::number(call.block)),
            )
            .await
        });

        match response {
            Err(_) => Err(ChainError::Timeout(REQUEST_TIMEOUT)),
            Ok(Err(e)) if is_revert(&e) => {
                tracing::debug!(address = %call.address, signature = %call.signature, block = call.block, "call reverted");
                Ok(CallResult::Reverted)
            }
            Ok(Err(e)) => Err(ChainError::Transport(e.to_string())),
            // A call to an account without code returns nothing.
            Ok(Ok(data)) if data.is_empty() && !signature.outputs.is_empty() => {
                Ok(CallResult::Reverted)
            }
            Ok(Ok(data)) => signature.decode_output(&data).map(CallResult::Value),
        }
    }
}

fn is_revert(e: &RpcError<TransportErrorKind>) -> bool {
    e.as_error_resp().is_some_and(|payload| {
        payload.code == EXECUTION_REVERTED || payload.message.contains("revert")
    })
}

/// A parsed `name(inputs)(outputs)` signature.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Signature {
    selector: [u8; 4],
    inputs: Vec<DynSolType>,
    outputs: Vec<DynSolType>,
}

impl Signature {
    fn parse(signature: &str) -> Result<Self, ChainError> {
        let invalid = || ChainError::Abi(format!("invalid signature `{signature}`"));

        let open = signature.find('(').ok_or_else(invalid)?;
        let close = matching_paren(signature, open).ok_or_else(invalid)?;
        let function = signature.get(..=close).ok_or_else(invalid)?;
        let rest = signature.get(close + 1..).ok_or_else(invalid)?;

        let inputs = tuple_types(signature.get(open..=close).ok_or_else(invalid)?)?;
        let outputs = if rest.is_empty() {
            Vec::new()
        } else {
            tuple_types(rest)?
        };

        let mut selector = [0u8; 4];
        for (dst, src) in selector.iter_mut().zip(keccak256(function.as_bytes()).iter()) {
            *dst = *src;
        }

        Ok(Self {
            selector,
            inputs,
            outputs,
        })
    }

    fn encode_call(&self, args: &[Value]) -> Result<Bytes, ChainError> {
        if args.len() != self.inputs.len() {
            return Err(ChainError::Abi(format!(
                "expected {} arguments, got {}",
                self.inputs.len(),
                args.len()
            )));
        }
        let values = self
            .inputs
            .iter()
            .zip(args)
            .map(|(ty, v)| to_sol_value(ty, v))
            .collect::<Result<Vec<_>, _>>()?;

        let mut calldata = self.selector.to_vec();
        if !values.is_empty() {
            calldata.extend(DynSolValue::Tuple(values).abi_encode_params());
        }
        Ok(calldata.into())
    }

    fn decode_output(&self, data: &[u8]) -> Result<Vec<Value>, ChainError> {
        if self.outputs.is_empty() {
            return Ok(Vec::new());
        }
        let decoded = DynSolType::Tuple(self.outputs.clone())
            .abi_decode_params(data)
            .map_err(|e| ChainError::Abi(e.to_string()))?;
        match decoded {
            DynSolValue::Tuple(values) => values.into_iter().map(from_sol_value).collect(),
            other => from_sol_value(other).map(|v| vec![v]),
        }
    }
}

/// Byte offset of the `)` closing the `(` at `open`.
fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices().skip_while(|(i, _)| *i < open) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn tuple_types(s: &str) -> Result<Vec<DynSolType>, ChainError> {
    match DynSolType::parse(s) {
        Ok(DynSolType::Tuple(types)) => Ok(types),
        Ok(other) => Ok(vec![other]),
        Err(e) => Err(ChainError::Abi(format!("invalid types `{s}`: {e}"))),
    }
}

fn to_sol_value(ty: &DynSolType, value: &Value) -> Result<DynSolValue, ChainError> {
    let mismatch = || ChainError::Abi(format!("cannot encode {} as {ty}", value.kind()));
    let sol = match (ty, value) {
        (DynSolType::Address, Value::Address(a)) => DynSolValue::Address(*a),
        (DynSolType::Bool, Value::Bool(b)) => DynSolValue::Bool(*b),
        (DynSolType::String, Value::String(s)) => DynSolValue::String(s.clone()),
        (DynSolType::Bytes, Value::Bytes(b)) => DynSolValue::Bytes(b.to_vec()),
        (DynSolType::FixedBytes(n), Value::Bytes(b)) if b.len() <= *n => {
            DynSolValue::FixedBytes(B256::right_padding_from(b), *n)
        }
        (DynSolType::Uint(bits), v) => match v.as_uint256() {
            Some(n) => DynSolValue::Uint(n, *bits),
            None if v.as_big_int().is_some() => {
                return Err(ChainError::Abi(format!("negative value {v} for {ty}")));
            }
            None => return Err(mismatch()),
        },
        (DynSolType::Int(bits), v) => DynSolValue::Int(v.as_big_int().ok_or_else(mismatch)?, *bits),
        (DynSolType::Array(inner), Value::List(items)) => DynSolValue::Array(
            items
                .iter()
                .map(|item| to_sol_value(inner, item))
                .collect::<Result<_, _>>()?,
        ),
        (DynSolType::FixedArray(inner, len), Value::List(items)) if items.len() == *len => {
            DynSolValue::FixedArray(
                items
                    .iter()
                    .map(|item| to_sol_value(inner, item))
                    .collect::<Result<_, _>>()?,
            )
        }
        _ => return Err(mismatch()),
    };
    Ok(sol)
}

fn from_sol_value(value: DynSolValue) -> Result<Value, ChainError> {
    let v = match value {
        DynSolValue::Address(a) => Value::Address(a),
        DynSolValue::Bool(b) => Value::Bool(b),
        DynSolValue::String(s) => Value::String(s),
        DynSolValue::Bytes(b) => Value::Bytes(b.into()),
        DynSolValue::FixedBytes(word, n) => {
            Value::Bytes(Bytes::copy_from_slice(word.get(..n).unwrap_or_default()))
        }
        DynSolValue::Int(n, _) => Value::BigInt(n),
        DynSolValue::Uint(n, _) => Value::Uint256(n),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::List(items.into_iter().map(from_sol_value).collect::<Result<_, _>>()?)
        }
        other => {
            return Err(ChainError::Abi(format!(
                "unsupported return type {:?}",
                other.as_type()
            )));
        }
    };
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{U256, address};

    use crate::value::i256_from_u64;

    #[test]
    fn selector_is_keccak_of_the_input_part() {
        let sig = Signature::parse("transfer(address,uint256)(bool)").unwrap();
        assert_eq!(sig.selector, [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(sig.inputs, vec![DynSolType::Address, DynSolType::Uint(256)]);
        assert_eq!(sig.outputs, vec![DynSolType::Bool]);
    }

    #[test]
    fn signature_without_outputs() {
        let sig = Signature::parse("finalize()").unwrap();
        assert!(sig.inputs.is_empty());
        assert!(sig.outputs.is_empty());
        assert!(Signature::parse("broken(").is_err());
    }

    #[test]
    fn encodes_arguments_after_selector() {
        let sig = Signature::parse("balanceOf(address)(uint256)").unwrap();
        let owner = address!("A16081F360e3847006dB660bae1c6d1b2e17eC2A");
        let data = sig.encode_call(&[Value::Address(owner)]).unwrap();
        assert_eq!(data.len(), 4 + 32, "selector plus one word");
        assert_eq!(data.get(16..36), Some(owner.as_slice()));

        assert!(sig.encode_call(&[]).is_err(), "arity is checked");
        assert!(sig.encode_call(&[Value::Bool(true)]).is_err(), "kinds are checked");
    }

    #[test]
    fn decodes_outputs_into_values() {
        let sig = Signature::parse("gravatars(uint256)(address,string,string)").unwrap();
        let owner = address!("A16081F360e3847006dB660bae1c6d1b2e17eC2A");
        let data = DynSolValue::Tuple(vec![
            DynSolValue::Address(owner),
            DynSolValue::String("Alice".to_owned()),
            DynSolValue::String("https://example.com/a.png".to_owned()),
        ])
        .abi_encode_params();

        let values = sig.decode_output(&data).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Address(owner),
                Value::from("Alice"),
                Value::from("https://example.com/a.png"),
            ]
        );
    }

    #[test]
    fn uint_outputs_keep_the_full_range() {
        let sig = Signature::parse("totalSupply()(uint256)").unwrap();
        let data = DynSolValue::Tuple(vec![DynSolValue::Uint(U256::from(15u64), 256)]).abi_encode_params();
        let values = sig.decode_output(&data).unwrap();
        assert_eq!(values.first().and_then(Value::as_big_int), Some(i256_from_u64(15)));

        let data = DynSolValue::Tuple(vec![DynSolValue::Uint(U256::MAX, 256)]).abi_encode_params();
        assert_eq!(sig.decode_output(&data).unwrap(), vec![Value::Uint256(U256::MAX)]);
    }

    #[test]
    fn uint_arguments_accept_unsigned_and_reject_negative() {
        let sig = Signature::parse("approve(address,uint256)(bool)").unwrap();
        let spender = address!("A16081F360e3847006dB660bae1c6d1b2e17eC2A");
        let data = sig.encode_call(&[Value::Address(spender), Value::Uint256(U256::MAX)]).unwrap();
        assert_eq!(data.get(36..68), Some(U256::MAX.to_be_bytes::<32>().as_slice()));

        let negative = Value::BigInt(crate::value::i256_from_i64(-1));
        assert!(sig.encode_call(&[Value::Address(spender), negative]).is_err());
    }
}
