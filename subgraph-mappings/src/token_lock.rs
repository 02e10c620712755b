//! Token lock wallets: creation by the manager, wallet events, and the
//! off-chain vesting metadata document.

use alloy::primitives::I256;
use subgraph::{
    DataSourceContext, Entity, Event, HandlerSet, MappingContext, MappingError, Parameters, i256_from_i64,
    i256_from_u64, parse_i256,
};

use crate::numeric::{hex, increase};
use crate::schema::{entities, templates};

/// Network on which approving token destinations flips the wallet flag.
pub const APPROVAL_NETWORK: &str = "rinkeby";

/// Context key carrying a value that overrides `tokensReleased` when positive.
pub const CONTEXT_VAL: &str = "contextVal";

/// Fields copied verbatim from `TokenLockCreated`.
const CREATED_FIELDS: [&str; 10] = [
    "initHash",
    "beneficiary",
    "token",
    "managedAmount",
    "startTime",
    "endTime",
    "periods",
    "releaseStartTime",
    "vestingCliffTime",
    "revocable",
];

/// Required fields of a metadata document.
pub const METADATA_FIELDS: [&str; 4] = ["startTime", "endTime", "periods", "releaseStartTime"];

/// Handlers of the `GraphTokenLockManager` template.
#[must_use]
pub fn manager_handlers() -> HandlerSet {
    HandlerSet::new().event("TokenLockCreated", handle_token_lock_created)
}

/// Handlers of the `GraphTokenLockWallet` template.
#[must_use]
pub fn wallet_handlers() -> HandlerSet {
    HandlerSet::new()
        .event("TokensReleased", handle_tokens_released)
        .event("TokensWithdrawn", handle_tokens_withdrawn)
        .event("TokensRevoked", handle_tokens_revoked)
        .event("ManagerUpdated", handle_manager_updated)
        .event("ApproveTokenDestinations", handle_approve_token_destinations)
        .event("RevokeTokenDestinations", handle_revoke_token_destinations)
}

/// Handlers of the `TokenLockMetadata` file template.
#[must_use]
pub fn metadata_handlers() -> HandlerSet {
    HandlerSet::file(handle_metadata)
}

/// The manager deployed a wallet: create its entity and start watching it.
pub fn handle_token_lock_created(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    let wallet_address = event.address("contractAddress")?;
    tracing::info!(wallet = %hex(wallet_address), manager = %hex(event.address), "token lock created");

    let mut wallet = Entity::new(entities::TOKEN_LOCK_WALLET, hex(wallet_address));
    for field in CREATED_FIELDS {
        wallet.set(field, event.param(field)?.clone());
    }
    wallet.set("manager", event.address);
    wallet.set("tokensReleased", I256::ZERO);
    wallet.set("tokensWithdrawn", I256::ZERO);
    wallet.set("tokensRevoked", I256::ZERO);
    wallet.set("tokenDestinationsApproved", false);
    ctx.save(wallet);

    let context = DataSourceContext::new().with(CONTEXT_VAL, 0);
    ctx.create_data_source_with_context(templates::TOKEN_LOCK_WALLET, wallet_address, context)
}

fn require_wallet(ctx: &MappingContext<'_>, event: &Event) -> Result<Entity, MappingError> {
    ctx.require(entities::TOKEN_LOCK_WALLET, &hex(event.address))
}

fn accumulate(ctx: &mut MappingContext<'_>, event: &Event, field: &str) -> Result<(), MappingError> {
    let amount = event.big_int("amount")?;
    let mut wallet = require_wallet(ctx, event)?;
    increase(&mut wallet, field, amount)?;
    ctx.save(wallet);
    Ok(())
}

/// Vested tokens released to the beneficiary.
pub fn handle_tokens_released(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    accumulate(ctx, event, "tokensReleased")
}

/// Released tokens withdrawn.
pub fn handle_tokens_withdrawn(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    accumulate(ctx, event, "tokensWithdrawn")
}

/// Unvested tokens revoked.
pub fn handle_tokens_revoked(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    accumulate(ctx, event, "tokensRevoked")
}

/// The wallet's manager changed.
pub fn handle_manager_updated(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    let mut wallet = require_wallet(ctx, event)?;
    wallet.set("manager", event.address("_newManager")?);
    ctx.save(wallet);
    Ok(())
}

/// Token destinations approved.
///
/// The wallet is resolved from the data source, not the event. The approved
/// flag is only set on [`APPROVAL_NETWORK`]. A positive [`CONTEXT_VAL`] in
/// the data source context overwrites `tokensReleased`; the key is required.
pub fn handle_approve_token_destinations(
    ctx: &mut MappingContext<'_>,
    _event: &Event,
) -> Result<(), MappingError> {
    let mut wallet = ctx.require(entities::TOKEN_LOCK_WALLET, &hex(ctx.address()))?;
    if ctx.network() == APPROVAL_NETWORK {
        wallet.set("tokenDestinationsApproved", true);
    }

    let context_val = ctx.context().require(CONTEXT_VAL)?.to_big_int(CONTEXT_VAL)?;
    if context_val.is_positive() {
        wallet.set("tokensReleased", context_val);
    }
    ctx.save(wallet);
    Ok(())
}

/// Token destinations revoked.
pub fn handle_revoke_token_destinations(
    ctx: &mut MappingContext<'_>,
    event: &Event,
) -> Result<(), MappingError> {
    let mut wallet = require_wallet(ctx, event)?;
    wallet.set("tokenDestinationsApproved", false);
    ctx.save(wallet);
    Ok(())
}

/// Vesting metadata document, keyed by its content id.
///
/// A document that is not a JSON object produces no entity. Otherwise the
/// entity is always created: each of [`METADATA_FIELDS`] is taken from the
/// document when present (an integral number, including float or exponent
/// forms such as `1.6e9`, or a decimal string) and left at zero when absent
/// or unreadable.
pub fn handle_metadata(ctx: &mut MappingContext<'_>, content: &[u8]) -> Result<(), MappingError> {
    let content_id = ctx.data_source().string_param();
    let document = match serde_json::from_slice::<serde_json::Value>(content) {
        Ok(serde_json::Value::Object(document)) => document,
        Ok(_) => {
            tracing::warn!(content_id = %content_id, "metadata is not a JSON object, ignored");
            return Ok(());
        }
        Err(e) => {
            tracing::warn!(content_id = %content_id, error = %e, "metadata is not valid JSON, ignored");
            return Ok(());
        }
    };

    let mut metadata = Entity::new(entities::TOKEN_LOCK_METADATA, content_id.clone());
    let mut missing = Vec::new();
    let mut unreadable = Vec::new();
    for field in METADATA_FIELDS {
        let value = match document.get(field) {
            None | Some(serde_json::Value::Null) => {
                missing.push(field);
                I256::ZERO
            }
            Some(raw) => json_big_int(raw).unwrap_or_else(|| {
                unreadable.push(field);
                I256::ZERO
            }),
        };
        metadata.set(field, value);
    }
    if !missing.is_empty() {
        tracing::warn!(content_id = %content_id, missing = ?missing, "metadata incomplete, missing fields set to zero");
    }
    if !unreadable.is_empty() {
        tracing::warn!(content_id = %content_id, unreadable = ?unreadable, "metadata fields are not integers, set to zero");
    }
    ctx.save(metadata);
    Ok(())
}

fn json_big_int(value: &serde_json::Value) -> Option<I256> {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                Some(i256_from_i64(v))
            } else if let Some(v) = n.as_u64() {
                Some(i256_from_u64(v))
            } else {
                // `f64` displays without exponent, so only integral values parse.
                n.as_f64().and_then(|f| parse_i256(&f.to_string()).ok())
            }
        }
        serde_json::Value::String(s) => parse_i256(s).ok(),
        _ => None,
    }
}
