//! Gravatar registry events and calls.

use alloy::primitives::{Address, address};
use subgraph::{Call, CallResult, Entity, Event, HandlerSet, MappingContext, MappingError, Parameters, Value};

use crate::schema::entities;

/// The gravatar registry contract read by the contract helpers.
pub const GRAVITY_CONTRACT: Address = address!("89205A3A3b2A69De6Dbf7f01ED13B2108B2c43e7");

/// Signature of the registry's gravatar getter.
pub const GET_GRAVATAR: &str = "getGravatar(address)(string,string)";

/// Handlers of the `Gravity` template.
#[must_use]
pub fn handlers() -> HandlerSet {
    HandlerSet::new()
        .event("NewGravatar", handle_new_gravatar)
        .event("UpdatedGravatar", handle_updated_gravatar)
        .call("createGravatar", handle_create_gravatar)
}

fn gravatar_id(event: &Event) -> Result<String, MappingError> {
    Ok(event.uint256("id")?.to_string())
}

fn set_profile(gravatar: &mut Entity, event: &Event) -> Result<(), MappingError> {
    gravatar.set("owner", event.address("owner")?);
    gravatar.set("displayName", event.string("displayName")?);
    gravatar.set("imageUrl", event.string("imageUrl")?);
    Ok(())
}

/// A new gravatar, replacing any stored one with the same id.
pub fn handle_new_gravatar(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    let mut gravatar = Entity::new(entities::GRAVATAR, gravatar_id(event)?);
    set_profile(&mut gravatar, event)?;
    ctx.save(gravatar);
    Ok(())
}

/// Apply a batch of `NewGravatar` events in order.
///
/// # Errors
///
/// Stops at the first failing event and returns its error.
pub fn handle_new_gravatars(ctx: &mut MappingContext<'_>, events: &[Event]) -> Result<(), MappingError> {
    events
        .iter()
        .try_for_each(|event| handle_new_gravatar(ctx, event))
}

/// An updated gravatar, created if it was never seen.
pub fn handle_updated_gravatar(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    let mut gravatar = ctx.load_or_new(entities::GRAVATAR, &gravatar_id(event)?);
    set_profile(&mut gravatar, event)?;
    ctx.save(gravatar);
    Ok(())
}

/// A `createGravatar` call, recorded under its transaction hash.
pub fn handle_create_gravatar(ctx: &mut MappingContext<'_>, call: &Call) -> Result<(), MappingError> {
    let mut transaction = Entity::new(entities::TRANSACTION, format!("{:#x}", call.transaction.hash));
    transaction.set("displayName", call.string("_displayName")?);
    transaction.set("imageUrl", call.string("_imageUrl")?);
    ctx.save(transaction);
    Ok(())
}

/// Read the registry's gravatar and store it under `gravatar_id`.
///
/// # Errors
///
/// Returns [`MappingError::CallReverted`] if the read reverts.
pub fn save_gravatar_from_contract(ctx: &mut MappingContext<'_>, gravatar_id: &str) -> Result<(), MappingError> {
    let values = ctx.call(GRAVITY_CONTRACT, GET_GRAVATAR, vec![Value::Address(GRAVITY_CONTRACT)])?;
    save_contract_gravatar(ctx, gravatar_id, &values)
}

/// Like [`save_gravatar_from_contract`], but a reverted read writes nothing.
///
/// # Errors
///
/// Returns an error only if the chain client itself fails.
pub fn try_save_gravatar_from_contract(
    ctx: &mut MappingContext<'_>,
    gravatar_id: &str,
) -> Result<(), MappingError> {
    match ctx.try_call(GRAVITY_CONTRACT, GET_GRAVATAR, vec![Value::Address(GRAVITY_CONTRACT)])? {
        CallResult::Value(values) => save_contract_gravatar(ctx, gravatar_id, &values),
        CallResult::Reverted => {
            tracing::debug!(gravatar_id, "getGravatar reverted, nothing saved");
            Ok(())
        }
    }
}

fn save_contract_gravatar(
    ctx: &mut MappingContext<'_>,
    gravatar_id: &str,
    values: &[Value],
) -> Result<(), MappingError> {
    let mut gravatar = Entity::new(entities::GRAVATAR, gravatar_id);
    for (i, field) in ["value0", "value1"].into_iter().enumerate() {
        let value = values.get(i).unwrap_or(&Value::Null);
        let s = value
            .as_str()
            .ok_or_else(|| MappingError::type_mismatch(field, "string", value.kind()))?;
        gravatar.set(field, s);
    }
    ctx.save(gravatar);
    Ok(())
}
