//! NFT vault eligibility modules.
//!
//! Both events refresh the module's `finalized` flag from the contract. When
//! that read reverts the module keeps the flag it was deployed with
//! (`finalizedOnDeploy`).

use alloy::primitives::U256;
use subgraph::{CallResult, Entity, Event, HandlerSet, MappingContext, MappingError, Parameters, Value};

use crate::numeric::hex;
use crate::schema::entities;

/// Signature of the module's finalization getter.
pub const FINALIZED: &str = "finalized()(bool)";

/// Handlers of the `EligibilityModule` template.
#[must_use]
pub fn handlers() -> HandlerSet {
    HandlerSet::new()
        .event("UniqueEligibilitiesSet", handle_unique_eligibilities_set)
        .event("RangeSet", handle_range_set)
}

/// Load the module at the event's address, or start one with both flags
/// cleared and no eligible ids.
#[must_use]
pub fn get_eligibility_module(ctx: &MappingContext<'_>, event: &Event) -> Entity {
    let id = hex(event.address);
    ctx.load(entities::ELIGIBILITY_MODULE, &id).unwrap_or_else(|| {
        let mut module = Entity::new(entities::ELIGIBILITY_MODULE, id);
        module.set("finalized", false);
        module.set("finalizedOnDeploy", false);
        module
    })
}

/// Live `finalized()` flag, or the stored `finalizedOnDeploy` if the read
/// reverts.
///
/// # Errors
///
/// Returns an error if the chain client fails or returns a non-bool.
pub fn read_finalized(ctx: &MappingContext<'_>, module: &Entity, event: &Event) -> Result<bool, MappingError> {
    match ctx.try_call(event.address, FINALIZED, Vec::new())? {
        CallResult::Value(values) => {
            let value = values.first().unwrap_or(&Value::Null);
            value
                .as_bool()
                .ok_or_else(|| MappingError::type_mismatch(FINALIZED, "bool", value.kind()))
        }
        CallResult::Reverted => {
            tracing::debug!(module = %hex(event.address), "finalized() reverted, using finalizedOnDeploy");
            module.bool("finalizedOnDeploy")
        }
    }
}

/// Add (`is_eligible`) or remove token ids from the module's eligible set.
/// Existing order is kept; new ids are appended once. Ids are stored as
/// `Uint256` over the full unsigned range.
///
/// # Errors
///
/// Returns an error if `eligibleIds` is not a list.
pub fn update_eligible_token_ids(
    module: &mut Entity,
    token_ids: &[U256],
    is_eligible: bool,
) -> Result<(), MappingError> {
    let mut eligible: Vec<Value> = module.list("eligibleIds")?.to_vec();
    for id in token_ids {
        let value = Value::Uint256(*id);
        let present = eligible.contains(&value);
        if is_eligible && !present {
            eligible.push(value);
        } else if !is_eligible && present {
            eligible.retain(|v| *v != value);
        }
    }
    module.set("eligibleIds", Value::List(eligible));
    Ok(())
}

/// Token ids marked eligible or ineligible.
pub fn handle_unique_eligibilities_set(
    ctx: &mut MappingContext<'_>,
    event: &Event,
) -> Result<(), MappingError> {
    let mut module = get_eligibility_module(ctx, event);
    let finalized = read_finalized(ctx, &module, event)?;
    module.set("finalized", finalized);

    let token_ids = event
        .list("tokenIds")?
        .iter()
        .map(|v| {
            v.as_uint256()
                .ok_or_else(|| MappingError::type_mismatch("tokenIds", "uint256", v.kind()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    update_eligible_token_ids(&mut module, &token_ids, event.bool("isEligible")?)?;

    ctx.save(module);
    Ok(())
}

/// Eligible id range replaced.
pub fn handle_range_set(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    let mut module = get_eligibility_module(ctx, event);
    let finalized = read_finalized(ctx, &module, event)?;
    module.set("finalized", finalized);
    module.set(
        "eligibleRange",
        Value::List(vec![
            Value::Uint256(event.uint256("rangeStart")?),
            Value::Uint256(event.uint256("rangeEnd")?),
        ]),
    );
    ctx.save(module);
    Ok(())
}
