//! Lending pair deployments from the `BentoBox` factory.

use alloy::primitives::{Address, I256};
use subgraph::{CallResult, DataSourceContext, Entity, Event, HandlerSet, MappingContext, MappingError, Parameters, Value};

use crate::numeric::{big, hex};
use crate::schema::{entities, templates};

/// Handlers of the `BentoBox` template.
#[must_use]
pub fn handlers() -> HandlerSet {
    HandlerSet::new().event("LogDeploy", handle_log_deploy)
}

/// Zeroed accumulator fields of a fresh `LendingPair`.
const TOTALS: [&str; 9] = [
    "totalAssetAmount",
    "totalAssetFraction",
    "totalBorrowAmount",
    "totalBorrowFraction",
    "totalCollateralAmount",
    "exchangeRate",
    "feesPendingAmount",
    "interestPerBlock",
    "utilization",
];

/// A clone of a master contract was deployed.
///
/// Creates the pair's `LendingPair` entity and starts watching the clone
/// with the `LendingPair` template. The asset and collateral tokens are read
/// from the clone; a clone that does not expose them gets the zero address.
pub fn handle_log_deploy(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    let master_contract = event.address("masterContract")?;
    let clone = event.address("cloneAddress")?;
    tracing::info!(master_contract = %hex(master_contract), clone = %hex(clone), "log deploy");

    let asset = read_address(ctx, clone, "asset()(address)")?;
    let collateral = read_address(ctx, clone, "collateral()(address)")?;

    let mut pair = Entity::new(entities::LENDING_PAIR, hex(clone));
    pair.set("masterContract", master_contract);
    pair.set("asset", asset);
    pair.set("collateral", collateral);
    for field in TOTALS {
        pair.set(field, I256::ZERO);
    }
    pair.set("lastBlockAccrued", big(event.block.number));
    pair.set("block", big(event.block.number));
    pair.set("timestamp", big(event.block.timestamp));
    ctx.save(pair);

    let context = DataSourceContext::new().with("masterContract", master_contract);
    ctx.create_data_source_with_context(templates::LENDING_PAIR, clone, context)
}

fn read_address(ctx: &MappingContext<'_>, contract: Address, signature: &str) -> Result<Address, MappingError> {
    match ctx.try_call(contract, signature, Vec::new())? {
        CallResult::Value(values) => match values.first() {
            Some(Value::Address(address)) => Ok(*address),
            Some(other) => Err(MappingError::type_mismatch(signature, "address", other.kind())),
            None => Ok(Address::ZERO),
        },
        CallResult::Reverted => {
            tracing::warn!(contract = %hex(contract), signature, "call reverted, using zero address");
            Ok(Address::ZERO)
        }
    }
}
