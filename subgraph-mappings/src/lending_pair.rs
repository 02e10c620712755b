//! Lending pair events.
//!
//! Every handler requires the pair's `LendingPair` entity, created when the
//! factory deployed the pair. Asset, borrow and collateral movements update
//! the pair's running totals first and then record a `PairTx` whose
//! `poolPercentage` is the movement divided by the updated total.

use alloy::primitives::{Address, I256};
use subgraph::{Entity, Event, HandlerSet, MappingContext, MappingError, Parameters};

use crate::numeric::{big, decrease, hex, increase, ratio};
use crate::schema::{entities, pair_tx};

/// Handlers of the `LendingPair` template.
#[must_use]
pub fn handlers() -> HandlerSet {
    HandlerSet::new()
        .event("Approval", handle_approval)
        .event("LogAddAsset", handle_log_add_asset)
        .event("LogAddBorrow", handle_log_add_borrow)
        .event("LogAddCollateral", handle_log_add_collateral)
        .event("LogRemoveAsset", handle_log_remove_asset)
        .event("LogRemoveBorrow", handle_log_remove_borrow)
        .event("LogRemoveCollateral", handle_log_remove_collateral)
        .event("LogExchangeRate", handle_log_exchange_rate)
        .event("OwnershipTransferred", handle_ownership_transferred)
        .event("Transfer", handle_transfer)
        .event("LogAccrue", handle_log_accrue)
        .event("LogFeeTo", handle_log_fee_to)
        .event("LogDev", handle_log_dev)
        .event("LogWithdrawFees", handle_log_withdraw_fees)
}

/// Id of a user's position in a pair: `<user>-<pair>`.
#[must_use]
pub fn user_lending_pair_data_id(user: Address, pair: Address) -> String {
    format!("{}-{}", hex(user), hex(pair))
}

/// Load or create the `User` entity for `address`.
pub fn get_user(ctx: &mut MappingContext<'_>, address: Address) -> Entity {
    let id = hex(address);
    if let Some(user) = ctx.load(entities::USER, &id) {
        return user;
    }
    let mut user = Entity::new(entities::USER, id);
    user.set("block", big(ctx.block().number));
    user.set("timestamp", big(ctx.block().timestamp));
    ctx.save(user.clone());
    user
}

/// Load or create a user's position in a pair, with zeroed balances.
pub fn get_user_lending_pair_data(ctx: &mut MappingContext<'_>, user: Address, pair: Address) -> Entity {
    let id = user_lending_pair_data_id(user, pair);
    if let Some(data) = ctx.load(entities::USER_LENDING_PAIR_DATA, &id) {
        return data;
    }
    let mut data = Entity::new(entities::USER_LENDING_PAIR_DATA, id);
    data.set("owner", hex(user));
    data.set("lendingPair", hex(pair));
    data.set("userCollateralAmount", I256::ZERO);
    data.set("balanceOf", I256::ZERO);
    data.set("userBorrowFraction", I256::ZERO);
    ctx.save(data.clone());
    data
}

fn require_pair(ctx: &MappingContext<'_>, event: &Event) -> Result<Entity, MappingError> {
    ctx.require(entities::LENDING_PAIR, &hex(event.address))
}

/// One movement recorded as a `PairTx`.
struct Movement {
    kind: &'static str,
    user: Address,
    token: Address,
    amount: I256,
    fraction: Option<I256>,
    pool_percentage: I256,
}

fn record_pair_tx(ctx: &mut MappingContext<'_>, event: &Event, movement: Movement) {
    let mut tx = Entity::new(entities::PAIR_TX, event.id());
    tx.set("type", movement.kind);
    tx.set("root", user_lending_pair_data_id(movement.user, event.address));
    tx.set("lendingPair", hex(event.address));
    tx.set("token", hex(movement.token));
    tx.set("amount", movement.amount);
    if let Some(fraction) = movement.fraction {
        tx.set("fraction", fraction);
    }
    tx.set("poolPercentage", movement.pool_percentage);
    tx.set("block", big(event.block.number));
    tx.set("timestamp", big(event.block.timestamp));
    ctx.save(tx);
}

/// Logged only.
pub fn handle_approval(_ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    tracing::info!(
        owner = %hex(event.address("_owner")?),
        spender = %hex(event.address("_spender")?),
        value = %event.uint256("_value")?,
        "lending pair approval"
    );
    Ok(())
}

/// Asset deposited: asset totals and the user's balance grow.
pub fn handle_log_add_asset(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    let user = event.address("user")?;
    let amount = event.big_int("amount")?;
    let fraction = event.big_int("fraction")?;
    tracing::info!(pair = %hex(event.address), user = %hex(user), %fraction, %amount, "log add asset");

    let mut pair = require_pair(ctx, event)?;
    increase(&mut pair, "totalAssetAmount", amount)?;
    let total_fraction = increase(&mut pair, "totalAssetFraction", fraction)?;
    let asset = pair.address("asset")?;
    ctx.save(pair);

    get_user(ctx, user);
    let mut data = get_user_lending_pair_data(ctx, user, event.address);
    increase(&mut data, "balanceOf", fraction)?;
    ctx.save(data);

    let pool_percentage = ratio(fraction, total_fraction, "PairTx.poolPercentage")?;
    record_pair_tx(ctx, event, Movement {
        kind: pair_tx::ASSET,
        user,
        token: asset,
        amount,
        fraction: Some(fraction),
        pool_percentage,
    });
    Ok(())
}

/// Borrow opened: borrow totals and the user's borrow fraction grow.
pub fn handle_log_add_borrow(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    let user = event.address("user")?;
    let amount = event.big_int("amount")?;
    let fraction = event.big_int("fraction")?;
    tracing::info!(pair = %hex(event.address), user = %hex(user), %fraction, %amount, "log add borrow");

    let mut pair = require_pair(ctx, event)?;
    let total_fraction = increase(&mut pair, "totalBorrowFraction", fraction)?;
    increase(&mut pair, "totalBorrowAmount", amount)?;
    let asset = pair.address("asset")?;
    ctx.save(pair);

    let mut data = get_user_lending_pair_data(ctx, user, event.address);
    increase(&mut data, "userBorrowFraction", fraction)?;
    ctx.save(data);

    let pool_percentage = ratio(fraction, total_fraction, "PairTx.poolPercentage")?;
    record_pair_tx(ctx, event, Movement {
        kind: pair_tx::BORROW,
        user,
        token: asset,
        amount,
        fraction: Some(fraction),
        pool_percentage,
    });
    Ok(())
}

/// Collateral deposited.
pub fn handle_log_add_collateral(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    let user = event.address("user")?;
    let amount = event.big_int("amount")?;
    tracing::info!(pair = %hex(event.address), user = %hex(user), %amount, "log add collateral");

    let mut pair = require_pair(ctx, event)?;
    let total = increase(&mut pair, "totalCollateralAmount", amount)?;
    let collateral = pair.address("collateral")?;
    ctx.save(pair);

    get_user(ctx, user);
    let mut data = get_user_lending_pair_data(ctx, user, event.address);
    increase(&mut data, "userCollateralAmount", amount)?;
    ctx.save(data);

    let pool_percentage = ratio(amount, total, "PairTx.poolPercentage")?;
    record_pair_tx(ctx, event, Movement {
        kind: pair_tx::COLLATERAL,
        user,
        token: collateral,
        amount,
        fraction: None,
        pool_percentage,
    });
    Ok(())
}

/// Asset withdrawn: asset totals and the user's balance shrink.
pub fn handle_log_remove_asset(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    let user = event.address("user")?;
    let amount = event.big_int("amount")?;
    let fraction = event.big_int("fraction")?;
    tracing::info!(pair = %hex(event.address), user = %hex(user), %fraction, %amount, "log remove asset");

    let mut pair = require_pair(ctx, event)?;
    let total_fraction = decrease(&mut pair, "totalAssetFraction", fraction)?;
    decrease(&mut pair, "totalAssetAmount", amount)?;
    let asset = pair.address("asset")?;
    ctx.save(pair);

    let mut data = get_user_lending_pair_data(ctx, user, event.address);
    decrease(&mut data, "balanceOf", fraction)?;
    ctx.save(data);

    let pool_percentage = ratio(fraction, total_fraction, "PairTx.poolPercentage")?;
    record_pair_tx(ctx, event, Movement {
        kind: pair_tx::ASSET,
        user,
        token: asset,
        amount,
        fraction: Some(fraction),
        pool_percentage,
    });
    Ok(())
}

/// Borrow repaid: borrow totals and the user's borrow fraction shrink.
pub fn handle_log_remove_borrow(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    let user = event.address("user")?;
    let amount = event.big_int("amount")?;
    let fraction = event.big_int("fraction")?;
    tracing::info!(pair = %hex(event.address), user = %hex(user), %fraction, %amount, "log remove borrow");

    let mut pair = require_pair(ctx, event)?;
    let total_fraction = decrease(&mut pair, "totalBorrowFraction", fraction)?;
    decrease(&mut pair, "totalBorrowAmount", amount)?;
    let asset = pair.address("asset")?;
    ctx.save(pair);

    let mut data = get_user_lending_pair_data(ctx, user, event.address);
    decrease(&mut data, "userBorrowFraction", fraction)?;
    ctx.save(data);

    let pool_percentage = ratio(fraction, total_fraction, "PairTx.poolPercentage")?;
    record_pair_tx(ctx, event, Movement {
        kind: pair_tx::BORROW,
        user,
        token: asset,
        amount,
        fraction: Some(fraction),
        pool_percentage,
    });
    Ok(())
}

/// Collateral withdrawn.
pub fn handle_log_remove_collateral(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    let user = event.address("user")?;
    let amount = event.big_int("amount")?;
    tracing::info!(pair = %hex(event.address), user = %hex(user), %amount, "log remove collateral");

    let mut pair = require_pair(ctx, event)?;
    let total = decrease(&mut pair, "totalCollateralAmount", amount)?;
    let collateral = pair.address("collateral")?;
    ctx.save(pair);

    let mut data = get_user_lending_pair_data(ctx, user, event.address);
    decrease(&mut data, "userCollateralAmount", amount)?;
    ctx.save(data);

    let pool_percentage = ratio(amount, total, "PairTx.poolPercentage")?;
    record_pair_tx(ctx, event, Movement {
        kind: pair_tx::COLLATERAL,
        user,
        token: collateral,
        amount,
        fraction: None,
        pool_percentage,
    });
    Ok(())
}

/// The rate is accumulated into `exchangeRate`.
pub fn handle_log_exchange_rate(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    let rate = event.big_int("rate")?;
    tracing::info!(pair = %hex(event.address), %rate, "log exchange rate");

    let mut pair = require_pair(ctx, event)?;
    increase(&mut pair, "exchangeRate", rate)?;
    ctx.save(pair);
    Ok(())
}

/// New pair owner.
pub fn handle_ownership_transferred(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    let new_owner = event.address("newOwner")?;
    tracing::info!(
        pair = %hex(event.address),
        previous_owner = %hex(event.address("previousOwner")?),
        new_owner = %hex(new_owner),
        "ownership transferred"
    );

    let mut pair = require_pair(ctx, event)?;
    pair.set("owner", new_owner);
    ctx.save(pair);
    Ok(())
}

/// Pair share transfer between users.
pub fn handle_transfer(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    let from = event.address("_from")?;
    let to = event.address("_to")?;
    let value = event.big_int("_value")?;
    tracing::info!(pair = %hex(event.address), from = %hex(from), to = %hex(to), %value, "transfer");

    let mut sender = get_user_lending_pair_data(ctx, from, event.address);
    decrease(&mut sender, "balanceOf", value)?;
    ctx.save(sender);

    get_user(ctx, to);
    let mut receiver = get_user_lending_pair_data(ctx, to, event.address);
    increase(&mut receiver, "balanceOf", value)?;
    ctx.save(receiver);
    Ok(())
}

/// Interest accrued: the accrued amount minus fees goes to lenders, the
/// full amount to outstanding borrows, fees to the pending pot.
pub fn handle_log_accrue(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    let accrued = event.big_int("accruedAmount")?;
    let fee = event.big_int("feeAmount")?;
    let rate = event.big_int("rate")?;
    let utilization = event.big_int("utilization")?;
    tracing::info!(pair = %hex(event.address), %accrued, %fee, %rate, %utilization, "log accrue");

    let mut pair = require_pair(ctx, event)?;
    let to_lenders = accrued
        .checked_sub(fee)
        .ok_or_else(|| MappingError::Arithmetic("LogAccrue.accruedAmount".to_owned()))?;
    increase(&mut pair, "totalAssetAmount", to_lenders)?;
    increase(&mut pair, "totalBorrowAmount", accrued)?;
    increase(&mut pair, "feesPendingAmount", fee)?;
    pair.set("interestPerBlock", rate);
    pair.set("utilization", utilization);
    pair.set("lastBlockAccrued", big(event.block.number));
    touch(&mut pair, event);
    ctx.save(pair);
    Ok(())
}

/// New fee recipient.
pub fn handle_log_fee_to(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    let mut pair = require_pair(ctx, event)?;
    pair.set("feeTo", event.address("newFeeTo")?);
    touch(&mut pair, event);
    ctx.save(pair);
    Ok(())
}

/// New dev address.
pub fn handle_log_dev(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    let mut pair = require_pair(ctx, event)?;
    pair.set("dev", event.address("newDev")?);
    touch(&mut pair, event);
    ctx.save(pair);
    Ok(())
}

/// Fees withdrawn. Only the pair's block and timestamp move.
pub fn handle_log_withdraw_fees(ctx: &mut MappingContext<'_>, event: &Event) -> Result<(), MappingError> {
    let mut pair = require_pair(ctx, event)?;
    touch(&mut pair, event);
    ctx.save(pair);
    Ok(())
}

fn touch(pair: &mut Entity, event: &Event) {
    pair.set("block", big(event.block.number));
    pair.set("timestamp", big(event.block.timestamp));
}
