//! Lending pair deployment and running totals.

use alloy::primitives::{Address, I256, U256, address};
use subgraph::{
    DataSource, Engine, Entity, Error, MappingError, MockChainClient, Trigger, Value, i256_from_u64,
};
use subgraph_mappings::handler_table;
use subgraph_mappings::lending_pair::user_lending_pair_data_id;
use subgraph_mappings::numeric::hex;
use subgraph_mappings::schema::{entities, pair_tx, templates};

const FACTORY: Address = address!("F5BCE5077908a1b7370B9ae04AdC565EBd643966");
const MASTER: Address = address!("2cBA6Ab6574646Badc84F0544d05059e57a5dc42");
const PAIR: Address = address!("B7b45754167d65347C93F3B28797887b4b6cd2F3");
const ASSET: Address = address!("6B175474E89094C44Da98b954EedeAC495271d0F");
const COLLATERAL: Address = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
const ALICE: Address = address!("1111111111111111111111111111111111111111");
const BOB: Address = address!("2222222222222222222222222222222222222222");

fn big(n: u64) -> I256 {
    i256_from_u64(n)
}

fn chain() -> MockChainClient {
    let mut chain = MockChainClient::new();
    chain
        .mock(PAIR, "asset()(address)", vec![], vec![Value::Address(ASSET)])
        .mock(PAIR, "collateral()(address)", vec![], vec![Value::Address(COLLATERAL)]);
    chain
}

/// Engine with the factory registered and the pair deployed at block 10.
fn deployed() -> Engine {
    let mut engine = Engine::new(handler_table(), Box::new(chain()));
    engine
        .register_data_source(DataSource::on_chain(templates::BENTO_BOX, FACTORY))
        .unwrap();
    let deploy = subgraph::Event::new("LogDeploy")
        .with_address(FACTORY)
        .with_param("masterContract", MASTER)
        .with_param("cloneAddress", PAIR)
        .at_block(10, 1000);
    engine.process(&Trigger::Log(deploy)).unwrap();
    engine
}

fn pair_event(name: &str, block: u64, log_index: u64) -> subgraph::Event {
    subgraph::Event::new(name)
        .with_address(PAIR)
        .at_block(block, block * 100)
        .with_log_index(log_index)
}

/// A movement in its own block; the log index doubles as a unique `PairTx` id.
fn movement(name: &str, block: u64, user: Address, amount: u64, fraction: u64) -> Trigger {
    Trigger::Log(
        pair_event(name, block, block)
            .with_param("user", user)
            .with_param("amount", big(amount))
            .with_param("fraction", big(fraction)),
    )
}

fn pair(engine: &Engine) -> Entity {
    engine.store().load(entities::LENDING_PAIR, &hex(PAIR)).unwrap()
}

fn pair_tx_at(engine: &Engine, block: u64) -> Entity {
    engine
        .store()
        .entities(entities::PAIR_TX)
        .find(|tx| tx.big_int("block").unwrap() == big(block))
        .cloned()
        .unwrap()
}

#[test]
fn deploy_creates_pair_and_watches_clone() {
    let engine = deployed();

    let pair = pair(&engine);
    assert_eq!(pair.address("asset").unwrap(), ASSET, "asset read from clone");
    assert_eq!(pair.address("collateral").unwrap(), COLLATERAL, "collateral read from clone");
    assert_eq!(pair.address("masterContract").unwrap(), MASTER, "master contract");
    assert_eq!(pair.big_int("totalAssetAmount").unwrap(), I256::ZERO, "totals start at zero");
    assert_eq!(pair.big_int("lastBlockAccrued").unwrap(), big(10), "accrual block");

    let source = engine.registry().by_address(&PAIR).unwrap();
    assert_eq!(source.template, templates::LENDING_PAIR, "clone template");
    assert_eq!(source.created_at_block, 10, "creation block");
    assert_eq!(
        source.context.get("masterContract"),
        Some(&Value::Address(MASTER)),
        "context carries the master contract"
    );
}

#[test]
fn reverted_token_reads_fall_back_to_zero_address() {
    let mut chain = MockChainClient::new();
    chain
        .mock_revert(PAIR, "asset()(address)", vec![])
        .mock_revert(PAIR, "collateral()(address)", vec![]);
    let mut engine = Engine::new(handler_table(), Box::new(chain));
    engine
        .register_data_source(DataSource::on_chain(templates::BENTO_BOX, FACTORY))
        .unwrap();
    let deploy = subgraph::Event::new("LogDeploy")
        .with_address(FACTORY)
        .with_param("masterContract", MASTER)
        .with_param("cloneAddress", PAIR);
    engine.process(&Trigger::Log(deploy)).unwrap();

    let pair = pair(&engine);
    assert_eq!(pair.address("asset").unwrap(), Address::ZERO, "reverted asset read");
    assert_eq!(pair.address("collateral").unwrap(), Address::ZERO, "reverted collateral read");
}

#[test]
fn asset_totals_run_and_ratio_reads_updated_total() {
    let mut engine = deployed();
    engine.process(&movement("LogAddAsset", 11, ALICE, 100, 50)).unwrap();

    let pair_after_first = pair(&engine);
    assert_eq!(pair_after_first.big_int("totalAssetAmount").unwrap(), big(100), "amount total");
    assert_eq!(pair_after_first.big_int("totalAssetFraction").unwrap(), big(50), "fraction total");

    let first = pair_tx_at(&engine, 11);
    assert_eq!(first.string("type").unwrap(), pair_tx::ASSET, "tx type");
    assert_eq!(first.string("token").unwrap(), hex(ASSET), "token is the pair asset");
    assert_eq!(
        first.big_int("poolPercentage").unwrap(),
        big(1),
        "first deposit owns the whole pool, so the total was read after the update"
    );

    engine.process(&movement("LogAddAsset", 12, BOB, 300, 150)).unwrap();
    assert_eq!(pair(&engine).big_int("totalAssetAmount").unwrap(), big(400), "amounts accumulate");
    assert_eq!(pair(&engine).big_int("totalAssetFraction").unwrap(), big(200), "fractions accumulate");
    assert_eq!(pair_tx_at(&engine, 12).big_int("poolPercentage").unwrap(), I256::ZERO, "150 / 200 truncates");

    engine.process(&movement("LogRemoveAsset", 13, ALICE, 100, 50)).unwrap();
    engine.process(&movement("LogRemoveAsset", 14, BOB, 300, 150)).unwrap();
    let pair = pair(&engine);
    assert_eq!(pair.big_int("totalAssetAmount").unwrap(), I256::ZERO, "all withdrawn");
    assert_eq!(pair.big_int("totalAssetFraction").unwrap(), I256::ZERO, "all fractions withdrawn");
    assert_eq!(
        pair_tx_at(&engine, 14).big_int("poolPercentage").unwrap(),
        I256::ZERO,
        "zero running total stores a zero ratio"
    );

    let alice = engine
        .store()
        .load(entities::USER_LENDING_PAIR_DATA, &user_lending_pair_data_id(ALICE, PAIR))
        .unwrap();
    assert_eq!(alice.big_int("balanceOf").unwrap(), I256::ZERO, "alice withdrew her fraction");
    assert_eq!(alice.string("lendingPair").unwrap(), hex(PAIR), "position references the pair");
    assert!(engine.store().contains(entities::USER, &hex(ALICE)), "user created on deposit");
}

const CAROL: Address = address!("3333333333333333333333333333333333333333");

/// Apply asset movements in order and check after each step that the pair
/// totals and every user's balance equal deposits minus withdrawals.
fn assert_asset_totals_track(steps: &[(&str, Address, i64, i64)]) {
    let mut engine = deployed();
    let (mut amount_total, mut fraction_total) = (0_i64, 0_i64);
    let mut balances = std::collections::BTreeMap::<Address, i64>::new();

    for (block, &(name, user, amount, fraction)) in (11_u64..).zip(steps) {
        let trigger = Trigger::Log(
            pair_event(name, block, block)
                .with_param("user", user)
                .with_param("amount", subgraph::i256_from_i64(amount))
                .with_param("fraction", subgraph::i256_from_i64(fraction)),
        );
        engine.process(&trigger).unwrap();

        let sign = if name == "LogAddAsset" { 1 } else { -1 };
        amount_total += sign * amount;
        fraction_total += sign * fraction;
        *balances.entry(user).or_default() += sign * fraction;

        let pair = pair(&engine);
        assert_eq!(
            pair.big_int("totalAssetAmount").unwrap(),
            subgraph::i256_from_i64(amount_total),
            "amount total after block {block}"
        );
        assert_eq!(
            pair.big_int("totalAssetFraction").unwrap(),
            subgraph::i256_from_i64(fraction_total),
            "fraction total after block {block}"
        );
        for (user, balance) in &balances {
            let data = engine
                .store()
                .load(entities::USER_LENDING_PAIR_DATA, &user_lending_pair_data_id(*user, PAIR))
                .unwrap();
            assert_eq!(
                data.big_int("balanceOf").unwrap(),
                subgraph::i256_from_i64(*balance),
                "balance of {user} after block {block}"
            );
        }
    }
}

#[test]
fn asset_totals_equal_deposits_minus_withdrawals() {
    let add = "LogAddAsset";
    let remove = "LogRemoveAsset";
    let sequences: [&[(&str, Address, i64, i64)]; 4] = [
        &[(add, ALICE, 100, 50), (add, BOB, 30, 20), (remove, ALICE, 40, 25), (add, CAROL, 7, 3)],
        &[(add, ALICE, 10, 10), (remove, ALICE, 10, 10), (add, BOB, 5, 4)],
        &[(remove, BOB, 25, 10), (add, ALICE, 5, 5), (remove, CAROL, 1, 1)],
        &[(add, ALICE, 10, 10), (remove, BOB, 30, 30), (add, CAROL, 25, 25), (remove, ALICE, 10, 10)],
    ];
    for steps in sequences {
        assert_asset_totals_track(steps);
    }
}

#[test]
fn asset_totals_hold_over_generated_sequence() {
    let users = [ALICE, BOB, CAROL];
    let mut seed = 0x2545_f491_u64;
    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        seed
    };
    let steps: Vec<_> = (0..40)
        .map(|_| {
            let name = if next() % 3 == 0 { "LogRemoveAsset" } else { "LogAddAsset" };
            let user = users[usize::try_from(next() % 3).unwrap()];
            let amount = i64::try_from(next() % 1_000).unwrap();
            let fraction = i64::try_from(next() % 500).unwrap();
            (name, user, amount, fraction)
        })
        .collect();
    assert_asset_totals_track(&steps);
}

#[test]
fn unlimited_approval_is_accepted() {
    let mut engine = deployed();
    let approval = pair_event("Approval", 11, 0)
        .with_param("_owner", ALICE)
        .with_param("_spender", BOB)
        .with_param("_value", U256::MAX);
    engine.process(&Trigger::Log(approval)).unwrap();
    assert_eq!(engine.stats().processed, 2, "deploy and approval handled");
}

#[test]
fn borrow_and_collateral_totals() {
    let mut engine = deployed();
    engine.process(&movement("LogAddCollateral", 11, ALICE, 40, 0)).unwrap();
    engine.process(&movement("LogAddBorrow", 12, ALICE, 10, 8)).unwrap();
    engine.process(&movement("LogRemoveBorrow", 13, ALICE, 4, 3)).unwrap();
    engine.process(&movement("LogRemoveCollateral", 14, ALICE, 15, 0)).unwrap();

    let pair = pair(&engine);
    assert_eq!(pair.big_int("totalCollateralAmount").unwrap(), big(25), "collateral net");
    assert_eq!(pair.big_int("totalBorrowAmount").unwrap(), big(6), "borrow amount net");
    assert_eq!(pair.big_int("totalBorrowFraction").unwrap(), big(5), "borrow fraction net");

    let data = engine
        .store()
        .load(entities::USER_LENDING_PAIR_DATA, &user_lending_pair_data_id(ALICE, PAIR))
        .unwrap();
    assert_eq!(data.big_int("userCollateralAmount").unwrap(), big(25), "user collateral");
    assert_eq!(data.big_int("userBorrowFraction").unwrap(), big(5), "user borrow fraction");

    let collateral_tx = pair_tx_at(&engine, 11);
    assert_eq!(collateral_tx.string("type").unwrap(), pair_tx::COLLATERAL, "collateral tx");
    assert_eq!(collateral_tx.string("token").unwrap(), hex(COLLATERAL), "collateral token");
    assert_eq!(pair_tx_at(&engine, 12).string("type").unwrap(), pair_tx::BORROW, "borrow tx");
}

#[test]
fn accrue_transfer_and_admin_events() {
    let mut engine = deployed();
    engine.process(&movement("LogAddAsset", 11, ALICE, 100, 100)).unwrap();

    let accrue = pair_event("LogAccrue", 12, 0)
        .with_param("accruedAmount", big(10))
        .with_param("feeAmount", big(2))
        .with_param("rate", big(7))
        .with_param("utilization", big(3));
    engine.process(&Trigger::Log(accrue)).unwrap();

    let transfer = pair_event("Transfer", 13, 0)
        .with_param("_from", ALICE)
        .with_param("_to", BOB)
        .with_param("_value", big(30));
    engine.process(&Trigger::Log(transfer)).unwrap();

    let fee_to = pair_event("LogFeeTo", 14, 0).with_param("newFeeTo", BOB);
    let owner = pair_event("OwnershipTransferred", 14, 1)
        .with_param("previousOwner", ALICE)
        .with_param("newOwner", BOB);
    engine.process(&Trigger::Log(fee_to)).unwrap();
    engine.process(&Trigger::Log(owner)).unwrap();

    let pair = pair(&engine);
    assert_eq!(pair.big_int("totalAssetAmount").unwrap(), big(108), "lenders get accrued minus fee");
    assert_eq!(pair.big_int("totalBorrowAmount").unwrap(), big(10), "borrows grow by accrued");
    assert_eq!(pair.big_int("feesPendingAmount").unwrap(), big(2), "fee pending");
    assert_eq!(pair.big_int("interestPerBlock").unwrap(), big(7), "rate");
    assert_eq!(pair.big_int("lastBlockAccrued").unwrap(), big(12), "accrual block");
    assert_eq!(pair.address("feeTo").unwrap(), BOB, "fee recipient");
    assert_eq!(pair.address("owner").unwrap(), BOB, "owner");

    let balance = |user| {
        engine
            .store()
            .load(entities::USER_LENDING_PAIR_DATA, &user_lending_pair_data_id(user, PAIR))
            .unwrap()
            .big_int("balanceOf")
            .unwrap()
    };
    assert_eq!(balance(ALICE), big(70), "sender balance");
    assert_eq!(balance(BOB), big(30), "receiver balance");
}

#[test]
fn missing_pair_entity_is_fatal() {
    let mut engine = Engine::new(handler_table(), Box::new(MockChainClient::new()));
    engine
        .register_data_source(DataSource::on_chain(templates::LENDING_PAIR, PAIR))
        .unwrap();

    let err = engine.process(&movement("LogAddAsset", 11, ALICE, 1, 1)).unwrap_err();
    assert!(
        matches!(
            &err,
            Error::Mapping { handler, source: MappingError::MissingEntity { entity_type, .. }, .. }
                if handler == "LendingPair.LogAddAsset" && entity_type == entities::LENDING_PAIR
        ),
        "unexpected error: {err}"
    );
    assert_eq!(engine.store().entity_count(entities::USER), 0, "nothing written");
    assert_eq!(engine.cursor(), None, "failed trigger not marked processed");
}
