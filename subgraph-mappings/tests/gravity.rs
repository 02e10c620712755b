//! Gravatar registry handlers and contract-read helpers.

use alloy::primitives::{Address, B256, U256, address};
use subgraph::{
    Block, Call, DataSource, DataSourceRegistry, Engine, EntityStore, Event, MappingContext, MappingError,
    MockChainClient, Trigger, Value, i256_from_u64,
};
use subgraph_mappings::gravity::{
    GET_GRAVATAR, GRAVITY_CONTRACT, handle_new_gravatars, save_gravatar_from_contract,
    try_save_gravatar_from_contract,
};
use subgraph_mappings::handler_table;
use subgraph_mappings::schema::{entities, templates};

const OWNER: Address = address!("4444444444444444444444444444444444444444");

fn new_gravatar(id: u64, name: &str, log_index: u64) -> Event {
    Event::new("NewGravatar")
        .with_address(GRAVITY_CONTRACT)
        .with_param("id", i256_from_u64(id))
        .with_param("owner", OWNER)
        .with_param("displayName", name)
        .with_param("imageUrl", format!("https://example.com/{id}.png"))
        .with_log_index(log_index)
}

fn engine() -> Engine {
    let mut engine = Engine::new(handler_table(), Box::new(MockChainClient::new()));
    engine
        .register_data_source(DataSource::on_chain(templates::GRAVITY, GRAVITY_CONTRACT))
        .unwrap();
    engine
}

#[test]
fn new_and_updated_gravatars() {
    let mut engine = engine();
    engine.process(&Trigger::Log(new_gravatar(1, "first", 0))).unwrap();

    let mut updated = new_gravatar(1, "renamed", 1);
    updated.name = "UpdatedGravatar".to_owned();
    engine.process(&Trigger::Log(updated)).unwrap();

    let mut unseen = new_gravatar(2, "late", 2);
    unseen.name = "UpdatedGravatar".to_owned();
    engine.process(&Trigger::Log(unseen)).unwrap();

    let store = engine.store();
    let first = store.load(entities::GRAVATAR, "1").unwrap();
    assert_eq!(first.string("displayName").unwrap(), "renamed", "update applied");
    assert_eq!(first.address("owner").unwrap(), OWNER, "owner");
    assert_eq!(store.version(entities::GRAVATAR, "1"), Some(2), "saved twice");
    assert!(store.contains(entities::GRAVATAR, "2"), "update of an unseen id creates it");
}

#[test]
fn ids_use_the_full_uint256_range() {
    let gravatar = |name: &str, id: U256, display_name: &str, log_index: u64| {
        Event::new(name)
            .with_address(GRAVITY_CONTRACT)
            .with_param("id", id)
            .with_param("owner", OWNER)
            .with_param("displayName", display_name)
            .with_param("imageUrl", "https://example.com/big.png")
            .with_log_index(log_index)
    };
    let top_bit = U256::from(1u64) << 255;

    let mut engine = engine();
    for (log_index, id) in [(0, top_bit), (1, U256::MAX)] {
        let event = gravatar("NewGravatar", id, "big", log_index);
        engine.process(&Trigger::Log(event)).unwrap();
    }
    let updated = gravatar("UpdatedGravatar", U256::MAX, "renamed", 2);
    engine.process(&Trigger::Log(updated)).unwrap();

    let store = engine.store();
    assert!(store.contains(entities::GRAVATAR, &top_bit.to_string()), "2^255 keyed in decimal");
    let max = store.load(entities::GRAVATAR, &U256::MAX.to_string()).unwrap();
    assert_eq!(max.string("displayName").unwrap(), "renamed", "update found the uint256::MAX gravatar");
}

#[test]
fn create_gravatar_call_records_transaction() {
    let mut engine = engine();
    let hash = B256::repeat_byte(0xab);
    let call = Call::new("createGravatar")
        .with_to(GRAVITY_CONTRACT)
        .with_input("_displayName", "carl")
        .with_input("_imageUrl", "https://example.com/carl.png")
        .with_transaction(hash, 3);
    engine.process(&Trigger::Call(call)).unwrap();

    let tx = engine
        .store()
        .load(entities::TRANSACTION, &format!("{hash:#x}"))
        .unwrap();
    assert_eq!(tx.string("displayName").unwrap(), "carl", "call input stored");
}

/// Run `f` against a context for the gravity data source.
fn with_context<T>(
    chain: &MockChainClient,
    store: &mut EntityStore,
    f: impl FnOnce(&mut MappingContext<'_>) -> T,
) -> T {
    let registry = DataSourceRegistry::new();
    let handlers = handler_table();
    let data_source = DataSource::on_chain(templates::GRAVITY, GRAVITY_CONTRACT);
    let mut ctx = MappingContext::new(
        store,
        &registry,
        &handlers,
        chain,
        &data_source,
        "mainnet",
        Block::default(),
    );
    f(&mut ctx)
}

#[test]
fn batch_applies_every_event() {
    let mut store = EntityStore::new();
    let events = [new_gravatar(1, "a", 0), new_gravatar(2, "b", 1), new_gravatar(3, "c", 2)];
    with_context(&MockChainClient::new(), &mut store, |ctx| {
        handle_new_gravatars(ctx, &events)
    })
    .unwrap();
    assert_eq!(store.entity_count(entities::GRAVATAR), 3, "one gravatar per event");
}

#[test]
fn contract_read_saves_gravatar() {
    let mut chain = MockChainClient::new();
    chain.mock(
        GRAVITY_CONTRACT,
        GET_GRAVATAR,
        vec![Value::Address(GRAVITY_CONTRACT)],
        vec![Value::from("carl"), Value::from("https://example.com/carl.png")],
    );
    let mut store = EntityStore::new();
    with_context(&chain, &mut store, |ctx| save_gravatar_from_contract(ctx, "7")).unwrap();

    let gravatar = store.load(entities::GRAVATAR, "7").unwrap();
    assert_eq!(gravatar.string("value0").unwrap(), "carl", "first output");
    assert_eq!(gravatar.string("value1").unwrap(), "https://example.com/carl.png", "second output");
}

#[test]
fn reverted_contract_read() {
    let mut chain = MockChainClient::new();
    chain.mock_revert(GRAVITY_CONTRACT, GET_GRAVATAR, vec![Value::Address(GRAVITY_CONTRACT)]);
    let mut store = EntityStore::new();

    let err = with_context(&chain, &mut store, |ctx| save_gravatar_from_contract(ctx, "7")).unwrap_err();
    assert!(matches!(err, MappingError::CallReverted { .. }), "revert is fatal: {err}");

    with_context(&chain, &mut store, |ctx| try_save_gravatar_from_contract(ctx, "7")).unwrap();
    assert!(!store.contains(entities::GRAVATAR, "7"), "try variant writes nothing");
}
