//! Entity and template names of the subgraph schema.
//!
//! The schema is owned by the subgraph manifest; handlers conform to it and
//! never define new types.

/// Data-source template names.
pub mod templates {
    /// Lending pair factory (master contract deployer).
    pub const BENTO_BOX: &str = "BentoBox";
    /// A deployed lending pair clone.
    pub const LENDING_PAIR: &str = "LendingPair";
    /// Token lock wallet factory.
    pub const TOKEN_LOCK_MANAGER: &str = "GraphTokenLockManager";
    /// A deployed token lock wallet.
    pub const TOKEN_LOCK_WALLET: &str = "GraphTokenLockWallet";
    /// Off-chain token lock metadata document.
    pub const TOKEN_LOCK_METADATA: &str = "TokenLockMetadata";
    /// The gravatar registry.
    pub const GRAVITY: &str = "Gravity";
    /// An NFT vault eligibility module.
    pub const ELIGIBILITY_MODULE: &str = "EligibilityModule";
}

/// Entity type names.
pub mod entities {
    /// Per-pair totals, keyed by pair address.
    pub const LENDING_PAIR: &str = "LendingPair";
    /// A lending pair participant, keyed by address.
    pub const USER: &str = "User";
    /// A participant's position in one pair, keyed `<user>-<pair>`.
    pub const USER_LENDING_PAIR_DATA: &str = "UserLendingPairData";
    /// One asset, borrow or collateral movement, keyed `<txHash>-<logIndex>`.
    pub const PAIR_TX: &str = "PairTx";
    /// Token lock wallet state, keyed by wallet address.
    pub const TOKEN_LOCK_WALLET: &str = "TokenLockWallet";
    /// Vesting schedule from off-chain metadata, keyed by content id.
    pub const TOKEN_LOCK_METADATA: &str = "TokenLockMetadata";
    /// A gravatar, keyed by its decimal id.
    pub const GRAVATAR: &str = "Gravatar";
    /// A `createGravatar` call, keyed by transaction hash.
    pub const TRANSACTION: &str = "Transaction";
    /// Eligibility module state, keyed by module address.
    pub const ELIGIBILITY_MODULE: &str = "EligibilityModule";
}

/// `PairTx.type` values.
pub mod pair_tx {
    /// Asset added or removed.
    pub const ASSET: &str = "assetTx";
    /// Borrow added or repaid.
    pub const BORROW: &str = "borrowTx";
    /// Collateral added or removed.
    pub const COLLATERAL: &str = "collateralTx";
}
