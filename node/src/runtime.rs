//! # Node Runtime
//!
//! The chain and the one escrow contract the node hosts, persisted together
//! as a single snapshot.
//!
//! A fresh data directory gets a devnet genesis: every devnet token is
//! registered, a lending pool is seeded when the contract uses yield
//! custody, and the contract is deployed owned by the operator.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use escrow_contracts::{CallError, CallReceipt, CustodyKind, EscrowContract, SignedCall};
use escrow_protocol::config::{
    a_token_label, devnet_token_label, whole_units, CHAIN_ID, DEFAULT_POOL_RATE_BPS, DEVNET_TOKENS,
    FAUCET_MAX_WHOLE_TOKENS, GENESIS_POOL_LIQUIDITY_WHOLE_TOKENS, NATIVE_DECIMALS, POOL_LABEL,
};
use escrow_protocol::storage::{StateStore, StoreResult};
use escrow_protocol::{Address, Amount, Asset, Chain, ChainError, Erc20Token, LendingPool, TokenError};

/// Snapshot key under which the runtime is stored.
pub const SNAPSHOT_KEY: &str = "runtime";

/// Label the contract address is derived from.
pub const CONTRACT_LABEL: &str = "escrow-devnet:escrow-contract";

/// Account that seeds pool liquidity at genesis.
pub const LIQUIDITY_PROVIDER_LABEL: &str = "escrow-devnet:liquidity-provider";

/// Parameters for a fresh devnet.
#[derive(Debug, Clone, Copy)]
pub struct GenesisConfig {
    pub owner: Address,
    pub custody: CustodyKind,
    /// Unix seconds.
    pub timestamp: u64,
}

/// Faucet failures.
#[derive(Debug, Error)]
pub enum FaucetError {
    #[error("unknown asset: {0}")]
    UnknownAsset(String),

    #[error("amount must be between 1 and {max} whole tokens")]
    AmountOutOfRange { max: u64 },

    #[error("cannot mint to the zero address")]
    ZeroAddress,

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Chain plus contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Runtime {
    pub chain: Chain,
    pub contract: EscrowContract,
}

impl Runtime {
    /// Builds a devnet genesis.
    pub fn genesis(config: &GenesisConfig) -> Result<Self> {
        let mut chain = Chain::new(CHAIN_ID, config.timestamp);

        for token in DEVNET_TOKENS {
            let address = Address::from_label(&devnet_token_label(token.symbol));
            chain
                .bank
                .register_token(Erc20Token::new(address, token.name, token.symbol, token.decimals))
                .with_context(|| format!("failed to register {}", token.symbol))?;
        }

        if config.custody == CustodyKind::Yield {
            chain = chain.with_pool(LendingPool::new(Address::from_label(POOL_LABEL)));
            seed_pool(&mut chain, config.timestamp)?;
        }

        let contract = EscrowContract::deploy(Address::from_label(CONTRACT_LABEL), config.owner, config.custody)
            .context("failed to deploy escrow contract")?;

        tracing::info!(
            chain_id = CHAIN_ID,
            contract = %contract.address(),
            owner = %config.owner,
            custody = %config.custody,
            tokens = DEVNET_TOKENS.len(),
            "devnet genesis created"
        );
        Ok(Self { chain, contract })
    }

    /// Loads the snapshot from `store`, or creates and saves a genesis.
    pub fn load_or_genesis(store: &StateStore, config: &GenesisConfig) -> Result<Self> {
        if let Some(runtime) = store
            .load::<Runtime>(SNAPSHOT_KEY)
            .context("failed to load runtime snapshot")?
        {
            if runtime.contract.custody_kind() != config.custody {
                tracing::warn!(
                    stored = %runtime.contract.custody_kind(),
                    requested = %config.custody,
                    "custody mode is fixed at genesis; keeping the stored one"
                );
            }
            tracing::info!(
                height = runtime.chain.height(),
                escrows = runtime.contract.counter_escrow_transactions(),
                "runtime snapshot loaded"
            );
            return Ok(runtime);
        }

        let runtime = Self::genesis(config)?;
        runtime.persist(store).context("failed to persist genesis")?;
        Ok(runtime)
    }

    pub fn persist(&self, store: &StateStore) -> StoreResult<()> {
        store.save(SNAPSHOT_KEY, self, self.chain.height())
    }

    /// Produces the next block at `timestamp` (unix seconds).
    pub fn produce_block(&mut self, timestamp: u64) -> Result<(), ChainError> {
        self.chain.produce_block(timestamp)
    }

    /// Verifies and executes a client's signed call.
    pub fn submit(&mut self, signed: &SignedCall) -> Result<(Address, CallReceipt), CallError> {
        self.contract.execute_signed(&mut self.chain, signed)
    }

    /// Resolves `native`/`eth`, a devnet symbol, or a token address.
    pub fn resolve_asset(&self, asset: &str) -> Option<Asset> {
        if asset.eq_ignore_ascii_case("native") || asset.eq_ignore_ascii_case("eth") {
            return Some(Asset::Native);
        }
        if let Some(token) = self.chain.bank.token_by_symbol(asset) {
            return Some(Asset::Token(token.address()));
        }
        let address: Address = asset.parse().ok()?;
        if address.is_zero() {
            return Some(Asset::Native);
        }
        self.chain
            .bank
            .is_registered(&address)
            .then_some(Asset::Token(address))
    }

    /// Mints `whole` tokens of `asset` to `to`. Returns the base-unit amount.
    pub fn faucet(&mut self, asset: &str, to: Address, whole: u64) -> Result<Amount, FaucetError> {
        if to.is_zero() {
            return Err(FaucetError::ZeroAddress);
        }
        if whole == 0 || whole > FAUCET_MAX_WHOLE_TOKENS {
            return Err(FaucetError::AmountOutOfRange {
                max: FAUCET_MAX_WHOLE_TOKENS,
            });
        }
        let resolved = self
            .resolve_asset(asset)
            .ok_or_else(|| FaucetError::UnknownAsset(asset.to_string()))?;

        let amount = match resolved {
            Asset::Native => {
                let amount = whole_units(whole, NATIVE_DECIMALS).ok_or(TokenError::Overflow(Address::ZERO))?;
                self.chain.bank.mint_native(to, amount)?;
                amount
            }
            Asset::Token(token) => {
                let erc20 = self.chain.bank.token_mut(&token)?;
                let amount = whole_units(whole, erc20.decimals()).ok_or(TokenError::Overflow(token))?;
                erc20.mint(to, amount)?;
                amount
            }
        };
        tracing::info!(asset = %resolved, to = %to, amount, "faucet mint");
        Ok(amount)
    }
}

/// Lists a reserve for every pooled devnet token and supplies initial
/// liquidity from the liquidity provider account.
fn seed_pool(chain: &mut Chain, now: u64) -> Result<()> {
    let provider = Address::from_label(LIQUIDITY_PROVIDER_LABEL);
    let (pool, bank) = chain
        .pool_and_bank_mut()
        .context("seed_pool called on a chain without a pool")?;
    let pool_addr = pool.address();

    for token in DEVNET_TOKENS.iter().filter(|t| t.pooled) {
        let underlying = Address::from_label(&devnet_token_label(token.symbol));
        pool.add_reserve(
            underlying,
            Address::from_label(&a_token_label(token.symbol)),
            DEFAULT_POOL_RATE_BPS,
            now,
        )?;

        let liquidity = whole_units(GENESIS_POOL_LIQUIDITY_WHOLE_TOKENS, token.decimals)
            .with_context(|| format!("genesis liquidity overflows for {}", token.symbol))?;
        let erc20 = bank.token_mut(&underlying)?;
        erc20.mint(provider, liquidity)?;
        erc20.approve(provider, pool_addr, liquidity)?;
        pool.supply(bank, underlying, liquidity, provider, provider)?;
        tracing::debug!(token = token.symbol, liquidity, "pool reserve seeded");
    }
    Ok(())
}
