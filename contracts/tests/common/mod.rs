//! Shared fixtures for the contract integration tests.

#![allow(dead_code)]

use escrow_contracts::{CallContext, CustodyKind, EscrowContract};
use escrow_protocol::{Address, Amount, Chain, Erc20Token, LendingPool};

pub const GENESIS: u64 = 1_700_000_000;
pub const START_BALANCE: Amount = 1_000_000;

/// A chain with DAI and LINK, three funded accounts and one deployed contract.
pub struct Env {
    pub chain: Chain,
    pub contract: EscrowContract,
    pub owner: Address,
    pub alice: Address,
    pub bob: Address,
    pub carol: Address,
    pub dai: Address,
    pub link: Address,
}

impl Env {
    pub fn direct() -> Self {
        Self::build(CustodyKind::Direct, 0)
    }

    /// Yield custody over a pool paying `rate_bps` on DAI and LINK.
    pub fn with_yield(rate_bps: u32) -> Self {
        Self::build(CustodyKind::Yield, rate_bps)
    }

    fn build(kind: CustodyKind, rate_bps: u32) -> Self {
        let owner = Address::from_label("owner");
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        let carol = Address::from_label("carol");
        let dai = Address::from_label("token:DAI");
        let link = Address::from_label("token:LINK");

        let mut chain = Chain::new(1, GENESIS);
        if kind == CustodyKind::Yield {
            let mut pool = LendingPool::new(Address::from_label("pool"));
            pool.add_reserve(dai, Address::from_label("atoken:DAI"), rate_bps, GENESIS)
                .unwrap();
            pool.add_reserve(link, Address::from_label("atoken:LINK"), rate_bps, GENESIS)
                .unwrap();
            chain = chain.with_pool(pool);
        }

        chain
            .bank
            .register_token(Erc20Token::new(dai, "Dai Stablecoin", "DAI", 18))
            .unwrap();
        chain
            .bank
            .register_token(Erc20Token::new(link, "ChainLink", "LINK", 18))
            .unwrap();

        let contract = EscrowContract::deploy(Address::from_label("escrow"), owner, kind).unwrap();
        for account in [alice, bob, carol] {
            chain.bank.mint_native(account, START_BALANCE).unwrap();
            for token in [dai, link] {
                let t = chain.bank.token_mut(&token).unwrap();
                t.mint(account, START_BALANCE).unwrap();
                t.approve(account, contract.address(), Amount::MAX).unwrap();
            }
        }

        Self {
            chain,
            contract,
            owner,
            alice,
            bob,
            carol,
            dai,
            link,
        }
    }

    pub fn as_caller(&self, caller: Address) -> CallContext {
        CallContext::new(caller)
    }

    pub fn dai_of(&self, account: &Address) -> Amount {
        self.chain.bank.token(&self.dai).unwrap().balance_of(account)
    }

    pub fn native_of(&self, account: &Address) -> Amount {
        self.chain.bank.native_balance_of(account)
    }

    /// Alice escrows `amount` DAI to Bob, unlocking `lock_secs` from now.
    pub fn create_dai(&mut self, amount: Amount, lock_secs: u64) -> u64 {
        let ctx = CallContext::new(self.alice);
        let unlock = self.chain.timestamp() + lock_secs;
        let (bob, dai) = (self.bob, self.dai);
        self.contract
            .create_escrow_transaction(&mut self.chain, &ctx, bob, dai, amount, unlock)
            .unwrap()
    }

    pub fn advance(&mut self, secs: u64) {
        self.chain.advance_time(secs).unwrap();
    }
}
