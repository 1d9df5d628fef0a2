//! Scripted in-memory [`Ledger`] for unit tests.

use crate::amount::Amount;
use crate::ledger::{Address, Felt, Ledger, LedgerError, TokenSupply, TxHash};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::Notify;

/// Every call the mock receives, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    MintPrice(Amount),
    Allowance { owner: Address, spender: Address },
    Approve { spender: Address, amount: Amount },
    Mint {
        recipient: Address,
        token_type_id: Amount,
        quantity: Amount,
        data: Vec<Felt>,
    },
    WaitForAcceptance(TxHash),
    TokenSupply(Amount),
}

/// Failure a scripted call should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Timeout,
    Declined,
    Reverted,
}

impl Failure {
    fn into_error(self, tx_hash: TxHash) -> LedgerError {
        match self {
            Failure::Timeout => LedgerError::NodeTimeout,
            Failure::Declined => LedgerError::Declined("User refused".to_string()),
            Failure::Reverted => LedgerError::Reverted {
                tx_hash,
                reason: "insufficient balance".to_string(),
            },
        }
    }
}

#[derive(Default)]
struct MockState {
    prices: HashMap<Amount, Amount>,
    supplies: HashMap<Amount, TokenSupply>,
    allowances: HashMap<(Address, Address), Amount>,
    price_failure: Option<Failure>,
    allowance_failure: Option<Failure>,
    approve_failure: Option<Failure>,
    mint_failure: Option<Failure>,
    acceptance_failure: Option<Failure>,
    hold_price: bool,
    hold_acceptance: bool,
    next_tx: u128,
    calls: Vec<LedgerCall>,
}

/// The connected wallet is `owner`: approvals it sends update the
/// `(owner, spender)` allowance once accepted.
pub struct MockLedger {
    owner: Address,
    state: Mutex<MockState>,
    price_entered: Notify,
    price_release: Notify,
    acceptance_entered: Notify,
    acceptance_release: Notify,
}

impl MockLedger {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            state: Mutex::new(MockState {
                next_tx: 0x100,
                ..MockState::default()
            }),
            price_entered: Notify::new(),
            price_release: Notify::new(),
            acceptance_entered: Notify::new(),
            acceptance_release: Notify::new(),
        }
    }

    pub fn with_price(self, token_type_id: u64, price: Amount) -> Self {
        self.state
            .lock()
            .unwrap()
            .prices
            .insert(Amount::from(token_type_id), price);
        self
    }

    pub fn with_supply(self, token_type_id: u64, supply: TokenSupply) -> Self {
        self.state
            .lock()
            .unwrap()
            .supplies
            .insert(Amount::from(token_type_id), supply);
        self
    }

    pub fn with_allowance(self, spender: Address, amount: Amount) -> Self {
        self.state
            .lock()
            .unwrap()
            .allowances
            .insert((self.owner, spender), amount);
        self
    }

    pub fn fail_price(self, failure: Failure) -> Self {
        self.state.lock().unwrap().price_failure = Some(failure);
        self
    }

    pub fn fail_allowance(self, failure: Failure) -> Self {
        self.state.lock().unwrap().allowance_failure = Some(failure);
        self
    }

    pub fn fail_approve(self, failure: Failure) -> Self {
        self.state.lock().unwrap().approve_failure = Some(failure);
        self
    }

    pub fn fail_mint(self, failure: Failure) -> Self {
        self.state.lock().unwrap().mint_failure = Some(failure);
        self
    }

    pub fn fail_acceptance(self, failure: Failure) -> Self {
        self.state.lock().unwrap().acceptance_failure = Some(failure);
        self
    }

    /// Park every `mint_price` call until [`MockLedger::release_price`].
    pub fn hold_price(self) -> Self {
        self.state.lock().unwrap().hold_price = true;
        self
    }

    pub async fn price_requested(&self) {
        self.price_entered.notified().await;
    }

    pub fn release_price(&self) {
        self.state.lock().unwrap().hold_price = false;
        self.price_release.notify_waiters();
    }

    /// Park every `wait_for_acceptance` call until
    /// [`MockLedger::release_acceptance`].
    pub fn hold_acceptance(self) -> Self {
        self.state.lock().unwrap().hold_acceptance = true;
        self
    }

    pub async fn acceptance_requested(&self) {
        self.acceptance_entered.notified().await;
    }

    pub fn release_acceptance(&self) {
        self.state.lock().unwrap().hold_acceptance = false;
        self.acceptance_release.notify_waiters();
    }

    pub fn calls(&self) -> Vec<LedgerCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn approvals(&self) -> Vec<LedgerCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, LedgerCall::Approve { .. }))
            .collect()
    }

    pub fn mints(&self) -> Vec<LedgerCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, LedgerCall::Mint { .. }))
            .collect()
    }

    fn record(&self, call: LedgerCall) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn next_tx(&self) -> TxHash {
        let mut state = self.state.lock().unwrap();
        let tx = state.next_tx;
        state.next_tx += 1;
        Felt::from(tx)
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn mint_price(&self, token_type_id: Amount) -> Result<Amount, LedgerError> {
        self.record(LedgerCall::MintPrice(token_type_id));
        let release = self.price_release.notified();
        tokio::pin!(release);
        release.as_mut().enable();
        self.price_entered.notify_one();
        let held = self.state.lock().unwrap().hold_price;
        if held {
            release.await;
        }

        let state = self.state.lock().unwrap();
        if let Some(failure) = state.price_failure {
            return Err(failure.into_error(Felt::ZERO));
        }
        state
            .prices
            .get(&token_type_id)
            .copied()
            .ok_or_else(|| LedgerError::Rpc {
                code: 40,
                message: "Contract error".to_string(),
            })
    }

    async fn allowance(&self, owner: Address, spender: Address) -> Result<Amount, LedgerError> {
        self.record(LedgerCall::Allowance { owner, spender });
        let state = self.state.lock().unwrap();
        if let Some(failure) = state.allowance_failure {
            return Err(failure.into_error(Felt::ZERO));
        }
        Ok(state
            .allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default())
    }

    async fn approve(&self, spender: Address, amount: Amount) -> Result<TxHash, LedgerError> {
        self.record(LedgerCall::Approve { spender, amount });
        let tx_hash = self.next_tx();
        let mut state = self.state.lock().unwrap();
        if let Some(failure) = state.approve_failure {
            return Err(failure.into_error(tx_hash));
        }
        state.allowances.insert((self.owner, spender), amount);
        Ok(tx_hash)
    }

    async fn mint(
        &self,
        recipient: Address,
        token_type_id: Amount,
        quantity: Amount,
        data: Vec<Felt>,
    ) -> Result<TxHash, LedgerError> {
        self.record(LedgerCall::Mint {
            recipient,
            token_type_id,
            quantity,
            data,
        });
        let tx_hash = self.next_tx();
        match self.state.lock().unwrap().mint_failure {
            Some(failure) => Err(failure.into_error(tx_hash)),
            None => Ok(tx_hash),
        }
    }

    async fn wait_for_acceptance(&self, tx_hash: TxHash) -> Result<(), LedgerError> {
        self.record(LedgerCall::WaitForAcceptance(tx_hash));
        let release = self.acceptance_release.notified();
        tokio::pin!(release);
        release.as_mut().enable();
        self.acceptance_entered.notify_one();
        let held = self.state.lock().unwrap().hold_acceptance;
        if held {
            release.await;
        }

        match self.state.lock().unwrap().acceptance_failure {
            Some(failure) => Err(failure.into_error(tx_hash)),
            None => Ok(()),
        }
    }

    async fn token_supply(&self, token_type_id: Amount) -> Result<TokenSupply, LedgerError> {
        self.record(LedgerCall::TokenSupply(token_type_id));
        let state = self.state.lock().unwrap();
        if let Some(failure) = state.price_failure {
            return Err(failure.into_error(Felt::ZERO));
        }
        state
            .supplies
            .get(&token_type_id)
            .copied()
            .ok_or_else(|| LedgerError::Rpc {
                code: 40,
                message: "Contract error".to_string(),
            })
    }
}

pub fn addr(value: u128) -> Address {
    Felt::from(value)
}
