use crate::allowance::AllowanceGuard;
use crate::amount::{checked_total, Amount};
use crate::errors::{ErrorKind, PurchaseError};
use crate::ledger::{Address, Felt, Ledger, LedgerError, TxHash};
use crate::price::PriceOracle;
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

// ── Types ─────────────────────────────────────────────────────────────────────

/// One purchase: `quantity` units of `token_type_id`, paid by `buyer` and
/// issued to `recipient`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseRequest {
    pub buyer: Address,
    pub recipient: Address,
    pub token_type_id: Amount,
    pub quantity: Amount,
    /// Auxiliary data forwarded to `mint`.
    pub data: Vec<Felt>,
}

impl PurchaseRequest {
    /// A single unit minted to the buyer.
    pub fn new(buyer: Address, token_type_id: Amount) -> Self {
        Self {
            buyer,
            recipient: buyer,
            token_type_id,
            quantity: Amount::one(),
            data: Vec::new(),
        }
    }

    pub fn with_quantity(mut self, quantity: Amount) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_recipient(mut self, recipient: Address) -> Self {
        self.recipient = recipient;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseState {
    Idle,
    PriceResolved,
    AllowanceAssured,
    Submitted,
    Confirmed,
    Failed,
}

impl PurchaseState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }

    fn can_advance_to(&self, next: PurchaseState) -> bool {
        use PurchaseState::*;
        match (self, next) {
            (Idle, PriceResolved)
            | (PriceResolved, AllowanceAssured)
            | (AllowanceAssured, Submitted)
            | (Submitted, Confirmed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Final result of a purchase attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransactionOutcome {
    Confirmed {
        #[schema(value_type = String)]
        tx_hash: TxHash,
    },
    Failed {
        kind: ErrorKind,
        message: String,
        /// Set when the mint had already been broadcast.
        #[serde(skip_serializing_if = "Option::is_none")]
        #[schema(value_type = Option<String>)]
        tx_hash: Option<TxHash>,
    },
}

impl TransactionOutcome {
    fn failed(err: &PurchaseError, tx_hash: Option<TxHash>) -> Self {
        Self::Failed {
            kind: err.kind(),
            message: err.to_string(),
            tx_hash,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Confirmed { .. } => None,
            Self::Failed { kind, .. } => Some(*kind),
        }
    }
}

// ── Attempt state machine ─────────────────────────────────────────────────────

struct PurchaseAttempt<'a> {
    request: &'a PurchaseRequest,
    state: PurchaseState,
    tx_hash: Option<TxHash>,
}

impl<'a> PurchaseAttempt<'a> {
    fn new(request: &'a PurchaseRequest) -> Self {
        Self {
            request,
            state: PurchaseState::Idle,
            tx_hash: None,
        }
    }

    fn advance(&mut self, next: PurchaseState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal purchase transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::info!(
            buyer = %self.request.buyer,
            token_type_id = %self.request.token_type_id,
            from = ?self.state,
            to = ?next,
            "Purchase state transition"
        );
        self.state = next;
    }

    fn submitted(&mut self, tx_hash: TxHash) {
        self.tx_hash = Some(tx_hash);
        self.advance(PurchaseState::Submitted);
    }
}

/// Clears the in-flight flag on drop, including when the purchase future is
/// dropped mid-attempt.
struct InFlightGuard<'a> {
    in_flight: &'a DashSet<(Address, Amount)>,
    key: (Address, Amount),
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// Sequences price lookup, allowance assurance and the mint call.
///
/// Steps run strictly in order and are never retried. At most one attempt
/// per (buyer, token type) is in flight at a time.
pub struct PurchaseOrchestrator {
    ledger: Arc<dyn Ledger>,
    prices: Arc<PriceOracle>,
    allowances: AllowanceGuard,
    purchase_contract: Address,
    in_flight: DashSet<(Address, Amount)>,
}

impl PurchaseOrchestrator {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        prices: Arc<PriceOracle>,
        allowances: AllowanceGuard,
        purchase_contract: Address,
    ) -> Self {
        Self {
            ledger,
            prices,
            allowances,
            purchase_contract,
            in_flight: DashSet::new(),
        }
    }

    pub fn prices(&self) -> &Arc<PriceOracle> {
        &self.prices
    }

    pub fn allowances(&self) -> &AllowanceGuard {
        &self.allowances
    }

    pub fn purchase_contract(&self) -> Address {
        self.purchase_contract
    }

    pub fn is_in_flight(&self, buyer: Address, token_type_id: Amount) -> bool {
        self.in_flight.contains(&(buyer, token_type_id))
    }

    pub async fn purchase(&self, request: PurchaseRequest) -> TransactionOutcome {
        self.purchase_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Run one attempt, abandoning pending ledger calls once `cancel` fires.
    ///
    /// A mint that was already broadcast stays broadcast; the `Failed`
    /// outcome then carries its hash.
    pub async fn purchase_with_cancel(
        &self,
        request: PurchaseRequest,
        cancel: CancellationToken,
    ) -> TransactionOutcome {
        let key = (request.buyer, request.token_type_id);
        if !self.in_flight.insert(key) {
            let err = PurchaseError::AlreadyInProgress {
                buyer: request.buyer,
                token_type_id: request.token_type_id,
            };
            tracing::warn!("{}", err);
            return TransactionOutcome::failed(&err, None);
        }
        let _guard = InFlightGuard {
            in_flight: &self.in_flight,
            key,
        };

        let mut attempt = PurchaseAttempt::new(&request);
        match self.run(&mut attempt, &cancel).await {
            Ok(tx_hash) => {
                attempt.advance(PurchaseState::Confirmed);
                TransactionOutcome::Confirmed { tx_hash }
            }
            Err(err) => {
                tracing::warn!(
                    buyer = %request.buyer,
                    token_type_id = %request.token_type_id,
                    kind = err.kind().as_str(),
                    "Purchase failed: {}",
                    err
                );
                attempt.advance(PurchaseState::Failed);
                TransactionOutcome::failed(&err, attempt.tx_hash)
            }
        }
    }

    async fn run(
        &self,
        attempt: &mut PurchaseAttempt<'_>,
        cancel: &CancellationToken,
    ) -> Result<TxHash, PurchaseError> {
        let request = attempt.request;

        let price = until_cancelled(
            cancel,
            self.prices.fetch_mint_price(request.token_type_id),
        )
        .await?;
        let required = checked_total(price, request.quantity)?;
        attempt.advance(PurchaseState::PriceResolved);

        until_cancelled(
            cancel,
            self.allowances
                .ensure_allowance(request.buyer, self.purchase_contract, required),
        )
        .await?;
        attempt.advance(PurchaseState::AllowanceAssured);

        let tx_hash = until_cancelled(cancel, async {
            self.ledger
                .mint(
                    request.recipient,
                    request.token_type_id,
                    request.quantity,
                    request.data.clone(),
                )
                .await
                .map_err(purchase_error)
        })
        .await?;
        attempt.submitted(tx_hash);

        until_cancelled(cancel, async {
            self.ledger
                .wait_for_acceptance(tx_hash)
                .await
                .map_err(purchase_error)
        })
        .await?;
        Ok(tx_hash)
    }
}

async fn until_cancelled<T, F>(cancel: &CancellationToken, step: F) -> Result<T, PurchaseError>
where
    F: Future<Output = Result<T, PurchaseError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PurchaseError::Cancelled),
        result = step => result,
    }
}

fn purchase_error(err: LedgerError) -> PurchaseError {
    match err {
        LedgerError::Declined(reason) => PurchaseError::PurchaseRejected(reason),
        LedgerError::Reverted { tx_hash, reason } => {
            PurchaseError::PurchaseRejected(format!("mint {} reverted: {}", tx_hash, reason))
        }
        other => PurchaseError::Transport(other),
    }
}
