use crate::amount::Amount;
use crate::errors::PurchaseError;
use crate::ledger::{Address, Ledger, LedgerError, TxHash};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How much to approve once the current allowance falls short.
///
/// `Unlimited` approves 2^256 - 1 so later purchases skip the approval
/// round trip, at the cost of letting the spender draw on the owner's whole
/// balance until the approval is revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalPolicy {
    #[default]
    Unlimited,
    Exact,
}

impl ApprovalPolicy {
    pub fn approval_amount(&self, required: Amount, max_amount: Amount) -> Amount {
        match self {
            Self::Unlimited => max_amount,
            Self::Exact => required,
        }
    }
}

/// Result of [`AllowanceGuard::ensure_allowance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowanceStatus {
    /// The existing allowance already covered the requirement.
    Sufficient { current: Amount },
    /// An approval was sent and accepted.
    Approved { tx_hash: TxHash, amount: Amount },
}

/// Reads and, when it falls short, raises the allowance the payment token
/// grants a spender.
pub struct AllowanceGuard {
    ledger: Arc<dyn Ledger>,
    policy: ApprovalPolicy,
    max_amount: Amount,
}

impl AllowanceGuard {
    pub fn new(ledger: Arc<dyn Ledger>, policy: ApprovalPolicy) -> Self {
        Self {
            ledger,
            policy,
            max_amount: Amount::MAX,
        }
    }

    /// Cap for `Unlimited` approvals. Defaults to 2^256 - 1.
    pub fn with_max_amount(mut self, max_amount: Amount) -> Self {
        self.max_amount = max_amount;
        self
    }

    pub fn policy(&self) -> ApprovalPolicy {
        self.policy
    }

    pub async fn current_allowance(
        &self,
        owner: Address,
        spender: Address,
    ) -> Result<Amount, PurchaseError> {
        Ok(self.ledger.allowance(owner, spender).await?)
    }

    /// Make sure `spender` may draw at least `required` from `owner`.
    ///
    /// Sends at most one approval and returns only after the ledger has
    /// accepted it. The read and the approval are not atomic with respect to
    /// other clients of the same account.
    pub async fn ensure_allowance(
        &self,
        owner: Address,
        spender: Address,
        required: Amount,
    ) -> Result<AllowanceStatus, PurchaseError> {
        let current = self.current_allowance(owner, spender).await?;
        if current >= required {
            tracing::debug!(
                owner = %owner,
                spender = %spender,
                current = %current,
                required = %required,
                "Allowance sufficient"
            );
            return Ok(AllowanceStatus::Sufficient { current });
        }

        let amount = self.policy.approval_amount(required, self.max_amount);
        tracing::info!(
            owner = %owner,
            spender = %spender,
            current = %current,
            required = %required,
            policy = ?self.policy,
            "Allowance short, requesting approval"
        );

        let tx_hash = self
            .ledger
            .approve(spender, amount)
            .await
            .map_err(approval_error)?;
        self.ledger
            .wait_for_acceptance(tx_hash)
            .await
            .map_err(approval_error)?;

        tracing::info!(tx_hash = %tx_hash, spender = %spender, "Approval accepted");
        Ok(AllowanceStatus::Approved { tx_hash, amount })
    }
}

fn approval_error(err: LedgerError) -> PurchaseError {
    match err {
        LedgerError::Declined(reason) => PurchaseError::ApprovalRejected(reason),
        LedgerError::Reverted { tx_hash, reason } => {
            PurchaseError::ApprovalRejected(format!("approval {} reverted: {}", tx_hash, reason))
        }
        other => PurchaseError::Transport(other),
    }
}
