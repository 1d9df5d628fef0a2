//! Token purchase orchestration against a Starknet token sale contract.
//!
//! Prices are read from the sale contract, the payment token allowance is
//! raised when it falls short, and the mint is submitted through a wallet
//! bridge and followed until the ledger accepts it.

pub mod allowance;
pub mod amount;
pub mod api;
pub mod config;
pub mod errors;
pub mod ledger;
pub mod network_config;
pub mod orchestrator;
pub mod price;

#[cfg(test)]
mod testing;

pub use allowance::{AllowanceGuard, ApprovalPolicy};
pub use amount::{Amount, AmountCodec};
pub use errors::{ErrorKind, PurchaseError};
pub use ledger::{Address, Felt, Ledger, StarknetLedger};
pub use orchestrator::{PurchaseOrchestrator, PurchaseRequest, TransactionOutcome};
pub use price::PriceOracle;
