use crate::amount::{Amount, Uint256};
use async_trait::async_trait;
use primitive_types::U256;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Wallet API error code for an invocation the user refused to sign.
const WALLET_USER_REFUSED: i32 = 113;

/// Node error code returned while a transaction is not yet known.
const TXN_HASH_NOT_FOUND: i32 = 29;

/// Errors that can occur while talking to the ledger node or the wallet
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("RPC node timeout")]
    NodeTimeout,

    #[error("HTTP error: {0}")]
    Http(u16),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("Wallet declined the invocation: {0}")]
    Declined(String),

    #[error("Transaction {tx_hash} reverted: {reason}")]
    Reverted { tx_hash: TxHash, reason: String },

    #[error("Transaction {0} was not accepted before the confirmation deadline")]
    ConfirmationTimeout(TxHash),

    #[error("Decode error: {0}")]
    Decode(String),
}

// ── Field elements ────────────────────────────────────────────────────────────

/// A ledger field element, strictly below the Stark prime
/// `2^251 + 17 * 2^192 + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Felt(U256);

pub type Address = Felt;
pub type TxHash = Felt;

impl Felt {
    pub const ZERO: Felt = Felt(U256([0; 4]));

    pub fn prime() -> U256 {
        (U256::one() << 251) + (U256::from(17u8) << 192) + U256::one()
    }

    pub fn new(value: U256) -> Result<Self, LedgerError> {
        if value >= Self::prime() {
            return Err(LedgerError::Decode(format!(
                "0x{:x} is not below the field prime",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> U256 {
        self.0
    }

    /// The value as a 128-bit limb, if it fits.
    pub fn to_u128(&self) -> Option<u128> {
        if self.0.bits() <= 128 {
            Some(self.0.low_u128())
        } else {
            None
        }
    }
}

impl From<u128> for Felt {
    fn from(value: u128) -> Self {
        Self(U256::from(value))
    }
}

impl FromStr for Felt {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| LedgerError::Decode(format!("'{}' is missing the 0x prefix", s)))?;
        if digits.is_empty() || digits.len() > 64 {
            return Err(LedgerError::Decode(format!("'{}' is not a valid felt", s)));
        }
        let value = U256::from_str_radix(digits, 16)
            .map_err(|_| LedgerError::Decode(format!("'{}' is not valid hex", s)))?;
        Self::new(value)
    }
}

impl fmt::Display for Felt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl Serialize for Felt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Felt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Entry point selector: keccak-256 of the name, truncated to 250 bits.
pub fn selector(entry_point: &str) -> Felt {
    let digest = Keccak256::digest(entry_point.as_bytes());
    let mask = (U256::one() << 250) - U256::one();
    Felt(U256::from_big_endian(digest.as_slice()) & mask)
}

fn push_uint256(calldata: &mut Vec<Felt>, value: Amount) {
    let limbs = Uint256::from(value);
    calldata.push(Felt::from(limbs.low));
    calldata.push(Felt::from(limbs.high));
}

fn read_uint256(result: &[Felt], entry_point: &str) -> Result<Amount, LedgerError> {
    let limb = |i: usize| {
        result
            .get(i)
            .and_then(Felt::to_u128)
            .ok_or_else(|| {
                LedgerError::Decode(format!(
                    "{} returned {} felts, expected a (low, high) uint256",
                    entry_point,
                    result.len()
                ))
            })
    };
    Ok(Amount::from(Uint256 {
        low: limb(0)?,
        high: limb(1)?,
    }))
}

// ── Call surface ──────────────────────────────────────────────────────────────

/// Supply bookkeeping the purchase contract keeps per token type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSupply {
    pub max_price: Amount,
    pub max_supply: Amount,
    pub supply: Amount,
}

/// The fixed call interface to the remote ledger.
///
/// Reads go to a node; `approve` and `mint` are signed and broadcast by the
/// connected wallet and resolve to the transaction hash once it is accepted
/// for broadcast.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn mint_price(&self, token_type_id: Amount) -> Result<Amount, LedgerError>;

    async fn allowance(&self, owner: Address, spender: Address) -> Result<Amount, LedgerError>;

    async fn approve(&self, spender: Address, amount: Amount) -> Result<TxHash, LedgerError>;

    async fn mint(
        &self,
        recipient: Address,
        token_type_id: Amount,
        quantity: Amount,
        data: Vec<Felt>,
    ) -> Result<TxHash, LedgerError>;

    /// Resolve once the transaction is accepted, fail if it reverts.
    async fn wait_for_acceptance(&self, tx_hash: TxHash) -> Result<(), LedgerError>;

    async fn token_supply(&self, token_type_id: Amount) -> Result<TokenSupply, LedgerError>;
}

// ── JSON-RPC wire types ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<R> {
    result: Option<R>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i32,
    message: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct InvokeCall {
    contract_address: Address,
    entry_point: String,
    calldata: Vec<Felt>,
}

#[derive(Debug, Deserialize)]
struct InvokeResult {
    transaction_hash: TxHash,
}

#[derive(Debug, Deserialize)]
struct TransactionReceipt {
    finality_status: String,
    #[serde(default)]
    execution_status: Option<String>,
    #[serde(default)]
    revert_reason: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum ReceiptStatus {
    Pending,
    Accepted,
    Reverted(String),
}

impl TransactionReceipt {
    fn status(&self) -> ReceiptStatus {
        let reverted = self.execution_status.as_deref() == Some("REVERTED");
        if reverted || self.finality_status == "REJECTED" {
            return ReceiptStatus::Reverted(
                self.revert_reason
                    .clone()
                    .unwrap_or_else(|| "no reason given".to_string()),
            );
        }
        match self.finality_status.as_str() {
            "ACCEPTED_ON_L2" | "ACCEPTED_ON_L1" => ReceiptStatus::Accepted,
            _ => ReceiptStatus::Pending,
        }
    }
}

// ── Starknet binding ──────────────────────────────────────────────────────────

/// Addresses of the two contracts a purchase touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerContracts {
    pub purchase_contract: Address,
    pub payment_token: Address,
}

/// [`Ledger`] over Starknet JSON-RPC for reads and a wallet bridge speaking
/// the wallet API (`wallet_addInvokeTransaction`) for writes.
pub struct StarknetLedger {
    rpc_url: String,
    wallet_url: String,
    contracts: LedgerContracts,
    client: Client,
    request_timeout: Duration,
    poll_interval: Duration,
    confirmation_timeout: Duration,
    next_id: AtomicU64,
}

impl StarknetLedger {
    pub fn new(rpc_url: String, wallet_url: String, contracts: LedgerContracts) -> Self {
        Self {
            rpc_url,
            wallet_url,
            contracts,
            client: Client::new(),
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(2),
            confirmation_timeout: Duration::from_secs(300),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_timeouts(
        mut self,
        request_timeout: Duration,
        poll_interval: Duration,
        confirmation_timeout: Duration,
    ) -> Self {
        self.request_timeout = request_timeout;
        self.poll_interval = poll_interval;
        self.confirmation_timeout = confirmation_timeout;
        self
    }

    async fn rpc<P, R>(&self, url: &str, method: &str, params: P) -> Result<R, LedgerError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        tracing::debug!(method, url, "Sending JSON-RPC request");

        let response = tokio::time::timeout(
            self.request_timeout,
            self.client.post(url).json(&request).send(),
        )
        .await
        .map_err(|_| LedgerError::NodeTimeout)?
        .map_err(|e| {
            if e.is_timeout() {
                LedgerError::NodeTimeout
            } else {
                LedgerError::Network(e)
            }
        })?;

        if !response.status().is_success() {
            return Err(LedgerError::Http(response.status().as_u16()));
        }

        let body: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(format!("Failed to parse response: {}", e)))?;

        match (body.result, body.error) {
            (_, Some(error)) => Err(rpc_error(method, error)),
            (Some(result), None) => Ok(result),
            (None, None) => Err(LedgerError::Decode(format!(
                "{} response carried neither result nor error",
                method
            ))),
        }
    }

    async fn call(
        &self,
        contract: Address,
        entry_point: &str,
        calldata: Vec<Felt>,
    ) -> Result<Vec<Felt>, LedgerError> {
        let params = serde_json::json!({
            "request": {
                "contract_address": contract,
                "entry_point_selector": selector(entry_point),
                "calldata": calldata,
            },
            "block_id": "latest"
        });
        self.rpc(&self.rpc_url, "starknet_call", params).await
    }

    async fn call_uint256(
        &self,
        contract: Address,
        entry_point: &str,
        calldata: Vec<Felt>,
    ) -> Result<Amount, LedgerError> {
        let result = self.call(contract, entry_point, calldata).await?;
        read_uint256(&result, entry_point)
    }

    async fn invoke(
        &self,
        contract: Address,
        entry_point: &str,
        calldata: Vec<Felt>,
    ) -> Result<TxHash, LedgerError> {
        let call = InvokeCall {
            contract_address: contract,
            entry_point: entry_point.to_string(),
            calldata,
        };
        let params = serde_json::json!({ "calls": [call] });
        let result: InvokeResult = self
            .rpc(&self.wallet_url, "wallet_addInvokeTransaction", params)
            .await?;
        tracing::info!(
            entry_point,
            contract = %contract,
            tx_hash = %result.transaction_hash,
            "Invocation broadcast"
        );
        Ok(result.transaction_hash)
    }
}

fn rpc_error(method: &str, error: RpcError) -> LedgerError {
    if error.code == WALLET_USER_REFUSED {
        tracing::warn!(method, "Wallet refused the invocation: {}", error.message);
        return LedgerError::Declined(error.message);
    }
    if error.code != TXN_HASH_NOT_FOUND {
        tracing::error!(
            method,
            "RPC error (code {}): {} {:?}",
            error.code,
            error.message,
            error.data
        );
    }
    LedgerError::Rpc {
        code: error.code,
        message: error.message,
    }
}

#[async_trait]
impl Ledger for StarknetLedger {
    async fn mint_price(&self, token_type_id: Amount) -> Result<Amount, LedgerError> {
        let mut calldata = Vec::with_capacity(2);
        push_uint256(&mut calldata, token_type_id);
        self.call_uint256(self.contracts.purchase_contract, "mint_price", calldata)
            .await
    }

    async fn allowance(&self, owner: Address, spender: Address) -> Result<Amount, LedgerError> {
        self.call_uint256(self.contracts.payment_token, "allowance", vec![owner, spender])
            .await
    }

    async fn approve(&self, spender: Address, amount: Amount) -> Result<TxHash, LedgerError> {
        let mut calldata = vec![spender];
        push_uint256(&mut calldata, amount);
        self.invoke(self.contracts.payment_token, "approve", calldata)
            .await
    }

    async fn mint(
        &self,
        recipient: Address,
        token_type_id: Amount,
        quantity: Amount,
        data: Vec<Felt>,
    ) -> Result<TxHash, LedgerError> {
        let mut calldata = Vec::with_capacity(6 + data.len());
        calldata.push(recipient);
        push_uint256(&mut calldata, token_type_id);
        push_uint256(&mut calldata, quantity);
        calldata.push(Felt::from(data.len() as u128));
        calldata.extend(data);
        self.invoke(self.contracts.purchase_contract, "mint", calldata)
            .await
    }

    async fn wait_for_acceptance(&self, tx_hash: TxHash) -> Result<(), LedgerError> {
        let deadline = Instant::now() + self.confirmation_timeout;
        loop {
            let receipt: Result<TransactionReceipt, _> = self
                .rpc(
                    &self.rpc_url,
                    "starknet_getTransactionReceipt",
                    serde_json::json!({ "transaction_hash": tx_hash }),
                )
                .await;

            match receipt {
                Ok(receipt) => match receipt.status() {
                    ReceiptStatus::Accepted => {
                        tracing::info!(tx_hash = %tx_hash, "Transaction accepted");
                        return Ok(());
                    }
                    ReceiptStatus::Reverted(reason) => {
                        return Err(LedgerError::Reverted { tx_hash, reason });
                    }
                    ReceiptStatus::Pending => {
                        tracing::debug!(tx_hash = %tx_hash, "Transaction pending");
                    }
                },
                Err(LedgerError::Rpc {
                    code: TXN_HASH_NOT_FOUND,
                    ..
                }) => {
                    tracing::debug!(tx_hash = %tx_hash, "Transaction not yet visible");
                }
                Err(e) => return Err(e),
            }

            if Instant::now() + self.poll_interval > deadline {
                return Err(LedgerError::ConfirmationTimeout(tx_hash));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn token_supply(&self, token_type_id: Amount) -> Result<TokenSupply, LedgerError> {
        let mut id = Vec::with_capacity(2);
        push_uint256(&mut id, token_type_id);
        let contract = self.contracts.purchase_contract;
        Ok(TokenSupply {
            max_price: self
                .call_uint256(contract, "token_max_price", id.clone())
                .await?,
            max_supply: self
                .call_uint256(contract, "token_max_supply", id.clone())
                .await?,
            supply: self.call_uint256(contract, "token_supply", id).await?,
        })
    }
}
