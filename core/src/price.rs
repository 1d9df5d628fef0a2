use crate::amount::{Amount, AmountCodec};
use crate::errors::PurchaseError;
use crate::ledger::{Address, Ledger};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Point-in-time price of one unit of a token type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    pub token_type_id: Amount,
    pub price: Amount,
    /// `price` rendered in whole payment-token units.
    pub display: String,
}

/// Ledger-side view of a token type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTypeInfo {
    pub token_type_id: Amount,
    pub mint_price: Amount,
    pub max_price: Amount,
    pub max_supply: Amount,
    pub supply: Amount,
}

impl TokenTypeInfo {
    pub fn is_sold_out(&self) -> bool {
        self.supply >= self.max_supply
    }

    pub fn remaining(&self) -> Amount {
        self.max_supply.saturating_sub(self.supply)
    }
}

/// What the presentation layer needs to render the purchase action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseAvailability {
    pub display_price: Option<String>,
    pub enabled: bool,
}

impl PurchaseAvailability {
    /// The action is enabled only with a connected account and a resolved price.
    pub fn new(account: Option<&Address>, quote: Option<&PriceQuote>) -> Self {
        Self {
            display_price: quote.map(|q| q.display.clone()),
            enabled: account.is_some() && quote.is_some(),
        }
    }
}

/// Reads purchase prices from the ledger.
///
/// Nothing is cached: every call is a fresh read, and failures surface
/// immediately without retry.
pub struct PriceOracle {
    ledger: Arc<dyn Ledger>,
    codec: AmountCodec,
}

impl PriceOracle {
    pub fn new(ledger: Arc<dyn Ledger>, codec: AmountCodec) -> Self {
        Self { ledger, codec }
    }

    pub fn codec(&self) -> &AmountCodec {
        &self.codec
    }

    pub async fn fetch_mint_price(&self, token_type_id: Amount) -> Result<Amount, PurchaseError> {
        let price = self.ledger.mint_price(token_type_id).await?;
        tracing::debug!(token_type_id = %token_type_id, price = %price, "Fetched mint price");
        Ok(price)
    }

    pub async fn quote(&self, token_type_id: Amount) -> Result<PriceQuote, PurchaseError> {
        let price = self.fetch_mint_price(token_type_id).await?;
        Ok(PriceQuote {
            token_type_id,
            price,
            display: self.codec.to_decimal_string(price),
        })
    }

    pub async fn token_type_info(
        &self,
        token_type_id: Amount,
    ) -> Result<TokenTypeInfo, PurchaseError> {
        let mint_price = self.fetch_mint_price(token_type_id).await?;
        let supply = self.ledger.token_supply(token_type_id).await?;
        Ok(TokenTypeInfo {
            token_type_id,
            mint_price,
            max_price: supply.max_price,
            max_supply: supply.max_supply,
            supply: supply.supply,
        })
    }

    /// Fetch a quote on a background task.
    ///
    /// Resolves to `None` when `cancel` fires first; the in-flight read is
    /// dropped and its result discarded.
    pub fn spawn_quote(
        self: &Arc<Self>,
        token_type_id: Amount,
        cancel: CancellationToken,
    ) -> JoinHandle<Option<Result<PriceQuote, PurchaseError>>> {
        let oracle = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(token_type_id = %token_type_id, "Price fetch abandoned");
                    None
                }
                quote = oracle.quote(token_type_id) => Some(quote),
            }
        })
    }
}
