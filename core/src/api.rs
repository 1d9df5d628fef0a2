use crate::amount::{Amount, AmountError};
use crate::errors::{AppError, PurchaseError};
use crate::ledger::Address;
use crate::orchestrator::{PurchaseOrchestrator, PurchaseRequest, TransactionOutcome};
use crate::price::PurchaseAvailability;
use axum::{
    extract::{Json, Path, Query},
    http::StatusCode,
    routing::{get, post},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::{IntoParams, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

pub struct AppState {
    pub orchestrator: Arc<PurchaseOrchestrator>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PriceQuery {
    /// Connected account, if any.
    #[param(example = "0x49d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7")]
    account: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct PriceResponse {
    #[schema(example = "1")]
    token_type_id: String,
    #[schema(example = "3000000000000000000")]
    price: String,
    #[schema(example = "3")]
    display: String,
    purchase_enabled: bool,
}

#[derive(Serialize, ToSchema)]
pub struct TokenInfoResponse {
    token_type_id: String,
    mint_price: String,
    display_price: String,
    max_price: String,
    max_supply: String,
    supply: String,
    sold_out: bool,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AllowanceQuery {
    owner: String,
}

#[derive(Serialize, ToSchema)]
pub struct AllowanceResponse {
    owner: String,
    spender: String,
    allowance: String,
    display_allowance: String,
}

#[derive(Deserialize, ToSchema)]
pub struct PurchaseBody {
    #[schema(example = "0x49d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7")]
    buyer: String,
    /// Defaults to the buyer.
    #[serde(default)]
    recipient: Option<String>,
    #[schema(example = 1)]
    token_type_id: u64,
    /// Decimal integer, defaults to 1.
    #[serde(default)]
    #[schema(example = "1")]
    quantity: Option<String>,
}

fn parse_account(field: &str, value: &str) -> Result<Address, AppError> {
    value
        .parse()
        .map_err(|e| AppError::BadRequest(format!("Invalid {}: {}", field, e)))
}

#[utoipa::path(
    get,
    path = "/tokens/{id}/price",
    params(("id" = u64, Path, description = "Token type id"), PriceQuery),
    responses(
        (status = 200, description = "Current mint price", body = PriceResponse),
        (status = 502, description = "Ledger unreachable")
    ),
    tag = "Purchase"
)]
async fn token_price(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<u64>,
    Query(query): Query<PriceQuery>,
) -> Result<Json<PriceResponse>, AppError> {
    let account = query
        .account
        .as_deref()
        .map(|a| parse_account("account", a))
        .transpose()?;
    let quote = state.orchestrator.prices().quote(Amount::from(id)).await?;
    let availability = PurchaseAvailability::new(account.as_ref(), Some(&quote));

    Ok(Json(PriceResponse {
        token_type_id: quote.token_type_id.to_string(),
        price: quote.price.to_string(),
        display: quote.display,
        purchase_enabled: availability.enabled,
    }))
}

#[utoipa::path(
    get,
    path = "/tokens/{id}",
    params(("id" = u64, Path, description = "Token type id")),
    responses(
        (status = 200, description = "Token type details", body = TokenInfoResponse),
        (status = 502, description = "Ledger unreachable")
    ),
    tag = "Purchase"
)]
async fn token_info(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<TokenInfoResponse>, AppError> {
    let prices = state.orchestrator.prices();
    let info = prices.token_type_info(Amount::from(id)).await?;

    Ok(Json(TokenInfoResponse {
        token_type_id: info.token_type_id.to_string(),
        mint_price: info.mint_price.to_string(),
        display_price: prices.codec().to_decimal_string(info.mint_price),
        max_price: info.max_price.to_string(),
        max_supply: info.max_supply.to_string(),
        supply: info.supply.to_string(),
        sold_out: info.is_sold_out(),
    }))
}

#[utoipa::path(
    get,
    path = "/allowance",
    params(AllowanceQuery),
    responses(
        (status = 200, description = "Allowance held by the purchase contract",
            body = AllowanceResponse),
        (status = 400, description = "Malformed owner address")
    ),
    tag = "Purchase"
)]
async fn allowance(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<AllowanceQuery>,
) -> Result<Json<AllowanceResponse>, AppError> {
    let owner = parse_account("owner", &query.owner)?;
    let spender = state.orchestrator.purchase_contract();
    let current = state
        .orchestrator
        .allowances()
        .current_allowance(owner, spender)
        .await?;

    Ok(Json(AllowanceResponse {
        owner: owner.to_string(),
        spender: spender.to_string(),
        allowance: current.to_string(),
        display_allowance: state.orchestrator.prices().codec().to_decimal_string(current),
    }))
}

#[utoipa::path(
    post,
    path = "/purchase",
    request_body = PurchaseBody,
    responses(
        (status = 200, description = "Mint accepted by the ledger", body = TransactionOutcome),
        (status = 400, description = "Malformed address or quantity"),
        (status = 402, description = "Approval or mint rejected", body = TransactionOutcome),
        (status = 409, description = "Same buyer and token type already in flight",
            body = TransactionOutcome),
        (status = 502, description = "Ledger unreachable", body = TransactionOutcome)
    ),
    tag = "Purchase"
)]
async fn purchase(
    Extension(state): Extension<Arc<AppState>>,
    Json(body): Json<PurchaseBody>,
) -> Result<(StatusCode, Json<TransactionOutcome>), AppError> {
    let buyer = parse_account("buyer", &body.buyer)?;
    let mut request = PurchaseRequest::new(buyer, Amount::from(body.token_type_id));

    if let Some(recipient) = body.recipient.as_deref() {
        request = request.with_recipient(parse_account("recipient", recipient)?);
    }
    if let Some(quantity) = body.quantity.as_deref() {
        let quantity = state
            .orchestrator
            .prices()
            .codec()
            .parse_amount(quantity)
            .map_err(|e| match e {
                AmountError::Parse { .. } => AppError::BadRequest(e.to_string()),
                out_of_range => AppError::from(PurchaseError::from(out_of_range)),
            })?;
        if quantity.is_zero() {
            return Err(AppError::BadRequest("quantity must be at least 1".to_string()));
        }
        request = request.with_quantity(quantity);
    }

    tracing::info!(
        buyer = %request.buyer,
        token_type_id = %request.token_type_id,
        quantity = %request.quantity,
        "Purchase requested"
    );

    // Dropping this future (client gone) abandons the attempt and frees its slot.
    let outcome = state.orchestrator.purchase(request).await;
    let status = outcome
        .error_kind()
        .map(|kind| kind.status_code())
        .unwrap_or(StatusCode::OK);
    Ok((status, Json(outcome)))
}

async fn health_check() -> &'static str {
    "OK"
}

#[derive(OpenApi)]
#[openapi(
    paths(token_price, token_info, allowance, purchase),
    components(schemas(
        PriceResponse, TokenInfoResponse, AllowanceResponse, PurchaseBody,
        TransactionOutcome, crate::errors::ErrorKind
    )),
    tags(
        (name = "Purchase", description = "Token pricing and purchase orchestration")
    ),
    info(
        title = "Mintdesk API",
        version = "0.1.0",
        description = "Price lookup, allowance checks and mint orchestration"
    )
)]
pub struct ApiDoc;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health_check))
        .route("/tokens/:id", get(token_info))
        .route("/tokens/:id/price", get(token_price))
        .route("/allowance", get(allowance))
        .route("/purchase", post(purchase))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
