use mintdesk_core::allowance::AllowanceGuard;
use mintdesk_core::amount::Amount;
use mintdesk_core::api::{self, AppState};
use mintdesk_core::config::{load_config, AppConfig};
use mintdesk_core::ledger::{Ledger, StarknetLedger};
use mintdesk_core::orchestrator::PurchaseOrchestrator;
use mintdesk_core::price::PriceOracle;
use std::env;
use std::error::Error;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn build_orchestrator(config: &AppConfig) -> Result<PurchaseOrchestrator, Box<dyn Error>> {
    let contracts = config.contracts()?;
    let codec = config.codec()?;
    let ledger: Arc<dyn Ledger> = Arc::new(
        StarknetLedger::new(config.rpc_url()?, config.wallet_url.clone(), contracts)
            .with_timeouts(
                config.request_timeout(),
                config.confirmation_poll(),
                config.confirmation_timeout(),
            ),
    );

    let allowances = AllowanceGuard::new(ledger.clone(), config.approval_policy)
        .with_max_amount(codec.max_amount());
    let prices = Arc::new(PriceOracle::new(ledger.clone(), codec));

    Ok(PurchaseOrchestrator::new(
        ledger,
        prices,
        allowances,
        contracts.purchase_contract,
    ))
}

async fn run_quote(orchestrator: &PurchaseOrchestrator, id: &str) -> Result<(), Box<dyn Error>> {
    let prices = orchestrator.prices();
    let token_type_id: Amount = prices.codec().parse_amount(id)?;
    let quote = prices.quote(token_type_id).await?;

    tracing::info!(
        token_type_id = %quote.token_type_id,
        price = %quote.price,
        "Quote fetched"
    );
    println!("token type {}: {}", quote.token_type_id, quote.display);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // -------------------------------
    // Load configuration
    // -------------------------------
    let config = load_config()?;

    // -------------------------------
    // Initialize Tracing / Logging
    // -------------------------------
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.rust_log));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Mintdesk starting with config: {:?}", config);

    let preset = config.network_preset()?;
    tracing::info!(network = %preset.name, chain_id = %preset.chain_id, "Network selected");

    let orchestrator = Arc::new(build_orchestrator(&config)?);

    // -------------------------------
    // CLI Argument Handling (Quote)
    // -------------------------------
    let args: Vec<String> = env::args().collect();

    if args.len() > 1 && args[1] == "quote" {
        let Some(id) = args.get(2) else {
            tracing::error!("Usage: mintdesk-core quote <token_type_id>");
            return Ok(());
        };
        if let Err(e) = run_quote(&orchestrator, id).await {
            tracing::error!("Quote failed: {}", e);
        }
        return Ok(());
    }

    // -------------------------------
    // Web Server Setup
    // -------------------------------
    tracing::info!(
        purchase_contract = %orchestrator.purchase_contract(),
        policy = ?orchestrator.allowances().policy(),
        "Starting Mintdesk API Server..."
    );

    let app = api::router(Arc::new(AppState { orchestrator }));

    // -------------------------------
    // Run Server
    // -------------------------------
    let bind_addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!("Server listening on http://{}", local_addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", local_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
