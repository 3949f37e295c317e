mod bounded;
mod config;
mod model;
mod oracle;
mod wallet;
mod web;

use std::sync::Arc;
use std::time::Duration;

use actix_files as fs;
use actix_web::{middleware::Logger, web::Data, App, HttpServer};
use anyhow::Context as _;
use dotenv::dotenv;
use log::{error, info, warn};
use tera::Tera;

use bounded::run_bounded;
use config::Config;
use model::selection::{select_model, MODEL_PRIORITY};
use model::OpenGradientClient;
use oracle::Oracle;
use wallet::approval::ensure_approval;
use wallet::{format_units, parse_address, Erc20Token, HttpJsonRpc, Wallet};
use web::routes;

// App state structure
struct AppState {
    tera: Tera,
    oracle: Oracle,
    balances: Erc20Token,
    wallet: Wallet,
}

async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let wallet = Wallet::from_private_key(&config.private_key)
        .context("OG_PRIVATE_KEY is not a usable wallet key")?;
    let rpc = Arc::new(HttpJsonRpc::new(config.rpc_url.clone(), config.rpc_timeout));
    let balances = Erc20Token::new(rpc, &config.token_address, config.rpc_timeout)
        .context("OPG_TOKEN_ADDRESS is not a valid address")?;

    info!("Wallet         : {}", wallet.checksummed());
    info!("OPG balance    : {}", balances.balance(wallet.address()).await);

    ensure_payment_approval(config, &balances, &wallet).await;

    // Pick the model once; every request afterwards uses this selection
    let backend = Arc::new(OpenGradientClient::new(config.llm_server_url.clone()));
    let selection = select_model(
        backend.as_ref(),
        &MODEL_PRIORITY,
        config.settlement,
        config.call_timeout,
    )
    .await;
    info!("Active model   : {}", selection.label);
    if selection.fallback {
        warn!("Serving with {} although it never answered", selection.model);
    }

    let mut tera = Tera::new(&format!("{}/**/*", config.templates_dir))
        .context("Template parsing error")?;
    tera.autoescape_on(vec![".html"]);

    Ok(AppState {
        tera,
        oracle: Oracle::new(backend, selection, config.settlement, config.call_timeout),
        balances,
        wallet,
    })
}

// Lets Permit2 spend OPG for inference payments. Never fatal: the server still
// starts and payments fail upstream if the allowance stays short.
async fn ensure_payment_approval(config: &Config, token: &Erc20Token, wallet: &Wallet) {
    let spender = match parse_address(&config.permit2_address) {
        Ok(spender) => spender,
        Err(e) => {
            warn!("Permit2 approval skipped: {}", e);
            return;
        }
    };

    let approval = ensure_approval(
        token,
        wallet,
        spender,
        &config.approval_amount,
        Duration::from_secs(2),
    );
    match run_bounded(config.call_timeout, approval).await {
        Ok(outcome) => {
            let shown = |raw| {
                format_units(raw, outcome.decimals)
                    .map(|amount| amount.to_string())
                    .unwrap_or_else(|_| raw.to_string())
            };
            info!("Permit2 before : {} OPG", shown(outcome.allowance_before));
            info!("Permit2 after  : {} OPG", shown(outcome.allowance_after));
            info!(
                "Permit2 tx     : {}",
                outcome.tx_hash.as_deref().unwrap_or("none (already approved)")
            );
        }
        Err(e) => warn!("Permit2 approval failed: {}", e),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting Akinator oracle");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let app_state = match build_state(&config).await {
        Ok(state) => Data::new(state),
        Err(e) => {
            error!("Startup failed: {:#}", e);
            std::process::exit(1);
        }
    };

    info!("Open: http://localhost:{}", config.port);

    let static_dir = config.static_dir.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(routes::cors_headers())
            .app_data(app_state.clone())
            .configure(routes::configure)
            .service(fs::Files::new("/static", static_dir.clone()))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
