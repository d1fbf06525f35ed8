//! `billing-core`: the framing layer that wires the billing core's services
//! into an HTTP server (spec §1 "out of scope: HTTP framing... treated as
//! external collaborators, interfaces only" -- this binary *is* that
//! collaborator).
//!
//! Two subcommands (spec §2b "config self-check", §6 exit codes):
//!
//! - `serve` binds the HTTP server and runs until a shutdown signal.
//! - `check-config` validates the environment and exits without binding
//!   anything, so deploy tooling can catch a bad config before a rollout.

mod auth;
mod handlers;
mod router;
mod state;

use std::process::ExitCode;
use std::sync::Arc;

use billing_common::config::Config;
use billing_common::metrics::NoopMetrics;
use billing_common::shutdown::ShutdownChannel;
use billing_credentials::CredentialService;
use billing_credentials::CredentialStore;
use billing_ledger::{BalanceService, LedgerStore};
use billing_notify::{LoggingSink, NotificationHook};
use billing_providers::{CardProvider, ProviderRegistry, WalletProvider};
use billing_usage::UsageTracker;
use clap::{Parser, Subcommand};
use state::AppState;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "billing-core", version, about = "Usage-metered prepaid billing core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bind the HTTP server and serve traffic until shutdown.
    Serve,
    /// Validate the process environment and exit without binding a socket.
    CheckConfig,
}

/// Process exit codes (spec §6): 0 success, 1 configuration error, 2
/// connectivity failure.
#[repr(u8)]
enum Exit {
    Success = 0,
    ConfigError = 1,
    ConnectivityError = 2,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();

    let config = match Config::from_env().and_then(|c| {
        c.validate()?;
        Ok(c)
    }) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            return ExitCode::from(Exit::ConfigError as u8);
        }
    };

    match cli.command {
        Command::CheckConfig => {
            tracing::info!("configuration OK");
            ExitCode::from(Exit::Success as u8)
        }
        Command::Serve => {
            let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!(error = %e, "failed to start async runtime");
                    return ExitCode::from(Exit::ConnectivityError as u8);
                }
            };
            runtime.block_on(serve(config))
        }
    }
}

async fn serve(config: Config) -> ExitCode {
    let ledger_store = match LedgerStore::connect(&config.ledger_url, config.ledger_pool_max_connections).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to ledger store");
            return ExitCode::from(Exit::ConnectivityError as u8);
        }
    };
    if let Err(e) = ledger_store.run_migrations().await {
        tracing::error!(error = %e, "failed to run ledger migrations");
        return ExitCode::from(Exit::ConnectivityError as u8);
    }

    let balance = BalanceService::new(ledger_store.clone());
    let usage = UsageTracker::new(ledger_store.clone(), balance.clone());
    let credentials = CredentialService::new(
        CredentialStore::from_pool(ledger_store.pool()),
        ledger_store.clone(),
        config.server_secret.clone(),
    );

    let card_api_base = match config.card.env.as_str() {
        "live" => "https://api.card-provider.example/v1".to_string(),
        _ => "https://api.sandbox.card-provider.example/v1".to_string(),
    };
    let card = Arc::new(CardProvider::new(card_api_base, config.card.api_key.clone(), config.card.webhook_secret.clone(), balance.clone()));
    let wallet = Arc::new(WalletProvider::new(config.wallet.bot_token.clone(), balance.clone()));
    let providers = ProviderRegistry::new(card, wallet);

    let notify = NotificationHook::new(LoggingSink);

    let state = Arc::new(AppState {
        config: config.clone(),
        ledger: ledger_store,
        balance,
        usage,
        credentials,
        providers,
        notify,
        metrics: Arc::new(NoopMetrics),
    });

    let app = router::build_router(state);

    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, addr = %config.bind_addr, "failed to bind listen socket");
            return ExitCode::from(Exit::ConnectivityError as u8);
        }
    };
    tracing::info!(addr = %config.bind_addr, "billing-core listening");

    let shutdown = ShutdownChannel::new();
    let shutdown_for_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received shutdown signal");
        shutdown_for_signal.send();
    });

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(async move { shutdown.recv().await });

    if let Err(e) = server.await {
        tracing::error!(error = %e, "server error");
        return ExitCode::from(Exit::ConnectivityError as u8);
    }
    ExitCode::from(Exit::Success as u8)
}
