use careerlens::application::inference::InferenceEngine;
use careerlens::application::query_log::QueryLog;
use careerlens::application::reconciler::PaymentReconciler;
use careerlens::application::service::{PremiumService, ServiceSettings};
use careerlens::config::AppConfig;
use careerlens::domain::payment::Currency;
use careerlens::domain::ports::{PaymentStoreBox, QueryStoreBox};
use careerlens::infrastructure::completion::CompletionModelLoader;
use careerlens::infrastructure::in_memory::{InMemoryPaymentStore, InMemoryQueryStore};
use careerlens::infrastructure::intasend::IntaSendGateway;
use careerlens::infrastructure::mysql::MySqlStore;
use careerlens::interfaces::http;
use careerlens::logging::LoggingConfig;
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    config: AppConfig,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Print the health report as JSON and exit
    Check,
}

async fn build_service(config: &AppConfig) -> Result<PremiumService> {
    let price = config.premium_amount().into_diagnostic()?;

    let (query_store, payment_store): (QueryStoreBox, PaymentStoreBox) =
        match MySqlStore::from_config(&config.database) {
            Some(store) => {
                if let Err(e) = store.ensure_schema().await {
                    error!(error = %e, "Could not prepare database schema");
                }
                (Box::new(store.clone()), Box::new(store))
            }
            None => {
                warn!("Database not configured. Falling back to in-memory storage.");
                (
                    Box::new(InMemoryQueryStore::new()),
                    Box::new(InMemoryPaymentStore::new()),
                )
            }
        };

    let gateway = IntaSendGateway::new(&config.gateway).into_diagnostic()?;
    let loader = CompletionModelLoader::new(&config.model);
    let currency = Currency::default();

    Ok(PremiumService::new(
        InferenceEngine::with_timeout(Box::new(loader), config.model.generation_timeout()),
        QueryLog::new(query_store),
        Box::new(gateway),
        PaymentReconciler::new(payment_store, price, currency),
        ServiceSettings {
            price,
            currency,
            database_configured: config.database.is_configured(),
            webhook_challenge: config.gateway.webhook_challenge.clone(),
        },
    ))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn serve(config: &AppConfig, service: PremiumService) -> Result<()> {
    let address = config.listen_address();
    let listener = TcpListener::bind(&address).await.into_diagnostic()?;
    info!(address = %address, "CareerLens listening");

    axum::serve(listener, http::router(Arc::new(service)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    LoggingConfig::from_env().init().into_diagnostic()?;

    let service = build_service(&cli.config).await?;
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&cli.config, service).await,
        Command::Check => {
            let report = serde_json::to_string(&service.health()).into_diagnostic()?;
            println!("{report}");
            Ok(())
        }
    }
}
