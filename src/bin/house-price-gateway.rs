use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use house_price_gateway::config::{DatabaseTarget, ServiceConfig};
use house_price_gateway::telemetry::{TelemetryOptions, init_tracing};
use house_price_gateway::{
    AuditStore, GatewayHttpState, HttpInferenceBackend, PredictionService, SqliteStore,
};

const SERVICE_NAME: &str = "house-price-gateway";

#[derive(Debug, Parser)]
#[command(name = "house-price-gateway", version, about)]
struct Cli {
    /// JSON or TOML (YAML with `config-yaml`) config file.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, alias = "addr")]
    listen: Option<String>,
    /// Tensor-serving inference URL.
    #[arg(long)]
    prediction_endpoint: Option<String>,
    /// `sqlite://PATH`, a bare SQLite path, or `postgres://...`.
    #[arg(long)]
    database_url: Option<String>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[arg(long)]
    json_logs: bool,
    #[arg(long)]
    otel: bool,
    #[arg(long)]
    otel_endpoint: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut ServiceConfig) {
        if let Some(listen) = &self.listen {
            config.listen = listen.clone();
        }
        if let Some(endpoint) = &self.prediction_endpoint {
            config.prediction_endpoint = endpoint.clone();
        }
        if let Some(url) = &self.database_url {
            config.database_url = url.clone();
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config.timeout_secs = timeout_secs;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let _telemetry = init_tracing(
        SERVICE_NAME,
        &TelemetryOptions {
            json_logs: cli.json_logs,
            otel: cli.otel || cli.otel_endpoint.is_some(),
            otel_endpoint: cli.otel_endpoint.clone(),
        },
    )?;

    let mut config = match cli.config.as_ref() {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::default(),
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    cli.apply(&mut config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.listen,
        prediction_endpoint = %config.prediction_endpoint,
        "starting house price gateway"
    );

    let store: Arc<dyn AuditStore> = match config.database()? {
        DatabaseTarget::Sqlite(path) => {
            let store = SqliteStore::new(path);
            store.init().await?;
            tracing::info!(path = %store.path().display(), "using sqlite prediction log");
            Arc::new(store)
        }
        #[cfg(feature = "store-postgres")]
        DatabaseTarget::Postgres(url) => {
            let store = house_price_gateway::PostgresStore::connect(&url).await?;
            store.init().await?;
            tracing::info!("using postgres prediction log");
            Arc::new(store)
        }
        #[cfg(not(feature = "store-postgres"))]
        DatabaseTarget::Postgres(_) => {
            return Err("postgres store requires `--features store-postgres`".into());
        }
    };

    let backend = HttpInferenceBackend::with_timeout(&config.prediction_endpoint, config.timeout())?;
    let service = PredictionService::new(store, Arc::new(backend));
    let app = house_price_gateway::router(GatewayHttpState::new(service));

    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    tracing::info!(listen = %config.listen, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
