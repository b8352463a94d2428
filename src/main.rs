//! Numwatch bulk phone-number validation engine
//!
//! Pipeline overview:
//! - HTTP API for bulk job creation, progress polling, and quick checks
//! - Redis Streams fan-out with consumer groups per platform pool
//! - WhatsApp two-stage checker and Telegram account-pool checker
//! - Postgres record of truth with a progress aggregator and
//!   completion sweep
//! - CSV exports to object storage with signed download links

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};

use numwatch_api::{router, AppState};
use numwatch_store::{PgClient, PgStore, PostgresConfig};
use numwatch_stream::{Producer, RedisCache, RedisClient, RedisConfig};
use numwatch_worker::{
    BridgeSession, S3Exporter, TelegramChecker, WhatsAppChecker, WorkerConfig, WorkerScheduler,
};
use telemetry::{health, init_tracing_from_env};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    #[serde(default)]
    redis: RedisConfig,

    #[serde(default)]
    postgres: PostgresConfig,

    #[serde(default)]
    worker: WorkerConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            redis: RedisConfig::default(),
            postgres: PostgresConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    init_tracing_from_env();

    info!("Starting numwatch engine v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;

    // Connect the stream and the store
    let redis = RedisClient::connect(config.redis.clone())
        .await
        .context("Failed to connect to Redis")?;

    let pg = PgClient::connect(config.postgres.clone())
        .await
        .context("Failed to connect to Postgres")?;
    pg.ensure_schema()
        .await
        .context("Failed to ensure Postgres schema")?;

    check_health(&redis, &pg).await;

    let store: Arc<dyn numwatch_core::JobStore> = Arc::new(PgStore::new(pg.clone()));
    let cache: Arc<dyn numwatch_core::ResultCache> = Arc::new(RedisCache::new(redis.clone()));
    let publisher: Arc<dyn numwatch_core::ItemPublisher> =
        Arc::new(Producer::new(redis.clone()));

    // Checkers
    let wa_checker = Arc::new(WhatsAppChecker::new(config.worker.whatsapp.clone()));
    let session = Arc::new(BridgeSession::new(&config.worker.telegram));
    let tg_checker = Arc::new(
        TelegramChecker::load(session, store.clone(), config.worker.telegram.clone())
            .await
            .context("Failed to load Telegram account pool")?,
    );

    // Export sink
    let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let s3 = aws_sdk_s3::Client::new(&aws);
    let sink: Arc<dyn numwatch_core::ExportSink> =
        Arc::new(S3Exporter::new(s3, config.worker.export.clone()));
    health().export_sink.set_healthy();

    // Background workers
    let scheduler = Arc::new(WorkerScheduler::new(
        redis.clone(),
        store.clone(),
        cache.clone(),
        publisher.clone(),
        wa_checker.clone(),
        tg_checker.clone(),
        sink,
        config.worker.clone(),
    ));
    let worker_handles = scheduler.start();

    // HTTP server
    let state = AppState::new(store, cache, publisher, wa_checker, tg_checker);
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down...");
    scheduler.stop();
    for handle in worker_handles {
        if let Err(e) = handle.await {
            error!("Worker task join error: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("NUMWATCH")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Manual overrides for nested config from environment; the config
    // crate's nested parsing doesn't work reliably with underscored
    // field names
    if let Ok(url) = std::env::var("NUMWATCH_REDIS_URL") {
        config.redis.url = url;
    }
    if let Ok(url) = std::env::var("NUMWATCH_POSTGRES_URL") {
        config.postgres.url = url;
    }
    if let Ok(url) = std::env::var("NUMWATCH_WA_PROVIDER_URL") {
        config.worker.whatsapp.provider_url = url;
    }
    if let Ok(key) = std::env::var("NUMWATCH_WA_PROVIDER_KEY") {
        config.worker.whatsapp.provider_key = key;
    }
    if let Ok(url) = std::env::var("NUMWATCH_TG_BRIDGE_URL") {
        config.worker.telegram.bridge_url = url;
    }
    if let Ok(bucket) = std::env::var("NUMWATCH_EXPORT_BUCKET") {
        config.worker.export.bucket = bucket;
    }
    if let Ok(url) = std::env::var("NUMWATCH_EXPORT_PUBLIC_BASE_URL") {
        config.worker.export.public_base_url = url;
    }
    if let Ok(secret) = std::env::var("NUMWATCH_EXPORT_SIGNING_SECRET") {
        config.worker.export.signing_secret = secret;
    }

    Ok(config)
}

/// Check component health on startup.
async fn check_health(redis: &RedisClient, pg: &PgClient) {
    if numwatch_stream::health::check(redis).await.is_ok() {
        info!("Redis connection: healthy");
    } else {
        error!("Redis connection: unhealthy");
    }

    if numwatch_store::health::check(pg).await.is_ok() {
        info!("Postgres connection: healthy");
    } else {
        error!("Postgres connection: unhealthy");
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .unwrap_or_else(|e| error!("Failed to install Ctrl+C handler: {}", e));
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
