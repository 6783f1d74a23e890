use open_speech::accounts::PgAccountStore;
use open_speech::config::AppConfig;
use open_speech::db;
use open_speech::handlers;
use open_speech::history::PgHistoryStore;
use open_speech::openai_client::OpenAiClient;
use open_speech::AppState;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize production-grade logging
    init_logging().expect("Failed to initialize logging");

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Configuration - chat timeout: {}s, provider timeout: {}s, speech input limit: {} chars, model: {}",
        config.chat_timeout.as_secs(),
        config.provider_timeout.as_secs(),
        config.speech_input_limit,
        config.openai.chat_model
    );

    // Create the database connection pool
    let db_pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool.");

    // One client serves transcription, completion and speech
    tracing::info!("Initializing OpenAI client at {}...", config.openai.base_url);
    let openai = Arc::new(OpenAiClient::new(config.openai.clone()));

    let bind_addr = config.bind_addr;
    let state = Arc::new(AppState::new(
        config,
        Arc::new(PgAccountStore::new(db_pool.clone())),
        Arc::new(PgHistoryStore::new(db_pool)),
        openai.clone(),
        openai.clone(),
        openai,
    ));
    let shutdown = state.shutdown.clone();

    let app = handlers::app(state);

    // Run the server with ConnectInfo to provide socket addresses for rate limiting
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("Failed to bind listener");
    tracing::info!("listening on {}", bind_addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .expect("Server error");

    tracing::info!("Server stopped");
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received, abandoning in-flight provider calls");
    shutdown.cancel();
}

// Production-grade logging configuration
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Get log level from environment or default to INFO for production
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,open_speech=trace,sqlx=info,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,open_speech=info,sqlx=warn,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        // JSON logging for log aggregation
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();

    tracing::info!("open-speech starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Build mode: {}", if cfg!(debug_assertions) { "development" } else { "production" });
    tracing::info!("Log level: {}", log_level);

    let db_configured = std::env::var("DATABASE_URL").is_ok();
    let openai_configured = std::env::var("OPENAI_API_KEY").is_ok();
    let jwt_configured = std::env::var("JWT_SECRET").is_ok();
    tracing::info!(
        "Environment - Database: {}, OpenAI: {}, JWT secret: {}",
        if db_configured { "set" } else { "missing" },
        if openai_configured { "set" } else { "missing" },
        if jwt_configured { "set" } else { "ephemeral" }
    );

    Ok(())
}
