//! SimplTrust backend server
//!
//! Serves the compliance-management HTTP API: health checks, organization
//! and address CRUD, and the audit log listing. Database maintenance lives
//! in the companion binaries (apply-migrations, enhance-security, fix-dates,
//! fix-permissions, db-connect).

use std::env;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use config::LogFormat;
use simpltrust::{api, config, db, middleware, AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    // Check for --help flag
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return Ok(());
    }

    // Check for --version flag
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        println!("SimplTrust backend {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Load configuration first (before logging, so we know log format)
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize logging based on configuration
    init_logging(&config);

    info!("SimplTrust backend starting up");
    info!("Configuration loaded successfully");

    // Build the pool lazily so the server (and its health endpoints) come up
    // even when the database is not reachable yet
    info!("Initializing database connection pool");
    let db = db::init_pool_lazy(&config.database).context("Failed to initialize database")?;

    // Probe the installed database functions once; repositories pick their
    // strategy (function call vs direct SQL) from the result
    info!("Probing database function availability");
    let functions = db::capabilities::ServerFunctions::probe_or_empty(&db).await;

    // Create application state
    let state = AppState {
        config: config.clone(),
        db,
        functions,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address configuration")?;

    info!("Starting HTTP server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!("HTTP server is ready to accept connections");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("HTTP server error")?;

    Ok(())
}

/// Initialize console logging from the configured level and format
fn init_logging(config: &AppConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.logging.format {
        LogFormat::Json => {
            subscriber
                .with(fmt::layer().json().with_target(true))
                .init();
        }
        LogFormat::Compact => {
            subscriber
                .with(fmt::layer().compact().with_target(false))
                .init();
        }
        LogFormat::Pretty => {
            subscriber
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false),
                )
                .init();
        }
    }
}

/// Create the application router with all routes and middleware
fn create_router(state: AppState) -> Router {
    // CORS is wide open; the frontend is served from a different origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Configure tracing for HTTP requests
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Authentication must not be applied globally, otherwise the health
    // endpoints become unusable for unauthenticated monitors. Public routes
    // stay open; auth middleware wraps only the protected set.
    Router::new()
        .nest("/api/v1", api::public_routes())
        .nest(
            "/api/v1",
            api::protected_routes().layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::auth::auth_middleware,
            )),
        )
        .with_state(state)
        .layer(trace_layer)
        .layer(cors)
}

/// Print help message
fn print_help() {
    println!(
        r#"SimplTrust backend {}

USAGE:
    simpltrust [OPTIONS]

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information

ENVIRONMENT:
    SIMPLTRUST_CONFIG   Path to configuration file (default: config.yaml)
    DATABASE_URL        PostgreSQL connection string
    JWT_SECRET          Secret used to verify provider-issued tokens
                        (SUPABASE_JWT_SECRET is accepted as an alias)

CONFIGURATION:
    The application looks for configuration files in the following order:
    1. Path specified by SIMPLTRUST_CONFIG environment variable
    2. ./config.yaml
    3. ./config/config.yaml
    4. /etc/simpltrust/config.yaml

For more information, see: https://github.com/simpltrust/simpltrust"#,
        env!("CARGO_PKG_VERSION")
    );
}
