//! Twinroute -- rule-based LLM request router.
//!
//! Entry point. Wires together configuration, the database, the backend
//! registry, the audit logger, and the HTTP server, then serves until a
//! shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use axum::middleware;
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use twinroute::api;
use twinroute::audit::spawn_audit_logger;
use twinroute::auth::middleware::require_auth;
use twinroute::auth::users::bootstrap_admin;
use twinroute::backends::BackendRegistry;
use twinroute::config::Config;
use twinroute::db::Database;
use twinroute::routing::Executor;
use twinroute::AppState;

// ---------------------------------------------------------------------------
// CLI argument parsing (minimal, no clap dependency)
// ---------------------------------------------------------------------------

struct CliArgs {
    config_path: PathBuf,
}

fn parse_args() -> CliArgs {
    let mut args = std::env::args().skip(1);
    let mut config_path = PathBuf::from("twinroute.toml");

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                if let Some(path) = args.next() {
                    config_path = PathBuf::from(path);
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("twinroute {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                eprintln!("Run with --help for usage information.");
                std::process::exit(1);
            }
        }
    }

    CliArgs { config_path }
}

fn print_usage() {
    println!(
        "\
twinroute {version} -- rule-based LLM request router

USAGE:
    twinroute [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file [default: twinroute.toml]
    -h, --help             Print this help message
    -V, --version          Print version information

ENVIRONMENT:
    RUST_LOG               Override log level (e.g. RUST_LOG=debug)
    TWINROUTE_CONFIG       Alternative to --config flag
",
        version = env!("CARGO_PKG_VERSION")
    );
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Parse CLI arguments; TWINROUTE_CONFIG env var works as an alternative
    let cli = parse_args();
    let config_path = std::env::var("TWINROUTE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or(cli.config_path);

    // 2. Load configuration
    let config = Config::load(&config_path)?;

    // 3. Initialize tracing/logging
    init_tracing(&config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting twinroute"
    );

    // 4. Open database
    let db = Database::open(&config.database.path)?;
    tracing::info!(path = %config.database.path.display(), "Database opened");

    // 5. Bootstrap admin user (creates admin + prints API key on first run)
    match bootstrap_admin(&db, &config.auth.default_admin_name) {
        Ok(Some(result)) => {
            tracing::info!(admin = %result.user.name, "Admin user bootstrapped (first run)");
        }
        Ok(None) => {
            tracing::debug!("Admin bootstrap skipped (users already exist)");
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to bootstrap admin user");
            return Err(err.into());
        }
    }

    // 6. Build the three backend slots from config
    let registry = Arc::new(
        BackendRegistry::from_config(&config.backends)
            .map_err(|e| anyhow::anyhow!("Backend initialization failed: {e}"))?,
    );
    tracing::info!("Backend registry initialized (general, math, creative)");

    // 7. Audit channel + background batch writer
    let (audit_tx, audit_rx) = tokio::sync::mpsc::unbounded_channel();
    let _audit_handle = spawn_audit_logger(db.clone(), audit_rx);
    tracing::debug!("Audit logger spawned");

    // 8. Auth-disabled warning
    if !config.auth.enabled {
        tracing::warn!("Authentication is DISABLED -- all requests treated as admin");
    }

    // 9. Build shared application state
    let executor = Arc::new(Executor::new(registry.clone(), db.clone(), audit_tx));
    let state = AppState {
        config: Arc::new(config),
        db,
        registry,
        executor,
    };

    // 10. Build the router and serve
    let app = build_app(state.clone());
    let listen_addr = state.config.listen_addr();
    let listener = TcpListener::bind(&listen_addr).await?;
    tracing::info!(addr = %listen_addr, "Listening");

    println!();
    println!("  twinroute v{} is running", env!("CARGO_PKG_VERSION"));
    println!("  Route:  http://{listen_addr}/v1/route");
    println!("  Health: http://{listen_addr}/health");
    println!();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Dropping the state (and with it the audit sender) lets the audit
    // logger drain remaining entries and exit.
    tracing::info!("Shutting down gracefully");

    Ok(())
}

// ---------------------------------------------------------------------------
// Router assembly
// ---------------------------------------------------------------------------

/// Build the application router with all middleware layers.
fn build_app(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config);
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();
    let trace = TraceLayer::new_for_http();

    let api_routes =
        api::build_api_router().layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(api::build_public_router())
        .merge(api_routes)
        .layer(propagate_id)
        .layer(request_id)
        .layer(trace)
        .layer(cors)
        .with_state(state)
}

/// Build the CORS layer from config.
fn build_cors_layer(config: &Config) -> CorsLayer {
    if config.server.cors_origins.is_empty() {
        // Default: allow all origins for development convenience
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

// ---------------------------------------------------------------------------
// Tracing initialization
// ---------------------------------------------------------------------------

/// Set up the tracing subscriber based on configuration.
fn init_tracing(config: &Config) {
    // RUST_LOG env var takes precedence over config file
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.logging.level;
        EnvFilter::new(format!("twinroute={level},tower_http={level},warn"))
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

/// Wait for a shutdown signal (SIGTERM or SIGINT / Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}
