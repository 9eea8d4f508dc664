// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Loyalty Ledger Node
//!
//! Entry point for the `loyalty-node` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the ledger store, and serves the
//! HTTP/WS API.
//!
//! The binary supports four subcommands:
//!
//! - `run`    : start the node
//! - `init`   : create the data directory and record the ledger admin
//! - `status` : query a running node's status endpoint
//! - `version`: print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use loyalty_chaincode::{Chaincode, CommonNameResolver, Settings};
use loyalty_ledger::config::{EVENT_CHANNEL_CAPACITY, LEDGER_VERSION, STORAGE_FORMAT_VERSION};
use loyalty_ledger::storage::{Backend, LedgerDb, MemoryBackend};

use cli::{Commands, LoyaltyNodeCli};
use logging::LogFormat;
use metrics::LedgerMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = LoyaltyNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Opens the sled database under `data_dir`, creating the directory first.
fn open_database(data_dir: &Path, flush_on_commit: bool) -> Result<Arc<LedgerDb>> {
    let db_path = data_dir.join("ledger");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;

    let db = LedgerDb::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?
        .with_flush_on_commit(flush_on_commit);
    tracing::info!(path = %db_path.display(), flush_on_commit, "database opened");
    Ok(Arc::new(db))
}

/// Starts the node: API server and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::SERVE_DIRECTIVES, args.log_format);

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        in_memory = args.in_memory,
        data_dir = %args.data_dir.display(),
        "starting loyalty-node"
    );

    // --- Storage ---
    let (backend, db): (Arc<dyn Backend>, Option<Arc<LedgerDb>>) = if args.in_memory {
        tracing::warn!("running with an in-memory ledger; state is lost on exit");
        let memory: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        (memory, None)
    } else {
        let db = open_database(&args.data_dir, args.flush_on_commit)?;
        let backend: Arc<dyn Backend> = db.clone();
        (backend, Some(db))
    };

    // --- Chaincode ---
    let chaincode = Chaincode::new(backend, Arc::new(CommonNameResolver));
    match (chaincode.settings()?, args.admin) {
        (Some(settings), Some(admin)) if settings.admin != admin => {
            tracing::warn!(
                recorded = %settings.admin,
                requested = %admin,
                "ledger already initialized; ignoring --admin"
            );
        }
        (Some(settings), _) => {
            tracing::info!(admin = %settings.admin, "ledger settings loaded");
        }
        (None, Some(admin)) => {
            chaincode
                .init(&Settings::new(admin))
                .context("failed to initialize ledger settings")?;
        }
        (None, None) => {
            tracing::warn!("ledger not initialized; createActors and auditLedger will be refused");
        }
    }

    // --- Metrics ---
    let ledger_metrics = Arc::new(LedgerMetrics::new().context("failed to register metrics")?);
    ledger_metrics
        .ledger_entries
        .set(chaincode.backend().entry_count() as i64);

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    // --- Application state ---
    let app_state = api::AppState {
        version: format!("{} (ledger {})", env!("CARGO_PKG_VERSION"), LEDGER_VERSION),
        chaincode,
        event_tx,
        metrics: Arc::clone(&ledger_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&ledger_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    if let Some(db) = db {
        db.flush().context("failed to flush database on shutdown")?;
        tracing::info!(commits = db.commit_count().unwrap_or_default(), "database flushed");
    }

    tracing::info!("loyalty-node stopped");
    Ok(())
}

/// Creates the data directory and records the admin subject.
///
/// Re-running `init` on an existing directory replaces the admin; ledger
/// contents are left alone.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging(logging::ADMIN_DIRECTIVES, LogFormat::Pretty);

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), admin = %args.admin, "initializing node");

    let db = open_database(data_dir, true)?;
    let chaincode = Chaincode::new(db.clone(), Arc::new(CommonNameResolver));
    chaincode
        .init(&Settings::new(args.admin.clone()))
        .context("failed to record ledger settings")?;
    db.flush().context("failed to flush database")?;

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Admin          : {}", args.admin);
    println!("  Entries        : {}", chaincode.backend().entry_count());

    Ok(())
}

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.rpc_url.trim_end_matches('/'));
    let body = http_get(&url).await?;
    println!("{}", body);
    Ok(())
}

/// Plain HTTP/1.1 GET over a tokio TCP stream. Only used by `status`.
async fn http_get(url: &str) -> Result<String> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let endpoint: endpoint::Endpoint = url
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid URL: {}", e))?;

    let addr = format!("{}:{}", endpoint.host, endpoint.port);
    let mut stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        endpoint.path, endpoint.host,
    );
    stream.write_all(request.as_bytes()).await?;
    stream.shutdown().await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);

    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_else(|| response.to_string());

    Ok(body)
}

/// Prints version information to stdout.
fn print_version() {
    println!("loyalty-node   {}", env!("CARGO_PKG_VERSION"));
    println!("ledger         {}", LEDGER_VERSION);
    println!("storage format {}", STORAGE_FORMAT_VERSION);
    println!("rustc          {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Host, port, and path of an `http://` URL.
mod endpoint {
    #[derive(Debug, PartialEq, Eq)]
    pub struct Endpoint {
        pub host: String,
        pub port: u16,
        pub path: String,
    }

    impl std::str::FromStr for Endpoint {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            if s.starts_with("https://") {
                return Err("https is not supported".into());
            }
            let rest = s.strip_prefix("http://").unwrap_or(s);

            let (authority, path) = match rest.find('/') {
                Some(i) => (&rest[..i], &rest[i..]),
                None => (rest, "/"),
            };
            if authority.is_empty() {
                return Err("missing host".into());
            }

            let (host, port) = match authority.rsplit_once(':') {
                Some((host, port)) => {
                    let port = port.parse::<u16>().map_err(|e| format!("bad port: {}", e))?;
                    (host.to_string(), port)
                }
                None => (authority.to_string(), 80),
            };

            Ok(Endpoint {
                host,
                port,
                path: path.to_string(),
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn parses_host_port_and_path() {
            let e: Endpoint = "http://127.0.0.1:8710/status".parse().unwrap();
            assert_eq!(e.host, "127.0.0.1");
            assert_eq!(e.port, 8710);
            assert_eq!(e.path, "/status");
        }

        #[test]
        fn defaults_port_and_path() {
            let e: Endpoint = "localhost".parse().unwrap();
            assert_eq!(e.port, 80);
            assert_eq!(e.path, "/");
        }

        #[test]
        fn rejects_https_and_bad_ports() {
            assert!("https://node:8710/status".parse::<Endpoint>().is_err());
            assert!("http://node:http/status".parse::<Endpoint>().is_err());
        }
    }
}
