// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Escrow Devnet Node
//!
//! Entry point for the `escrow-node` binary. Parses CLI arguments, sets up
//! logging and metrics, loads (or creates) the chain snapshot, produces
//! blocks on a timer, and serves the REST + JSON-RPC API.
//!
//! Subcommands:
//!
//! - `run`: start the node
//! - `init`: create the data directory and operator key
//! - `status`: query a running node's status endpoint
//! - `version`: print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod runtime;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use escrow_protocol::config::PROTOCOL_VERSION;
use escrow_protocol::crypto::Keypair;
use escrow_protocol::storage::StateStore;
use escrow_protocol::Address;

use cli::{Commands, EscrowNodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;
use runtime::{GenesisConfig, Runtime};

/// File in the data directory holding the operator's hex secret key.
const OPERATOR_KEY_FILE: &str = "operator.key";

/// Sled directory inside the data directory.
const STATE_DIR: &str = "state";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = EscrowNodeCli::parse();

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

/// Starts the node: block producer, API server and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_DIRECTIVES, LogFormat::from_str_lossy(&args.log_format));

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        custody = %args.custody,
        data_dir = %args.data_dir.display(),
        "starting escrow-node"
    );

    // --- Operator & storage ---
    let owner = match args.owner {
        Some(owner) => owner,
        None => load_or_create_operator(&args.data_dir)?.address(),
    };

    let state_path = args.data_dir.join(STATE_DIR);
    std::fs::create_dir_all(&state_path)
        .with_context(|| format!("failed to create state directory: {}", state_path.display()))?;
    let store = Arc::new(
        StateStore::open(&state_path)
            .with_context(|| format!("failed to open state store at {}", state_path.display()))?,
    );

    let runtime = Runtime::load_or_genesis(
        &store,
        &GenesisConfig {
            owner,
            custody: args.custody,
            timestamp: unix_now(),
        },
    )?;

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    node_metrics.observe(&runtime);

    let app_state = api::AppState {
        version: format!("{} (protocol {})", env!("CARGO_PKG_VERSION"), PROTOCOL_VERSION),
        network: "devnet".to_string(),
        runtime: Arc::new(RwLock::new(runtime)),
        store: Arc::clone(&store),
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state.clone());
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Block production ---
    let block_time = Duration::from_millis(args.block_time_ms.max(1));
    let block_loop = tokio::spawn(produce_blocks(app_state.clone(), block_time));

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

    block_loop.abort();
    {
        let runtime = app_state.runtime.read();
        app_state.persist(&runtime);
    }
    store.flush().context("failed to flush state store")?;
    tracing::info!("escrow-node stopped");
    Ok(())
}

/// Produces a block every `block_time`, stamped with wall-clock seconds.
/// Accrues pool interest, refreshes metrics, and saves the snapshot.
async fn produce_blocks(state: api::AppState, block_time: Duration) {
    let mut interval = tokio::time::interval(block_time);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval.tick().await;

    loop {
        interval.tick().await;
        let mut runtime = state.runtime.write();
        if let Err(e) = runtime.produce_block(unix_now()) {
            tracing::warn!(error = %e, "block production failed");
            continue;
        }
        state.metrics.blocks_produced_total.inc();
        state.metrics.observe(&runtime);
        state.persist(&runtime);
        tracing::debug!(
            height = runtime.chain.height(),
            timestamp = runtime.chain.timestamp(),
            "block produced"
        );
    }
}

fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// Reads the operator key from `data_dir`, generating one on first run.
fn load_or_create_operator(data_dir: &Path) -> Result<Keypair> {
    let key_path = data_dir.join(OPERATOR_KEY_FILE);
    if key_path.exists() {
        let hex_secret = std::fs::read_to_string(&key_path)
            .with_context(|| format!("failed to read operator key {}", key_path.display()))?;
        let keypair = Keypair::from_hex(hex_secret.trim())
            .with_context(|| format!("malformed operator key in {}", key_path.display()))?;
        tracing::info!(operator = %keypair.address(), "operator key loaded");
        return Ok(keypair);
    }

    let keypair = write_operator_key(data_dir)?;
    tracing::warn!(
        operator = %keypair.address(),
        key_path = %key_path.display(),
        "no operator key found; generated a new one"
    );
    Ok(keypair)
}

/// Generates an operator key and writes it with owner-only permissions.
fn write_operator_key(data_dir: &Path) -> Result<Keypair> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let keypair = Keypair::generate();
    let key_path = data_dir.join(OPERATOR_KEY_FILE);
    std::fs::write(&key_path, keypair.secret_key_hex())
        .with_context(|| format!("failed to write operator key to {}", key_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to restrict permissions on {}", key_path.display()))?;
    }
    Ok(keypair)
}

/// Creates the data directory and an operator key.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("escrow_node=info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    let key_path = data_dir.join(OPERATOR_KEY_FILE);
    if key_path.exists() && !args.force {
        anyhow::bail!(
            "operator key already exists at {} (use --force to replace it)",
            key_path.display()
        );
    }

    let keypair = write_operator_key(data_dir)?;
    let address: Address = keypair.address();
    tracing::info!(operator = %address, key_path = %key_path.display(), "operator key generated");

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Operator key   : {}", key_path.display());
    println!("  Operator       : {}", address);
    println!("  Public key     : {}", keypair.public_key());

    Ok(())
}

/// Fetches `/status` from a running node and prints the body.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let endpoint = Endpoint::parse(&args.rpc_url)?;
    let body = http_get(&endpoint, "/status").await?;
    println!("{}", body);
    Ok(())
}

/// `host:port` of a plain-HTTP node endpoint.
#[derive(Debug, PartialEq, Eq)]
struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    fn parse(url: &str) -> Result<Self> {
        let rest = url.strip_prefix("http://").unwrap_or(url);
        if rest.starts_with("https://") {
            anyhow::bail!("https endpoints are not supported: {}", url);
        }
        let authority = rest.split('/').next().unwrap_or_default();
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>()
                    .with_context(|| format!("bad port in {}", url))?,
            ),
            None => (authority, 80),
        };
        if host.is_empty() {
            anyhow::bail!("missing host in {}", url);
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

/// One HTTP/1.1 GET over a raw TCP stream; returns the response body.
async fn http_get(endpoint: &Endpoint, path: &str) -> Result<String> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let addr = format!("{}:{}", endpoint.host, endpoint.port);
    let mut stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, endpoint.host,
    );
    stream.write_all(request.as_bytes()).await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);

    let (head, body) = response
        .split_once("\r\n\r\n")
        .context("malformed HTTP response")?;
    if !head.starts_with("HTTP/1.1 200") && !head.starts_with("HTTP/1.0 200") {
        let status_line = head.lines().next().unwrap_or_default();
        anyhow::bail!("node answered {}", status_line);
    }
    Ok(body.to_string())
}

fn print_version() {
    println!("escrow-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", PROTOCOL_VERSION);
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM. Only Ctrl+C off Unix.
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
