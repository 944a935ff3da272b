//! # CLI Interface
//!
//! Command-line arguments for `escrow-node`, built with `clap` derive.
//! Subcommands: `run`, `init`, `status` and `version`. Every `run` flag can
//! also come from an `ESCROW_*` environment variable.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use escrow_contracts::CustodyKind;
use escrow_protocol::config::{BLOCK_TIME_MS, DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT};
use escrow_protocol::Address;

/// Escrow devnet node.
///
/// Hosts one escrow contract on a local single-operator chain, produces a
/// block every few seconds, and serves a REST + JSON-RPC API that frontends
/// poll for escrow state.
#[derive(Parser, Debug)]
#[command(
    name = "escrow-node",
    about = "Escrow contract devnet node",
    version,
    propagate_version = true
)]
pub struct EscrowNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Create the data directory and an operator key.
    Init(InitArgs),
    /// Query a running node's status endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding the state snapshot and the operator key.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "ESCROW_DATA_DIR", default_value = "./escrow-data")]
    pub data_dir: PathBuf,

    /// Port for the REST and JSON-RPC API.
    #[arg(long, env = "ESCROW_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "ESCROW_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Where escrowed funds sit: `direct` (contract balance) or `yield`
    /// (supplied to the lending pool). Only read at genesis.
    #[arg(long, env = "ESCROW_CUSTODY", default_value = "direct")]
    pub custody: CustodyKind,

    /// Contract owner. Defaults to the operator key's address.
    #[arg(long, env = "ESCROW_OWNER")]
    pub owner: Option<Address>,

    /// Block interval in milliseconds.
    #[arg(long, env = "ESCROW_BLOCK_TIME_MS", default_value_t = BLOCK_TIME_MS)]
    pub block_time_ms: u64,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "ESCROW_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Directory to initialize.
    #[arg(long, short = 'd', env = "ESCROW_DATA_DIR", default_value = "./escrow-data")]
    pub data_dir: PathBuf,

    /// Replace an existing operator key.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// API endpoint of the running node.
    #[arg(long, env = "ESCROW_RPC_URL", default_value = "http://127.0.0.1:9741")]
    pub rpc_url: String,
}
