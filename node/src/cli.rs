//! # CLI Interface
//!
//! Defines the command-line argument structure for `loyalty-node` using
//! `clap` derive. Supports four subcommands: `run`, `init`, `status`,
//! and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Loyalty points ledger node.
///
/// Hosts the ledger over HTTP: invocations, a WebSocket stream of committed
/// events, and Prometheus metrics on a separate port.
#[derive(Parser, Debug)]
#[command(
    name = "loyalty-node",
    about = "Loyalty points ledger node",
    version,
    propagate_version = true
)]
pub struct LoyaltyNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the loyalty node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Initialize a data directory and record the ledger admin.
    Init(InitArgs),
    /// Query the status of a running node via its HTTP endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node data directory where the ledger database lives.
    ///
    /// Created on first run if it does not exist. Ignored with `--in-memory`.
    #[arg(long, short = 'd', env = "LOYALTY_DATA_DIR", default_value = "./loyalty-data")]
    pub data_dir: PathBuf,

    /// Port for the HTTP and WebSocket API.
    #[arg(long, env = "LOYALTY_RPC_PORT", default_value_t = 8710)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "LOYALTY_METRICS_PORT", default_value_t = 8711)]
    pub metrics_port: u16,

    /// Keep the ledger in memory. Everything is lost on exit.
    #[arg(long)]
    pub in_memory: bool,

    /// Log output format.
    #[arg(
        long,
        env = "LOYALTY_LOG_FORMAT",
        value_enum,
        ignore_case = true,
        default_value_t = LogFormat::Pretty
    )]
    pub log_format: LogFormat,

    /// Flush the database to disk after every commit.
    #[arg(long, env = "LOYALTY_FLUSH_ON_COMMIT")]
    pub flush_on_commit: bool,

    /// Admin subject to record if the ledger has not been initialized yet.
    ///
    /// Required for `--in-memory` nodes, which have no `init` step.
    #[arg(long, env = "LOYALTY_ADMIN")]
    pub admin: Option<String>,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "LOYALTY_DATA_DIR", default_value = "./loyalty-data")]
    pub data_dir: PathBuf,

    /// Subject allowed to register actors and audit the ledger.
    #[arg(long, env = "LOYALTY_ADMIN")]
    pub admin: String,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// HTTP endpoint of the running node.
    #[arg(long, default_value = "http://127.0.0.1:8710")]
    pub rpc_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        LoyaltyNodeCli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = LoyaltyNodeCli::try_parse_from([
            "loyalty-node",
            "run",
            "--in-memory",
            "--admin",
            "root",
            "--rpc-port",
            "9000",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert!(args.in_memory);
                assert_eq!(args.admin.as_deref(), Some("root"));
                assert_eq!(args.rpc_port, 9000);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn init_takes_admin_and_data_dir() {
        let cli = LoyaltyNodeCli::try_parse_from([
            "loyalty-node",
            "init",
            "--admin",
            "testUser",
            "-d",
            "/tmp/loyalty",
        ])
        .unwrap();
        match cli.command {
            Commands::Init(args) => {
                assert_eq!(args.admin, "testUser");
                assert_eq!(args.data_dir, PathBuf::from("/tmp/loyalty"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
