//! `w3f` command line.

pub mod commands;
pub mod config;

pub use config::{parse_urls_csv, HarnessConfig};

use crate::functions::builtin_catalog;
use crate::runtime::executor::RuntimeMode;
use crate::runtime::worker::run_worker;
use crate::utils::{init_logging, init_worker_logging};
use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::RunOptions;
use std::path::PathBuf;
use std::process::ExitCode;

/// Local harness for Web3 Functions.
#[derive(Parser)]
#[clap(name = "w3f", version)]
pub struct Cli {
    /// Path to the harness config file
    #[clap(long, default_value = config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Debug logging (RUST_LOG wins when set)
    #[clap(long, short)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand)]
pub enum Cmd {
    /// Build and run a function, print its outcome as JSON
    Run {
        /// Function name (directory under the functions dir)
        name: String,

        /// Execution mode, overrides the config file
        #[clap(long, value_enum)]
        runtime: Option<RuntimeMode>,

        /// Comma separated JSON-RPC urls, overrides config and PROVIDER_URLS
        #[clap(long)]
        provider_urls: Option<String>,

        /// User args as a JSON object
        #[clap(long)]
        user_args: Option<String>,

        /// Storage snapshot as a JSON object, instead of the persisted one
        #[clap(long)]
        storage: Option<String>,

        /// Chain id reported to the function, instead of the default provider's
        #[clap(long)]
        chain_id: Option<u64>,

        /// Run timeout in milliseconds, overrides the manifest
        #[clap(long)]
        timeout_ms: Option<u64>,

        /// Do not persist the updated storage
        #[clap(long)]
        no_persist: bool,
    },
    /// List compiled functions
    List,
    /// Isolated worker entry point (spawned by the process runtime)
    #[clap(hide = true)]
    Worker,
}

pub async fn run_cli() -> Result<ExitCode> {
    let cli = Cli::parse();

    if let Cmd::Worker = cli.cmd {
        init_worker_logging();
        run_worker(builtin_catalog()).await?;
        return Ok(ExitCode::SUCCESS);
    }

    init_logging(cli.verbose);
    let config = HarnessConfig::load_or_default(&cli.config)?
        .with_provider_env(std::env::var(config::PROVIDER_URLS_ENV).ok());

    match cli.cmd {
        Cmd::Run { name, runtime, provider_urls, user_args, storage, chain_id, timeout_ms, no_persist } => {
            let mut config = config;
            if let Some(mode) = runtime {
                config.runtime = mode;
            }
            if let Some(urls) = provider_urls {
                config.provider_urls = parse_urls_csv(&urls);
            }
            if timeout_ms.is_some() {
                config.limits.timeout_ms = timeout_ms;
            }
            let opts = RunOptions { name, user_args, storage, chain_id, persist: !no_persist };
            commands::run_function(&config, opts).await
        }
        Cmd::List => commands::list_functions(&config),
        Cmd::Worker => Ok(ExitCode::SUCCESS),
    }
}
