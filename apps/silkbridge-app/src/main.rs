//! silkbridge command-line server.
//!
//! Provides two modes of operation:
//! - `serve`: Start the TCP bridge for a game client
//! - `info`: Print crate versions, defaults and training hyperparameters

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::{error, info};

use silkbridge_core::prelude::*;
use silkbridge_policy::LinearPpoProvider;
use silkbridge_server::prelude::*;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Bridge between a game client and a reinforcement-learning policy.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the TCP bridge server.
    Serve {
        /// TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Host to bind (overrides the config file).
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides the config file).
        #[arg(short, long)]
        port: Option<u16>,

        /// Checkpoint root directory (overrides the config file).
        #[arg(short, long)]
        model_dir: Option<PathBuf>,

        /// RNG seed for the policy engine.
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Print crate information.
    Info,
}

#[derive(Debug, Error)]
enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// `RUST_LOG` wins, then the configured filter, then `info`.
fn init_tracing(filter: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(filter))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

// ---------------------------------------------------------------------------
// Mode implementations
// ---------------------------------------------------------------------------

fn load_config(
    path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    model_dir: Option<PathBuf>,
    seed: Option<u64>,
) -> Result<BridgeConfig, ConfigError> {
    let mut config = match path {
        Some(path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(model_dir) = model_dir {
        config.storage.model_dir = model_dir;
    }
    if seed.is_some() {
        config.engine.seed = seed;
    }
    config.validate()?;
    Ok(config)
}

fn run_serve(config: &BridgeConfig) -> Result<(), AppError> {
    let addr = config.bind_address();
    let server = BridgeServer::bind_with_config(config).map_err(|source| AppError::Bind {
        addr: addr.clone(),
        source,
    })?;

    let provider = LinearPpoProvider::new(config.engine.seed);
    let mut dispatcher = Dispatcher::with_provider(
        Box::new(provider),
        CheckpointStore::new(&config.storage.model_dir),
    );
    info!(
        %addr,
        model_dir = %config.storage.model_dir.display(),
        seed = ?config.engine.seed,
        nodelay = config.server.nodelay,
        "silkbridge starting"
    );

    server.run(&mut dispatcher)
}

fn run_info() {
    let defaults = BridgeConfig::default();
    println!("silkbridge v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("crates:");
    println!("  silkbridge-core    {}", env!("CARGO_PKG_VERSION"));
    println!("  silkbridge-policy  {}", env!("CARGO_PKG_VERSION"));
    println!("  silkbridge-server  {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("defaults:");
    println!("  bind       {}", defaults.bind_address());
    println!("  model_dir  {}", defaults.storage.model_dir.display());
    println!("  max frame  {MAX_MESSAGE_SIZE} bytes");
    println!();
    for layout in [Layout::Flat, Layout::Split] {
        let hp = Hyperparameters::for_layout(layout);
        println!("hyperparameters ({layout}):");
        println!("  policy_input   {:?}", hp.policy_input);
        println!("  n_steps        {}", hp.n_steps);
        println!("  batch_size     {}", hp.batch_size);
        println!("  n_epochs       {}", hp.n_epochs);
        println!("  learning_rate  {}", hp.learning_rate);
        println!("  gamma          {}", hp.gamma);
        println!("  gae_lambda     {}", hp.gae_lambda);
        println!("  clip_range     {}", hp.clip_range);
        println!("  ent_coef       {}", hp.ent_coef);
        println!("  vf_coef        {}", hp.vf_coef);
        println!("  max_grad_norm  {}", hp.max_grad_norm);
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve {
            config,
            host,
            port,
            model_dir,
            seed,
        }) => {
            let config = match load_config(config, host, port, model_dir, seed) {
                Ok(config) => config,
                Err(e) => {
                    init_tracing("info");
                    error!("{}", AppError::from(e));
                    return ExitCode::FAILURE;
                }
            };
            init_tracing(&config.logging.filter);
            match run_serve(&config) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!("{e}");
                    ExitCode::FAILURE
                }
            }
        }
        Some(Commands::Info) | None => {
            run_info();
            ExitCode::SUCCESS
        }
    }
}
