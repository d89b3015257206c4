mod config;
mod handlers;
mod server;

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, Overrides, StorageBackend};

#[derive(Parser)]
#[command(
    name = "kvlock",
    about = "kvlock: token-fenced distributed locks over a shared key-value store",
    version
)]
struct Cli {
    /// YAML config file; flags and env vars override its values
    #[arg(long, global = true, env = "KVLOCK_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset, e.g. "info" or "kvlock_core=debug"
    #[arg(long, global = true, env = "KVLOCK_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the kvlock HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Lock storage: "memory" or "redis://..."
        #[arg(long, env = "KVLOCK_STORAGE")]
        storage: Option<String>,

        /// User database: "memory" or "sqlite:<path>"
        #[arg(long, env = "KVLOCK_DATABASE")]
        database: Option<String>,
    },

    /// Print the remaining ttl of a lock, or "not held"
    Inspect {
        /// Lock name, with or without the "lock:" prefix
        name: String,

        /// Lock storage: "memory" or "redis://..."
        #[arg(long, env = "KVLOCK_STORAGE")]
        storage: Option<String>,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("kvlock {}", env!("CARGO_PKG_VERSION"));
        println!("Token-fenced distributed locks over a shared key-value store");
        return ExitCode::SUCCESS;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref())?;

    let overrides = match &cli.command {
        Commands::Serve {
            port,
            host,
            storage,
            database,
        } => Overrides {
            host: host.clone(),
            port: *port,
            storage: storage.clone(),
            database: database.clone(),
            log_level: cli.log_level.clone(),
        },
        Commands::Inspect { storage, .. } => Overrides {
            storage: storage.clone(),
            log_level: cli.log_level.clone(),
            ..Overrides::default()
        },
        Commands::Version => Overrides::default(),
    };
    overrides.apply(&mut config);
    config.validate()?;

    init_tracing(&config.log_level);

    match cli.command {
        Commands::Serve { .. } => server::run(config).await,
        Commands::Inspect { name, .. } => {
            let storage: StorageBackend = config.storage.parse()?;
            let client = server::connect_locks(&storage).await?;
            println!("{}", server::describe_lock(&client, &name).await?);
            Ok(())
        }
        Commands::Version => Ok(()),
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
