use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod cmd;

#[derive(Parser)]
#[command(name = "permanence")]
#[command(
    version,
    about = "Constituency office back end: doléances, audiences, news and parliamentary initiatives"
)]
pub struct Cli {
    /// Debug-level logging for this crate
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Path to permanence.toml (defaults to .permanence/permanence.toml)
    #[arg(long, global = true, env = "PERMANENCE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long)]
        host: Option<String>,

        /// SQLite database file
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Permissive CORS for a front end served from another origin
        #[arg(long)]
        dev: bool,
    },
    /// Create the database and run migrations, then exit
    InitDb {
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// View, validate or create the configuration file
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration (secrets masked)
    Show,
    /// Validate the effective configuration
    Validate,
    /// Write a default permanence.toml
    Init,
}

const DEFAULT_LOG_FILTER: &str = "permanence=info,tower_http=info";
const VERBOSE_LOG_FILTER: &str = "permanence=debug,tower_http=debug";

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve {
            port,
            host,
            db_path,
            dev,
        } => {
            let overrides = cmd::ServeOverrides {
                port,
                host,
                db_path,
                dev,
            };
            cmd::cmd_serve(cmd::load_config(config_path)?, overrides).await?;
        }
        Commands::InitDb { db_path } => {
            cmd::cmd_init_db(&cmd::load_config(config_path)?, db_path)?;
        }
        Commands::Config { command } => cmd::cmd_config(config_path, command)?,
    }

    Ok(())
}
