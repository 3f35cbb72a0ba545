//! Avalanche CLI - a forward HTTP proxy with Basic proxy authorization

use clap::{Parser, Subcommand, ValueEnum};
use rand::distr::Alphanumeric;
use rand::Rng;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use avalanche::auth::{apr1_hash, sha1_hash};
use avalanche::{Config, ProxyServer};

#[derive(Parser)]
#[command(name = "avalanche")]
#[command(about = "A forward HTTP proxy with htpasswd-backed proxy authorization")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the proxy server
    Run {
        /// Path to YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Listen address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,

        /// Log level (error, warn, info, debug, trace)
        #[arg(short, long, default_value = "info")]
        log_level: String,
    },

    /// Validate a configuration file
    ValidateConfig {
        /// Path to YAML configuration file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print a `login:hash` line for the credential file
    Hash {
        /// Hash scheme
        #[arg(short, long, value_enum, default_value_t = Scheme::Bcrypt)]
        scheme: Scheme,

        /// bcrypt cost
        #[arg(long, default_value_t = bcrypt::DEFAULT_COST)]
        cost: u32,

        login: String,

        password: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Scheme {
    Bcrypt,
    Apr1,
    Sha1,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            bind,
            log_level,
        } => {
            let filter =
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();

            let mut cfg = if let Some(config_path) = config {
                tracing::info!(path = %config_path.display(), "Loading configuration");
                Config::from_file(&config_path)?
            } else {
                tracing::warn!("config path is not specified, using default configuration");
                Config::default()
            };

            if let Some(addr) = bind {
                cfg.server.addr = addr;
            }

            let server = ProxyServer::new(cfg)?;

            tracing::info!("Starting proxy server...");
            tracing::info!("Configure clients with:");
            tracing::info!("  export HTTP_PROXY=http://{}", server.bind_address());
            tracing::info!("  export HTTPS_PROXY=http://{}", server.bind_address());

            let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                tracing::info!("Shutting down...");
                let _ = shutdown_tx.send(());
            });

            server.run_until_shutdown(shutdown_rx).await?;
        }

        Commands::ValidateConfig { config } => {
            println!("Validating configuration: {}", config.display());

            let cfg = Config::from_file(&config)?;
            cfg.server.socket_addr()?;

            println!("Configuration is valid!");
            println!();
            println!("  Listen address: {}", cfg.server.addr);
            if cfg.ssl.enabled {
                println!(
                    "  SSL: enabled (pem: {}, key: {})",
                    cfg.ssl.pem.as_deref().unwrap_or("(not set)"),
                    cfg.ssl.key.as_deref().unwrap_or("(not set)")
                );
            } else {
                println!("  SSL: disabled");
            }
            println!("  Request logging: {}", cfg.proxy.logging);
            match cfg.proxy.authorization.enabled_passwdfile() {
                Some(path) => println!("  Authorization: enabled (passwdfile: {})", path),
                None => println!("  Authorization: disabled"),
            }
        }

        Commands::Hash {
            scheme,
            cost,
            login,
            password,
        } => {
            if login.contains(':') || password.contains(':') {
                return Err("login and password must not contain ':'".into());
            }

            let hash = match scheme {
                Scheme::Bcrypt => bcrypt::hash(&password, cost)?,
                Scheme::Apr1 => {
                    let salt: String = rand::rng()
                        .sample_iter(&Alphanumeric)
                        .take(8)
                        .map(char::from)
                        .collect();
                    apr1_hash(&password, &salt)
                }
                Scheme::Sha1 => sha1_hash(&password),
            };
            println!("{}:{}", login, hash);
        }
    }

    Ok(())
}
