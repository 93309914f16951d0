//! Registry server and client entry point

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use registry_service::{load_tls, RegistryClient, Server, ServerSettings};
use service_config::ServiceConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "info" or "registry_service=debug"
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the server until Ctrl-C
    Serve {
        /// Bind address (host:port)
        #[arg(long)]
        listen: Option<String>,

        /// SQLite database file; omit for an in-memory store
        #[arg(long)]
        database: Option<PathBuf>,

        /// Maximum concurrent connections
        #[arg(long)]
        max_connections: Option<usize>,
    },

    /// List all record names
    List {
        /// Server address (host:port)
        #[arg(long)]
        server: Option<String>,
    },

    /// Create a record
    Create {
        name: String,

        /// Server address (host:port)
        #[arg(long)]
        server: Option<String>,
    },

    /// Read a record by name
    Read {
        name: String,

        /// Server address (host:port)
        #[arg(long)]
        server: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        ServiceConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json = true;
    }

    init_tracing(&config.logging.level, config.logging.json)?;

    match args.command {
        Command::Serve {
            listen,
            database,
            max_connections,
        } => {
            if let Some(listen) = listen {
                config.listen_address = listen;
            }
            if database.is_some() {
                config.database.path = database;
            }
            if max_connections.is_some() {
                config.limits.max_connections = max_connections;
            }
            config.validate()?;
            serve(config).await
        }
        Command::List { server } => {
            let client = client(&mut config, server)?;
            let records = client.list().await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
            Ok(())
        }
        Command::Create { name, server } => {
            let client = client(&mut config, server)?;
            let record = client.create(&name).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            if let Some(err) = record.error {
                bail!("create rejected: {err}");
            }
            Ok(())
        }
        Command::Read { name, server } => {
            let client = client(&mut config, server)?;
            let record = client.read(&name).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            if let Some(err) = record.error {
                bail!("read failed: {err}");
            }
            Ok(())
        }
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

async fn serve(config: ServiceConfig) -> Result<()> {
    info!("Starting registry server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let store = store::open_store(config.database.path.as_deref())
        .context("Failed to open store")?;
    let tls = load_tls(&config.tls).context("Failed to load TLS identity")?;
    let server = Arc::new(Server::new(ServerSettings::from(&config), tls, store));

    let mut running = tokio::spawn({
        let server = server.clone();
        async move { server.run().await }
    });

    tokio::select! {
        result = &mut running => {
            let result = result.context("Server task panicked")?;
            if let Err(e) = &result {
                error!(error = %e, "Registry server error");
            }
            result?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Shutdown signal received");
            server.close().await?;
            running.await.context("Server task panicked")??;
        }
    }

    info!("Registry server stopped");
    Ok(())
}

fn client(config: &mut ServiceConfig, server: Option<String>) -> Result<RegistryClient> {
    if let Some(server) = server {
        config.client.server_address = server;
    }
    let tls = load_tls(&config.tls).context("Failed to load TLS identity")?;
    Ok(RegistryClient::new(
        config.client.server_address.clone(),
        config.client.server_name.clone(),
        tls,
    )
    .with_connect_timeout(config.client.connect_timeout())
    .with_max_message_size(config.limits.max_message_size))
}

fn init_tracing(level: &str, json: bool) -> Result<()> {
    // RUST_LOG wins over configuration
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log filter")?;

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
    }
    Ok(())
}
