//! # Semblance Gateway Runtime
//!
//! The Gateway process. `serve` listens for Core on a Unix socket; every
//! other subcommand is an administrative operation on the same store.
//!
//! ## Startup Sequence (`serve`)
//!
//! 1. Load configuration from `SG_*` variables
//! 2. Initialize logging and metrics
//! 3. Open the store (takes the data-directory lock)
//! 4. Build the `Gateway`: load allow-list and pins, reconcile interrupted
//!    audit records, seed the anomaly detector
//! 5. Bind the socket and serve until Ctrl+C
//!
//! Administrative subcommands need the store lock too, so they fail while
//! `serve` is running against the same data directory.

mod config;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use gateway_telemetry::init_telemetry;
use semblance_gateway::adapters::{
    FileBackedKVStore, HandlerRegistry, SystemClock, TracingAnomalySink,
};
use semblance_gateway::domain::allowlist::NewService;
use semblance_gateway::ipc::UnixSocketServer;
use semblance_gateway::{Gateway, KeyValueStore};
use shared_types::Protocol;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::{RuntimeConfig, StoreBackend};

#[derive(Parser)]
#[command(name = "semblance-gateway", version, about = "Semblance network gateway")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve Core over the Unix socket until interrupted
    Serve,
    /// Manage allow-listed destinations
    #[command(subcommand)]
    Allowlist(AllowlistCommand),
    /// Inspect the audit trail
    #[command(subcommand)]
    Audit(AuditCommand),
    /// Manage certificate pins
    #[command(subcommand)]
    Pins(PinsCommand),
    /// Manage the Core ↔ Gateway signing key
    #[command(subcommand)]
    Key(KeyCommand),
    /// Print this process's metrics in Prometheus text format
    Metrics,
}

#[derive(Subcommand)]
enum AllowlistCommand {
    Add(AddService),
    List {
        /// Include deactivated entries
        #[arg(long)]
        all: bool,
    },
    Deactivate { id: String },
    Reactivate { id: String },
}

#[derive(Args)]
struct AddService {
    #[arg(long)]
    name: String,
    #[arg(long)]
    domain: String,
    /// Omit to allow any port
    #[arg(long)]
    port: Option<u16>,
    #[arg(long, default_value = "https")]
    protocol: String,
    #[arg(long, default_value = "cli")]
    added_by: String,
}

#[derive(Subcommand)]
enum AuditCommand {
    /// Recompute the hash chain and report the first divergence
    Verify,
    /// Print every row recorded for a request id
    Show { request_id: String },
}

#[derive(Subcommand)]
enum PinsCommand {
    List,
    /// Register a pin; without fingerprints it is filled on first use
    Add {
        domain: String,
        #[arg(long = "fingerprint")]
        fingerprints: Vec<String>,
        #[arg(long)]
        enforced: bool,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Turn enforcement on, or off with --off
    Enforce {
        domain: String,
        #[arg(long)]
        off: bool,
    },
}

#[derive(Subcommand)]
enum KeyCommand {
    /// Replace the signing key. Core must be re-provisioned afterwards.
    Rotate,
    /// Write the signing key (hex) to a file readable only by its owner
    Export {
        #[arg(long)]
        out: PathBuf,
    },
}

fn open_store(config: &RuntimeConfig) -> Result<Arc<dyn KeyValueStore>> {
    match config.store {
        StoreBackend::File => {
            let store = FileBackedKVStore::open(&config.data_dir)
                .with_context(|| format!("failed to open store in {}", config.data_dir.display()))?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "rocksdb")]
        StoreBackend::RocksDb => {
            use semblance_gateway::adapters::storage::{RocksDbConfig, RocksDbStore};
            let store = RocksDbStore::open(RocksDbConfig::new(config.data_dir.join("rocksdb")))
                .context("failed to open RocksDB store")?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "rocksdb"))]
        StoreBackend::RocksDb => bail!("SG_STORE=rocksdb requires the `rocksdb` feature"),
    }
}

fn build_gateway(config: &RuntimeConfig) -> Result<Gateway> {
    let store = open_store(config)?;
    // Service adapters register here; until then every action answers
    // HANDLER_NOT_CONFIGURED_ERROR after passing validation.
    let registry = Arc::new(HandlerRegistry::new());
    Gateway::new(
        config.gateway.clone(),
        store,
        Arc::new(SystemClock),
        registry,
        Arc::new(TracingAnomalySink),
    )
    .context("failed to start gateway")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn serve(config: &RuntimeConfig) -> Result<()> {
    let gateway = Arc::new(build_gateway(config)?);
    gateway
        .signing_key()
        .context("signing key unavailable")?;

    let server = UnixSocketServer::bind(&config.socket_path, gateway)
        .with_context(|| format!("failed to bind {}", config.socket_path.display()))?;
    info!(
        socket = %config.socket_path.display(),
        data_dir = %config.data_dir.display(),
        "Gateway is running. Press Ctrl+C to stop."
    );

    server
        .serve_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            }
        })
        .await?;

    info!("Gateway stopped");
    Ok(())
}

fn allowlist(config: &RuntimeConfig, command: AllowlistCommand) -> Result<()> {
    let gateway = build_gateway(config)?;
    let allowlist = gateway.allowlist();
    match command {
        AllowlistCommand::Add(add) => {
            let protocol: Protocol = add
                .protocol
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            let entry = allowlist.add_service(NewService {
                service_name: add.name,
                domain: add.domain,
                port: add.port,
                protocol,
                added_by: add.added_by,
            })?;
            print_json(&entry)
        }
        AllowlistCommand::List { all } => print_json(&allowlist.list(all)),
        AllowlistCommand::Deactivate { id } => print_json(&allowlist.deactivate_service(&id)?),
        AllowlistCommand::Reactivate { id } => print_json(&allowlist.reactivate_service(&id)?),
    }
}

fn audit(config: &RuntimeConfig, command: AuditCommand) -> Result<()> {
    let gateway = build_gateway(config)?;
    match command {
        AuditCommand::Verify => {
            let verification = gateway.audit().verify_chain()?;
            match verification.first_divergence {
                None => {
                    println!("audit chain intact ({} rows)", verification.rows_checked);
                    Ok(())
                }
                Some(sequence) => bail!(
                    "audit chain diverges at sequence {sequence} ({} rows checked)",
                    verification.rows_checked
                ),
            }
        }
        AuditCommand::Show { request_id } => {
            let rows = gateway.audit().by_request_id(&request_id)?;
            if rows.is_empty() {
                bail!("no audit rows for request {request_id}");
            }
            print_json(&rows)
        }
    }
}

fn pins(config: &RuntimeConfig, command: PinsCommand) -> Result<()> {
    let gateway = build_gateway(config)?;
    match command {
        PinsCommand::List => print_json(&gateway.pins().list()),
        PinsCommand::Add {
            domain,
            fingerprints,
            enforced,
            description,
        } => print_json(&gateway.pins().register_pin(
            &domain,
            &fingerprints,
            enforced,
            &description,
        )?),
        PinsCommand::Enforce { domain, off } => {
            print_json(&gateway.pins().set_enforced(&domain, !off)?)
        }
    }
}

fn key(config: &RuntimeConfig, command: KeyCommand) -> Result<()> {
    let gateway = build_gateway(config)?;
    match command {
        KeyCommand::Rotate => {
            gateway.keys().regenerate()?;
            println!("signing key `{}` rotated", gateway.keys().name());
        }
        KeyCommand::Export { out } => {
            let key = gateway.signing_key()?;
            write_private(&out, key.to_hex().as_bytes())
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("signing key written to {}", out.display());
        }
    }
    Ok(())
}

#[cfg(unix)]
fn write_private(path: &std::path::Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &std::path::Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = RuntimeConfig::from_env()?;
    let _telemetry = init_telemetry(config.telemetry())?;

    match cli.command {
        Command::Serve => serve(&config).await,
        Command::Allowlist(command) => allowlist(&config, command),
        Command::Audit(command) => audit(&config, command),
        Command::Pins(command) => pins(&config, command),
        Command::Key(command) => key(&config, command),
        Command::Metrics => {
            print!("{}", gateway_telemetry::gather_text()?);
            Ok(())
        }
    }
}
