//!
//! provisioning controller binary
//! ------------------------------
//! `provisioning_controller [serve|provision] [--config PATH] [--http-port N] [--memory-store]`
//!
//! `serve` (the default) provisions the graph and runs the HTTP API. `provision` only
//! bootstraps the database and graph, then exits.

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use provisioning_controller::config::{Configuration, KEY_DB_PASSWORD, KEY_DB_USER, KEY_SERVICE_PORT};
use provisioning_controller::provision::{ConnectionSettings, SchemaProvisioner};
use provisioning_controller::server;
use provisioning_controller::store::http::HttpConnector;
use provisioning_controller::store::memory::{MemoryConnector, MemoryStoreClient};
use provisioning_controller::store::Connector;

const USAGE: &str = "provisioning controller\n\nUSAGE:\n  provisioning_controller [serve|provision] [--config PATH] [--http-port N] [--memory-store]\n\nCOMMANDS:\n  serve               Provision the graph and run the HTTP API (default)\n  provision           Create the database and graph if needed, then exit\n\nOPTIONS:\n  --config PATH       JSON configuration file; PROVISION_* environment variables override it\n  --http-port N       HTTP API port (config: service.port, default 8080)\n  --memory-store      Use an in-process graph store instead of the configured database\n  --help              Show this help\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Serve,
    Provision,
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool { args.iter().any(|a| a == flag) }

fn parse_mode(args: &[String]) -> Result<Mode> {
    // first argument that is neither a flag nor a flag's value
    let mut i = 1;
    while i < args.len() {
        let a = args[i].as_str();
        match a {
            "--config" | "--http-port" => i += 2,
            _ if a.starts_with('-') => i += 1,
            "serve" => return Ok(Mode::Serve),
            "provision" => return Ok(Mode::Provision),
            other => bail!("unknown command '{}'\n\n{}", other, USAGE),
        }
    }
    Ok(Mode::Serve)
}

async fn dispatch<C: Connector>(mode: Mode, cfg: &Configuration, connector: C) -> Result<()> {
    match mode {
        Mode::Serve => server::run(cfg, connector).await,
        Mode::Provision => {
            let settings = ConnectionSettings::from_config(cfg).context("Invalid database settings")?;
            let graph = SchemaProvisioner::new(connector)
                .provision(&settings)
                .await
                .context("Failed to provision the graph store")?;
            info!(database = %graph.database(), graph = %graph.name(), "Provisioning complete");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let args: Vec<String> = env::args().collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("{}", USAGE);
        return Ok(());
    }
    let mode = parse_mode(&args)?;

    let config_path = arg_value(&args, "--config").map(PathBuf::from);
    let mut cfg = Configuration::load(config_path.as_deref())
        .with_context(|| format!("Failed to load configuration from {:?}", config_path))?;
    // CLI arguments override file and environment
    if let Some(port) = arg_value(&args, "--http-port") {
        cfg.set(KEY_SERVICE_PORT, port);
    }

    let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "provisioning",
        "Provisioning controller {} starting: mode={:?}, RUST_LOG='{}', config={:?}",
        provisioning_controller::info::version(),
        mode,
        rust_log,
        config_path
    );

    if has_flag(&args, "--memory-store") {
        // the in-process store accepts any credentials
        for key in [KEY_DB_USER, KEY_DB_PASSWORD] {
            if !cfg.is_set(key) {
                cfg.set(key, "memory");
            }
        }
        tracing::warn!("Using the in-process graph store; data is lost on exit");
        dispatch(mode, &cfg, MemoryConnector::new(MemoryStoreClient::shared())).await
    } else {
        dispatch(mode, &cfg, HttpConnector).await
    }
}
