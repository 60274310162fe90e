//! Service configuration
//!
//! Command-line arguments (with environment fallbacks) override the TOML
//! bootstrap file, which overrides built-in defaults.

use clap::Parser;
use noor_common::config::{HubSettings, TomlConfig};
use noor_common::{Error, Result};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Command-line arguments for noor-hub
#[derive(Parser, Debug, Default)]
#[command(name = "noor-hub")]
#[command(about = "Real-time session hub for NOOR Canvas")]
#[command(version)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "NOOR_PORT")]
    pub port: Option<u16>,

    /// Address to bind to
    #[arg(short, long)]
    pub bind: Option<String>,

    /// SQLite database file
    #[arg(short, long, env = "NOOR_DATABASE")]
    pub database: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "NOOR_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: IpAddr,
    pub port: u16,
    pub database_path: PathBuf,
    pub log_filter: String,
    pub hub: HubSettings,
}

impl Config {
    /// Load the config file named by `args` and apply the argument overrides
    pub fn load(args: &Args) -> Result<Self> {
        let toml = TomlConfig::load(args.config.as_deref())?;
        Self::merge(args, toml)
    }

    pub fn merge(args: &Args, toml: TomlConfig) -> Result<Self> {
        let bind = args.bind.clone().unwrap_or(toml.bind_address);
        let bind_address: IpAddr = bind
            .parse()
            .map_err(|_| Error::Config(format!("Invalid bind address '{}'", bind)))?;

        toml.hub.validate()?;

        Ok(Self {
            bind_address,
            port: args.port.unwrap_or(toml.port),
            database_path: args.database.clone().unwrap_or(toml.database_path),
            log_filter: toml.logging.level,
            hub: toml.hub,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}
