//! CLI argument parsing and config file support.
//!
//! The daemon can be configured via CLI flags, a JSON config file,
//! or a combination of both (CLI overrides config file). The device
//! secret is only ever read from the environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use clap::Parser;
use pqbook_crypto::mac::DeviceSecret;
use pqbook_types::config::AdmissionConfig;
use serde::{Deserialize, Serialize};

/// Environment variable holding the hex-encoded device secret.
pub const SECRET_ENV: &str = "RATE_LIMIT_SECRET";

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_STATIC_DIR: &str = "static";
const DEFAULT_ALLOWED_ORIGIN: &str = "https://pq-guestbook.fly.dev";

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// pqbook daemon, a post-quantum signed guestbook server.
#[derive(Parser, Debug, Default)]
#[command(name = "pqbook-daemon", version, about)]
pub struct CliArgs {
    /// Listen IP address (default: 0.0.0.0).
    #[arg(long)]
    pub listen: Option<IpAddr>,

    /// Listen port (default: 8080).
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Load settings from a JSON config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory of static frontend assets (default: ./static).
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// Origin allowed by CORS on the API routes.
    #[arg(long)]
    pub allowed_origin: Option<String>,
}

// ---------------------------------------------------------------------------
// Config file (JSON)
// ---------------------------------------------------------------------------

/// JSON config file format.
///
/// Example `pqbook.json`:
/// ```json
/// {
///   "listen_addr": "0.0.0.0",
///   "port": 8080,
///   "static_dir": "/srv/pqbook/static",
///   "allowed_origin": "https://guestbook.example",
///   "admission": {
///     "burst_capacity": 8.0,
///     "refill_per_sec": 0.25,
///     "algorithm_hint_policy": "enforce"
///   }
/// }
/// ```
///
/// Omitted admission fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DaemonConfigFile {
    pub listen_addr: Option<IpAddr>,
    pub port: Option<u16>,
    pub static_dir: Option<String>,
    pub allowed_origin: Option<String>,
    pub admission: Option<AdmissionConfig>,
}

// ---------------------------------------------------------------------------
// Resolved config (all defaults applied)
// ---------------------------------------------------------------------------

/// Fully resolved daemon configuration with all defaults applied.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub listen_addr: IpAddr,
    pub port: u16,
    pub static_dir: PathBuf,
    pub allowed_origin: String,
    pub admission: AdmissionConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            allowed_origin: DEFAULT_ALLOWED_ORIGIN.into(),
            admission: AdmissionConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Build config purely from CLI args with defaults.
    pub fn from_cli(cli: &CliArgs) -> Self {
        Self::default().merge_cli(cli)
    }

    /// Parse config from JSON text.
    pub fn from_json(text: &str) -> Result<Self, String> {
        let file: DaemonConfigFile =
            serde_json::from_str(text).map_err(|e| format!("invalid config JSON: {e}"))?;

        let defaults = Self::default();
        Ok(Self {
            listen_addr: file.listen_addr.unwrap_or(defaults.listen_addr),
            port: file.port.unwrap_or(defaults.port),
            static_dir: file
                .static_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
            allowed_origin: file.allowed_origin.unwrap_or(defaults.allowed_origin),
            admission: file.admission.unwrap_or(defaults.admission),
        })
    }

    /// Load config from a JSON file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file: {e}"))?;
        Self::from_json(&text)
    }

    /// Merge CLI overrides onto a config-file base.
    pub fn merge_cli(mut self, cli: &CliArgs) -> Self {
        if let Some(addr) = cli.listen {
            self.listen_addr = addr;
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(ref dir) = cli.static_dir {
            self.static_dir = dir.clone();
        }
        if let Some(ref origin) = cli.allowed_origin {
            self.allowed_origin = origin.clone();
        }
        self
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.port)
    }
}

// ---------------------------------------------------------------------------
// Secret loading
// ---------------------------------------------------------------------------

/// Reads and validates the device secret from [`SECRET_ENV`].
///
/// The value must be hex and decode to exactly 32 bytes.
pub fn load_secret() -> Result<DeviceSecret, String> {
    let encoded = std::env::var(SECRET_ENV)
        .map_err(|_| format!("{SECRET_ENV} must be set to 64 hex characters (32 bytes)"))?;
    DeviceSecret::from_hex(&encoded).map_err(|e| format!("invalid {SECRET_ENV}: {e}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
