// src/config.rs

//! Runtime configuration. Every field has a default, so an empty or partial
//! TOML file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::core::flatten::Flattener;
use crate::core::models::ReconError;
use crate::logging::project_directory;

/// Well-known ports checked by the port scan.
pub const DEFAULT_PORTS: &[u16] = &[
    21, 22, 23, 25, 53, 80, 110, 143, 443, 465, 587, 993, 995, 3306, 3389, 5432, 8080, 8443,
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Maximum number of in-flight network calls.
    pub workers: usize,
    /// Timeout of a single network call, in seconds.
    pub network_timeout_secs: u64,
    /// Overall timeout of one network probe, in seconds.
    pub probe_timeout_secs: u64,
    /// Timeout of one TCP connect during the port scan, in milliseconds.
    pub port_timeout_ms: u64,
    /// Overall timeout of the reachability probe, in seconds.
    pub ping_timeout_secs: u64,
    /// Echo requests sent by the ping facility.
    pub ping_count: u32,
    pub ports: Vec<u16>,
    pub user_agent: String,
    /// Server queried first when following WHOIS referrals.
    pub whois_server: String,
    pub rdap_bootstrap_url: String,
    /// Public RDAP service, `{domain}` is substituted.
    pub remote_lookup_url: String,
    /// Geolocation API, `{ip}` is substituted.
    pub geolocation_url: String,
    pub flatten: FlattenConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlattenConfig {
    pub separator: String,
    pub list_delimiter: String,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        let flattener = Flattener::default();
        Self {
            separator: flattener.separator,
            list_delimiter: flattener.list_delimiter,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 4,
            network_timeout_secs: 5,
            probe_timeout_secs: 20,
            port_timeout_ms: 800,
            ping_timeout_secs: 12,
            ping_count: 4,
            ports: DEFAULT_PORTS.to_vec(),
            user_agent: format!("VanguardRecon/{}", env!("CARGO_PKG_VERSION")),
            whois_server: "whois.iana.org".to_string(),
            rdap_bootstrap_url: "https://data.iana.org/rdap/dns.json".to_string(),
            remote_lookup_url: "https://rdap.org/domain/{domain}".to_string(),
            geolocation_url: "http://ip-api.com/json/{ip}".to_string(),
            flatten: FlattenConfig::default(),
        }
    }
}

impl Config {
    /// Parses a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ReconError> {
        let config: Config = toml::from_str(text).map_err(|e| ReconError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file at `path`.
    pub fn load_from(path: &Path) -> Result<Self, ReconError> {
        debug!(path = %path.display(), "Loading configuration file.");
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Loads `path` if given, otherwise `<config dir>/config.toml` if it exists,
    /// otherwise the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ReconError> {
        if let Some(path) = path {
            return Self::load_from(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                info!("No configuration file found, using defaults.");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.workers == 0 {
            return Err(ReconError::Config("workers must be at least 1".to_string()));
        }
        if self.network_timeout_secs == 0 || self.probe_timeout_secs == 0 {
            return Err(ReconError::Config("timeouts must be non-zero".to_string()));
        }
        if !self.remote_lookup_url.contains("{domain}") {
            return Err(ReconError::Config("remote_lookup_url must contain {domain}".to_string()));
        }
        if !self.geolocation_url.contains("{ip}") {
            return Err(ReconError::Config("geolocation_url must contain {ip}".to_string()));
        }
        Ok(())
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn port_timeout(&self) -> Duration {
        Duration::from_millis(self.port_timeout_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    /// Collection budget of the port scan: every batch of `workers` connects
    /// takes at most one connect timeout, plus one second of slack. Ports still
    /// waiting for the network gate when it runs out count as not open.
    pub fn port_scan_timeout(&self) -> Duration {
        let batches = self.ports.len().div_ceil(self.workers.max(1)).max(1) as u32;
        self.port_timeout() * batches + Duration::from_secs(1)
    }

    pub fn flattener(&self) -> Flattener {
        Flattener::new(self.flatten.separator.clone(), self.flatten.list_delimiter.clone())
    }
}

fn default_config_path() -> Option<PathBuf> {
    project_directory().map(|dirs| dirs.config_dir().join("config.toml"))
}
