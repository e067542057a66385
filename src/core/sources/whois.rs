// src/core/sources/whois.rs

//! Free-text registration data over WHOIS (TCP port 43).
//!
//! The query starts at the configured root server (IANA by default), follows
//! its `refer:` line to the TLD registry, and follows the registry's
//! `Registrar WHOIS Server:` line once more when present. The last response
//! that parses into a non-empty section wins.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::core::models::{ProbeError, SectionData};
use crate::core::scanner::fallback::ChainLink;
use crate::core::target::Target;

const WHOIS_PORT: u16 = 43;
/// Upper bound on a single WHOIS response.
const MAX_RESPONSE_BYTES: u64 = 256 * 1024;

/// Markers registries use for unregistered names.
const NOT_FOUND_MARKERS: &[&str] = &[
    "no match for",
    "not found",
    "no data found",
    "no entries found",
    "status: free",
    "domain not found",
    "is available for registration",
];

/// Line prefix → section key. Multi-valued keys collect every match.
const KEY_TABLE: &[(&str, &str)] = &[
    ("registrar:", "registrar"),
    ("sponsoring registrar:", "registrar"),
    ("creation date:", "creation_date"),
    ("created:", "creation_date"),
    ("registered on:", "creation_date"),
    ("registry expiry date:", "expiration_date"),
    ("registrar registration expiration date:", "expiration_date"),
    ("expiry date:", "expiration_date"),
    ("expires:", "expiration_date"),
    ("updated date:", "last_updated"),
    ("last updated:", "last_updated"),
    ("changed:", "last_updated"),
    ("name server:", "name_servers"),
    ("nserver:", "name_servers"),
    ("domain status:", "status"),
    ("status:", "status"),
    ("registrant email:", "emails"),
    ("admin email:", "emails"),
    ("tech email:", "emails"),
    ("registrant organization:", "organization"),
    ("registrant organisation:", "organization"),
    ("org:", "organization"),
    ("registrant country:", "registrant_country"),
    ("admin country:", "admin_country"),
];

const SECTION_KEYS: &[&str] = &[
    "registrar",
    "creation_date",
    "expiration_date",
    "last_updated",
    "name_servers",
    "status",
    "emails",
    "organization",
    "registrant_country",
    "admin_country",
];

const MULTI_VALUED: &[&str] = &["name_servers", "status", "emails"];

/// Whether a WHOIS response says the name is not registered.
pub fn is_not_found(text: &str) -> bool {
    let lower = text.to_lowercase();
    NOT_FOUND_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Extracts the referral server (`refer:` / `whois:` / `Registrar WHOIS Server:`).
pub fn referral(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let line = line.trim();
        let lower = line.to_lowercase();
        ["refer:", "whois:", "registrar whois server:"]
            .iter()
            .find(|prefix| lower.starts_with(*prefix))
            .map(|prefix| line.get(prefix.len()..).unwrap_or_default().trim().trim_start_matches("whois://").to_string())
            .filter(|server| !server.is_empty())
    })
}

/// Parses registry text into the registration section shape.
///
/// Keys are matched case-insensitively at line start. Statuses keep only their
/// first token (`clientTransferProhibited https://icann.org/...` becomes
/// `clientTransferProhibited`); name servers are lower-cased; repeats are dropped.
pub fn parse_whois(text: &str) -> SectionData {
    let mut single: Map<String, Value> = Map::new();
    let mut multi: Vec<(&str, Vec<String>)> = MULTI_VALUED.iter().map(|k| (*k, Vec::new())).collect();

    for line in text.lines() {
        let line = line.trim();
        if line.starts_with('%') || line.starts_with('#') || line.starts_with(">>>") {
            continue;
        }
        let lower = line.to_lowercase();
        let Some((prefix, key)) = KEY_TABLE.iter().find(|(prefix, _)| lower.starts_with(prefix)) else {
            continue;
        };
        let value = line.get(prefix.len()..).unwrap_or_default().trim();
        if value.is_empty() {
            continue;
        }

        if let Some((_, values)) = multi.iter_mut().find(|(k, _)| k == key) {
            let value = match *key {
                "status" => value.split_whitespace().next().unwrap_or(value).to_string(),
                "name_servers" => value.split_whitespace().next().unwrap_or(value).trim_end_matches('.').to_lowercase(),
                "emails" => value.to_lowercase(),
                _ => value.to_string(),
            };
            if !values.contains(&value) {
                values.push(value);
            }
        } else if !single.contains_key(*key) {
            single.insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    let mut section = Map::new();
    for key in SECTION_KEYS {
        let value = if let Some((_, values)) = multi.iter().find(|(k, _)| k == key) {
            if values.is_empty() {
                Value::Null
            } else {
                Value::Array(values.iter().cloned().map(Value::String).collect())
            }
        } else {
            single.remove(*key).unwrap_or(Value::Null)
        };
        section.insert(key.to_string(), value);
    }
    section
}

fn has_content(section: &SectionData) -> bool {
    section.values().any(|v| !v.is_null())
}

/// WHOIS chain link following referrals from the root server.
pub struct WhoisText {
    root_server: String,
    timeout: Duration,
}

impl WhoisText {
    pub fn new(root_server: String, timeout: Duration) -> Self {
        Self { root_server, timeout }
    }

    async fn query(&self, server: &str, domain: &str) -> Result<String, ProbeError> {
        debug!(server, domain, "Sending WHOIS query.");
        let connect = TcpStream::connect((server, WHOIS_PORT));
        let mut stream = tokio::time::timeout(self.timeout, connect)
            .await
            .map_err(|_| ProbeError::timeout(format!("WHOIS connect to {server} timed out")))?
            .map_err(|e| ProbeError::unreachable(format!("WHOIS connect to {server} failed: {e}")))?;

        stream
            .write_all(format!("{domain}\r\n").as_bytes())
            .await
            .map_err(|e| ProbeError::unreachable(format!("WHOIS write to {server} failed: {e}")))?;

        let mut raw = Vec::new();
        let mut limited = (&mut stream).take(MAX_RESPONSE_BYTES);
        tokio::time::timeout(self.timeout, limited.read_to_end(&mut raw))
            .await
            .map_err(|_| ProbeError::timeout(format!("WHOIS read from {server} timed out")))?
            .map_err(|e| ProbeError::unreachable(format!("WHOIS read from {server} failed: {e}")))?;

        Ok(String::from_utf8_lossy(&raw).into_owned())
    }
}

#[async_trait]
impl ChainLink for WhoisText {
    fn name(&self) -> &str {
        "whois"
    }

    async fn attempt(&self, target: &Target) -> Result<SectionData, ProbeError> {
        let domain = target
            .registrable_domain()
            .ok_or_else(|| ProbeError::not_found(format!("{} has no registrable domain", target.host())))?;

        let root = self.query(&self.root_server, &domain).await?;
        let Some(registry) = referral(&root) else {
            // The root server answered authoritatively.
            return finish(&domain, &root, None);
        };

        let registry_text = self.query(&registry, &domain).await?;
        if is_not_found(&registry_text) && !has_content(&parse_whois(&registry_text)) {
            return Err(ProbeError::not_found(format!("WHOIS: {domain} not found at {registry}")));
        }

        let registrar_server = referral(&registry_text).filter(|s| !s.eq_ignore_ascii_case(&registry));
        if let Some(server) = registrar_server {
            match self.query(&server, &domain).await {
                Ok(text) => {
                    let section = parse_whois(&text);
                    if has_content(&section) {
                        info!(domain = %domain, server = %server, "WHOIS data from registrar server.");
                        return Ok(section);
                    }
                }
                Err(e) => warn!(server = %server, error = %e, "Registrar WHOIS query failed, keeping registry data."),
            }
        }
        finish(&domain, &registry_text, Some(&registry))
    }
}

fn finish(domain: &str, text: &str, server: Option<&str>) -> Result<SectionData, ProbeError> {
    let section = parse_whois(text);
    if has_content(&section) {
        info!(domain, server = server.unwrap_or("root"), "WHOIS data parsed.");
        Ok(section)
    } else if is_not_found(text) {
        Err(ProbeError::not_found(format!("WHOIS: {domain} not found")))
    } else {
        Err(ProbeError::parse(format!("WHOIS: no recognizable fields for {domain}")))
    }
}
