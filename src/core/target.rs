// src/core/target.rs

use std::net::IpAddr;
use tracing::debug;
use url::{Host, Url};

use crate::core::models::ReconError;

/// The normalized target of one analysis run.
///
/// Built once from raw user input (a domain, a bare hostname, an IP literal or
/// a URL with or without scheme) and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    raw: String,
    host: String,
    ip: Option<IpAddr>,
    base_url: Url,
}

impl Target {
    /// Normalizes raw input. Fails with `InvalidTarget` on empty input or when
    /// no host can be extracted.
    pub fn parse(input: &str) -> Result<Self, ReconError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ReconError::InvalidTarget("target is empty".to_string()));
        }

        // Inputs without a scheme are treated as HTTPS hosts.
        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{}", trimmed)
        };

        let url = Url::parse(&with_scheme)
            .map_err(|e| ReconError::InvalidTarget(format!("{trimmed}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ReconError::InvalidTarget(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let (host, ip) = match url.host() {
            Some(Host::Domain(domain)) => {
                let domain = domain.trim_end_matches('.').to_lowercase();
                if domain.is_empty() {
                    return Err(ReconError::InvalidTarget(format!("{trimmed}: empty host")));
                }
                (domain, None)
            }
            Some(Host::Ipv4(v4)) => (v4.to_string(), Some(IpAddr::V4(v4))),
            Some(Host::Ipv6(v6)) => (v6.to_string(), Some(IpAddr::V6(v6))),
            None => return Err(ReconError::InvalidTarget(format!("{trimmed}: no host"))),
        };

        let mut base_url = url.clone();
        base_url.set_path("/");
        base_url.set_query(None);
        base_url.set_fragment(None);
        if ip.is_none() {
            base_url
                .set_host(Some(&host))
                .map_err(|e| ReconError::InvalidTarget(format!("{trimmed}: {e}")))?;
        }

        debug!(raw = trimmed, host = %host, base_url = %base_url, "Target normalized.");
        Ok(Self { raw: trimmed.to_string(), host, ip, base_url })
    }

    /// The input as the user typed it (trimmed).
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Lower-case domain or IP literal.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The parsed address when the host is an IP literal.
    pub fn ip(&self) -> Option<IpAddr> {
        self.ip
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The name a registry indexes: one label below the public suffix
    /// (`www.bbc.co.uk` gives `bbc.co.uk`).
    ///
    /// `None` for IP literals, bare public suffixes and single-label hosts.
    pub fn registrable_domain(&self) -> Option<String> {
        if self.ip.is_some() {
            return None;
        }
        psl::domain_str(&self.host).map(str::to_string)
    }
}
