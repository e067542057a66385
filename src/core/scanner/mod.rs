// src/core/scanner/mod.rs

//! The probes: one independent unit of data collection per report section.
//!
//! A probe never returns an error past its boundary. Whatever goes wrong is
//! folded into `ProbeResult::Failed`, or into an `{"error": ...}` marker
//! inside an otherwise successful section when only a sub-item failed.

pub mod dns_scanner;
pub mod fallback;
pub mod headers_scanner;
pub mod ip_scanner;
pub mod ping_scanner;
pub mod port_scanner;
pub mod registration_scanner;
pub mod ssl_scanner;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::core::models::{ProbeResult, Section};
use crate::core::sources::{Collaborators, NetworkGate};
use crate::core::target::Target;

use self::dns_scanner::DnsRecordsProbe;
use self::fallback::FallbackChain;
use self::headers_scanner::SecurityHeadersProbe;
use self::ip_scanner::IpEnrichmentProbe;
use self::ping_scanner::ReachabilityProbe;
use self::port_scanner::PortScanProbe;
use self::registration_scanner::DomainRegistrationProbe;
use self::ssl_scanner::TlsCertificateProbe;

#[async_trait]
pub trait Probe: Send + Sync {
    /// The report section this probe fills.
    fn section(&self) -> Section;

    /// Sections that must be merged before this probe starts.
    fn depends_on(&self) -> &[Section] {
        &[]
    }

    /// Upper bound on `run`; exceeding it yields `Failed(Timeout)`.
    fn timeout(&self) -> Duration;

    async fn run(&self, target: &Target, prior: &PriorResults) -> ProbeResult;
}

/// Read-only view of the sections merged so far.
#[derive(Debug, Clone, Default)]
pub struct PriorResults {
    sections: BTreeMap<Section, ProbeResult>,
}

impl PriorResults {
    pub fn new(sections: BTreeMap<Section, ProbeResult>) -> Self {
        Self { sections }
    }

    pub fn get(&self, section: Section) -> Option<&ProbeResult> {
        self.sections.get(&section)
    }

    /// IPv4 and IPv6 addresses from a successful DNS section.
    ///
    /// `None` when the DNS section is missing or failed, so callers can fall
    /// back to direct resolution.
    pub fn addresses(&self) -> Option<(Vec<IpAddr>, Vec<IpAddr>)> {
        let dns = self.get(Section::DnsRecords)?.data()?;
        let parse = |key: &str| -> Vec<IpAddr> {
            dns.get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .filter_map(|s| s.parse().ok())
                        .collect()
                })
                .unwrap_or_default()
        };
        Some((parse("a_records"), parse("aaaa_records")))
    }
}

/// The standard probe set wired to the given collaborators.
pub fn default_probes(collab: &Collaborators, gate: &NetworkGate, config: &Config) -> Vec<Arc<dyn Probe>> {
    let probe_timeout = config.probe_timeout();
    // Links share the probe budget so an exhausted chain still reports as such.
    let link_timeout = probe_timeout / (collab.registration.len().max(1) as u32);
    let chain = FallbackChain::new(collab.registration.clone(), link_timeout);

    vec![
        Arc::new(DomainRegistrationProbe::new(chain, gate.clone(), probe_timeout)),
        Arc::new(DnsRecordsProbe::new(collab.dns.clone(), gate.clone(), probe_timeout)),
        Arc::new(IpEnrichmentProbe::new(collab.geo.clone(), collab.dns.clone(), gate.clone(), probe_timeout)),
        Arc::new(TlsCertificateProbe::new(collab.tls.clone(), gate.clone(), probe_timeout)),
        Arc::new(SecurityHeadersProbe::new(collab.http.clone(), gate.clone(), probe_timeout)),
        Arc::new(PortScanProbe::new(
            collab.ports.clone(),
            gate.clone(),
            config.ports.clone(),
            config.port_timeout(),
            config.port_scan_timeout(),
        )),
        Arc::new(ReachabilityProbe::new(collab.ping.clone(), gate.clone(), config.ping_timeout())),
    ]
}
