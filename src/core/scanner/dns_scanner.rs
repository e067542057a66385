// src/core/scanner/dns_scanner.rs

use async_trait::async_trait;
use serde_json::{json, Map};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{PriorResults, Probe};
use crate::core::models::{ErrorKind, ProbeError, ProbeResult, Section};
use crate::core::sources::{DnsLookup, NetworkGate, RecordKind};
use crate::core::target::Target;

/// A, AAAA, MX and TXT records of the target host.
pub struct DnsRecordsProbe {
    dns: Arc<dyn DnsLookup>,
    gate: NetworkGate,
    timeout: Duration,
}

impl DnsRecordsProbe {
    pub fn new(dns: Arc<dyn DnsLookup>, gate: NetworkGate, timeout: Duration) -> Self {
        Self { dns, gate, timeout }
    }

    /// Records of one type. An absent type is an empty list, not an error.
    async fn records(&self, host: &str, kind: RecordKind) -> Result<Vec<String>, ProbeError> {
        let what = format!("dns {kind}");
        match self.gate.call(&what, self.dns.lookup(host, kind)).await {
            Ok(records) => Ok(records),
            Err(e) if e.kind == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => {
                warn!(host, record = %kind, error = %e, "Lookup failed, recording no records.");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Probe for DnsRecordsProbe {
    fn section(&self) -> Section {
        Section::DnsRecords
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self, target: &Target, _prior: &PriorResults) -> ProbeResult {
        let mut section = Map::new();

        // An IP literal is its own address record.
        if let Some(ip) = target.ip() {
            debug!(%ip, "Target is an IP literal, skipping DNS lookups.");
            let (v4, v6): (Vec<String>, Vec<String>) = match ip {
                IpAddr::V4(_) => (vec![ip.to_string()], Vec::new()),
                IpAddr::V6(_) => (Vec::new(), vec![ip.to_string()]),
            };
            section.insert("a_records".into(), json!(v4));
            section.insert("aaaa_records".into(), json!(v6));
            section.insert("mx_records".into(), json!([]));
            section.insert("txt_records".into(), json!([]));
            return ProbeResult::Ok(section);
        }

        let host = target.host();
        info!(target = host, "Starting DNS scan.");
        let (a, aaaa, mx, txt) = tokio::join!(
            self.records(host, RecordKind::A),
            self.records(host, RecordKind::Aaaa),
            self.records(host, RecordKind::Mx),
            self.records(host, RecordKind::Txt),
        );

        // Only a resolver that failed every query fails the section.
        if let (Err(e), Err(_), Err(_), Err(_)) = (&a, &aaaa, &mx, &txt) {
            return ProbeResult::failed(e.kind, format!("every DNS lookup failed: {}", e.message));
        }
        let lists = [("a_records", a), ("aaaa_records", aaaa), ("mx_records", mx), ("txt_records", txt)];
        for (key, records) in lists {
            section.insert(key.into(), json!(records.unwrap_or_default()));
        }
        info!(
            a = ?section.get("a_records").and_then(|v| v.as_array()).map(Vec::len),
            "DNS scan finished."
        );
        ProbeResult::Ok(section)
    }
}
