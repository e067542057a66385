// src/core/scanner/port_scanner.rs

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use super::{PriorResults, Probe};
use crate::core::models::{ErrorKind, ProbeError, ProbeResult, Section};
use crate::core::sources::{NetworkGate, PortProber, PortState};
use crate::core::target::Target;

/// Well-known service names for the default port list.
const SERVICES: &[(u16, &str)] = &[
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (143, "IMAP"),
    (443, "HTTPS"),
    (465, "SMTPS"),
    (587, "SMTP (Submission)"),
    (993, "IMAPS"),
    (995, "POP3S"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (5432, "PostgreSQL"),
    (8080, "HTTP-Alternate"),
    (8443, "HTTPS-Alternate"),
];

pub fn service_name(port: u16) -> &'static str {
    SERVICES
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, name)| *name)
        .unwrap_or("Unknown")
}

/// TCP connect scan of a fixed port list.
///
/// Results are collected until `budget` runs out. Ports that could not be
/// probed by then, typically because other probes held the gate, are
/// reported as not open instead of failing the whole section.
pub struct PortScanProbe {
    prober: Arc<dyn PortProber>,
    gate: NetworkGate,
    ports: Vec<u16>,
    connect_timeout: Duration,
    budget: Duration,
}

impl PortScanProbe {
    pub fn new(
        prober: Arc<dyn PortProber>,
        gate: NetworkGate,
        ports: Vec<u16>,
        connect_timeout: Duration,
        budget: Duration,
    ) -> Self {
        Self { prober, gate, ports, connect_timeout, budget }
    }

    async fn is_open(&self, host: &str, port: u16) -> Result<bool, ProbeError> {
        let probe = self.prober.probe(host, port, self.connect_timeout);
        match self.gate.call_with_timeout("port", self.connect_timeout, probe).await {
            Ok(state) => Ok(state == PortState::Open),
            // A connect that outlived its timeout is just a filtered port.
            Err(e) if e.kind == ErrorKind::Timeout => Ok(false),
            Err(e) => {
                debug!(host, port, error = %e, "Port probe errored, counting as not open.");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Probe for PortScanProbe {
    fn section(&self) -> Section {
        Section::PortScan
    }

    // The collection deadline always fires first.
    fn timeout(&self) -> Duration {
        self.budget + self.gate.call_timeout()
    }

    async fn run(&self, target: &Target, _prior: &PriorResults) -> ProbeResult {
        let host = target.host();
        info!(target = host, ports = self.ports.len(), "Starting port scan.");
        let deadline = Instant::now() + self.budget;
        let states = join_all(self.ports.iter().map(|port| async move {
            timeout_at(deadline, self.is_open(host, *port)).await.map_err(|_| *port)
        }))
        .await;

        let unprobed: Vec<u16> = states.iter().filter_map(|s| s.as_ref().err().copied()).collect();
        if !unprobed.is_empty() {
            warn!(count = unprobed.len(), ?unprobed, "Scan budget ran out, counting remaining ports as not open.");
        }
        let states: Vec<Result<bool, ProbeError>> = states.into_iter().map(|s| s.unwrap_or(Ok(false))).collect();

        // Every probe erroring means the scan itself could not run.
        if let Some(Err(e)) = states.last() {
            if states.iter().all(Result::is_err) {
                return ProbeResult::failed(e.kind, format!("every port probe failed: {}", e.message));
            }
        }

        let mut open_ports = Map::new();
        for (port, open) in self.ports.iter().zip(states) {
            if open.unwrap_or(false) {
                open_ports.insert(port.to_string(), Value::String(service_name(*port).to_string()));
            }
        }
        info!(open = open_ports.len(), "Port scan finished.");

        let mut section = Map::new();
        section.insert("open_ports".into(), Value::Object(open_ports));
        section.insert("ports_scanned".into(), json!(self.ports.len()));
        ProbeResult::Ok(section)
    }
}
