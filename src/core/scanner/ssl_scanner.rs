// src/core/scanner/ssl_scanner.rs

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use super::{PriorResults, Probe};
use crate::core::models::{ProbeResult, Section};
use crate::core::sources::{CertificateSource, NetworkGate};
use crate::core::target::Target;

const TLS_PORT: u16 = 443;

pub struct TlsCertificateProbe {
    tls: Arc<dyn CertificateSource>,
    gate: NetworkGate,
    timeout: Duration,
}

impl TlsCertificateProbe {
    pub fn new(tls: Arc<dyn CertificateSource>, gate: NetworkGate, timeout: Duration) -> Self {
        Self { tls, gate, timeout }
    }
}

#[async_trait]
impl Probe for TlsCertificateProbe {
    fn section(&self) -> Section {
        Section::TlsCertificate
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self, target: &Target, _prior: &PriorResults) -> ProbeResult {
        info!(target = target.host(), "Starting SSL/TLS scan.");
        match self.gate.call("tls", self.tls.fetch(target.host(), TLS_PORT)).await {
            Ok(section) => {
                info!(
                    verified = ?section.get("verified"),
                    days_until_expiry = ?section.get("days_until_expiry"),
                    "SSL/TLS scan finished."
                );
                ProbeResult::Ok(section)
            }
            Err(e) => {
                error!(target = target.host(), error = %e, "SSL/TLS scan failed.");
                e.into()
            }
        }
    }
}
