// src/core/scanner/registration_scanner.rs

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use super::fallback::FallbackChain;
use super::{PriorResults, Probe};
use crate::core::models::{ErrorKind, ProbeResult, Section};
use crate::core::sources::NetworkGate;
use crate::core::target::Target;

/// Registration data (registrar, dates, name servers, contacts) through a
/// chain of RDAP, WHOIS and a remote lookup service.
pub struct DomainRegistrationProbe {
    chain: FallbackChain,
    gate: NetworkGate,
    timeout: Duration,
}

impl DomainRegistrationProbe {
    pub fn new(chain: FallbackChain, gate: NetworkGate, timeout: Duration) -> Self {
        Self { chain, gate, timeout }
    }
}

#[async_trait]
impl Probe for DomainRegistrationProbe {
    fn section(&self) -> Section {
        Section::DomainRegistration
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self, target: &Target, _prior: &PriorResults) -> ProbeResult {
        if target.registrable_domain().is_none() {
            return ProbeResult::failed(
                ErrorKind::NotFound,
                format!("{} has no registrable domain", target.host()),
            );
        }
        info!(target = target.host(), sources = self.chain.len(), "Starting registration lookup.");
        let result = self.chain.run(target, &self.gate).await;
        info!(ok = result.is_ok(), "Registration lookup finished.");
        result
    }
}
