// src/core/scanner/ping_scanner.rs

use async_trait::async_trait;
use serde_json::{json, Map};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::{PriorResults, Probe};
use crate::core::models::{ProbeResult, Section};
use crate::core::sources::{NetworkGate, Pinger};
use crate::core::target::Target;

/// ICMP reachability through the OS ping tool.
pub struct ReachabilityProbe {
    pinger: Arc<dyn Pinger>,
    gate: NetworkGate,
    ping_timeout: Duration,
}

impl ReachabilityProbe {
    pub fn new(pinger: Arc<dyn Pinger>, gate: NetworkGate, ping_timeout: Duration) -> Self {
        Self { pinger, gate, ping_timeout }
    }
}

#[async_trait]
impl Probe for ReachabilityProbe {
    fn section(&self) -> Section {
        Section::Reachability
    }

    // Leaves room to queue for a gate permit.
    fn timeout(&self) -> Duration {
        self.ping_timeout + self.gate.call_timeout()
    }

    async fn run(&self, target: &Target, _prior: &PriorResults) -> ProbeResult {
        info!(target = target.host(), "Starting ping test.");
        let output = match self
            .gate
            .call_with_timeout("ping", self.ping_timeout, self.pinger.ping(target.host()))
            .await
        {
            Ok(output) => output,
            Err(e) => return e.into(),
        };

        let reachable = output.exit_code == Some(0);
        info!(reachable, exit_code = ?output.exit_code, "Ping test finished.");

        let mut section = Map::new();
        section.insert("ping_test".into(), json!(output.text));
        section.insert("reachable".into(), json!(reachable));
        section.insert("exit_code".into(), json!(output.exit_code));
        ProbeResult::Ok(section)
    }
}
