// src/core/orchestrator.rs

//! Drives one analysis run: every probe becomes a future that waits for the
//! sections it depends on, runs under its own timeout, then merges. Probes
//! without dependencies start immediately and run concurrently; the shared
//! `NetworkGate` inside the probes bounds the actual network load.

use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::core::aggregator::Aggregator;
use crate::core::models::{ErrorKind, ProbeError, ProbeResult, ReconError, RunOutcome, RunState, Section};
use crate::core::scanner::{default_probes, Probe};
use crate::core::sources::{Collaborators, NetworkGate};
use crate::core::target::Target;

type Merged<'a> = Shared<BoxFuture<'a, ()>>;

pub struct Orchestrator {
    probes: Vec<Arc<dyn Probe>>,
    state: Mutex<RunState>,
}

impl Orchestrator {
    pub fn new(probes: Vec<Arc<dyn Probe>>) -> Self {
        Self { probes, state: Mutex::new(RunState::Idle) }
    }

    /// The standard probe set over the given collaborators.
    pub fn with_collaborators(collab: &Collaborators, config: &Config) -> Self {
        let gate = NetworkGate::from_config(config);
        Self::new(default_probes(collab, &gate, config))
    }

    /// The standard probe set over live network sources.
    pub fn live(config: &Config) -> Result<Self, ProbeError> {
        Ok(Self::with_collaborators(&Collaborators::live(config)?, config))
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    /// Runs every probe against `input` and returns the complete report.
    ///
    /// Only an unusable target is an error; it is reported before any
    /// collaborator is touched. Everything else ends up inside the report.
    pub async fn analyze(&self, input: &str, cancel: CancellationToken) -> Result<RunOutcome, ReconError> {
        let target = Target::parse(input)?;
        *self.state.lock() = RunState::Running;
        info!(target = target.host(), probes = self.probes.len(), "Starting analysis.");

        let started = Instant::now();
        let aggregator = Aggregator::new();

        let merged = self.schedule(&target, &aggregator);
        let cancelled = tokio::select! {
            _ = join_all(merged.values().cloned()) => false,
            _ = cancel.cancelled() => true,
        };
        // Dropping the futures abandons whatever is still in flight.
        drop(merged);

        if cancelled {
            warn!(target = target.host(), "Analysis cancelled, marking unfinished sections.");
            for probe in &self.probes {
                if !aggregator.contains(probe.section()) {
                    aggregator.merge(probe.section(), ProbeResult::failed(ErrorKind::Cancelled, "analysis cancelled"));
                }
            }
        }
        for section in Section::probe_sections() {
            if !aggregator.contains(section) {
                aggregator.merge(section, ProbeResult::failed(ErrorKind::NotFound, "no probe registered"));
            }
        }

        let (report, summary) = aggregator.finalize(&target, started.elapsed());
        *self.state.lock() = summary.state;
        info!(summary = %summary, elapsed_ms = started.elapsed().as_millis() as u64, "Analysis finished.");
        Ok(RunOutcome { report, summary })
    }

    /// Builds one shared future per probe, in an order where every
    /// dependency's future already exists when its dependents are built.
    fn schedule<'a>(&'a self, target: &'a Target, aggregator: &'a Aggregator) -> HashMap<Section, Merged<'a>> {
        let registered: Vec<Section> = self.probes.iter().map(|p| p.section()).collect();
        let mut merged: HashMap<Section, Merged<'a>> = HashMap::new();
        let mut pending: Vec<&Arc<dyn Probe>> = self.probes.iter().collect();

        while !pending.is_empty() {
            let ready = |probe: &&Arc<dyn Probe>| {
                probe
                    .depends_on()
                    .iter()
                    .all(|dep| merged.contains_key(dep) || !registered.contains(dep))
            };
            let (mut now, later): (Vec<_>, Vec<_>) = pending.into_iter().partition(ready);
            pending = later;
            // A dependency cycle: run the rest without waiting.
            if now.is_empty() {
                error!(probes = pending.len(), "Unsatisfiable probe dependencies, running without ordering.");
                now = std::mem::take(&mut pending);
            }

            for probe in now {
                let deps: Vec<Merged<'a>> = probe
                    .depends_on()
                    .iter()
                    .filter_map(|dep| merged.get(dep).cloned())
                    .collect();
                let future = run_probe(probe.clone(), deps, target, aggregator).boxed().shared();
                merged.insert(probe.section(), future);
            }
        }
        merged
    }
}

async fn run_probe<'a>(probe: Arc<dyn Probe>, deps: Vec<Merged<'a>>, target: &'a Target, aggregator: &'a Aggregator) {
    let section = probe.section();
    if !deps.is_empty() {
        debug!(section = %section, "Waiting for dependencies.");
        join_all(deps).await;
    }

    let prior = aggregator.snapshot();
    let limit = probe.timeout();
    debug!(section = %section, timeout_ms = limit.as_millis() as u64, "Probe started.");
    let run = AssertUnwindSafe(probe.run(target, &prior)).catch_unwind();

    let result = match tokio::time::timeout(limit, run).await {
        Ok(Ok(result)) => result,
        Ok(Err(panic)) => {
            let message = panic_message(panic.as_ref());
            error!(section = %section, panic = %message, "Probe panicked!");
            ProbeResult::failed(ErrorKind::Internal, format!("probe panicked: {message}"))
        }
        Err(_) => {
            warn!(section = %section, timeout_ms = limit.as_millis() as u64, "Probe timed out.");
            ProbeResult::failed(ErrorKind::Timeout, format!("{section} timed out after {}s", limit.as_secs_f64()))
        }
    };
    aggregator.merge(section, result);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
