// src/core/aggregator.rs

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

use crate::core::models::{ProbeResult, Report, RunSummary, Section};
use crate::core::scanner::PriorResults;
use crate::core::target::Target;

/// Owns the in-progress report of one run.
///
/// Probes write disjoint sections concurrently; the lock is held only for
/// the duration of a single insert or snapshot.
#[derive(Debug, Default)]
pub struct Aggregator {
    report: Mutex<Report>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a probe outcome under its section. Last write wins.
    pub fn merge(&self, section: Section, result: ProbeResult) {
        debug!(section = %section, ok = result.is_ok(), "Merging section.");
        self.report.lock().insert(section, result);
    }

    pub fn contains(&self, section: Section) -> bool {
        self.report.lock().contains(section)
    }

    /// Read-only copy of what has been merged so far.
    pub fn snapshot(&self) -> PriorResults {
        let report = self.report.lock();
        PriorResults::new(report.iter().map(|(section, result)| (section, result.clone())).collect())
    }

    /// Appends `metadata` and hands back the finished report and its summary.
    pub fn finalize(self, target: &Target, elapsed: Duration) -> (Report, RunSummary) {
        let mut report = self.report.into_inner();
        let summary = report.summary();

        let failed: Map<String, Value> = summary
            .failed
            .iter()
            .map(|(section, kind)| (section.to_string(), json!(kind.as_ref())))
            .collect();

        let mut metadata = Map::new();
        metadata.insert("scan_date".into(), json!(Utc::now().to_rfc3339()));
        metadata.insert("target".into(), json!(target.raw()));
        metadata.insert("domain".into(), json!(target.host()));
        metadata.insert("base_url".into(), json!(target.base_url().as_str()));
        metadata.insert("scan_duration".into(), json!(elapsed.as_secs_f64()));
        metadata.insert("state".into(), json!(summary.state.as_ref()));
        metadata.insert("sections_succeeded".into(), json!(summary.succeeded.len()));
        metadata.insert("sections_failed".into(), json!(summary.failed.len()));
        metadata.insert("failed_sections".into(), Value::Object(failed));

        report.insert(Section::Metadata, ProbeResult::Ok(metadata));
        (report, summary)
    }
}
