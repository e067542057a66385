// src/core/models.rs

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};
use thiserror::Error;

use crate::core::flatten::{FlatRecord, Flattener};

// --- Reusable Section Types ---

/// The body of a successful section: an insertion-ordered map of nestable values.
pub type SectionData = Map<String, Value>;

/// The fixed set of report sections, in declared (dependency) order.
///
/// The derived `Ord` follows declaration order, which is what keeps the
/// exported report stable no matter which concurrent probe finished first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr, EnumIter)]
pub enum Section {
    #[strum(serialize = "domain_info")]
    DomainRegistration,
    #[strum(serialize = "dns_info")]
    DnsRecords,
    #[strum(serialize = "geolocation_info")]
    IpEnrichment,
    #[strum(serialize = "ssl_info")]
    TlsCertificate,
    #[strum(serialize = "security_info")]
    SecurityHeaders,
    #[strum(serialize = "ports_info")]
    PortScan,
    #[strum(serialize = "ping_info")]
    Reachability,
    #[strum(serialize = "metadata")]
    Metadata,
}

impl Section {
    /// Every section filled by a probe, i.e. all of them except `metadata`.
    pub fn probe_sections() -> impl Iterator<Item = Section> {
        Section::iter().filter(|s| *s != Section::Metadata)
    }
}

// --- Errors ---

/// Classification of a probe failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize)]
pub enum ErrorKind {
    NotFound,
    Timeout,
    Unreachable,
    ParseError,
    AllSourcesExhausted,
    InvalidTarget,
    Cancelled,
    Internal,
}

/// The error every collaborator returns. Probes fold it into `ProbeResult::Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ProbeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ProbeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unreachable, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseError, message)
    }
}

/// Crate-level error. Of these, only `InvalidTarget` can come out of an analysis run.
#[derive(Debug, Error)]
pub enum ReconError {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

// --- Probe Result ---

/// What a probe hands back: either its section body or a classified failure.
///
/// A `Failed` result carries no partial data. A probe that satisfied part of
/// its contract returns `Ok` with an embedded `{"error": ...}` marker instead.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeResult {
    Ok(SectionData),
    Failed { kind: ErrorKind, message: String },
}

impl ProbeResult {
    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        ProbeResult::Failed { kind, message: message.into() }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ProbeResult::Ok(_))
    }

    pub fn data(&self) -> Option<&SectionData> {
        match self {
            ProbeResult::Ok(data) => Some(data),
            ProbeResult::Failed { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ProbeResult::Ok(_) => None,
            ProbeResult::Failed { kind, .. } => Some(*kind),
        }
    }

    /// The exported shape: the section body, or `{"error": message}`.
    pub fn to_value(&self) -> Value {
        match self {
            ProbeResult::Ok(data) => Value::Object(data.clone()),
            ProbeResult::Failed { message, .. } => error_marker(message),
        }
    }
}

impl From<ProbeError> for ProbeResult {
    fn from(err: ProbeError) -> Self {
        ProbeResult::Failed { kind: err.kind, message: err.message }
    }
}

impl From<Result<SectionData, ProbeError>> for ProbeResult {
    fn from(result: Result<SectionData, ProbeError>) -> Self {
        match result {
            Ok(data) => ProbeResult::Ok(data),
            Err(err) => err.into(),
        }
    }
}

impl Serialize for ProbeResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// `{"error": message}`, the marker used both for failed sections and failed sub-items.
pub fn error_marker(message: &str) -> Value {
    let mut map = Map::new();
    map.insert("error".to_string(), Value::String(message.to_string()));
    Value::Object(map)
}

// --- Report ---

/// Terminal and intermediate states of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    PartiallyFailed,
}

/// The aggregated, section-keyed result of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    sections: BTreeMap<Section, ProbeResult>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, section: Section, result: ProbeResult) {
        self.sections.insert(section, result);
    }

    pub fn get(&self, section: Section) -> Option<&ProbeResult> {
        self.sections.get(&section)
    }

    pub fn contains(&self, section: Section) -> bool {
        self.sections.contains_key(&section)
    }

    /// Sections in declared order.
    pub fn iter(&self) -> impl Iterator<Item = (Section, &ProbeResult)> {
        self.sections.iter().map(|(section, result)| (*section, result))
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// The nested interchange document.
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .iter()
            .map(|(section, result)| (section.to_string(), result.to_value()))
            .collect();
        Value::Object(map)
    }

    /// Tabular projection using the given flattener.
    pub fn flatten_with(&self, flattener: &Flattener) -> FlatRecord {
        flattener.flatten(&self.to_value())
    }

    /// Tabular projection with the default `_` separator.
    pub fn flatten(&self) -> FlatRecord {
        self.flatten_with(&Flattener::default())
    }

    /// Succeeded/failed breakdown over the probe sections (metadata excluded).
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for (section, result) in self.iter().filter(|(s, _)| *s != Section::Metadata) {
            match result.error_kind() {
                None => summary.succeeded.push(section),
                Some(kind) => summary.failed.push((section, kind)),
            }
        }
        summary.state = if summary.failed.is_empty() {
            RunState::Completed
        } else {
            RunState::PartiallyFailed
        };
        summary
    }
}

impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Completeness summary a consumer can read without looking at section bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub state: RunState,
    pub succeeded: Vec<Section>,
    pub failed: Vec<(Section, ErrorKind)>,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self { state: RunState::Idle, succeeded: Vec::new(), failed: Vec::new() }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} succeeded, {} failed",
            self.state,
            self.succeeded.len(),
            self.failed.len()
        )
    }
}

/// What `Orchestrator::analyze` returns.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: Report,
    pub summary: RunSummary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn section(value: Value) -> SectionData {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn section_names_follow_declared_order() {
        let names: Vec<String> = Section::iter().map(|s| s.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "domain_info",
                "dns_info",
                "geolocation_info",
                "ssl_info",
                "security_info",
                "ports_info",
                "ping_info",
                "metadata"
            ]
        );
        assert_eq!(Section::probe_sections().count(), 7);
    }

    #[test]
    fn failed_result_serializes_as_error_marker() {
        let result = ProbeResult::failed(ErrorKind::Timeout, "took too long");
        assert_eq!(serde_json::to_value(&result).unwrap(), json!({"error": "took too long"}));
    }

    #[test]
    fn report_serializes_in_section_order_regardless_of_insert_order() {
        let mut report = Report::new();
        report.insert(Section::PortScan, ProbeResult::Ok(section(json!({"ports_scanned": 1}))));
        report.insert(Section::DomainRegistration, ProbeResult::failed(ErrorKind::NotFound, "none"));
        let keys: Vec<String> = report.to_value().as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["domain_info", "ports_info"]);
    }

    #[test]
    fn summary_counts_metadata_out() {
        let mut report = Report::new();
        report.insert(Section::DnsRecords, ProbeResult::Ok(section(json!({"a_records": []}))));
        report.insert(Section::TlsCertificate, ProbeResult::failed(ErrorKind::Unreachable, "refused"));
        report.insert(Section::Metadata, ProbeResult::Ok(section(json!({"target": "x"}))));
        let summary = report.summary();
        assert_eq!(summary.succeeded, vec![Section::DnsRecords]);
        assert_eq!(summary.failed, vec![(Section::TlsCertificate, ErrorKind::Unreachable)]);
        assert_eq!(summary.state, RunState::PartiallyFailed);
    }

    #[test]
    fn probe_error_converts_to_failed() {
        let result: ProbeResult = Err::<SectionData, _>(ProbeError::parse("bad json")).into();
        assert_eq!(result.error_kind(), Some(ErrorKind::ParseError));
        assert!(result.data().is_none());
    }
}
