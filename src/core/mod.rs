// src/core/mod.rs

// The analysis engine. Nothing in here knows about the terminal front-end.

/// Sections, probe results, errors and the aggregated report.
pub mod models;

/// Input normalization.
pub mod target;

/// Nested report to ordered key/value pairs.
pub mod flatten;

/// External data sources and the shared network gate.
pub mod sources;

/// The probes and the fallback chain.
pub mod scanner;

/// Thread-safe collection of section results into the final report.
pub mod aggregator;

/// Dependency-ordered, cancellable execution of a full run.
pub mod orchestrator;
