// src/lib.rs

//! OSINT reconnaissance engine: runs independent probes (registration, DNS,
//! geolocation, TLS, HTTP headers, ports, reachability) against one target
//! and aggregates their partial results into a single ordered report.

pub mod config;
pub mod core;
pub mod export;
pub mod logging;

pub use crate::config::Config;
pub use crate::core::models::{ErrorKind, ProbeResult, ReconError, Report, RunOutcome, RunState, RunSummary, Section};
pub use crate::core::orchestrator::Orchestrator;
pub use crate::core::target::Target;
