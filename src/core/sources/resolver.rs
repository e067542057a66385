// src/core/sources/resolver.rs

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, warn};

use super::{DnsLookup, RecordKind};
use crate::core::models::ProbeError;

/// DNS collaborator backed by a Tokio-based asynchronous hickory resolver.
pub struct HickoryLookup {
    resolver: TokioAsyncResolver,
}

impl HickoryLookup {
    pub fn new(timeout: Duration) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        // Retries are a chain-level concern, not a connection-level one.
        opts.attempts = 1;
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), opts),
        }
    }
}

fn record_type(kind: RecordKind) -> RecordType {
    match kind {
        RecordKind::A => RecordType::A,
        RecordKind::Aaaa => RecordType::AAAA,
        RecordKind::Mx => RecordType::MX,
        RecordKind::Txt => RecordType::TXT,
    }
}

fn classify(err: &ResolveError, what: &str) -> ProbeError {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => ProbeError::not_found(format!("{what}: no records")),
        ResolveErrorKind::Timeout => ProbeError::timeout(format!("{what}: DNS timeout")),
        _ => ProbeError::unreachable(format!("{what}: DNS Error: {}", err)),
    }
}

#[async_trait]
impl DnsLookup for HickoryLookup {
    async fn lookup(&self, host: &str, kind: RecordKind) -> Result<Vec<String>, ProbeError> {
        debug!(host, record = %kind, "Looking up DNS records.");
        match self.resolver.lookup(host, record_type(kind)).await {
            Ok(lookup) => {
                let records: Vec<String> = lookup.iter().map(|r| r.to_string()).collect();
                debug!(host, record = %kind, count = records.len(), "DNS records found.");
                Ok(records)
            }
            Err(e) => {
                warn!(host, record = %kind, error = %e, "DNS lookup failed.");
                Err(classify(&e, &format!("{kind} {host}")))
            }
        }
    }

    async fn reverse(&self, ip: IpAddr) -> Result<String, ProbeError> {
        debug!(%ip, "Looking up PTR record.");
        let lookup = self
            .resolver
            .reverse_lookup(ip)
            .await
            .map_err(|e| classify(&e, &format!("PTR {ip}")))?;
        lookup
            .iter()
            .next()
            .map(|name| name.to_string().trim_end_matches('.').to_string())
            .ok_or_else(|| ProbeError::not_found(format!("PTR {ip}: no records")))
    }

    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ProbeError> {
        debug!(host, "Resolving host addresses.");
        let lookup = self
            .resolver
            .lookup_ip(host)
            .await
            .map_err(|e| classify(&e, &format!("address {host}")))?;
        Ok(lookup.iter().collect())
    }
}
