// src/core/scanner/ip_scanner.rs

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{json, Map, Value};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{PriorResults, Probe};
use crate::core::models::{error_marker, ErrorKind, ProbeResult, Section};
use crate::core::sources::{DnsLookup, GeoLocator, NetworkGate};
use crate::core::target::Target;

/// Geolocation and reverse DNS for every address of the target.
pub struct IpEnrichmentProbe {
    geo: Arc<dyn GeoLocator>,
    dns: Arc<dyn DnsLookup>,
    gate: NetworkGate,
    timeout: Duration,
}

impl IpEnrichmentProbe {
    pub fn new(geo: Arc<dyn GeoLocator>, dns: Arc<dyn DnsLookup>, gate: NetworkGate, timeout: Duration) -> Self {
        Self { geo, dns, gate, timeout }
    }

    /// Addresses from the DNS section, or from direct resolution when that is unusable.
    async fn addresses(&self, target: &Target, prior: &PriorResults) -> (Vec<IpAddr>, Vec<IpAddr>) {
        if let Some(addresses) = prior.addresses() {
            return addresses;
        }
        if let Some(ip) = target.ip() {
            return split(vec![ip]);
        }
        debug!(target = target.host(), "No usable DNS section, resolving directly.");
        match self.gate.call("resolve", self.dns.resolve(target.host())).await {
            Ok(ips) => split(ips),
            Err(e) => {
                warn!(target = target.host(), error = %e, "Direct resolution failed.");
                (Vec::new(), Vec::new())
            }
        }
    }

    async fn enrich(&self, ip: IpAddr) -> Value {
        let (geo, ptr) = tokio::join!(
            self.gate.call("geolocation", self.geo.locate(ip)),
            self.gate.call("reverse dns", self.dns.reverse(ip)),
        );
        match geo {
            Ok(fields) => {
                let mut record = Map::new();
                record.insert("ip".into(), json!(ip.to_string()));
                record.extend(fields.into_iter().filter(|(key, _)| key != "ip"));
                record.insert("reverse_dns".into(), ptr.map_or(Value::Null, Value::String));
                Value::Object(record)
            }
            Err(e) => {
                warn!(%ip, error = %e, "Geolocation failed for address.");
                let mut record = Map::new();
                record.insert("ip".into(), json!(ip.to_string()));
                if let Value::Object(marker) = error_marker(&e.message) {
                    record.extend(marker);
                }
                Value::Object(record)
            }
        }
    }
}

fn split(ips: Vec<IpAddr>) -> (Vec<IpAddr>, Vec<IpAddr>) {
    ips.into_iter().partition(IpAddr::is_ipv4)
}

#[async_trait]
impl Probe for IpEnrichmentProbe {
    fn section(&self) -> Section {
        Section::IpEnrichment
    }

    fn depends_on(&self) -> &[Section] {
        &[Section::DnsRecords]
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self, target: &Target, prior: &PriorResults) -> ProbeResult {
        let (v4, v6) = self.addresses(target, prior).await;
        if v4.is_empty() && v6.is_empty() {
            return ProbeResult::failed(ErrorKind::NotFound, format!("no addresses found for {}", target.host()));
        }
        info!(target = target.host(), ipv4 = v4.len(), ipv6 = v6.len(), "Starting IP enrichment.");

        let details = join_all(v4.iter().chain(v6.iter()).map(|ip| self.enrich(*ip))).await;

        let render = |ips: &[IpAddr]| -> Vec<String> { ips.iter().map(IpAddr::to_string).collect() };
        let mut section = Map::new();
        section.insert("ip_addresses".into(), json!({ "ipv4": render(&v4), "ipv6": render(&v6) }));
        section.insert("ip_details".into(), Value::Array(details));
        info!("IP enrichment finished.");
        ProbeResult::Ok(section)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{ProbeError, SectionData};
    use crate::core::sources::RecordKind;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Resolver {
        resolved: Vec<IpAddr>,
        resolve_calls: AtomicUsize,
    }

    #[async_trait]
    impl DnsLookup for Resolver {
        async fn lookup(&self, _host: &str, kind: RecordKind) -> Result<Vec<String>, ProbeError> {
            Err(ProbeError::unreachable(format!("{kind} not scripted")))
        }

        async fn reverse(&self, _ip: IpAddr) -> Result<String, ProbeError> {
            Ok("edge.example.net".to_string())
        }

        async fn resolve(&self, _host: &str) -> Result<Vec<IpAddr>, ProbeError> {
            self.resolve_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.resolved.clone())
        }
    }

    struct Country;

    #[async_trait]
    impl GeoLocator for Country {
        async fn locate(&self, _ip: IpAddr) -> Result<SectionData, ProbeError> {
            Ok(json!({"country": "Netherlands"}).as_object().cloned().unwrap_or_default())
        }
    }

    fn enrichment(resolver: Arc<Resolver>) -> IpEnrichmentProbe {
        IpEnrichmentProbe::new(
            Arc::new(Country),
            resolver,
            NetworkGate::new(4, Duration::from_secs(1)),
            Duration::from_secs(5),
        )
    }

    fn resolver(ips: &[&str]) -> Arc<Resolver> {
        Arc::new(Resolver {
            resolved: ips.iter().map(|ip| ip.parse().unwrap()).collect(),
            resolve_calls: AtomicUsize::new(0),
        })
    }

    fn prior(dns: ProbeResult) -> PriorResults {
        let mut sections = BTreeMap::new();
        sections.insert(Section::DnsRecords, dns);
        PriorResults::new(sections)
    }

    #[tokio::test]
    async fn failed_dns_section_falls_back_to_direct_resolution() {
        let resolver = resolver(&["198.51.100.7", "2001:db8::7"]);
        let target = Target::parse("example.com").unwrap();
        let result = enrichment(resolver.clone())
            .run(&target, &prior(ProbeResult::failed(ErrorKind::Timeout, "dns timed out")))
            .await;

        assert_eq!(resolver.resolve_calls.load(Ordering::SeqCst), 1);
        let data = result.data().unwrap();
        assert_eq!(data["ip_addresses"], json!({"ipv4": ["198.51.100.7"], "ipv6": ["2001:db8::7"]}));
        assert_eq!(data["ip_details"][0]["country"], json!("Netherlands"));
        assert_eq!(data["ip_details"][1]["reverse_dns"], json!("edge.example.net"));
    }

    #[tokio::test]
    async fn dns_section_addresses_skip_resolution() {
        let resolver = resolver(&["198.51.100.7"]);
        let dns = json!({"a_records": ["203.0.113.9"], "aaaa_records": [], "mx_records": [], "txt_records": []});
        let target = Target::parse("example.com").unwrap();
        let result = enrichment(resolver.clone())
            .run(&target, &prior(ProbeResult::Ok(dns.as_object().cloned().unwrap())))
            .await;

        assert_eq!(resolver.resolve_calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.data().unwrap()["ip_details"][0]["ip"], json!("203.0.113.9"));
    }

    #[tokio::test]
    async fn no_addresses_at_all_is_not_found() {
        let target = Target::parse("example.com").unwrap();
        let result = enrichment(resolver(&[]))
            .run(&target, &prior(ProbeResult::failed(ErrorKind::Unreachable, "dns down")))
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::NotFound));
    }
}
