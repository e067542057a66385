// tests/orchestrator.rs

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strum::IntoEnumIterator;
use tokio_util::sync::CancellationToken;

use vanguard_recon::core::models::{ProbeError, SectionData};
use vanguard_recon::core::scanner::fallback::ChainLink;
use vanguard_recon::core::scanner::{PriorResults, Probe};
use vanguard_recon::core::sources::{
    CertificateSource, Collaborators, DnsLookup, GeoLocator, HttpFetcher, HttpResponse, PingOutput, Pinger,
    PortProber, PortState, RecordKind,
};
use vanguard_recon::{Config, ErrorKind, Orchestrator, ProbeResult, ReconError, RunState, Section, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Succeed,
    Fail,
    Hang,
}

/// One fake standing in for every external source.
struct Fake {
    mode: Mode,
    calls: Arc<AtomicUsize>,
}

impl Fake {
    async fn answer<T>(&self, value: T) -> Result<T, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            Mode::Succeed => Ok(value),
            Mode::Fail => Err(ProbeError::unreachable("fake source is down")),
            Mode::Hang => std::future::pending().await,
        }
    }
}

fn object(value: Value) -> SectionData {
    value.as_object().cloned().unwrap_or_default()
}

#[async_trait]
impl ChainLink for Fake {
    fn name(&self) -> &str {
        "fake-registry"
    }

    async fn attempt(&self, _target: &Target) -> Result<SectionData, ProbeError> {
        self.answer(object(json!({"registrar": "Fake Registrar", "name_servers": ["ns1.example.com"]})))
            .await
    }
}

#[async_trait]
impl DnsLookup for Fake {
    async fn lookup(&self, _host: &str, kind: RecordKind) -> Result<Vec<String>, ProbeError> {
        let records = match kind {
            RecordKind::A => vec!["93.184.216.34".to_string()],
            RecordKind::Aaaa => Vec::new(),
            RecordKind::Mx => vec!["10 mail.example.com.".to_string()],
            RecordKind::Txt => vec!["v=spf1 -all".to_string()],
        };
        self.answer(records).await
    }

    async fn reverse(&self, _ip: IpAddr) -> Result<String, ProbeError> {
        self.answer("edge.example.net".to_string()).await
    }

    async fn resolve(&self, _host: &str) -> Result<Vec<IpAddr>, ProbeError> {
        self.answer(vec!["93.184.216.34".parse().unwrap()]).await
    }
}

#[async_trait]
impl GeoLocator for Fake {
    async fn locate(&self, _ip: IpAddr) -> Result<SectionData, ProbeError> {
        self.answer(object(json!({"country": "United States", "city": "Norwell"}))).await
    }
}

#[async_trait]
impl CertificateSource for Fake {
    async fn fetch(&self, _host: &str, _port: u16) -> Result<SectionData, ProbeError> {
        self.answer(object(json!({"issuer": {"commonName": "Fake CA"}, "san": ["DNS:example.com"], "verified": true})))
            .await
    }
}

#[async_trait]
impl HttpFetcher for Fake {
    async fn get(&self, url: &str) -> Result<HttpResponse, ProbeError> {
        self.answer(HttpResponse {
            status: 200,
            final_url: url.to_string(),
            headers: vec![("server".into(), "fake".into()), ("x-frame-options".into(), "DENY".into())],
            body: "<html><head><title>Fake</title></head></html>".into(),
        })
        .await
    }
}

#[async_trait]
impl PortProber for Fake {
    async fn probe(&self, _host: &str, port: u16, _timeout: Duration) -> Result<PortState, ProbeError> {
        self.answer(if port == 443 { PortState::Open } else { PortState::Closed }).await
    }
}

#[async_trait]
impl Pinger for Fake {
    async fn ping(&self, _host: &str) -> Result<PingOutput, ProbeError> {
        self.answer(PingOutput { exit_code: Some(0), text: "1 packets transmitted, 1 received".into() }).await
    }
}

/// Geolocation that always fails, for the degraded-result scenario.
struct DownGeo;

#[async_trait]
impl GeoLocator for DownGeo {
    async fn locate(&self, _ip: IpAddr) -> Result<SectionData, ProbeError> {
        Err(ProbeError::unreachable("geolocation service unavailable"))
    }
}

fn collaborators(mode: Mode, calls: &Arc<AtomicUsize>) -> Collaborators {
    let fake = Arc::new(Fake { mode, calls: calls.clone() });
    Collaborators {
        registration: vec![fake.clone()],
        dns: fake.clone(),
        geo: fake.clone(),
        tls: fake.clone(),
        http: fake.clone(),
        ports: fake.clone(),
        ping: fake,
    }
}

fn fast_config() -> Config {
    Config {
        workers: 4,
        network_timeout_secs: 1,
        probe_timeout_secs: 1,
        port_timeout_ms: 100,
        ping_timeout_secs: 1,
        ports: vec![80, 443],
        ..Config::default()
    }
}

fn section_names() -> Vec<String> {
    Section::iter().map(|s| s.to_string()).collect()
}

fn kind_of(outcome: &vanguard_recon::RunOutcome, section: Section) -> Option<ErrorKind> {
    outcome.report.get(section).and_then(ProbeResult::error_kind)
}

#[tokio::test]
async fn completed_run_has_every_section_in_declared_order() {
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = Orchestrator::with_collaborators(&collaborators(Mode::Succeed, &calls), &fast_config());

    let outcome = orchestrator.analyze("https://Example.com/login", CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.summary.state, RunState::Completed);
    assert_eq!(orchestrator.state(), RunState::Completed);
    let value = outcome.report.to_value();
    let keys: Vec<String> = value.as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys, section_names());

    assert_eq!(value["domain_info"]["registrar"], json!("Fake Registrar"));
    assert_eq!(value["dns_info"]["a_records"], json!(["93.184.216.34"]));
    assert_eq!(value["ports_info"]["open_ports"], json!({"443": "HTTPS"}));
    assert_eq!(value["ping_info"]["reachable"], json!(true));
    assert_eq!(value["security_info"]["headers"]["X-Frame-Options"], json!("DENY"));
    assert_eq!(value["metadata"]["domain"], json!("example.com"));

    // IP enrichment ran after DNS and used its addresses.
    let details = value["geolocation_info"]["ip_details"].as_array().unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0]["ip"], json!("93.184.216.34"));
    assert_eq!(details[0]["reverse_dns"], json!("edge.example.net"));

    assert_eq!(outcome.report.flatten(), outcome.report.flatten());
}

#[tokio::test]
async fn every_source_failing_still_terminates_with_a_total_report() {
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = Orchestrator::with_collaborators(&collaborators(Mode::Fail, &calls), &fast_config());

    let outcome = orchestrator.analyze("example.com", CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.summary.state, RunState::PartiallyFailed);
    for section in Section::probe_sections() {
        assert!(kind_of(&outcome, section).is_some(), "{section} should have failed");
    }
    assert_eq!(kind_of(&outcome, Section::DomainRegistration), Some(ErrorKind::AllSourcesExhausted));
    let keys: Vec<String> = outcome.report.to_value().as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys, section_names());
    assert!(calls.load(Ordering::SeqCst) > 0);
}

#[tokio::test]
async fn failed_geolocation_degrades_only_that_address() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut collab = collaborators(Mode::Succeed, &calls);
    collab.geo = Arc::new(DownGeo);
    let orchestrator = Orchestrator::with_collaborators(&collab, &fast_config());

    let outcome = orchestrator.analyze("example.com", CancellationToken::new()).await.unwrap();

    let geo = outcome.report.get(Section::IpEnrichment).unwrap();
    assert!(geo.is_ok());
    assert_eq!(
        geo.data().unwrap()["ip_details"],
        json!([{"ip": "93.184.216.34", "error": "geolocation service unavailable"}])
    );
    assert_eq!(outcome.summary.state, RunState::Completed);
}

#[tokio::test]
async fn empty_input_is_rejected_before_any_call() {
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = Orchestrator::with_collaborators(&collaborators(Mode::Succeed, &calls), &fast_config());

    let result = orchestrator.analyze("   ", CancellationToken::new()).await;

    assert!(matches!(result, Err(ReconError::InvalidTarget(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(orchestrator.state(), RunState::Idle);
}

#[tokio::test]
async fn hanging_sources_are_bounded_by_probe_timeouts() {
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = Orchestrator::with_collaborators(&collaborators(Mode::Hang, &calls), &fast_config());

    let started = Instant::now();
    let outcome = orchestrator.analyze("example.com", CancellationToken::new()).await.unwrap();

    // DNS (1s) then IP enrichment (1s), plus slack; independent of section count.
    assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
    assert_eq!(outcome.report.len(), section_names().len());
    assert_eq!(outcome.summary.state, RunState::PartiallyFailed);
}

#[tokio::test]
async fn cancellation_marks_unfinished_sections() {
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = Orchestrator::with_collaborators(&collaborators(Mode::Hang, &calls), &Config::default());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let outcome = orchestrator.analyze("example.com", cancel).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(3));
    for section in Section::probe_sections() {
        assert_eq!(kind_of(&outcome, section), Some(ErrorKind::Cancelled), "{section}");
    }
    assert!(outcome.report.get(Section::Metadata).unwrap().is_ok());
    assert_eq!(outcome.summary.state, RunState::PartiallyFailed);
}

#[tokio::test]
async fn ip_literal_target_skips_registration_and_dns_queries() {
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = Orchestrator::with_collaborators(&collaborators(Mode::Succeed, &calls), &fast_config());

    let outcome = orchestrator.analyze("93.184.216.34", CancellationToken::new()).await.unwrap();

    assert_eq!(kind_of(&outcome, Section::DomainRegistration), Some(ErrorKind::NotFound));
    let dns = outcome.report.get(Section::DnsRecords).and_then(ProbeResult::data).unwrap();
    assert_eq!(dns["a_records"], json!(["93.184.216.34"]));
    assert_eq!(dns["mx_records"], json!([]));
    assert!(outcome.report.get(Section::IpEnrichment).unwrap().is_ok());
}

struct PanickingProbe;

#[async_trait]
impl Probe for PanickingProbe {
    fn section(&self) -> Section {
        Section::PortScan
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(1)
    }

    async fn run(&self, _target: &Target, _prior: &PriorResults) -> ProbeResult {
        panic!("port table corrupted")
    }
}

#[tokio::test]
async fn panicking_probe_and_unregistered_sections_are_contained() {
    let orchestrator = Orchestrator::new(vec![Arc::new(PanickingProbe)]);

    let outcome = orchestrator.analyze("example.com", CancellationToken::new()).await.unwrap();

    match outcome.report.get(Section::PortScan).unwrap() {
        ProbeResult::Failed { kind, message } => {
            assert_eq!(*kind, ErrorKind::Internal);
            assert!(message.contains("port table corrupted"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(kind_of(&outcome, Section::TlsCertificate), Some(ErrorKind::NotFound));
    assert_eq!(outcome.report.len(), section_names().len());
}

#[tokio::test]
async fn probe_exceeding_its_timeout_fails_with_timeout() {
    struct Sleepy;

    #[async_trait]
    impl Probe for Sleepy {
        fn section(&self) -> Section {
            Section::Reachability
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(50)
        }

        async fn run(&self, _target: &Target, _prior: &PriorResults) -> ProbeResult {
            tokio::time::sleep(Duration::from_secs(10)).await;
            ProbeResult::Ok(Map::new())
        }
    }

    let orchestrator = Orchestrator::new(vec![Arc::new(Sleepy)]);
    let outcome = orchestrator.analyze("example.com", CancellationToken::new()).await.unwrap();
    assert_eq!(kind_of(&outcome, Section::Reachability), Some(ErrorKind::Timeout));
}
