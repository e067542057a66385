// src/core/sources/mod.rs

//! Interfaces to the external data sources the probes depend on, and their
//! live implementations.
//!
//! Probes only ever see the traits declared here, bundled in `Collaborators`.
//! Every network call goes through a shared `NetworkGate`, which bounds the
//! number of in-flight calls and applies the per-call timeout.

pub mod geo;
pub mod http;
pub mod ping;
pub mod rdap;
pub mod resolver;
pub mod tcp;
pub mod tls;
pub mod whois;

use async_trait::async_trait;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::Config;
use crate::core::models::{ErrorKind, ProbeError, SectionData};
use crate::core::scanner::fallback::ChainLink;

// --- Network Gate ---

/// Bounded-concurrency gate shared by every collaborator call of a run.
#[derive(Debug, Clone)]
pub struct NetworkGate {
    permits: Arc<Semaphore>,
    call_timeout: Duration,
}

impl NetworkGate {
    pub fn new(workers: usize, call_timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
            call_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.workers, config.network_timeout())
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Runs `call` holding one permit, under the default per-call timeout.
    pub async fn call<T, F>(&self, what: &str, call: F) -> Result<T, ProbeError>
    where
        F: Future<Output = Result<T, ProbeError>>,
    {
        self.call_with_timeout(what, self.call_timeout, call).await
    }

    /// Runs `call` holding one permit, under `limit`.
    ///
    /// The timeout starts once the permit is held, so time spent queueing
    /// behind other calls is not charged to this one.
    pub async fn call_with_timeout<T, F>(&self, what: &str, limit: Duration, call: F) -> Result<T, ProbeError>
    where
        F: Future<Output = Result<T, ProbeError>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ProbeError::new(ErrorKind::Cancelled, "network gate closed"))?;
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(call = what, timeout_ms = limit.as_millis() as u64, "Network call timed out.");
                Err(ProbeError::timeout(format!("{what} timed out after {}ms", limit.as_millis())))
            }
        }
    }
}

// --- Collaborator Interfaces ---

/// DNS record types the engine asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum RecordKind {
    A,
    #[strum(serialize = "AAAA")]
    Aaaa,
    #[strum(serialize = "MX")]
    Mx,
    #[strum(serialize = "TXT")]
    Txt,
}

#[async_trait]
pub trait DnsLookup: Send + Sync {
    /// Record values of one type, rendered as text. An absent type is `NotFound`.
    async fn lookup(&self, host: &str, kind: RecordKind) -> Result<Vec<String>, ProbeError>;

    /// PTR name for `ip`.
    async fn reverse(&self, ip: IpAddr) -> Result<String, ProbeError>;

    /// Plain address resolution, used when no DNS section is available.
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ProbeError>;
}

#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self, ip: IpAddr) -> Result<SectionData, ProbeError>;
}

#[async_trait]
pub trait CertificateSource: Send + Sync {
    /// Certificate facts of the peer at `host:port`.
    async fn fetch(&self, host: &str, port: u16) -> Result<SectionData, ProbeError>;
}

/// Status, headers and body of one HTTP exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub final_url: String,
    /// Header names lower-cased, in received order.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    /// Case-insensitive header lookup; multiple values are joined with `, `.
    pub fn header(&self, name: &str) -> Option<String> {
        let values: Vec<&str> = self
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }
}

#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, ProbeError>;
}

/// Outcome of one TCP connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Open,
    Closed,
    Filtered,
}

#[async_trait]
pub trait PortProber: Send + Sync {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> Result<PortState, ProbeError>;
}

/// Raw result of the OS reachability tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingOutput {
    pub exit_code: Option<i32>,
    pub text: String,
}

#[async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(&self, host: &str) -> Result<PingOutput, ProbeError>;
}

/// Every external source an analysis run may consult.
#[derive(Clone)]
pub struct Collaborators {
    pub registration: Vec<Arc<dyn ChainLink>>,
    pub dns: Arc<dyn DnsLookup>,
    pub geo: Arc<dyn GeoLocator>,
    pub tls: Arc<dyn CertificateSource>,
    pub http: Arc<dyn HttpFetcher>,
    pub ports: Arc<dyn PortProber>,
    pub ping: Arc<dyn Pinger>,
}

impl Collaborators {
    /// Live implementations backed by the network and the OS.
    pub fn live(config: &Config) -> Result<Self, ProbeError> {
        debug!("Building live collaborators.");
        let client = http::build_client(config)?;
        Ok(Self {
            registration: vec![
                Arc::new(rdap::RdapBootstrap::new(client.clone(), config.rdap_bootstrap_url.clone())),
                Arc::new(whois::WhoisText::new(config.whois_server.clone(), config.network_timeout())),
                Arc::new(rdap::RemoteLookup::new(client.clone(), config.remote_lookup_url.clone())),
            ],
            dns: Arc::new(resolver::HickoryLookup::new(config.network_timeout())),
            geo: Arc::new(geo::IpApiLocator::new(client.clone(), config.geolocation_url.clone())),
            tls: Arc::new(tls::NativeTlsSource::new(config.network_timeout())),
            http: Arc::new(http::ReqwestFetcher::new(client)),
            ports: Arc::new(tcp::TokioPortProber),
            ping: Arc::new(ping::SystemPinger::new(config.ping_count)),
        })
    }
}
