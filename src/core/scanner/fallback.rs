// src/core/scanner/fallback.rs

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::models::{ErrorKind, ProbeError, ProbeResult, SectionData};
use crate::core::sources::NetworkGate;
use crate::core::target::Target;

/// One alternative data source for a logical probe.
#[async_trait]
pub trait ChainLink: Send + Sync {
    /// Short label used in logs and error messages.
    fn name(&self) -> &str;

    async fn attempt(&self, target: &Target) -> Result<SectionData, ProbeError>;
}

/// Ordered list of sources tried one after another; the first usable section wins.
#[derive(Clone)]
pub struct FallbackChain {
    links: Vec<Arc<dyn ChainLink>>,
    link_timeout: Duration,
}

/// A section is usable when it carries at least one non-empty value.
fn is_well_formed(section: &SectionData) -> bool {
    section.values().any(|value| match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    })
}

impl FallbackChain {
    pub fn new(links: Vec<Arc<dyn ChainLink>>, link_timeout: Duration) -> Self {
        Self { links, link_timeout }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Tries every link in order. Each attempt holds one gate permit.
    pub async fn run(&self, target: &Target, gate: &NetworkGate) -> ProbeResult {
        let mut last_error = String::from("no sources configured");

        for link in &self.links {
            debug!(source = link.name(), target = target.host(), "Trying source.");
            match gate.call_with_timeout(link.name(), self.link_timeout, link.attempt(target)).await {
                Ok(section) if is_well_formed(&section) => {
                    info!(source = link.name(), "Source returned data.");
                    return ProbeResult::Ok(section);
                }
                Ok(_) => {
                    warn!(source = link.name(), "Source returned an empty result.");
                    last_error = format!("{}: empty result", link.name());
                }
                Err(e) => {
                    warn!(source = link.name(), error = %e, "Source failed.");
                    last_error = format!("{}: {}", link.name(), e.message);
                }
            }
        }

        ProbeResult::failed(ErrorKind::AllSourcesExhausted, last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct Scripted {
        name: &'static str,
        outcome: Result<Value, ErrorKind>,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl ChainLink for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn attempt(&self, _target: &Target) -> Result<SectionData, ProbeError> {
            self.calls.lock().unwrap().push(self.name);
            match &self.outcome {
                Ok(value) => Ok(value.as_object().cloned().unwrap_or_default()),
                Err(kind) => Err(ProbeError::new(*kind, format!("{} said no", self.name))),
            }
        }
    }

    fn link(name: &'static str, outcome: Result<Value, ErrorKind>, calls: &Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn ChainLink> {
        Arc::new(Scripted { name, outcome, calls: calls.clone() })
    }

    fn gate() -> NetworkGate {
        NetworkGate::new(2, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn third_link_wins_after_two_failures() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = FallbackChain::new(
            vec![
                link("rdap", Err(ErrorKind::Timeout), &calls),
                link("whois", Ok(json!({"registrar": null})), &calls),
                link("remote", Ok(json!({"registrar": "Example Registrar"})), &calls),
                link("never", Ok(json!({"registrar": "Unused"})), &calls),
            ],
            Duration::from_secs(1),
        );
        let target = Target::parse("example.com").unwrap();
        let result = chain.run(&target, &gate()).await;
        assert_eq!(result.data().unwrap()["registrar"], json!("Example Registrar"));
        assert_eq!(*calls.lock().unwrap(), vec!["rdap", "whois", "remote"]);
    }

    #[tokio::test]
    async fn exhausted_chain_reports_last_error() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = FallbackChain::new(
            vec![link("a", Err(ErrorKind::Unreachable), &calls), link("b", Err(ErrorKind::NotFound), &calls)],
            Duration::from_secs(1),
        );
        let target = Target::parse("example.com").unwrap();
        match chain.run(&target, &gate()).await {
            ProbeResult::Failed { kind, message } => {
                assert_eq!(kind, ErrorKind::AllSourcesExhausted);
                assert!(message.contains("b said no"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_chain_is_exhausted() {
        let chain = FallbackChain::new(Vec::new(), Duration::from_secs(1));
        let target = Target::parse("example.com").unwrap();
        let result = chain.run(&target, &gate()).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::AllSourcesExhausted));
    }

    #[tokio::test]
    async fn slow_link_counts_as_failure() {
        struct Stalled;

        #[async_trait]
        impl ChainLink for Stalled {
            fn name(&self) -> &str {
                "stalled"
            }

            async fn attempt(&self, _target: &Target) -> Result<SectionData, ProbeError> {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(SectionData::new())
            }
        }

        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = FallbackChain::new(
            vec![Arc::new(Stalled), link("next", Ok(json!({"registrar": "R"})), &calls)],
            Duration::from_millis(20),
        );
        let target = Target::parse("example.com").unwrap();
        assert!(chain.run(&target, &gate()).await.is_ok());
    }
}
