// src/core/sources/tcp.rs

use async_trait::async_trait;
use std::io::ErrorKind as IoErrorKind;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

use super::{PortProber, PortState};
use crate::core::models::ProbeError;

/// Plain TCP connect probe.
pub struct TokioPortProber;

#[async_trait]
impl PortProber for TokioPortProber {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> Result<PortState, ProbeError> {
        let state = match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => PortState::Open,
            Ok(Err(e)) if e.kind() == IoErrorKind::ConnectionRefused => PortState::Closed,
            Ok(Err(e)) => {
                debug!(host, port, error = %e, "Port connect failed.");
                PortState::Filtered
            }
            Err(_) => PortState::Filtered,
        };
        debug!(host, port, ?state, "Port probed.");
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_listening_port_as_open() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = TokioPortProber
            .probe("127.0.0.1", port, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(state, PortState::Open);
    }

    #[tokio::test]
    async fn reports_unbound_port_as_not_open() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let state = TokioPortProber
            .probe("127.0.0.1", port, Duration::from_millis(500))
            .await
            .unwrap();
        assert_ne!(state, PortState::Open);
    }
}
