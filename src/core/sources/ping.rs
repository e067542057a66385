// src/core/sources/ping.rs

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{PingOutput, Pinger};
use crate::core::models::ProbeError;

/// The OS `ping` binary.
pub struct SystemPinger {
    count: u32,
}

impl SystemPinger {
    pub fn new(count: u32) -> Self {
        Self { count: count.max(1) }
    }

    fn count_flag() -> &'static str {
        if cfg!(windows) { "-n" } else { "-c" }
    }
}

#[async_trait]
impl Pinger for SystemPinger {
    async fn ping(&self, host: &str) -> Result<PingOutput, ProbeError> {
        debug!(host, count = self.count, "Running system ping.");
        let output = Command::new("ping")
            .arg(Self::count_flag())
            .arg(self.count.to_string())
            .arg(host)
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) => {
                let mut text = String::from_utf8_lossy(&output.stdout).trim().to_string();
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.trim().is_empty() {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(stderr.trim());
                }
                Ok(PingOutput { exit_code: output.status.code(), text })
            }
            // A missing binary is a diagnostic, not a probe failure.
            Err(e) => {
                warn!(host, error = %e, "Could not run ping.");
                Ok(PingOutput { exit_code: None, text: format!("ping could not be executed: {e}") })
            }
        }
    }
}
