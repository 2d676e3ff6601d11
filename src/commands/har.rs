//! `startHarTrace`/`stopHarTrace`: spawns an external HAR capture process
//! and streams its stdout back to the owning client as status lines. At
//! most one HAR trace runs per client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::error::{AppError, Result};
use crate::protocol::ServerMessage;
use crate::session::ClientSink;

const STOP_ESCALATION_DELAY: Duration = Duration::from_secs(1);

struct RunningHarTrace {
    child: Arc<tokio::sync::Mutex<Child>>,
}

/// Tracks the single in-flight HAR trace per client.
#[derive(Clone, Default)]
pub struct HarTraceRegistry {
    traces: Arc<RwLock<HashMap<String, RunningHarTrace>>>,
}

impl HarTraceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self, client_id: &str) -> bool {
        self.traces.read().contains_key(client_id)
    }

    /// Spawns `har_capture_binary --url <url> --output <har_filename>
    /// [--duration <capture_time>]` and streams its stdout as
    /// `harTraceStatus` events to `sink`.
    pub fn start(
        &self,
        har_capture_binary: &str,
        client_id: &str,
        url: &str,
        har_filename: &str,
        capture_time: Option<u64>,
        sink: Arc<dyn ClientSink>,
    ) -> Result<()> {
        if self.is_running(client_id) {
            return Err(AppError::Internal(format!(
                "HAR trace already running for client {client_id}"
            )));
        }

        let mut args = vec!["--url".to_string(), url.to_string(), "--output".to_string(), har_filename.to_string()];
        if let Some(capture_time) = capture_time {
            args.push("--duration".to_string());
            args.push(capture_time.to_string());
        }

        let mut child = Command::new(har_capture_binary)
            .args(&args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::ServerSpawnFailed(e.to_string()))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        crate::adb::bus::spawn_line_forwarder(stdout, tx.clone());
        crate::adb::bus::spawn_line_forwarder(stderr, tx);

        let sink_for_lines = sink.clone();
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                sink_for_lines.send_json(ServerMessage::HarTraceStatus { message: line });
            }
        });

        let child = Arc::new(tokio::sync::Mutex::new(child));
        self.traces
            .write()
            .insert(client_id.to_string(), RunningHarTrace { child });

        Ok(())
    }

    /// Writes `STOP\n` to the process's stdin; if it hasn't exited within
    /// [`STOP_ESCALATION_DELAY`], kills it outright.
    pub async fn stop(&self, client_id: &str) -> bool {
        let Some(trace) = self.traces.write().remove(client_id) else {
            return false;
        };

        {
            let mut child = trace.child.lock().await;
            if let Some(stdin) = child.stdin.as_mut() {
                let _ = stdin.write_all(b"STOP\n").await;
            }
        }

        let child = trace.child.clone();
        tokio::spawn(async move {
            tokio::time::sleep(STOP_ESCALATION_DELAY).await;
            let mut child = child.lock().await;
            if matches!(child.try_wait(), Ok(None)) {
                let _ = child.kill().await;
            }
        });

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_starts_empty() {
        let registry = HarTraceRegistry::new();
        assert!(!registry.is_running("client-1"));
    }
}
