//! `startDiagnostics`/`stopDiagnostics`: one-shot device snapshots
//! followed by a continuous `logcat` stream, both appended to a single
//! per-device log file. At most one diagnostics session runs per device.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock as SyncRwLock;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::adb::DeviceBus;
use crate::error::{AppError, Result};

/// Maps a diagnostics snapshot name to the one-shot shell command that
/// produces it. Names not listed here are skipped rather than failing the
/// whole request, since the client may request an extensible/future set.
fn snapshot_command(name: &str) -> Option<&'static [&'static str]> {
    match name {
        "battery" => Some(&["dumpsys", "battery"]),
        "memory" => Some(&["dumpsys", "meminfo"]),
        "network" => Some(&["dumpsys", "connectivity"]),
        "processes" => Some(&["ps", "-A"]),
        "properties" => Some(&["getprop"]),
        _ => None,
    }
}

struct RunningDiagnostics {
    cancel: CancellationToken,
}

/// Tracks the single in-flight diagnostics session per device.
#[derive(Clone, Default)]
pub struct DiagnosticsRegistry {
    sessions: Arc<SyncRwLock<HashMap<String, RunningDiagnostics>>>,
}

impl DiagnosticsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self, device_id: &str) -> bool {
        self.sessions.read().contains_key(device_id)
    }

    /// Captures the requested snapshots, then starts a background task
    /// streaming `logcat` into `output_dir/device_diagnostics_<id>_<ts>.log`
    /// until `stop` is called or the connection closes.
    pub async fn start(
        &self,
        device_bus: &DeviceBus,
        device_id: &str,
        diagnostics: &[String],
        output_dir: &str,
        timestamp: u64,
    ) -> Result<PathBuf> {
        if self.is_running(device_id) {
            return Err(AppError::Internal(format!(
                "diagnostics already running for device {device_id}"
            )));
        }

        tokio::fs::create_dir_all(output_dir).await?;
        let path = PathBuf::from(output_dir)
            .join(format!("device_diagnostics_{device_id}_{timestamp}.log"));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        for name in diagnostics {
            let Some(args) = snapshot_command(name) else {
                continue;
            };
            let output = device_bus.shell(device_id, args).await.unwrap_or_default();
            file.write_all(format!("=== {name} ===\n").as_bytes()).await?;
            file.write_all(output.as_bytes()).await?;
            file.write_all(b"\n\n").await?;
        }

        let (child, mut lines) = device_bus.spawn_shell(device_id, &["logcat"])?;
        let cancel = CancellationToken::new();

        self.sessions.write().insert(
            device_id.to_string(),
            RunningDiagnostics {
                cancel: cancel.clone(),
            },
        );

        let device_id_owned = device_id.to_string();
        tokio::spawn(async move {
            let mut child = child;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        let _ = child.kill().await;
                        break;
                    }
                    line = lines.recv() => match line {
                        Some(line) => {
                            if file.write_all(line.as_bytes()).await.is_err() {
                                break;
                            }
                            let _ = file.write_all(b"\n").await;
                        }
                        None => break,
                    },
                }
            }
            tracing::debug!(device_id = %device_id_owned, "diagnostics logcat stream ended");
        });

        Ok(path)
    }

    pub fn stop(&self, device_id: &str) -> bool {
        if let Some(session) = self.sessions.write().remove(device_id) {
            session.cancel.cancel();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_snapshot_names_resolve() {
        assert!(snapshot_command("battery").is_some());
        assert!(snapshot_command("unknown-thing").is_none());
    }

    #[test]
    fn registry_reports_not_running_initially() {
        let registry = DiagnosticsRegistry::new();
        assert!(!registry.is_running("emulator-5554"));
        assert!(!registry.stop("emulator-5554"));
    }
}
