//! `startAdbShell`/`adbShellInput`/`stopAdbShell`: one interactive `adb
//! shell` per client, its output streamed back as `adbShellOutput` events.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::adb::{DeviceBus, InteractiveShell};
use crate::error::{AppError, Result};
use crate::protocol::ServerMessage;
use crate::session::ClientSink;

/// Tracks the single in-flight interactive shell per client.
#[derive(Clone, Default)]
pub struct ShellRegistry {
    shells: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<InteractiveShell>>>>>,
}

impl ShellRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self, client_id: &str) -> bool {
        self.shells.lock().contains_key(client_id)
    }

    pub fn start(
        &self,
        device_bus: &DeviceBus,
        device_id: &str,
        client_id: &str,
        sink: Arc<dyn ClientSink>,
    ) -> Result<()> {
        if self.is_running(client_id) {
            return Err(AppError::Internal(format!(
                "shell already running for client {client_id}"
            )));
        }

        let mut shell = device_bus.start_interactive_shell(device_id)?;

        // `output` is drained here and replaced with an empty receiver:
        // the registry's entry is kept alive for `write_line`/`kill`, but
        // line consumption happens on this dedicated task instead.
        let mut output_rx = std::mem::replace(&mut shell.output, mpsc::unbounded_channel().1);
        let sink_for_lines = sink.clone();
        tokio::spawn(async move {
            while let Some(line) = output_rx.recv().await {
                sink_for_lines.send_json(ServerMessage::AdbShellOutput { line });
            }
        });

        self.shells
            .lock()
            .insert(client_id.to_string(), Arc::new(tokio::sync::Mutex::new(shell)));
        Ok(())
    }

    pub async fn send_input(&self, client_id: &str, input: &str) -> Result<()> {
        let shell = self.shells.lock().get(client_id).cloned();
        let Some(shell) = shell else {
            return Err(AppError::Internal(format!(
                "no shell running for client {client_id}"
            )));
        };
        shell.lock().await.write_line(input).await
    }

    pub async fn stop(&self, client_id: &str) -> bool {
        let shell = self.shells.lock().remove(client_id);
        let Some(shell) = shell else {
            return false;
        };
        let _ = shell.lock().await.kill().await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_starts_empty() {
        let registry = ShellRegistry::new();
        assert!(!registry.is_running("client-1"));
    }
}
