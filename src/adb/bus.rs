//! Shells out to the `adb` binary for device enumeration, push, shell
//! commands, and reverse tunnel management.
//!
//! Subprocess lifecycle follows the same shape the teacher uses for its
//! extension processes: piped stdio, `kill_on_drop(true)` so an aborted
//! session never leaves an orphaned `adb` child behind, and a
//! `BufReader`-driven line collector for anything long-running (the
//! interactive shell).

use std::convert::TryFrom;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::error::{AppError, Result};

use super::device::Device;

/// An interactive `adb shell` child process plus the channel feeding its
/// stdout back to the caller line by line.
pub struct InteractiveShell {
    child: Child,
    pub output: mpsc::UnboundedReceiver<String>,
}

impl InteractiveShell {
    pub async fn write_line(&mut self, input: &str) -> Result<()> {
        let stdin = self
            .child
            .stdin
            .as_mut()
            .ok_or_else(|| AppError::ShellTransportError("shell stdin unavailable".to_string()))?;
        stdin
            .write_all(input.as_bytes())
            .await
            .map_err(|e| AppError::ShellTransportError(e.to_string()))?;
        stdin
            .write_all(b"\n")
            .await
            .map_err(|e| AppError::ShellTransportError(e.to_string()))?;
        Ok(())
    }

    pub async fn kill(&mut self) -> Result<()> {
        self.child
            .kill()
            .await
            .map_err(|e| AppError::ShellTransportError(e.to_string()))
    }
}

/// Resolves and shells to the `adb` binary. One instance is shared across
/// all sessions; it holds no per-device state beyond the resolved binary
/// path.
#[derive(Clone)]
pub struct DeviceBus {
    adb_path: PathBuf,
}

impl DeviceBus {
    /// Resolve the `adb` binary: an explicit configured path, then `PATH`.
    pub fn new(configured_path: &str) -> Self {
        Self {
            adb_path: Self::resolve_binary_path(configured_path),
        }
    }

    /// `ADB_PATH` env/config value if non-empty, else the bare `adb` name
    /// so `Command` resolves it from `PATH` the same way a shell would.
    fn resolve_binary_path(configured_path: &str) -> PathBuf {
        if !configured_path.is_empty() {
            return PathBuf::from(configured_path);
        }
        PathBuf::from("adb")
    }

    pub fn binary_path(&self) -> &Path {
        &self.adb_path
    }

    fn command(&self) -> Command {
        Command::new(&self.adb_path)
    }

    fn device_command(&self, device_id: &str) -> Command {
        let mut cmd = self.command();
        cmd.args(["-s", device_id]);
        cmd
    }

    /// `adb devices -l`, parsed into [`Device`] records. The header line
    /// and any blank lines are skipped.
    pub async fn list(&self) -> Result<Vec<Device>> {
        let output = self
            .command()
            .args(["devices", "-l"])
            .output()
            .await
            .map_err(|e| AppError::AdbUnavailable(e.to_string()))?;

        if !output.status.success() {
            return Err(AppError::ShellNonZeroExit {
                command: "adb devices -l".to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let devices = stdout
            .lines()
            .skip(1)
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| Device::try_from(line).ok())
            .collect();
        Ok(devices)
    }

    /// Run a one-shot shell command on `device_id` and collect its output.
    pub async fn shell(&self, device_id: &str, args: &[&str]) -> Result<String> {
        let mut full_args = vec!["shell"];
        full_args.extend_from_slice(args);

        let output = self
            .device_command(device_id)
            .args(&full_args)
            .output()
            .await
            .map_err(|e| AppError::ShellTransportError(e.to_string()))?;

        if !output.status.success() {
            return Err(AppError::ShellNonZeroExit {
                command: format!("adb -s {device_id} shell {}", args.join(" ")),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }

    /// Push a local file to `remote_path` on `device_id`.
    pub async fn push(&self, device_id: &str, local_path: &Path, remote_path: &str) -> Result<()> {
        let output = self
            .device_command(device_id)
            .arg("push")
            .arg(local_path)
            .arg(remote_path)
            .output()
            .await
            .map_err(|e| AppError::ShellTransportError(e.to_string()))?;

        if !output.status.success() {
            return Err(AppError::PushFailed(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        Ok(())
    }

    /// `adb reverse localabstract:<scid> tcp:<local_port>`.
    pub async fn reverse_add(&self, device_id: &str, local_abstract: &str, local_port: u16) -> Result<()> {
        let output = self
            .device_command(device_id)
            .args([
                "reverse",
                &format!("localabstract:{local_abstract}"),
                &format!("tcp:{local_port}"),
            ])
            .output()
            .await
            .map_err(|e| AppError::ShellTransportError(e.to_string()))?;

        if !output.status.success() {
            return Err(AppError::ReverseSetupFailed(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        Ok(())
    }

    pub async fn reverse_remove(&self, device_id: &str, local_abstract: &str) -> Result<()> {
        // Best effort: a reverse entry that is already gone is not an error
        // worth surfacing during teardown.
        let _ = self
            .device_command(device_id)
            .args(["reverse", "--remove", &format!("localabstract:{local_abstract}")])
            .output()
            .await;
        Ok(())
    }

    pub async fn reverse_list(&self, device_id: &str) -> Result<Vec<String>> {
        let output = self
            .device_command(device_id)
            .args(["reverse", "--list"])
            .output()
            .await
            .map_err(|e| AppError::ShellTransportError(e.to_string()))?;

        if !output.status.success() {
            return Ok(Vec::new());
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|line| line.to_string())
            .collect())
    }

    /// Spawns `adb -s <device_id> shell <args>` as a long-lived, detached
    /// process (the on-device streaming server, a diagnostics collector,
    /// or a HAR trace), returning the child plus a channel streaming its
    /// combined stdout/stderr lines. Unlike [`Self::shell`], this does not
    /// wait for exit.
    pub fn spawn_shell(&self, device_id: &str, args: &[&str]) -> Result<(Child, mpsc::UnboundedReceiver<String>)> {
        let mut full_args = vec!["shell"];
        full_args.extend_from_slice(args);

        let mut child = self
            .device_command(device_id)
            .args(&full_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::ServerSpawnFailed(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        spawn_line_forwarder(child.stdout.take(), tx.clone());
        spawn_line_forwarder(child.stderr.take(), tx);

        Ok((child, rx))
    }

    /// Spawn `adb -s <device_id> shell` as a long-lived interactive
    /// process, with a background task forwarding its combined
    /// stdout/stderr lines to the returned channel.
    pub fn start_interactive_shell(&self, device_id: &str) -> Result<InteractiveShell> {
        let mut child = self
            .device_command(device_id)
            .arg("shell")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::ShellTransportError(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        spawn_line_forwarder(child.stdout.take(), tx.clone());
        spawn_line_forwarder(child.stderr.take(), tx);

        Ok(InteractiveShell { child, output: rx })
    }
}

/// Shared by any long-running child process that needs its stdout/stderr
/// collected line by line (the on-device server, diagnostics, HAR
/// capture).
pub(crate) fn spawn_line_forwarder<R>(reader: Option<R>, tx: mpsc::UnboundedSender<String>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    if let Some(reader) = reader {
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_configured_path_over_default() {
        let bus = DeviceBus::new("/opt/android-sdk/platform-tools/adb");
        assert_eq!(bus.binary_path(), Path::new("/opt/android-sdk/platform-tools/adb"));
    }

    #[test]
    fn falls_back_to_path_lookup_when_unconfigured() {
        let bus = DeviceBus::new("");
        assert_eq!(bus.binary_path(), Path::new("adb"));
    }
}
