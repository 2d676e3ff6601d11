//! Consolidated application state shared across the HTTP and WebSocket
//! listeners, following the teacher's single-aggregator `AppState` shape
//! (one struct of `Arc`-wrapped subsystems behind a shutdown broadcast)
//! rather than passing each collaborator through handlers individually.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::adb::DeviceBus;
use crate::commands::CommandHub;
use crate::config::ConfigStore;
use crate::session::SessionManager;

/// Application-wide state shared across the WebSocket gateway and (for
/// config access) the static file listener.
pub struct AppState {
    /// Configuration store.
    pub config: ConfigStore,
    /// ADB transport, shared by `SessionManager` and `CommandHub`.
    pub device_bus: DeviceBus,
    /// Owns every live streaming session.
    pub sessions: Arc<SessionManager>,
    /// Dispatches every device-management command.
    pub commands: CommandHub,
    /// Root cancellation token; cancelling this unwinds every session.
    pub root_cancel: CancellationToken,
    /// Shutdown signal sender, for the graceful-shutdown `select!` in `main`.
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(config: ConfigStore, device_bus: DeviceBus, root_cancel: CancellationToken) -> Arc<Self> {
        let session_config = {
            let app_config = config.get();
            crate::session::SessionManagerConfig {
                server_port_base: app_config.session.server_port_base,
                handshake_timeout: std::time::Duration::from_secs(app_config.session.handshake_timeout_secs),
                pump_join_timeout: std::time::Duration::from_secs(app_config.session.pump_join_timeout_secs),
                command_timeout: std::time::Duration::from_secs(app_config.session.command_timeout_secs),
                max_client_buffer_bytes: app_config.session.max_client_buffer_bytes,
                control_queue_capacity: app_config.session.control_queue_capacity,
            }
        };

        let sessions = Arc::new(SessionManager::new(
            device_bus.clone(),
            root_cancel.clone(),
            session_config,
        ));
        let commands = CommandHub::new(device_bus.clone(), sessions.clone(), config.clone());
        let (shutdown_tx, _) = broadcast::channel(1);

        Arc::new(Self {
            config,
            device_bus,
            sessions,
            commands,
            root_cancel,
            shutdown_tx,
        })
    }

    /// Subscribe to the shutdown signal.
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }
}
