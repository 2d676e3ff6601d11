//! Session lifecycle: provisioning a device, negotiating its media and
//! control sockets, pumping frames to the client, and tearing everything
//! down again.

pub mod control_router;
pub mod display_mode;
pub mod manager;
pub mod pump;
pub mod types;

pub use control_router::ControlRouter;
pub use manager::{SessionManager, SessionManagerConfig};
pub use types::{
    ClientSink, DisplayMode, RotationCache, Session, SessionMap, SessionState, StartOptions,
};
