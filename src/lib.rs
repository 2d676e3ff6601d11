//! kvm-gateway - multi-client Android screen/audio streaming and control
//! gateway.
//!
//! Brokers between browser clients and Android devices: pushes the
//! on-device streaming server, negotiates its wire protocol over ADB
//! reverse tunnels, repackages video/audio/control into a framed binary
//! WebSocket feed, and multiplexes device-management commands.

pub mod adb;
pub mod commands;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod state;
pub mod utils;
pub mod web;
pub mod wire;

pub use error::{AppError, Result};
