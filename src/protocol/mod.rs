//! The closed tagged-union JSON protocol exchanged with browser clients,
//! plus the binary envelope format carried alongside it over the same
//! WebSocket.
//!
//! Dynamic JSON dispatch (a free-form `action` string matched by hand) is
//! replaced by two closed enums: [`ClientMessage`]
//! for what a client can send, and [`ServerMessage`] for what the server can
//! send back. An unrecognized `action` decodes to the explicit
//! `ClientMessage::Unknown` variant rather than failing to deserialize, so a
//! malformed or unsupported action produces the `error{"Unknown action"}`
//! response named in the spec instead of closing the socket.

pub mod client_message;
pub mod envelope;
pub mod server_message;

pub use client_message::{AdbCommandRequest, ClientMessage};
pub use envelope::Envelope;
pub use server_message::{DeviceJson, ServerMessage};
