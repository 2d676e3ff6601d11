//! Device discovery and control via the `adb` command-line tool.
//!
//! This brokers to the real `adb` binary on `PATH` (or `AppConfig.adb.path`)
//! rather than reimplementing the USB transport: `adb` already owns the
//! device list, the forward/reverse tunnel table, and `push`, and shelling
//! out to it is the same trust boundary the rest of this gateway already
//! crosses to start the on-device server.

pub mod bus;
pub mod device;

pub use bus::{DeviceBus, InteractiveShell};
pub use device::{Device, DeviceState};
