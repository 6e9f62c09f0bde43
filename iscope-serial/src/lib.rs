//! Point-to-point serial transport for the iScope sample stream.
//!
//! [`SerialTransport`] opens the accessory's serial device exclusively,
//! configures it raw at the requested baud rate, and moves bytes in both
//! directions with blocking calls. What the bytes mean is up to the
//! caller.

pub mod config;
pub mod error;
pub mod link;
pub mod tracing;
pub mod transport;

pub use config::{Config, DeviceConfig};
pub use error::{Error, Result};
pub use transport::SerialTransport;
