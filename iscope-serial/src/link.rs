//! Fixed link configuration for the accessory serial interface.
//!
//! Only the baud rate is chosen by the caller. Everything else is pinned:
//! raw mode, 8-bit characters, reads return after one byte, and a 1.0 s
//! inter-byte timeout.

use std::time::Duration;

use rustix::termios::{ControlModes, SpecialCodeIndex, Termios};

use crate::error::{Error, Result};

/// Well-known path of the accessory serial interface
pub const DEFAULT_DEVICE_PATH: &str = "/dev/tty.iap";

/// Baud rate the instrument streams at unless configured otherwise
pub const DEFAULT_BAUD_RATE: u32 = 19200;

/// VMIN: a read returns once this many bytes are available
pub const MIN_READ_BYTES: u8 = 1;

/// VTIME, in the driver's decisecond units
pub const READ_TIMEOUT_DECISECONDS: u8 = 10;

/// Per-byte read timeout
pub const READ_TIMEOUT: Duration = Duration::from_millis(READ_TIMEOUT_DECISECONDS as u64 * 100);

/// Reject rates the driver would misinterpret. Zero means "hang up".
pub fn validate_baud_rate(baud_rate: u32) -> Result<u32> {
    if baud_rate == 0 {
        return Err(Error::InvalidBaudRate(baud_rate));
    }
    Ok(baud_rate)
}

/// Derive the attributes to apply from the device's current ones.
///
/// The baseline is left untouched so it can be restored later.
pub fn configure(baseline: &Termios, baud_rate: u32) -> rustix::io::Result<Termios> {
    let mut options = baseline.clone();

    options.make_raw();
    options.special_codes[SpecialCodeIndex::VMIN] = MIN_READ_BYTES;
    options.special_codes[SpecialCodeIndex::VTIME] = READ_TIMEOUT_DECISECONDS;
    options.set_speed(baud_rate)?;
    options.control_modes.remove(ControlModes::CSIZE);
    options.control_modes.insert(ControlModes::CS8);

    Ok(options)
}
