//! Exclusive, blocking access to the accessory serial device.
//!
//! A [`SerialTransport`] is the open handle: it owns the descriptor, holds
//! the device's exclusive lock, and has the link configured raw at the
//! requested baud rate. Dropping or closing it releases the descriptor,
//! and with it the lock.
//!
//! Transfers move the whole buffer, in order, or fail with an error that
//! says how far they got. No byte stream framing happens here.

use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::path::{Path, PathBuf};

use rustix::event::{poll, PollFd, PollFlags};
use rustix::fs::{self, Mode, OFlags};
use rustix::io::Errno;
use rustix::termios::{self, OptionalActions, QueueSelector, Termios};

use crate::config::DeviceConfig;
use crate::error::{Error, Result};
use crate::link::{self, READ_TIMEOUT};
use crate::tracing::prelude::*;

/// An open, exclusively locked, configured serial device.
#[derive(Debug)]
pub struct SerialTransport {
    fd: OwnedFd,
    path: PathBuf,
    baud_rate: u32,
    baseline: Termios,
    restore_on_close: bool,
}

impl SerialTransport {
    /// Open the device described by `config`.
    pub fn open(config: &DeviceConfig) -> Result<Self> {
        let mut transport = Self::open_path(&config.path, config.baud_rate)?;
        transport.restore_on_close = config.restore_on_close;
        Ok(transport)
    }

    /// Open `path`, lock it, and configure the link at `baud_rate`.
    ///
    /// Any descriptor opened before a failing step is closed before the
    /// error is returned.
    pub fn open_path(path: impl AsRef<Path>, baud_rate: u32) -> Result<Self> {
        let path = path.as_ref();
        let baud_rate = link::validate_baud_rate(baud_rate)?;

        // Non-blocking so we don't wait on carrier detect.
        let fd = fs::open(
            path,
            OFlags::RDWR | OFlags::NOCTTY | OFlags::NONBLOCK | OFlags::CLOEXEC,
            Mode::empty(),
        )
        .map_err(|source| match source {
            // Someone else already holds TIOCEXCL.
            Errno::BUSY => Error::ExclusiveLockFailed {
                path: path.to_owned(),
                source,
            },
            _ => Error::OpenFailed {
                path: path.to_owned(),
                source,
            },
        })?;
        debug!(path = %path.display(), "Opened serial device.");

        termios::ioctl_tiocexcl(&fd).map_err(|source| Error::ExclusiveLockFailed {
            path: path.to_owned(),
            source,
        })?;

        fs::fcntl_setfl(&fd, OFlags::empty()).map_err(|source| Error::ModeSwitchFailed {
            path: path.to_owned(),
            source,
        })?;

        let baseline = termios::tcgetattr(&fd).map_err(|source| Error::AttributeReadFailed {
            path: path.to_owned(),
            source,
        })?;

        link::configure(&baseline, baud_rate)
            .and_then(|options| termios::tcsetattr(&fd, OptionalActions::Now, &options))
            .map_err(|source| Error::AttributeApplyFailed {
                path: path.to_owned(),
                source,
            })?;

        info!(path = %path.display(), baud_rate, "Serial device ready.");

        Ok(Self {
            fd,
            path: path.to_owned(),
            baud_rate,
            baseline,
            restore_on_close: false,
        })
    }

    /// Fill `buf` from the device, in arrival order.
    ///
    /// Each wait for more data is bounded by [`READ_TIMEOUT`]. An empty
    /// buffer returns immediately.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let requested = buf.len();
        let mut transferred = 0;

        while transferred < requested {
            if !self.wait_readable()? {
                return Err(Error::Timeout {
                    transferred,
                    requested,
                });
            }

            match rustix::io::read(&self.fd, &mut buf[transferred..]) {
                Ok(0) => {
                    return Err(Error::Disconnected {
                        transferred,
                        requested,
                    })
                }
                Ok(n) => transferred += n,
                Err(Errno::INTR) | Err(Errno::AGAIN) => continue,
                Err(Errno::IO) => {
                    return Err(Error::Disconnected {
                        transferred,
                        requested,
                    })
                }
                Err(e) => return Err(e.into()),
            }
        }

        trace!(bytes = requested, "Read from serial device.");
        Ok(requested)
    }

    /// Send all of `buf` to the device, in order.
    ///
    /// A hung-up line fails with [`Error::Disconnected`], carrying how many
    /// bytes went out before it did.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let requested = buf.len();
        let mut written = 0;

        while written < requested {
            match rustix::io::write(&self.fd, &buf[written..]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => written += n,
                Err(Errno::INTR) => continue,
                Err(Errno::IO) => {
                    return Err(Error::Disconnected {
                        transferred: written,
                        requested,
                    })
                }
                Err(e) => return Err(e.into()),
            }
        }

        trace!(bytes = written, "Wrote to serial device.");
        Ok(written)
    }

    /// Release the device. The transport cannot be used afterwards.
    pub fn close(self) {
        trace!(path = %self.path.display(), "Close requested.");
        drop(self);
    }

    /// Bytes already received and waiting in the driver's input queue.
    pub fn bytes_available(&self) -> Result<usize> {
        let n = rustix::io::ioctl_fionread(&self.fd)?;
        Ok(n as usize)
    }

    /// Block until everything written has been transmitted.
    pub fn drain(&self) -> Result<()> {
        termios::tcdrain(&self.fd)?;
        Ok(())
    }

    /// Throw away received bytes that have not been read yet.
    pub fn discard_input(&self) -> Result<()> {
        termios::tcflush(&self.fd, QueueSelector::IFlush)?;
        Ok(())
    }

    /// Line attributes as the driver currently reports them.
    pub fn current_attributes(&self) -> Result<Termios> {
        Ok(termios::tcgetattr(&self.fd)?)
    }

    /// Attributes captured at open, before the link was reconfigured.
    pub fn baseline(&self) -> &Termios {
        &self.baseline
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    // Ok(false) on timeout. Hang-up and error conditions count as readable
    // so the following read reports them.
    fn wait_readable(&self) -> Result<bool> {
        let timeout_ms = READ_TIMEOUT.as_millis() as i32;
        let mut fds = [PollFd::new(&self.fd, PollFlags::IN)];

        loop {
            match poll(&mut fds, timeout_ms) {
                Ok(0) => return Ok(false),
                Ok(_) => return Ok(true),
                Err(Errno::INTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl AsFd for SerialTransport {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.restore_on_close {
            if let Err(e) = termios::tcsetattr(&self.fd, OptionalActions::Now, &self.baseline) {
                warn!(path = %self.path.display(), "Failed to restore line attributes: {e}");
            }
        }
        // A pty slave outlives its descriptors, and TIOCEXCL with it.
        if let Err(e) = termios::ioctl_tiocnxcl(&self.fd) {
            debug!(path = %self.path.display(), "Failed to clear exclusive mode: {e}");
        }
        debug!(path = %self.path.display(), "Closed serial device.");
    }
}
