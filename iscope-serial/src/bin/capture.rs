//! Stream raw bytes from the accessory serial device to stdout as hex.
//!
//! Reads happen on a blocking worker. Read timeouts are expected while the
//! instrument is idle; they give the worker a chance to notice shutdown.

use std::io::Write;

use anyhow::Result;
use tokio::signal::unix::{self, SignalKind};
use tokio_util::sync::CancellationToken;

use iscope_serial::tracing::{self, prelude::*};
use iscope_serial::{Config, Error, SerialTransport};

fn capture(config: Config, running: CancellationToken) -> Result<()> {
    let mut transport = SerialTransport::open(&config.device)
        .inspect_err(|e| error!(code = e.code(), "{e}"))?;
    let mut buf = vec![0u8; config.capture.chunk_size];

    let result = stream_hex(
        &mut transport,
        &mut buf,
        &mut std::io::stdout().lock(),
        &running,
    );

    transport.close();
    Ok(result?)
}

/// Print what each read returns as one hex line, until cancelled or the
/// device fails. Bytes received before a failure are printed first.
fn stream_hex(
    transport: &mut SerialTransport,
    buf: &mut [u8],
    out: &mut impl Write,
    running: &CancellationToken,
) -> iscope_serial::Result<()> {
    while !running.is_cancelled() {
        let (n, failure) = match transport.read(buf) {
            Ok(n) => (n, None),
            Err(Error::Timeout { transferred, .. }) => (transferred, None),
            Err(e) => {
                let n = match e {
                    Error::Disconnected { transferred, .. } => transferred,
                    _ => 0,
                };
                (n, Some(e))
            }
        };

        if n > 0 {
            writeln!(out, "{}", hex::encode(&buf[..n]))?;
        }
        if let Some(e) = failure {
            error!("Error {e} reading from device.");
            return Err(e);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    tracing::init_journald_or_stdout(&config.log.level);

    let running = CancellationToken::new();
    let mut worker = tokio::task::spawn_blocking({
        let running = running.clone();
        move || capture(config, running)
    });
    info!("Started.");

    let mut sigint = unix::signal(SignalKind::interrupt())?;
    let mut sigterm = unix::signal(SignalKind::terminate())?;
    let result = tokio::select! {
        _ = sigint.recv() => None,
        _ = sigterm.recv() => None,
        result = &mut worker => Some(result),
    };

    trace!("Shutting down.");
    running.cancel();

    let result = match result {
        Some(result) => result,
        None => worker.await,
    };
    info!("Exiting.");
    result?
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::fcntl::OFlag;
    use nix::pty::{grantpt, posix_openpt, ptsname_r, unlockpt, PtyMaster};
    use std::thread;
    use std::time::Duration;

    fn pty() -> (PtyMaster, String) {
        let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY).unwrap();
        grantpt(&master).unwrap();
        unlockpt(&master).unwrap();
        let path = ptsname_r(&master).unwrap();
        (master, path)
    }

    #[test]
    #[cfg_attr(feature = "skip-pty-tests", ignore)]
    fn test_hangup_prints_received_bytes_then_fails() {
        let (mut master, path) = pty();
        let mut transport = SerialTransport::open_path(&path, 19200).unwrap();

        master.write_all(&[0x01, 0x02]).unwrap();
        let hangup = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            drop(master);
        });

        let mut buf = [0u8; 4];
        let mut out = Vec::new();
        let running = CancellationToken::new();
        let result = stream_hex(&mut transport, &mut buf, &mut out, &running);
        hangup.join().unwrap();

        assert!(
            matches!(
                result,
                Err(Error::Disconnected {
                    transferred: 2,
                    requested: 4
                })
            ),
            "{result:?}"
        );
        assert_eq!(String::from_utf8(out).unwrap(), "0102\n");
    }

    #[test]
    #[cfg_attr(feature = "skip-pty-tests", ignore)]
    fn test_stops_when_cancelled() {
        let (_master, path) = pty();
        let mut transport = SerialTransport::open_path(&path, 19200).unwrap();
        let running = CancellationToken::new();
        running.cancel();

        let mut buf = [0u8; 4];
        let mut out = Vec::new();
        stream_hex(&mut transport, &mut buf, &mut out, &running).unwrap();
        assert!(out.is_empty());
    }
}
