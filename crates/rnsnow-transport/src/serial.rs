use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use serialport::{DataBits, FlowControl, Parity, SerialPort as _, StopBits};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::SerialPort;

const READ_CHUNK_SIZE: usize = 1024;

/// Upper bound on a single device read or write.
const DEVICE_TIMEOUT: Duration = Duration::from_millis(10);

/// Where the wired side of the bridge lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialDevice {
    /// The process's own stdin/stdout.
    Stdio,
    /// A character device (UART, USB CDC, pty).
    Path(PathBuf),
}

enum OpenPort {
    /// A UART configured 8N1 at the requested baud rate.
    Device(Box<dyn serialport::SerialPort>),
    /// stdin cannot be polled portably, so a reader thread feeds `rx`.
    Stdio {
        rx: mpsc::UnboundedReceiver<Bytes>,
        writer: std::io::Stdout,
        eof: bool,
    },
}

/// A [`SerialPort`] over a device node or stdio.
///
/// Device reads only take what the driver already holds, so
/// [`SerialPort::read`] never blocks. A device that fails mid-stream (a USB
/// adapter unplugged, say) reports itself closed and the bridge re-opens it.
pub struct StreamSerial {
    device: SerialDevice,
    baud: u32,
    state: Mutex<Option<OpenPort>>,
}

impl StreamSerial {
    pub fn new(device: SerialDevice, baud: u32) -> Self {
        Self {
            device,
            baud,
            state: Mutex::new(None),
        }
    }

    pub fn device(&self) -> &SerialDevice {
        &self.device
    }

    fn lock(&self) -> MutexGuard<'_, Option<OpenPort>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SerialPort for StreamSerial {
    fn open(&self) -> Result<()> {
        let port = match &self.device {
            SerialDevice::Stdio => {
                let (tx, rx) = mpsc::unbounded_channel();
                std::thread::Builder::new()
                    .name("rnsnow-stdin".to_string())
                    .spawn(move || pump_stdin(tx))?;
                OpenPort::Stdio {
                    rx,
                    writer: std::io::stdout(),
                    eof: false,
                }
            }
            SerialDevice::Path(path) => OpenPort::Device(open_device(path, self.baud)?),
        };

        *self.lock() = Some(port);
        info!(device = ?self.device, baud = self.baud, "serial port open");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    fn read(&self) -> Result<Option<Bytes>> {
        let mut state = self.lock();
        let Some(port) = state.as_mut() else {
            return Err(TransportError::NotOpen);
        };

        match port {
            OpenPort::Device(device) => {
                let result = read_available(device.as_mut());
                if let Err(err) = &result {
                    warn!(error = %err, "serial device lost");
                    *state = None;
                }
                result.map_err(TransportError::Io)
            }
            OpenPort::Stdio { rx, eof, .. } => Ok(drain_stdin(rx, eof)),
        }
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        let mut state = self.lock();
        let Some(port) = state.as_mut() else {
            return Err(TransportError::NotOpen);
        };

        match port {
            OpenPort::Device(device) => {
                let result = device.write_all(data).and_then(|()| device.flush());
                if let Err(err) = result {
                    if err.kind() != ErrorKind::TimedOut {
                        *state = None;
                    }
                    return Err(TransportError::Io(err));
                }
            }
            OpenPort::Stdio { writer, .. } => {
                writer.write_all(data).and_then(|()| writer.flush())?;
            }
        }
        Ok(())
    }
}

fn open_device(path: &Path, baud: u32) -> Result<Box<dyn serialport::SerialPort>> {
    serialport::new(path.to_string_lossy(), baud)
        .timeout(DEVICE_TIMEOUT)
        .data_bits(DataBits::Eight)
        .stop_bits(StopBits::One)
        .parity(Parity::None)
        .flow_control(FlowControl::None)
        .open()
        .map_err(|err| TransportError::Open {
            path: path.to_path_buf(),
            source: err.into(),
        })
}

/// Whatever the driver has buffered, without waiting for more.
fn read_available(device: &mut dyn serialport::SerialPort) -> std::io::Result<Option<Bytes>> {
    let available = device.bytes_to_read()? as usize;
    if available == 0 {
        return Ok(None);
    }

    let mut buf = vec![0u8; available.min(READ_CHUNK_SIZE)];
    match device.read(&mut buf) {
        Ok(0) => Err(ErrorKind::UnexpectedEof.into()),
        Ok(n) => {
            buf.truncate(n);
            Ok(Some(Bytes::from(buf)))
        }
        Err(err)
            if matches!(
                err.kind(),
                ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
            ) =>
        {
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn drain_stdin(rx: &mut mpsc::UnboundedReceiver<Bytes>, eof: &mut bool) -> Option<Bytes> {
    let mut buf = BytesMut::new();
    loop {
        match rx.try_recv() {
            Ok(chunk) => buf.extend_from_slice(&chunk),
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => {
                // stdin stays at EOF; keep writing to stdout.
                if buf.is_empty() && !*eof {
                    info!("serial input reached end of stream");
                    *eof = true;
                }
                break;
            }
        }
    }
    (!buf.is_empty()).then(|| buf.freeze())
}

fn pump_stdin(tx: mpsc::UnboundedSender<Bytes>) {
    let mut stdin = std::io::stdin();
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        match stdin.read(&mut chunk) {
            Ok(0) => {
                debug!("stdin reached EOF");
                return;
            }
            Ok(n) => {
                if tx.send(Bytes::copy_from_slice(&chunk[..n])).is_err() {
                    return;
                }
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                warn!(error = %err, "stdin read failed");
                return;
            }
        }
    }
}
