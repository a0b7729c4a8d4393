//! Line-oriented access to the encoder's serial port.
//!
//! The device writes one ASCII line per sample.  [`LineReader`] wraps any
//! [`Read`] implementation with a short read timeout and reassembles lines
//! across timeouts, so the caller can check its shutdown flag between reads
//! without ever losing a partial line.

use std::io::{ErrorKind, Read};
use std::time::Duration;

use locotrack_types::LocoError;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::info;

/// Source of newline-terminated text lines.
pub trait LineSource: Send {
    /// Read the next complete line without its terminator.
    ///
    /// Returns `Ok(None)` when no complete line arrived before the source's
    /// read timeout.  An empty string is a legitimate (blank) line.
    ///
    /// # Errors
    ///
    /// Returns [`LocoError::DeviceClosed`] once the device reports
    /// end-of-stream and [`LocoError::Io`] for other read failures.
    fn read_line(&mut self) -> Result<Option<String>, LocoError>;
}

/// Buffered line splitter over a byte stream with a read timeout.
pub struct LineReader<R> {
    inner: R,
    pending: Vec<u8>,
    chunk: [u8; 256],
    start: usize,
    end: usize,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Vec::with_capacity(64),
            chunk: [0; 256],
            start: 0,
            end: 0,
        }
    }

    /// Move buffered bytes up to the next `\n` into
    /// `pending`, consuming the terminator.  Returns `true` if one was found.
    fn take_buffered(&mut self) -> bool {
        let buffered = &self.chunk[self.start..self.end];
        match buffered.iter().position(|&b| b == b'\n') {
            Some(i) => {
                self.pending.extend_from_slice(&buffered[..i]);
                self.start += i + 1;
                true
            }
            None => {
                self.pending.extend_from_slice(buffered);
                self.start = self.end;
                false
            }
        }
    }

    fn finish_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.pending)
            .trim_end_matches('\r')
            .to_string();
        self.pending.clear();
        line
    }
}

impl<R: Read + Send> LineSource for LineReader<R> {
    fn read_line(&mut self) -> Result<Option<String>, LocoError> {
        loop {
            if self.take_buffered() {
                return Ok(Some(self.finish_line()));
            }

            match self.inner.read(&mut self.chunk) {
                Ok(0) => {
                    return Err(LocoError::DeviceClosed(
                        "serial stream reached end of file".to_string(),
                    ));
                }
                Ok(n) => {
                    self.start = 0;
                    self.end = n;
                }
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    return Ok(None);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Open `path` at `baud_rate` (8N1, no flow control) with the given read
/// timeout.
///
/// # Errors
///
/// Returns [`LocoError::DeviceOpen`] if the port cannot be opened.
pub fn open_serial(
    path: &str,
    baud_rate: u32,
    read_timeout: Duration,
) -> Result<LineReader<Box<dyn SerialPort>>, LocoError> {
    let port = serialport::new(path, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(read_timeout)
        .open()
        .map_err(|e| LocoError::DeviceOpen {
            path: path.to_string(),
            details: e.to_string(),
        })?;

    info!(path, baud_rate, "opened serial device");
    Ok(LineReader::new(port))
}
