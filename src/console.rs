//! User-facing console output
//!
//! Progress lines, summaries and failure echoes are printed while the
//! terminal may be in raw mode, where a bare `\n` moves down without
//! returning the cursor. Everything written through [`RawSafe`] gets `\r\n`
//! line endings while raw mode is active.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Set while the key reader holds the terminal in raw mode
static RAW_MODE: AtomicBool = AtomicBool::new(false);

pub(crate) fn set_raw_mode(active: bool) {
    RAW_MODE.store(active, Ordering::SeqCst);
}

/// Returns true while the terminal is in raw mode.
pub fn raw_mode_active() -> bool {
    RAW_MODE.load(Ordering::SeqCst)
}

/// Writer adapter that translates line endings while raw mode is active
pub struct RawSafe<W: Write>(pub W);

impl<W: Write> Write for RawSafe<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !raw_mode_active() {
            return self.0.write(buf);
        }
        let mut translated = Vec::with_capacity(buf.len() + 8);
        let mut previous = 0u8;
        for &byte in buf {
            if byte == b'\n' && previous != b'\r' {
                translated.push(b'\r');
            }
            translated.push(byte);
            previous = byte;
        }
        self.0.write_all(&translated)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

/// Shared handle for user-facing output
///
/// Cloned into the runner, the failure log and the controller so that lines
/// from different threads never interleave mid-line.
#[derive(Clone)]
pub struct Console {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Console {
    /// Console printing to stdout.
    pub fn stdout() -> Self {
        Self::from_writer(io::stdout())
    }

    /// Console printing to an arbitrary writer.
    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(RawSafe(writer)))),
        }
    }

    /// Console backed by an in-memory buffer, for tests and embedding.
    pub fn capture() -> (Self, CaptureBuffer) {
        let buffer = CaptureBuffer::default();
        (Self::from_writer(buffer.clone()), buffer)
    }

    /// Print one line.
    pub fn line(&self, text: impl AsRef<str>) {
        self.write_text(&format!("{}\n", text.as_ref()));
    }

    /// Print a block of text verbatim.
    pub fn block(&self, text: impl AsRef<str>) {
        self.write_text(text.as_ref());
    }

    fn write_text(&self, text: &str) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        // Console output is best effort; a closed stdout must not stop the run.
        if let Err(e) = sink.write_all(text.as_bytes()).and_then(|_| sink.flush()) {
            tracing::debug!("Console write failed: {}", e);
        }
    }
}

/// In-memory sink that can be read back after writing
#[derive(Clone, Default)]
pub struct CaptureBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Drop everything written so far.
    pub fn clear(&self) {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_collects_lines() {
        let (console, buffer) = Console::capture();
        console.line("1/2: npm install a");
        console.line("2/2: npm install b");
        assert_eq!(
            buffer.contents(),
            "1/2: npm install a\n2/2: npm install b\n"
        );
    }

    #[test]
    fn test_raw_safe_passthrough_when_cooked() {
        let mut out = RawSafe(Vec::new());
        out.write_all(b"a\nb\r\n").unwrap();
        assert_eq!(out.0, b"a\nb\r\n");
    }

    #[test]
    fn test_clear_resets_capture() {
        let (console, buffer) = Console::capture();
        console.block("partial");
        buffer.clear();
        assert!(buffer.contents().is_empty());
    }
}
