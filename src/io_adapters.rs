use crate::command::{Stdin, Stdout};
use std::io::{self, Cursor, Read, Result as IoResult, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// The engine's own standard input. Children inherit it instead of being fed through a pipe.
pub struct InheritedStdin(io::Stdin);

impl Default for InheritedStdin {
    fn default() -> Self {
        Self(io::stdin())
    }
}

impl Read for InheritedStdin {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.0.read(buf)
    }
}

impl Stdin for InheritedStdin {
    fn inherited(&self) -> bool {
        true
    }
}

/// The engine's own standard output.
pub struct InheritedStdout(io::Stdout);

impl Default for InheritedStdout {
    fn default() -> Self {
        Self(io::stdout())
    }
}

impl Write for InheritedStdout {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.0.write(data)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.0.flush()
    }
}

impl Stdout for InheritedStdout {
    fn inherited(&self) -> bool {
        true
    }
}

/// The engine's own standard error.
pub struct InheritedStderr(io::Stderr);

impl Default for InheritedStderr {
    fn default() -> Self {
        Self(io::stderr())
    }
}

impl Write for InheritedStderr {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.0.write(data)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.0.flush()
    }
}

impl Stdout for InheritedStderr {
    fn inherited(&self) -> bool {
        true
    }
}

/// Memory-backed reader, fed to a child through a pipe.
pub struct MemReader {
    cursor: Cursor<Vec<u8>>,
}

impl MemReader {
    /// Create a MemReader that will read from the provided buffer.
    pub fn new(buf: impl Into<Vec<u8>>) -> Self {
        Self {
            cursor: Cursor::new(buf.into()),
        }
    }
}

impl Read for MemReader {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        self.cursor.read(out)
    }
}

impl Stdin for MemReader {}

/// Memory-backed writer for capturing output.
///
/// Clones share one buffer, so the same collector can serve as both stdout and
/// stderr of a call, and can be read back after the call returns.
#[derive(Clone, Default)]
pub struct MemWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Everything written so far, lossily decoded as UTF-8.
    pub fn contents_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

impl Stdout for MemWriter {}
