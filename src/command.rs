use std::fs::File;
use std::io::{self, Cursor, Read, Write};

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// Negative values produced by `exit` are passed through untouched.
pub type ExitCode = i32;

pub const EXIT_CODE_SUCCESS: ExitCode = 0;
/// Misuse of a built-in or of the engine's own options.
pub const EXIT_CODE_USAGE_ERROR: ExitCode = 2;
/// The child exited cleanly but copying one of its streams failed.
pub const EXIT_CODE_PIPING_ERROR: ExitCode = 23;
pub const EXIT_CODE_COMMAND_NOT_FOUND: ExitCode = 127;
pub const EXIT_CODE_INVALID_EXIT_ARGUMENT: ExitCode = 128;

/// Abstraction over a readable input stream handed to built-ins and child processes.
///
/// A handle that reports [`Stdin::inherited`] is the engine's own standard input,
/// which a child process can take over directly. Anything else is fed to the child
/// through a pipe.
pub trait Stdin: Read + Send {
    fn inherited(&self) -> bool {
        false
    }
}

/// Abstraction over a writable output stream (standard output or standard error).
///
/// Same contract as [`Stdin`]: inherited handles are passed to children as-is,
/// everything else receives the child's output through a pump thread.
pub trait Stdout: Write + Send {
    fn inherited(&self) -> bool {
        false
    }
}

impl Stdin for io::Empty {}
impl Stdin for File {}
impl Stdin for &[u8] {}
impl<T: AsRef<[u8]> + Send> Stdin for Cursor<T> {}

impl<T: Stdin + ?Sized> Stdin for &mut T {
    fn inherited(&self) -> bool {
        (**self).inherited()
    }
}

impl Stdout for io::Sink {}
impl Stdout for File {}
impl Stdout for Vec<u8> {}

impl<T: Stdout + ?Sized> Stdout for &mut T {
    fn inherited(&self) -> bool {
        (**self).inherited()
    }
}

/// The three standard streams of one dispatch call.
///
/// Built-ins write to `stdout`/`stderr` directly; the subprocess executor decides
/// per stream whether to inherit or to pipe.
pub struct Streams<'a> {
    pub stdin: &'a mut dyn Stdin,
    pub stdout: &'a mut dyn Stdout,
    pub stderr: &'a mut dyn Stdout,
}

impl<'a> Streams<'a> {
    pub fn new(
        stdin: &'a mut dyn Stdin,
        stdout: &'a mut dyn Stdout,
        stderr: &'a mut dyn Stdout,
    ) -> Self {
        Self {
            stdin,
            stdout,
            stderr,
        }
    }

    /// Flush both output handles.
    pub fn flush(&mut self) -> io::Result<()> {
        self.stdout.flush()?;
        self.stderr.flush()
    }
}
