//! Launching external programs and pumping their standard streams.

use crate::command::{EXIT_CODE_PIPING_ERROR, ExitCode, Stdin, Stdout, Streams};
use crate::env::{EnvMap, Environment};
use crate::error::{Error, Result};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::thread;

const PUMP_BUFFER_SIZE: usize = 16384;

#[cfg(windows)]
const PATH_SEPARATOR: char = ';';
#[cfg(not(windows))]
const PATH_SEPARATOR: char = ':';

/// Command that is not a builtin.
pub struct ExternalCommand {
    program: String,
    args: Vec<String>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `name` resolved through `PATH`/`PATHEXT`, falling back to the literal name
    /// and leaving any failure to the launch itself.
    pub fn resolve(name: &str, args: &[&str], env: &EnvMap) -> Self {
        Self::new(
            resolve_program(name, env),
            args.iter().map(|a| a.to_string()).collect(),
        )
    }

    fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Run the program to completion.
    ///
    /// The child gets exactly `env.vars` as its environment. Each stream that is
    /// the engine's own stdio is inherited; any other is connected through a pipe
    /// and a pump thread. The exit code is returned only after the child has exited
    /// and every pump has been joined.
    pub fn execute(self, env: &Environment, streams: &mut Streams<'_>) -> Result<ExitCode> {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args)
            .env_clear()
            .envs(env.vars.iter())
            .current_dir(&env.current_dir)
            .stdin(stdio_for(streams.stdin.inherited()))
            .stdout(stdio_for(streams.stdout.inherited()))
            .stderr(stdio_for(streams.stderr.inherited()));

        // anything already written in-process has to come out before the child's output
        streams.flush()?;

        log::debug!("spawning {:?} in {}", self.argv(), env.current_dir.display());
        let mut child = cmd.spawn().map_err(|source| Error::Launch {
            argv: self.argv(),
            pwd: env.current_dir.clone(),
            source,
        })?;

        let child_stdin = child.stdin.take();
        let child_stdout = child.stdout.take();
        let child_stderr = child.stderr.take();
        let input = &mut *streams.stdin;
        let output = &mut *streams.stdout;
        let error_output = &mut *streams.stderr;

        let (status, failures) = thread::scope(|s| -> Result<(ExitStatus, Vec<PumpFailure>)> {
            let mut pumps = Vec::new();
            if let Some(mut pipe) = child_stdin {
                pumps.push(("stdin", s.spawn(move || pump(input, &mut pipe, false))));
            }
            if let Some(mut pipe) = child_stdout {
                pumps.push(("stdout", s.spawn(move || pump(&mut pipe, output, true))));
            }
            if let Some(mut pipe) = child_stderr {
                pumps.push(("stderr", s.spawn(move || pump(&mut pipe, error_output, true))));
            }

            let status = child.wait().map_err(|source| Error::Wait {
                argv: self.argv(),
                source,
            })?;

            let mut failures = Vec::new();
            for (stream, handle) in pumps {
                let outcome = handle.join().map_err(|_| Error::PumpPanicked(stream))?;
                if let Err(error) = outcome {
                    failures.push(PumpFailure { stream, error });
                }
            }
            Ok((status, failures))
        })?;

        let mut code = exit_code(status);
        for failure in &failures {
            log::warn!(
                "pump for {} of {:?} failed: {}",
                failure.stream,
                self.program,
                failure.error
            );
            if let Err(e) = writeln!(streams.stderr, "Piping error: {}", failure.error) {
                log::warn!("could not report piping error: {e}");
            }
        }
        if code == 0 && !failures.is_empty() {
            code = EXIT_CODE_PIPING_ERROR;
        }
        log::debug!("{:?} exited with {}", self.program, code);
        Ok(code)
    }
}

/// Launch `name` with `args`, resolving it through `PATH`/`PATHEXT` first.
pub fn run(
    name: &str,
    args: &[&str],
    env: &Environment,
    streams: &mut Streams<'_>,
) -> Result<ExitCode> {
    ExternalCommand::resolve(name, args, &env.vars).execute(env, streams)
}

fn stdio_for(inherited: bool) -> Stdio {
    if inherited {
        Stdio::inherit()
    } else {
        Stdio::piped()
    }
}

struct PumpFailure {
    stream: &'static str,
    error: io::Error,
}

/// Copy `src` to `dst` until `src` is exhausted.
///
/// With `drain` set, a write failure stops writing but reading continues to the
/// end, so a child is never left blocked on a full pipe. Only the first error is
/// kept.
fn pump<R, W>(src: &mut R, dst: &mut W, drain: bool) -> io::Result<()>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = [0u8; PUMP_BUFFER_SIZE];
    let mut failure: Option<io::Error> = None;
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                failure.get_or_insert(e);
                break;
            }
        };
        if failure.is_some() {
            continue;
        }
        if let Err(e) = dst.write_all(&buf[..n]) {
            failure = Some(e);
            if !drain {
                break;
            }
        }
    }
    match failure {
        Some(e) => Err(e),
        None => dst.flush(),
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

fn exit_code(status: ExitStatus) -> ExitCode {
    status.code().unwrap_or_else(|| terminated_by_signal(status))
}

/// Resolve a program name the way `FindExe` would, taking the first match.
///
/// Names with more than one path component (or absolute ones) are used as given.
pub fn resolve_program(name: &str, env: &EnvMap) -> String {
    let path = Path::new(name);
    if path.is_absolute() || path.components().count() > 1 {
        return name.to_string();
    }
    match find_programs::<io::Sink>(name, env, None) {
        Ok(found) => found
            .into_iter()
            .next()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string()),
        Err(_) => name.to_string(),
    }
}

/// Every existing `<dir>/<name><ext>` for `dir` in `PATH` and `ext` in `PATHEXT`.
///
/// The empty extension is always tried first. With a `trace` writer, the search
/// is described step by step.
pub fn find_programs<W: Write + ?Sized>(
    name: &str,
    env: &EnvMap,
    mut trace: Option<&mut W>,
) -> io::Result<Vec<PathBuf>> {
    let paths = env.get("PATH").or_else(|| env.get("Path")).unwrap_or("");
    let dirs: Vec<PathBuf> = if paths.is_empty() {
        Vec::new()
    } else {
        std::env::split_paths(paths)
            .filter(|dir| !dir.as_os_str().is_empty())
            .collect()
    };
    let path_ext = env.get("PATHEXT").unwrap_or("");
    let exts: Vec<&str> = std::iter::once("")
        .chain(path_ext.split(PATH_SEPARATOR).filter(|ext| !ext.is_empty()))
        .collect();

    if let Some(out) = trace.as_deref_mut() {
        writeln!(out, "PATH: {paths}")?;
        writeln!(out, "Path separator: {PATH_SEPARATOR}")?;
        let items: Vec<String> = dirs.iter().map(|d| d.display().to_string()).collect();
        writeln!(out, "PATH items: {}", items.join(", "))?;
        writeln!(out, "PATHEXT: {path_ext}")?;
        writeln!(out, "PATHEXT items: {}", exts.join(", "))?;
    }

    let mut found = Vec::new();
    for dir in &dirs {
        for ext in &exts {
            let candidate = dir.join(format!("{name}{ext}"));
            log::trace!("checking {}", candidate.display());
            if let Some(out) = trace.as_deref_mut() {
                writeln!(out, "Checking for {}...", candidate.display())?;
            }
            if candidate.exists() {
                if let Some(out) = trace.as_deref_mut() {
                    writeln!(out, "Found {}", candidate.display())?;
                }
                found.push(candidate);
            }
        }
    }
    Ok(found)
}
