use crate::command::{EXIT_CODE_INVALID_EXIT_ARGUMENT, EXIT_CODE_USAGE_ERROR, ExitCode, Streams};
use crate::env::Environment;
use crate::external;
use crate::resource;
use anyhow::Result;
use argh::{EarlyExit, FromArgs};
use std::io::{self, Write};

/// Built-in actions executed in-process.
///
/// `parse` sees only the arguments following the command token. A parse failure
/// is reported on the error stream as a usage error; `EarlyExit` with an `Ok`
/// status (e.g. `--help` on an `argh` built-in) is printed to the output stream.
pub(crate) trait BuiltinCommand: Sized {
    /// Short name used in diagnostics, e.g. "print" or "cat".
    fn name() -> &'static str;

    fn parse(args: &[&str]) -> Result<Self, EarlyExit>;

    /// Return value follows shell conventions: 0 for success, non-zero for error.
    fn execute(self, env: &Environment, streams: &mut Streams<'_>) -> Result<ExitCode>;
}

/// Parse and run `T` against the arguments following its command token.
pub(crate) fn run<T: BuiltinCommand>(
    args: &[&str],
    env: &Environment,
    streams: &mut Streams<'_>,
) -> Result<ExitCode> {
    log::debug!("builtin {} {:?}", T::name(), args);
    match T::parse(args) {
        Ok(cmd) => run_parsed(cmd, env, streams),
        Err(EarlyExit {
            output,
            status: Ok(()),
        }) => {
            streams.stdout.write_all(output.as_bytes())?;
            Ok(0)
        }
        Err(EarlyExit {
            output,
            status: Err(()),
        }) => {
            writeln!(streams.stderr, "{}: {}", T::name(), output.trim_end())?;
            Ok(EXIT_CODE_USAGE_ERROR)
        }
    }
}

/// Run an already-constructed built-in. Errors are reported on the error stream
/// and turned into exit code 1.
pub(crate) fn run_parsed<T: BuiltinCommand>(
    cmd: T,
    env: &Environment,
    streams: &mut Streams<'_>,
) -> Result<ExitCode> {
    match cmd.execute(env, streams) {
        Ok(code) => Ok(code),
        Err(e) => {
            writeln!(streams.stderr, "{}: {:#}", T::name(), e)?;
            Ok(1)
        }
    }
}

fn usage_error(output: String) -> EarlyExit {
    EarlyExit {
        output,
        status: Err(()),
    }
}

/// Consume leading options, returning the operands that follow them.
///
/// `--` ends the scan and is itself consumed; the first token not starting with
/// `-` ends it and is kept. `accept` returns `false` for tokens it doesn't know.
fn leading_options<'a, 'b>(
    args: &'b [&'a str],
    mut accept: impl FnMut(&'a str) -> bool,
) -> Result<&'b [&'a str], EarlyExit> {
    for (i, &arg) in args.iter().enumerate() {
        if arg == "--" {
            return Ok(&args[i + 1..]);
        }
        if !arg.starts_with('-') {
            return Ok(&args[i..]);
        }
        if !accept(arg) {
            return Err(usage_error(format!("unrecognized argument: {arg:?}")));
        }
    }
    Ok(&[])
}

/// Write the arguments to standard output, separated by `--ofs` (default one space).
/// By default, a trailing newline is printed.
pub struct Print {
    pub no_newline: bool,
    pub ofs: String,
    pub words: Vec<String>,
}

impl Print {
    /// Words printed back to back, followed by a newline.
    pub fn lines<S: ToString>(words: &[S]) -> Self {
        Print {
            no_newline: false,
            ofs: String::new(),
            words: words.iter().map(ToString::to_string).collect(),
        }
    }
}

impl BuiltinCommand for Print {
    fn name() -> &'static str {
        "print"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        let mut no_newline = false;
        let mut ofs = " ".to_string();
        let words = leading_options(args, |arg| {
            if arg == "-n" {
                no_newline = true;
            } else if let Some(sep) = arg.strip_prefix("--ofs=") {
                ofs = sep.to_string();
            } else {
                return false;
            }
            true
        })?;
        Ok(Print {
            no_newline,
            ofs,
            words: words.iter().map(|w| w.to_string()).collect(),
        })
    }

    fn execute(self, _env: &Environment, streams: &mut Streams<'_>) -> Result<ExitCode> {
        let s = self.words.join(&self.ofs);
        if self.no_newline {
            write!(streams.stdout, "{}", s)?;
        } else {
            writeln!(streams.stdout, "{}", s)?;
        }
        Ok(0)
    }
}

/// Concatenate the named resources to standard output.
pub struct Cat {
    /// Written between consecutive resources; empty by default.
    pub ofs: String,
    pub resources: Vec<String>,
}

impl BuiltinCommand for Cat {
    fn name() -> &'static str {
        "cat"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        let mut ofs = String::new();
        let resources = leading_options(args, |arg| match arg.strip_prefix("--ofs=") {
            Some(sep) => {
                ofs = sep.to_string();
                true
            }
            None => false,
        })?;
        Ok(Cat {
            ofs,
            resources: resources.iter().map(|r| r.to_string()).collect(),
        })
    }

    fn execute(self, env: &Environment, streams: &mut Streams<'_>) -> Result<ExitCode> {
        for (n, id) in self.resources.iter().enumerate() {
            if n > 0 {
                streams.stdout.write_all(self.ofs.as_bytes())?;
            }
            let mut input = match resource::open(id, &env.current_dir, &env.vars) {
                Ok(input) => input,
                Err(e) => {
                    writeln!(streams.stderr, "Failed to open {}: {}", id, e)?;
                    return Ok(1);
                }
            };
            if let Err(e) = io::copy(&mut input, &mut *streams.stdout) {
                writeln!(streams.stderr, "Failed to read {}: {}", id, e)?;
                return Ok(1);
            }
        }
        Ok(0)
    }
}

/// Exit with the given status code (default 0).
pub struct Exit {
    pub code: Option<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    // Hand-parsed: negative codes look like options.
    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        match args {
            [] => Ok(Exit { code: None }),
            [code] => Ok(Exit {
                code: Some(code.to_string()),
            }),
            _ => Err(usage_error(format!("too many arguments: {args:?}"))),
        }
    }

    fn execute(self, _env: &Environment, streams: &mut Streams<'_>) -> Result<ExitCode> {
        let Some(code) = self.code else {
            return Ok(0);
        };
        match code.parse::<ExitCode>() {
            Ok(code) => Ok(code),
            Err(_) => {
                writeln!(
                    streams.stderr,
                    "exit: failed to parse {:?} as integer",
                    code
                )?;
                Ok(EXIT_CODE_INVALID_EXIT_ARGUMENT)
            }
        }
    }
}

#[derive(FromArgs)]
/// Print every environment variable as key=value, sorted by key.
pub struct PrintEnv {}

impl BuiltinCommand for PrintEnv {
    fn name() -> &'static str {
        "printenv"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        PrintEnv::from_args(&[Self::name()], args)
    }

    fn execute(self, env: &Environment, streams: &mut Streams<'_>) -> Result<ExitCode> {
        for (key, value) in env.vars.sorted() {
            writeln!(streams.stdout, "{}={}", key, value)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Find executables by searching PATH crossed with PATHEXT.
pub struct FindExe {
    #[argh(switch, short = 'v')]
    /// trace the search on standard error.
    pub verbose: bool,

    #[argh(positional, greedy)]
    /// program names to look for.
    pub names: Vec<String>,
}

impl BuiltinCommand for FindExe {
    fn name() -> &'static str {
        "findexe"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        FindExe::from_args(&[Self::name()], args)
    }

    fn execute(self, env: &Environment, streams: &mut Streams<'_>) -> Result<ExitCode> {
        for name in &self.names {
            let trace = if self.verbose {
                Some(&mut *streams.stderr)
            } else {
                None
            };
            for path in external::find_programs(name, &env.vars, trace)? {
                writeln!(streams.stdout, "{}", path.display())?;
            }
        }
        Ok(0)
    }
}
