use crate::alias::{self, Action};
use crate::builtin::{self, Cat, Exit, FindExe, Print, PrintEnv};
use crate::command::{EXIT_CODE_SUCCESS, EXIT_CODE_USAGE_ERROR, ExitCode, Streams};
use crate::env::{EnvMap, Environment};
use crate::external;
use crate::io_adapters::{InheritedStderr, InheritedStdin, InheritedStdout};
use crate::properties;
use crate::resource;
use anyhow::{Context, Result};
use std::io::{Read, Write};
use std::path::PathBuf;

pub const VERSION: &str = concat!("JCR36.", env!("CARGO_PKG_VERSION"));

pub const HELP_TEXT: &str = "\
Usage: jcr36 [--no-std-aliases] [jcr:docmd] [<opts>] [<k>=<v> ...] [--] <command> [<arg> ...]

Options:
  --cd=<dir>  ; use <dir> as the pwd for the following command
  --clear-env ; do not inherit environment variables (or aliases)
  --load-env-from-properties-file=<file|uri>
  --          ; treat the next argument as a command, even if it looks like an option

Commands:
  # Set environment variables and run the specified sub-command:
  jcr:docmd [<opts>] [<k>=<v> ...] <command> [<arg> ...]

  # Print words, separated by <separator> (default: one space);
  # -n to omit otherwise-implicit trailing newline:
  jcr:print [-n] [--ofs=<separator>] [--] [<word> ...]

  # Concatenate resources (files, file:, data:, x-jcr36-env: URIs):
  jcr:cat [--ofs=<separator>] [--] [<resource> ...]

  # Print all environment variables, sorted by name:
  jcr:printenv

  # Run a program found on PATH:
  jcr:runsys <program> [<arg> ...]

  # Exit with status code:
  jcr:exit [<code>]";

/// A top-level dispatcher bound to an initial environment.
///
/// Example
/// ```
/// use jcr36::{EnvMap, Environment, Interpreter, Streams};
/// use jcr36::io_adapters::MemWriter;
///
/// let sh = Interpreter::new(Environment::new(EnvMap::new(), "/"));
/// let mut out = MemWriter::new();
/// let code = sh
///     .run_with_streams(
///         &["jcr:print", "hello", "world"],
///         &mut Streams::new(&mut std::io::empty(), &mut out, &mut std::io::sink()),
///     )
///     .unwrap();
/// assert_eq!(code, 0);
/// assert_eq!(out.contents_lossy(), "hello world\n");
/// ```
pub struct Interpreter {
    env: Environment,
}

impl Interpreter {
    pub fn new(env: Environment) -> Self {
        Self { env }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Run an argument list against the process's own stdio.
    ///
    /// The standard aliases are injected unless the first argument is
    /// `--no-std-aliases`.
    pub fn run(&self, args: &[&str]) -> Result<ExitCode> {
        let mut stdin = InheritedStdin::default();
        let mut stdout = InheritedStdout::default();
        let mut stderr = InheritedStderr::default();
        let mut streams = Streams::new(&mut stdin, &mut stdout, &mut stderr);
        let code = self.run_with_streams(args, &mut streams)?;
        streams.flush()?;
        Ok(code)
    }

    pub fn run_with_streams(&self, args: &[&str], streams: &mut Streams<'_>) -> Result<ExitCode> {
        do_cmd_main(args, &self.env, streams)
    }
}

impl Default for Interpreter {
    /// An interpreter over the current process environment and working directory.
    fn default() -> Self {
        Self::new(Environment::from_process())
    }
}

/// Top-level entry: inject the standard aliases (unless `--no-std-aliases` comes
/// first) and dispatch the rest.
pub fn do_cmd_main(
    args: &[&str],
    env: &Environment,
    streams: &mut Streams<'_>,
) -> Result<ExitCode> {
    let (std_aliases, args) = match args.split_first() {
        Some((&"--no-std-aliases", rest)) => (false, rest),
        _ => (true, args),
    };
    let vars = if std_aliases {
        alias::with_aliases(&env.vars, alias::standard_aliases())
    } else {
        env.vars.clone()
    };
    do_cmd(args, &Environment::new(vars, env.current_dir.clone()), streams)
}

/// Dispatch state carried from one argument to the next.
struct Frame<'a> {
    args: &'a [&'a str],
    cursor: usize,
    /// Starts out sharing the caller's map; copied on first mutation.
    env: Environment,
    parse_options: bool,
}

impl<'a> Frame<'a> {
    fn current(&self) -> Option<&'a str> {
        self.args.get(self.cursor).copied()
    }

    /// Arguments after the current one.
    fn rest(&self) -> &'a [&'a str] {
        &self.args[self.cursor + 1..]
    }
}

/// Classification of one token while options are being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameOption<'a> {
    ClearEnv,
    EndOfOptions,
    Version,
    Help,
    LoadEnvFromPropertiesFile(&'a str),
    Cd(&'a str),
    Assign(&'a str, &'a str),
    Unrecognized,
    Command,
}

impl<'a> FrameOption<'a> {
    fn parse(arg: &'a str) -> Self {
        match arg {
            "--clear-env" => return FrameOption::ClearEnv,
            "--" => return FrameOption::EndOfOptions,
            "--version" => return FrameOption::Version,
            "--help" => return FrameOption::Help,
            _ => {}
        }
        if let Some(reference) = arg.strip_prefix("--load-env-from-properties-file=") {
            FrameOption::LoadEnvFromPropertiesFile(reference)
        } else if let Some(dir) = arg.strip_prefix("--cd=") {
            FrameOption::Cd(dir)
        } else if arg.starts_with('-') {
            FrameOption::Unrecognized
        } else {
            match arg.split_once('=') {
                Some((key, value)) if !key.is_empty() => FrameOption::Assign(key, value),
                _ => FrameOption::Command,
            }
        }
    }
}

/// Run `args` as a command line: options and assignments first, then a command.
///
/// `docmd` does not recurse: it re-enables option parsing and the loop carries on
/// with the same environment and working directory, so arbitrarily deep nesting
/// costs no stack.
pub fn do_cmd(args: &[&str], env: &Environment, streams: &mut Streams<'_>) -> Result<ExitCode> {
    let mut frame = Frame {
        args,
        cursor: 0,
        env: env.clone(),
        parse_options: true,
    };

    while let Some(arg) = frame.current() {
        if frame.parse_options {
            let option = FrameOption::parse(arg);
            log::trace!("option {arg:?}: {option:?}");
            match option {
                FrameOption::ClearEnv => {
                    // aliases live in the same map, so they go too
                    frame.env.vars = EnvMap::new();
                }
                FrameOption::EndOfOptions => frame.parse_options = false,
                FrameOption::Version => {
                    return builtin::run_parsed(Print::lines(&[VERSION]), &frame.env, streams);
                }
                FrameOption::Help => {
                    return builtin::run_parsed(
                        Print::lines(&[VERSION, "\n\n", HELP_TEXT]),
                        &frame.env,
                        streams,
                    );
                }
                FrameOption::LoadEnvFromPropertiesFile(reference) => {
                    frame.env.vars = load_env_from_properties_file(reference, &frame.env)?;
                }
                FrameOption::Cd(dir) => {
                    let dir = resource::resolve_file_path(&frame.env.current_dir, dir, false);
                    frame.env.current_dir = PathBuf::from(dir);
                }
                FrameOption::Assign(key, value) => frame.env.set_var(key, value),
                FrameOption::Unrecognized => {
                    writeln!(streams.stderr, "Unrecognized option: {arg:?}")?;
                    return Ok(EXIT_CODE_USAGE_ERROR);
                }
                FrameOption::Command => {}
            }
            if option != FrameOption::Command {
                frame.cursor += 1;
                continue;
            }
        }

        let action = Action::from_uri(alias::dealias(arg, &frame.env.vars));
        log::debug!("command {arg:?} -> {action:?}");
        let rest = frame.rest();
        return match action {
            Some(Action::DoCmd) => {
                frame.parse_options = true;
                frame.cursor += 1;
                continue;
            }
            Some(Action::Cat) => builtin::run::<Cat>(rest, &frame.env, streams),
            Some(Action::Exit) => builtin::run::<Exit>(rest, &frame.env, streams),
            Some(Action::FindExe) => builtin::run::<FindExe>(rest, &frame.env, streams),
            Some(Action::Print) => builtin::run::<Print>(rest, &frame.env, streams),
            Some(Action::PrintEnv) => builtin::run::<PrintEnv>(rest, &frame.env, streams),
            Some(Action::RunSysProc) => match rest.split_first() {
                Some((program, args)) => run_external(program, args, &frame.env, streams),
                None => {
                    writeln!(streams.stderr, "runsys: missing program name")?;
                    Ok(EXIT_CODE_USAGE_ERROR)
                }
            },
            // not an action: `arg` itself names the program
            None => run_external(arg, rest, &frame.env, streams),
        };
    }
    Ok(EXIT_CODE_SUCCESS)
}

fn run_external(
    program: &str,
    args: &[&str],
    env: &Environment,
    streams: &mut Streams<'_>,
) -> Result<ExitCode> {
    Ok(external::run(program, args, env, streams)?)
}

fn load_env_from_properties_file(reference: &str, env: &Environment) -> Result<EnvMap> {
    let mut bytes = Vec::new();
    resource::open(reference, &env.current_dir, &env.vars)
        .and_then(|mut input| Ok(input.read_to_end(&mut bytes)?))
        .with_context(|| format!("Error reading from properties file '{reference}'"))?;
    let mut vars = env.vars.clone();
    vars.extend(properties::parse(&String::from_utf8_lossy(&bytes)));
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::mangle_alias_key;
    use std::fs;

    struct Output {
        code: ExitCode,
        out: String,
        err: String,
    }

    fn run_in(env: &Environment, args: &[&str]) -> Output {
        let mut input = std::io::empty();
        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = {
            let mut streams = Streams::new(&mut input, &mut out, &mut err);
            do_cmd_main(args, env, &mut streams).unwrap()
        };
        Output {
            code,
            out: String::from_utf8(out).unwrap(),
            err: String::from_utf8(err).unwrap(),
        }
    }

    fn run(args: &[&str]) -> Output {
        run_in(&Environment::new(EnvMap::new(), std::env::temp_dir()), args)
    }

    #[test]
    fn test_frame_option_classification() {
        assert_eq!(FrameOption::parse("--clear-env"), FrameOption::ClearEnv);
        assert_eq!(FrameOption::parse("--"), FrameOption::EndOfOptions);
        assert_eq!(FrameOption::parse("--cd=sub"), FrameOption::Cd("sub"));
        assert_eq!(
            FrameOption::parse("--load-env-from-properties-file=x.properties"),
            FrameOption::LoadEnvFromPropertiesFile("x.properties")
        );
        assert_eq!(FrameOption::parse("foo=a=b"), FrameOption::Assign("foo", "a=b"));
        assert_eq!(FrameOption::parse("foo="), FrameOption::Assign("foo", ""));
        assert_eq!(FrameOption::parse("=x"), FrameOption::Command);
        assert_eq!(FrameOption::parse("-x"), FrameOption::Unrecognized);
        assert_eq!(FrameOption::parse("jcr:print"), FrameOption::Command);
    }

    /// Output of `do_cmd` (no standard aliases) in an env where `--clear-env`
    /// is aliased to print.
    fn run_with_clear_env_alias(args: &[&str]) -> Output {
        let vars = alias::with_aliases(&EnvMap::new(), [("--clear-env", Action::Print.uri())]);
        let env = Environment::new(vars, std::env::temp_dir());
        let mut input = std::io::empty();
        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = {
            let mut streams = Streams::new(&mut input, &mut out, &mut err);
            do_cmd(args, &env, &mut streams).unwrap()
        };
        Output {
            code,
            out: String::from_utf8(out).unwrap(),
            err: String::from_utf8(err).unwrap(),
        }
    }

    #[test]
    fn test_option_wins_over_alias_of_the_same_name() {
        let res = run_with_clear_env_alias(&[
            Action::DoCmd.uri(),
            "--clear-env",
            Action::Print.uri(),
            "foo",
        ]);
        assert_eq!(res.code, 0);
        assert_eq!(res.out, "foo\n");
    }

    #[test]
    fn test_post_dash_dash_optionesque_command() {
        let res = run_with_clear_env_alias(&[
            Action::DoCmd.uri(),
            "--",
            "--clear-env",
            Action::Print.uri(),
            "foo",
        ]);
        assert_eq!(res.code, 0);
        assert_eq!(res.out, format!("{} foo\n", Action::Print.uri()));
    }

    #[test]
    fn test_nested_docmd_resets_option_parsing() {
        let res = run_with_clear_env_alias(&[
            Action::DoCmd.uri(),
            "--",
            Action::DoCmd.uri(),
            "--clear-env",
            Action::Print.uri(),
            "foo",
        ]);
        assert_eq!(res.code, 0, "stderr was {:?}", res.err);
        assert_eq!(res.out, "foo\n");
    }

    #[test]
    fn test_deep_docmd_nesting() {
        let mut args = vec![Action::DoCmd.uri(); 100_000];
        args.extend([Action::Print.uri(), "deep"]);
        assert_eq!(run(&args).out, "deep\n");
    }

    #[test]
    fn test_no_arguments_succeeds() {
        let res = run(&[]);
        assert_eq!(res.code, 0);
        assert_eq!(res.out, "");
        assert_eq!(run(&["jcr:docmd", "foo=bar"]).code, 0);
    }

    #[test]
    fn test_print_by_alias_and_by_uri() {
        assert_eq!(run(&["jcr:print", "hello", "world"]).out, "hello world\n");
        assert_eq!(run(&[Action::Print.uri(), "-n", "hi"]).out, "hi");
    }

    #[test]
    fn test_exit_by_uri() {
        assert_eq!(run(&[Action::Exit.uri(), "5"]).code, 5);
        assert_eq!(run(&["jcr:exit", "-456"]).code, -456);
    }

    #[test]
    fn test_option_is_not_parsed_as_command() {
        // the print's --ofs belongs to print, not to the frame
        let res = run(&["jcr:docmd", "jcr:print", "--ofs=,", "a", "b"]);
        assert_eq!(res.out, "a,b\n");
    }

    #[test]
    fn test_dash_dash_stops_option_parsing() {
        // after "--", a token that would be docmd is a command, so the alias
        // URI is printed as a word by the following print
        let res = run(&["--", "jcr:print", Action::Print.uri(), "foo"]);
        assert_eq!(res.out, format!("{} foo\n", Action::Print.uri()));

        // print's own "--" is separate from the frame's
        let res = run(&["--", "jcr:print", "--", "a=b"]);
        assert_eq!(res.out, "a=b\n");
    }

    #[test]
    fn test_docmd_resets_option_parsing() {
        let res = run(&["--", "jcr:docmd", "foo=bar", "jcr:printenv"]);
        assert!(res.out.contains("foo=bar\n"), "stdout was {:?}", res.out);
    }

    #[test]
    fn test_clear_env_drops_variables_and_aliases() {
        let vars: EnvMap = [("foo", "abc")].into_iter().collect();
        let env = Environment::new(vars, std::env::temp_dir());

        let res = run_in(
            &env,
            &["jcr:docmd", "--clear-env", "bar=xyz", Action::PrintEnv.uri()],
        );
        assert_eq!(res.code, 0);
        assert_eq!(res.out, "bar=xyz\n");

        // with the aliases gone, jcr:print names a program, and an empty PATH
        // can't find it
        let mut input = std::io::empty();
        let mut out = Vec::new();
        let mut err = Vec::new();
        let mut streams = Streams::new(&mut input, &mut out, &mut err);
        let e = do_cmd_main(&["--clear-env", "jcr:print", "x"], &env, &mut streams).unwrap_err();
        assert!(matches!(
            e.downcast_ref::<crate::Error>(),
            Some(crate::Error::Launch { .. })
        ));
    }

    #[test]
    fn test_assignments_do_not_leak_into_callers_env() {
        let vars: EnvMap = [("foo", "abc")].into_iter().collect();
        let env = Environment::new(vars.clone(), std::env::temp_dir());
        run_in(&env, &["foo=changed", "jcr:printenv"]);
        assert_eq!(env.get_var("foo"), Some("abc"));
        assert!(env.vars.shares_storage_with(&vars));
    }

    #[test]
    fn test_cat_env_uris() {
        let res = run(&[
            "foo=abc",
            "bar=xyz",
            "jcr:cat",
            "data:,[",
            "x-jcr36-env:foo",
            "x-jcr36-env:bar",
            "data:,]",
        ]);
        assert_eq!(res.code, 0);
        assert_eq!(res.out, "[abcxyz]");
    }

    #[test]
    fn test_load_env_from_properties_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("test.properties"), "foo=abc\nbar : xyz\nbaz=\n").unwrap();
        let env = Environment::new(EnvMap::new(), dir.path());

        let res = run_in(
            &env,
            &[
                "--load-env-from-properties-file=test.properties",
                "jcr:cat",
                "data:,[foo=",
                "x-jcr36-env:foo",
                "data:,, bar=",
                "x-jcr36-env:bar",
                "data:,, baz=",
                "x-jcr36-env:baz",
                "data:,]",
            ],
        );
        assert_eq!(res.code, 0, "stderr was {:?}", res.err);
        assert_eq!(res.out, "[foo=abc, bar=xyz, baz=]");
    }

    #[test]
    fn test_properties_override_earlier_assignments() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.properties"), "foo=from-file\n").unwrap();
        let env = Environment::new(EnvMap::new(), dir.path());
        let res = run_in(
            &env,
            &[
                "foo=inline",
                "--load-env-from-properties-file=a.properties",
                "jcr:cat",
                "x-jcr36-env:foo",
            ],
        );
        assert_eq!(res.out, "from-file");
    }

    #[test]
    fn test_missing_properties_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let env = Environment::new(EnvMap::new(), dir.path());
        let mut out = Vec::new();
        let mut err = Vec::new();
        let mut input = std::io::empty();
        let mut streams = Streams::new(&mut input, &mut out, &mut err);
        let e = do_cmd_main(
            &["--load-env-from-properties-file=nope.properties", "jcr:print"],
            &env,
            &mut streams,
        )
        .unwrap_err();
        assert!(
            format!("{e:#}").starts_with("Error reading from properties file 'nope.properties'"),
            "error was {e:#}"
        );
    }

    #[test]
    fn test_unrecognized_option() {
        let res = run(&["--frobnicate", "jcr:print", "x"]);
        assert_eq!(res.code, EXIT_CODE_USAGE_ERROR);
        assert_eq!(res.out, "");
        assert!(res.err.contains("--frobnicate"), "stderr was {:?}", res.err);
    }

    #[test]
    fn test_cd_changes_current_dir_for_resources() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("hi.txt"), "hi").unwrap();
        let env = Environment::new(EnvMap::new(), dir.path());

        let res = run_in(&env, &["--cd=sub", "jcr:cat", "hi.txt"]);
        assert_eq!(res.code, 0, "stderr was {:?}", res.err);
        assert_eq!(res.out, "hi");

        // relative --cd options accumulate
        let res = run_in(&env, &["--cd=sub", "--cd=..", "jcr:cat", "sub/hi.txt"]);
        assert_eq!(res.out, "hi");
    }

    #[test]
    fn test_version_and_help() {
        let res = run(&["--version"]);
        assert_eq!(res.code, 0);
        assert_eq!(res.out, format!("{VERSION}\n"));
        assert!(res.out.starts_with("JCR36."));

        let res = run(&["jcr:docmd", "--help"]);
        assert_eq!(res.code, 0);
        assert!(res.out.starts_with(&format!("{VERSION}\n\nUsage:")));
    }

    #[test]
    fn test_no_std_aliases() {
        let res = run(&["--no-std-aliases", Action::Print.uri(), "x"]);
        assert_eq!(res.out, "x\n");

        // an alias supplied by the caller still works
        let vars: EnvMap = [(mangle_alias_key("say"), Action::Print.uri())]
            .into_iter()
            .collect();
        let env = Environment::new(vars, std::env::temp_dir());
        assert_eq!(run_in(&env, &["--no-std-aliases", "say", "hi"]).out, "hi\n");
    }

    #[test]
    fn test_user_alias_via_assignment() {
        let key = format!("{}={}", mangle_alias_key("say"), Action::Print.uri());
        let res = run(&[key.as_str(), "say", "hello"]);
        assert_eq!(res.out, "hello\n");
    }

    #[test]
    fn test_runsys_without_program() {
        let res = run(&["jcr:runsys"]);
        assert_eq!(res.code, EXIT_CODE_USAGE_ERROR);
        assert!(!res.err.is_empty());
    }

    #[test]
    fn test_interpreter_with_mem_writer() {
        let sh = Interpreter::new(Environment::new(EnvMap::new(), std::env::temp_dir()));
        let out = crate::io_adapters::MemWriter::new();
        let code = sh
            .run_with_streams(
                &["jcr:print", "--ofs=-", "a", "b"],
                &mut Streams::new(&mut std::io::empty(), &mut out.clone(), &mut std::io::sink()),
            )
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(out.contents_lossy(), "a-b\n");
    }
}
