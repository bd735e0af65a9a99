use jcr36::command::EXIT_CODE_COMMAND_NOT_FOUND;
use jcr36::{Error, ExitCode, Interpreter};
use std::io::ErrorKind;
use std::process::exit;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    let args: Vec<String> = std::env::args_os()
        .skip(1)
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let code = match Interpreter::default().run(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("jcr36: {e:#}");
            failure_code(&e)
        }
    };
    exit(code);
}

fn failure_code(e: &anyhow::Error) -> ExitCode {
    match e.downcast_ref::<Error>() {
        Some(Error::Launch { source, .. }) if source.kind() == ErrorKind::NotFound => {
            EXIT_CODE_COMMAND_NOT_FOUND
        }
        _ => 1,
    }
}
