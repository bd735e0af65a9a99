use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by the resource resolver and the subprocess executor.
///
/// Usage errors are not represented here: they are reported on the caller's
/// error stream and turned into an exit code by the dispatcher.
#[derive(Debug, Error)]
pub enum Error {
    #[error("couldn't resolve '{id}' to a readable resource: {reason}")]
    NotFound { id: String, reason: String },

    #[error("hash URN resolution not yet supported: {0}")]
    Unsupported(String),

    #[error("malformed identifier '{id}': {reason}")]
    Malformed { id: String, reason: String },

    #[error("failed to run process {argv:?} (pwd={})", .pwd.display())]
    Launch {
        argv: Vec<String>,
        pwd: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("interrupted while running process {argv:?}")]
    Wait {
        argv: Vec<String>,
        #[source]
        source: io::Error,
    },

    #[error("pump thread for {0} panicked")]
    PumpPanicked(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn not_found(id: &str, reason: impl ToString) -> Self {
        Error::NotFound {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed(id: &str, reason: impl ToString) -> Self {
        Error::Malformed {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
