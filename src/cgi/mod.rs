//! CGI/1.1 gateway: environment construction, process supervision and
//! response parsing for scripts invoked per request.

pub mod env;
pub mod invoke;
pub mod parser;
pub mod request;
pub mod supervisor;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub use invoke::{CgiScript, invoke};
pub use parser::{ParsedResponse, parse, reason_phrase};
pub use request::RequestContext;
pub use supervisor::{ChildHandle, Supervisor, Verdict};

/// Malformed script output.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The blank line separating headers from body never appeared.
    #[error("no blank line between CGI headers and body")]
    MissingDelimiter,
    /// A `Status` header was present but its code was absent or non-numeric.
    #[error("unparseable Status header: {0:?}")]
    BadStatusHeader(String),
}

/// Everything that can go wrong with one CGI invocation. Each variant maps
/// to exactly one caller-visible HTTP status via [`GatewayError::status_code`].
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Script missing, not a regular file, or not executable.
    #[error("CGI script not found or not executable: {}", .0.display())]
    NotFound(PathBuf),

    /// The OS refused to spawn the child process.
    #[error("failed to spawn CGI process")]
    SpawnFailed(#[source] io::Error),

    /// The child produced output we could not frame as a CGI response.
    #[error("invalid CGI output")]
    BadOutput(#[from] ParseError),

    /// The deadline elapsed; the process group was killed and its partial
    /// output discarded.
    #[error("CGI process exceeded {0:?} deadline")]
    TimedOut(Duration),

    /// The deadline elapsed and the process survived SIGKILL. The pid is
    /// reported so an operator can hunt the orphan down.
    #[error("CGI process {0} survived SIGKILL after timeout")]
    Unkillable(u32),

    /// I/O failure while piping data to or from the child.
    #[error("I/O error driving CGI process")]
    Io(#[from] io::Error),
}

impl GatewayError {
    /// HTTP status the calling server should substitute for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::NotFound(_) => 404,
            GatewayError::SpawnFailed(_) => 500,
            GatewayError::BadOutput(_) => 502,
            GatewayError::TimedOut(_) => 504,
            GatewayError::Unkillable(_) => 500,
            GatewayError::Io(_) => 500,
        }
    }
}
