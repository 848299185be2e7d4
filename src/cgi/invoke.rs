//! One-shot CGI invocation: validate the script, derive the environment,
//! spawn under the timeout supervisor, parse the output.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use log::{debug, info};

use crate::cgi::env::build_env;
use crate::cgi::parser::{self, ParsedResponse};
use crate::cgi::request::RequestContext;
use crate::cgi::supervisor::{ChildHandle, Supervisor, Verdict};
use crate::cgi::GatewayError;

/// The target executable of an invocation.
///
/// With an interpreter the child runs `interpreter script`, without one the
/// script itself must be a runnable binary.
pub struct CgiScript {
    pub path: PathBuf,
    pub interpreter: Option<PathBuf>,
}

impl CgiScript {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), interpreter: None }
    }

    pub fn with_interpreter(path: impl Into<PathBuf>, interpreter: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), interpreter: Some(interpreter.into()) }
    }

    /// The script (and interpreter, if any) must exist as executable
    /// regular files before we bother forking. A bad script path is the
    /// client's 404; a bad interpreter is the server's own config fault.
    fn validate(&self) -> Result<(), GatewayError> {
        check_executable(&self.path)?;
        if let Some(ref interp) = self.interpreter {
            check_executable(interp).map_err(|_| {
                GatewayError::SpawnFailed(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("CGI interpreter not executable: {}", interp.display()),
                ))
            })?;
        }
        Ok(())
    }
}

fn check_executable(path: &Path) -> Result<(), GatewayError> {
    let meta = std::fs::metadata(path)
        .map_err(|_| GatewayError::NotFound(path.to_path_buf()))?;
    if !meta.is_file() {
        return Err(GatewayError::NotFound(path.to_path_buf()));
    }
    if meta.permissions().mode() & 0o111 == 0 {
        return Err(GatewayError::NotFound(path.to_path_buf()));
    }
    Ok(())
}

/// Run one CGI request to completion under `deadline`.
///
/// Spawns exactly one child per call; nothing is pooled or reused. The
/// request body (up to the declared Content-Length) is piped to the child's
/// stdin, its stdout is drained and framed into a [`ParsedResponse`].
pub fn invoke(
    ctx: &RequestContext,
    script: &CgiScript,
    deadline: Duration,
) -> Result<ParsedResponse, GatewayError> {
    script.validate()?;

    let env = build_env(ctx, script);

    let mut command = match script.interpreter {
        Some(ref interp) => {
            let mut cmd = Command::new(interp);
            cmd.arg(&script.path);
            cmd
        }
        None => Command::new(&script.path),
    };
    command.env_clear().envs(&env);
    // Scripts expect relative paths to resolve next to themselves.
    if let Some(dir) = script.path.parent() {
        if !dir.as_os_str().is_empty() {
            command.current_dir(dir);
        }
    }

    let handle = ChildHandle::spawn(command).map_err(GatewayError::SpawnFailed)?;
    let pid = handle.pid();
    debug!(
        "[CGI] invoking {} (pid {}, deadline {:?})",
        script.path.display(),
        pid,
        deadline
    );

    let body = &ctx.body[..ctx.content_length()];
    match Supervisor::new(deadline).run(handle, body)? {
        Verdict::Completed(output) => {
            let response = parser::parse(&output)?;
            info!(
                "[CGI] pid {} -> {} {} ({} body bytes)",
                pid,
                response.status_code,
                response.status_phrase,
                response.body.len()
            );
            Ok(response)
        }
        Verdict::TimedOut => Err(GatewayError::TimedOut(deadline)),
        Verdict::Unkillable { pid } => Err(GatewayError::Unkillable(pid)),
    }
}
