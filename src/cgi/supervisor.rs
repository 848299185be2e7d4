//! Deadline-bound execution guard around one CGI child process.
//!
//! The child runs in its own process group so a timeout kill takes its
//! descendants with it. Body writing and output draining are driven through
//! a mio poll over the pipe fds, with the poll timeout pinned to the
//! remaining deadline, so a hung script cannot park us in a blocking read.

use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

use log::{debug, error, warn};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use thiserror::Error;

const STDOUT_TOKEN: Token = Token(0);
const STDIN_TOKEN: Token = Token(1);

/// How long terminate() waits for the kernel to reap a SIGKILLed child
/// before declaring it stuck.
const REAP_GRACE: Duration = Duration::from_millis(500);

/// The process ignored SIGKILL (unreapable zombie or kernel-stuck task).
#[derive(Debug, Error)]
#[error("process {pid} still running after SIGKILL")]
pub struct ProcessStillRunning {
    pub pid: u32,
}

/// Terminal outcome of one supervised run. Exactly one is produced.
#[derive(Debug)]
pub enum Verdict {
    /// Child exited before the deadline; its complete output is attached.
    Completed(Vec<u8>),
    /// Deadline fired; the process group was killed and partial output
    /// dropped.
    TimedOut,
    /// Deadline fired and the kill did not stick. Operator attention
    /// needed: the pid may be leaked.
    Unkillable { pid: u32 },
}

/// A spawned CGI child plus the process-group termination capability.
pub struct ChildHandle {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
}

impl ChildHandle {
    /// Spawn `command` with piped stdin/stdout in a fresh process group.
    pub fn spawn(mut command: Command) -> io::Result<Self> {
        command.stdin(Stdio::piped()).stdout(Stdio::piped());
        unsafe {
            // Runs in the forked child before exec: detach into our own
            // group so kill(-pgid) reaches every descendant.
            command.pre_exec(|| {
                if libc::setpgid(0, 0) != 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = command.spawn()?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        debug!("[CGI] spawned pid {}", child.id());

        Ok(Self { child, stdin, stdout })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Forcibly terminate the whole process group and reap the child.
    ///
    /// SIGKILL is not negotiable; if the process is still visible after the
    /// reap grace period it is reported as stuck rather than quietly
    /// abandoned.
    pub fn terminate(&mut self) -> Result<(), ProcessStillRunning> {
        let pid = self.child.id() as libc::pid_t;

        let rc = unsafe { libc::killpg(pid, libc::SIGKILL) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                warn!("[CGI] killpg({}) failed: {}", pid, err);
            }
        }

        let gave_up_at = Instant::now() + REAP_GRACE;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    debug!("[CGI] pid {} reaped after kill: {}", pid, status);
                    return Ok(());
                }
                Ok(None) => {
                    if Instant::now() >= gave_up_at {
                        return Err(ProcessStillRunning { pid: pid as u32 });
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                // ECHILD etc.: nothing left to reap.
                Err(_) => return Ok(()),
            }
        }
    }
}

pub struct Supervisor {
    deadline: Duration,
}

impl Supervisor {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    /// Stream `body` to the child, drain its output, and enforce the
    /// deadline. Consumes the handle: the process is either reaped or
    /// reported stuck by the time this returns, on error paths included.
    pub fn run(&self, mut handle: ChildHandle, body: &[u8]) -> io::Result<Verdict> {
        match self.drive(&mut handle, body) {
            Ok(verdict) => Ok(verdict),
            Err(e) => {
                // Never surface an error with the child still running.
                if let Err(stuck) = handle.terminate() {
                    error!("[CGI] escalation: {}", stuck);
                }
                Err(e)
            }
        }
    }

    fn drive(&self, handle: &mut ChildHandle, body: &[u8]) -> io::Result<Verdict> {
        let started = Instant::now();

        let mut stdin = handle.stdin.take();
        let mut stdout = match handle.stdout.take() {
            Some(s) => s,
            None => return Err(io::Error::other("child spawned without stdout pipe")),
        };

        // No bytes to send: close the pipe up front so the script sees EOF
        // on its stdin straight away.
        if body.is_empty() {
            stdin = None;
        }

        let mut poll = Poll::new()?;
        let mut events = Events::with_capacity(8);

        let stdout_fd = stdout.as_raw_fd();
        set_nonblocking(stdout_fd)?;
        poll.registry()
            .register(&mut SourceFd(&stdout_fd), STDOUT_TOKEN, Interest::READABLE)?;

        let mut stdin_fd: Option<RawFd> = None;
        if let Some(ref pipe) = stdin {
            let fd = pipe.as_raw_fd();
            set_nonblocking(fd)?;
            poll.registry()
                .register(&mut SourceFd(&fd), STDIN_TOKEN, Interest::WRITABLE)?;
            stdin_fd = Some(fd);
        }

        let mut written = 0usize;
        let mut output = Vec::new();
        let mut buf = [0u8; 4096];
        let mut saw_eof = false;

        while !saw_eof {
            let remaining = match self.deadline.checked_sub(started.elapsed()) {
                Some(d) if !d.is_zero() => d,
                _ => return self.expire(handle),
            };

            if let Err(e) = poll.poll(&mut events, Some(remaining)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e);
            }

            for event in events.iter() {
                match event.token() {
                    STDOUT_TOKEN => {
                        // Edge-triggered: drain until WouldBlock or EOF.
                        loop {
                            match stdout.read(&mut buf) {
                                Ok(0) => {
                                    saw_eof = true;
                                    break;
                                }
                                Ok(n) => output.extend_from_slice(&buf[..n]),
                                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                                // run() kills the child on any surfaced error.
                                Err(e) => return Err(e),
                            }
                        }
                    }
                    STDIN_TOKEN => {
                        let done = match stdin.as_mut() {
                            Some(pipe) => write_some(pipe, body, &mut written)?,
                            None => true,
                        };
                        if done {
                            if let Some(fd) = stdin_fd.take() {
                                poll.registry().deregister(&mut SourceFd(&fd))?;
                            }
                            // Drop closes the pipe; the script's stdin hits
                            // EOF once it has read the body.
                            stdin = None;
                        }
                    }
                    _ => {}
                }
            }
        }

        poll.registry().deregister(&mut SourceFd(&stdout_fd))?;
        drop(stdout);
        drop(stdin);

        // Output is complete; the child still has to exit within the
        // deadline for the run to count as completed.
        loop {
            match handle.child.try_wait()? {
                Some(status) => {
                    debug!(
                        "[CGI] pid {} exited: {} ({} output bytes in {:?})",
                        handle.child.id(),
                        status,
                        output.len(),
                        started.elapsed()
                    );
                    return Ok(Verdict::Completed(output));
                }
                None => {
                    if started.elapsed() >= self.deadline {
                        return self.expire(handle);
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
        }
    }

    /// Deadline elapsed: kill the group and map the result. Partial output
    /// never leaves this function.
    fn expire(&self, handle: &mut ChildHandle) -> io::Result<Verdict> {
        let pid = handle.pid();
        warn!("[CGI] pid {} exceeded {:?} deadline, killing process group", pid, self.deadline);
        match handle.terminate() {
            Ok(()) => Ok(Verdict::TimedOut),
            Err(stuck) => {
                error!("[CGI] escalation: {}", stuck);
                Ok(Verdict::Unkillable { pid: stuck.pid })
            }
        }
    }
}

/// Push more body bytes into the pipe. Returns `true` once everything is
/// written (or the child closed its end early, which is its prerogative).
fn write_some(pipe: &mut ChildStdin, body: &[u8], written: &mut usize) -> io::Result<bool> {
    while *written < body.len() {
        match pipe.write(&body[*written..]) {
            Ok(0) => return Ok(true),
            Ok(n) => *written += n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            // Script exited or closed stdin without reading it all.
            Err(ref e) if e.kind() == io::ErrorKind::BrokenPipe => return Ok(true),
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
