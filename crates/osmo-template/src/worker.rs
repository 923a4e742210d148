//! A single isolated template-rendering worker (spec §4.2 steps 1-3, 5).
//!
//! Each worker is a forked child process: after `fork(2)` the child installs
//! an OS-level virtual-memory cap via `setrlimit(RLIMIT_AS, ...)` (where the
//! platform supports it), then loops reading length-prefixed render requests
//! off a pipe and writing length-prefixed responses back. All of this is
//! blocking OS-level I/O, so the pool always drives a [`Worker`] from inside
//! `tokio::task::spawn_blocking`.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;

use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use serde::{Deserialize, Serialize};

use crate::sandbox::render_once;
use crate::TemplateError;

#[derive(Debug, Serialize, Deserialize)]
struct RenderRequest {
    template_text: String,
    variables: serde_json::Map<String, serde_json::Value>,
}

/// Tags the subprocess reply with which [`TemplateError`] variant produced
/// it, so the classification `sandbox::classify_render_error` makes (spec
/// §4.2's error taxonomy) survives the wire crossing instead of collapsing
/// to one generic error on the real (forked) render path.
#[derive(Debug, Serialize, Deserialize)]
enum RenderErrorKind {
    Undefined,
    Forbidden,
    Syntax,
    Internal,
}

#[derive(Debug, Serialize, Deserialize)]
enum RenderReply {
    Ok(String),
    Err(RenderErrorKind, String),
}

/// A live, already-forked rendering worker.
pub struct Worker {
    pid: Pid,
    channel: UnixStream,
    memory_limit: Option<u64>,
}

impl Worker {
    /// Forks a new worker, installing `memory_limit` (bytes) as `RLIMIT_AS`
    /// in the child when given (spec §4.2 step 2: "where available").
    ///
    /// # Safety
    /// `fork(2)` is only safe here because the child immediately narrows down
    /// to a single-threaded blocking read/render/write loop and never touches
    /// the parent's async runtime, matching the isolation the spec calls for.
    pub fn spawn(memory_limit: Option<u64>) -> Result<Self, TemplateError> {
        let (parent_sock, child_sock) =
            UnixStream::pair().map_err(|e| TemplateError::Internal(format!("pipe: {e}")))?;

        match unsafe { fork() }.map_err(|e| TemplateError::Internal(format!("fork: {e}")))? {
            ForkResult::Parent { child } => {
                drop(child_sock);
                parent_sock
                    .set_nonblocking(false)
                    .map_err(|e| TemplateError::Internal(format!("socket: {e}")))?;
                Ok(Worker { pid: child, channel: parent_sock, memory_limit })
            }
            ForkResult::Child => {
                drop(parent_sock);
                if let Some(limit) = memory_limit {
                    // Best-effort: some sandboxes (containers without
                    // CAP_SYS_RESOURCE, some BSDs) reject this; the worker
                    // still runs, just without the hard OS cap.
                    let _ = setrlimit(Resource::RLIMIT_AS, limit, limit);
                }
                run_child_loop(child_sock);
                std::process::exit(0);
            }
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Sends one render request and blocks for the reply. The caller is
    /// expected to race this behind a timeout (spec §4.2 step 4).
    pub fn render(&mut self, template_text: &str, variables: &serde_json::Map<String, serde_json::Value>) -> Result<String, TemplateError> {
        let request = RenderRequest {
            template_text: template_text.to_string(),
            variables: variables.clone(),
        };
        let payload = serde_json::to_vec(&request).map_err(|e| TemplateError::Internal(e.to_string()))?;
        write_frame(&mut self.channel, &payload).map_err(|_| TemplateError::WorkerExhausted(0))?;

        let reply_bytes = read_frame(&mut self.channel).map_err(|_| TemplateError::WorkerExhausted(0))?;
        let reply: RenderReply =
            serde_json::from_slice(&reply_bytes).map_err(|e| TemplateError::Internal(e.to_string()))?;
        match reply {
            RenderReply::Ok(text) => Ok(text),
            RenderReply::Err(RenderErrorKind::Undefined, message) => Err(TemplateError::UndefinedVariable(message)),
            RenderReply::Err(RenderErrorKind::Forbidden, message) => Err(TemplateError::Forbidden(message)),
            RenderReply::Err(RenderErrorKind::Syntax, message) => Err(TemplateError::Syntax(message)),
            RenderReply::Err(RenderErrorKind::Internal, message) => Err(TemplateError::Internal(message)),
        }
    }

    /// Forcibly terminates the worker (spec §4.2 step 4: "the parent kills
    /// the child" on timeout).
    pub fn kill(&self) {
        let _ = kill(self.pid, Signal::SIGKILL);
        let _ = waitpid(self.pid, None);
    }

    /// Reaps the child and classifies why it died, for callers that already
    /// know the pipe broke (spec §4.2 step 5: "wrapped as MemoryError with
    /// the configured limit in the message"). `setrlimit(RLIMIT_AS)`
    /// exhaustion typically surfaces as the allocator aborting (`SIGABRT`)
    /// or, depending on the allocator, `SIGSEGV`/`SIGKILL`; only reported as
    /// `Memory` when a limit was actually configured for this worker, since
    /// those same signals can also come from an unrelated crash.
    pub fn crash_reason(&self) -> Option<TemplateError> {
        let limit = self.memory_limit?;
        match waitpid(self.pid, None) {
            Ok(WaitStatus::Signaled(_, Signal::SIGABRT | Signal::SIGSEGV | Signal::SIGKILL, _)) => {
                Some(TemplateError::Memory(limit))
            }
            _ => None,
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Idempotent: if the child is already reaped (by `kill`, by
        // `crash_reason`, or by the parent process on a timeout kill issued
        // against this same pid from elsewhere) both calls harmlessly fail.
        let _ = kill(self.pid, Signal::SIGKILL);
        let _ = waitpid(self.pid, None);
    }
}

fn run_child_loop(socket: UnixStream) {
    let mut socket = socket;
    loop {
        let request_bytes = match read_frame(&mut socket) {
            Ok(bytes) => bytes,
            Err(_) => break, // parent closed the pipe (shutdown or restart)
        };
        let reply = match serde_json::from_slice::<RenderRequest>(&request_bytes) {
            Ok(request) => match render_once(&request.template_text, &request.variables) {
                Ok(text) => RenderReply::Ok(text),
                Err(e) => {
                    let kind = match &e {
                        TemplateError::UndefinedVariable(_) => RenderErrorKind::Undefined,
                        TemplateError::Forbidden(_) => RenderErrorKind::Forbidden,
                        TemplateError::Syntax(_) => RenderErrorKind::Syntax,
                        _ => RenderErrorKind::Internal,
                    };
                    RenderReply::Err(kind, e.to_string())
                }
            },
            Err(e) => RenderReply::Err(RenderErrorKind::Internal, format!("malformed request: {e}")),
        };
        let Ok(payload) = serde_json::to_vec(&reply) else { break };
        if write_frame(&mut socket, &payload).is_err() {
            break;
        }
    }
}

fn write_frame(stream: &mut UnixStream, payload: &[u8]) -> std::io::Result<()> {
    stream.write_all(&(payload.len() as u32).to_be_bytes())?;
    stream.write_all(payload)?;
    stream.flush()
}

fn read_frame(stream: &mut UnixStream) -> std::io::Result<Vec<u8>> {
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes)?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf)?;
    Ok(buf)
}
