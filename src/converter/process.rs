//! Child-process execution shared by every backend.
//!
//! Each backend builds a [`tokio::process::Command`] for its runtime and
//! hands it to [`run_tool`], which owns spawning, stream capture and the
//! host-side timeout.
//!
//! ## Process groups
//!
//! latexmlc shells out to helpers (latex, dvisvgm, ImageMagick) that inherit
//! its pipes. On Unix the tool is started as the leader of its own process
//! group so a timeout kills the whole tree, not just the top process.

use crate::error::ConvertError;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Maximum stdout or stderr captured per stream (4 MiB).
///
/// latexmlc can be extremely chatty on broken documents. Output past the
/// cap is still read from the pipe and discarded, so the tool never sees a
/// closed pipe.
const MAX_OUTPUT_BYTES: usize = 4 * 1024 * 1024;

/// How long output is still collected once the child itself has exited.
///
/// A backgrounded helper can hold the pipes open after latexmlc is gone;
/// whatever it writes after this is abandoned.
const PIPE_GRACE: Duration = Duration::from_secs(2);

type Capture = Arc<Mutex<Vec<u8>>>;

/// What a finished child left behind.
#[derive(Debug, Clone)]
pub struct ToolRun {
    /// Exit code, `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ToolRun {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Spawn `cmd`, capture its output and wait at most `timeout` for it.
///
/// The child is spawned with `kill_on_drop(true)`: if the caller's future is
/// dropped because the HTTP client went away, the process is killed instead
/// of being left running. When the timeout fires the child's whole process
/// group is killed.
pub async fn run_tool(cmd: &mut Command, timeout: Duration) -> Result<ToolRun, ConvertError> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    debug!("Spawning {:?}", cmd.as_std());

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|e| ConvertError::Spawn {
        program: program.clone(),
        detail: e.to_string(),
    })?;
    let pid = child.id();

    // Drain both pipes concurrently so a full stderr buffer cannot block
    // the child while we wait on it.
    let stdout = Capture::default();
    let stderr = Capture::default();
    let readers = [
        tokio::spawn(drain(child.stdout.take(), stdout.clone())),
        tokio::spawn(drain(child.stderr.take(), stderr.clone())),
    ];

    let waited = tokio::time::timeout(timeout, child.wait()).await;
    if waited.is_err() {
        kill_group(pid);
        let _ = child.kill().await;
    }
    join_readers(readers).await;

    match waited {
        Ok(Ok(status)) => Ok(ToolRun {
            code: status.code(),
            stdout: captured_text(&stdout),
            stderr: captured_text(&stderr),
            duration_ms: start.elapsed().as_millis() as u64,
        }),
        Ok(Err(e)) => Err(ConvertError::Spawn {
            program,
            detail: format!("wait failed: {e}"),
        }),
        Err(_elapsed) => Err(ConvertError::Timeout {
            millis: timeout.as_millis() as u64,
            stderr: captured_text(&stderr),
        }),
    }
}

/// Read a stream to EOF, keeping the first [`MAX_OUTPUT_BYTES`].
async fn drain<R: AsyncRead + Unpin>(handle: Option<R>, capture: Capture) {
    let Some(mut handle) = handle else {
        return;
    };
    let mut chunk = vec![0u8; 8 * 1024];
    loop {
        match handle.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut buf = capture.lock().unwrap_or_else(PoisonError::into_inner);
                let room = MAX_OUTPUT_BYTES.saturating_sub(buf.len());
                buf.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
}

/// Wait for the readers, but no longer than [`PIPE_GRACE`] in total.
async fn join_readers(readers: [JoinHandle<()>; 2]) {
    let deadline = tokio::time::Instant::now() + PIPE_GRACE;
    for reader in readers {
        let abort = reader.abort_handle();
        if tokio::time::timeout_at(deadline, reader).await.is_err() {
            warn!("Output pipe still open after the converter exited; abandoning it");
            abort.abort();
        }
    }
}

fn captured_text(capture: &Capture) -> String {
    let buf = capture.lock().unwrap_or_else(PoisonError::into_inner);
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    if let Some(pgid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) {
        // SAFETY: killpg only sends a signal. The child was spawned as the
        // leader of group `pgid` and has not been reaped yet.
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}
