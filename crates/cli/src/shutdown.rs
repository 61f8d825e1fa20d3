//! Cancellation sources for a running scan: Ctrl+C and an `exit` line on stdin.

use std::io::BufRead;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub fn is_exit_command(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("exit")
}

/// Cancels `token` on the first interrupt signal.
pub fn watch_interrupt(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            res = tokio::signal::ctrl_c() => match res {
                Ok(()) => {
                    info!("Ctrl+C pressed. Cancelling...");
                    token.cancel();
                }
                Err(e) => warn!(error = %e, "Unable to listen for Ctrl+C"),
            },
        }
    })
}

/// Waits for a listener task. Returns `false` (and logs) if it panicked or was
/// aborted.
pub async fn join_listener(handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Interrupt listener ended abnormally");
            false
        }
    }
}

/// Cancels `token` when `input` yields an `exit` line.
///
/// Runs on a plain detached thread: a blocking read must not keep the runtime
/// (or the process) alive after the scan is over.
pub fn watch_exit_command<R>(input: R, token: CancellationToken) -> std::thread::JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    std::thread::spawn(move || {
        for line in input.lines() {
            let Ok(line) = line else { break };
            if token.is_cancelled() {
                break;
            }
            if is_exit_command(&line) {
                info!("Exit command received. Cancelling...");
                token.cancel();
                break;
            }
        }
    })
}
