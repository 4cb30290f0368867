// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Blocking subprocess helpers shared by every stage.
//!
//! All external interaction (tool lookup, hashing helpers, `su` attempts,
//! `kubectl`) goes through [`run_cmd_timeout`]. A timeout kills the child and
//! is reported as an error, which callers treat as "this attempt failed".

use std::io::Read;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

/// Default timeout for commands that have no tighter bound.
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to wait for pipes to close after the process group was killed.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdOutput {
    /// Exit code; `None` when the child was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Trimmed stdout, the form nearly every caller wants.
    pub fn out(&self) -> &str {
        self.stdout.trim()
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

/// SIGKILL the whole process group led by `pid`.
fn kill_group(pid: u32) {
    // SAFETY: plain syscall; the group id is the child's pid because the
    // child was spawned with `process_group(0)`.
    unsafe {
        libc::killpg(pid as libc::pid_t, libc::SIGKILL);
    }
}

/// Collect a pipe's contents within `budget`. Background processes that
/// inherited the pipe can keep it open past the child's exit; in that case
/// the group is killed and whatever was written so far is returned.
fn collect(rx: &Receiver<String>, pid: u32, budget: Duration) -> String {
    match rx.recv_timeout(budget) {
        Ok(buf) => buf,
        Err(_) => {
            kill_group(pid);
            rx.recv_timeout(DRAIN_GRACE).unwrap_or_default()
        }
    }
}

/// Run a command with a timeout, killing its process group if it exceeds `timeout`.
///
/// Stdin is closed so password prompts fail fast instead of blocking. The
/// child leads its own process group so anything it leaves running in the
/// background is bounded by the same deadline.
pub fn run_cmd_timeout(cmd: &str, args: &[&str], timeout: Duration) -> Result<CmdOutput> {
    let mut child = Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
        .with_context(|| format!("Failed to spawn {}", cmd))?;
    let pid = child.id();

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() > timeout {
                    kill_group(pid);
                    let _ = child.kill();
                    let _ = child.wait();
                    bail!("{} timed out after {}s", cmd, timeout.as_secs());
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(e) => bail!("Error waiting for {}: {}", cmd, e),
        }
    };

    let stdout = collect(&stdout, pid, timeout.saturating_sub(start.elapsed()));
    let stderr = collect(&stderr, pid, timeout.saturating_sub(start.elapsed()));
    Ok(CmdOutput {
        code: status.code(),
        stdout,
        stderr,
    })
}
