// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Parent side of the lifecycle protocol: spawn a runner, watch its output
//! for lifecycle tokens and turn them into readiness and termination.

use std::cell::Cell;
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, warn};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::lifecycle::{LifecycleEvent, SessionState};

const KILL_TIMEOUT: Duration = Duration::from_secs(10);
/// How long output may keep arriving after the child has exited.
const EXIT_DRAIN: Duration = Duration::from_millis(500);
/// Most recent lines kept for `lines()` and `wait_for_line`.
pub const MAX_RETAINED_LINES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    Stopped,
    Failed,
    TimedOut,
}

#[derive(Debug)]
struct Observed {
    state: SessionState,
    exit: Option<ExitStatus>,
    lines: VecDeque<String>,
    total_lines: u64,
    open_streams: usize,
}

impl Observed {
    /// Forward-only; terminal states stick.
    fn advance(&mut self, next: SessionState) -> bool {
        if self.state.is_terminal() || next <= self.state {
            return false;
        }
        self.state = next;
        true
    }
}

#[derive(Debug)]
struct Shared {
    observed: Mutex<Observed>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Observed> {
        self.observed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observe_line(&self, line: String) {
        let mut observed = self.lock();
        if let Some(event) = LifecycleEvent::find_in(&line)
            && observed.advance(event.state())
        {
            debug!("child is now {}", observed.state);
        }
        if observed.lines.len() == MAX_RETAINED_LINES {
            observed.lines.pop_front();
        }
        observed.lines.push_back(line);
        observed.total_lines += 1;
        drop(observed);
        self.changed.notify_all();
    }

    fn close_stream(&self) {
        let mut observed = self.lock();
        observed.open_streams = observed.open_streams.saturating_sub(1);
        drop(observed);
        self.changed.notify_all();
    }

    /// Wait for the readers to reach EOF, at most `timeout`. A descendant
    /// still holding the pipes keeps them open past the child's exit.
    fn drain(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        let mut observed = self.lock();
        while observed.open_streams > 0 {
            let now = Instant::now();
            if now >= deadline {
                debug!("{} output stream(s) still open after exit", observed.open_streams);
                return;
            }
            observed = self
                .changed
                .wait_timeout(observed, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn observe_exit(&self, status: ExitStatus) {
        let mut observed = self.lock();
        observed.exit = Some(status);
        if !observed.state.is_terminal() {
            // Exit without a terminal token.
            let implied = if status.success() {
                SessionState::Stopped
            } else {
                SessionState::Failed
            };
            debug!("child exited with {status} in state {}, treating as {implied}", observed.state);
            observed.state = implied;
        }
        drop(observed);
        self.changed.notify_all();
    }
}

fn spawn_reader(stream: impl Read + Send + 'static, shared: Arc<Shared>) -> io::Result<()> {
    shared.lock().open_streams += 1;
    let spawned = std::thread::Builder::new()
        .name("devrun-reader".into())
        .spawn({
            let shared = Arc::clone(&shared);
            move || {
                let reader = BufReader::new(stream);
                for line in reader.lines() {
                    match line {
                        Ok(l) => shared.observe_line(l),
                        Err(_) => break,
                    }
                }
                shared.close_stream();
            }
        });
    match spawned {
        // Detached: a grandchild may hold the pipe long after the child exits.
        Ok(_) => Ok(()),
        Err(e) => {
            shared.close_stream();
            Err(e)
        }
    }
}

/// A supervised runner process.
#[derive(Debug)]
pub struct Supervisor {
    pid: u32,
    shared: Arc<Shared>,
    waiter: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// Spawn `command` with stdout and stderr piped back to us.
    pub fn spawn(mut command: Command) -> io::Result<Self> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let pid = child.id();

        let shared = Arc::new(Shared {
            observed: Mutex::new(Observed {
                state: SessionState::Initial,
                exit: None,
                lines: VecDeque::new(),
                total_lines: 0,
                open_streams: 0,
            }),
            changed: Condvar::new(),
        });

        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, Arc::clone(&shared))?;
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, Arc::clone(&shared))?;
        }

        let waiter_shared = Arc::clone(&shared);
        let waiter = std::thread::Builder::new()
            .name("devrun-waiter".into())
            .spawn(move || wait_child(child, &waiter_shared))?;

        Ok(Self {
            pid,
            shared,
            waiter: Some(waiter),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Last observed state.
    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.shared.lock().exit
    }

    /// The most recent lines from both streams, oldest first, at most
    /// [`MAX_RETAINED_LINES`].
    pub fn lines(&self) -> Vec<String> {
        self.shared.lock().lines.iter().cloned().collect()
    }

    fn wait_for(&self, timeout: Duration, done: impl Fn(&Observed) -> Option<WaitOutcome>) -> WaitOutcome {
        let deadline = Instant::now() + timeout;
        let mut observed = self.shared.lock();
        loop {
            if let Some(outcome) = done(&observed) {
                return outcome;
            }
            let now = Instant::now();
            if now >= deadline {
                return WaitOutcome::TimedOut;
            }
            observed = self
                .shared
                .changed
                .wait_timeout(observed, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Block until the child reports Started, fails, or stops.
    pub fn wait_until_ready(&self, timeout: Duration) -> WaitOutcome {
        self.wait_for(timeout, |o| match o.state {
            SessionState::Started => Some(WaitOutcome::Ready),
            SessionState::Failed => Some(WaitOutcome::Failed),
            SessionState::Stopping | SessionState::Stopped => Some(WaitOutcome::Stopped),
            SessionState::Initial | SessionState::Starting => None,
        })
    }

    /// Block until the child reports Stopped or Failed, or exits.
    pub fn wait_until_stopped(&self, timeout: Duration) -> WaitOutcome {
        self.wait_for(timeout, |o| match o.state {
            SessionState::Stopped => Some(WaitOutcome::Stopped),
            SessionState::Failed => Some(WaitOutcome::Failed),
            _ => None,
        })
    }

    /// Block until a retained line contains `pattern`. Each wakeup only
    /// looks at lines that arrived since the previous one.
    pub fn wait_for_line(&self, pattern: &str, timeout: Duration) -> bool {
        let scanned = Cell::new(0u64);
        let outcome = self.wait_for(timeout, |o| {
            let fresh = usize::try_from(o.total_lines - scanned.get()).unwrap_or(usize::MAX);
            scanned.set(o.total_lines);
            if o.lines.iter().rev().take(fresh).any(|l| l.contains(pattern)) {
                Some(WaitOutcome::Ready)
            } else if o.exit.is_some() {
                Some(WaitOutcome::Stopped)
            } else {
                None
            }
        });
        outcome == WaitOutcome::Ready
    }

    fn send_signal(&self, sig: Signal) -> io::Result<()> {
        if self.exit_status().is_some() {
            return Ok(());
        }
        let pid = i32::try_from(self.pid).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        match signal::kill(Pid::from_raw(pid), sig) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(io::Error::from(e)),
        }
    }

    /// Ask the child to shut down (SIGTERM).
    pub fn terminate(&self) -> io::Result<()> {
        self.send_signal(Signal::SIGTERM)
    }

    /// Force the child down (SIGKILL).
    pub fn kill(&self) -> io::Result<()> {
        self.send_signal(Signal::SIGKILL)
    }

    /// SIGTERM, wait up to `grace`, then SIGKILL.
    pub fn stop(&self, grace: Duration) -> io::Result<WaitOutcome> {
        self.terminate()?;
        let outcome = self.wait_until_stopped(grace);
        if outcome != WaitOutcome::TimedOut {
            return Ok(outcome);
        }
        warn!("runner {} still up after {}s, sending SIGKILL", self.pid, grace.as_secs());
        self.kill()?;
        Ok(self.wait_until_stopped(KILL_TIMEOUT))
    }
}

fn wait_child(mut child: Child, shared: &Shared) {
    let status = match child.wait() {
        Ok(status) => status,
        Err(e) => {
            warn!("failed to wait for runner: {e}");
            return;
        }
    };
    // Tokens written just before exit must be seen before the exit itself.
    shared.drain(EXIT_DRAIN);
    shared.observe_exit(status);
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if self.exit_status().is_none() {
            let _ = self.kill();
        }
        if let Some(waiter) = self.waiter.take() {
            let _ = waiter.join();
        }
    }
}
