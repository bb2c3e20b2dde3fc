// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Runner-side lifecycle state machine.
//!
//! Every transition is written as one literal token line on stdout. The
//! supervisor matches these literals by substring, so their text must never
//! change.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{info, warn};
use time::OffsetDateTime;
use tokio::sync::watch;

use crate::errors::Error;
use crate::unit::DeploymentUnit;

pub const STARTING_TOKEN: &str = "Jetty starting";
pub const STARTED_TOKEN: &str = "Jetty started";
pub const STOPPING_TOKEN: &str = "Jetty stopping";
pub const STOPPED_TOKEN: &str = "Jetty stopped";
pub const FAILED_TOKEN: &str = "Jetty error";

/// A token on the wire. Carries no payload beyond its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Starting,
    Started,
    Stopping,
    Stopped,
    Failed,
}

impl LifecycleEvent {
    /// Events in the order the supervisor tests for them.
    pub const ALL: [LifecycleEvent; 5] = [
        LifecycleEvent::Starting,
        LifecycleEvent::Started,
        LifecycleEvent::Stopping,
        LifecycleEvent::Stopped,
        LifecycleEvent::Failed,
    ];

    pub fn token(self) -> &'static str {
        match self {
            LifecycleEvent::Starting => STARTING_TOKEN,
            LifecycleEvent::Started => STARTED_TOKEN,
            LifecycleEvent::Stopping => STOPPING_TOKEN,
            LifecycleEvent::Stopped => STOPPED_TOKEN,
            LifecycleEvent::Failed => FAILED_TOKEN,
        }
    }

    /// First event whose token occurs anywhere in `line`.
    pub fn find_in(line: &str) -> Option<LifecycleEvent> {
        Self::ALL.into_iter().find(|event| line.contains(event.token()))
    }

    pub fn state(self) -> SessionState {
        match self {
            LifecycleEvent::Starting => SessionState::Starting,
            LifecycleEvent::Started => SessionState::Started,
            LifecycleEvent::Stopping => SessionState::Stopping,
            LifecycleEvent::Stopped => SessionState::Stopped,
            LifecycleEvent::Failed => SessionState::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Initial,
    Starting,
    Started,
    Stopping,
    Stopped,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Failed)
    }

    pub(crate) fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Initial, Starting)
                | (Starting, Started)
                | (Starting, Failed)
                | (Started, Stopping)
                | (Started, Failed)
                | (Stopping, Stopped)
        )
    }

    /// Event emitted when entering this state. `Initial` has none.
    pub fn event(self) -> Option<LifecycleEvent> {
        match self {
            SessionState::Initial => None,
            SessionState::Starting => Some(LifecycleEvent::Starting),
            SessionState::Started => Some(LifecycleEvent::Started),
            SessionState::Stopping => Some(LifecycleEvent::Stopping),
            SessionState::Stopped => Some(LifecycleEvent::Stopped),
            SessionState::Failed => Some(LifecycleEvent::Failed),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Initial => write!(f, "initial"),
            SessionState::Starting => write!(f, "starting"),
            SessionState::Started => write!(f, "started"),
            SessionState::Stopping => write!(f, "stopping"),
            SessionState::Stopped => write!(f, "stopped"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// The running server as seen by the runner process.
#[derive(Debug)]
pub struct BackendSession {
    unit: DeploymentUnit,
    state: SessionState,
    started_at: Option<OffsetDateTime>,
    stopped_at: Option<OffsetDateTime>,
    failure_cause: Option<String>,
}

impl BackendSession {
    pub fn new(unit: DeploymentUnit) -> Self {
        Self {
            unit,
            state: SessionState::Initial,
            started_at: None,
            stopped_at: None,
            failure_cause: None,
        }
    }

    pub fn unit(&self) -> &DeploymentUnit {
        &self.unit
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_at(&self) -> Option<OffsetDateTime> {
        self.started_at
    }

    pub fn stopped_at(&self) -> Option<OffsetDateTime> {
        self.stopped_at
    }

    /// Only set once the session has failed.
    pub fn failure_cause(&self) -> Option<&str> {
        self.failure_cause.as_deref()
    }
}

/// Drives a [`BackendSession`] through its states and emits one token line
/// per transition to `out`.
pub struct Lifecycle<W: Write> {
    session: BackendSession,
    out: W,
    status: watch::Sender<SessionState>,
    status_file: Option<PathBuf>,
}

impl<W: Write> Lifecycle<W> {
    pub fn new(unit: DeploymentUnit, out: W) -> Self {
        let (status, _) = watch::channel(SessionState::Initial);
        Self {
            session: BackendSession::new(unit),
            out,
            status,
            status_file: None,
        }
    }

    /// Also mirror each state name into `path`.
    pub fn with_status_file(mut self, path: PathBuf) -> Self {
        self.status_file = Some(path);
        self
    }

    pub fn session(&self) -> &BackendSession {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    /// Structured view of the same state machine.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.status.subscribe()
    }

    pub fn transition(&mut self, next: SessionState) -> Result<(), Error> {
        let current = self.session.state;
        if !current.can_transition_to(next) {
            return Err(Error::IllegalTransition {
                from: current,
                to: next,
            });
        }

        let Some(event) = next.event() else {
            return Err(Error::IllegalTransition {
                from: current,
                to: next,
            });
        };
        writeln!(self.out, "{}", event.token())?;
        self.out.flush()?;

        self.session.state = next;
        match next {
            SessionState::Started => self.session.started_at = Some(OffsetDateTime::now_utc()),
            SessionState::Stopped | SessionState::Failed => {
                self.session.stopped_at = Some(OffsetDateTime::now_utc())
            }
            _ => {}
        }
        self.status.send_replace(next);
        if let Some(ref path) = self.status_file
            && let Err(e) = write_status_file(path, next)
        {
            warn!("failed to write status file {}: {e}", path.display());
        }
        info!("lifecycle: {current} -> {next}");
        Ok(())
    }

    /// Move to Failed, recording `cause`.
    pub fn fail(&mut self, cause: &dyn fmt::Display) -> Result<(), Error> {
        if !self.session.state.can_transition_to(SessionState::Failed) {
            return Err(Error::IllegalTransition {
                from: self.session.state,
                to: SessionState::Failed,
            });
        }
        self.session.failure_cause = Some(cause.to_string());
        self.transition(SessionState::Failed)
    }
}

fn write_status_file(path: &Path, state: SessionState) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, format!("{state}\n"))?;
    std::fs::rename(&tmp, path)
}
