// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Embedded web backends.
//!
//! Two adapters implement [`Backend`]: a lightweight servlet container that
//! deploys as part of start-up, and an application-server runtime that boots
//! first and then receives an explicit archive deployment. The variant is
//! chosen once per process through [`BackendKind`].

pub mod appserver;
pub mod archive;
pub mod http;
pub mod servlet;
pub mod webapp;

use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::errors::Error;
use crate::policy::ResolutionPolicy;
use crate::scanner::ScanOptions;
use crate::unit::DeploymentUnit;

pub use appserver::ApplicationServer;
pub use http::DeploymentSlot;
pub use servlet::ServletContainer;
pub use webapp::{WebApp, WebAppSpec};

pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Embedded servlet container.
    #[default]
    Servlet,
    /// Embedded application-server runtime.
    Appserver,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BackendKind::Servlet => "servlet",
            BackendKind::Appserver => "appserver",
        })
    }
}

/// Settings shared by both adapters.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub bind_address: IpAddr,
    pub stop_timeout: Duration,
    pub policy: Arc<ResolutionPolicy>,
    pub scan: ScanOptions,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            policy: Arc::new(ResolutionPolicy::default()),
            scan: ScanOptions::default(),
        }
    }
}

impl BackendSettings {
    pub fn socket_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.bind_address, port)
    }

    /// Deploy on the blocking pool; scanning walks the whole class path.
    pub(crate) async fn deploy(&self, spec: WebAppSpec) -> Result<WebApp, Error> {
        let policy = Arc::clone(&self.policy);
        let options = self.scan.clone();
        tokio::task::spawn_blocking(move || WebApp::deploy(spec, policy, &options))
            .await
            .map_err(|e| Error::Deploy(format!("deploy task failed: {e}")))?
    }
}

/// A running server. Dropping it without [`Backend::stop`] leaves the accept
/// loop running until the runtime shuts down.
#[derive(Debug)]
pub struct SessionHandle {
    local_addr: SocketAddr,
    slot: Arc<DeploymentSlot>,
    shutdown: watch::Sender<bool>,
    server: Option<JoinHandle<Result<(), Error>>>,
}

fn flatten(joined: Result<Result<(), Error>, tokio::task::JoinError>) -> Result<(), Error> {
    joined.map_err(|e| Error::Io(io::Error::other(format!("server task failed: {e}"))))?
}

impl SessionHandle {
    /// Spawn the accept loop for `listener`, serving whatever `slot` holds.
    pub(crate) fn serve(listener: tokio::net::TcpListener, slot: Arc<DeploymentSlot>, stop_timeout: Duration) -> Result<Self, Error> {
        let local_addr = listener.local_addr()?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(http::accept_loop(listener, Arc::clone(&slot), shutdown_rx, stop_timeout));
        Ok(Self::from_task(local_addr, slot, shutdown, server))
    }

    /// Wrap an already spawned server task. `shutdown` is flipped to `true`
    /// when the session is stopped.
    pub(crate) fn from_task(
        local_addr: SocketAddr,
        slot: Arc<DeploymentSlot>,
        shutdown: watch::Sender<bool>,
        server: JoinHandle<Result<(), Error>>,
    ) -> Self {
        Self {
            local_addr,
            slot,
            shutdown,
            server: Some(server),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn deployment(&self) -> Option<Arc<WebApp>> {
        self.slot.current()
    }

    pub(crate) fn slot(&self) -> &DeploymentSlot {
        &self.slot
    }

    /// Resolves if the server stops on its own, which only happens on an
    /// accept failure. Pending forever once the server has been stopped.
    pub async fn closed(&mut self) -> Result<(), Error> {
        match self.server.as_mut() {
            Some(task) => {
                let result = flatten(task.await);
                self.server = None;
                result
            }
            None => std::future::pending().await,
        }
    }

    /// Stop accepting, drain open connections and wait for the loop to exit.
    pub(crate) async fn shutdown(mut self) -> Result<(), Error> {
        self.shutdown.send_replace(true);
        match self.server.take() {
            Some(task) => flatten(task.await),
            None => Ok(()),
        }
    }
}

/// Start/stop capability implemented by each embedded backend.
pub trait Backend {
    fn name(&self) -> &'static str;

    /// Bring the backend up and make `unit` reachable on its port.
    fn start(&self, unit: &DeploymentUnit) -> impl Future<Output = Result<SessionHandle, Error>> + Send;

    fn stop(&self, handle: SessionHandle) -> impl Future<Output = Result<(), Error>> + Send;
}
