// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Ties argument parsing, unit assembly, the backend and the lifecycle
//! emitter together for one runner process.

use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{LevelFilter, error, info, warn};

use crate::backend::archive::ScatteredArchive;
use crate::backend::{ApplicationServer, Backend, BackendKind, BackendSettings, ServletContainer};
use crate::cli::Args;
use crate::config::RunnerConfig;
use crate::errors::Error;
use crate::lifecycle::{Lifecycle, SessionState};
use crate::manifest::ClasspathManifest;
use crate::policy::{HostLayer, ResolutionPolicy};
use crate::scanner::ScanOptions;
use crate::unit::{self, AssemblyInput, DeploymentUnit};

/// Log targets belonging to the embedded backend.
const BACKEND_LOG_TARGETS: &[&str] = &["hyper", "hyper_util", "devrunner::backend"];

#[derive(Debug, Clone)]
pub struct Runner {
    args: Args,
    config: RunnerConfig,
    kind: BackendKind,
    level: LevelFilter,
}

impl Runner {
    /// Validate arguments against the selected backend. The command line
    /// wins over the config file.
    pub fn from_args(args: Args, config: RunnerConfig) -> Result<Self, Error> {
        let level = args.level()?;
        let kind = args.backend.or(config.backend).unwrap_or_default();
        if kind == BackendKind::Appserver {
            let Some(archive_name) = args.archive_name.as_deref() else {
                return Err(Error::Configuration("the appserver backend needs an archive name".into()));
            };
            ScatteredArchive::validate_name(archive_name)?;
            if args.work_dir.is_none() {
                return Err(Error::Configuration("the appserver backend needs a work directory".into()));
            }
        }
        Ok(Self {
            args,
            config,
            kind,
            level,
        })
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Logger set up for this backend. The servlet container keeps its own
    /// targets at INFO or more verbose; the application server follows the
    /// requested level.
    pub fn logger_builder(&self) -> devrun_log::Builder {
        let backend_level = match self.kind {
            BackendKind::Servlet => self.level.max(LevelFilter::Info),
            BackendKind::Appserver => self.level,
        };
        BACKEND_LOG_TARGETS
            .iter()
            .fold(devrun_log::Builder::new(self.level), |builder, target| {
                builder.target_level(target, backend_level)
            })
    }

    fn work_dir(&self) -> Option<&Path> {
        self.args.work_dir.as_deref()
    }

    /// Collect the unit from the build output. Only the application server
    /// treats a missing manifest as fatal.
    pub fn assemble_unit(&self) -> Result<DeploymentUnit, Error> {
        let (class_roots, manifest) = match self.kind {
            BackendKind::Servlet => (
                vec![self.args.class_root.as_path(), self.args.resources_root.as_path()],
                ClasspathManifest::load_optional(self.work_dir()),
            ),
            BackendKind::Appserver => {
                let work_dir = self
                    .work_dir()
                    .ok_or_else(|| Error::Configuration("missing work directory".into()))?;
                (vec![self.args.class_root.as_path()], ClasspathManifest::load(work_dir)?)
            }
        };
        Ok(unit::assemble(AssemblyInput {
            port: self.args.port,
            content_root: Some(self.args.content_root.as_path()),
            class_roots,
            manifest: Some(&manifest),
        }))
    }

    pub fn backend_settings(&self) -> BackendSettings {
        let policy = ResolutionPolicy::default()
            .with_system_classes(self.config.system_classes.iter().cloned())
            .with_server_classes(self.config.server_classes.iter().cloned())
            .with_host(HostLayer::from_class_path(&self.config.host_classpath));
        BackendSettings {
            bind_address: self.config.bind_address,
            stop_timeout: Duration::from_secs(self.config.stop_timeout),
            policy: Arc::new(policy),
            scan: ScanOptions::default().with_annotations(self.config.discoverable_annotations.iter().cloned()),
        }
    }

    /// Run one session to completion, writing tokens to `out`. Returns once
    /// `shutdown` resolves and the backend has stopped, or on failure.
    pub async fn run<W: Write>(&self, out: W, shutdown: impl Future<Output = ()>) -> Result<(), Error> {
        let unit = self.assemble_unit()?;
        if unit.is_empty() {
            warn!("nothing to serve: no content root or class roots exist yet");
        }
        info!(
            "{} backend, port {}, {} class roots, {} dependencies",
            self.kind,
            unit.port,
            unit.class_roots.len(),
            unit.dependency_paths.len()
        );

        let mut lifecycle = Lifecycle::new(unit, out);
        if let Some(path) = &self.args.status_file {
            lifecycle = lifecycle.with_status_file(path.clone());
        }

        let settings = self.backend_settings();
        match self.kind {
            BackendKind::Servlet => supervise(&ServletContainer::new(settings), &mut lifecycle, shutdown).await,
            BackendKind::Appserver => {
                let archive_name = self.args.archive_name.clone().unwrap_or_default();
                let work_dir = self.work_dir().map(Path::to_path_buf).unwrap_or_else(PathBuf::new);
                let backend = ApplicationServer::new(settings, archive_name, work_dir);
                supervise(&backend, &mut lifecycle, shutdown).await
            }
        }
    }
}

/// Drive `backend` through one session. Every failure after Starting is
/// logged and emitted as the Failed token before being returned.
pub async fn supervise<B: Backend, W: Write>(
    backend: &B,
    lifecycle: &mut Lifecycle<W>,
    shutdown: impl Future<Output = ()>,
) -> Result<(), Error> {
    let unit = lifecycle.session().unit().clone();
    lifecycle.transition(SessionState::Starting)?;

    let mut handle = match backend.start(&unit).await {
        Ok(handle) => handle,
        Err(e) => {
            error!("{} failed to start: {e}", backend.name());
            lifecycle.fail(&e)?;
            return Err(e);
        }
    };
    lifecycle.transition(SessionState::Started)?;
    info!("serving on {}", handle.local_addr());

    tokio::pin!(shutdown);
    tokio::select! {
        () = &mut shutdown => info!("shutdown requested"),
        result = handle.closed() => {
            let e = match result {
                Err(e) => e,
                Ok(()) => Error::Io(io::Error::other("server stopped unexpectedly")),
            };
            error!("{} stopped serving: {e}", backend.name());
            lifecycle.fail(&e)?;
            return Err(e);
        }
    }

    lifecycle.transition(SessionState::Stopping)?;
    if let Err(e) = backend.stop(handle).await {
        warn!("{} did not stop cleanly: {e}", backend.name());
    }
    lifecycle.transition(SessionState::Stopped)
}
