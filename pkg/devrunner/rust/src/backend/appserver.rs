// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Application-server runtime. Unlike the servlet container it boots with
//! nothing deployed and then receives the unit as a scattered archive,
//! which is how such runtimes accept applications from the outside.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info};

use super::archive::{ArchiveType, ScatteredArchive};
use super::http::{self, DeploymentSlot};
use super::{Backend, BackendSettings, SessionHandle};
use crate::errors::Error;
use crate::unit::{DeploymentUnit, ROOT_CONTEXT_PATH};

#[derive(Debug, Clone)]
pub struct ApplicationServer {
    settings: BackendSettings,
    archive_name: String,
    work_dir: PathBuf,
}

impl ApplicationServer {
    pub fn new(settings: BackendSettings, archive_name: String, work_dir: PathBuf) -> Self {
        Self {
            settings,
            archive_name,
            work_dir,
        }
    }

    /// Build the scattered archive for `unit`: web root, then class roots,
    /// then dependencies.
    pub fn assemble_archive(&self, unit: &DeploymentUnit) -> Result<ScatteredArchive, Error> {
        let mut archive = ScatteredArchive::new(&self.archive_name, ArchiveType::War, unit.content_root.clone())?;
        for path in unit.class_path() {
            archive.add_class_path(path.clone());
        }
        Ok(archive)
    }

    async fn deploy_unit(&self, handle: &SessionHandle, unit: &DeploymentUnit) -> Result<(), Error> {
        let archive = self.assemble_archive(unit)?.write_to(&self.work_dir)?;
        self.deploy(handle, &archive, ROOT_CONTEXT_PATH).await
    }

    /// Deploy an archive file to a running server under `context_path`.
    pub async fn deploy(&self, handle: &SessionHandle, archive: &Path, context_path: &str) -> Result<(), Error> {
        if context_path != ROOT_CONTEXT_PATH {
            return Err(Error::Deploy(format!("unsupported context root {context_path}")));
        }
        let spec = ScatteredArchive::read(archive)?.into_spec();
        let app = self.settings.deploy(spec).await?;
        handle.slot().install(app);
        info!("deployed {} at {context_path}", archive.display());
        Ok(())
    }
}

impl Backend for ApplicationServer {
    fn name(&self) -> &'static str {
        "appserver"
    }

    async fn start(&self, unit: &DeploymentUnit) -> Result<SessionHandle, Error> {
        let listener = http::bind(self.settings.socket_addr(unit.port)).await?;
        let handle = SessionHandle::serve(listener, Arc::new(DeploymentSlot::default()), self.settings.stop_timeout)
            .map_err(|e| match e {
                Error::Io(source) => Error::backend_start("runtime bootstrap failed", source),
                e => e,
            })?;
        info!("application server runtime up on {}", handle.local_addr());

        if let Err(e) = self.deploy_unit(&handle, unit).await {
            // The runtime stays up with nothing deployed until the process exits.
            error!("deployment of {} failed", self.archive_name);
            return Err(e);
        }
        Ok(handle)
    }

    async fn stop(&self, handle: SessionHandle) -> Result<(), Error> {
        info!("stopping application server on {}", handle.local_addr());
        handle.shutdown().await
    }
}
