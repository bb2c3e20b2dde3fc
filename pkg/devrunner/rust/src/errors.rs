// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::lifecycle::SessionState;

#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing argument or config file. Reported before Starting.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("could not read classpath manifest {}: {source}", path.display())]
    ManifestUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Listener bind or runtime bootstrap failure.
    #[error("backend failed to start: {context}: {source}")]
    BackendStart {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("deployment failed: {0}")]
    Deploy(String),

    #[error("component scan failed: {0}")]
    Scan(String),

    #[error("illegal lifecycle transition {from} -> {to}")]
    IllegalTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn backend_start(context: impl Into<String>, source: io::Error) -> Self {
        Error::BackendStart {
            context: context.into(),
            source,
        }
    }
}
