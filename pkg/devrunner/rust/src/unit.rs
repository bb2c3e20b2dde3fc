// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Serialize;

use crate::manifest::ClasspathManifest;

/// Context path every unit is served under.
pub const ROOT_CONTEXT_PATH: &str = "/";

/// Everything a backend needs to serve the application under development.
///
/// Built once by [`assemble`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentUnit {
    pub content_root: Option<PathBuf>,
    pub class_roots: Vec<PathBuf>,
    pub dependency_paths: Vec<PathBuf>,
    pub context_path: &'static str,
    pub port: u16,
}

impl DeploymentUnit {
    /// True when the unit has nothing to serve.
    pub fn is_empty(&self) -> bool {
        self.content_root.is_none() && self.class_roots.is_empty()
    }

    /// Class roots followed by dependency paths, in resolution order.
    pub fn class_path(&self) -> impl Iterator<Item = &PathBuf> {
        self.class_roots.iter().chain(self.dependency_paths.iter())
    }
}

/// Candidate roots handed to [`assemble`].
#[derive(Debug, Clone, Default)]
pub struct AssemblyInput<'a> {
    pub port: u16,
    pub content_root: Option<&'a Path>,
    pub class_roots: Vec<&'a Path>,
    pub manifest: Option<&'a ClasspathManifest>,
}

/// Build a [`DeploymentUnit`] from whatever parts of the build output exist
/// right now. Missing roots are dropped, not reported as errors, so partial
/// builds (e.g. no static assets yet) still run.
pub fn assemble(input: AssemblyInput<'_>) -> DeploymentUnit {
    let content_root = input.content_root.and_then(existing);

    let class_roots = input.class_roots.into_iter().filter_map(existing).collect();

    let mut seen = HashSet::new();
    let dependency_paths = input
        .manifest
        .map(|manifest| {
            manifest
                .existing_paths()
                .filter(|path| seen.insert((*path).clone()))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    DeploymentUnit {
        content_root,
        class_roots,
        dependency_paths,
        context_path: ROOT_CONTEXT_PATH,
        port: input.port,
    }
}

fn existing(path: &Path) -> Option<PathBuf> {
    if path.exists() {
        Some(path.to_path_buf())
    } else {
        debug!("omitting missing root: {}", path.display());
        None
    }
}
