// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use normalize_path::NormalizePath;

use crate::errors::Error;

/// Name of the dependency list the build tool writes into the work directory.
pub const CLASSPATH_FILE: &str = "classpath.txt";

fn is_delimiter(c: char) -> bool {
    matches!(c, ';' | '\n' | '\r')
}

/// Dependency list produced by the build graph, read once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClasspathManifest {
    entries: Vec<PathBuf>,
}

impl ClasspathManifest {
    /// Read `classpath.txt` from `work_dir`. Fails if the file cannot be
    /// opened or is not valid UTF-8.
    pub fn load(work_dir: &Path) -> Result<Self, Error> {
        let path = work_dir.join(CLASSPATH_FILE);
        let contents = std::fs::read_to_string(&path)
            .map_err(|source| Error::ManifestUnreadable { path, source })?;
        Ok(Self::parse(&contents, work_dir))
    }

    /// Like [`ClasspathManifest::load`], but a missing or unreadable manifest
    /// yields an empty one.
    pub fn load_optional(work_dir: Option<&Path>) -> Self {
        let Some(work_dir) = work_dir else {
            return Self::default();
        };
        match Self::load(work_dir) {
            Ok(manifest) => manifest,
            Err(Error::ManifestUnreadable { path, source })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                debug!("no classpath manifest at {}", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("ignoring classpath manifest: {e}");
                Self::default()
            }
        }
    }

    /// Split manifest text into entries. Relative entries are resolved
    /// against `base`.
    pub fn parse(contents: &str, base: &Path) -> Self {
        let entries = contents
            .split(is_delimiter)
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let p = Path::new(entry);
                if p.is_absolute() {
                    p.to_path_buf()
                } else {
                    base.join(p).normalize()
                }
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries that currently exist on disk, in manifest order.
    pub fn existing_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.entries.iter().filter(|path| {
            let exists = path.exists();
            if !exists {
                debug!("skipping missing dependency: {}", path.display());
            }
            exists
        })
    }
}
