// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Layered symbol resolution shared by the scanner and the unit class loader.
//!
//! Two layers exist: the host (the runner and whatever framework it was
//! launched with) and the deployment unit. With parent-loader priority the
//! host layer always answers first, so framework classes shared between the
//! two are never duplicated.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::classpath::index_class_names;

/// Patterns for classes only the host may define.
pub const DEFAULT_SYSTEM_CLASSES: &[&str] = &["java.*", "javax.*", "jakarta.*", "org.xml.*", "org.w3c.*"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Host,
    Unit,
    NotFound,
}

/// The unit side of a lookup.
pub trait UnitLayer {
    fn contains_class(&self, name: &str) -> bool;
}

impl UnitLayer for HashSet<String> {
    fn contains_class(&self, name: &str) -> bool {
        self.contains(name)
    }
}

/// Class names the host process resolves on its own.
#[derive(Debug, Clone, Default)]
pub struct HostLayer {
    classes: HashSet<String>,
}

impl HostLayer {
    pub fn new(classes: impl IntoIterator<Item = String>) -> Self {
        Self {
            classes: classes.into_iter().collect(),
        }
    }

    /// Index the class names found in host class-path entries.
    pub fn from_class_path(entries: &[PathBuf]) -> Self {
        Self::new(index_class_names(entries).into_keys())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains(name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ResolutionPolicy {
    parent_loader_priority: bool,
    system_classes: Vec<String>,
    server_classes: Vec<String>,
    host: HostLayer,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self {
            parent_loader_priority: true,
            system_classes: DEFAULT_SYSTEM_CLASSES.iter().map(|s| s.to_string()).collect(),
            server_classes: Vec::new(),
            host: HostLayer::default(),
        }
    }
}

impl ResolutionPolicy {
    pub fn with_parent_loader_priority(mut self, enabled: bool) -> Self {
        self.parent_loader_priority = enabled;
        self
    }

    pub fn with_system_classes(mut self, patterns: impl IntoIterator<Item = String>) -> Self {
        self.system_classes.extend(patterns);
        self
    }

    pub fn with_server_classes(mut self, patterns: impl IntoIterator<Item = String>) -> Self {
        self.server_classes.extend(patterns);
        self
    }

    pub fn with_host(mut self, host: HostLayer) -> Self {
        self.host = host;
        self
    }

    pub fn parent_loader_priority(&self) -> bool {
        self.parent_loader_priority
    }

    pub fn is_system_class(&self, name: &str) -> bool {
        matches_any(&self.system_classes, name)
    }

    /// Server classes live in the host but are hidden from the unit.
    pub fn is_server_class(&self, name: &str) -> bool {
        matches_any(&self.server_classes, name)
    }

    /// Whether the host layer answers for `name`.
    pub fn host_resolves(&self, name: &str) -> bool {
        self.is_system_class(name) || (self.host.contains(name) && !self.is_server_class(name))
    }

    /// Scanner exclusion: system classes are never eligible for discovery.
    pub fn is_excluded(&self, name: &str) -> bool {
        self.is_system_class(name)
    }

    /// Whether a class found in the unit may take the place of one the host
    /// already resolves.
    pub fn may_shadow_host(&self, name: &str) -> bool {
        !(self.parent_loader_priority && self.host_resolves(name))
    }

    pub fn resolve(&self, name: &str, unit: &dyn UnitLayer) -> Resolution {
        let in_host = self.host_resolves(name);
        let in_unit = !self.is_system_class(name) && unit.contains_class(name);
        match (in_host, in_unit) {
            (true, true) if self.parent_loader_priority => Resolution::Host,
            (_, true) => Resolution::Unit,
            (true, false) => Resolution::Host,
            (false, false) => Resolution::NotFound,
        }
    }
}

fn matches_any(patterns: &[String], name: &str) -> bool {
    patterns
        .iter()
        .any(|pattern| glob_match::glob_match(pattern, name))
}
