// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Component discovery over the unit's class path.
//!
//! Packaged archives and loose class roots are scanned the same way, so a
//! component compiled into `build/classes` is found exactly as if it had been
//! packaged into a jar first.

pub mod classfile;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Serialize;

use crate::classpath::{EntryKind, class_files, class_name_from_entry, entry_kind, relative_name};
use crate::descriptor::{WEB_FRAGMENT_PATH, WebDescriptor};
use crate::errors::Error;
use crate::fs::{MAX_ENTRY_SIZE, open_archive, read_archive_entry, read_zip_entry};
use crate::policy::ResolutionPolicy;
use crate::unit::DeploymentUnit;

use classfile::{ClassInfo, parse_class};

pub const DEFAULT_DISCOVERABLE_ANNOTATIONS: &[&str] = &[
    "javax.servlet.annotation.WebServlet",
    "javax.servlet.annotation.WebFilter",
    "javax.servlet.annotation.WebListener",
    "jakarta.servlet.annotation.WebServlet",
    "jakarta.servlet.annotation.WebFilter",
    "jakarta.servlet.annotation.WebListener",
];

/// Annotation elements holding URL patterns.
const URL_PATTERN_ELEMENTS: &[&str] = &["value", "urlPatterns"];

const ROOT_CLASS: &str = "java.lang.Object";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    discoverable: BTreeSet<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            discoverable: DEFAULT_DISCOVERABLE_ANNOTATIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ScanOptions {
    pub fn with_annotations(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.discoverable.extend(names);
        self
    }

    pub fn is_discoverable(&self, annotation: &str) -> bool {
        self.discoverable.contains(annotation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Origin {
    pub path: PathBuf,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component {
    pub class_name: String,
    pub annotations: Vec<String>,
    pub url_patterns: Vec<String>,
    pub origin: Origin,
}

/// Discovered components keyed by class name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ComponentSet {
    components: BTreeMap<String, Component>,
}

impl ComponentSet {
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get(&self, class_name: &str) -> Option<&Component> {
        self.components.get(class_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    pub fn annotated_with<'a>(&'a self, annotation: &'a str) -> impl Iterator<Item = &'a Component> + 'a {
        self.iter()
            .filter(move |c| c.annotations.iter().any(|a| a == annotation))
    }

    /// Keeps existing entries when both sets define a class.
    fn insert_first(&mut self, component: Component) -> bool {
        match self.components.entry(component.class_name.clone()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(component);
                true
            }
        }
    }
}

/// Super class and interface -> classes that directly extend or implement it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct InheritanceIndex {
    subtypes: BTreeMap<String, BTreeSet<String>>,
}

impl InheritanceIndex {
    fn add(&mut self, supertype: &str, subtype: &str) {
        self.subtypes
            .entry(supertype.to_string())
            .or_default()
            .insert(subtype.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.subtypes.is_empty()
    }

    pub fn direct_subtypes(&self, name: &str) -> impl Iterator<Item = &str> {
        self.subtypes
            .get(name)
            .into_iter()
            .flat_map(|s| s.iter().map(String::as_str))
    }

    /// Every scanned class below `name`, transitively.
    pub fn all_subtypes(&self, name: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut pending = vec![name.to_string()];
        while let Some(current) = pending.pop() {
            for sub in self.direct_subtypes(&current) {
                if found.insert(sub.to_string()) {
                    pending.push(sub.to_string());
                }
            }
        }
        found
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanOutcome {
    pub components: ComponentSet,
    pub inheritance: InheritanceIndex,
}

impl ScanOutcome {
    /// Union of two outcomes; on conflict `self` wins.
    pub fn merge(mut self, other: ScanOutcome) -> ScanOutcome {
        for component in other.components.components.into_values() {
            self.components.insert_first(component);
        }
        for (supertype, subtypes) in other.inheritance.subtypes {
            self.inheritance
                .subtypes
                .entry(supertype)
                .or_default()
                .extend(subtypes);
        }
        self
    }
}

fn scan_error(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Scan(format!("{}: {e}", path.display()))
}

struct Collector<'a> {
    policy: &'a ResolutionPolicy,
    options: &'a ScanOptions,
    outcome: ScanOutcome,
    seen: HashSet<String>,
}

impl<'a> Collector<'a> {
    fn new(policy: &'a ResolutionPolicy, options: &'a ScanOptions) -> Self {
        Self {
            policy,
            options,
            outcome: ScanOutcome::default(),
            seen: HashSet::new(),
        }
    }

    fn scan_entry(&mut self, path: &Path) -> Result<(), Error> {
        match entry_kind(path) {
            Some(EntryKind::Directory) => self.scan_directory(path),
            Some(EntryKind::Archive) => self.scan_archive(path),
            None if path.exists() => {
                debug!("not scanning {}: neither a directory nor an archive", path.display());
                Ok(())
            }
            None => {
                debug!("not scanning missing root {}", path.display());
                Ok(())
            }
        }
    }

    fn scan_directory(&mut self, root: &Path) -> Result<(), Error> {
        let origin = Origin {
            path: root.to_path_buf(),
            kind: EntryKind::Directory,
        };
        for entry in class_files(root) {
            let entry = entry.map_err(|e| scan_error(root, e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(relative) = relative_name(root, entry.path()) else {
                continue;
            };
            if class_name_from_entry(&relative).is_none() {
                continue;
            }
            let size = entry.metadata().map_err(|e| scan_error(entry.path(), e))?.len();
            if size > MAX_ENTRY_SIZE {
                warn!("skipping oversized class file {}", entry.path().display());
                continue;
            }
            let bytes = std::fs::read(entry.path()).map_err(|e| scan_error(entry.path(), e))?;
            self.handle_bytes(&relative, &bytes, &origin, false);
        }
        Ok(())
    }

    fn scan_archive(&mut self, path: &Path) -> Result<(), Error> {
        let origin = Origin {
            path: path.to_path_buf(),
            kind: EntryKind::Archive,
        };
        let metadata_complete = self.fragment_metadata_complete(path)?;
        if metadata_complete {
            debug!("{}: fragment is metadata-complete, recording types only", path.display());
        }

        let mut archive = open_archive(path).map_err(|e| scan_error(path, e))?;
        for i in 0..archive.len() {
            let entry = archive.by_index(i).map_err(|e| scan_error(path, e))?;
            if !entry.is_file() {
                continue;
            }
            let name = entry.name().to_string();
            if class_name_from_entry(&name).is_none() {
                continue;
            }
            let size = entry.size();
            let bytes = match read_zip_entry(entry, size) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("{}: skipping {name}: {e}", path.display());
                    continue;
                }
            };
            self.handle_bytes(&name, &bytes, &origin, metadata_complete);
        }
        Ok(())
    }

    fn fragment_metadata_complete(&self, path: &Path) -> Result<bool, Error> {
        let Some(xml) = read_archive_entry(path, WEB_FRAGMENT_PATH).map_err(|e| scan_error(path, e))? else {
            return Ok(false);
        };
        match WebDescriptor::parse(&xml) {
            Ok(fragment) => Ok(fragment.metadata_complete),
            Err(e) => {
                warn!("{}: ignoring {WEB_FRAGMENT_PATH}: {e}", path.display());
                Ok(false)
            }
        }
    }

    fn handle_bytes(&mut self, entry_name: &str, bytes: &[u8], origin: &Origin, metadata_complete: bool) {
        match parse_class(bytes) {
            Ok(info) => self.record(info, origin, metadata_complete),
            Err(e) => warn!("{}: skipping {entry_name}: {e}", origin.path.display()),
        }
    }

    fn record(&mut self, info: ClassInfo, origin: &Origin, metadata_complete: bool) {
        if self.policy.is_excluded(&info.name) {
            debug!("excluded system class {}", info.name);
            return;
        }
        if !self.policy.may_shadow_host(&info.name) {
            debug!("{} is provided by the host, ignoring unit copy", info.name);
            return;
        }
        if !self.seen.insert(info.name.clone()) {
            debug!("{} already defined earlier on the class path", info.name);
            return;
        }

        let inheritance = &mut self.outcome.inheritance;
        if let Some(super_class) = info.super_class.as_deref().filter(|s| *s != ROOT_CLASS) {
            inheritance.add(super_class, &info.name);
        }
        for interface in &info.interfaces {
            inheritance.add(interface, &info.name);
        }

        if metadata_complete {
            return;
        }

        let discovered: Vec<_> = info
            .annotations
            .iter()
            .filter(|a| self.options.is_discoverable(&a.type_name))
            .collect();
        if discovered.is_empty() {
            return;
        }

        let url_patterns = discovered
            .iter()
            .flat_map(|a| URL_PATTERN_ELEMENTS.iter().filter_map(move |e| a.element(e)))
            .flat_map(|value| value.strings())
            .map(str::to_string)
            .collect();
        let component = Component {
            class_name: info.name.clone(),
            annotations: discovered.iter().map(|a| a.type_name.clone()).collect(),
            url_patterns,
            origin: origin.clone(),
        };
        debug!("discovered {} in {}", component.class_name, origin.path.display());
        self.outcome.components.insert_first(component);
    }
}

/// Scan loose class directories as if each were a packaged archive.
/// Nonexistent roots are skipped.
pub fn scan_class_roots(
    roots: &[PathBuf],
    policy: &ResolutionPolicy,
    options: &ScanOptions,
) -> Result<ScanOutcome, Error> {
    let mut collector = Collector::new(policy, options);
    for root in roots {
        collector.scan_entry(root)?;
    }
    Ok(collector.outcome)
}

/// Scan packaged dependencies. Directories in the list are scanned as roots.
pub fn scan_archives(
    paths: &[PathBuf],
    policy: &ResolutionPolicy,
    options: &ScanOptions,
) -> Result<ScanOutcome, Error> {
    scan_class_roots(paths, policy, options)
}

/// Scan a whole class path in the order given, directories and archives
/// interleaved, so the first location agrees with the class loader's.
pub fn scan_class_path(
    entries: &[PathBuf],
    policy: &ResolutionPolicy,
    options: &ScanOptions,
) -> Result<ScanOutcome, Error> {
    let mut collector = Collector::new(policy, options);
    for entry in entries {
        collector.scan_entry(entry)?;
    }
    Ok(collector.outcome)
}

/// Class roots first, then dependency paths.
pub fn scan(
    unit: &DeploymentUnit,
    policy: &ResolutionPolicy,
    options: &ScanOptions,
) -> Result<ScanOutcome, Error> {
    let mut collector = Collector::new(policy, options);
    for entry in unit.class_path() {
        collector.scan_entry(entry)?;
    }
    Ok(collector.outcome)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::classpath::UnitClassLoader;
    use crate::policy::HostLayer;
    use crate::testing::{ClassFileBuilder, class_entry, write_jar};
    use crate::unit::ROOT_CONTEXT_PATH;
    use std::fs;

    const WEB_SERVLET: &str = "Ljakarta/servlet/annotation/WebServlet;";
    const WEB_FILTER: &str = "Ljavax/servlet/annotation/WebFilter;";

    fn servlet(name: &str, pattern: &str) -> ClassFileBuilder {
        ClassFileBuilder::new(name).annotation_with_strings(WEB_SERVLET, "urlPatterns", &[pattern])
    }

    fn jar(path: &Path, classes: Vec<ClassFileBuilder>, extra: &[(&str, &[u8])]) {
        let built: Vec<(String, Vec<u8>)> = classes.into_iter().map(class_entry).collect();
        let mut entries: Vec<(&str, &[u8])> = built
            .iter()
            .map(|(n, b)| (n.as_str(), b.as_slice()))
            .collect();
        entries.extend_from_slice(extra);
        write_jar(path, &entries);
    }

    fn defaults() -> (ResolutionPolicy, ScanOptions) {
        (ResolutionPolicy::default(), ScanOptions::default())
    }

    #[test]
    fn test_loose_root_discovers_components() {
        let dir = tempfile::tempdir().unwrap();
        let classes = dir.path().join("classes");
        servlet("com/example/HelloServlet", "/hello").write_to(&classes);
        ClassFileBuilder::new("com/example/Filter")
            .annotation_with_strings(WEB_FILTER, "value", &["/*"])
            .write_to(&classes);
        ClassFileBuilder::new("com/example/Plain").write_to(&classes);

        let (policy, options) = defaults();
        let outcome = scan_class_roots(&[classes.clone()], &policy, &options).unwrap();
        let components = &outcome.components;
        assert_eq!(components.len(), 2);

        let hello = components.get("com.example.HelloServlet").unwrap();
        assert_eq!(hello.annotations, vec!["jakarta.servlet.annotation.WebServlet"]);
        assert_eq!(hello.url_patterns, vec!["/hello"]);
        assert_eq!(
            hello.origin,
            Origin {
                path: classes.clone(),
                kind: EntryKind::Directory
            }
        );
        assert_eq!(components.get("com.example.Filter").unwrap().url_patterns, vec!["/*"]);
        assert!(components.get("com.example.Plain").is_none());
        assert_eq!(
            components
                .annotated_with("javax.servlet.annotation.WebFilter")
                .count(),
            1
        );
    }

    #[test]
    fn test_empty_root_same_as_skipped_root() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty");
        fs::create_dir(&empty).unwrap();
        let (policy, options) = defaults();

        let scanned = scan_class_roots(&[empty], &policy, &options).unwrap();
        let skipped = scan_class_roots(&[dir.path().join("missing")], &policy, &options).unwrap();
        let nothing = scan_class_roots(&[], &policy, &options).unwrap();
        assert_eq!(scanned, skipped);
        assert_eq!(scanned, nothing);
        assert_eq!(scanned, ScanOutcome::default());
    }

    #[test]
    fn test_root_without_components_has_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        ClassFileBuilder::new("com/example/Plain").write_to(dir.path());
        let (policy, options) = defaults();
        let outcome = scan_class_roots(&[dir.path().to_path_buf()], &policy, &options).unwrap();
        assert_eq!(outcome.components, ComponentSet::default());
    }

    #[test]
    fn test_system_and_host_classes_not_discovered() {
        let dir = tempfile::tempdir().unwrap();
        servlet("javax/servlet/Sneaky", "/x").write_to(dir.path());
        servlet("com/vaadin/flow/Shared", "/vaadin").write_to(dir.path());
        servlet("com/example/Mine", "/mine").write_to(dir.path());

        let policy = ResolutionPolicy::default().with_host(HostLayer::new(["com.vaadin.flow.Shared".to_string()]));
        let outcome = scan_class_roots(&[dir.path().to_path_buf()], &policy, &ScanOptions::default()).unwrap();
        let names: Vec<_> = outcome.components.iter().map(|c| c.class_name.as_str()).collect();
        assert_eq!(names, vec!["com.example.Mine"]);

        // Without parent-loader priority the unit copy is visible.
        let policy = policy.with_parent_loader_priority(false);
        let outcome = scan_class_roots(&[dir.path().to_path_buf()], &policy, &ScanOptions::default()).unwrap();
        assert!(outcome.components.get("com.vaadin.flow.Shared").is_some());
        assert!(outcome.components.get("javax.servlet.Sneaky").is_none());
    }

    #[test]
    fn test_first_location_wins() {
        let dir = tempfile::tempdir().unwrap();
        let classes = dir.path().join("classes");
        servlet("com/example/Dup", "/from-root").write_to(&classes);
        let lib = dir.path().join("lib.jar");
        jar(&lib, vec![servlet("com/example/Dup", "/from-jar")], &[]);

        let unit = DeploymentUnit {
            content_root: None,
            class_roots: vec![classes.clone()],
            dependency_paths: vec![lib],
            context_path: ROOT_CONTEXT_PATH,
            port: 8080,
        };
        let (policy, options) = defaults();
        let outcome = scan(&unit, &policy, &options).unwrap();
        let dup = outcome.components.get("com.example.Dup").unwrap();
        assert_eq!(dup.origin.path, classes);
        assert_eq!(dup.url_patterns, vec!["/from-root"]);
    }

    #[test]
    fn test_class_path_order_matches_loader() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib.jar");
        jar(&lib, vec![servlet("com/example/Dup", "/from-jar")], &[]);
        let depdir = dir.path().join("depdir");
        servlet("com/example/Dup", "/from-dir").write_to(&depdir);
        let class_path = vec![lib.clone(), depdir];

        let (policy, options) = defaults();
        let outcome = scan_class_path(&class_path, &policy, &options).unwrap();
        let dup = outcome.components.get("com.example.Dup").unwrap();
        assert_eq!(dup.url_patterns, vec!["/from-jar"]);
        assert_eq!(dup.origin.path, lib);

        let loader = UnitClassLoader::new(&class_path, std::sync::Arc::new(policy)).unwrap();
        assert_eq!(loader.locate("com.example.Dup"), Some(dup.origin.path.as_path()));
    }

    #[test]
    fn test_scan_is_union_of_roots_and_archives() {
        let dir = tempfile::tempdir().unwrap();
        let classes = dir.path().join("classes");
        let resources = dir.path().join("resources");
        fs::create_dir_all(&resources).unwrap();
        servlet("com/example/A", "/a").write_to(&classes);
        let lib = dir.path().join("lib.jar");
        jar(
            &lib,
            vec![
                servlet("com/lib/B", "/b"),
                ClassFileBuilder::new("com/lib/Impl").interface("com/lib/Api"),
            ],
            &[],
        );

        let unit = DeploymentUnit {
            content_root: None,
            class_roots: vec![classes, resources],
            dependency_paths: vec![lib],
            context_path: ROOT_CONTEXT_PATH,
            port: 8080,
        };
        let (policy, options) = defaults();
        let whole = scan(&unit, &policy, &options).unwrap();
        let roots = scan_class_roots(&unit.class_roots, &policy, &options).unwrap();
        let archives = scan_archives(&unit.dependency_paths, &policy, &options).unwrap();
        assert_eq!(whole, roots.merge(archives));
        assert_eq!(whole.components.len(), 2);
        assert_eq!(
            whole.inheritance.direct_subtypes("com.lib.Api").collect::<Vec<_>>(),
            vec!["com.lib.Impl"]
        );
        assert_eq!(whole, scan_class_path(&unit.class_path().cloned().collect::<Vec<_>>(), &policy, &options).unwrap());
    }

    #[test]
    fn test_metadata_complete_fragment_contributes_types_only() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("complete.jar");
        jar(
            &lib,
            vec![servlet("com/lib/Hidden", "/hidden").super_class("com/lib/Base")],
            &[(
                WEB_FRAGMENT_PATH,
                br#"<web-fragment metadata-complete="true"/>"#.as_slice(),
            )],
        );
        let (policy, options) = defaults();
        let outcome = scan_archives(&[lib], &policy, &options).unwrap();
        assert!(outcome.components.is_empty());
        assert_eq!(
            outcome.inheritance.all_subtypes("com.lib.Base"),
            BTreeSet::from(["com.lib.Hidden".to_string()])
        );
    }

    #[test]
    fn test_unparseable_class_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("com/example")).unwrap();
        fs::write(dir.path().join("com/example/Broken.class"), b"\xca\xfe\xba\xbe\x00").unwrap();
        fs::write(dir.path().join("com/example/notes.txt"), b"ignored").unwrap();
        servlet("com/example/Good", "/good").write_to(dir.path());

        let (policy, options) = defaults();
        let outcome = scan_class_roots(&[dir.path().to_path_buf()], &policy, &options).unwrap();
        assert_eq!(outcome.components.len(), 1);
        assert!(outcome.components.get("com.example.Good").is_some());
    }

    #[test]
    fn test_corrupt_archive_is_scan_error() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("broken.jar");
        fs::write(&lib, b"not a zip").unwrap();
        let (policy, options) = defaults();
        let err = scan_archives(&[lib], &policy, &options).unwrap_err();
        assert!(matches!(err, Error::Scan(_)));
    }

    #[test]
    fn test_extra_discoverable_annotation() {
        let dir = tempfile::tempdir().unwrap();
        ClassFileBuilder::new("com/example/Route")
            .annotation_with_strings("Lcom/vaadin/flow/router/Route;", "value", &["home"])
            .write_to(dir.path());
        let policy = ResolutionPolicy::default();

        let default = scan_class_roots(&[dir.path().to_path_buf()], &policy, &ScanOptions::default()).unwrap();
        assert!(default.components.is_empty());

        let options = ScanOptions::default().with_annotations(["com.vaadin.flow.router.Route".to_string()]);
        let extended = scan_class_roots(&[dir.path().to_path_buf()], &policy, &options).unwrap();
        assert_eq!(extended.components.get("com.example.Route").unwrap().url_patterns, vec!["home"]);
    }

    #[test]
    fn test_all_subtypes_transitive() {
        let mut index = InheritanceIndex::default();
        index.add("A", "B");
        index.add("B", "C");
        index.add("X", "Y");
        assert_eq!(
            index.all_subtypes("A"),
            BTreeSet::from(["B".to_string(), "C".to_string()])
        );
        assert!(index.all_subtypes("C").is_empty());
    }

    #[test]
    fn test_component_set_serializes_by_class_name() {
        let dir = tempfile::tempdir().unwrap();
        servlet("com/example/S", "/s").write_to(dir.path());
        let (policy, options) = defaults();
        let outcome = scan_class_roots(&[dir.path().to_path_buf()], &policy, &options).unwrap();
        let json = serde_json::to_value(&outcome.components).unwrap();
        assert_eq!(json["com.example.S"]["url_patterns"][0], "/s");
        assert_eq!(json["com.example.S"]["origin"]["kind"], "directory");
    }
}
