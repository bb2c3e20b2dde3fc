// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Class-path entries (loose directories or jar archives) and the unit-side
//! class loader built on top of them.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use serde::Serialize;
use walkdir::WalkDir;

use crate::fs::{RootDir, open_archive, read_archive_entry};
use crate::policy::{Resolution, ResolutionPolicy, UnitLayer};

/// Static resources packaged inside a class-path entry live under this prefix.
pub const WEB_RESOURCES_PREFIX: &str = "META-INF/resources/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    Archive,
}

fn is_archive_name(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| ["jar", "zip", "war"].iter().any(|a| e.eq_ignore_ascii_case(a)))
}

/// Classify a class-path entry; `None` for anything that is neither a
/// directory nor an archive.
pub fn entry_kind(path: &Path) -> Option<EntryKind> {
    if path.is_dir() {
        Some(EntryKind::Directory)
    } else if path.is_file() && is_archive_name(path) {
        Some(EntryKind::Archive)
    } else {
        None
    }
}

/// `com/example/Foo.class` -> `com.example.Foo`.
pub fn class_name_from_entry(relative: &str) -> Option<String> {
    let stem = relative.trim_start_matches('/').strip_suffix(".class")?;
    if stem.is_empty()
        || stem.starts_with("META-INF/")
        || stem.ends_with("module-info")
        || stem.ends_with("package-info")
    {
        return None;
    }
    Some(stem.replace('/', "."))
}

/// Path of `path` under `root`, always `/`-separated.
pub(crate) fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Some(parts.join("/"))
}

pub(crate) fn class_files(root: &Path) -> WalkDir {
    WalkDir::new(root).follow_links(false).sort_by_file_name()
}

/// Class names defined by one entry, in walk order.
fn list_class_names(path: &Path, kind: EntryKind) -> io::Result<Vec<String>> {
    match kind {
        EntryKind::Directory => {
            let mut names = Vec::new();
            for entry in class_files(path) {
                let entry = entry.map_err(io::Error::from)?;
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Some(name) = relative_name(path, entry.path())
                    .as_deref()
                    .and_then(class_name_from_entry)
                {
                    names.push(name);
                }
            }
            Ok(names)
        }
        EntryKind::Archive => {
            let archive = open_archive(path)?;
            Ok(archive.file_names().filter_map(class_name_from_entry).collect())
        }
    }
}

/// Index every class name reachable from `entries`, mapped to the entry that
/// defines it. The first entry wins; unreadable entries are skipped.
pub fn index_class_names(entries: &[PathBuf]) -> HashMap<String, PathBuf> {
    let mut index = HashMap::new();
    for path in entries {
        let Some(kind) = entry_kind(path) else {
            debug!("not a class-path entry: {}", path.display());
            continue;
        };
        match list_class_names(path, kind) {
            Ok(names) => {
                for name in names {
                    index.entry(name).or_insert_with(|| path.clone());
                }
            }
            Err(e) => warn!("failed to index {}: {e}", path.display()),
        }
    }
    index
}

enum Resources {
    None,
    Directory(RootDir),
    Archive(HashSet<String>),
}

struct Entry {
    path: PathBuf,
    resources: Resources,
}

/// Resolves class names and packaged resources against the unit's class
/// path, consulting the shared [`ResolutionPolicy`] first.
pub struct UnitClassLoader {
    entries: Vec<Entry>,
    classes: HashMap<String, usize>,
    policy: Arc<ResolutionPolicy>,
}

impl std::fmt::Debug for UnitClassLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitClassLoader")
            .field("entries", &self.entries.iter().map(|e| &e.path).collect::<Vec<_>>())
            .field("classes", &self.classes.len())
            .finish()
    }
}

impl UnitClassLoader {
    pub fn new(class_path: &[PathBuf], policy: Arc<ResolutionPolicy>) -> io::Result<Self> {
        let mut entries = Vec::new();
        let mut classes = HashMap::new();

        for path in class_path {
            let Some(kind) = entry_kind(path) else {
                debug!("ignoring class-path entry {}", path.display());
                continue;
            };
            let index = entries.len();
            let resources = match kind {
                EntryKind::Directory => {
                    for name in list_class_names(path, kind)? {
                        classes.entry(name).or_insert(index);
                    }
                    let web_root = path.join(WEB_RESOURCES_PREFIX);
                    if web_root.is_dir() {
                        Resources::Directory(RootDir::open(&web_root)?)
                    } else {
                        Resources::None
                    }
                }
                EntryKind::Archive => {
                    let archive = open_archive(path)?;
                    let mut resources = HashSet::new();
                    for name in archive.file_names() {
                        if let Some(class) = class_name_from_entry(name) {
                            classes.entry(class).or_insert(index);
                        } else if let Some(resource) = name.strip_prefix(WEB_RESOURCES_PREFIX)
                            && !resource.is_empty()
                            && !resource.ends_with('/')
                        {
                            resources.insert(resource.to_string());
                        }
                    }
                    if resources.is_empty() {
                        Resources::None
                    } else {
                        Resources::Archive(resources)
                    }
                }
            };
            entries.push(Entry {
                path: path.clone(),
                resources,
            });
        }

        Ok(Self {
            entries,
            classes,
            policy,
        })
    }

    pub fn policy(&self) -> &ResolutionPolicy {
        &self.policy
    }

    pub fn resolve(&self, name: &str) -> Resolution {
        self.policy.resolve(name, self)
    }

    /// Entry a class is loaded from when the unit resolves it.
    pub fn locate(&self, name: &str) -> Option<&Path> {
        if self.resolve(name) != Resolution::Unit {
            return None;
        }
        let index = *self.classes.get(name)?;
        self.entries.get(index).map(|e| e.path.as_path())
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Whether some entry has a resource directory at `relative`.
    pub fn has_resource_dir(&self, relative: &str) -> bool {
        let prefix = format!("{}/", relative.trim_end_matches('/'));
        self.entries.iter().any(|e| match &e.resources {
            Resources::Directory(dir) => dir.is_dir(relative),
            Resources::Archive(names) => names.iter().any(|n| n.starts_with(&prefix)),
            Resources::None => false,
        })
    }

    /// First `META-INF/resources/<relative>` found along the class path.
    pub fn find_resource(&self, relative: &str) -> io::Result<Option<Vec<u8>>> {
        let relative = relative.trim_start_matches('/');
        for entry in &self.entries {
            let found = match &entry.resources {
                Resources::None => None,
                Resources::Directory(dir) => dir.read_file(relative)?,
                Resources::Archive(names) if names.contains(relative) => {
                    read_archive_entry(&entry.path, &format!("{WEB_RESOURCES_PREFIX}{relative}"))?
                }
                Resources::Archive(_) => None,
            };
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }
}

impl UnitLayer for UnitClassLoader {
    fn contains_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::policy::HostLayer;
    use crate::testing::{ClassFileBuilder, class_entry, write_jar};
    use std::fs;

    #[test]
    fn test_class_name_from_entry() {
        assert_eq!(class_name_from_entry("com/example/Foo.class").as_deref(), Some("com.example.Foo"));
        assert_eq!(class_name_from_entry("Top.class").as_deref(), Some("Top"));
        assert_eq!(class_name_from_entry("module-info.class"), None);
        assert_eq!(class_name_from_entry("com/example/package-info.class"), None);
        assert_eq!(class_name_from_entry("META-INF/versions/11/a/B.class"), None);
        assert_eq!(class_name_from_entry("com/example/readme.txt"), None);
    }

    #[test]
    fn test_entry_kind() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("a.JAR");
        let pom = dir.path().join("a.pom");
        fs::write(&jar, b"").unwrap();
        fs::write(&pom, b"").unwrap();
        assert_eq!(entry_kind(dir.path()), Some(EntryKind::Directory));
        assert_eq!(entry_kind(&jar), Some(EntryKind::Archive));
        assert_eq!(entry_kind(&pom), None);
        assert_eq!(entry_kind(&dir.path().join("missing")), None);
    }

    #[test]
    fn test_index_first_entry_wins() {
        let dir = tempfile::tempdir().unwrap();
        let classes = dir.path().join("classes");
        ClassFileBuilder::new("com/example/Shared").write_to(&classes);
        let jar = dir.path().join("lib.jar");
        let (shared, bytes) = class_entry(ClassFileBuilder::new("com/example/Shared"));
        let (other, other_bytes) = class_entry(ClassFileBuilder::new("com/lib/Other"));
        write_jar(&jar, &[(shared.as_str(), bytes.as_slice()), (other.as_str(), other_bytes.as_slice())]);

        let index = index_class_names(&[classes.clone(), jar.clone(), dir.path().join("nope.jar")]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("com.example.Shared"), Some(&classes));
        assert_eq!(index.get("com.lib.Other"), Some(&jar));
    }

    #[test]
    fn test_loader_consults_policy() {
        let dir = tempfile::tempdir().unwrap();
        let classes = dir.path().join("classes");
        ClassFileBuilder::new("com/example/App").write_to(&classes);
        ClassFileBuilder::new("com/vaadin/Shared").write_to(&classes);

        let policy = ResolutionPolicy::default().with_host(HostLayer::new(["com.vaadin.Shared".to_string()]));
        let loader = UnitClassLoader::new(&[classes.clone()], Arc::new(policy)).unwrap();

        assert_eq!(loader.class_count(), 2);
        assert_eq!(loader.resolve("com.example.App"), Resolution::Unit);
        assert_eq!(loader.locate("com.example.App"), Some(classes.as_path()));
        assert_eq!(loader.resolve("com.vaadin.Shared"), Resolution::Host);
        assert_eq!(loader.locate("com.vaadin.Shared"), None);
        assert_eq!(loader.resolve("java.lang.String"), Resolution::Host);
        assert_eq!(loader.resolve("com.example.Missing"), Resolution::NotFound);
    }

    #[test]
    fn test_find_resource_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let classes = dir.path().join("classes");
        fs::create_dir_all(classes.join("META-INF/resources/css")).unwrap();
        fs::write(classes.join("META-INF/resources/css/app.css"), b"from-dir").unwrap();

        let jar = dir.path().join("lib.jar");
        write_jar(
            &jar,
            &[
                ("META-INF/resources/css/app.css", b"from-jar".as_slice()),
                ("META-INF/resources/js/lib.js", b"lib".as_slice()),
            ],
        );

        let loader = UnitClassLoader::new(&[classes, jar], Arc::new(ResolutionPolicy::default())).unwrap();
        assert_eq!(loader.find_resource("css/app.css").unwrap().as_deref(), Some(&b"from-dir"[..]));
        assert_eq!(loader.find_resource("/js/lib.js").unwrap().as_deref(), Some(&b"lib"[..]));
        assert_eq!(loader.find_resource("js/none.js").unwrap(), None);
        assert!(loader.has_resource_dir("js"));
        assert!(loader.has_resource_dir("css"));
        assert!(!loader.has_resource_dir("img"));
    }
}
