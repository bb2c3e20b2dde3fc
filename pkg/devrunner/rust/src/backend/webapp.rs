// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! The deployed web application: document root plus class-path overlays.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info};
use phf::phf_map;

use crate::classpath::UnitClassLoader;
use crate::descriptor::WebDescriptor;
use crate::errors::Error;
use crate::fs::RootDir;
use crate::policy::ResolutionPolicy;
use crate::scanner::{ComponentSet, ScanOptions, ScanOutcome, scan_class_path};
use crate::unit::DeploymentUnit;

/// Compile-time extension table, looked up lowercased.
static CONTENT_TYPES: phf::Map<&'static str, &'static str> = phf_map! {
    "html" => "text/html; charset=utf-8",
    "htm" => "text/html; charset=utf-8",
    "css" => "text/css; charset=utf-8",
    "js" => "text/javascript; charset=utf-8",
    "mjs" => "text/javascript; charset=utf-8",
    "json" => "application/json",
    "map" => "application/json",
    "txt" => "text/plain; charset=utf-8",
    "xml" => "application/xml",
    "svg" => "image/svg+xml",
    "png" => "image/png",
    "jpg" => "image/jpeg",
    "jpeg" => "image/jpeg",
    "gif" => "image/gif",
    "ico" => "image/x-icon",
    "webp" => "image/webp",
    "woff" => "font/woff",
    "woff2" => "font/woff2",
    "ttf" => "font/ttf",
    "wasm" => "application/wasm",
    "webmanifest" => "application/manifest+json",
};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

pub fn content_type(path: &str) -> &'static str {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name
        .rsplit_once('.')
        .and_then(|(_, ext)| CONTENT_TYPES.get(ext.to_ascii_lowercase().as_str()))
        .copied()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

/// Why a request path was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRejection {
    /// Bad percent-encoding or characters that never name a resource.
    Malformed,
    /// A `..` segment.
    Traversal,
    /// Under `WEB-INF/` or `META-INF/`.
    Protected,
}

/// A decoded, normalized request path relative to the context root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPath {
    relative: String,
    directory: bool,
}

fn percent_decode(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied();
    while let Some(b) = iter.next() {
        if b == b'%' {
            let hi = iter.next().and_then(|h| (h as char).to_digit(16))?;
            let lo = iter.next().and_then(|l| (l as char).to_digit(16))?;
            out.push(u8::try_from(hi * 16 + lo).ok()?);
        } else {
            out.push(b);
        }
    }
    String::from_utf8(out).ok()
}

impl RequestPath {
    pub fn parse(raw: &str) -> Result<Self, PathRejection> {
        let decoded = percent_decode(raw).ok_or(PathRejection::Malformed)?;
        if decoded.contains(['\\', '\0']) {
            return Err(PathRejection::Malformed);
        }

        let mut segments = Vec::new();
        for segment in decoded.split('/') {
            match segment {
                "" | "." => {}
                ".." => return Err(PathRejection::Traversal),
                s => segments.push(s),
            }
        }
        if segments
            .first()
            .is_some_and(|s| s.eq_ignore_ascii_case("WEB-INF") || s.eq_ignore_ascii_case("META-INF"))
        {
            return Err(PathRejection::Protected);
        }

        Ok(Self {
            relative: segments.join("/"),
            directory: segments.is_empty() || decoded.ends_with('/'),
        })
    }

    pub fn relative(&self) -> &str {
        &self.relative
    }

    fn join(&self, file: &str) -> String {
        if self.relative.is_empty() {
            file.to_string()
        } else {
            format!("{}/{file}", self.relative)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticResource {
    pub body: Vec<u8>,
    pub content_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(StaticResource),
    /// Directory requested without its trailing slash.
    Redirect(String),
    NotFound,
}

/// What to deploy: a document root and the class path overlaying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebAppSpec {
    pub name: String,
    pub document_root: Option<PathBuf>,
    pub class_path: Vec<PathBuf>,
}

impl WebAppSpec {
    pub fn from_unit(name: impl Into<String>, unit: &DeploymentUnit) -> Self {
        Self {
            name: name.into(),
            document_root: unit.content_root.clone(),
            class_path: unit.class_path().cloned().collect(),
        }
    }
}

pub struct WebApp {
    name: String,
    document_root: Option<RootDir>,
    descriptor: WebDescriptor,
    loader: UnitClassLoader,
    scan: ScanOutcome,
}

impl std::fmt::Debug for WebApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebApp")
            .field("name", &self.name)
            .field("document_root", &self.document_root)
            .field("components", &self.scan.components.len())
            .finish()
    }
}

impl WebApp {
    /// Open the roots, read the descriptor and scan for components. Blocking.
    pub fn deploy(spec: WebAppSpec, policy: Arc<ResolutionPolicy>, options: &ScanOptions) -> Result<Self, Error> {
        let (document_root, descriptor) = match &spec.document_root {
            Some(root) => {
                let descriptor = WebDescriptor::load(root)?;
                let dir = RootDir::open(root)
                    .map_err(|e| Error::Deploy(format!("cannot open document root {}: {e}", root.display())))?;
                (Some(dir), descriptor)
            }
            None => (None, WebDescriptor::default()),
        };

        let scan = if descriptor.metadata_complete {
            info!("{}: descriptor is metadata-complete, skipping component scan", spec.name);
            ScanOutcome::default()
        } else {
            scan_class_path(&spec.class_path, &policy, options).map_err(|e| Error::Deploy(e.to_string()))?
        };

        let loader = UnitClassLoader::new(&spec.class_path, policy)
            .map_err(|e| Error::Deploy(format!("cannot open class path: {e}")))?;

        info!(
            "deployed {} ({} classes, {} components)",
            descriptor.display_name.as_deref().unwrap_or(&spec.name),
            loader.class_count(),
            scan.components.len()
        );
        for component in scan.components.iter() {
            debug!("component {} {:?}", component.class_name, component.url_patterns);
        }

        Ok(Self {
            name: spec.name,
            document_root,
            descriptor,
            loader,
            scan,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn components(&self) -> &ComponentSet {
        &self.scan.components
    }

    pub fn scan(&self) -> &ScanOutcome {
        &self.scan
    }

    pub fn class_loader(&self) -> &UnitClassLoader {
        &self.loader
    }

    pub fn welcome_files(&self) -> &[String] {
        &self.descriptor.welcome_files
    }

    fn read(&self, relative: &str) -> io::Result<Option<Vec<u8>>> {
        if let Some(root) = &self.document_root
            && let Some(body) = root.read_file(relative)?
        {
            return Ok(Some(body));
        }
        self.loader.find_resource(relative)
    }

    fn is_dir(&self, relative: &str) -> bool {
        relative.is_empty()
            || self.document_root.as_ref().is_some_and(|root| root.is_dir(relative))
            || self.loader.has_resource_dir(relative)
    }

    /// Document root first, then `META-INF/resources` along the class path.
    pub fn lookup(&self, path: &RequestPath) -> io::Result<Lookup> {
        if !path.directory {
            if let Some(body) = self.read(&path.relative)? {
                return Ok(Lookup::Found(StaticResource {
                    body,
                    content_type: content_type(&path.relative),
                }));
            }
            if self.is_dir(&path.relative) {
                return Ok(Lookup::Redirect(format!("/{}/", path.relative)));
            }
            return Ok(Lookup::NotFound);
        }

        for welcome in &self.descriptor.welcome_files {
            let candidate = path.join(welcome);
            if let Some(body) = self.read(&candidate)? {
                return Ok(Lookup::Found(StaticResource {
                    body,
                    content_type: content_type(&candidate),
                }));
            }
        }
        Ok(Lookup::NotFound)
    }
}
