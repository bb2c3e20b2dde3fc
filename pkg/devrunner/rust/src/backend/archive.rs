// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Scattered archives: a `.war` that references its web root and class path
//! on disk instead of packaging copies of them.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::webapp::WebAppSpec;
use crate::errors::Error;
use crate::fs::read_archive_entry;

pub const ARCHIVE_DESCRIPTOR: &str = "META-INF/devrunner-archive.json";
const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveType {
    War,
}

impl ArchiveType {
    fn extension(self) -> &'static str {
        match self {
            ArchiveType::War => "war",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScatteredArchive {
    name: String,
    #[serde(rename = "type")]
    kind: ArchiveType,
    web_root: Option<PathBuf>,
    class_path: Vec<PathBuf>,
}

fn deploy_error(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Deploy(format!("{}: {e}", path.display()))
}

impl ScatteredArchive {
    /// `name` becomes the archive's file stem, so it must be a plain file name.
    pub fn validate_name(name: &str) -> Result<(), Error> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::Configuration(format!("invalid archive name {name:?}")));
        }
        Ok(())
    }

    pub fn new(name: &str, kind: ArchiveType, web_root: Option<PathBuf>) -> Result<Self, Error> {
        Self::validate_name(name)?;
        Ok(Self {
            name: name.to_string(),
            kind,
            web_root,
            class_path: Vec::new(),
        })
    }

    pub fn add_class_path(&mut self, path: PathBuf) {
        self.class_path.push(path);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class_path(&self) -> &[PathBuf] {
        &self.class_path
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, self.kind.extension())
    }

    fn manifest(&self) -> String {
        let mut manifest = format!(
            "Manifest-Version: 1.0\r\nCreated-By: devrunner\r\nArchive-Name: {}\r\n",
            self.name
        );
        if let Some(root) = &self.web_root {
            manifest.push_str(&format!("Web-Root: {}\r\n", root.display()));
        }
        manifest.push_str("\r\n");
        manifest
    }

    /// Write the archive into `dir` and return its path. The file is
    /// assembled next to its final location and renamed into place; on
    /// failure nothing is left behind.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, Error> {
        fs::create_dir_all(dir).map_err(|e| deploy_error(dir, e))?;
        let target = dir.join(self.file_name());
        let partial = dir.join(format!(".{}.partial", self.file_name()));

        let written = self
            .write_zip(&partial)
            .and_then(|()| fs::rename(&partial, &target).map_err(|e| deploy_error(&target, e)));
        if let Err(e) = written {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }
        Ok(target)
    }

    fn write_zip(&self, path: &Path) -> Result<(), Error> {
        let file = File::create(path).map_err(|e| deploy_error(path, e))?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        zip.start_file(MANIFEST_PATH, options)
            .map_err(|e| deploy_error(path, e))?;
        zip.write_all(self.manifest().as_bytes())
            .map_err(|e| deploy_error(path, e))?;
        zip.start_file(ARCHIVE_DESCRIPTOR, options)
            .map_err(|e| deploy_error(path, e))?;
        serde_json::to_writer_pretty(&mut zip, self).map_err(|e| deploy_error(path, e))?;
        zip.finish().map_err(|e| deploy_error(path, e))?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self, Error> {
        let descriptor = read_archive_entry(path, ARCHIVE_DESCRIPTOR)
            .map_err(|e| deploy_error(path, e))?
            .ok_or_else(|| deploy_error(path, "not a scattered archive"))?;
        serde_json::from_slice(&descriptor).map_err(|e| deploy_error(path, e))
    }

    pub fn into_spec(self) -> WebAppSpec {
        WebAppSpec {
            name: self.name,
            document_root: self.web_root,
            class_path: self.class_path,
        }
    }
}
