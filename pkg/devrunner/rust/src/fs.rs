// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Size-checked reads out of directories and zip archives.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use cap_std::fs::Dir;
use zip::ZipArchive;

/// Upper bound for a single class file or served resource.
pub const MAX_ENTRY_SIZE: u64 = 64 * 1024 * 1024; // 64 MiB

/// A directory whose lookups can never escape its root, not even through
/// symbolic links.
pub struct RootDir {
    dir: Dir,
    root_path: PathBuf,
}

impl std::fmt::Debug for RootDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RootDir").field(&self.root_path).finish()
    }
}

/// Strip the leading slash so the path is accepted by cap_std.
fn fix_path(path: &str) -> &str {
    path.trim_start_matches('/')
}

impl RootDir {
    pub fn open(root: &Path) -> io::Result<Self> {
        let dir = Dir::open_ambient_dir(root, cap_std::ambient_authority())?;
        Ok(Self {
            dir,
            root_path: root.to_path_buf(),
        })
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn is_dir(&self, path: &str) -> bool {
        let fixed = fix_path(path);
        if fixed.is_empty() {
            return true;
        }
        self.dir.metadata(fixed).is_ok_and(|m| m.is_dir())
    }

    /// Read a regular file. Missing files, directories and paths the
    /// sandbox refuses all read as `None`.
    pub fn read_file(&self, path: &str) -> io::Result<Option<Vec<u8>>> {
        let fixed = fix_path(path);
        if fixed.is_empty() {
            return Ok(None);
        }
        let file = match self.dir.open(fixed) {
            Ok(file) => file,
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied) => {
                return Ok(None);
            }
            Err(e) => {
                log::debug!("{}: cannot open {path}: {e}", self.root_path.display());
                return Ok(None);
            }
        };
        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Ok(None);
        }
        let size = metadata.len();
        if size > MAX_ENTRY_SIZE {
            return Err(too_large(size));
        }
        let mut buf = Vec::new();
        // Limit the reader in case the file grows while being read.
        file.take(size).read_to_end(&mut buf)?;
        Ok(Some(buf))
    }
}

fn too_large(size: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("entry too large ({size} bytes, max {MAX_ENTRY_SIZE} bytes)"),
    )
}

pub fn zip_error(path: &Path, e: zip::result::ZipError) -> io::Error {
    match e {
        zip::result::ZipError::Io(e) => e,
        e => io::Error::new(
            io::ErrorKind::InvalidData,
            format!("failed to open archive {}: {e}", path.display()),
        ),
    }
}

pub fn open_archive(path: &Path) -> io::Result<ZipArchive<File>> {
    let file = File::open(path)?;
    if !file.metadata()?.is_file() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"));
    }
    ZipArchive::new(file).map_err(|e| zip_error(path, e))
}

/// Read a zip entry after checking its declared `size`.
pub fn read_zip_entry(entry: impl Read, size: u64) -> io::Result<Vec<u8>> {
    if size > MAX_ENTRY_SIZE {
        return Err(too_large(size));
    }
    let mut buf = Vec::new();
    entry.take(size).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Read one named entry of the archive at `path`, `None` if absent.
pub fn read_archive_entry(path: &Path, name: &str) -> io::Result<Option<Vec<u8>>> {
    let mut archive = open_archive(path)?;
    match archive.by_name(name) {
        Ok(entry) if entry.is_file() => {
            let size = entry.size();
            read_zip_entry(entry, size).map(Some)
        }
        Ok(_) | Err(zip::result::ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(zip_error(path, e)),
    }
}
