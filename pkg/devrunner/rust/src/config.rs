// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;

use crate::backend::BackendKind;
use crate::errors::Error;

/// Looked up in the work directory when no file is named explicitly.
pub const CONFIG_FILE: &str = "devrunner.yaml";

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_stop_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    #[serde(default)]
    pub backend: Option<BackendKind>,
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    /// Seconds to wait for open connections on shutdown.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: u64,
    /// Extra patterns on top of the built-in system classes.
    #[serde(default)]
    pub system_classes: Vec<String>,
    #[serde(default)]
    pub server_classes: Vec<String>,
    #[serde(default)]
    pub host_classpath: Vec<PathBuf>,
    /// Extra annotations that mark a class as a component.
    #[serde(default)]
    pub discoverable_annotations: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            backend: None,
            bind_address: default_bind_address(),
            stop_timeout: default_stop_timeout(),
            system_classes: Vec::new(),
            server_classes: Vec::new(),
            host_classpath: Vec::new(),
            discoverable_annotations: Vec::new(),
        }
    }
}

impl RunnerConfig {
    pub fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document means all defaults.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    /// Load the config named by `explicit`, or `devrunner.yaml` from
    /// `work_dir` if present. An explicit file must exist and parse.
    pub fn load(explicit: Option<&Path>, work_dir: Option<&Path>) -> Result<Self, Error> {
        let path = match (explicit, work_dir) {
            (Some(path), _) => path.to_path_buf(),
            (None, Some(dir)) if dir.join(CONFIG_FILE).is_file() => dir.join(CONFIG_FILE),
            _ => {
                debug!("no config file, using defaults");
                return Ok(Self::default());
            }
        };
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| Error::Configuration(format!("reading {}: {e}", path.display())))?;
        let config = Self::parse(&contents)
            .map_err(|e| Error::Configuration(format!("parsing {}: {e}", path.display())))?;
        debug!("loaded config from {}", path.display());
        Ok(config)
    }
}
