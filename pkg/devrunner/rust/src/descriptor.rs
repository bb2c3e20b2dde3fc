// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! `web.xml` and `web-fragment.xml` descriptors.

use std::path::Path;

use serde::Deserialize;

use crate::errors::Error;

pub const WEB_XML_PATH: &str = "WEB-INF/web.xml";
pub const WEB_FRAGMENT_PATH: &str = "META-INF/web-fragment.xml";
pub const DEFAULT_WELCOME_FILES: &[&str] = &["index.html", "index.htm"];

/// Root element of both descriptor kinds; unknown elements are ignored.
/// Example: https://jakarta.ee/xml/ns/jakartaee/web-app_6_0.xsd
#[derive(Debug, Default, Deserialize)]
struct RawDescriptor {
    #[serde(rename = "@metadata-complete", default)]
    metadata_complete: Option<String>,
    #[serde(rename = "display-name", default)]
    display_name: Option<String>,
    #[serde(rename = "welcome-file-list", default)]
    welcome_file_list: Option<WelcomeFileList>,
}

#[derive(Debug, Default, Deserialize)]
struct WelcomeFileList {
    #[serde(rename = "welcome-file", default)]
    welcome_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebDescriptor {
    pub metadata_complete: bool,
    pub display_name: Option<String>,
    pub welcome_files: Vec<String>,
}

impl Default for WebDescriptor {
    fn default() -> Self {
        Self {
            metadata_complete: false,
            display_name: None,
            welcome_files: DEFAULT_WELCOME_FILES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl WebDescriptor {
    pub fn parse(xml: &[u8]) -> Result<Self, Error> {
        let raw: RawDescriptor = quick_xml::de::from_reader(xml)
            .map_err(|e| Error::Deploy(format!("failed to parse descriptor: {e}")))?;

        let welcome_files: Vec<String> = raw
            .welcome_file_list
            .map(|list| {
                list.welcome_files
                    .into_iter()
                    .map(|f| f.trim().trim_start_matches('/').to_string())
                    .filter(|f| !f.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let defaults = Self::default();
        Ok(Self {
            metadata_complete: raw
                .metadata_complete
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
            display_name: raw.display_name.map(|n| n.trim().to_string()),
            welcome_files: if welcome_files.is_empty() {
                defaults.welcome_files
            } else {
                welcome_files
            },
        })
    }

    /// Read `WEB-INF/web.xml` under a document root. A missing file yields
    /// the defaults.
    pub fn load(content_root: &Path) -> Result<Self, Error> {
        match std::fs::read(content_root.join(WEB_XML_PATH)) {
            Ok(buf) => Self::parse(&buf),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::Deploy(format!("failed to read {WEB_XML_PATH}: {e}"))),
        }
    }
}
