// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;

use crate::backend::BackendKind;
use crate::errors::Error;

/// Run a web application from loose build output under an embedded backend.
///
/// Lifecycle tokens are written to stdout, logs to stderr.
#[derive(Parser, Debug, Clone)]
#[command(name = "devrunner", version)]
pub struct Args {
    /// Port to listen on.
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,

    /// Web content root (static files, WEB-INF/web.xml).
    pub content_root: PathBuf,

    /// Compiled classes.
    pub class_root: PathBuf,

    /// Processed resources.
    pub resources_root: PathBuf,

    /// Log level, Rust or java.util.logging names (INFO, FINE, SEVERE, ...).
    pub log_level: String,

    /// Name of the scattered archive (application server only).
    pub archive_name: Option<String>,

    /// Directory holding classpath.txt; archive temp root for the
    /// application server.
    pub work_dir: Option<PathBuf>,

    /// Embedded backend to run.
    #[arg(long, env = "DEVRUN_BACKEND", value_enum)]
    pub backend: Option<BackendKind>,

    /// YAML config file.
    #[arg(long, env = "DEVRUN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write the current lifecycle state to this file.
    #[arg(long)]
    pub status_file: Option<PathBuf>,
}

impl Args {
    pub fn level(&self) -> Result<LevelFilter, Error> {
        devrun_log::parse_level(&self.log_level)
            .ok_or_else(|| Error::Configuration(format!("unknown log level {:?}", self.log_level)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const BASE: [&str; 6] = ["devrunner", "8080", "/src/webapp", "/build/classes", "/build/resources", "INFO"];

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(BASE.iter().chain(extra))
    }

    #[test]
    fn test_positional_arguments() {
        temp_env::with_vars([("DEVRUN_BACKEND", None::<&str>), ("DEVRUN_CONFIG", None)], || {
            let args = parse(&["demo", "/build/devrun"]).unwrap();
            assert_eq!(args.port, 8080);
            assert_eq!(args.content_root, PathBuf::from("/src/webapp"));
            assert_eq!(args.class_root, PathBuf::from("/build/classes"));
            assert_eq!(args.resources_root, PathBuf::from("/build/resources"));
            assert_eq!(args.level().unwrap(), LevelFilter::Info);
            assert_eq!(args.archive_name.as_deref(), Some("demo"));
            assert_eq!(args.work_dir, Some(PathBuf::from("/build/devrun")));
            assert_eq!(args.backend, None);
            assert_eq!(args.config, None);
        });
    }

    #[test]
    fn test_trailing_positionals_optional() {
        let args = parse(&[]).unwrap();
        assert!(args.archive_name.is_none());
        assert!(args.work_dir.is_none());
    }

    #[test]
    fn test_port_must_be_positive() {
        let err = Args::try_parse_from(["devrunner", "0", "/a", "/b", "/c", "INFO"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        assert!(Args::try_parse_from(["devrunner", "http", "/a", "/b", "/c", "INFO"]).is_err());
    }

    #[test]
    fn test_missing_positionals() {
        assert!(Args::try_parse_from(["devrunner", "8080", "/a"]).is_err());
    }

    #[test]
    fn test_backend_flag_and_env() {
        temp_env::with_var("DEVRUN_BACKEND", Some("appserver"), || {
            assert_eq!(parse(&[]).unwrap().backend, Some(BackendKind::Appserver));
            assert_eq!(
                parse(&["--backend", "servlet"]).unwrap().backend,
                Some(BackendKind::Servlet)
            );
        });
        temp_env::with_var("DEVRUN_BACKEND", None::<&str>, || {
            assert!(parse(&["--backend", "tomcat"]).is_err());
        });
    }

    #[test]
    fn test_config_from_env() {
        temp_env::with_var("DEVRUN_CONFIG", Some("/etc/devrunner.yaml"), || {
            assert_eq!(parse(&[]).unwrap().config, Some(PathBuf::from("/etc/devrunner.yaml")));
        });
    }

    #[test]
    fn test_unknown_level_is_configuration_error() {
        let mut args = parse(&[]).unwrap();
        args.log_level = "chatty".to_string();
        assert!(matches!(args.level(), Err(Error::Configuration(_))));
        args.log_level = "FINEST".to_string();
        assert_eq!(args.level().unwrap(), LevelFilter::Trace);
    }
}
