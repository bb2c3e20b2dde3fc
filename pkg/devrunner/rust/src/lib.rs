// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::undocumented_unsafe_blocks)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

pub mod backend;
pub mod classpath;
pub mod cli;
pub mod config;
pub mod descriptor;
mod errors;
mod fs;
pub mod lifecycle;
pub mod manifest;
pub mod policy;
pub mod runner;
pub mod scanner;
#[cfg(unix)]
pub mod supervisor;
pub mod unit;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use backend::{Backend, BackendKind, SessionHandle};
pub use config::RunnerConfig;
pub use errors::Error;
pub use lifecycle::{Lifecycle, LifecycleEvent, SessionState};
pub use manifest::ClasspathManifest;
pub use runner::Runner;
#[cfg(unix)]
pub use supervisor::{Supervisor, WaitOutcome};
pub use unit::DeploymentUnit;
