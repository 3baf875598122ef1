//! archflow Docker Image Build functionality
//!
//! This crate runs per-architecture image builds through `docker buildx`,
//! composes multiarch manifest lists, and sequences both in a pipeline:
//! preflight, dispatch checks, parallel builds, join, then manifest.

pub mod auth;
pub mod builder;
pub mod command;
pub mod dispatch;
pub mod docker;
pub mod engine;
pub mod error;
#[cfg(all(test, unix))]
pub(crate) mod fake_docker;
pub mod manifest;
pub mod pipeline;
pub mod progress;

pub use auth::{RegistryAuth, RegistryCredentials};
pub use builder::ImageBuilder;
pub use command::DockerProgram;
pub use dispatch::{Dispatcher, connect_docker, parse_buildx_platforms};
pub use docker::DockerCli;
pub use engine::BuildEngine;
pub use error::{ArchFailure, BuildError, BuildResult, ErrorKind};
pub use manifest::{ManifestPusher, ManifestRequest, ManifestSource};
pub use pipeline::{Pipeline, PipelineReport, PipelineState};
pub use progress::BuildProgress;
