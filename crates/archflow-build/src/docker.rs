//! docker CLI (buildx) によるビルドエンジン

use crate::auth::RegistryCredentials;
use crate::builder::ImageBuilder;
use crate::command::{DockerProgram, stderr_tail};
use crate::dispatch::Dispatcher;
use crate::engine::BuildEngine;
use crate::error::{BuildError, BuildResult};
use crate::manifest::{ManifestPusher, ManifestRequest};
use crate::progress::BuildProgress;
use archflow_core::{BuildOutput, BuildRequest, RunnerMode};
use async_trait::async_trait;

#[derive(Debug, Default, Clone)]
pub struct DockerCli {
    docker: DockerProgram,
    builder: ImageBuilder,
    dispatcher: Dispatcher,
    manifests: ManifestPusher,
}

impl DockerCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定した docker CLI を使うエンジン
    pub fn with_program(docker: DockerProgram) -> Self {
        Self {
            builder: ImageBuilder::with_program(docker.clone()),
            dispatcher: Dispatcher::with_program(docker.clone()),
            manifests: ManifestPusher::with_program(docker.clone()),
            docker,
        }
    }
}

#[async_trait]
impl BuildEngine for DockerCli {
    async fn check_environment(
        &self,
        request: &BuildRequest,
        runner: RunnerMode,
    ) -> BuildResult<()> {
        self.dispatcher.check(request, runner).await
    }

    async fn login(&self, registry: &str, credentials: &RegistryCredentials) -> BuildResult<()> {
        tracing::info!("Logging in to {} as {}", registry, credentials.username);

        let output = self
            .docker
            .run_with_stdin(
                None,
                credentials.login_args(registry),
                credentials.password().as_bytes(),
            )
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(BuildError::AuthFailed {
                registry: registry.to_string(),
                message: stderr_tail(&output.stderr, 5),
            })
        }
    }

    async fn build(
        &self,
        request: &BuildRequest,
        progress: &BuildProgress,
    ) -> BuildResult<BuildOutput> {
        self.builder.build(request, progress).await
    }

    async fn create_manifest(&self, manifest: &ManifestRequest) -> BuildResult<BuildOutput> {
        self.manifests.push(manifest).await
    }
}
