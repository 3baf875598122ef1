//! アーキテクチャの実行環境チェック
//!
//! ビルドを開始する前に、要求されたアーキテクチャを実行できる環境が
//! 存在するかを確認する。環境がない場合は黙ってスキップせず失敗させる。

use crate::command::{DockerProgram, stderr_tail};
use crate::error::{BuildError, BuildResult};
use archflow_core::{Arch, BuildRequest, RunnerMode};
use bollard::{API_DEFAULT_VERSION, Docker};

/// Docker API のタイムアウト（秒）
const DOCKER_TIMEOUT_SECS: u64 = 120;

/// Docker デーモンに接続
///
/// `docker_host` が None ならローカルのデフォルト（DOCKER_HOST またはソケット）を使う。
pub fn connect_docker(docker_host: Option<&str>) -> BuildResult<Docker> {
    let Some(host) = docker_host else {
        return Ok(Docker::connect_with_local_defaults()?);
    };

    if host.starts_with("unix://") {
        Ok(Docker::connect_with_unix(
            host,
            DOCKER_TIMEOUT_SECS,
            API_DEFAULT_VERSION,
        )?)
    } else if host.starts_with("tcp://") || host.starts_with("http://") {
        Ok(Docker::connect_with_http(
            host,
            DOCKER_TIMEOUT_SECS,
            API_DEFAULT_VERSION,
        )?)
    } else {
        Err(BuildError::InvalidConfig(format!(
            "unsupported docker host for engine inspection: {} (use unix:// or tcp://)",
            host
        )))
    }
}

/// `docker buildx inspect` の出力から対応プラットフォームを取り出す
///
/// ```text
/// Platforms: linux/amd64*, linux/arm64, linux/arm/v7
/// ```
pub fn parse_buildx_platforms(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Platforms:"))
        .flat_map(|list| list.split(','))
        .map(|p| p.trim().trim_end_matches('*').trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// プラットフォーム一覧がアーキテクチャを含むか
///
/// `linux/arm64/v8` のようなバリアント付きの表記も一致として扱う。
fn supports(platforms: &[String], arch: Arch) -> bool {
    let wanted = arch.platform();
    platforms.iter().any(|p| {
        p == wanted
            || p
                .strip_prefix(wanted)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// 実行環境のチェッカー
#[derive(Debug, Default, Clone)]
pub struct Dispatcher {
    docker: DockerProgram,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(docker: DockerProgram) -> Self {
        Self { docker }
    }

    pub async fn check(&self, request: &BuildRequest, runner: RunnerMode) -> BuildResult<()> {
        tracing::debug!(arch = %request.arch, runner = %runner, "Checking execution environment");
        match runner {
            RunnerMode::Emulated => self.check_buildx(request).await,
            RunnerMode::Native => self.check_native(request).await,
        }
    }

    /// buildx ビルダー（QEMU エミュレーション含む）が対象プラットフォームに対応しているか
    async fn check_buildx(&self, request: &BuildRequest) -> BuildResult<()> {
        let arch = request.arch;
        let output = self
            .docker
            .run(
                request.docker_host.as_deref(),
                ["buildx", "inspect", "--bootstrap"],
            )
            .await?;

        if !output.status.success() {
            return Err(BuildError::DispatchFailed {
                arch,
                reason: format!(
                    "docker buildx is not available: {}",
                    stderr_tail(&output.stderr, 5)
                ),
            });
        }

        let platforms = parse_buildx_platforms(&String::from_utf8_lossy(&output.stdout));
        tracing::debug!(arch = %arch, "buildx platforms: {:?}", platforms);

        if supports(&platforms, arch) {
            Ok(())
        } else {
            Err(BuildError::DispatchFailed {
                arch,
                reason: format!(
                    "buildx builder does not support {} (available: {}). Install QEMU binfmt handlers or use a native runner",
                    arch.platform(),
                    if platforms.is_empty() {
                        "none".to_string()
                    } else {
                        platforms.join(", ")
                    }
                ),
            })
        }
    }

    /// Docker エンジン自体がネイティブに対象アーキテクチャで動いているか
    async fn check_native(&self, request: &BuildRequest) -> BuildResult<()> {
        let arch = request.arch;
        let engine_error = |e: &dyn std::fmt::Display| BuildError::DispatchFailed {
            arch,
            reason: format!("docker engine unreachable: {}", e),
        };

        let docker = connect_docker(request.docker_host.as_deref())?;
        let version = docker.version().await.map_err(|e| engine_error(&e))?;

        let engine_arch = version.arch.unwrap_or_default();
        match Arch::parse(&engine_arch) {
            Some(found) if found == arch => Ok(()),
            _ => Err(BuildError::DispatchFailed {
                arch,
                reason: format!(
                    "native runner required but the docker engine reports architecture '{}'",
                    engine_arch
                ),
            }),
        }
    }
}
