//! ビルドエンジンの抽象化

use crate::auth::RegistryCredentials;
use crate::error::BuildResult;
use crate::manifest::ManifestRequest;
use crate::progress::BuildProgress;
use archflow_core::{BuildOutput, BuildRequest, RunnerMode};
use async_trait::async_trait;

/// イメージのビルド・プッシュ・マニフェスト作成を行うエンジン
///
/// 本番では `DockerCli`（docker buildx）が実装する。
/// パイプラインはこのトレイトだけに依存する。
#[async_trait]
pub trait BuildEngine: Send + Sync {
    /// リクエストのアーキテクチャを実行できる環境があるか確認
    async fn check_environment(
        &self,
        request: &BuildRequest,
        runner: RunnerMode,
    ) -> BuildResult<()>;

    /// レジストリにログイン
    async fn login(&self, registry: &str, credentials: &RegistryCredentials) -> BuildResult<()>;

    /// 1アーキテクチャ分のイメージをビルド（push=true ならプッシュも行う）
    async fn build(
        &self,
        request: &BuildRequest,
        progress: &BuildProgress,
    ) -> BuildResult<BuildOutput>;

    /// アーキテクチャ別イメージのダイジェストからマニフェストリストを作成してプッシュ
    async fn create_manifest(&self, manifest: &ManifestRequest) -> BuildResult<BuildOutput>;
}
