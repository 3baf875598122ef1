//! マルチアーキテクチャビルドのパイプライン
//!
//! 事前チェック → ログイン → 実行環境チェック → 並列ビルド → join → マニフェスト
//! の順に進める。マニフェストはすべてのアーキテクチャのビルドが成功し、
//! かつ push が有効な場合にのみ作成される。リトライは行わない。

use crate::auth::{RegistryAuth, RegistryCredentials};
use crate::engine::BuildEngine;
use crate::error::{ArchFailure, BuildError, BuildResult};
use crate::manifest::ManifestRequest;
use crate::progress::BuildProgress;
use archflow_core::{Arch, BuildOutput, BuildPlan};
use futures_util::future::try_join_all;
use indicatif::{MultiProgress, ProgressDrawTarget};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Pending,
    Building,
    Manifesting,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Building => "building",
            Self::Manifesting => "manifesting",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// パイプラインの実行結果
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub multiarch: bool,
    /// 最終成果物の主参照
    pub primary_reference: String,
    /// アーキテクチャ別の結果（プラン順）
    pub outputs: Vec<BuildOutput>,
    /// 作成したマニフェストリスト（push=false の場合は None）
    pub manifest: Option<BuildOutput>,
    pub history: Vec<PipelineState>,
}

impl PipelineReport {
    /// 実行単位としての最終出力
    ///
    /// 単一アーキテクチャはそのイメージ、multiarch はマニフェストリスト。
    /// マニフェストを作らなかった multiarch では digest は空になる。
    pub fn final_output(&self) -> BuildOutput {
        if let Some(manifest) = &self.manifest {
            return manifest.clone();
        }
        if !self.multiarch
            && let Some(output) = self.outputs.first()
        {
            return output.clone();
        }
        BuildOutput::new(None, self.primary_reference.clone(), "")
    }

    pub fn output_for(&self, arch: Arch) -> Option<&BuildOutput> {
        self.outputs.iter().find(|o| o.arch == Some(arch))
    }
}

pub struct Pipeline {
    engine: Arc<dyn BuildEngine>,
    multi: MultiProgress,
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl Pipeline {
    /// 進捗表示なしで作成
    pub fn new(engine: Arc<dyn BuildEngine>) -> Self {
        Self {
            engine,
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            state: PipelineState::Pending,
            history: vec![PipelineState::Pending],
        }
    }

    /// アーキテクチャごとのスピナーを表示する
    pub fn with_progress(mut self, multi: MultiProgress) -> Self {
        self.multi = multi;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    fn transition(&mut self, next: PipelineState) {
        tracing::info!("Pipeline: {} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    /// プランを実行
    pub async fn run(
        &mut self,
        plan: &BuildPlan,
        auth: &RegistryAuth,
    ) -> BuildResult<PipelineReport> {
        match self.execute(plan, auth).await {
            Ok(report) => Ok(report),
            Err(e) => {
                tracing::error!("Pipeline failed: {}", e);
                self.transition(PipelineState::Failed);
                Err(e)
            }
        }
    }

    async fn execute(
        &mut self,
        plan: &BuildPlan,
        auth: &RegistryAuth,
    ) -> BuildResult<PipelineReport> {
        let credentials = preflight(plan, auth)?;

        if let Some(credentials) = &credentials {
            self.engine.login(&plan.registry, credentials).await?;
        }

        // ビルドを始める前にすべてのアーキテクチャの実行環境を確認
        try_join_all(
            plan.requests
                .iter()
                .map(|request| self.engine.check_environment(request, plan.runner)),
        )
        .await?;

        self.transition(PipelineState::Building);
        let outputs = self.build_all(plan).await?;

        let manifest = if plan.multiarch && plan.push {
            self.transition(PipelineState::Manifesting);
            let request = ManifestRequest::from_outputs(plan, &outputs)?;
            Some(self.engine.create_manifest(&request).await?)
        } else {
            None
        };

        self.transition(PipelineState::Done);

        Ok(PipelineReport {
            multiarch: plan.multiarch,
            primary_reference: plan.primary_reference(),
            outputs,
            manifest,
            history: self.history.clone(),
        })
    }

    /// すべてのアーキテクチャを並列にビルドし、全タスクの終了を待つ
    ///
    /// 1つが失敗しても他のビルドは中断しない。
    async fn build_all(&self, plan: &BuildPlan) -> BuildResult<Vec<BuildOutput>> {
        let mut tasks = JoinSet::new();

        for request in plan.requests.iter().cloned() {
            let engine = Arc::clone(&self.engine);
            let progress = BuildProgress::new(request.arch.as_str(), &self.multi);

            tasks.spawn(async move {
                let result = engine.build(&request, &progress).await;
                match &result {
                    Ok(_) => progress.finish_success(),
                    Err(e) => progress.finish_error(&e.to_string()),
                }
                (request.arch, result)
            });
        }

        let mut pending = plan.archs();
        let mut outputs = Vec::new();
        let mut failures = Vec::new();
        let mut join_errors = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((arch, result)) => {
                    pending.retain(|a| *a != arch);
                    match result {
                        Ok(output) => outputs.push(output),
                        Err(error) => {
                            tracing::error!(arch = %arch, "Build failed: {}", error);
                            failures.push(ArchFailure { arch, error });
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Build task terminated abnormally: {}", e);
                    join_errors.push(e.to_string());
                }
            }
        }

        // 結果を返さずに終わったタスク
        for arch in pending {
            failures.push(ArchFailure {
                arch,
                error: BuildError::TaskAborted {
                    arch,
                    message: join_errors.join("; "),
                },
            });
        }

        let order = plan.archs();
        let position = |arch: Option<Arch>| order.iter().position(|a| Some(*a) == arch);
        outputs.sort_by_key(|o| position(o.arch));
        failures.sort_by_key(|f| position(Some(f.arch)));

        if failures.is_empty() {
            return Ok(outputs);
        }

        if !plan.multiarch && failures.len() == 1 {
            return Err(failures.remove(0).error);
        }

        Err(BuildError::ArchitecturesFailed { failures })
    }
}

/// エンジンを呼び出す前に検出できるエラーを確認
///
/// push が有効な場合は検証済みの認証情報を返す。
fn preflight(plan: &BuildPlan, auth: &RegistryAuth) -> BuildResult<Option<RegistryCredentials>> {
    if plan.requests.is_empty() {
        return Err(BuildError::InvalidConfig("no architectures to build".to_string()));
    }

    plan.validate()?;

    if plan.push {
        Ok(Some(auth.credentials()?))
    } else {
        Ok(None)
    }
}
