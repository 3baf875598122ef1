//! ビルドプラン
//!
//! 入力を解決して、アーキテクチャごとのビルドリクエストを組み立てます。

use crate::error::{CoreError, Result};
use crate::image::{arch_tag, registry_of, resolve_tags, validate_tag};
use crate::model::inputs::non_empty;
use crate::model::{Arch, BuildInputs, RunnerMode, parse_platforms};
use crate::resolver::{BuildResolver, ResolvedParams, validate_build_args};
use serde::Serialize;

/// デフォルトの multiarch プラットフォーム
pub const DEFAULT_PLATFORMS: &str = "linux/amd64,linux/arm64";

/// 1アーキテクチャ分のビルドリクエスト
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildRequest {
    pub arch: Arch,
    /// タグなしのリポジトリ名（例: ghcr.io/acme/app）
    pub repository: String,
    /// このイメージに付けるタグ
    pub tags: Vec<String>,
    pub params: ResolvedParams,
    pub push: bool,
    pub target: Option<String>,
    pub no_cache: bool,
    pub docker_host: Option<String>,
}

impl BuildRequest {
    /// `repository:tag` 形式の参照一覧
    pub fn references(&self) -> Vec<String> {
        self.tags
            .iter()
            .map(|tag| format!("{}:{}", self.repository, tag))
            .collect()
    }

    /// 出力に使う主参照（最初のタグ）
    pub fn primary_reference(&self) -> String {
        self.references().into_iter().next().unwrap_or_default()
    }
}

/// 実行単位（ARM / AMD / multiarch）ごとのビルドプラン
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildPlan {
    pub repository: String,
    /// 最終的な成果物（単一アーキテクチャのイメージ、またはマニフェストリスト）のタグ
    pub tags: Vec<String>,
    pub push: bool,
    pub registry: String,
    pub runner: RunnerMode,
    pub multiarch: bool,
    pub requests: Vec<BuildRequest>,
}

impl BuildPlan {
    /// 単一アーキテクチャのプランを作成
    ///
    /// イメージは tags 入力のタグそのままでプッシュされる。
    pub fn single(inputs: &BuildInputs, arch: Arch) -> Result<Self> {
        let mut plan = Self::base(inputs, false)?;
        let request = plan.request(inputs, arch, plan.tags.clone());
        plan.requests.push(request);
        Ok(plan)
    }

    /// multiarch プランを作成
    ///
    /// アーキテクチャ別イメージは `<tag>-<arch>` でプッシュし、
    /// プレーンなタグはマニフェストリストに使う。
    pub fn multiarch(inputs: &BuildInputs) -> Result<Self> {
        let platforms = non_empty(&inputs.platforms).unwrap_or(DEFAULT_PLATFORMS);
        let archs = parse_platforms(platforms)?;

        let mut plan = Self::base(inputs, true)?;
        let requests: Vec<BuildRequest> = archs
            .into_iter()
            .map(|arch| {
                let tags = plan.tags.iter().map(|tag| arch_tag(tag, arch)).collect();
                plan.request(inputs, arch, tags)
            })
            .collect();
        plan.requests = requests;
        Ok(plan)
    }

    fn base(inputs: &BuildInputs, multiarch: bool) -> Result<Self> {
        let image_name =
            non_empty(&inputs.image_name).ok_or(CoreError::MissingInput("image_name"))?;
        let (repository, tags) = resolve_tags(image_name, &inputs.tags);

        if repository.is_empty() {
            return Err(CoreError::MissingInput("image_name"));
        }

        let registry = non_empty(&inputs.registry)
            .map(str::to_string)
            .unwrap_or_else(|| registry_of(&repository));

        Ok(Self {
            repository,
            tags,
            push: inputs.push(),
            registry,
            runner: inputs.runner.unwrap_or_default(),
            multiarch,
            requests: Vec::new(),
        })
    }

    fn request(&self, inputs: &BuildInputs, arch: Arch, tags: Vec<String>) -> BuildRequest {
        let resolver = BuildResolver::new(inputs);
        resolver.warn_sensitive_build_args(arch);

        BuildRequest {
            arch,
            repository: self.repository.clone(),
            tags,
            params: resolver.resolve(arch),
            push: self.push,
            target: non_empty(&inputs.target).map(str::to_string),
            no_cache: inputs.no_cache(),
            docker_host: non_empty(&inputs.override_for(arch).docker_host).map(str::to_string),
        }
    }

    /// 計画されたアーキテクチャ一覧（実行順）
    pub fn archs(&self) -> Vec<Arch> {
        self.requests.iter().map(|r| r.arch).collect()
    }

    pub fn request_for(&self, arch: Arch) -> Option<&BuildRequest> {
        self.requests.iter().find(|r| r.arch == arch)
    }

    /// `repository:tag` 形式の最終成果物の参照一覧
    pub fn references(&self) -> Vec<String> {
        self.tags
            .iter()
            .map(|tag| format!("{}:{}", self.repository, tag))
            .collect()
    }

    pub fn primary_reference(&self) -> String {
        self.references().into_iter().next().unwrap_or_default()
    }

    /// ビルド前に検出できる設定エラーを検証
    pub fn validate(&self) -> Result<()> {
        for tag in &self.tags {
            validate_tag(tag)?;
        }

        for request in &self.requests {
            for tag in &request.tags {
                validate_tag(tag)?;
            }
            validate_build_args(request.arch, &request.params.build_args)?;
        }

        Ok(())
    }
}
