//! コマンドライン入力
//!
//! フラグは `BuildInputs` に変換され、設定ファイルの値の上にマージされる。

use archflow_build::RegistryAuth;
use archflow_core::{Arch, ArchOverride, BuildInputs, RunnerMode};
use clap::Args;
use std::path::PathBuf;

/// すべての実行単位に共通の入力
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// イメージ名（例: ghcr.io/acme/app）
    #[arg(long, env = "ARCHFLOW_IMAGE_NAME")]
    pub image_name: Option<String>,

    /// Dockerfileのパス [default: ./Dockerfile]
    #[arg(long)]
    pub dockerfile_path: Option<String>,

    /// ビルドコンテキスト [default: .]
    #[arg(long)]
    pub context: Option<String>,

    /// ビルド引数（KEY=VALUE をカンマまたは改行で区切る）
    #[arg(long)]
    pub build_args: Option<String>,

    /// レジストリにプッシュする（--push=false で無効化）
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub push: Option<bool>,

    /// イメージタグ（複数指定可、改行区切りも可） [default: latest]
    #[arg(long = "tag", env = "ARCHFLOW_TAGS")]
    pub tags: Vec<String>,

    /// ビルドターゲットステージ
    #[arg(long)]
    pub target: Option<String>,

    /// キャッシュを使用しない
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub no_cache: Option<bool>,

    /// ログイン先レジストリ（省略時はイメージ名から推定）
    #[arg(long)]
    pub registry: Option<String>,

    /// 実行環境 (emulated, native) [default: emulated]
    #[arg(long, value_parser = parse_runner)]
    pub runner: Option<RunnerMode>,

    /// 入力ファイル（archflow.kdl）のパス
    #[arg(long, env = "ARCHFLOW_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// 出力（key=value）を追記するファイル
    #[arg(long, env = "GITHUB_OUTPUT")]
    pub output_file: Option<PathBuf>,

    /// 出力をJSONで表示
    #[arg(long)]
    pub json: bool,

    /// レジストリのユーザー名（push 時に必須）
    #[arg(long, env = "REGISTRY_USERNAME")]
    pub registry_username: Option<String>,

    /// レジストリのパスワードまたはトークン（push 時に必須）
    #[arg(long, env = "REGISTRY_PASSWORD", hide_env_values = true)]
    pub registry_password: Option<String>,
}

impl CommonArgs {
    pub fn to_inputs(&self) -> BuildInputs {
        BuildInputs {
            image_name: self.image_name.clone(),
            dockerfile_path: self.dockerfile_path.clone(),
            context: self.context.clone(),
            build_args: self.build_args.clone(),
            push: self.push,
            tags: self.tags.clone(),
            target: self.target.clone(),
            no_cache: self.no_cache,
            registry: self.registry.clone(),
            runner: self.runner,
            ..Default::default()
        }
    }

    pub fn auth(&self) -> RegistryAuth {
        RegistryAuth::new(
            self.registry_username.clone(),
            self.registry_password.clone(),
        )
    }
}

/// multiarch 専用の入力
#[derive(Args, Debug, Clone, Default)]
pub struct MultiarchArgs {
    /// ビルドするプラットフォーム [default: linux/amd64,linux/arm64]
    #[arg(long)]
    pub platforms: Option<String>,

    /// ARM64 用の Dockerfile
    #[arg(long)]
    pub arm_dockerfile_path: Option<String>,

    /// ARM64 用のビルドコンテキスト
    #[arg(long)]
    pub arm_context: Option<String>,

    /// ARM64 用のビルド引数（共通のビルド引数を置き換える）
    #[arg(long)]
    pub arm_build_args: Option<String>,

    /// ARM64 ビルドを実行する Docker ホスト
    #[arg(long)]
    pub arm_docker_host: Option<String>,

    /// AMD64 用の Dockerfile
    #[arg(long)]
    pub amd_dockerfile_path: Option<String>,

    /// AMD64 用のビルドコンテキスト
    #[arg(long)]
    pub amd_context: Option<String>,

    /// AMD64 用のビルド引数（共通のビルド引数を置き換える）
    #[arg(long)]
    pub amd_build_args: Option<String>,

    /// AMD64 ビルドを実行する Docker ホスト
    #[arg(long)]
    pub amd_docker_host: Option<String>,
}

impl MultiarchArgs {
    pub fn apply(&self, inputs: &mut BuildInputs) {
        inputs.platforms = self.platforms.clone();
        inputs.arm = ArchOverride {
            dockerfile_path: self.arm_dockerfile_path.clone(),
            context: self.arm_context.clone(),
            build_args: self.arm_build_args.clone(),
            docker_host: self.arm_docker_host.clone(),
        };
        inputs.amd = ArchOverride {
            dockerfile_path: self.amd_dockerfile_path.clone(),
            context: self.amd_context.clone(),
            build_args: self.amd_build_args.clone(),
            docker_host: self.amd_docker_host.clone(),
        };
    }
}

pub fn parse_arch(s: &str) -> Result<Arch, String> {
    Arch::parse(s)
        .ok_or_else(|| format!("unknown architecture '{}' (expected arm64 or amd64)", s))
}

fn parse_runner(s: &str) -> Result<RunnerMode, String> {
    RunnerMode::parse(s)
        .ok_or_else(|| format!("unknown runner mode '{}' (expected emulated or native)", s))
}
