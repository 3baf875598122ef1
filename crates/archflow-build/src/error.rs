use archflow_core::{Arch, CoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Registry credentials missing: {0} (required when push is enabled)")]
    MissingCredentials(&'static str),

    #[error("Invalid build configuration: {0}")]
    InvalidConfig(String),

    #[error("Build failed for {arch} (exit status: {}): {message}", format_code(*code))]
    BuildFailed {
        arch: Arch,
        code: Option<i32>,
        message: String,
    },

    #[error("No execution environment available for {arch}: {reason}")]
    DispatchFailed { arch: Arch, reason: String },

    #[error("docker CLI not found in PATH")]
    DockerCliNotFound,

    #[error("Docker connection error: {0}")]
    DockerConnection(#[from] bollard::errors::Error),

    #[error("Registry authentication failed for {registry}: {message}")]
    AuthFailed { registry: String, message: String },

    #[error("Architecture build failed: {}", format_failures(failures))]
    ArchitecturesFailed { failures: Vec<ArchFailure> },

    #[error("Digest unavailable for {0}; manifest list was not created")]
    DigestUnavailable(Arch),

    #[error("Manifest creation failed: {0}")]
    ManifestFailed(String),

    #[error("Build task for {arch} terminated abnormally: {message}")]
    TaskAborted { arch: Arch, message: String },

    #[error("Build cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// 1アーキテクチャ分の失敗
#[derive(Debug)]
pub struct ArchFailure {
    pub arch: Arch,
    pub error: BuildError,
}

/// エラーの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 入力・認証情報の不備（ビルドは実行されない）
    Config,
    /// Dockerfile やビルドステップの失敗
    Build,
    /// 要求されたアーキテクチャの実行環境がない
    Dispatch,
    /// join またはマニフェスト作成の失敗
    Manifest,
    Cancelled,
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BuildError::Core(_) | BuildError::MissingCredentials(_) | BuildError::InvalidConfig(_) => {
                ErrorKind::Config
            }
            BuildError::BuildFailed { .. } | BuildError::Io(_) | BuildError::Json(_) => {
                ErrorKind::Build
            }
            BuildError::DispatchFailed { .. }
            | BuildError::DockerCliNotFound
            | BuildError::DockerConnection(_) => ErrorKind::Dispatch,
            BuildError::AuthFailed { .. }
            | BuildError::ArchitecturesFailed { .. }
            | BuildError::DigestUnavailable(_)
            | BuildError::ManifestFailed(_)
            | BuildError::TaskAborted { .. } => ErrorKind::Manifest,
            BuildError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// プロセスの終了コード
    ///
    /// ビルド失敗は docker buildx 自身の終了コードをそのまま返す。
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::BuildFailed { code, .. } => code.filter(|c| *c != 0).unwrap_or(1),
            BuildError::ArchitecturesFailed { failures } => failures
                .first()
                .map(|f| f.error.exit_code())
                .unwrap_or(4),
            other => match other.kind() {
                ErrorKind::Config => 2,
                ErrorKind::Build => 1,
                ErrorKind::Dispatch => 3,
                ErrorKind::Manifest => 4,
                ErrorKind::Cancelled => 130,
            },
        }
    }

    /// 失敗したアーキテクチャ一覧
    pub fn failed_archs(&self) -> Vec<Arch> {
        match self {
            BuildError::BuildFailed { arch, .. }
            | BuildError::DispatchFailed { arch, .. }
            | BuildError::TaskAborted { arch, .. }
            | BuildError::DigestUnavailable(arch) => vec![*arch],
            BuildError::ArchitecturesFailed { failures } => {
                failures.iter().map(|f| f.arch).collect()
            }
            _ => Vec::new(),
        }
    }

    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::MissingCredentials(which) => {
                format!(
                    "レジストリの認証情報がありません: {}\n\
                     \n\
                     解決方法:\n\
                     1. --registry-username / --registry-password を指定してください\n\
                     2. または REGISTRY_USERNAME / REGISTRY_PASSWORD 環境変数を設定してください\n\
                     3. プッシュが不要なら --push を外してください",
                    which
                )
            }
            BuildError::BuildFailed { arch, message, .. } => {
                format!(
                    "{} のビルドに失敗しました:\n{}\n\
                     \n\
                     Dockerfileとビルド引数を確認してください。",
                    arch, message
                )
            }
            BuildError::DispatchFailed { arch, reason } => {
                format!(
                    "{} の実行環境がありません: {}\n\
                     \n\
                     これはDockerfileの問題ではありません。解決方法:\n\
                     1. エミュレーションの場合: docker run --privileged --rm tonistiigi/binfmt --install all\n\
                     2. ネイティブの場合: {} 用のランナー（docker host）を用意してください",
                    arch, reason, arch
                )
            }
            BuildError::ArchitecturesFailed { failures } => {
                let mut message = String::from(
                    "アーキテクチャ別ビルドが失敗したため、マニフェストリストは作成されませんでした。\n",
                );
                for failure in failures {
                    message.push_str(&format!("\n  ✗ {}: {}", failure.arch, failure.error));
                }
                message
            }
            BuildError::DockerCliNotFound => "docker コマンドが見つかりません。\n\
                 Docker と buildx プラグインがインストールされているか確認してください。"
                .to_string(),
            _ => format!("{}", self),
        }
    }
}

fn format_code(code: Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

fn format_failures(failures: &[ArchFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.arch, f.error))
        .collect::<Vec<_>>()
        .join(", ")
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;
