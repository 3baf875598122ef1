use crate::error::{CoreError, Result};
use crate::model::inputs::non_empty;
use crate::model::{Arch, BuildInputs};
use serde::Serialize;
use std::path::PathBuf;

pub const DEFAULT_DOCKERFILE: &str = "./Dockerfile";
pub const DEFAULT_CONTEXT: &str = ".";

/// アーキテクチャごとに解決済みのビルドパラメータ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedParams {
    pub dockerfile_path: PathBuf,
    pub context: PathBuf,
    /// KEY=VALUE 形式のエントリ（検証前のまま保持）
    pub build_args: Vec<String>,
}

/// アーキテクチャ別のビルドパラメータを解決
///
/// 各フィールドの優先順位:
/// 1. アーキテクチャ固有の上書き（空文字列以外）
/// 2. 共通の値（空文字列以外）
/// 3. デフォルト値（`./Dockerfile`, `.`, 空のビルド引数）
///
/// ファイルシステムには触れない。パスの存在確認は Docker に任せる。
pub struct BuildResolver<'a> {
    inputs: &'a BuildInputs,
}

impl<'a> BuildResolver<'a> {
    pub fn new(inputs: &'a BuildInputs) -> Self {
        Self { inputs }
    }

    /// Dockerfileのパスを解決
    pub fn resolve_dockerfile(&self, arch: Arch) -> PathBuf {
        let overrides = self.inputs.override_for(arch);
        PathBuf::from(pick(
            non_empty(&overrides.dockerfile_path),
            non_empty(&self.inputs.dockerfile_path),
            DEFAULT_DOCKERFILE,
        ))
    }

    /// ビルドコンテキストのパスを解決
    pub fn resolve_context(&self, arch: Arch) -> PathBuf {
        let overrides = self.inputs.override_for(arch);
        PathBuf::from(pick(
            non_empty(&overrides.context),
            non_empty(&self.inputs.context),
            DEFAULT_CONTEXT,
        ))
    }

    /// ビルド引数を解決
    ///
    /// 上書きがある場合は共通のビルド引数とマージせず、丸ごと置き換える。
    pub fn resolve_build_args(&self, arch: Arch) -> Vec<String> {
        let overrides = self.inputs.override_for(arch);
        non_empty(&overrides.build_args)
            .or_else(|| non_empty(&self.inputs.build_args))
            .map(parse_build_args)
            .unwrap_or_default()
    }

    pub fn resolve(&self, arch: Arch) -> ResolvedParams {
        ResolvedParams {
            dockerfile_path: self.resolve_dockerfile(arch),
            context: self.resolve_context(arch),
            build_args: self.resolve_build_args(arch),
        }
    }

    /// ビルド引数の検証（機密情報の警告）
    pub fn warn_sensitive_build_args(&self, arch: Arch) {
        let sensitive_patterns = ["password", "token", "secret", "api_key", "private_key"];

        for entry in self.resolve_build_args(arch) {
            let key = entry.split_once('=').map(|(k, _)| k).unwrap_or(&entry);
            let key_lower = key.to_lowercase();
            if sensitive_patterns.iter().any(|p| key_lower.contains(p)) {
                tracing::warn!(
                    "警告: ビルド引数 '{}' ({}) は機密情報を含む可能性があります。\n\
                     ビルド引数はイメージ履歴に記録されます。\n\
                     機密情報はビルド引数ではなく、シークレットマウントを使用してください。",
                    key,
                    arch
                );
            }
        }
    }
}

fn pick<'a>(overridden: Option<&'a str>, common: Option<&'a str>, default: &'a str) -> &'a str {
    overridden.or(common).unwrap_or(default)
}

/// カンマまたは改行区切りのビルド引数をエントリに分割
///
/// 前後の空白と空エントリのみ取り除き、それ以外は書き換えない。
pub fn parse_build_args(raw: &str) -> Vec<String> {
    raw.split([',', '\n'])
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// ビルド引数の形式を検証
///
/// `=` を含まない、またはキーが空のエントリは設定エラー。
pub fn validate_build_args(arch: Arch, args: &[String]) -> Result<()> {
    for entry in args {
        match entry.split_once('=') {
            Some((key, _)) if !key.trim().is_empty() && !key.contains(char::is_whitespace) => {}
            _ => {
                return Err(CoreError::InvalidBuildArg {
                    arch,
                    entry: entry.clone(),
                });
            }
        }
    }
    Ok(())
}
