//! ビルド入力
//!
//! 設定ファイルと CLI の両方から組み立てられる宣言的な入力値。
//! すべてのフィールドは省略可能で、`merge` により上位レイヤーの値で上書きする。

use super::arch::{Arch, RunnerMode};
use serde::{Deserialize, Serialize};

/// ビルド入力
///
/// KDL形式：
/// ```kdl
/// image "acme/app"
/// dockerfile "./Dockerfile"
/// build-args "A=1,B=2"
/// push #true
/// tags "latest" "v1"
/// arch "arm64" {
///     dockerfile "./Dockerfile.arm64"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInputs {
    pub image_name: Option<String>,
    pub dockerfile_path: Option<String>,
    pub context: Option<String>,
    /// カンマまたは改行区切りの KEY=VALUE
    pub build_args: Option<String>,
    pub push: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// カンマ区切りのプラットフォーム一覧（multiarch のみ）
    pub platforms: Option<String>,
    pub target: Option<String>,
    pub no_cache: Option<bool>,
    /// ログイン先レジストリ（省略時はイメージ名から推定）
    pub registry: Option<String>,
    pub runner: Option<RunnerMode>,
    #[serde(default)]
    pub arm: ArchOverride,
    #[serde(default)]
    pub amd: ArchOverride,
}

/// アーキテクチャ固有の上書き設定
///
/// 空文字列は未指定として扱う。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchOverride {
    pub dockerfile_path: Option<String>,
    pub context: Option<String>,
    pub build_args: Option<String>,
    /// このアーキテクチャのビルドを実行する Docker ホスト（DOCKER_HOST）
    pub docker_host: Option<String>,
}

impl ArchOverride {
    pub fn merge(&mut self, other: ArchOverride) {
        merge_string(&mut self.dockerfile_path, other.dockerfile_path);
        merge_string(&mut self.context, other.context);
        merge_string(&mut self.build_args, other.build_args);
        merge_string(&mut self.docker_host, other.docker_host);
    }

    pub fn is_empty(&self) -> bool {
        non_empty(&self.dockerfile_path).is_none()
            && non_empty(&self.context).is_none()
            && non_empty(&self.build_args).is_none()
            && non_empty(&self.docker_host).is_none()
    }
}

impl BuildInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// アーキテクチャに対応する上書き設定
    pub fn override_for(&self, arch: Arch) -> &ArchOverride {
        match arch {
            Arch::Arm64 => &self.arm,
            Arch::Amd64 => &self.amd,
        }
    }

    pub fn override_for_mut(&mut self, arch: Arch) -> &mut ArchOverride {
        match arch {
            Arch::Arm64 => &mut self.arm,
            Arch::Amd64 => &mut self.amd,
        }
    }

    pub fn push(&self) -> bool {
        self.push.unwrap_or(false)
    }

    pub fn no_cache(&self) -> bool {
        self.no_cache.unwrap_or(false)
    }

    /// 上位レイヤーの値でマージ
    ///
    /// `other` 側で指定された値（空文字列以外）が優先される。
    /// タグは一覧ごと置き換える。
    pub fn merge(&mut self, other: BuildInputs) {
        merge_string(&mut self.image_name, other.image_name);
        merge_string(&mut self.dockerfile_path, other.dockerfile_path);
        merge_string(&mut self.context, other.context);
        merge_string(&mut self.build_args, other.build_args);
        merge_string(&mut self.platforms, other.platforms);
        merge_string(&mut self.target, other.target);
        merge_string(&mut self.registry, other.registry);

        if other.push.is_some() {
            self.push = other.push;
        }
        if other.no_cache.is_some() {
            self.no_cache = other.no_cache;
        }
        if other.runner.is_some() {
            self.runner = other.runner;
        }
        if !other.tags.is_empty() {
            self.tags = other.tags;
        }

        self.arm.merge(other.arm);
        self.amd.merge(other.amd);
    }
}

/// 空文字列を未指定として扱う
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn merge_string(target: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value
        && !value.trim().is_empty()
    {
        *target = Some(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_cli_over_file() {
        let mut base = BuildInputs {
            image_name: Some("acme/app".to_string()),
            dockerfile_path: Some("./Dockerfile.file".to_string()),
            push: Some(true),
            tags: vec!["latest".to_string()],
            ..Default::default()
        };

        let cli = BuildInputs {
            dockerfile_path: Some("./Dockerfile.cli".to_string()),
            tags: vec!["v1".to_string()],
            ..Default::default()
        };

        base.merge(cli);

        assert_eq!(base.image_name.as_deref(), Some("acme/app"));
        assert_eq!(base.dockerfile_path.as_deref(), Some("./Dockerfile.cli"));
        assert_eq!(base.push, Some(true));
        assert_eq!(base.tags, vec!["v1".to_string()]);
    }

    #[test]
    fn test_merge_empty_string_does_not_clear() {
        let mut base = BuildInputs {
            context: Some("./app".to_string()),
            ..Default::default()
        };
        base.arm.dockerfile_path = Some("./Dockerfile.arm64".to_string());

        let mut cli = BuildInputs {
            context: Some(String::new()),
            ..Default::default()
        };
        cli.arm.dockerfile_path = Some("  ".to_string());

        base.merge(cli);

        assert_eq!(base.context.as_deref(), Some("./app"));
        assert_eq!(base.arm.dockerfile_path.as_deref(), Some("./Dockerfile.arm64"));
    }

    #[test]
    fn test_override_for() {
        let mut inputs = BuildInputs::new();
        inputs.override_for_mut(Arch::Amd64).context = Some("./amd".to_string());

        assert_eq!(inputs.amd.context.as_deref(), Some("./amd"));
        assert!(inputs.override_for(Arch::Arm64).is_empty());
        assert!(!inputs.override_for(Arch::Amd64).is_empty());
    }

    #[test]
    fn test_push_default_false() {
        assert!(!BuildInputs::new().push());
        assert!(!BuildInputs::new().no_cache());
    }
}
