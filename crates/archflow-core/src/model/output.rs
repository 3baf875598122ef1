use super::arch::Arch;
use serde::{Deserialize, Serialize};

/// ビルドまたはマニフェスト作成の結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutput {
    /// アーキテクチャ（マニフェストリストの場合は None）
    pub arch: Option<Arch>,
    /// 主タグを含む完全なイメージ参照（例: ghcr.io/acme/app:latest）
    pub image_tag: String,
    /// コンテンツダイジェスト（sha256:...）
    pub digest: String,
}

impl BuildOutput {
    pub fn new(arch: Option<Arch>, image_tag: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            arch,
            image_tag: image_tag.into(),
            digest: digest.into(),
        }
    }

    pub fn has_digest(&self) -> bool {
        !self.digest.trim().is_empty()
    }
}
