//! ターゲットアーキテクチャとランナーモード

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ビルド対象の CPU アーキテクチャ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    Amd64,
    Arm64,
}

impl Arch {
    /// multiarch ビルドのデフォルト順序
    pub const ALL: [Arch; 2] = [Arch::Amd64, Arch::Arm64];

    /// 短い名前（タグのサフィックスや出力キーに使用）
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
        }
    }

    /// buildx の `--platform` に渡す文字列
    pub fn platform(&self) -> &'static str {
        match self {
            Self::Amd64 => "linux/amd64",
            Self::Arm64 => "linux/arm64",
        }
    }

    /// アーキテクチャ名をパース
    ///
    /// Docker エンジンが返す `x86_64` / `aarch64` なども受け付ける。
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "amd64" | "amd" | "x86_64" | "x86-64" | "x64" => Some(Self::Amd64),
            "arm64" | "arm" | "aarch64" | "arm64/v8" => Some(Self::Arm64),
            _ => None,
        }
    }

    /// `linux/amd64` 形式のプラットフォーム文字列をパース
    pub fn from_platform(platform: &str) -> Result<Self> {
        let trimmed = platform.trim();
        let arch = match trimmed.split_once('/') {
            Some(("linux", arch)) => arch,
            _ => return Err(CoreError::UnsupportedPlatform(trimmed.to_string())),
        };

        Self::parse(arch).ok_or_else(|| CoreError::UnsupportedPlatform(trimmed.to_string()))
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| CoreError::UnsupportedPlatform(s.to_string()))
    }
}

/// カンマ区切りのプラットフォーム一覧をパース
///
/// 重複は最初の出現を残して除去する。空の一覧はエラー。
pub fn parse_platforms(raw: &str) -> Result<Vec<Arch>> {
    let mut archs = Vec::new();

    for entry in raw.split([',', '\n']).map(str::trim).filter(|s| !s.is_empty()) {
        let arch = Arch::from_platform(entry)?;
        if !archs.contains(&arch) {
            archs.push(arch);
        }
    }

    if archs.is_empty() {
        return Err(CoreError::InvalidConfig(
            "platforms にはプラットフォームを1つ以上指定してください".to_string(),
        ));
    }

    Ok(archs)
}

/// アーキテクチャ別ビルドを実行する環境の種類
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunnerMode {
    /// 共有ランナー上で QEMU エミュレーションを使ってビルド（デフォルト）
    #[default]
    Emulated,
    /// アーキテクチャ別のセルフホストランナーでネイティブビルド
    Native,
}

impl RunnerMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "emulated" | "qemu" => Some(Self::Emulated),
            "native" | "self-hosted" => Some(Self::Native),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emulated => "emulated",
            Self::Native => "native",
        }
    }
}

impl fmt::Display for RunnerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunnerMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
            .ok_or_else(|| CoreError::InvalidConfig(format!("不明なランナーモード: {}", s)))
    }
}
