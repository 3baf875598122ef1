//! イメージ参照とタグの操作

use crate::error::{CoreError, Result};
use crate::model::Arch;

/// タグ未指定時のデフォルト
pub const DEFAULT_TAG: &str = "latest";

/// イメージ名とタグを分離
///
/// # Examples
/// - `ghcr.io/org/app:v1.0` -> `("ghcr.io/org/app", Some("v1.0"))`
/// - `ghcr.io/org/app` -> `("ghcr.io/org/app", None)`
/// - `localhost:5000/app` -> `("localhost:5000/app", None)`
pub fn split_image_tag(image: &str) -> (String, Option<String>) {
    // ダイジェスト付きの参照はタグとして扱わない
    let image = image.split_once('@').map(|(name, _)| name).unwrap_or(image);

    if let Some(pos) = image.rfind(':') {
        let potential_tag = &image[pos + 1..];
        let potential_image = &image[..pos];

        // localhost:5000/app のポート番号はタグではない
        if !potential_tag.contains('/') && !potential_tag.is_empty() {
            return (potential_image.to_string(), Some(potential_tag.to_string()));
        }
    }

    (image.to_string(), None)
}

/// タグ入力を正規化
///
/// 各値は改行区切りの一覧でもよい。空行を除き、重複は最初の出現を残す。
pub fn normalize_tags<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for value in raw {
        for tag in value.as_ref().lines().map(str::trim).filter(|t| !t.is_empty()) {
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
    }
    tags
}

/// イメージ名とタグ入力から (リポジトリ, タグ一覧) を解決
///
/// # Priority
/// 1. tags 入力（イメージ名に含まれるタグは無視）
/// 2. イメージ名に含まれるタグ
/// 3. デフォルト: "latest"
pub fn resolve_tags<S: AsRef<str>>(image_name: &str, tags: &[S]) -> (String, Vec<String>) {
    let (repository, image_tag) = split_image_tag(image_name.trim());
    let tags = normalize_tags(tags);

    if !tags.is_empty() {
        return (repository, tags);
    }

    let tag = image_tag.unwrap_or_else(|| DEFAULT_TAG.to_string());
    (repository, vec![tag])
}

/// multiarch ビルドでアーキテクチャ別イメージに付けるタグ
pub fn arch_tag(tag: &str, arch: Arch) -> String {
    format!("{}-{}", tag, arch.as_str())
}

/// タグのバリデーション
pub fn validate_tag(tag: &str) -> Result<()> {
    // Docker タグの制約:
    // - 128文字以下
    // - 英数字、ピリオド、ハイフン、アンダースコアのみ
    // - 先頭はピリオドまたはハイフンではない

    if tag.is_empty() {
        return Err(CoreError::InvalidTag("(empty)".to_string()));
    }

    if tag.len() > 128 {
        return Err(CoreError::InvalidTag(format!(
            "Tag too long ({} characters, max 128)",
            tag.len()
        )));
    }

    if tag.starts_with('.') || tag.starts_with('-') {
        return Err(CoreError::InvalidTag(tag.to_string()));
    }

    if let Some(c) = tag
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '.' && *c != '-' && *c != '_')
    {
        return Err(CoreError::InvalidTag(format!(
            "Invalid character '{}' in tag: {}",
            c, tag
        )));
    }

    Ok(())
}

/// イメージ名からレジストリを抽出
///
/// # Examples
/// - `ghcr.io/org/app:tag` -> `ghcr.io`
/// - `myuser/app:tag` -> `docker.io`
/// - `localhost:5000/app` -> `localhost:5000`
pub fn registry_of(image: &str) -> String {
    if let Some((first, _)) = image.split_once('/') {
        // レジストリは `.` または `:` を含む（例: ghcr.io, localhost:5000）
        if first.contains('.') || first.contains(':') || first == "localhost" {
            return first.to_string();
        }
    }

    "docker.io".to_string()
}
