//! KDLパーサー
//!
//! archflow のビルド入力ファイルをパースします。

mod arch;

use crate::error::{CoreError, Result};
use crate::model::{BuildInputs, RunnerMode};
use arch::parse_arch_block;
use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use std::fs;
use std::path::Path;

/// KDLファイルをパースして BuildInputs を生成
pub fn parse_kdl_file<P: AsRef<Path>>(path: P) -> Result<BuildInputs> {
    let content = fs::read_to_string(path.as_ref())?;
    tracing::debug!("Parsing build inputs from {}", path.as_ref().display());
    parse_kdl_string(&content)
}

/// KDL文字列をパース
pub fn parse_kdl_string(content: &str) -> Result<BuildInputs> {
    let doc: KdlDocument = content.parse()?;
    let mut inputs = BuildInputs::default();

    for node in doc.nodes() {
        match node.name().value() {
            "image" | "image_name" | "image-name" => inputs.image_name = first_string(node)?,
            "dockerfile" | "dockerfile_path" | "dockerfile-path" => {
                inputs.dockerfile_path = first_string(node)?
            }
            "context" => inputs.context = first_string(node)?,
            "build-args" | "build_args" => inputs.build_args = build_args(node)?,
            "push" => inputs.push = first_bool(node)?,
            "no-cache" | "no_cache" => inputs.no_cache = first_bool(node)?,
            "tags" | "tag" => {
                for entry in positional(node) {
                    inputs.tags.push(string_value(node, entry.value())?);
                }
            }
            "platforms" => inputs.platforms = first_string(node)?,
            "target" => inputs.target = first_string(node)?,
            "registry" => inputs.registry = first_string(node)?,
            "runner" => {
                if let Some(runner) = first_string(node)? {
                    inputs.runner = Some(runner.parse::<RunnerMode>()?);
                }
            }
            "arch" => {
                let (arch, overrides) = parse_arch_block(node)?;
                inputs.override_for_mut(arch).merge(overrides);
            }
            other => {
                // 不明なノードはスキップ
                tracing::debug!("Ignoring unknown node '{}'", other);
            }
        }
    }

    Ok(inputs)
}

fn positional(node: &KdlNode) -> impl Iterator<Item = &KdlEntry> {
    node.entries().iter().filter(|e| e.name().is_none())
}

fn invalid_type(node: &KdlNode, expected: &str, value: &KdlValue) -> CoreError {
    CoreError::InvalidConfig(format!(
        "'{}' には{}を指定してください（指定された値: {}）",
        node.name().value(),
        expected,
        value
    ))
}

fn string_value(node: &KdlNode, value: &KdlValue) -> Result<String> {
    value
        .as_string()
        .map(str::to_string)
        .ok_or_else(|| invalid_type(node, "文字列", value))
}

/// 最初の位置引数を文字列として取得
///
/// 文字列以外の値は黙って捨てずにエラーにする。
pub(crate) fn first_string(node: &KdlNode) -> Result<Option<String>> {
    positional(node)
        .next()
        .map(|entry| string_value(node, entry.value()))
        .transpose()
}

/// 最初の位置引数を真偽値として取得
fn first_bool(node: &KdlNode) -> Result<Option<bool>> {
    let Some(entry) = positional(node).next() else {
        return Ok(None);
    };

    entry
        .value()
        .as_bool()
        .map(Some)
        .ok_or_else(|| invalid_type(node, "#true または #false", entry.value()))
}

/// 子ノード形式のビルド引数の値（`VERSION 2` のような数値も受け付ける）
fn build_arg_value(node: &KdlNode) -> Result<String> {
    let entry = positional(node).next().ok_or_else(|| {
        CoreError::InvalidConfig(format!(
            "ビルド引数 '{}' に値がありません",
            node.name().value()
        ))
    })?;

    match entry.value() {
        KdlValue::String(s) => Ok(s.clone()),
        KdlValue::Integer(i) => Ok(i.to_string()),
        KdlValue::Float(f) => Ok(f.to_string()),
        other => Err(invalid_type(node, "文字列または数値", other)),
    }
}

/// build-args は文字列1つ（カンマ区切り）、複数の位置引数、子ノード（KEY "VALUE"）のいずれでも書ける
pub(crate) fn build_args(node: &KdlNode) -> Result<Option<String>> {
    let mut entries = positional(node)
        .map(|entry| string_value(node, entry.value()))
        .collect::<Result<Vec<_>>>()?;

    if let Some(children) = node.children() {
        for arg_node in children.nodes() {
            let key = arg_node.name().value();
            entries.push(format!("{}={}", key, build_arg_value(arg_node)?));
        }
    }

    if entries.is_empty() {
        Ok(None)
    } else {
        Ok(Some(entries.join("\n")))
    }
}
