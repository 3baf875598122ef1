pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};

/// 入力ファイルのパスを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "ARCHFLOW_CONFIG_PATH";

const CANDIDATES: [&str; 4] = [
    "archflow.local.kdl",
    ".archflow.local.kdl",
    "archflow.kdl",
    ".archflow.kdl",
];

/// archflowの設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("archflow");

    Ok(config_dir)
}

/// ビルド入力ファイル（archflow.kdl）を探す
///
/// 以下の優先順位で検索:
/// 1. 明示的な指定（--config または ARCHFLOW_CONFIG_PATH）
/// 2. カレントディレクトリ: archflow.local.kdl, .archflow.local.kdl, archflow.kdl, .archflow.kdl
/// 3. ./.archflow/ ディレクトリ内: 同様の順序
/// 4. ~/.config/archflow/archflow.kdl (グローバル設定)
///
/// 入力ファイルは任意なので、見つからない場合は `Ok(None)`。
/// 明示的に指定されたファイルが存在しない場合のみエラーになる。
pub fn find_build_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    // 1. 明示的な指定
    let from_env = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
    if let Some(path) = explicit.map(Path::to_path_buf).or(from_env) {
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::ExplicitFileNotFound(path));
    }

    let current_dir = std::env::current_dir()?;

    // 2. カレントディレクトリで検索
    if let Some(path) = find_in(&current_dir) {
        return Ok(Some(path));
    }

    // 3. ./.archflow/ ディレクトリで検索
    let archflow_dir = current_dir.join(".archflow");
    if archflow_dir.is_dir()
        && let Some(path) = find_in(&archflow_dir)
    {
        return Ok(Some(path));
    }

    // 4. グローバル設定ファイル
    if let Ok(config_dir) = get_config_dir() {
        let global_config = config_dir.join("archflow.kdl");
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    tracing::debug!("No archflow input file found, using command line inputs only");
    Ok(None)
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|filename| dir.join(filename))
        .find(|path| path.exists())
}
