use crate::model::Arch;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("KDLパースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("必須の入力 '{0}' が指定されていません")]
    MissingInput(&'static str),

    #[error("サポートされていないプラットフォーム: {0}（linux/amd64 と linux/arm64 のみ対応）")]
    UnsupportedPlatform(String),

    #[error("無効なタグ: {0}")]
    InvalidTag(String),

    #[error("無効なビルド引数 ({arch}): '{entry}'（KEY=VALUE 形式で指定してください）")]
    InvalidBuildArg { arch: Arch, entry: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
