//! archflow コア
//!
//! ビルド入力のモデル、KDL 入力ファイルのパース、アーキテクチャ別パラメータの解決、
//! ビルドプランの構築を提供します。Docker には一切触れない純粋なロジックのみを持ちます。

pub mod error;
pub mod image;
pub mod model;
pub mod parser;
pub mod plan;
pub mod resolver;

pub use error::{CoreError, Result};
pub use image::{
    DEFAULT_TAG, arch_tag, normalize_tags, registry_of, resolve_tags, split_image_tag,
    validate_tag,
};
pub use model::{Arch, ArchOverride, BuildInputs, BuildOutput, RunnerMode, parse_platforms};
pub use parser::{parse_kdl_file, parse_kdl_string};
pub use plan::{BuildPlan, BuildRequest, DEFAULT_PLATFORMS};
pub use resolver::{
    BuildResolver, DEFAULT_CONTEXT, DEFAULT_DOCKERFILE, ResolvedParams, parse_build_args,
    validate_build_args,
};
