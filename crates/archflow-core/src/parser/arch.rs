//! arch ノードのパース

use super::{build_args, first_string};
use crate::error::{CoreError, Result};
use crate::model::{Arch, ArchOverride};
use kdl::KdlNode;

/// arch ノードをパース
///
/// ```kdl
/// arch "arm64" {
///     dockerfile "./Dockerfile.arm64"
///     context "."
///     build-args "ARCH=arm64"
///     docker-host "tcp://arm-builder:2375"
/// }
/// ```
pub fn parse_arch_block(node: &KdlNode) -> Result<(Arch, ArchOverride)> {
    let name = first_string(node)?
        .ok_or_else(|| CoreError::InvalidConfig("arch requires a name".to_string()))?;
    let arch = name.parse::<Arch>()?;

    let mut overrides = ArchOverride::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "dockerfile" | "dockerfile_path" | "dockerfile-path" => {
                    overrides.dockerfile_path = first_string(child)?
                }
                "context" => overrides.context = first_string(child)?,
                "build-args" | "build_args" => overrides.build_args = build_args(child)?,
                "docker-host" | "docker_host" => overrides.docker_host = first_string(child)?,
                other => {
                    tracing::debug!("Ignoring unknown node '{}' in arch '{}'", other, arch);
                }
            }
        }
    }

    Ok((arch, overrides))
}
