use crate::args::CommonArgs;
use archflow_core::{Arch, BuildPlan};

/// 単一アーキテクチャのビルド
pub async fn handle(
    arch: Arch,
    common: &CommonArgs,
    docker_host: Option<String>,
) -> anyhow::Result<()> {
    let mut cli_inputs = common.to_inputs();
    cli_inputs.override_for_mut(arch).docker_host = docker_host;

    let inputs = super::load_inputs(common.config.as_deref(), cli_inputs)?;
    let plan = BuildPlan::single(&inputs, arch)?;

    super::execute(&plan, common).await
}
