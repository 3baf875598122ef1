use crate::args::{CommonArgs, MultiarchArgs};
use archflow_core::{Arch, BuildPlan};
use colored::Colorize;

/// ビルドせずに解決済みのプランを表示
///
/// 入力の検証も行うので、CI の設定確認に使える。
pub fn handle(
    arch: Option<Arch>,
    common: &CommonArgs,
    multiarch: &MultiarchArgs,
) -> anyhow::Result<()> {
    let mut cli_inputs = common.to_inputs();
    multiarch.apply(&mut cli_inputs);

    let inputs = super::load_inputs(common.config.as_deref(), cli_inputs)?;
    let plan = match arch {
        Some(arch) => BuildPlan::single(&inputs, arch)?,
        None => BuildPlan::multiarch(&inputs)?,
    };
    plan.validate()?;

    if common.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("{}", plan.primary_reference().cyan().bold());
    println!("  registry: {}", plan.registry);
    println!("  push: {}", plan.push);
    println!("  runner: {}", plan.runner);
    for request in &plan.requests {
        println!();
        println!("  {} ({})", request.arch.to_string().bold(), request.arch.platform());
        println!("    dockerfile: {}", request.params.dockerfile_path.display());
        println!("    context: {}", request.params.context.display());
        for reference in request.references() {
            println!("    tag: {}", reference);
        }
        for entry in &request.params.build_args {
            println!("    build-arg: {}", entry);
        }
        if let Some(host) = &request.docker_host {
            println!("    docker-host: {}", host);
        }
    }

    Ok(())
}
