pub mod build;
pub mod multiarch;
pub mod resolve;

use crate::args::CommonArgs;
use crate::outputs::Outputs;
use archflow_build::{BuildError, DockerCli, Pipeline, PipelineReport};
use archflow_core::{BuildInputs, BuildPlan};
use colored::Colorize;
use indicatif::MultiProgress;
use std::path::Path;
use std::sync::Arc;

/// 入力ファイルとコマンドラインの入力をマージ
///
/// 優先順位: デフォルト < 入力ファイル < コマンドライン
pub fn load_inputs(config: Option<&Path>, cli: BuildInputs) -> anyhow::Result<BuildInputs> {
    let mut inputs = match archflow_config::find_build_file(config)? {
        Some(path) => {
            tracing::info!("Loading inputs from {}", path.display());
            archflow_core::parse_kdl_file(&path)?
        }
        None => BuildInputs::default(),
    };

    inputs.merge(cli);
    Ok(inputs)
}

/// パイプラインを実行し、結果を出力
///
/// Ctrl+C を受けた場合は実行中のビルドを中断する。
pub async fn execute(plan: &BuildPlan, common: &CommonArgs) -> anyhow::Result<()> {
    print_plan(plan);

    let mut pipeline =
        Pipeline::new(Arc::new(DockerCli::new())).with_progress(MultiProgress::new());
    let auth = common.auth();

    let report: PipelineReport = tokio::select! {
        result = pipeline.run(plan, &auth) => result?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("{}", "⚠ キャンセルされました".yellow());
            return Err(BuildError::Cancelled.into());
        }
    };

    eprintln!();
    eprintln!("{}", "✓ ビルドが完了しました".green().bold());
    for output in &report.outputs {
        if let Some(arch) = output.arch {
            eprintln!("  • {}: {} {}", arch, output.image_tag.cyan(), output.digest.dimmed());
        }
    }
    if let Some(manifest) = &report.manifest {
        eprintln!(
            "  • manifest: {} {}",
            manifest.image_tag.cyan(),
            manifest.digest.dimmed()
        );
    }

    Outputs::from_report(&report).emit(common.json, common.output_file.as_deref())
}

fn print_plan(plan: &BuildPlan) {
    let platforms = plan
        .requests
        .iter()
        .map(|r| r.arch.platform())
        .collect::<Vec<_>>()
        .join(", ");

    eprintln!(
        "{} {} ({})",
        "🔨 Building".blue().bold(),
        plan.primary_reference().cyan(),
        platforms
    );
    if plan.push {
        eprintln!("  push: {} (registry: {})", "enabled".green(), plan.registry);
    } else {
        eprintln!("  push: {}", "disabled (local load)".yellow());
    }
    eprintln!("  runner: {}", plan.runner);
}
