use crate::args::{CommonArgs, MultiarchArgs};
use archflow_core::BuildPlan;

/// ARM64 と AMD64 を並列にビルドし、マニフェストリストにまとめる
pub async fn handle(common: &CommonArgs, multiarch: &MultiarchArgs) -> anyhow::Result<()> {
    let mut cli_inputs = common.to_inputs();
    multiarch.apply(&mut cli_inputs);

    let inputs = super::load_inputs(common.config.as_deref(), cli_inputs)?;
    let plan = BuildPlan::multiarch(&inputs)?;

    super::execute(&plan, common).await
}
