//! データモデル

mod arch;
pub(crate) mod inputs;
mod output;

pub use arch::{Arch, RunnerMode, parse_platforms};
pub use inputs::{ArchOverride, BuildInputs};
pub use output::BuildOutput;
