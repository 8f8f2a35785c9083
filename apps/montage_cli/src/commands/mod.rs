pub mod check;
pub mod init;
pub mod merge;
pub mod transitions;

use anyhow::Context;
use montage_core::settings::preset_by_name;
use montage_core::types::{CanvasSize, TransitionKind};

pub(crate) fn parse_preset(name: &str) -> anyhow::Result<CanvasSize> {
    preset_by_name(name)
        .with_context(|| format!("unknown canvas preset '{name}' (expected wide, portrait or square)"))
}

pub(crate) fn parse_transition(name: &str) -> anyhow::Result<TransitionKind> {
    Ok(name.parse::<TransitionKind>()?)
}
