//! The two fog renderers. Both are stateless projections of
//! `(grid, version)`: they hold no authoritative state, only the last
//! version they drew, and redraw exclusively when the grid version moves.
//!
//! 两个雾效渲染器：均为 (网格, 版本) 的无状态投影，仅在版本变化时重绘。

mod overlay_2d;
mod overlay_3d;

pub use overlay_2d::{FogOverlay2d, redraw_overlay_2d};
pub use overlay_3d::{FogPlane3d, refresh_fog_plane_3d};

use crate::grid::CellState;
use crate::settings::FogMapSettings;

/// Shared cell-state -> fog opacity mapping. Visible cells carry no fog;
/// hidden and explored cells use the two fixed opacities from settings.
/// 共享的格子状态到雾不透明度映射
pub(crate) fn state_alpha(state: CellState, settings: &FogMapSettings) -> f32 {
    match state {
        CellState::Hidden => settings.hidden_opacity,
        CellState::Explored => settings.explored_opacity,
        CellState::Visible => 0.0,
    }
}
