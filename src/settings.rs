use bevy::color::Color;
use bevy::prelude::{ReflectResource, Resource};
use bevy::reflect::Reflect;

/// 默认雾效格子大小（地图像素）
/// Default fog cell size in map pixels
pub const DEFAULT_CELL_SIZE_PX: f32 = 40.0;

/// Static facts about the battle map the fog grid is laid over.
/// 战斗地图的静态描述，雾效网格据此划分
///
/// The descriptor is immutable for the lifetime of a grid: inserting or
/// mutating this resource re-initializes the fog grid and wipes all
/// exploration state. Grid dimensions are derived, never stored.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Reflect)]
#[reflect(Resource)]
pub struct MapDescriptor {
    /// 地图逻辑宽度（像素）
    /// Logical map width in pixels
    pub width_px: f32,
    /// 地图逻辑高度（像素）
    /// Logical map height in pixels
    pub height_px: f32,
    /// 单个雾效格子的边长（像素）
    /// Side length of one fog cell in pixels
    pub cell_size_px: f32,
}

impl Default for MapDescriptor {
    fn default() -> Self {
        Self {
            width_px: 1920.0,
            height_px: 1280.0,
            cell_size_px: DEFAULT_CELL_SIZE_PX,
        }
    }
}

impl MapDescriptor {
    pub fn new(width_px: f32, height_px: f32, cell_size_px: f32) -> Self {
        Self {
            width_px,
            height_px,
            cell_size_px,
        }
    }

    /// 网格列数 = ceil(宽度 / 格子大小)
    /// Grid columns = ceil(width / cell size)
    pub fn cols(&self) -> u32 {
        (self.width_px / self.cell_size_px).ceil() as u32
    }

    /// 网格行数 = ceil(高度 / 格子大小)
    /// Grid rows = ceil(height / cell size)
    pub fn rows(&self) -> u32 {
        (self.height_px / self.cell_size_px).ceil() as u32
    }

    /// All three extents must be positive and finite.
    /// 三个尺寸都必须为正且有限
    pub fn is_valid(&self) -> bool {
        self.width_px.is_finite()
            && self.height_px.is_finite()
            && self.cell_size_px.is_finite()
            && self.width_px > 0.0
            && self.height_px > 0.0
            && self.cell_size_px > 0.0
    }
}

/// Global visual settings for the fog overlays.
/// 雾效渲染的全局设置
///
/// Both renderers read the same color/opacity mapping so the flat surface
/// and the 3D plane always agree on what a cell state looks like.
#[derive(Resource, Clone, Debug, Reflect)]
#[reflect(Resource)]
pub struct FogMapSettings {
    /// 是否启用雾效系统
    /// Master switch for the fog system
    pub enabled: bool,
    /// 雾的基础颜色（不含透明度）
    /// Base fog color, alpha is supplied per cell state
    pub fog_color: Color,
    /// 未探索格子的不透明度
    /// Opacity of hidden (never explored) cells
    pub hidden_opacity: f32,
    /// 已探索但当前不可见格子的不透明度
    /// Opacity of explored but not currently visible cells
    pub explored_opacity: f32,
    /// 平面渲染器的 Z 层，保证雾盖在地图之上
    /// Z layer of the flat-surface overlay, keeps fog above the map
    pub overlay_z: f32,
    /// 新放置的出生点周围自动揭示的半径（像素）
    /// Radius in pixels revealed around a freshly placed spawn point
    pub spawn_reveal_radius_px: f32,
}

impl Default for FogMapSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            fog_color: Color::BLACK,
            hidden_opacity: 0.85,
            explored_opacity: 0.3,
            overlay_z: 20.0,
            spawn_reveal_radius_px: 120.0,
        }
    }
}

/// Role gate fed by the session's identity provider.
/// 会话身份提供方写入的权限开关
///
/// Paint strokes and spawn point edits are only accepted while
/// `privileged` is set; participant clients keep it false and only ever
/// receive grid state through the sync adapter.
#[derive(Resource, Debug, Clone, Copy, Reflect)]
#[reflect(Resource)]
pub struct FogAuthority {
    pub privileged: bool,
}

impl Default for FogAuthority {
    fn default() -> Self {
        Self { privileged: true }
    }
}
