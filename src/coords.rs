//! Pure coordinate mappings between the four spaces the engine touches:
//! map pixels, grid cells, screen pixels (pan/zoom applied) and the 3D
//! plane's world units. Map space follows Bevy's convention (origin at
//! the bottom-left, Y up); map-space Y maps onto world-space Z on the
//! 3D plane.
//!
//! 地图像素、网格格子、屏幕像素与 3D 世界坐标之间的纯函数转换。

use bevy::math::{IVec2, Vec2};
use bevy::reflect::Reflect;

/// Current pan/zoom of the flat-surface view. Not fog state; recomputed
/// per view and only needed to map pointer input back to map pixels.
/// 平面视图当前的平移/缩放，仅用于把指针输入换算回地图像素
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct ViewTransform {
    pub offset: Vec2,
    pub scale: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            scale: 1.0,
        }
    }
}

/// 地图像素 -> 格子索引（向下取整）
/// Map pixels -> cell indices (floor division)
pub fn map_to_cell(map_pos: Vec2, cell_size_px: f32) -> IVec2 {
    IVec2::new(
        (map_pos.x / cell_size_px).floor() as i32,
        (map_pos.y / cell_size_px).floor() as i32,
    )
}

/// 格子索引 -> 该格子中心的地图像素坐标
/// Cell indices -> map-pixel position of the cell center
pub fn cell_to_map_center(cell: IVec2, cell_size_px: f32) -> Vec2 {
    Vec2::new(
        (cell.x as f32 + 0.5) * cell_size_px,
        (cell.y as f32 + 0.5) * cell_size_px,
    )
}

/// 屏幕像素 -> 地图像素，先去平移再除缩放
/// Screen pixels -> map pixels, offset removed then scale divided out
pub fn screen_to_map(screen_pos: Vec2, view: &ViewTransform) -> Vec2 {
    (screen_pos - view.offset) / view.scale
}

/// `screen_to_map` 的逆变换
/// Inverse of `screen_to_map`
pub fn map_to_screen(map_pos: Vec2, view: &ViewTransform) -> Vec2 {
    map_pos * view.scale + view.offset
}

/// Map pixels -> plane coordinates in the 3D scene. The plane is centered
/// on the world origin and may represent the map at a different physical
/// scale; the returned `y` component is the world-space Z of the flat
/// plane.
/// 地图像素 -> 3D 场景中的平面坐标（返回值的 y 即世界空间的 Z）
pub fn map_to_world(map_pos: Vec2, plane_size: Vec2, map_size: Vec2) -> Vec2 {
    Vec2::new(
        (map_pos.x / map_size.x - 0.5) * plane_size.x,
        (map_pos.y / map_size.y - 0.5) * plane_size.y,
    )
}

/// `map_to_world` 的逆变换
/// Inverse of `map_to_world`
pub fn world_to_map(world_pos: Vec2, plane_size: Vec2, map_size: Vec2) -> Vec2 {
    Vec2::new(
        (world_pos.x / plane_size.x + 0.5) * map_size.x,
        (world_pos.y / plane_size.y + 0.5) * map_size.y,
    )
}
