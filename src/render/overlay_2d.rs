use crate::grid::{CellState, FogGrid};
use crate::render::state_alpha;
use crate::settings::FogMapSettings;
use bevy::math::{IVec2, UVec2, Vec2};
use bevy::prelude::{
    Alpha, ChildOf, Commands, Component, Entity, Query, ReflectComponent, Res, Sprite, Transform,
};
use bevy::reflect::Reflect;

use crate::coords;

/// Anchor entity for the flat-surface fog overlay. Spawn one with a
/// `Transform` carrying the view's pan/zoom; the redraw system keeps one
/// sprite rectangle per non-`Visible` cell parented underneath it.
/// 平面雾效覆盖层的锚点实体，重绘系统在其下维护每个非可见格子的矩形
#[derive(Component, Debug, Default, Reflect)]
#[reflect(Component)]
pub struct FogOverlay2d {
    /// 上次绘制时的网格版本
    /// Grid version at the last redraw
    last_version: Option<u64>,
    /// 上次绘制时的网格尺寸；重新初始化会把版本归零，
    /// 只有尺寸对比能看出换图
    /// Grid dimensions at the last redraw; re-initialization resets the
    /// version to 0, so only this comparison catches a map swap
    grid_dims: UVec2,
    /// 当前持有的格子矩形实体
    /// Cell rectangle entities currently alive
    #[reflect(ignore)]
    cell_entities: Vec<Entity>,
}

/// Redraws the flat overlay when - and only when - the grid version
/// moved. One filled rectangle per non-`Visible` cell at its map-pixel
/// bounds; an uninitialized grid draws nothing.
/// 仅当网格版本变化时重绘平面覆盖层；未初始化的网格不绘制任何内容
pub fn redraw_overlay_2d(
    mut commands: Commands,
    grid: Res<FogGrid>,
    settings: Res<FogMapSettings>,
    mut overlays: Query<(Entity, &mut FogOverlay2d)>,
) {
    for (overlay_entity, mut overlay) in overlays.iter_mut() {
        if !settings.enabled {
            if !overlay.cell_entities.is_empty() {
                for entity in overlay.cell_entities.drain(..) {
                    commands.entity(entity).despawn();
                }
                overlay.last_version = None;
            }
            continue;
        }
        let dims = UVec2::new(grid.cols(), grid.rows());
        if overlay.last_version == Some(grid.version()) && overlay.grid_dims == dims {
            continue;
        }

        for entity in overlay.cell_entities.drain(..) {
            commands.entity(entity).despawn();
        }
        overlay.last_version = Some(grid.version());
        overlay.grid_dims = dims;

        if !grid.is_initialized() {
            continue;
        }

        let cell_size = grid.cell_size_px();
        let cells = grid.cells();
        for row in 0..grid.rows() {
            for col in 0..grid.cols() {
                let state = cells[(row * grid.cols() + col) as usize];
                if state == CellState::Visible {
                    continue;
                }
                let alpha = state_alpha(state, &settings);
                let center =
                    coords::cell_to_map_center(IVec2::new(col as i32, row as i32), cell_size);
                let entity = commands
                    .spawn((
                        Sprite {
                            color: settings.fog_color.with_alpha(alpha),
                            custom_size: Some(Vec2::splat(cell_size)),
                            ..Default::default()
                        },
                        Transform::from_translation(center.extend(settings.overlay_z)),
                        ChildOf(overlay_entity),
                    ))
                    .id();
                overlay.cell_entities.push(entity);
            }
        }
    }
}
