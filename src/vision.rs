use crate::coords;
use crate::grid::{CellState, FogGrid};
use bevy::math::Vec2;
use bevy::platform::collections::HashSet;
use bevy::prelude::{
    Component, GlobalTransform, Query, ReflectComponent, Res, ResMut, Resource,
};
use bevy::reflect::Reflect;
use std::f32::consts::TAU;
use std::sync::Arc;

/// 视野源组件，挂在拥有视野的 token 实体上
/// Vision source component, attached to token entities that emit vision
///
/// Position comes from the entity's `GlobalTransform` (map-pixel space).
/// A full circle of vision uses `fov >= TAU`; anything narrower is a cone
/// of `fov` radians centered on `facing`.
#[derive(Component, Reflect, Clone, Debug)]
#[reflect(Component)]
pub struct VisionSource {
    /// 视野半径（地图像素）
    /// Vision radius in map pixels
    pub range: f32,
    /// 朝向角（弧度，0 = +X）
    /// Facing angle in radians, 0 = +X
    pub facing: f32,
    /// 视野张角（弧度）
    /// Field of view in radians
    pub fov: f32,
    /// 是否启用
    /// Enabled
    pub enabled: bool,
}

impl Default for VisionSource {
    fn default() -> Self {
        Self {
            range: 100.0,
            facing: 0.0,
            fov: TAU,
            enabled: true,
        }
    }
}

impl VisionSource {
    pub fn circular(range: f32) -> Self {
        Self {
            range,
            ..Default::default()
        }
    }

    pub fn cone(range: f32, facing: f32, fov: f32) -> Self {
        Self {
            range,
            facing,
            fov,
            enabled: true,
        }
    }
}

/// Pluggable occlusion predicate: given `(source_pos, cell_center)` in
/// map pixels, returns true when the segment is blocked. Off by default;
/// vision is a pure radius/angle test until a predicate is injected.
/// 可插拔的遮挡判定，默认关闭，视野只做半径/角度判定
#[derive(Resource, Clone, Default)]
pub struct VisionOcclusion(pub Option<Arc<dyn Fn(Vec2, Vec2) -> bool + Send + Sync>>);

impl VisionOcclusion {
    fn blocks(&self, from: Vec2, to: Vec2) -> bool {
        match &self.0 {
            Some(predicate) => predicate(from, to),
            None => false,
        }
    }
}

/// Collects the union of cells any source can currently see.
/// 收集所有视野源当前能看到的格子并集
///
/// Malformed sources (non-positive or non-finite range, non-positive fov)
/// contribute nothing rather than failing, so transient bad token data
/// never breaks the render loop.
pub fn resolve_visible_cells(
    grid: &FogGrid,
    sources: impl IntoIterator<Item = (Vec2, VisionSource)>,
    occlusion: &VisionOcclusion,
) -> HashSet<(u32, u32)> {
    let mut candidates = HashSet::new();
    if !grid.is_initialized() {
        return candidates;
    }
    let cell_size = grid.cell_size_px();

    for (pos, source) in sources {
        if !source.enabled
            || !source.range.is_finite()
            || source.range <= 0.0
            || !pos.x.is_finite()
            || !pos.y.is_finite()
            || source.fov <= 0.0
        {
            continue;
        }

        let center_cell = coords::map_to_cell(pos, cell_size);
        let cell_radius = (source.range / cell_size).ceil() as i32;
        let directional = source.fov < TAU;
        let facing_dir = Vec2::from_angle(source.facing);

        for dy in -cell_radius..=cell_radius {
            for dx in -cell_radius..=cell_radius {
                let col = center_cell.x + dx;
                let row = center_cell.y + dy;
                if !grid.in_bounds(col, row) {
                    continue;
                }
                let cell_center =
                    coords::cell_to_map_center(bevy::math::IVec2::new(col, row), cell_size);
                let to_cell = cell_center - pos;
                if to_cell.length() > source.range {
                    continue;
                }
                if directional && to_cell.length_squared() > f32::EPSILON {
                    // NaN facing fails the comparison and the cell is skipped.
                    if facing_dir.angle_to(to_cell).abs() > source.fov * 0.5 {
                        continue;
                    }
                }
                if occlusion.blocks(pos, cell_center) {
                    continue;
                }
                candidates.insert((col as u32, row as u32));
            }
        }
    }
    candidates
}

/// Applies a resolved candidate set to the grid: candidates become
/// `Visible`, cells that were `Visible` but left every source's reach are
/// downgraded to `Explored` - never back to `Hidden`. Idempotent: an
/// unchanged candidate set leaves the version untouched.
/// 将视野候选集写入网格：候选格变为 Visible，失去视野的格子降级为
/// Explored（绝不回退到 Hidden）；候选集不变时版本不动
pub fn apply_vision(grid: &mut FogGrid, candidates: &HashSet<(u32, u32)>) {
    grid.set_region(
        |col, row, state| state == CellState::Visible && !candidates.contains(&(col, row)),
        CellState::Explored,
    );
    grid.set_region(
        |col, row, _| candidates.contains(&(col, row)),
        CellState::Visible,
    );
}

/// 每帧解析视野源并更新网格
/// Per-frame system resolving vision sources into the grid
pub fn resolve_vision(
    mut grid: ResMut<FogGrid>,
    occlusion: Res<VisionOcclusion>,
    sources: Query<(&GlobalTransform, &VisionSource)>,
) {
    if !grid.is_initialized() {
        return;
    }
    let snapshot: Vec<(Vec2, VisionSource)> = sources
        .iter()
        .map(|(transform, source)| (transform.translation().truncate(), source.clone()))
        .collect();
    let candidates = resolve_visible_cells(&grid, snapshot, &occlusion);
    apply_vision(&mut grid, &candidates);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MapDescriptor;
    use std::f32::consts::FRAC_PI_2;

    fn test_grid() -> FogGrid {
        let mut grid = FogGrid::default();
        grid.init(&MapDescriptor::new(1200.0, 800.0, 40.0)).unwrap();
        grid
    }

    fn resolve_at(grid: &FogGrid, pos: Vec2, source: VisionSource) -> HashSet<(u32, u32)> {
        resolve_visible_cells(grid, [(pos, source)], &VisionOcclusion::default())
    }

    #[test]
    fn circular_source_marks_cells_within_radius() {
        let mut grid = test_grid();
        let origin = Vec2::new(600.0, 400.0);
        let candidates = resolve_at(&grid, origin, VisionSource::circular(150.0));
        apply_vision(&mut grid, &candidates);

        for row in 0..grid.rows() {
            for col in 0..grid.cols() {
                let center =
                    coords::cell_to_map_center(bevy::math::IVec2::new(col as i32, row as i32), 40.0);
                let expected = if (center - origin).length() <= 150.0 {
                    CellState::Visible
                } else {
                    CellState::Hidden
                };
                assert_eq!(grid.get_cell(col, row).unwrap(), expected, "({col}, {row})");
            }
        }
    }

    #[test]
    fn moving_a_source_downgrades_to_explored_not_hidden() {
        let mut grid = test_grid();
        let origin = Vec2::new(600.0, 400.0);
        let candidates = resolve_at(&grid, origin, VisionSource::circular(150.0));
        apply_vision(&mut grid, &candidates);
        let seen: Vec<(u32, u32)> = candidates.iter().copied().collect();

        let moved = resolve_at(&grid, Vec2::new(1000.0, 400.0), VisionSource::circular(150.0));
        apply_vision(&mut grid, &moved);

        for (col, row) in seen {
            let state = grid.get_cell(col, row).unwrap();
            assert_ne!(state, CellState::Hidden, "({col}, {row}) regressed to Hidden");
            if !moved.contains(&(col, row)) {
                assert_eq!(state, CellState::Explored);
            }
        }
    }

    #[test]
    fn unchanged_source_set_is_idempotent() {
        let mut grid = test_grid();
        let candidates = resolve_at(&grid, Vec2::new(600.0, 400.0), VisionSource::circular(150.0));
        apply_vision(&mut grid, &candidates);
        let version = grid.version();

        apply_vision(&mut grid, &candidates);
        apply_vision(&mut grid, &candidates);
        assert_eq!(grid.version(), version);
    }

    #[test]
    fn cone_limits_cells_to_the_facing_half_angle() {
        let grid = test_grid();
        let origin = Vec2::new(600.0, 400.0);
        // Cone facing +X with a 90 degree aperture.
        let candidates = resolve_at(&grid, origin, VisionSource::cone(200.0, 0.0, FRAC_PI_2));
        assert!(!candidates.is_empty());
        for (col, row) in &candidates {
            let center = coords::cell_to_map_center(
                bevy::math::IVec2::new(*col as i32, *row as i32),
                40.0,
            );
            let to_cell = center - origin;
            if to_cell.length_squared() > f32::EPSILON {
                let angle = Vec2::X.angle_to(to_cell).abs();
                assert!(angle <= FRAC_PI_2 * 0.5 + 1e-4, "({col}, {row}) at {angle}");
            }
        }
        // Nothing behind the source.
        let behind = coords::map_to_cell(origin + Vec2::new(-120.0, 0.0), 40.0);
        assert!(!candidates.contains(&(behind.x as u32, behind.y as u32)));
    }

    #[test]
    fn degenerate_sources_contribute_nothing() {
        let grid = test_grid();
        let pos = Vec2::new(600.0, 400.0);
        assert!(resolve_at(&grid, pos, VisionSource::circular(0.0)).is_empty());
        assert!(resolve_at(&grid, pos, VisionSource::circular(f32::NAN)).is_empty());
        assert!(resolve_at(&grid, pos, VisionSource::cone(150.0, 0.0, 0.0)).is_empty());
        let mut disabled = VisionSource::circular(150.0);
        disabled.enabled = false;
        assert!(resolve_at(&grid, pos, disabled).is_empty());
    }

    #[test]
    fn occlusion_predicate_filters_candidates() {
        let grid = test_grid();
        let origin = Vec2::new(600.0, 400.0);
        // Block everything east of the source.
        let occlusion = VisionOcclusion(Some(Arc::new(move |from: Vec2, to: Vec2| {
            to.x > from.x
        })));
        let candidates =
            resolve_visible_cells(&grid, [(origin, VisionSource::circular(150.0))], &occlusion);
        assert!(!candidates.is_empty());
        for (col, row) in &candidates {
            let center = coords::cell_to_map_center(
                bevy::math::IVec2::new(*col as i32, *row as i32),
                40.0,
            );
            assert!(center.x <= origin.x, "({col}, {row}) should be blocked");
        }
    }
}
