use crate::coords::{self, ViewTransform};
use crate::grid::{CellState, FogGrid};
use crate::settings::FogAuthority;
use bevy::log::debug;
use bevy::math::Vec2;
use bevy::platform::collections::HashSet;
use bevy::prelude::{Event, EventReader, Res, ResMut};
use bevy::reflect::Reflect;

/// 笔刷模式
/// Brush mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum PaintMode {
    /// 揭示：格子变为 Visible
    /// Reveal: cells become Visible
    Reveal,
    /// 隐藏：格子强制回到 Hidden
    /// Hide: cells are forced back to Hidden
    Hide,
}

/// One continuous pointer-drag paint operation, already converted to
/// map-pixel space by the input layer. All samples of a stroke coalesce
/// into a single grid mutation, so a stroke costs one version bump no
/// matter how many pointer events produced it.
/// 一次连续的涂抹笔画：所有采样点合并为一次网格写入，一笔只递增一次版本
#[derive(Event, Debug, Clone)]
pub struct PaintStroke {
    /// 地图像素空间中按时间排序的采样点
    /// Time-ordered samples in map-pixel space
    pub samples: Vec<Vec2>,
    /// 笔刷半径（地图像素）
    /// Brush radius in map pixels
    pub brush_radius: f32,
    pub mode: PaintMode,
}

impl PaintStroke {
    pub fn new(samples: Vec<Vec2>, brush_radius: f32, mode: PaintMode) -> Self {
        Self {
            samples,
            brush_radius,
            mode,
        }
    }

    /// 把屏幕坐标采样点经由视图变换换算到地图像素
    /// Builds a stroke from screen-space samples via the view transform
    pub fn from_screen_samples(
        samples: impl IntoIterator<Item = Vec2>,
        view: &ViewTransform,
        brush_radius: f32,
        mode: PaintMode,
    ) -> Self {
        Self {
            samples: samples
                .into_iter()
                .map(|s| coords::screen_to_map(s, view))
                .collect(),
            brush_radius,
            mode,
        }
    }
}

/// Union of all cells whose center lies within `radius` of any sample.
/// 所有采样点笔刷覆盖格子的并集（以格子中心距离判定）
pub fn brushed_cells(grid: &FogGrid, samples: &[Vec2], radius: f32) -> HashSet<(u32, u32)> {
    let mut cells = HashSet::new();
    if !grid.is_initialized() || !radius.is_finite() || radius <= 0.0 {
        return cells;
    }
    let cell_size = grid.cell_size_px();
    let cell_radius = (radius / cell_size).ceil() as i32;

    for sample in samples {
        if !sample.x.is_finite() || !sample.y.is_finite() {
            continue;
        }
        let center_cell = coords::map_to_cell(*sample, cell_size);
        for dy in -cell_radius..=cell_radius {
            for dx in -cell_radius..=cell_radius {
                let col = center_cell.x + dx;
                let row = center_cell.y + dy;
                if !grid.in_bounds(col, row) {
                    continue;
                }
                let center =
                    coords::cell_to_map_center(bevy::math::IVec2::new(col, row), cell_size);
                if (center - *sample).length() <= radius {
                    cells.insert((col as u32, row as u32));
                }
            }
        }
    }
    cells
}

/// Applies one stroke through the store's bulk API: reveal goes through
/// the guarded path, hide through the forced path (the explicit
/// regression entry point).
/// 将一笔写入网格：揭示走受保护路径，隐藏走强制路径
pub fn apply_stroke(grid: &mut FogGrid, stroke: &PaintStroke) -> bool {
    let cells = brushed_cells(grid, &stroke.samples, stroke.brush_radius);
    if cells.is_empty() {
        return false;
    }
    match stroke.mode {
        PaintMode::Reveal => grid.set_region(
            |col, row, _| cells.contains(&(col, row)),
            CellState::Visible,
        ),
        PaintMode::Hide => grid.force_set_region(
            |col, row, _| cells.contains(&(col, row)),
            CellState::Hidden,
        ),
    }
}

/// 处理笔画事件；非主持端直接丢弃输入
/// Drains stroke events; non-privileged clients drop the input entirely
pub fn apply_paint_strokes(
    mut strokes: EventReader<PaintStroke>,
    mut grid: ResMut<FogGrid>,
    authority: Res<FogAuthority>,
) {
    if !authority.privileged {
        if !strokes.is_empty() {
            debug!("Dropping {} paint stroke(s): not privileged", strokes.len());
            strokes.clear();
        }
        return;
    }
    for stroke in strokes.read() {
        apply_stroke(&mut grid, stroke);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MapDescriptor;
    use bevy::app::App;
    use bevy::prelude::Update;

    fn test_grid() -> FogGrid {
        let mut grid = FogGrid::default();
        grid.init(&MapDescriptor::new(1200.0, 800.0, 40.0)).unwrap();
        grid
    }

    #[test]
    fn stroke_coalesces_samples_into_one_version_bump() {
        let mut grid = test_grid();
        let stroke = PaintStroke::new(
            vec![
                Vec2::new(100.0, 100.0),
                Vec2::new(180.0, 120.0),
                Vec2::new(260.0, 160.0),
                Vec2::new(340.0, 200.0),
            ],
            80.0,
            PaintMode::Reveal,
        );
        assert!(apply_stroke(&mut grid, &stroke));
        assert_eq!(grid.version(), 1);
        assert!(grid.is_visible_at(Vec2::new(100.0, 100.0)));
        assert!(grid.is_visible_at(Vec2::new(340.0, 200.0)));
    }

    #[test]
    fn hide_then_reveal_bumps_exactly_twice() {
        let mut grid = test_grid();
        // Start from an Explored region.
        grid.set_region(
            |col, row, _| col < 10 && row < 10,
            CellState::Explored,
        );
        let base = grid.version();

        let region = vec![Vec2::new(200.0, 200.0)];
        assert!(apply_stroke(
            &mut grid,
            &PaintStroke::new(region.clone(), 150.0, PaintMode::Hide)
        ));
        assert_eq!(grid.get_cell(5, 5).unwrap(), CellState::Hidden);

        assert!(apply_stroke(
            &mut grid,
            &PaintStroke::new(region, 150.0, PaintMode::Reveal)
        ));
        assert_eq!(grid.get_cell(5, 5).unwrap(), CellState::Visible);
        assert_eq!(grid.version(), base + 2);
    }

    #[test]
    fn degenerate_strokes_change_nothing() {
        let mut grid = test_grid();
        assert!(!apply_stroke(
            &mut grid,
            &PaintStroke::new(vec![], 100.0, PaintMode::Reveal)
        ));
        assert!(!apply_stroke(
            &mut grid,
            &PaintStroke::new(vec![Vec2::new(100.0, 100.0)], 0.0, PaintMode::Reveal)
        ));
        assert!(!apply_stroke(
            &mut grid,
            &PaintStroke::new(vec![Vec2::new(f32::NAN, 100.0)], 50.0, PaintMode::Reveal)
        ));
        assert_eq!(grid.version(), 0);
    }

    #[test]
    fn screen_samples_are_mapped_through_the_view() {
        let grid = test_grid();
        let view = ViewTransform {
            offset: Vec2::new(100.0, 50.0),
            scale: 2.0,
        };
        let stroke = PaintStroke::from_screen_samples(
            [Vec2::new(1300.0, 850.0)],
            &view,
            60.0,
            PaintMode::Reveal,
        );
        assert_eq!(stroke.samples[0], Vec2::new(600.0, 400.0));
        assert!(!brushed_cells(&grid, &stroke.samples, stroke.brush_radius).is_empty());
    }

    #[test]
    fn unprivileged_clients_cannot_paint() {
        let mut app = App::new();
        app.add_event::<PaintStroke>()
            .insert_resource(test_grid())
            .insert_resource(FogAuthority { privileged: false })
            .add_systems(Update, apply_paint_strokes);

        app.world_mut().send_event(PaintStroke::new(
            vec![Vec2::new(600.0, 400.0)],
            150.0,
            PaintMode::Reveal,
        ));
        app.update();
        assert_eq!(app.world().resource::<FogGrid>().version(), 0);

        app.world_mut().resource_mut::<FogAuthority>().privileged = true;
        app.world_mut().send_event(PaintStroke::new(
            vec![Vec2::new(600.0, 400.0)],
            150.0,
            PaintMode::Reveal,
        ));
        app.update();
        assert_eq!(app.world().resource::<FogGrid>().version(), 1);
    }
}
