use crate::settings::MapDescriptor;
use bevy::log::{error, info};
use bevy::math::{IVec2, Vec2};
use bevy::prelude::{DetectChanges, Event, EventWriter, Local, ReflectResource, Res, ResMut, Resource};
use bevy::reflect::Reflect;
use bevy::reflect::std_traits::ReflectDefault;

use crate::coords;

/// 单个格子的可见性状态
/// Visibility state of a single fog cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect)]
#[reflect(Default)]
pub enum CellState {
    /// 从未被探索 - 完全遮蔽
    /// Never explored - fully obscured
    #[default]
    Hidden,
    /// 曾经可见，当前不在任何视野内 - 半透明
    /// Seen before, not currently in any vision - dimmed
    Explored,
    /// 当前在视野内或被手动揭示
    /// Currently within a vision source or explicitly revealed
    Visible,
}

impl CellState {
    /// 持久化字节编码：0=Hidden, 1=Explored, 2=Visible
    /// Persisted byte encoding: 0=Hidden, 1=Explored, 2=Visible
    pub fn as_byte(self) -> u8 {
        match self {
            CellState::Hidden => 0,
            CellState::Explored => 1,
            CellState::Visible => 2,
        }
    }

    /// Unknown byte values decode to `Hidden` rather than failing, so a
    /// snapshot from a newer peer degrades instead of poisoning the grid.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            1 => CellState::Explored,
            2 => CellState::Visible,
            _ => CellState::Hidden,
        }
    }
}

/// 网格操作错误
/// Fog grid errors
#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    /// 非法的地图描述（尺寸或格子大小非正）
    /// Invalid map descriptor (non-positive size or cell size)
    InvalidDescriptor {
        width_px: f32,
        height_px: f32,
        cell_size_px: f32,
    },
    /// 越界的格子查询
    /// Cell query outside the grid
    OutOfBounds { col: u32, row: u32, cols: u32, rows: u32 },
    /// 批量写入的尺寸与当前网格不符
    /// Bulk apply whose dimensions do not match the current grid
    DimensionMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },
}

impl std::fmt::Display for GridError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GridError::InvalidDescriptor {
                width_px,
                height_px,
                cell_size_px,
            } => write!(
                f,
                "Invalid map descriptor: {width_px}x{height_px} px, cell size {cell_size_px} px"
            ),
            GridError::OutOfBounds {
                col,
                row,
                cols,
                rows,
            } => write!(f, "Cell ({col}, {row}) out of bounds for {cols}x{rows} grid"),
            GridError::DimensionMismatch { expected, found } => write!(
                f,
                "Grid dimension mismatch: expected {}x{}, found {}x{}",
                expected.0, expected.1, found.0, found.1
            ),
        }
    }
}

impl std::error::Error for GridError {}

/// The authoritative fog grid for the active map.
/// 当前地图的权威雾效网格
///
/// This resource is the single writer of cell state: the paint tool, the
/// vision resolver and the sync adapter all mutate it through the API
/// below, and every other consumer is a read-only subscriber. The
/// `version` counter increments on every successful mutation and is the
/// sole redraw signal for the renderers - cell arrays are never compared
/// by value.
#[derive(Resource, Debug, Clone, Default, Reflect)]
#[reflect(Resource, Default)]
pub struct FogGrid {
    cols: u32,
    rows: u32,
    cell_size_px: f32,
    cells: Vec<CellState>,
    version: u64,
}

impl FogGrid {
    /// 按描述符重建网格：所有格子 Hidden，版本归零
    /// Rebuild the grid from a descriptor: all cells Hidden, version reset to 0
    pub fn init(&mut self, descriptor: &MapDescriptor) -> Result<(), GridError> {
        if !descriptor.is_valid() {
            return Err(GridError::InvalidDescriptor {
                width_px: descriptor.width_px,
                height_px: descriptor.height_px,
                cell_size_px: descriptor.cell_size_px,
            });
        }

        self.cols = descriptor.cols();
        self.rows = descriptor.rows();
        self.cell_size_px = descriptor.cell_size_px;
        self.cells = vec![CellState::Hidden; (self.cols * self.rows) as usize];
        self.version = 0;
        Ok(())
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// 格子边长（地图像素）
    /// Cell side length in map pixels
    pub fn cell_size_px(&self) -> f32 {
        self.cell_size_px
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// 未初始化（0x0）的网格渲染为空，而不是报错
    /// An uninitialized (0x0) grid renders as nothing rather than failing
    pub fn is_initialized(&self) -> bool {
        self.cols > 0 && self.rows > 0
    }

    /// Read-only view of the cell array, row-major.
    /// 只读的格子数组视图，按行排列
    pub fn cells(&self) -> &[CellState] {
        &self.cells
    }

    pub fn in_bounds(&self, col: i32, row: i32) -> bool {
        col >= 0 && row >= 0 && (col as u32) < self.cols && (row as u32) < self.rows
    }

    fn index(&self, col: u32, row: u32) -> usize {
        (row * self.cols + col) as usize
    }

    pub fn get_cell(&self, col: u32, row: u32) -> Result<CellState, GridError> {
        if col >= self.cols || row >= self.rows {
            return Err(GridError::OutOfBounds {
                col,
                row,
                cols: self.cols,
                rows: self.rows,
            });
        }
        Ok(self.cells[self.index(col, row)])
    }

    /// Guarded single-cell write. Setting a previously seen cell back to
    /// `Hidden` is a no-op here; only [`FogGrid::force_set_cell`] (the
    /// explicit hide path) may regress a cell.
    /// 受保护的单格写入：不允许把已见过的格子自动退回 Hidden
    pub fn set_cell(&mut self, col: u32, row: u32, state: CellState) -> Result<bool, GridError> {
        self.write_cell(col, row, state, false)
    }

    /// 显式隐藏入口，绕过回退保护
    /// Explicit hide entry point, bypasses the regression guard
    pub fn force_set_cell(
        &mut self,
        col: u32,
        row: u32,
        state: CellState,
    ) -> Result<bool, GridError> {
        self.write_cell(col, row, state, true)
    }

    fn write_cell(
        &mut self,
        col: u32,
        row: u32,
        state: CellState,
        forced: bool,
    ) -> Result<bool, GridError> {
        let current = self.get_cell(col, row)?;
        if current == state {
            return Ok(false);
        }
        if !forced && state == CellState::Hidden {
            return Ok(false);
        }
        let idx = self.index(col, row);
        self.cells[idx] = state;
        self.version += 1;
        Ok(true)
    }

    /// Bulk guarded write: `state` is applied to every in-bounds cell the
    /// predicate accepts, and the version is bumped exactly once if any
    /// cell actually changed - regardless of how many did.
    /// 批量受保护写入：无论改动多少格子，版本最多只递增一次
    ///
    /// The predicate receives `(col, row, current_state)`.
    pub fn set_region<F>(&mut self, predicate: F, state: CellState) -> bool
    where
        F: FnMut(u32, u32, CellState) -> bool,
    {
        self.write_region(predicate, state, false)
    }

    /// `set_region` 的强制版本，供隐藏笔刷与远端快照使用
    /// Forced variant of `set_region` for hide strokes and remote snapshots
    pub fn force_set_region<F>(&mut self, predicate: F, state: CellState) -> bool
    where
        F: FnMut(u32, u32, CellState) -> bool,
    {
        self.write_region(predicate, state, true)
    }

    fn write_region<F>(&mut self, mut predicate: F, state: CellState, forced: bool) -> bool
    where
        F: FnMut(u32, u32, CellState) -> bool,
    {
        let mut changed = false;
        for row in 0..self.rows {
            for col in 0..self.cols {
                let idx = (row * self.cols + col) as usize;
                let current = self.cells[idx];
                if current == state {
                    continue;
                }
                if !forced && state == CellState::Hidden {
                    continue;
                }
                if predicate(col, row, current) {
                    self.cells[idx] = state;
                    changed = true;
                }
            }
        }
        if changed {
            self.version += 1;
        }
        changed
    }

    /// 全图归 Hidden 并递增版本
    /// Return every cell to Hidden and bump the version
    pub fn reset(&mut self) {
        if !self.is_initialized() {
            return;
        }
        self.cells.fill(CellState::Hidden);
        self.version += 1;
    }

    /// Host convenience: mark the whole map Visible in one bump.
    /// 主持人工具：一次版本递增揭示全图
    pub fn reveal_all(&mut self) -> bool {
        self.set_region(|_, _, _| true, CellState::Visible)
    }

    /// Forced bulk apply of a serialized cell array, used by the sync
    /// adapter. Last write wins; dimensions must match the live grid.
    /// 远端快照的强制批量写入，后到者胜，尺寸必须与当前网格一致
    pub fn apply_cells(&mut self, cols: u32, rows: u32, bytes: &[u8]) -> Result<(), GridError> {
        if cols != self.cols || rows != self.rows || bytes.len() != (cols * rows) as usize {
            return Err(GridError::DimensionMismatch {
                expected: (self.cols, self.rows),
                found: (cols, rows),
            });
        }
        let mut changed = false;
        for (cell, byte) in self.cells.iter_mut().zip(bytes) {
            let state = CellState::from_byte(*byte);
            if *cell != state {
                *cell = state;
                changed = true;
            }
        }
        if changed {
            self.version += 1;
        }
        Ok(())
    }

    /// 导出行排列的字节数组，供持久化层使用
    /// Export the row-major byte array for the persistence layer
    pub fn snapshot_cells(&self) -> Vec<u8> {
        self.cells.iter().map(|c| c.as_byte()).collect()
    }

    /// Cell indices and state under a map-pixel position, if in bounds.
    /// 地图像素坐标下的格子索引与状态
    pub fn cell_at(&self, map_pos: Vec2) -> Option<(IVec2, CellState)> {
        let cell = coords::map_to_cell(map_pos, self.cell_size_px);
        if !self.in_bounds(cell.x, cell.y) {
            return None;
        }
        let state = self.cells[self.index(cell.x as u32, cell.y as u32)];
        Some((cell, state))
    }

    /// Read-only visibility query for the combat/UI layer: whether the
    /// cell under a map-pixel position is currently `Visible`.
    /// 供战斗/界面层使用的只读可见性查询
    pub fn is_visible_at(&self, map_pos: Vec2) -> bool {
        matches!(self.cell_at(map_pos), Some((_, CellState::Visible)))
    }
}

/// 版本变更通知，供小地图等额外覆盖层同步重绘
/// Version change notification for extra overlays (e.g. a minimap)
#[derive(Event, Debug, Clone, Copy)]
pub struct FogVersionChanged {
    pub version: u64,
}

/// 网格版本变动时广播 [`FogVersionChanged`]
/// Broadcasts [`FogVersionChanged`] whenever the grid version moves
pub fn publish_version_changes(
    grid: Res<FogGrid>,
    mut last_seen: Local<u64>,
    mut events: EventWriter<FogVersionChanged>,
) {
    if grid.version() != *last_seen {
        *last_seen = grid.version();
        events.write(FogVersionChanged {
            version: grid.version(),
        });
    }
}

/// Re-initializes the grid whenever the map descriptor is inserted or
/// replaced. Changing the descriptor wipes existing fog by design of the
/// data model; loading a saved grid happens afterwards through the sync
/// adapter.
/// 地图描述符插入或变更时重建网格（会清空现有雾效）
pub fn init_fog_on_descriptor_change(
    descriptor: Option<Res<MapDescriptor>>,
    mut grid: ResMut<FogGrid>,
) {
    let Some(descriptor) = descriptor else {
        return;
    };
    if !descriptor.is_changed() {
        return;
    }
    match grid.init(&descriptor) {
        Ok(()) => info!(
            "Fog grid initialized: {}x{} cells, {} px each",
            grid.cols(),
            grid.rows(),
            grid.cell_size_px()
        ),
        Err(e) => error!("Failed to initialize fog grid: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_grid() -> FogGrid {
        let mut grid = FogGrid::default();
        grid.init(&MapDescriptor::new(1200.0, 800.0, 40.0)).unwrap();
        grid
    }

    #[test]
    fn init_derives_dimensions_and_hides_everything() {
        let grid = test_grid();
        assert_eq!(grid.cols(), 30);
        assert_eq!(grid.rows(), 20);
        assert_eq!(grid.version(), 0);
        assert_eq!(grid.cells().len(), 600);
        assert!(grid.cells().iter().all(|c| *c == CellState::Hidden));
    }

    #[test]
    fn init_rejects_non_positive_descriptor() {
        let mut grid = FogGrid::default();
        let err = grid
            .init(&MapDescriptor::new(0.0, 800.0, 40.0))
            .unwrap_err();
        assert!(matches!(err, GridError::InvalidDescriptor { .. }));
        let err = grid
            .init(&MapDescriptor::new(1200.0, 800.0, -1.0))
            .unwrap_err();
        assert!(matches!(err, GridError::InvalidDescriptor { .. }));
        assert!(!grid.is_initialized());
    }

    #[test]
    fn get_cell_out_of_bounds_is_an_error() {
        let grid = test_grid();
        assert!(matches!(
            grid.get_cell(30, 0),
            Err(GridError::OutOfBounds { .. })
        ));
        assert!(matches!(
            grid.get_cell(0, 20),
            Err(GridError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn hidden_regression_requires_the_forced_path() {
        let mut grid = test_grid();
        grid.set_cell(3, 4, CellState::Visible).unwrap();
        let v = grid.version();

        // Guarded write must not regress and must not bump.
        assert!(!grid.set_cell(3, 4, CellState::Hidden).unwrap());
        assert_eq!(grid.get_cell(3, 4).unwrap(), CellState::Visible);
        assert_eq!(grid.version(), v);

        assert!(grid.force_set_cell(3, 4, CellState::Hidden).unwrap());
        assert_eq!(grid.get_cell(3, 4).unwrap(), CellState::Hidden);
        assert_eq!(grid.version(), v + 1);
    }

    #[test]
    fn visible_and_explored_move_freely() {
        let mut grid = test_grid();
        assert!(grid.set_cell(0, 0, CellState::Explored).unwrap());
        assert!(grid.set_cell(0, 0, CellState::Visible).unwrap());
        assert!(grid.set_cell(0, 0, CellState::Explored).unwrap());
        assert_eq!(grid.version(), 3);
    }

    #[test]
    fn set_region_bumps_version_once() {
        let mut grid = test_grid();
        let changed = grid.set_region(|col, _, _| col < 10, CellState::Visible);
        assert!(changed);
        assert_eq!(grid.version(), 1);
        assert_eq!(grid.get_cell(9, 0).unwrap(), CellState::Visible);
        assert_eq!(grid.get_cell(10, 0).unwrap(), CellState::Hidden);

        // Same region again: nothing changes, no bump.
        assert!(!grid.set_region(|col, _, _| col < 10, CellState::Visible));
        assert_eq!(grid.version(), 1);
    }

    #[test]
    fn reset_hides_everything_and_bumps() {
        let mut grid = test_grid();
        grid.reveal_all();
        let v = grid.version();
        grid.reset();
        assert_eq!(grid.version(), v + 1);
        assert!(grid.cells().iter().all(|c| *c == CellState::Hidden));
    }

    #[test]
    fn apply_cells_rejects_mismatched_dimensions() {
        let mut grid = test_grid();
        let err = grid.apply_cells(29, 20, &vec![0u8; 580]).unwrap_err();
        assert!(matches!(err, GridError::DimensionMismatch { .. }));
        // Failed apply leaves state untouched.
        assert_eq!(grid.version(), 0);
    }

    #[test]
    fn apply_cells_is_forced_and_change_detecting() {
        let mut grid = test_grid();
        grid.reveal_all();
        let v = grid.version();

        // Remote snapshot hides everything despite the regression guard.
        let bytes = vec![0u8; 600];
        grid.apply_cells(30, 20, &bytes).unwrap();
        assert_eq!(grid.version(), v + 1);
        assert!(grid.cells().iter().all(|c| *c == CellState::Hidden));

        // Applying the identical snapshot again does not bump.
        grid.apply_cells(30, 20, &bytes).unwrap();
        assert_eq!(grid.version(), v + 1);
    }

    #[test]
    fn visibility_query_uses_map_pixels() {
        let mut grid = test_grid();
        grid.set_cell(15, 10, CellState::Visible).unwrap();
        // Cell (15, 10) spans map pixels [600, 640) x [400, 440).
        assert!(grid.is_visible_at(Vec2::new(620.0, 420.0)));
        assert!(!grid.is_visible_at(Vec2::new(580.0, 420.0)));
        assert!(!grid.is_visible_at(Vec2::new(-5.0, 5.0)));
        let (cell, state) = grid.cell_at(Vec2::new(620.0, 420.0)).unwrap();
        assert_eq!(cell, IVec2::new(15, 10));
        assert_eq!(state, CellState::Visible);
    }
}
