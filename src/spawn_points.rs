use crate::coords;
use crate::grid::{CellState, FogGrid};
use crate::paint::brushed_cells;
use crate::settings::{FogAuthority, FogMapSettings};
use bevy::log::{debug, error};
use bevy::math::Vec2;
use bevy::prelude::{Event, EventReader, EventWriter, ReflectResource, Res, ResMut, Resource};
use bevy::reflect::Reflect;
use bevy::reflect::std_traits::ReflectDefault;
use serde::{Deserialize, Serialize};

/// 每张地图最多的出生点数量
/// Maximum spawn points per map
pub const MAX_SPAWN_POINTS: usize = 6;

/// 出生点之间的最小间距（地图像素）
/// Minimum spacing between spawn points in map pixels
pub const MIN_SPAWN_DISTANCE_PX: f32 = 64.0;

/// Stable identifier of a spawn point; survives moves and renames.
/// 出生点的稳定标识，移动与改名后保持不变
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Reflect, Serialize, Deserialize,
)]
pub struct SpawnPointId(pub u64);

impl std::fmt::Display for SpawnPointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "spawn#{}", self.0)
    }
}

/// 主持人放置的出生点标记，与雾效网格平行存储
/// Host-placed spawn marker, stored alongside (not inside) the fog grid
#[derive(Debug, Clone, PartialEq, Reflect, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub id: SpawnPointId,
    /// 地图像素坐标（放置与拖拽释放时吸附到格子中心）
    /// Map-pixel position, snapped to a cell center on place and release
    pub x: f32,
    pub y: f32,
    pub name: String,
    /// 已分配的玩家，仅影响界面样式，不影响视野
    /// Assigned player; styling only, no vision behavior
    pub player_id: Option<String>,
}

impl SpawnPoint {
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// 出生点操作错误，面向界面提示而非致命错误
/// Spawn point errors; user-facing conditions, not fatal
#[derive(Debug, Clone, PartialEq)]
pub enum SpawnPointError {
    /// 距离现有出生点过近
    /// Too close to an existing spawn point
    TooClose { distance: f32, min: f32 },
    /// 已达数量上限
    /// Spawn point limit reached
    LimitReached { max: usize },
    /// 未找到该出生点
    /// No spawn point with that id
    NotFound(SpawnPointId),
}

impl std::fmt::Display for SpawnPointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpawnPointError::TooClose { distance, min } => write!(
                f,
                "Spawn point too close to an existing one: {distance:.1} px (minimum {min:.1} px)"
            ),
            SpawnPointError::LimitReached { max } => {
                write!(f, "Spawn point limit reached ({max})")
            }
            SpawnPointError::NotFound(id) => write!(f, "Spawn point {id} not found"),
        }
    }
}

impl std::error::Error for SpawnPointError {}

/// CRUD over the host's spawn markers for the active map. A parallel,
/// simpler state table: it never consults or mutates the fog grid.
/// The `revision` counter moves on every successful edit so placement UI
/// can cache like the renderers do.
/// 当前地图出生点的增删改查；与雾效网格互不访问，revision 随每次成功
/// 修改递增，供放置界面缓存刷新
#[derive(Resource, Debug, Clone, Reflect, Default)]
#[reflect(Resource, Default)]
pub struct SpawnPointManager {
    points: Vec<SpawnPoint>,
    next_id: u64,
    revision: u64,
}

impl SpawnPointManager {
    pub fn points(&self) -> &[SpawnPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get(&self, id: SpawnPointId) -> Option<&SpawnPoint> {
        self.points.iter().find(|p| p.id == id)
    }

    fn snap(pos: Vec2, cell_size_px: f32) -> Vec2 {
        coords::cell_to_map_center(coords::map_to_cell(pos, cell_size_px), cell_size_px)
    }

    /// Places a new spawn point at `(x, y)` map pixels, snapped to the
    /// nearest cell center. Spacing and count limits are checked against
    /// the raw position before snapping.
    /// 放置新出生点：先按原始坐标做间距与数量校验，再吸附到格子中心
    pub fn add(
        &mut self,
        x: f32,
        y: f32,
        cell_size_px: f32,
    ) -> Result<&SpawnPoint, SpawnPointError> {
        if self.points.len() >= MAX_SPAWN_POINTS {
            return Err(SpawnPointError::LimitReached {
                max: MAX_SPAWN_POINTS,
            });
        }
        let pos = Vec2::new(x, y);
        for existing in &self.points {
            let distance = (existing.position() - pos).length();
            if distance < MIN_SPAWN_DISTANCE_PX {
                return Err(SpawnPointError::TooClose {
                    distance,
                    min: MIN_SPAWN_DISTANCE_PX,
                });
            }
        }

        let snapped = Self::snap(pos, cell_size_px);
        let id = SpawnPointId(self.next_id);
        self.next_id += 1;
        self.points.push(SpawnPoint {
            id,
            x: snapped.x,
            y: snapped.y,
            name: format!("Spawn {}", self.points.len() + 1),
            player_id: None,
        });
        self.revision += 1;
        Ok(self.points.last().expect("just pushed"))
    }

    /// Live position update during a drag; no snapping until release.
    /// 拖拽中的实时移动，释放前不吸附
    pub fn move_to(&mut self, id: SpawnPointId, x: f32, y: f32) -> Result<(), SpawnPointError> {
        let point = self
            .points
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(SpawnPointError::NotFound(id))?;
        point.x = x;
        point.y = y;
        self.revision += 1;
        Ok(())
    }

    /// 拖拽释放：重新吸附到格子中心
    /// Drag release: re-snap to the cell center
    pub fn release(&mut self, id: SpawnPointId, cell_size_px: f32) -> Result<(), SpawnPointError> {
        let point = self
            .points
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(SpawnPointError::NotFound(id))?;
        let snapped = Self::snap(point.position(), cell_size_px);
        point.x = snapped.x;
        point.y = snapped.y;
        self.revision += 1;
        Ok(())
    }

    pub fn remove(&mut self, id: SpawnPointId) -> Result<SpawnPoint, SpawnPointError> {
        let idx = self
            .points
            .iter()
            .position(|p| p.id == id)
            .ok_or(SpawnPointError::NotFound(id))?;
        self.revision += 1;
        Ok(self.points.remove(idx))
    }

    /// 将玩家分配到出生点（仅样式用途）
    /// Assigns a player to a spawn point (styling only)
    pub fn assign_player(
        &mut self,
        id: SpawnPointId,
        player_id: impl Into<String>,
    ) -> Result<(), SpawnPointError> {
        let point = self
            .points
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(SpawnPointError::NotFound(id))?;
        point.player_id = Some(player_id.into());
        self.revision += 1;
        Ok(())
    }

    /// Wholesale replacement from a loaded snapshot; keeps future ids
    /// clear of every restored one.
    /// 从快照整体恢复，并保证后续分配的 id 不与已有 id 冲突
    pub fn replace_all(&mut self, points: Vec<SpawnPoint>) {
        self.next_id = points.iter().map(|p| p.id.0 + 1).max().unwrap_or(0);
        self.points = points;
        self.revision += 1;
    }
}

/// 请求在指定地图像素处放置出生点
/// Request placing a spawn point at the given map-pixel position
#[derive(Event, Debug, Clone, Copy)]
pub struct PlaceSpawnPoint {
    pub x: f32,
    pub y: f32,
}

/// 出生点放置成功后发出，携带吸附后的位置
/// Emitted after a spawn point was placed, with its snapped position
#[derive(Event, Debug, Clone)]
pub struct SpawnPointPlaced {
    pub id: SpawnPointId,
    pub position: Vec2,
}

/// Handles placement requests: adds the point (snapped, spacing- and
/// limit-checked) and reveals the fog around it so a freshly dropped
/// token is not standing in the dark. Host-only, like the paint tool.
/// 处理放置请求：新增出生点并揭开其周围的雾；仅主持人可用
pub fn place_spawn_points(
    mut requests: EventReader<PlaceSpawnPoint>,
    mut manager: ResMut<SpawnPointManager>,
    mut grid: ResMut<FogGrid>,
    settings: Res<FogMapSettings>,
    authority: Res<FogAuthority>,
    mut placed: EventWriter<SpawnPointPlaced>,
) {
    if !authority.privileged {
        if !requests.is_empty() {
            debug!("dropping spawn placement from unprivileged client");
            requests.clear();
        }
        return;
    }
    for request in requests.read() {
        if !grid.is_initialized() {
            error!("spawn placement skipped: fog grid not initialized");
            continue;
        }
        let point = match manager.add(request.x, request.y, grid.cell_size_px()) {
            Ok(point) => (point.id, point.position()),
            Err(err) => {
                error!("spawn placement rejected: {err}");
                continue;
            }
        };
        let reveal = brushed_cells(&grid, &[point.1], settings.spawn_reveal_radius_px);
        grid.set_region(|col, row, _| reveal.contains(&(col, row)), CellState::Visible);
        placed.write(SpawnPointPlaced {
            id: point.0,
            position: point.1,
        });
    }
}
