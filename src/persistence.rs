//! Snapshot serialization and the session sync adapter.
//!
//! A session's fog state travels as a [`FogSnapshot`]: map identity,
//! grid dimensions, one byte per cell and the spawn point list. Hosts
//! save snapshots through the [`FogStorage`] backend on explicit
//! requests; every client applies whatever snapshot arrives last, local
//! edits included. There is no merge step - last write wins.
//!
//! 快照序列化与会话同步适配器：快照整体覆盖本地状态，后写者胜。

use bevy::log::{error, warn};
use bevy::math::UVec2;
use bevy::prelude::{Deref, DerefMut, Event, EventReader, EventWriter, Res, ResMut, Resource};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::grid::FogGrid;
use crate::spawn_points::{SpawnPoint, SpawnPointManager};
use crate::storage::FogStorage;

/// 定位一份雾效状态的键：会话 + 地图
/// Key locating one fog state: session plus map
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub session_id: String,
    pub map_id: String,
}

impl SessionKey {
    pub fn new(session_id: impl Into<String>, map_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            map_id: map_id.into(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.session_id, self.map_id)
    }
}

/// Complete transferable fog state for one map. Cell bytes are the
/// grid's row-major state bytes; applying a snapshot replaces the local
/// grid and spawn point list wholesale.
/// 单张地图的完整可传输雾效状态，应用时整体替换本地网格与出生点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FogSnapshot {
    pub map_id: String,
    pub cols: u32,
    pub rows: u32,
    pub cell_size_px: f32,
    /// 行主序的格子状态字节
    /// Row-major cell state bytes
    pub cells: Vec<u8>,
    pub spawn_points: Vec<SpawnPoint>,
}

impl FogSnapshot {
    /// 从当前网格与出生点捕获一份快照
    /// Capture a snapshot of the current grid and spawn points
    pub fn capture(map_id: impl Into<String>, grid: &FogGrid, spawns: &SpawnPointManager) -> Self {
        Self {
            map_id: map_id.into(),
            cols: grid.cols(),
            rows: grid.rows(),
            cell_size_px: grid.cell_size_px(),
            cells: grid.snapshot_cells(),
            spawn_points: spawns.points().to_vec(),
        }
    }
}

/// 序列化格式
/// Serialization format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SerializationFormat {
    /// JSON格式 - 人类可读但体积较大
    /// JSON format - human readable but larger
    Json,
    /// Bincode格式 - Rust原生二进制格式
    /// Bincode format - Rust native binary format
    #[cfg(feature = "format-bincode")]
    Bincode,
}

#[allow(clippy::derivable_impls)]
impl Default for SerializationFormat {
    fn default() -> Self {
        // 优先使用高效的二进制格式
        // Prefer the efficient binary format
        #[cfg(feature = "format-bincode")]
        return SerializationFormat::Bincode;

        #[cfg(not(feature = "format-bincode"))]
        SerializationFormat::Json
    }
}

/// 持久化与同步错误
/// Persistence and sync errors
#[derive(Debug, Clone, PartialEq)]
pub enum PersistenceError {
    /// 序列化失败
    /// Serialization failed
    SerializationFailed(String),
    /// 反序列化失败
    /// Deserialization failed
    DeserializationFailed(String),
    /// 该会话没有已保存的快照
    /// No snapshot saved for this session
    NotFound(SessionKey),
    /// 快照网格尺寸与载荷不一致
    /// Snapshot grid dimensions disagree with its payload
    SnapshotMismatch { expected: UVec2, found: UVec2 },
    /// 存储后端失败
    /// Storage backend failure
    StorageFailed(String),
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::SerializationFailed(msg) => {
                write!(f, "Serialization failed: {msg}")
            }
            PersistenceError::DeserializationFailed(msg) => {
                write!(f, "Deserialization failed: {msg}")
            }
            PersistenceError::NotFound(key) => {
                write!(f, "No snapshot stored for session {key}")
            }
            PersistenceError::SnapshotMismatch { expected, found } => {
                write!(
                    f,
                    "Snapshot dimensions mismatch: expected {expected:?}, found {found:?}"
                )
            }
            PersistenceError::StorageFailed(msg) => {
                write!(f, "Storage backend failed: {msg}")
            }
        }
    }
}

impl std::error::Error for PersistenceError {}

/// 按指定格式序列化快照
/// Serialize a snapshot in the given format
pub fn serialize_snapshot(
    snapshot: &FogSnapshot,
    format: SerializationFormat,
) -> Result<Vec<u8>, PersistenceError> {
    match format {
        SerializationFormat::Json => serde_json::to_vec(snapshot)
            .map_err(|e| PersistenceError::SerializationFailed(e.to_string())),
        #[cfg(feature = "format-bincode")]
        SerializationFormat::Bincode => {
            bincode::serde::encode_to_vec(snapshot, bincode::config::standard())
                .map_err(|e| PersistenceError::SerializationFailed(e.to_string()))
        }
    }
}

/// Deserializes a snapshot, detecting the format from the payload: JSON
/// payloads start with `{`, anything else is treated as bincode.
/// 反序列化快照，按载荷首字节自动识别格式
pub fn deserialize_snapshot(bytes: &[u8]) -> Result<FogSnapshot, PersistenceError> {
    let first = bytes
        .iter()
        .copied()
        .find(|b| !b.is_ascii_whitespace())
        .ok_or_else(|| PersistenceError::DeserializationFailed("empty payload".into()))?;

    let snapshot: FogSnapshot = if first == b'{' {
        serde_json::from_slice(bytes)
            .map_err(|e| PersistenceError::DeserializationFailed(e.to_string()))?
    } else {
        #[cfg(feature = "format-bincode")]
        {
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map(|(snapshot, _)| snapshot)
                .map_err(|e| PersistenceError::DeserializationFailed(e.to_string()))?
        }
        #[cfg(not(feature = "format-bincode"))]
        {
            return Err(PersistenceError::DeserializationFailed(
                "binary payload but no binary format enabled".into(),
            ));
        }
    };

    let expected = (snapshot.cols as usize) * (snapshot.rows as usize);
    if snapshot.cells.len() != expected {
        return Err(PersistenceError::SnapshotMismatch {
            expected: UVec2::new(snapshot.cols, snapshot.rows),
            found: UVec2::new(snapshot.cells.len() as u32, 1),
        });
    }
    Ok(snapshot)
}

/// Shared handle to the session's storage backend. Hosts insert this
/// resource at startup; without it the save and load systems sit idle.
/// 会话存储后端的共享句柄，缺失时保存/读取系统不做任何事
#[derive(Resource, Clone, Deref)]
pub struct FogStorageHandle(pub Arc<dyn FogStorage>);

/// Receiver end of a storage subscription. Participant clients insert
/// one to have remotely saved snapshots applied every frame.
/// 存储订阅的接收端，参与者客户端插入后每帧应用远端快照
#[derive(Resource, Deref, DerefMut)]
pub struct RemoteFogInbox(pub async_channel::Receiver<Vec<u8>>);

/// 请求把当前雾效状态保存到存储后端
/// Request saving the current fog state to the storage backend
#[derive(Event, Debug, Clone)]
pub struct SaveFogRequest {
    pub key: SessionKey,
    /// 不指定时使用默认格式
    /// Falls back to the default format when unset
    pub format: Option<SerializationFormat>,
}

/// 请求从存储后端读取并应用雾效状态
/// Request loading fog state from the storage backend
#[derive(Event, Debug, Clone)]
pub struct LoadFogRequest {
    pub key: SessionKey,
}

/// 保存成功后发出
/// Emitted after a successful save
#[derive(Event, Debug, Clone)]
pub struct FogSaved {
    pub key: SessionKey,
    pub bytes: usize,
    pub format: SerializationFormat,
}

/// Emitted after a snapshot was applied locally. `warnings` carries
/// non-fatal oddities such as a cell size differing from the local map.
/// 快照应用完成后发出，warnings 记录非致命异常
#[derive(Event, Debug, Clone)]
pub struct FogLoaded {
    pub key: SessionKey,
    pub warnings: Vec<String>,
}

/// Serializes the grid and spawn points and hands the bytes to the
/// storage backend. A failed save is logged and dropped; the in-memory
/// state is never touched and no retry is scheduled.
/// 序列化网格与出生点并交给存储后端；失败只记录日志，不改内存状态
pub fn save_fog_system(
    mut requests: EventReader<SaveFogRequest>,
    grid: Res<FogGrid>,
    spawns: Res<SpawnPointManager>,
    storage: Option<Res<FogStorageHandle>>,
    mut saved: EventWriter<FogSaved>,
) {
    let Some(storage) = storage else {
        requests.clear();
        return;
    };
    for request in requests.read() {
        if !grid.is_initialized() {
            warn!("fog save for {} skipped: grid not initialized", request.key);
            continue;
        }
        let snapshot = FogSnapshot::capture(request.key.map_id.clone(), &grid, &spawns);
        let format = request.format.unwrap_or_default();
        let bytes = match serialize_snapshot(&snapshot, format) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("fog save for {} failed: {err}", request.key);
                continue;
            }
        };
        let len = bytes.len();
        if let Err(err) = storage.save(&request.key, &bytes) {
            error!("fog save for {} failed: {err}", request.key);
            continue;
        }
        saved.write(FogSaved {
            key: request.key.clone(),
            bytes: len,
            format,
        });
    }
}

/// Loads a stored snapshot and applies it over the local state. The
/// whole grid and spawn point list are replaced; a cell size differing
/// from the local grid is applied anyway and reported as a warning.
/// 读取已存快照并整体覆盖本地状态，格子尺寸不一致时照常应用并警告
pub fn load_fog_system(
    mut requests: EventReader<LoadFogRequest>,
    mut grid: ResMut<FogGrid>,
    mut spawns: ResMut<SpawnPointManager>,
    storage: Option<Res<FogStorageHandle>>,
    mut loaded: EventWriter<FogLoaded>,
) {
    let Some(storage) = storage else {
        requests.clear();
        return;
    };
    for request in requests.read() {
        let bytes = match storage.load(&request.key) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("fog load for {} failed: {err}", request.key);
                continue;
            }
        };
        let snapshot = match deserialize_snapshot(&bytes) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!("fog load for {} failed: {err}", request.key);
                continue;
            }
        };
        match apply_snapshot(&snapshot, &mut grid, &mut spawns) {
            Ok(warnings) => {
                loaded.write(FogLoaded {
                    key: request.key.clone(),
                    warnings,
                });
            }
            Err(err) => error!("fog load for {} failed: {err}", request.key),
        }
    }
}

/// Drains the remote inbox without blocking and applies the most recent
/// snapshot. Remote state overwrites local edits made since the sender
/// captured it, including local hides - last write wins.
/// 非阻塞地排空远端收件箱并应用最新快照，远端状态覆盖本地改动
pub fn apply_remote_fog(
    inbox: Option<Res<RemoteFogInbox>>,
    mut grid: ResMut<FogGrid>,
    mut spawns: ResMut<SpawnPointManager>,
) {
    let Some(inbox) = inbox else {
        return;
    };
    let mut latest = None;
    while let Ok(bytes) = inbox.try_recv() {
        latest = Some(bytes);
    }
    let Some(bytes) = latest else {
        return;
    };
    match deserialize_snapshot(&bytes) {
        Ok(snapshot) => {
            if let Err(err) = apply_snapshot(&snapshot, &mut grid, &mut spawns) {
                error!("remote fog snapshot rejected: {err}");
            }
        }
        Err(err) => error!("remote fog snapshot rejected: {err}"),
    }
}

fn apply_snapshot(
    snapshot: &FogSnapshot,
    grid: &mut FogGrid,
    spawns: &mut SpawnPointManager,
) -> Result<Vec<String>, PersistenceError> {
    let mut warnings = Vec::new();
    if grid.is_initialized() && snapshot.cell_size_px != grid.cell_size_px() {
        warnings.push(format!(
            "snapshot cell size {} differs from local {}",
            snapshot.cell_size_px,
            grid.cell_size_px()
        ));
    }
    grid.apply_cells(snapshot.cols, snapshot.rows, &snapshot.cells)
        .map_err(|err| PersistenceError::DeserializationFailed(err.to_string()))?;
    spawns.replace_all(snapshot.spawn_points.clone());
    Ok(warnings)
}
