pub use crate::{
    BattleFogPlugin, FogSystems,
    coords::{
        self, ViewTransform, cell_to_map_center, map_to_cell, map_to_screen, map_to_world,
        screen_to_map, world_to_map,
    },
    grid::{CellState, FogGrid, FogVersionChanged, GridError},
    paint::{PaintMode, PaintStroke},
    persistence::{
        FogLoaded, FogSaved, FogSnapshot, FogStorageHandle, LoadFogRequest, PersistenceError,
        RemoteFogInbox, SaveFogRequest, SerializationFormat, SessionKey,
    },
    render::{FogOverlay2d, FogPlane3d},
    settings::{FogAuthority, FogMapSettings, MapDescriptor},
    spawn_points::{
        MAX_SPAWN_POINTS, MIN_SPAWN_DISTANCE_PX, PlaceSpawnPoint, SpawnPoint, SpawnPointError,
        SpawnPointId, SpawnPointManager, SpawnPointPlaced,
    },
    storage::{FogStorage, MemoryStorage},
    vision::{VisionOcclusion, VisionSource},
};
