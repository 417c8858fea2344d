//! Fog of war for shared battle maps.
//!
//! One authoritative cell grid per map tracks what each area has been:
//! never seen, previously seen, or currently in view. Token vision
//! keeps the grid fresh every frame, the host's brush overrides it, and
//! a monotonically increasing version number tells the two bundled
//! renderers (flat sprites for 2D boards, a textured plane for 3D
//! scenes) when to redraw. Snapshots of the whole state travel through
//! a pluggable storage backend so every client in a session sees the
//! same fog.
//!
//! 共享战斗地图的战争迷雾：单一权威网格 + 单调版本号驱动的渲染器，
//! 快照经可插拔存储后端在会话内同步。
//!
//! ```no_run
//! use bevy::prelude::*;
//! use bevy_battle_fog::prelude::*;
//!
//! App::new()
//!     .add_plugins(DefaultPlugins)
//!     .add_plugins(BattleFogPlugin)
//!     .insert_resource(MapDescriptor::default())
//!     .run();
//! ```

use bevy::app::{App, Plugin, PostUpdate, PreUpdate, Update};
use bevy::asset::Assets;
use bevy::image::Image;
use bevy::prelude::{IntoScheduleConfigs, SystemSet, resource_exists};

pub mod coords;
pub mod grid;
pub mod paint;
pub mod persistence;
pub mod prelude;
pub mod render;
pub mod settings;
pub mod spawn_points;
pub mod storage;
pub mod vision;

use crate::grid::{FogGrid, FogVersionChanged, init_fog_on_descriptor_change};
use crate::paint::{PaintStroke, apply_paint_strokes};
use crate::persistence::{
    FogLoaded, FogSaved, LoadFogRequest, SaveFogRequest, apply_remote_fog, load_fog_system,
    save_fog_system,
};
use crate::render::{FogOverlay2d, FogPlane3d, redraw_overlay_2d, refresh_fog_plane_3d};
use crate::settings::{FogAuthority, FogMapSettings, MapDescriptor};
use crate::spawn_points::{
    PlaceSpawnPoint, SpawnPoint, SpawnPointManager, SpawnPointPlaced, place_spawn_points,
};
use crate::vision::{VisionOcclusion, VisionSource, resolve_vision};

/// Execution order of the fog systems within a frame: host edits land
/// first, vision refreshes over them, sync applies whatever arrived
/// last, and rendering observes the settled version.
/// 帧内雾效系统的执行顺序：编辑、视野、同步、渲染
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FogSystems {
    /// 主持人笔刷与出生点编辑
    /// Host brush and spawn point edits
    Paint,
    /// 视野解算
    /// Vision resolution
    Vision,
    /// 持久化与远端快照
    /// Persistence and remote snapshots
    Sync,
    /// 版本发布与重绘
    /// Version publishing and redraws
    Render,
}

/// Installs the fog grid, its editing and vision systems, persistence
/// and both renderers. The grid stays uninitialized (and everything
/// draws nothing) until a [`MapDescriptor`] resource is inserted.
/// 安装雾效网格与全部系统；插入 [`MapDescriptor`] 前网格保持未初始化
pub struct BattleFogPlugin;

impl Plugin for BattleFogPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<FogGrid>()
            .init_resource::<FogMapSettings>()
            .init_resource::<FogAuthority>()
            .init_resource::<SpawnPointManager>()
            .init_resource::<VisionOcclusion>()
            .register_type::<FogGrid>()
            .register_type::<FogMapSettings>()
            .register_type::<FogAuthority>()
            .register_type::<MapDescriptor>()
            .register_type::<SpawnPointManager>()
            .register_type::<SpawnPoint>()
            .register_type::<VisionSource>()
            .register_type::<FogOverlay2d>()
            .register_type::<FogPlane3d>()
            .add_event::<PaintStroke>()
            .add_event::<FogVersionChanged>()
            .add_event::<PlaceSpawnPoint>()
            .add_event::<SpawnPointPlaced>()
            .add_event::<SaveFogRequest>()
            .add_event::<LoadFogRequest>()
            .add_event::<FogSaved>()
            .add_event::<FogLoaded>()
            .configure_sets(
                Update,
                (FogSystems::Paint, FogSystems::Vision, FogSystems::Sync).chain(),
            )
            .configure_sets(PostUpdate, FogSystems::Render)
            .add_systems(PreUpdate, init_fog_on_descriptor_change)
            .add_systems(
                Update,
                (
                    (apply_paint_strokes, place_spawn_points).in_set(FogSystems::Paint),
                    resolve_vision.in_set(FogSystems::Vision),
                    (save_fog_system, load_fog_system, apply_remote_fog)
                        .in_set(FogSystems::Sync),
                ),
            )
            .add_systems(
                PostUpdate,
                (
                    grid::publish_version_changes,
                    redraw_overlay_2d,
                    refresh_fog_plane_3d.run_if(resource_exists::<Assets<Image>>),
                )
                    .in_set(FogSystems::Render),
            );
    }
}
