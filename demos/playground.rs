use bevy::{
    color::palettes::css::{GOLD, RED},
    prelude::*,
    window::PrimaryWindow,
};
use bevy_battle_fog::prelude::*;

fn main() {
    App::new()
        .insert_resource(ClearColor(Color::srgb(0.18, 0.2, 0.23)))
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Battle Fog Playground".into(),
                resolution: (1280.0, 720.0).into(),
                ..default()
            }),
            ..default()
        }))
        .add_plugins(BattleFogPlugin)
        // 1920x1280 map, 40px cells - the grid initializes from this.
        .insert_resource(MapDescriptor::default())
        .add_systems(Startup, (setup, setup_ui))
        .add_systems(
            Update,
            (
                patrol_tokens,
                paint_with_mouse,
                place_spawn_on_key,
                toggle_and_bulk_keys,
                update_status_text,
            ),
        )
        .run();
}

/// 来回巡逻的视野令牌标记
/// Marker for a vision token patrolling back and forth
#[derive(Component)]
struct Patrol {
    direction: f32,
}

/// 状态栏文本标记
/// Status bar text marker
#[derive(Component)]
struct StatusText;

fn setup(mut commands: Commands, descriptor: Res<MapDescriptor>) {
    commands.spawn((
        Camera2d,
        Transform::from_xyz(descriptor.width_px / 2.0, descriptor.height_px / 2.0, 0.0),
    ));

    // Checkerboard ground so revealed areas are obvious.
    let cell = descriptor.cell_size_px;
    for row in 0..descriptor.rows() {
        for col in 0..descriptor.cols() {
            let shade = if (col + row) % 2 == 0 { 0.55 } else { 0.65 };
            commands.spawn((
                Sprite {
                    color: Color::srgb(shade, shade, shade),
                    custom_size: Some(Vec2::splat(cell)),
                    ..default()
                },
                Transform::from_translation(
                    cell_to_map_center(IVec2::new(col as i32, row as i32), cell).extend(0.0),
                ),
            ));
        }
    }

    // Two tokens with different vision shapes.
    commands.spawn((
        Sprite {
            color: GOLD.into(),
            custom_size: Some(Vec2::splat(24.0)),
            ..default()
        },
        Transform::from_xyz(400.0, 400.0, 10.0),
        VisionSource::circular(160.0),
        Patrol { direction: 1.0 },
    ));
    commands.spawn((
        Sprite {
            color: RED.into(),
            custom_size: Some(Vec2::splat(24.0)),
            ..default()
        },
        Transform::from_xyz(1200.0, 800.0, 10.0),
        VisionSource::cone(240.0, 0.0, std::f32::consts::FRAC_PI_2),
        Patrol { direction: -1.0 },
    ));

    // The flat fog overlay sits above everything on this board.
    commands.spawn((FogOverlay2d::default(), Transform::default()));
}

fn setup_ui(mut commands: Commands) {
    commands.spawn((
        Text::new(""),
        Node {
            position_type: PositionType::Absolute,
            top: Val::Px(8.0),
            left: Val::Px(8.0),
            ..default()
        },
        StatusText,
    ));
}

fn patrol_tokens(
    time: Res<Time>,
    descriptor: Res<MapDescriptor>,
    mut tokens: Query<(&mut Transform, &mut Patrol, &mut VisionSource)>,
) {
    for (mut transform, mut patrol, mut vision) in tokens.iter_mut() {
        transform.translation.x += patrol.direction * 120.0 * time.delta_secs();
        if transform.translation.x < 100.0 || transform.translation.x > descriptor.width_px - 100.0
        {
            patrol.direction = -patrol.direction;
        }
        // Keep cone vision pointing along the walk.
        vision.facing = if patrol.direction > 0.0 {
            0.0
        } else {
            std::f32::consts::PI
        };
    }
}

/// 左键揭示，右键隐藏
/// Left mouse reveals, right mouse hides
fn paint_with_mouse(
    buttons: Res<ButtonInput<MouseButton>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    cameras: Query<(&Camera, &GlobalTransform)>,
    mut strokes: EventWriter<PaintStroke>,
) {
    let mode = if buttons.pressed(MouseButton::Left) {
        PaintMode::Reveal
    } else if buttons.pressed(MouseButton::Right) {
        PaintMode::Hide
    } else {
        return;
    };
    let Ok(window) = windows.single() else {
        return;
    };
    let Some(cursor) = window.cursor_position() else {
        return;
    };
    let Ok((camera, camera_transform)) = cameras.single() else {
        return;
    };
    let Ok(map_pos) = camera.viewport_to_world_2d(camera_transform, cursor) else {
        return;
    };
    strokes.write(PaintStroke::new(vec![map_pos], 75.0, mode));
}

/// 按 S 在光标处放置出生点
/// Press S to drop a spawn point at the cursor
fn place_spawn_on_key(
    keys: Res<ButtonInput<KeyCode>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    cameras: Query<(&Camera, &GlobalTransform)>,
    mut placements: EventWriter<PlaceSpawnPoint>,
) {
    if !keys.just_pressed(KeyCode::KeyS) {
        return;
    }
    let Ok(window) = windows.single() else {
        return;
    };
    let Some(cursor) = window.cursor_position() else {
        return;
    };
    let Ok((camera, camera_transform)) = cameras.single() else {
        return;
    };
    let Ok(map_pos) = camera.viewport_to_world_2d(camera_transform, cursor) else {
        return;
    };
    placements.write(PlaceSpawnPoint {
        x: map_pos.x,
        y: map_pos.y,
    });
}

/// F 开关雾效，R 全图重置，V 全图揭示
/// F toggles fog, R resets the map, V reveals everything
fn toggle_and_bulk_keys(
    keys: Res<ButtonInput<KeyCode>>,
    mut settings: ResMut<FogMapSettings>,
    mut grid: ResMut<FogGrid>,
) {
    if keys.just_pressed(KeyCode::KeyF) {
        settings.enabled = !settings.enabled;
    }
    if keys.just_pressed(KeyCode::KeyR) {
        grid.reset();
    }
    if keys.just_pressed(KeyCode::KeyV) {
        grid.reveal_all();
    }
}

fn update_status_text(
    grid: Res<FogGrid>,
    spawns: Res<SpawnPointManager>,
    mut texts: Query<&mut Text, With<StatusText>>,
) {
    let Ok(mut text) = texts.single_mut() else {
        return;
    };
    let explored = grid
        .cells()
        .iter()
        .filter(|state| **state != CellState::Hidden)
        .count();
    text.0 = format!(
        "fog v{} | {}/{} cells explored | {} spawn points\n\
         LMB reveal, RMB hide, S spawn point, F fog on/off, R reset, V reveal all",
        grid.version(),
        explored,
        grid.cells().len(),
        spawns.len()
    );
}
