use crate::grid::FogGrid;
use crate::render::state_alpha;
use crate::settings::FogMapSettings;
use bevy::asset::{Assets, Handle, RenderAssetUsages};
use bevy::image::{Image, ImageSampler};
use bevy::math::{UVec2, Vec2};
use bevy::pbr::StandardMaterial;
use bevy::prelude::{
    AlphaMode, Commands, Component, Entity, Mesh, Mesh3d, MeshMaterial3d, Meshable, Plane3d,
    Query, ReflectComponent, Res, ResMut,
};
use bevy::reflect::Reflect;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};

/// Anchor entity for the 3D fog plane. Spawn one with a `Transform`
/// placing the plane over the battle map (lift it slightly above the
/// ground mesh); the refresh system attaches an unlit alpha-blended quad
/// whose texture carries one texel per fog cell.
/// 3D 雾效平面的锚点实体，刷新系统为其挂载一张每格一个纹素的雾纹理
#[derive(Component, Debug, Default, Reflect)]
#[reflect(Component)]
pub struct FogPlane3d {
    /// 平面在世界空间中的尺寸（对应整张地图）
    /// World-space size of the plane, covering the whole map
    pub plane_size: Vec2,
    /// 上次上传纹理时的网格版本
    /// Grid version at the last texture upload
    last_version: Option<u64>,
    /// 当前纹理对应的网格尺寸，变化时重建纹理
    /// Grid dimensions behind the current texture, rebuilt on change
    grid_dims: UVec2,
    /// 当前的雾纹理句柄
    /// Handle of the live fog texture
    #[reflect(ignore)]
    image: Option<Handle<Image>>,
}

impl FogPlane3d {
    pub fn new(plane_size: Vec2) -> Self {
        Self {
            plane_size,
            last_version: None,
            grid_dims: UVec2::ZERO,
            image: None,
        }
    }

    /// 当前雾纹理，一格一个纹素
    /// The live fog texture, one texel per cell
    pub fn image(&self) -> Option<&Handle<Image>> {
        self.image.as_ref()
    }
}

/// Re-encodes the fog grid into the plane's texture when - and only
/// when - the grid version moved. Each cell becomes one RGBA8 texel:
/// the fog color with the cell state's opacity as alpha, so visible
/// cells are fully transparent. An uninitialized or disabled grid
/// uploads a fully transparent texture.
/// 仅当网格版本变化时把雾网格重新编码进平面纹理；每格一个纹素，
/// 透明度由格子状态决定
pub fn refresh_fog_plane_3d(
    mut commands: Commands,
    grid: Res<FogGrid>,
    settings: Res<FogMapSettings>,
    mut images: ResMut<Assets<Image>>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut planes: Query<(Entity, &mut FogPlane3d)>,
) {
    for (entity, mut plane) in planes.iter_mut() {
        if !settings.enabled {
            if plane.last_version.is_some() {
                if let Some(handle) = plane.image.as_ref()
                    && let Some(image) = images.get_mut(handle)
                {
                    clear_texture(image);
                }
                plane.last_version = None;
            }
            continue;
        }

        let dims = UVec2::new(grid.cols(), grid.rows());
        if plane.last_version == Some(grid.version()) && plane.grid_dims == dims {
            continue;
        }
        plane.last_version = Some(grid.version());

        if !grid.is_initialized() {
            if let Some(handle) = plane.image.as_ref()
                && let Some(image) = images.get_mut(handle)
            {
                clear_texture(image);
            }
            plane.grid_dims = dims;
            continue;
        }

        if plane.image.is_none() || plane.grid_dims != dims {
            let mut image = Image::new_fill(
                Extent3d {
                    width: dims.x,
                    height: dims.y,
                    depth_or_array_layers: 1,
                },
                TextureDimension::D2,
                &[0, 0, 0, 0],
                TextureFormat::Rgba8UnormSrgb,
                RenderAssetUsages::default(),
            );
            // Hard cell edges instead of fog bleeding between cells.
            image.sampler = ImageSampler::nearest();
            let handle = images.add(image);

            let material = materials.add(StandardMaterial {
                base_color_texture: Some(handle.clone()),
                alpha_mode: AlphaMode::Blend,
                unlit: true,
                ..Default::default()
            });
            let mesh = meshes.add(
                Plane3d::default()
                    .mesh()
                    .size(plane.plane_size.x, plane.plane_size.y),
            );
            commands
                .entity(entity)
                .insert((Mesh3d(mesh), MeshMaterial3d(material)));

            plane.image = Some(handle);
            plane.grid_dims = dims;
        }

        let Some(image) = plane.image.as_ref().and_then(|h| images.get_mut(h)) else {
            continue;
        };

        let srgb = settings.fog_color.to_srgba();
        let rgb = [
            (srgb.red * 255.0).round() as u8,
            (srgb.green * 255.0).round() as u8,
            (srgb.blue * 255.0).round() as u8,
        ];
        let cells = grid.cells();
        let mut texels: Vec<[u8; 4]> = Vec::with_capacity(cells.len());
        // Texel (col, row) sits at index row * cols + col, matching the
        // grid layout; row 0 lands on the plane's -Z edge.
        for state in cells {
            let alpha = (state_alpha(*state, &settings) * 255.0).round() as u8;
            texels.push([rgb[0], rgb[1], rgb[2], alpha]);
        }
        image.data = Some(bytemuck::cast_slice(&texels).to_vec());
    }
}

fn clear_texture(image: &mut Image) {
    let len = (image.width() * image.height() * 4) as usize;
    image.data = Some(vec![0; len]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellState;
    use crate::settings::MapDescriptor;
    use bevy::app::{App, Update};

    fn plane_app(descriptor: Option<MapDescriptor>) -> App {
        let mut app = App::new();
        let mut grid = FogGrid::default();
        if let Some(descriptor) = descriptor {
            grid.init(&descriptor).unwrap();
        }
        app.insert_resource(grid)
            .insert_resource(FogMapSettings::default())
            .insert_resource(Assets::<Image>::default())
            .insert_resource(Assets::<Mesh>::default())
            .insert_resource(Assets::<StandardMaterial>::default())
            .add_systems(Update, refresh_fog_plane_3d);
        app.world_mut()
            .spawn(FogPlane3d::new(Vec2::new(19.2, 12.8)));
        app
    }

    fn plane_texel(app: &mut App, col: u32, row: u32) -> [u8; 4] {
        let mut query = app.world_mut().query::<&FogPlane3d>();
        let plane = query.single(app.world()).unwrap();
        let handle = plane.image().cloned().unwrap();
        let cols = plane.grid_dims.x;
        let images = app.world().resource::<Assets<Image>>();
        let data = images.get(&handle).unwrap().data.as_ref().unwrap();
        let at = ((row * cols + col) * 4) as usize;
        [data[at], data[at + 1], data[at + 2], data[at + 3]]
    }

    #[test]
    fn texture_matches_grid_dimensions_and_opacities() {
        let descriptor = MapDescriptor {
            width_px: 200.0,
            height_px: 120.0,
            cell_size_px: 40.0,
        };
        let mut app = plane_app(Some(descriptor));
        app.world_mut()
            .resource_mut::<FogGrid>()
            .set_region(|col, row, _| col == 0 && row == 0, CellState::Visible);
        app.update();

        {
            let mut query = app.world_mut().query::<&FogPlane3d>();
            let plane = query.single(app.world()).unwrap();
            assert_eq!(plane.grid_dims, UVec2::new(5, 3));
        }
        // Default fog color is black; visible is transparent, hidden 0.85.
        assert_eq!(plane_texel(&mut app, 0, 0), [0, 0, 0, 0]);
        assert_eq!(plane_texel(&mut app, 1, 0), [0, 0, 0, 217]);
        assert_eq!(plane_texel(&mut app, 4, 2), [0, 0, 0, 217]);
    }

    #[test]
    fn unchanged_version_skips_reupload() {
        let mut app = plane_app(Some(MapDescriptor::default()));
        app.update();
        let version_before = {
            let mut query = app.world_mut().query::<&FogPlane3d>();
            query.single(app.world()).unwrap().last_version
        };
        app.update();
        let mut query = app.world_mut().query::<&FogPlane3d>();
        let plane = query.single(app.world()).unwrap();
        assert_eq!(plane.last_version, version_before);
        assert_eq!(plane.last_version, Some(0));
    }

    #[test]
    fn explored_cells_use_explored_opacity_after_update() {
        let mut app = plane_app(Some(MapDescriptor::default()));
        app.update();
        app.world_mut()
            .resource_mut::<FogGrid>()
            .set_region(|col, row, _| col == 2 && row == 2, CellState::Explored);
        app.update();
        // 0.3 * 255 rounds to 77.
        assert_eq!(plane_texel(&mut app, 2, 2)[3], 77);
    }

    #[test]
    fn uninitialized_grid_attaches_no_texture() {
        let mut app = plane_app(None);
        app.update();
        let mut query = app.world_mut().query::<&FogPlane3d>();
        let plane = query.single(app.world()).unwrap();
        assert!(plane.image().is_none());
    }
}
