//! Draw list assembly and the single offscreen render pass.
//!
//! Draw order is `(sort_order, hierarchy order)`. Meshes are depth-tested
//! against each other; sprites are blended in order without depth, so sort
//! keys alone decide how decorations layer against the subject.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use std::collections::BTreeMap;
use wgpu::util::DeviceExt;
use iconstage_assets::{AssetStore, Mesh, Sprite};
use iconstage_common::{Color, EntityId, MeshHandle, SpriteHandle};
use iconstage_kernel::{Drawable, Scene, Shape};

use crate::camera::Camera;
use crate::device::{Device, Frame};
use crate::error::RenderError;
use crate::gpu::{GpuContext, COLOR_FORMAT, DEPTH_FORMAT};
use crate::shaders;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct Uniforms {
    view_proj: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct MeshVertex {
    position: [f32; 3],
    normal: [f32; 3],
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct SpriteVertex {
    position: [f32; 2],
    uv: [f32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct InstanceData {
    model_0: [f32; 4],
    model_1: [f32; 4],
    model_2: [f32; 4],
    model_3: [f32; 4],
    color: [f32; 4],
}

impl InstanceData {
    fn new(model: Mat4, color: Color) -> Self {
        let cols = model.to_cols_array_2d();
        Self {
            model_0: cols[0],
            model_1: cols[1],
            model_2: cols[2],
            model_3: cols[3],
            color: [color.r, color.g, color.b, color.a],
        }
    }
}

/// Unit quad centered on the origin; v grows downwards.
#[rustfmt::skip]
const SPRITE_QUAD: [SpriteVertex; 6] = [
    SpriteVertex { position: [-0.5,  0.5], uv: [0.0, 0.0] },
    SpriteVertex { position: [ 0.5,  0.5], uv: [1.0, 0.0] },
    SpriteVertex { position: [ 0.5, -0.5], uv: [1.0, 1.0] },
    SpriteVertex { position: [-0.5,  0.5], uv: [0.0, 0.0] },
    SpriteVertex { position: [ 0.5, -0.5], uv: [1.0, 1.0] },
    SpriteVertex { position: [-0.5, -0.5], uv: [0.0, 1.0] },
];

const INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
    2 => Float32x4,
    3 => Float32x4,
    4 => Float32x4,
    5 => Float32x4,
    6 => Float32x4,
];

fn instance_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<InstanceData>() as u64,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &INSTANCE_ATTRIBUTES,
    }
}

/// Mesh and sprite pipelines for one multisample count.
#[derive(Debug)]
pub struct Pipelines {
    mesh: wgpu::RenderPipeline,
    sprite: wgpu::RenderPipeline,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
}

impl Pipelines {
    pub fn new(device: &wgpu::Device, samples: u32) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("icon_uniform_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sprite_texture_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let multisample = wgpu::MultisampleState {
            count: samples,
            mask: !0,
            alpha_to_coverage_enabled: false,
        };
        let color_target = [Some(wgpu::ColorTargetState {
            format: COLOR_FORMAT,
            blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
            write_mask: wgpu::ColorWrites::ALL,
        })];

        // Meshes: depth-tested against each other.
        let mesh_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mesh_pipeline_layout"),
            bind_group_layouts: &[&uniform_layout],
            push_constant_ranges: &[],
        });
        let mesh_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mesh_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::MESH_SHADER.into()),
        });
        let mesh = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("mesh_pipeline"),
            layout: Some(&mesh_layout),
            vertex: wgpu::VertexState {
                module: &mesh_shader,
                entry_point: Some("vs_mesh"),
                compilation_options: Default::default(),
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<MeshVertex>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![
                            0 => Float32x3,
                            1 => Float32x3,
                        ],
                    },
                    instance_layout(),
                ],
            },
            fragment: Some(wgpu::FragmentState {
                module: &mesh_shader,
                entry_point: Some("fs_mesh"),
                compilation_options: Default::default(),
                targets: &color_target,
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample,
            multiview: None,
            cache: None,
        });

        // Sprites: no depth test or write, painted in draw order.
        let sprite_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sprite_pipeline_layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });
        let sprite_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sprite_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::SPRITE_SHADER.into()),
        });
        let sprite = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("sprite_pipeline"),
            layout: Some(&sprite_layout),
            vertex: wgpu::VertexState {
                module: &sprite_shader,
                entry_point: Some("vs_sprite"),
                compilation_options: Default::default(),
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<SpriteVertex>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![
                            0 => Float32x2,
                            1 => Float32x2,
                        ],
                    },
                    instance_layout(),
                ],
            },
            fragment: Some(wgpu::FragmentState {
                module: &sprite_shader,
                entry_point: Some("fs_sprite"),
                compilation_options: Default::default(),
                targets: &color_target,
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample,
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("sprite_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        tracing::debug!(samples, "built icon pipelines");
        Self {
            mesh,
            sprite,
            uniform_layout,
            texture_layout,
            sampler,
        }
    }
}

/// Counts of what one draw call submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub meshes: usize,
    pub sprites: usize,
    pub triangles: usize,
}

struct DrawItem {
    id: EntityId,
    drawable: Drawable,
    world: Mat4,
}

enum DrawCall {
    Mesh { handle: MeshHandle, instance: u32 },
    Sprite { handle: SpriteHandle, instance: u32 },
}

/// Enabled drawables visible to `camera`, in draw order.
fn draw_list(scene: &Scene, camera: &Camera) -> Result<Vec<DrawItem>, RenderError> {
    let mut items = Vec::new();
    for id in scene.traverse() {
        let Some(node) = scene.get(id) else { continue };
        if !camera.culling_mask.contains(node.channel) {
            continue;
        }
        let Some(drawable) = node.drawable else { continue };
        if !drawable.enabled || !drawable.has_geometry() {
            continue;
        }
        items.push(DrawItem {
            id,
            drawable,
            world: scene.world_matrix(id)?,
        });
    }
    // Stable: equal orders keep hierarchy order.
    items.sort_by_key(|item| item.drawable.sort_order);
    Ok(items)
}

/// Flat-shaded vertex list: every triangle gets its face normal.
fn mesh_vertices(mesh: &Mesh) -> Vec<MeshVertex> {
    let mut vertices = Vec::with_capacity(mesh.triangle_count() * 3);
    for [a, b, c] in mesh.triangles() {
        let normal = (b - a).cross(c - a).normalize_or_zero().to_array();
        vertices.extend([a, b, c].map(|p| MeshVertex {
            position: p.to_array(),
            normal,
        }));
    }
    vertices
}

fn upload_sprite(gpu: &GpuContext, pipelines: &Pipelines, sprite: &Sprite) -> wgpu::BindGroup {
    let (width, height) = sprite.image.dimensions();
    let texture = gpu.device.create_texture_with_data(
        &gpu.queue,
        &wgpu::TextureDescriptor {
            label: Some("sprite_texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        sprite.image.as_raw(),
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("sprite_bind_group"),
        layout: &pipelines.texture_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&pipelines.sampler),
            },
        ],
    })
}

/// Clear value for a straight-alpha color in the premultiplied target.
fn clear_value(c: Color) -> wgpu::Color {
    wgpu::Color {
        r: f64::from(c.r * c.a),
        g: f64::from(c.g * c.a),
        b: f64::from(c.b * c.a),
        a: f64::from(c.a),
    }
}

/// Clear the active target and draw every enabled drawable visible to
/// `camera` in one render pass. Submits the work without waiting for it.
pub fn draw(
    device: &mut Device,
    scene: &Scene,
    assets: &AssetStore,
    camera: &Camera,
    camera_world: &Mat4,
) -> Result<DrawStats, RenderError> {
    let target_id = device
        .active()
        .ok_or_else(|| RenderError::render("no offscreen target is bound"))?;
    let items = draw_list(scene, camera)?;
    let Frame {
        gpu,
        target,
        pipelines,
    } = device
        .frame(target_id)
        .ok_or_else(|| RenderError::render("offscreen target is not allocated"))?;

    let mut mesh_buffers: BTreeMap<MeshHandle, (wgpu::Buffer, u32)> = BTreeMap::new();
    let mut sprite_groups: BTreeMap<SpriteHandle, wgpu::BindGroup> = BTreeMap::new();
    let mut instances = Vec::with_capacity(items.len());
    let mut calls = Vec::with_capacity(items.len());
    let mut stats = DrawStats::default();

    for item in &items {
        let instance = instances.len() as u32;
        match item.drawable.shape {
            Shape::Mesh(handle) => {
                let mesh = assets.mesh(handle).ok_or_else(|| {
                    RenderError::render(format!("mesh {handle:?} on node {:?} is not registered", item.id))
                })?;
                let vertices = mesh_vertices(mesh);
                if vertices.is_empty() {
                    continue;
                }
                stats.meshes += 1;
                stats.triangles += vertices.len() / 3;
                mesh_buffers.entry(handle).or_insert_with(|| {
                    let buffer = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("mesh_vertex_buffer"),
                        contents: bytemuck::cast_slice(&vertices),
                        usage: wgpu::BufferUsages::VERTEX,
                    });
                    (buffer, vertices.len() as u32)
                });
                instances.push(InstanceData::new(item.world, item.drawable.color));
                calls.push(DrawCall::Mesh { handle, instance });
            }
            Shape::Sprite(handle) => {
                let sprite = assets.sprite(handle).ok_or_else(|| {
                    RenderError::render(format!("sprite {handle:?} on node {:?} is not registered", item.id))
                })?;
                let (width, height) = sprite.image.dimensions();
                if width == 0 || height == 0 {
                    continue;
                }
                stats.sprites += 1;
                sprite_groups
                    .entry(handle)
                    .or_insert_with(|| upload_sprite(gpu, pipelines, sprite));
                let size = sprite.size();
                let model = item.world * Mat4::from_scale(Vec3::new(size.x, size.y, 1.0));
                instances.push(InstanceData::new(model, item.drawable.color));
                calls.push(DrawCall::Sprite { handle, instance });
            }
            Shape::Empty => {}
        }
    }

    let view_proj = camera.view_projection(camera_world);
    let uniform_buffer = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("icon_uniforms"),
        contents: bytemuck::bytes_of(&Uniforms {
            view_proj: view_proj.to_cols_array_2d(),
        }),
        usage: wgpu::BufferUsages::UNIFORM,
    });
    let uniform_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("icon_uniform_group"),
        layout: &pipelines.uniform_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: uniform_buffer.as_entire_binding(),
        }],
    });
    let instance_buffer = (!instances.is_empty()).then(|| {
        gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("icon_instances"),
            contents: bytemuck::cast_slice(&instances),
            usage: wgpu::BufferUsages::VERTEX,
        })
    });
    let quad_buffer = (!sprite_groups.is_empty()).then(|| {
        gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sprite_quad"),
            contents: bytemuck::cast_slice(&SPRITE_QUAD),
            usage: wgpu::BufferUsages::VERTEX,
        })
    });

    let color_view = target.color.create_view(&wgpu::TextureViewDescriptor::default());
    let msaa_view = target
        .multisampled
        .as_ref()
        .map(|t| t.create_view(&wgpu::TextureViewDescriptor::default()));
    let depth_view = target.depth.create_view(&wgpu::TextureViewDescriptor::default());
    let (view, resolve_target) = match &msaa_view {
        Some(msaa) => (msaa, Some(&color_view)),
        None => (&color_view, None),
    };

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("icon_encoder"),
        });
    {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("icon_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear_value(camera.clear_color)),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });

        if let Some(instance_buffer) = &instance_buffer {
            for call in &calls {
                match call {
                    DrawCall::Mesh { handle, instance } => {
                        let (buffer, count) = &mesh_buffers[handle];
                        pass.set_pipeline(&pipelines.mesh);
                        pass.set_bind_group(0, &uniform_group, &[]);
                        pass.set_vertex_buffer(0, buffer.slice(..));
                        pass.set_vertex_buffer(1, instance_buffer.slice(..));
                        pass.draw(0..*count, *instance..*instance + 1);
                    }
                    DrawCall::Sprite { handle, instance } => {
                        let Some(quad) = &quad_buffer else { continue };
                        pass.set_pipeline(&pipelines.sprite);
                        pass.set_bind_group(0, &uniform_group, &[]);
                        pass.set_bind_group(1, &sprite_groups[handle], &[]);
                        pass.set_vertex_buffer(0, quad.slice(..));
                        pass.set_vertex_buffer(1, instance_buffer.slice(..));
                        pass.draw(0..SPRITE_QUAD.len() as u32, *instance..*instance + 1);
                    }
                }
            }
        }
    }
    gpu.queue.submit(std::iter::once(encoder.finish()));

    tracing::debug!(?stats, samples = target.samples(), "draw submitted");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::test_gpu;
    use iconstage_common::{Channel, ChannelMask, Transform};
    use image::RgbaImage;

    fn camera(mask: ChannelMask) -> Camera {
        Camera {
            half_height: 2.0,
            aspect: 1.0,
            near: 0.01,
            far: 1000.0,
            clear_color: Color::CLEAR,
            culling_mask: mask,
            target: None,
        }
    }

    fn camera_world() -> Mat4 {
        Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0))
    }

    fn cube_scene(assets: &mut AssetStore) -> (Scene, EntityId) {
        let mut scene = Scene::new();
        let cube = assets.register_mesh(Mesh::cube());
        let id = scene.spawn("cube", Transform::from_position(Vec3::new(0.0, 0.0, -5.0)));
        scene.set_drawable(id, Some(Drawable::mesh(cube, Color::WHITE))).unwrap();
        (scene, id)
    }

    /// Draw into a fresh single-sampled `size`×`size` target and read it back.
    fn render(scene: &Scene, assets: &AssetStore, camera: &Camera, size: u32) -> Option<(DrawStats, RgbaImage)> {
        let mut device = Device::new(test_gpu()?);
        let target = device.create_target(size, size, 1);
        device.bind(Some(target));
        let stats = draw(&mut device, scene, assets, camera, &camera_world()).unwrap();
        Some((stats, device.read_target(target).unwrap()))
    }

    #[test]
    fn draw_list_filters_and_orders() {
        let mut assets = AssetStore::new();
        let (mut scene, cube) = cube_scene(&mut assets);
        let sprite = assets.register_sprite(Sprite::new("s", RgbaImage::new(2, 2)));
        let back = scene.spawn("back", Transform::default());
        scene.set_drawable(back, Some(Drawable::sprite(sprite, Color::WHITE, -100))).unwrap();
        let anchor = scene.spawn("anchor", Transform::default());
        scene.set_drawable(anchor, Some(Drawable::placeholder(0))).unwrap();
        let hidden = scene.spawn("hidden", Transform::default());
        scene.set_drawable(hidden, Some(Drawable::mesh(MeshHandle(1), Color::WHITE))).unwrap();
        scene.set_channel(hidden, Channel::new(31).unwrap()).unwrap();

        let order: Vec<_> = draw_list(&scene, &camera(ChannelMask::only(Channel::DEFAULT)))
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(order, vec![back, cube]);
    }

    #[test]
    fn disabled_drawables_are_not_listed() {
        let mut assets = AssetStore::new();
        let (mut scene, id) = cube_scene(&mut assets);
        let mut d = scene.get(id).unwrap().drawable.unwrap();
        d.enabled = false;
        scene.set_drawable(id, Some(d)).unwrap();
        assert!(draw_list(&scene, &camera(ChannelMask::ALL)).unwrap().is_empty());
    }

    #[test]
    fn flat_normals_per_face() {
        let vertices = mesh_vertices(&Mesh::cube());
        assert_eq!(vertices.len(), 36);
        for tri in vertices.chunks_exact(3) {
            assert!(tri.iter().all(|v| v.normal == tri[0].normal));
            assert!((Vec3::from_array(tri[0].normal).length() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn clear_value_is_premultiplied() {
        let c = clear_value(Color::rgba(1.0, 0.5, 0.0, 0.5));
        assert_eq!((c.r, c.g, c.b, c.a), (0.5, 0.25, 0.0, 0.5));
    }

    #[test]
    fn cube_covers_center_only() {
        let mut assets = AssetStore::new();
        let (scene, _) = cube_scene(&mut assets);
        let Some((stats, img)) = render(&scene, &assets, &camera(ChannelMask::ALL), 64) else { return };
        assert_eq!(stats.meshes, 1);
        assert_eq!(stats.triangles, 12);
        // Unit cube spans 16 px of 64 at zoom 2: columns 24..40.
        assert_eq!(img.get_pixel(32, 32).0[3], 255);
        assert_eq!(img.get_pixel(23, 32).0[3], 0);
        assert_eq!(img.get_pixel(24, 32).0[3], 255);
        assert_eq!(img.get_pixel(39, 32).0[3], 255);
        assert_eq!(img.get_pixel(40, 32).0[3], 0);
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn culled_channels_are_not_drawn() {
        let mut assets = AssetStore::new();
        let (scene, _) = cube_scene(&mut assets);
        let mask = ChannelMask::only(Channel::new(31).unwrap());
        let Some((stats, img)) = render(&scene, &assets, &camera(mask), 16) else { return };
        assert_eq!(stats, DrawStats::default());
        assert_eq!(img.get_pixel(8, 8).0, [0, 0, 0, 0]);
    }

    #[test]
    fn unregistered_mesh_is_an_error() {
        let Some(gpu) = test_gpu() else { return };
        let mut scene = Scene::new();
        let id = scene.spawn("ghost", Transform::default());
        scene
            .set_drawable(id, Some(Drawable::mesh(MeshHandle(99), Color::WHITE)))
            .unwrap();
        let mut device = Device::new(gpu);
        let target = device.create_target(8, 8, 1);
        device.bind(Some(target));
        let err = draw(&mut device, &scene, &AssetStore::new(), &camera(ChannelMask::ALL), &camera_world())
            .unwrap_err();
        assert!(matches!(err, RenderError::Render(_)));
    }

    #[test]
    fn nothing_bound_is_an_error() {
        let Some(gpu) = test_gpu() else { return };
        let mut device = Device::new(gpu);
        let err = draw(&mut device, &Scene::new(), &AssetStore::new(), &camera(ChannelMask::ALL), &camera_world())
            .unwrap_err();
        assert!(err.to_string().contains("no offscreen target"));
    }

    #[test]
    fn sprite_sort_order_beats_depth() {
        let mut assets = AssetStore::new();
        let (mut scene, _) = cube_scene(&mut assets);
        let red = assets.register_sprite(Sprite::new(
            "red",
            RgbaImage::from_pixel(8, 8, image::Rgba([255, 0, 0, 255])),
        ));
        // Behind the cube in sort order, yet closer to the camera.
        let bg = scene.spawn(
            "bg",
            Transform {
                position: Vec3::new(0.0, 0.0, -8.0),
                scale: Vec3::splat(100.0),
                ..Transform::default()
            },
        );
        scene.set_drawable(bg, Some(Drawable::sprite(red, Color::WHITE, -100))).unwrap();

        let Some((stats, img)) = render(&scene, &assets, &camera(ChannelMask::ALL), 32) else { return };
        assert_eq!(stats.sprites, 1);
        let center = img.get_pixel(16, 16).0;
        assert_eq!(center[0], center[1]);
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn sprite_tint_and_transparency() {
        let mut assets = AssetStore::new();
        let mut img = RgbaImage::from_pixel(4, 4, image::Rgba([255, 255, 255, 255]));
        for x in 0..4 {
            img.put_pixel(x, 0, image::Rgba([0, 0, 0, 0]));
            img.put_pixel(x, 1, image::Rgba([0, 0, 0, 0]));
        }
        let sprite = assets.register_sprite(Sprite::new("half", img));
        let mut scene = Scene::new();
        let id = scene.spawn(
            "s",
            Transform {
                position: Vec3::new(0.0, 0.0, -5.0),
                scale: Vec3::splat(100.0),
                ..Transform::default()
            },
        );
        scene
            .set_drawable(id, Some(Drawable::sprite(sprite, Color::rgb(0.0, 1.0, 0.0), 0)))
            .unwrap();
        let Some((_, out)) = render(&scene, &assets, &camera(ChannelMask::ALL), 40) else { return };
        // Top rows of the sprite are transparent, bottom rows tinted green.
        assert_eq!(out.get_pixel(20, 2).0, [0, 0, 0, 0]);
        assert_eq!(out.get_pixel(20, 38).0, [0, 255, 0, 255]);
    }
}
