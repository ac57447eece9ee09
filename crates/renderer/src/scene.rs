//! The minimal scene: one fly camera, one static textured mesh, a handful of
//! point lights, plus the reload queues that keep the mesh and textures in
//! sync with disk.

use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::Context;
use asset::{
    mesh::MaterialRange,
    obj::{ParseWarning, ParsedObj, load_obj_from_path},
    texture::{TextureImage, library_key},
    watch::{FileWatch, ReloadQueue, ReloadUpdate, watch_file},
};
use bytemuck::{Pod, Zeroable};
use corelib::{
    Mat4, Vec3,
    camera::FlyCamera,
    light::{MAX_POINT_LIGHTS, PointLight, active_lights},
};
use wgpu::{BindGroup, Buffer, RenderPass, RenderPipeline};

use crate::{
    GpuState,
    lowres::{COLOR_FORMAT, DEPTH_FORMAT, INTERNAL_RESOLUTION},
    mesh::{GpuMesh, MESH_VERTEX_LAYOUT},
    texture::{TextureLibrary, TextureUploader},
};

pub const LEVEL_LABEL: &str = "level";

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PointLightUniform {
    pub position: [f32; 3],
    pub radius: f32,
    pub colour: [f32; 3],
    _pad: f32,
}

impl From<&PointLight> for PointLightUniform {
    fn from(light: &PointLight) -> Self {
        Self {
            position: light.position.to_array(),
            radius: light.radius,
            colour: light.colour.to_array(),
            _pad: 0.0,
        }
    }
}

/// Mirrors `SceneUniforms` in `static.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SceneUniforms {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    pub camera_pos: [f32; 3],
    pub ambient: f32,
    pub light_count: u32,
    _pad: [u32; 3],
    pub lights: [PointLightUniform; MAX_POINT_LIGHTS],
}

impl SceneUniforms {
    /// Pack camera, model and lights. Lights past [`MAX_POINT_LIGHTS`] are
    /// ignored.
    pub fn new(camera: &FlyCamera, model: Mat4, lights: &[PointLight], ambient: f32) -> Self {
        let active = active_lights(lights);
        let mut packed = [PointLightUniform::default(); MAX_POINT_LIGHTS];
        for (slot, light) in packed.iter_mut().zip(active) {
            *slot = light.into();
        }
        Self {
            projection: camera.projection.to_cols_array_2d(),
            view: camera.view().to_cols_array_2d(),
            model: model.to_cols_array_2d(),
            camera_pos: camera.position.to_array(),
            ambient,
            light_count: active.len() as u32,
            _pad: [0; 3],
            lights: packed,
        }
    }
}

/// One indexed draw with one bound texture.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawCall<T> {
    pub texture: T,
    pub indices: Range<u32>,
}

/// Turn material ranges into draws. Ranges whose material has no texture, or
/// that cover no indices, are skipped.
pub fn plan_draws<T>(
    materials: &[MaterialRange],
    mut resolve: impl FnMut(&str) -> Option<T>,
) -> Vec<DrawCall<T>> {
    materials
        .iter()
        .filter(|range| !range.is_empty())
        .filter_map(|range| {
            resolve(&range.name).map(|texture| DrawCall {
                texture,
                indices: range.indices(),
            })
        })
        .collect()
}

/// What to load into a [`Scene`].
#[derive(Clone, Debug)]
pub struct SceneDesc {
    pub mesh: PathBuf,
    pub textures: Vec<PathBuf>,
    pub model: Mat4,
    pub camera: FlyCamera,
    pub lights: Vec<PointLight>,
    pub ambient: f32,
}

impl SceneDesc {
    /// The bundled level under `root`.
    pub fn jam_level(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let textures = ["wall_stone", "wall_plain", "roof_wood", "floor_tiled"]
            .iter()
            .map(|name| root.join("textures").join(format!("{name}.png")))
            .collect();
        Self {
            mesh: root.join("meshes").join("floor1.obj"),
            textures,
            model: Mat4::IDENTITY,
            camera: FlyCamera::jam_default(INTERNAL_RESOLUTION),
            lights: vec![
                PointLight::new(Vec3::new(1.0, 0.0, -4.0), Vec3::new(1.0, 0.85, 0.5), 3.0),
                PointLight::new(Vec3::new(-5.7, -0.6, -6.1), Vec3::new(0.6, 0.88, 1.0), 5.0),
            ],
            ambient: 0.05,
        }
    }
}

pub struct StaticMesh {
    pub model: Mat4,
    pub mesh: GpuMesh,
}

pub fn log_warnings(warnings: &[ParseWarning]) {
    for warning in warnings {
        log::warn!("{warning}");
    }
}

fn log_unassigned(parsed: &ParsedObj) {
    let unassigned = parsed.mesh.unassigned_range();
    if !unassigned.is_empty() {
        log::debug!(
            "{} indices precede the first usemtl and are not drawn",
            unassigned.len()
        );
    }
}

pub struct Scene {
    pub camera: FlyCamera,
    level: StaticMesh,
    lights: Vec<PointLight>,
    ambient: f32,
    textures: TextureLibrary,
    uploader: TextureUploader,
    pipeline: RenderPipeline,
    uniform_buffer: Buffer,
    uniform_bg: BindGroup,
    mesh_reloads: ReloadQueue<String, ParsedObj>,
    texture_reloads: ReloadQueue<String, TextureImage>,
    watches: Vec<FileWatch>,
}

impl Scene {
    /// Load everything `desc` names and build the lit pipeline. With `watch`
    /// set, the mesh and every texture are watched for changes.
    pub fn build(gpu: &GpuState, desc: &SceneDesc, watch: bool) -> anyhow::Result<Self> {
        let device = &gpu.device;

        let parsed = load_obj_from_path(&desc.mesh)?;
        log_warnings(&parsed.warnings);
        log_unassigned(&parsed);
        log::info!(
            "Loaded mesh {} ({} vertices, {} materials)",
            desc.mesh.display(),
            parsed.mesh.vertices.len(),
            parsed.mesh.materials.len()
        );
        let level = StaticMesh {
            model: desc.model,
            mesh: GpuMesh::upload(device, LEVEL_LABEL, &parsed.mesh),
        };

        let uploader = TextureUploader::new(device);
        let mut textures = TextureLibrary::new();
        for path in &desc.textures {
            uploader
                .load(device, &gpu.queue, path, Some(&mut textures))
                .with_context(|| format!("Failed to load texture {}", path.display()))?;
        }
        log::info!("Texture library holds {} textures", textures.len());

        let uniforms = SceneUniforms::new(&desc.camera, desc.model, &desc.lights, desc.ambient);
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Scene Uniforms"),
            size: std::mem::size_of_val(&uniforms) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        gpu.queue
            .write_buffer(&uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let uniform_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let uniform_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene BG"),
            layout: &uniform_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Static WGSL"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/static.wgsl").into()),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Static PipelineLayout"),
            bind_group_layouts: &[&uniform_bgl, uploader.layout()],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Static Pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[MESH_VERTEX_LAYOUT],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let mut scene = Self {
            camera: desc.camera,
            level,
            lights: desc.lights.clone(),
            ambient: desc.ambient,
            textures,
            uploader,
            pipeline,
            uniform_buffer,
            uniform_bg,
            mesh_reloads: ReloadQueue::default(),
            texture_reloads: ReloadQueue::default(),
            watches: Vec::new(),
        };
        if watch {
            scene.watch(desc)?;
        }
        Ok(scene)
    }

    fn watch(&mut self, desc: &SceneDesc) -> anyhow::Result<()> {
        self.watches.push(watch_file(
            desc.mesh.clone(),
            LEVEL_LABEL.to_owned(),
            self.mesh_reloads.stager(),
            |path: &Path| load_obj_from_path(path),
        )?);
        for path in &desc.textures {
            self.watches.push(watch_file(
                path.clone(),
                library_key(path),
                self.texture_reloads.stager(),
                |path: &Path| TextureImage::load(path),
            )?);
        }
        log::info!("Hot reload enabled for {} files", self.watches.len());
        Ok(())
    }

    /// Check every reload queue once and apply whatever was staged. Never
    /// blocks. Returns the number of updates applied.
    pub fn poll_reloads(&mut self, gpu: &GpuState) -> usize {
        let level = &mut self.level;
        let meshes = self
            .mesh_reloads
            .poll_and_apply(|update| apply_mesh_update(gpu, level, update));

        let (uploader, library) = (&self.uploader, &mut self.textures);
        let textures = self.texture_reloads.poll_and_apply(|update| {
            match uploader.replace_in_library(
                &gpu.device,
                &gpu.queue,
                library,
                &update.target,
                &update.payload,
            ) {
                Some(how) => log::info!("Reloaded texture {} ({how:?})", update.target),
                None => log::warn!("Reloaded texture {} is not in the library", update.target),
            }
        });

        usize::from(meshes) + usize::from(textures)
    }

    /// Upload this frame's camera and light uniforms.
    pub fn prepare(&self, queue: &wgpu::Queue) {
        let uniforms =
            SceneUniforms::new(&self.camera, self.level.model, &self.lights, self.ambient);
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
    }

    /// Record the level draws into `pass`: one draw per textured material range.
    pub fn draw(&self, pass: &mut RenderPass<'_>) {
        let mesh = &self.level.mesh;
        let draws = plan_draws(mesh.materials(), |name| self.textures.lookup(name));
        if draws.is_empty() {
            return;
        }

        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.uniform_bg, &[]);
        mesh.bind(pass);
        for call in draws {
            pass.set_bind_group(1, call.texture.bind_group(), &[]);
            mesh.draw_range(pass, call.indices);
        }
    }
}

fn apply_mesh_update(
    gpu: &GpuState,
    level: &mut StaticMesh,
    update: ReloadUpdate<String, ParsedObj>,
) {
    let parsed = update.payload;
    log_warnings(&parsed.warnings);
    log_unassigned(&parsed);
    let (vb, ib) = level.mesh.replace(&gpu.device, &gpu.queue, &parsed.mesh);
    log::info!(
        "Reloaded mesh {} ({} vertices; vertex buffer {vb:?}, index buffer {ib:?})",
        update.target,
        parsed.mesh.vertices.len()
    );
}
