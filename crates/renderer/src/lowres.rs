//! Fixed internal resolution rendering: draw the scene into a tiny off-screen
//! target, then stretch that target over the window with nearest sampling.

use bytemuck::{Pod, Zeroable};
use corelib::Resolution;
use wgpu::{
    util::DeviceExt, BindGroup, Buffer, Color, CommandEncoderDescriptor, Extent3d, LoadOp,
    Operations, RenderPass, RenderPassColorAttachment, RenderPassDepthStencilAttachment,
    RenderPassDescriptor, RenderPipeline, StoreOp, TextureDescriptor,
    TextureDimension, TextureFormat, TextureUsages, TextureView, VertexBufferLayout,
    VertexStepMode,
};

use crate::{GpuState, RenderError};

/// The whole look of the game: everything is drawn at this size.
pub const INTERNAL_RESOLUTION: Resolution = Resolution {
    width: 64,
    height: 64,
};

pub const COLOR_FORMAT: TextureFormat = TextureFormat::Rgba8UnormSrgb;
pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth24PlusStencil8;

const CLEAR_COLOR: Color = Color {
    r: 0.0,
    g: 0.0,
    b: 0.0,
    a: 1.0,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
}

impl QuadVertex {
    pub const LAYOUT: VertexBufferLayout<'static> = VertexBufferLayout {
        array_stride: std::mem::size_of::<QuadVertex>() as u64,
        step_mode: VertexStepMode::Vertex,
        attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2],
    };
}

/// Full-screen quad in NDC. Texture rows run top-down, so the bottom edge
/// samples v = 1.
#[rustfmt::skip]
pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { pos: [-1.0, -1.0], uv: [0.0, 1.0] },
    QuadVertex { pos: [ 1.0, -1.0], uv: [1.0, 1.0] },
    QuadVertex { pos: [ 1.0,  1.0], uv: [1.0, 0.0] },
    QuadVertex { pos: [-1.0,  1.0], uv: [0.0, 0.0] },
];
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

/// Per-pass state for one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassPlan {
    pub label: &'static str,
    pub viewport: (u32, u32),
    pub clear_depth: bool,
}

/// Scene pass into the internal target (depth on), then the blit pass onto
/// the window (colour only).
pub fn frame_passes(internal: Resolution, window: (u32, u32)) -> [PassPlan; 2] {
    [
        PassPlan {
            label: "LowResScenePass",
            viewport: (internal.width, internal.height),
            clear_depth: true,
        },
        PassPlan {
            label: "UpscalePass",
            viewport: (window.0.max(1), window.1.max(1)),
            clear_depth: false,
        },
    ]
}

pub struct LowResRenderer {
    resolution: Resolution,
    color_view: TextureView,
    depth_view: TextureView,
    blit_pipeline: RenderPipeline,
    blit_bg: BindGroup,
    quad_vb: Buffer,
    quad_ib: Buffer,
}

impl LowResRenderer {
    pub fn new(gpu: &GpuState, resolution: Resolution) -> Self {
        let device = &gpu.device;
        let size = Extent3d {
            width: resolution.width,
            height: resolution.height,
            depth_or_array_layers: 1,
        };

        let color_tex = device.create_texture(&TextureDescriptor {
            label: Some("LowRes Color"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let color_view = color_tex.create_view(&Default::default());

        let depth_tex = device.create_texture(&TextureDescriptor {
            label: Some("LowRes DepthStencil"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth_view = depth_tex.create_view(&Default::default());

        // Nearest + clamp: each internal pixel becomes a crisp block.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("LowRes Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let blit_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Blit BGL"),
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
        let blit_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Blit BG"),
            layout: &blit_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&color_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Screen WGSL"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/screen.wgsl").into()),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blit PipelineLayout"),
            bind_group_layouts: &[&blit_bgl],
            push_constant_ranges: &[],
        });
        let blit_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Blit Pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[QuadVertex::LAYOUT],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: gpu.surface_format(),
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let quad_vb = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad VB"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let quad_ib = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad IB"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        log::info!(
            "Low-res target {}x{} ({:?} + {:?})",
            resolution.width,
            resolution.height,
            COLOR_FORMAT,
            DEPTH_FORMAT
        );

        Self {
            resolution,
            color_view,
            depth_view,
            blit_pipeline,
            blit_bg,
            quad_vb,
            quad_ib,
        }
    }

    /// Render one frame: `draw_scene` into the internal target, upscale onto
    /// the window, present.
    pub fn render(
        &self,
        gpu: &GpuState,
        draw_scene: impl FnOnce(&mut RenderPass<'_>),
    ) -> Result<(), RenderError> {
        let [scene_plan, blit_plan] = frame_passes(self.resolution, gpu.size());

        let frame = gpu.acquire_frame()?;
        let surface_view = frame.texture.create_view(&Default::default());

        let mut encoder = gpu
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("LowResEncoder"),
            });

        {
            let mut rpass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some(scene_plan.label),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &self.color_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(CLEAR_COLOR),
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(Operations {
                        load: LoadOp::Clear(1.0),
                        store: StoreOp::Store,
                    }),
                    stencil_ops: Some(Operations {
                        load: LoadOp::Clear(0),
                        store: StoreOp::Store,
                    }),
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            set_viewport(&mut rpass, scene_plan);
            draw_scene(&mut rpass);
        }

        {
            let mut rpass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some(blit_plan.label),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &surface_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(CLEAR_COLOR),
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            set_viewport(&mut rpass, blit_plan);
            rpass.set_pipeline(&self.blit_pipeline);
            rpass.set_bind_group(0, &self.blit_bg, &[]);
            rpass.set_vertex_buffer(0, self.quad_vb.slice(..));
            rpass.set_index_buffer(self.quad_ib.slice(..), wgpu::IndexFormat::Uint32);
            rpass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..1);
        }

        gpu.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }
}

fn set_viewport(rpass: &mut RenderPass<'_>, plan: PassPlan) {
    let (w, h) = plan.viewport;
    rpass.set_viewport(0.0, 0.0, w as f32, h as f32, 0.0, 1.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_target_is_sixty_four_square() {
        assert_eq!(INTERNAL_RESOLUTION, Resolution::new(64, 64).unwrap());
    }

    #[test]
    fn passes_use_internal_then_window_viewport() {
        let [scene, blit] = frame_passes(INTERNAL_RESOLUTION, (600, 600));
        assert_eq!(scene.viewport, (64, 64));
        assert!(scene.clear_depth);
        assert_eq!(blit.viewport, (600, 600));
        assert!(!blit.clear_depth);
    }

    #[test]
    fn minimised_window_still_gets_a_valid_viewport() {
        let [_, blit] = frame_passes(INTERNAL_RESOLUTION, (0, 0));
        assert_eq!(blit.viewport, (1, 1));
    }

    #[test]
    fn quad_covers_ndc_with_top_down_uvs() {
        let corner = |x: f32, y: f32| {
            QUAD_VERTICES
                .iter()
                .find(|v| v.pos == [x, y])
                .map(|v| v.uv)
                .unwrap()
        };
        assert_eq!(corner(-1.0, 1.0), [0.0, 0.0]);
        assert_eq!(corner(1.0, -1.0), [1.0, 1.0]);
        assert_eq!(QUAD_INDICES.len(), 6);
        assert!(QUAD_INDICES.iter().all(|&i| (i as usize) < QUAD_VERTICES.len()));
    }
}
