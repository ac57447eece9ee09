//! Renderer: wgpu device/surface state, the fixed low-resolution pipeline,
//! GPU meshes and textures, and the minimal scene.
//! wgpu = 26.x, winit = 0.30.x

use std::sync::Arc;

use thiserror::Error;
use wgpu::{
    Device, DeviceDescriptor, Features, Instance, InstanceDescriptor, Limits, PowerPreference,
    PresentMode, Queue, Surface, SurfaceConfiguration, SurfaceError, SurfaceTexture, TextureFormat,
    TextureUsages,
};
use winit::{dpi::PhysicalSize, window::Window};

pub mod lowres;
pub mod mesh;
pub mod scene;
pub mod texture;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("No suitable GPU adapter: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),
    #[error("Failed to open GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("Surface reports no supported formats")]
    NoSurfaceFormat,
    #[error("Failed to acquire frame: {0}")]
    Frame(#[from] SurfaceError),
}

impl RenderError {
    /// Lost or outdated surface: reconfigure and try again next frame.
    pub fn is_surface_lost(&self) -> bool {
        matches!(self, Self::Frame(SurfaceError::Lost | SurfaceError::Outdated))
    }

    /// The swapchain had no image ready in time. Skip the frame and keep going.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Frame(SurfaceError::Timeout))
    }
}

/// Device, queue and the window surface. Everything that touches these must
/// run on the thread that owns the event loop.
pub struct GpuState {
    surface: Surface<'static>,
    surface_config: SurfaceConfiguration,
    pub device: Device,
    pub queue: Queue,
    width: u32,
    height: u32,
}

impl GpuState {
    /// Create GPU state bound to an Arc<Window>.
    pub async fn new(window: Arc<Window>, backends: wgpu::Backends) -> Result<Self, RenderError> {
        let PhysicalSize { width, height } = window.inner_size();
        let width = width.max(1);
        let height = height.max(1);

        let instance = Instance::new(&InstanceDescriptor {
            backends,
            ..Default::default()
        });
        let surface: Surface<'static> = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;
        log::info!("Using adapter: {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(&DeviceDescriptor {
                label: Some("Lowrez Device"),
                required_features: Features::empty(),
                required_limits: Limits::downlevel_webgl2_defaults()
                    .using_resolution(adapter.limits()),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await?;

        // Surface format (prefer sRGB)
        let caps = surface.get_capabilities(&adapter);
        let surface_format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or(RenderError::NoSurfaceFormat)?;

        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: PresentMode::AutoVsync,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        Ok(Self {
            surface,
            surface_config,
            device,
            queue,
            width,
            height,
        })
    }

    #[inline]
    pub fn surface_format(&self) -> TextureFormat {
        self.surface_config.format
    }

    /// Current window size in pixels.
    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Resize: reconfigure the surface. The internal target is unaffected.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.surface_config.width = self.width;
        self.surface_config.height = self.height;
        self.surface.configure(&self.device, &self.surface_config);
    }

    pub fn acquire_frame(&self) -> Result<SurfaceTexture, RenderError> {
        Ok(self.surface.get_current_texture()?)
    }

    pub fn recreate_surface(&mut self) {
        self.resize(self.width, self.height);
    }
}
