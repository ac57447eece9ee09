//! Platform layer: window, event loop and per-frame ordering.
//!
//! Each frame runs, in order: poll reload queues, step the camera from held
//! keys, render the scene into the low-res target, upscale onto the window.
//! Window and keyboard events arrive between frames.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use corelib::{
    Resolution,
    input::{FlyInput, Key},
};
use renderer::{
    GpuState, RenderError,
    lowres::{INTERNAL_RESOLUTION, LowResRenderer},
    scene::{Scene, SceneDesc},
};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

pub mod profile;

use profile::FrameProfiler;

/// Everything `run` needs, parsed from the command line by the binary.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub backends: wgpu::Backends,
    pub watch: bool,
    pub cpuprofile: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    pub resources: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            watch: false,
            cpuprofile: None,
            width: 600,
            height: 600,
            resources: PathBuf::from("resources"),
        }
    }
}

/// Arrow keys turn, WASD moves.
pub fn map_key(code: KeyCode) -> Option<Key> {
    Some(match code {
        KeyCode::KeyW => Key::Forward,
        KeyCode::KeyS => Key::Back,
        KeyCode::KeyA => Key::StrafeLeft,
        KeyCode::KeyD => Key::StrafeRight,
        KeyCode::ArrowLeft => Key::TurnLeft,
        KeyCode::ArrowRight => Key::TurnRight,
        KeyCode::ArrowUp => Key::LookUp,
        KeyCode::ArrowDown => Key::LookDown,
        _ => return None,
    })
}

/// What the event loop does after a frame failed to render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameAction {
    Reconfigure,
    Skip,
    Exit,
}

fn frame_action(err: &RenderError) -> FrameAction {
    if err.is_surface_lost() {
        FrameAction::Reconfigure
    } else if err.is_timeout() {
        FrameAction::Skip
    } else {
        FrameAction::Exit
    }
}

/// Open the window and run until it is closed or Escape is pressed.
pub fn run(config: RunConfig) -> Result<()> {
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app).context("Event loop error")?;
    app.finish()
}

struct Running {
    window: Arc<Window>,
    gpu: GpuState,
    lowres: LowResRenderer,
    scene: Scene,
}

struct App {
    config: RunConfig,
    running: Option<Running>,
    input: FlyInput,
    last_frame: Option<Instant>,
    profiler: Option<FrameProfiler>,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: RunConfig) -> Self {
        let profiler = config.cpuprofile.as_ref().map(|_| FrameProfiler::new());
        Self {
            config,
            running: None,
            input: FlyInput::default(),
            last_frame: None,
            profiler,
            fatal: None,
        }
    }

    fn init(&self, event_loop: &ActiveEventLoop) -> Result<Running> {
        let size = Resolution::new(self.config.width, self.config.height)?;
        let attrs = Window::default_attributes()
            .with_title("lowrez")
            .with_inner_size(PhysicalSize::new(size.width, size.height));
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("Failed to create window")?,
        );
        log::info!(
            "Window created: {}x{}",
            window.inner_size().width,
            window.inner_size().height
        );

        let gpu = pollster::block_on(GpuState::new(window.clone(), self.config.backends))?;
        let lowres = LowResRenderer::new(&gpu, INTERNAL_RESOLUTION);
        let desc = SceneDesc::jam_level(&self.config.resources);
        let scene = Scene::build(&gpu, &desc, self.config.watch)?;

        window.request_redraw();
        Ok(Running {
            window,
            gpu,
            lowres,
            scene,
        })
    }

    fn frame(&mut self, event_loop: &ActiveEventLoop) {
        let Some(running) = self.running.as_mut() else {
            return;
        };
        let start = Instant::now();
        let dt = self
            .last_frame
            .map_or(0.0, |last| start.duration_since(last).as_secs_f32());
        self.last_frame = Some(start);

        let Running {
            window,
            gpu,
            lowres,
            scene,
        } = running;

        scene.poll_reloads(gpu);
        scene.camera.update(&self.input, dt);
        scene.prepare(&gpu.queue);

        if let Err(err) = lowres.render(gpu, |pass| scene.draw(pass)) {
            match frame_action(&err) {
                FrameAction::Reconfigure => {
                    log::debug!("Surface lost, reconfiguring");
                    gpu.recreate_surface();
                }
                FrameAction::Skip => log::debug!("{err}, skipping frame"),
                FrameAction::Exit => {
                    log::error!("Render error: {err}, exiting");
                    event_loop.exit();
                    return;
                }
            }
        }

        if let Some(profiler) = &mut self.profiler {
            profiler.record(start.elapsed());
        }
        window.request_redraw();
    }

    /// Surface any setup error and write the CPU profile, if one was asked for.
    fn finish(self) -> Result<()> {
        if let Some(err) = self.fatal {
            return Err(err);
        }
        if let (Some(profiler), Some(path)) = (&self.profiler, &self.config.cpuprofile) {
            log::info!("Recorded {} frames", profiler.frames());
            profiler.write_to(path)?;
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match self.init(event_loop) {
            Ok(running) => self.running = Some(running),
            Err(err) => {
                self.fatal = Some(err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested. Exiting event loop.");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                log::debug!("Resized: {}x{}", size.width, size.height);
                if let Some(running) = &mut self.running {
                    running.gpu.resize(size.width, size.height);
                }
            }
            WindowEvent::Focused(false) => self.input.clear(),
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return;
                };
                let pressed = event.state.is_pressed();
                if code == KeyCode::Escape && pressed {
                    log::info!("Escape pressed. Exiting event loop.");
                    event_loop.exit();
                } else if let Some(key) = map_key(code) {
                    self.input.set(key, pressed);
                }
            }
            WindowEvent::RedrawRequested => self.frame(event_loop),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrows_and_wasd_are_mapped() {
        assert_eq!(map_key(KeyCode::KeyW), Some(Key::Forward));
        assert_eq!(map_key(KeyCode::KeyS), Some(Key::Back));
        assert_eq!(map_key(KeyCode::KeyA), Some(Key::StrafeLeft));
        assert_eq!(map_key(KeyCode::KeyD), Some(Key::StrafeRight));
        assert_eq!(map_key(KeyCode::ArrowLeft), Some(Key::TurnLeft));
        assert_eq!(map_key(KeyCode::ArrowRight), Some(Key::TurnRight));
        assert_eq!(map_key(KeyCode::ArrowUp), Some(Key::LookUp));
        assert_eq!(map_key(KeyCode::ArrowDown), Some(Key::LookDown));
    }

    #[test]
    fn other_keys_are_ignored() {
        assert_eq!(map_key(KeyCode::Escape), None);
        assert_eq!(map_key(KeyCode::Space), None);
    }

    #[test]
    fn surface_errors_pick_a_frame_action() {
        use wgpu::SurfaceError;
        let action = |err| frame_action(&RenderError::Frame(err));
        assert_eq!(action(SurfaceError::Lost), FrameAction::Reconfigure);
        assert_eq!(action(SurfaceError::Outdated), FrameAction::Reconfigure);
        assert_eq!(action(SurfaceError::Timeout), FrameAction::Skip);
        assert_eq!(action(SurfaceError::OutOfMemory), FrameAction::Exit);
        assert_eq!(frame_action(&RenderError::NoSurfaceFormat), FrameAction::Exit);
    }

    #[test]
    fn default_config_matches_window_defaults() {
        let config = RunConfig::default();
        assert_eq!((config.width, config.height), (600, 600));
        assert_eq!(config.resources, PathBuf::from("resources"));
        assert!(!config.watch);
        assert!(config.cpuprofile.is_none());
    }

    #[test]
    fn profiler_only_when_requested() {
        assert!(App::new(RunConfig::default()).profiler.is_none());
        let config = RunConfig {
            cpuprofile: Some(PathBuf::from("cpu.prof")),
            ..RunConfig::default()
        };
        assert!(App::new(config).profiler.is_some());
    }

    #[test]
    fn finish_writes_requested_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cpu.prof");
        let mut app = App::new(RunConfig {
            cpuprofile: Some(path.clone()),
            ..RunConfig::default()
        });
        if let Some(profiler) = &mut app.profiler {
            profiler.record(std::time::Duration::from_millis(5));
        }
        app.finish().unwrap();
        assert!(std::fs::read_to_string(path).unwrap().starts_with("frames: 1"));
    }
}
