//! Entry point for lowrez: logging, CLI flags, run.

use std::path::PathBuf;

use anyhow::Result;
use platform::RunConfig;

fn parse_backend_arg(args: &[String]) -> wgpu::Backends {
    // Accept: --gpu-backend=auto|vulkan|dx12|metal|gl
    let mut backends = wgpu::Backends::all();
    for arg in args {
        if let Some(val) = arg.strip_prefix("--gpu-backend=") {
            backends = match val.to_ascii_lowercase().as_str() {
                "auto" => wgpu::Backends::all(),
                "vulkan" | "vk" => wgpu::Backends::VULKAN,
                "dx12" | "d3d12" => wgpu::Backends::DX12,
                "metal" | "mtl" => wgpu::Backends::METAL,
                "gl" | "opengl" | "gles" => wgpu::Backends::GL,
                other => {
                    log::warn!("Unknown backend '{other}', falling back to auto.");
                    wgpu::Backends::all()
                }
            };
        }
    }
    backends
}

fn parse_switch(args: &[String], flag: &str) -> bool {
    // --flag[=on|off], off when absent
    for arg in args {
        let Some(rest) = arg.strip_prefix(flag) else {
            continue;
        };
        if rest.is_empty() {
            return true;
        }
        if let Some(val) = rest.strip_prefix('=') {
            return matches!(
                val.to_ascii_lowercase().as_str(),
                "1" | "true" | "on" | "yes"
            );
        }
    }
    false
}

fn parse_path_arg(args: &[String], flag: &str) -> Option<PathBuf> {
    args.iter()
        .rev()
        .filter_map(|arg| arg.strip_prefix(flag)?.strip_prefix('='))
        .find(|val| !val.is_empty())
        .map(PathBuf::from)
}

fn parse_size_args(args: &[String]) -> (u32, u32) {
    let mut w: Option<u32> = None;
    let mut h: Option<u32> = None;

    for arg in args {
        if let Some(v) = arg.strip_prefix("--size=") {
            if let Some((sw, sh)) = v.split_once('x').or_else(|| v.split_once('X')) {
                if let (Ok(pw), Ok(ph)) = (sw.parse::<u32>(), sh.parse::<u32>()) {
                    w = Some(pw);
                    h = Some(ph);
                }
            }
        } else if let Some(v) = arg.strip_prefix("--width=") {
            if let Ok(pw) = v.parse::<u32>() {
                w = Some(pw);
            }
        } else if let Some(v) = arg.strip_prefix("--height=") {
            if let Ok(ph) = v.parse::<u32>() {
                h = Some(ph);
            }
        }
    }

    (w.unwrap_or(600).max(1), h.unwrap_or(600).max(1))
}

fn parse_config(args: &[String]) -> RunConfig {
    let (width, height) = parse_size_args(args);
    let defaults = RunConfig::default();
    RunConfig {
        backends: parse_backend_arg(args),
        watch: parse_switch(args, "--watch"),
        cpuprofile: parse_path_arg(args, "--cpuprofile"),
        width,
        height,
        resources: parse_path_arg(args, "--resources").unwrap_or(defaults.resources),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = parse_config(&args);
    log::info!(
        "Starting lowrez. Backend: {:?}, watch={}, cpuprofile={:?}, window_size={}x{}, \
         resources={}",
        config.backends,
        config.watch,
        config.cpuprofile,
        config.width,
        config.height,
        config.resources.display()
    );

    platform::run(config)?;

    log::info!("Graceful shutdown. Bye!");
    Ok(())
}
