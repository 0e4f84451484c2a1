//! Shader playground.
//!
//! Opens one window with a full-screen fragment-shader background (or a
//! cubemap skybox when `ATELIER_SKYBOX_DIR` is set) and a textured rotating
//! cube. F5 hot-reloads every shader, S saves a frame, Escape quits.

mod scripts;

use std::path::PathBuf;

use anyhow::Result;
use winit::dpi::LogicalSize;

use atelier_engine::capture::{ImageFileFormat, Recorder};
use atelier_engine::device::GpuInit;
use atelier_engine::logging::{init_logging, LoggingConfig};
use atelier_engine::resources::ResourceSettings;
use atelier_engine::script::SceneApp;
use atelier_engine::window::{Runtime, RuntimeConfig};

/// Paths the studio reads, with environment overrides.
struct StudioPaths {
    shaders: PathBuf,
    output: PathBuf,
    skybox: Option<PathBuf>,
}

impl StudioPaths {
    fn from_env() -> Self {
        let var = |name: &str| std::env::var_os(name).map(PathBuf::from);
        Self {
            shaders: var("ATELIER_SHADER_DIR")
                .unwrap_or_else(|| PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders"))),
            output: var("ATELIER_OUTPUT_DIR").unwrap_or_else(|| PathBuf::from("output/imgs")),
            skybox: var("ATELIER_SKYBOX_DIR"),
        }
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let paths = StudioPaths::from_env();
    log::info!("shaders from {}, captures to {}", paths.shaders.display(), paths.output.display());

    let recorder = Recorder::new(&paths.output)?;
    let skybox = paths.skybox.clone();

    let app = SceneApp::new(move |scene, ctx, window_size| {
        match skybox {
            Some(dir) => scene.add(scripts::skybox(ctx, &dir)?),
            None => scene.add(scripts::playground(ctx, window_size)?),
        };
        scene.add(scripts::cube(ctx)?);
        Ok(())
    })
    .with_clear([0.02, 0.02, 0.03, 1.0])
    .with_recorder(recorder, ImageFileFormat::Png);

    let config = RuntimeConfig {
        title: "atelier studio".to_string(),
        initial_size: LogicalSize::new(1024.0, 768.0),
        target_fps: 60,
        resources: ResourceSettings {
            shader_dir: paths.shaders,
            ..Default::default()
        },
    };

    Runtime::run(config, GpuInit::default(), app)
}
