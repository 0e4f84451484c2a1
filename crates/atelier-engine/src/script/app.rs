use crate::capture::{ImageFileFormat, Recorder};
use crate::core::{App, AppControl, FrameCtx};
use crate::gpu::FrameStatus;
use crate::input::Key;
use crate::resources::RenderContext;

use super::Scene;

type SetupFn = Box<dyn FnOnce(&mut Scene, &mut RenderContext, (u32, u32)) -> anyhow::Result<()>>;

/// Keys the scene host reacts to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SceneKeys {
    pub save: Key,
    pub reload: Key,
    pub exit: Key,
}

impl Default for SceneKeys {
    fn default() -> Self {
        Self { save: Key::S, reload: Key::F5, exit: Key::Escape }
    }
}

/// Hosts a [`Scene`] in the runtime.
///
/// Each frame: exit on the exit key, reload on the reload key, clear, render
/// every script, and on the save key read the frame back and hand it to the
/// recorder.
pub struct SceneApp {
    scene: Scene,
    setup: Option<SetupFn>,
    clear: [f64; 4],
    keys: SceneKeys,
    recorder: Option<Recorder>,
    capture_format: ImageFileFormat,
}

impl SceneApp {
    /// `setup` fills the scene once the render context exists.
    pub fn new<F>(setup: F) -> Self
    where
        F: FnOnce(&mut Scene, &mut RenderContext, (u32, u32)) -> anyhow::Result<()> + 'static,
    {
        Self {
            scene: Scene::new(),
            setup: Some(Box::new(setup)),
            clear: [0.0, 0.0, 0.0, 1.0],
            keys: SceneKeys::default(),
            recorder: None,
            capture_format: ImageFileFormat::Png,
        }
    }

    pub fn with_clear(mut self, clear: [f64; 4]) -> Self {
        self.clear = clear;
        self
    }

    pub fn with_keys(mut self, keys: SceneKeys) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_recorder(mut self, recorder: Recorder, format: ImageFileFormat) -> Self {
        self.recorder = Some(recorder);
        self.capture_format = format;
        self
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn recorder(&self) -> Option<&Recorder> {
        self.recorder.as_ref()
    }

    fn save_capture(&mut self, render: &mut RenderContext) {
        let Some(recorder) = self.recorder.as_mut() else {
            return;
        };
        let Some(readback) = render.take_readback() else {
            log::warn!("frame capture requested but the backend returned no pixels");
            return;
        };
        let name = recorder.next_name();
        if let Err(err) = recorder.save(&readback, &name, self.capture_format) {
            log::error!("frame capture failed: {err}");
        }
    }
}

impl App for SceneApp {
    fn init(&mut self, ctx: &mut RenderContext, window_size: (u32, u32)) -> anyhow::Result<()> {
        if let Some(setup) = self.setup.take() {
            setup(&mut self.scene, ctx, window_size)?;
        }
        log::info!("scene ready with {} scripts", self.scene.len());
        Ok(())
    }

    fn on_frame(&mut self, frame: &mut FrameCtx<'_>) -> AppControl {
        if frame.input_frame.key_pressed(self.keys.exit) {
            log::info!("{} pressed, exiting", self.keys.exit);
            return AppControl::Exit;
        }
        if frame.input_frame.key_pressed(self.keys.reload) {
            self.scene.reload(frame.render);
        }

        let capture = frame.input_frame.key_pressed(self.keys.save);
        if capture && self.recorder.is_none() {
            log::warn!("no recorder configured; {} ignored", self.keys.save);
        }
        let capture = capture && self.recorder.is_some();

        match frame.render.begin_frame(self.clear) {
            Ok(FrameStatus::Ready) => {}
            Ok(FrameStatus::Skipped) => return AppControl::Continue,
            Err(err) => {
                log::error!("cannot start frame: {err}");
                return AppControl::Exit;
            }
        }

        self.scene.render(frame);

        if capture {
            frame.render.request_readback(self.capture_format.components());
        }
        if let Err(err) = frame.render.end_frame() {
            log::error!("cannot finish frame: {err}");
            return AppControl::Exit;
        }
        if capture {
            self.save_capture(frame.render);
        }
        AppControl::Continue
    }

    fn on_shutdown(&mut self, ctx: &mut RenderContext) {
        self.scene.teardown(ctx);
    }
}
