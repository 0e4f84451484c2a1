use std::sync::Arc;

use anyhow::{Context, Result};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::core::{App as CoreApp, AppControl, FrameCtx};
use crate::device::GpuInit;
use crate::gpu::WgpuBackend;
use crate::input::{InputFrame, InputState};
use crate::resources::{RenderContext, ResourceSettings};
use crate::time::{FrameClock, FramePacer};

use super::translate::translate_window_event;

/// Window/runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    /// Frame-rate cap applied by the end-of-frame wait; 0 disables it.
    pub target_fps: u32,
    pub resources: ResourceSettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "atelier".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            target_fps: 60,
            resources: ResourceSettings::default(),
        }
    }
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    /// Opens the window, runs `app` until it exits or the window closes, and
    /// tears every GPU resource down before returning.
    pub fn run<A>(config: RuntimeConfig, gpu_init: GpuInit, app: A) -> Result<()>
    where
        A: 'static + CoreApp,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState::new(config, gpu_init, app);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        state.shutdown();
        match state.failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

struct WindowEntry {
    window: Arc<Window>,
    render: RenderContext,
    input_state: InputState,
    input_frame: InputFrame,
    clock: FrameClock,
    pacer: FramePacer,
}

struct AppState<A>
where
    A: CoreApp + 'static,
{
    config: RuntimeConfig,
    gpu_init: GpuInit,
    app: A,

    window: Option<WindowEntry>,
    started: bool,
    failure: Option<anyhow::Error>,
}

impl<A> AppState<A>
where
    A: CoreApp + 'static,
{
    fn new(config: RuntimeConfig, gpu_init: GpuInit, app: A) -> Self {
        Self {
            config,
            gpu_init,
            app,
            window: None,
            started: false,
            failure: None,
        }
    }

    fn create_window_entry(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);

        let window = Arc::new(event_loop.create_window(attrs).context("failed to create window")?);
        let backend =
            WgpuBackend::new(window.clone(), self.gpu_init.clone()).context("GPU initialization failed for window")?;
        let render = RenderContext::new(Box::new(backend), self.config.resources.clone());

        let entry = WindowEntry {
            window,
            render,
            input_state: InputState::default(),
            input_frame: InputFrame::default(),
            clock: FrameClock::new(),
            pacer: FramePacer::new(self.config.target_fps),
        };
        let entry = self.window.insert(entry);

        let size = entry.window.inner_size();
        self.app
            .init(&mut entry.render, (size.width, size.height))
            .context("application initialization failed")?;

        entry.clock.reset();
        entry.window.request_redraw();
        Ok(())
    }

    /// Full teardown: app hook, then every registry. Runs at most once.
    fn shutdown(&mut self) {
        if let Some(mut entry) = self.window.take() {
            self.app.on_shutdown(&mut entry.render);
            entry.render.shutdown();
        }
    }

    fn exit(&mut self, event_loop: &ActiveEventLoop) {
        self.shutdown();
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.failure = Some(err);
        self.exit(event_loop);
    }

    fn redraw(&mut self) -> AppControl {
        let Some(entry) = self.window.as_mut() else {
            return AppControl::Exit;
        };

        entry.pacer.begin();
        let time = entry.clock.tick();

        let control = {
            let mut ctx = FrameCtx {
                render: &mut entry.render,
                input: &entry.input_state,
                input_frame: &entry.input_frame,
                time,
            };
            self.app.on_frame(&mut ctx)
        };

        // Clear per-frame deltas after the frame is consumed.
        entry.input_frame.clear();
        entry.pacer.wait();
        control
    }
}

impl<A> ApplicationHandler for AppState<A>
where
    A: CoreApp + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.started {
            return;
        }
        self.started = true;

        if let Err(err) = self.create_window_entry(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);

        // Continuous redraw: scripts animate every frame.
        if let Some(entry) = &self.window {
            entry.window.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(entry) = self.window.as_mut() else {
            return;
        };
        if entry.window.id() != window_id {
            return;
        }

        if let Some(ev) = translate_window_event(&entry.input_state, &event) {
            entry.input_state.apply_event(&mut entry.input_frame, ev);
        }

        if self.app.on_window_event(&event) == AppControl::Exit {
            self.exit(event_loop);
            return;
        }

        match &event {
            WindowEvent::CloseRequested => {
                log::info!("window closed");
                self.exit(event_loop);
            }

            WindowEvent::Resized(size) => {
                if let Some(entry) = self.window.as_mut() {
                    entry.render.resize(size.width, size.height);
                    entry.window.request_redraw();
                }
            }

            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(entry) = self.window.as_mut() {
                    let size = entry.window.inner_size();
                    entry.render.resize(size.width, size.height);
                    entry.window.request_redraw();
                }
            }

            WindowEvent::RedrawRequested => {
                if self.redraw() == AppControl::Exit {
                    self.exit(event_loop);
                }
            }

            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}
