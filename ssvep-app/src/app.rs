use anyhow::{Context, Result};
use pixels::{Pixels, SurfaceTexture};
use ssvep_session::{CancelToken, MarkerEmitter, SessionConfig, SessionSummary, StepOutcome, TickDriver, UniformSource};
use ssvep_render::{SkiaRenderer, StimulusLayout};
use ssvep_timing::{FrameScheduler, TickScheduler};
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowId},
};

/// Fullscreen stimulus window. Ticks are paced by the event loop waking at
/// each scheduler deadline.
pub struct App<U: UniformSource> {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    renderer: Option<SkiaRenderer>,
    driver: TickDriver<FrameScheduler, U>,
    layout: StimulusLayout,
    cancel: CancelToken,
    refresh_rate: Option<f64>,
    error: Option<anyhow::Error>,
}

impl<U: UniformSource> App<U> {
    pub fn new(config: &SessionConfig, emitter: MarkerEmitter, rng: U) -> Result<Self> {
        let scheduler = FrameScheduler::new(config.tick_period()?);
        let driver = TickDriver::new(config, scheduler, rng, emitter)?;
        let layout = if config.target_ticks > 0 {
            StimulusLayout::SACCADE
        } else {
            StimulusLayout::GAZE_SHIFT
        };
        Ok(Self {
            window: None,
            pixels: None,
            renderer: None,
            driver,
            layout,
            cancel: CancelToken::new(),
            refresh_rate: None,
            error: None,
        })
    }

    pub fn run(mut self) -> Result<SessionSummary> {
        let event_loop = EventLoop::new()?;
        log::info!("Press ESC to abort the session.");
        event_loop.run_app(&mut self)?;

        if let Some(err) = self.error.take() {
            return Err(err);
        }
        if self.cancel.is_cancelled() {
            self.driver.abort();
        }
        Ok(self.driver.summary())
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let primary_monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .context("no monitor available")?;

        self.refresh_rate = primary_monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let window_attributes = Window::default_attributes()
            .with_title("SSVEP session")
            .with_fullscreen(Some(Fullscreen::Borderless(Some(primary_monitor))))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let size = window.inner_size();

        log::info!(
            "display: {}x{} at scale {:.2}",
            size.width,
            size.height,
            window.scale_factor()
        );
        if let Some(rate) = self.refresh_rate {
            log::info!("refresh rate: {rate:.1} Hz");
            let period_ms = self.driver.scheduler().period().as_secs_f64() * 1e3;
            if period_ms * rate / 1000.0 < 1.0 {
                log::warn!("tick period {period_ms:.2} ms is shorter than one refresh");
            }
        }

        let surface_texture = SurfaceTexture::new(size.width, size.height, window.clone());
        self.pixels = Some(
            Pixels::new(size.width, size.height, surface_texture).context("creating pixel surface")?,
        );
        self.renderer = Some(SkiaRenderer::new(size.width, size.height, self.layout)?);

        window.set_cursor_visible(false);
        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    /// One session iteration: transitions, draw, present, book the next deadline.
    fn tick(&mut self) -> Result<StepOutcome> {
        let (Some(renderer), Some(pixels)) = (self.renderer.as_mut(), self.pixels.as_mut()) else {
            return Ok(StepOutcome::Running);
        };
        let outcome = self.driver.tick(renderer)?;
        let stats = renderer.present(pixels.frame_mut())?;
        pixels.render()?;
        log::trace!(
            "frame: clear {:.3} ms, draw {:.3} ms, copy {:.3} ms, {} dirty",
            stats.clear.as_secs_f64() * 1e3,
            stats.draw.as_secs_f64() * 1e3,
            stats.copy.as_secs_f64() * 1e3,
            stats.dirty_count,
        );
        Ok(outcome)
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(new_size.width, new_size.height) {
                log::warn!("failed to resize surface: {e}");
            }
            if let Err(e) = pixels.resize_buffer(new_size.width, new_size.height) {
                log::warn!("failed to resize buffer: {e}");
            }
        }
        if let Some(renderer) = &mut self.renderer {
            if let Err(e) = renderer.resize(new_size.width, new_size.height) {
                log::warn!("failed to resize canvas: {e:#}");
            }
        }
        log::info!("display resized to {}x{}", new_size.width, new_size.height);
    }

    fn exit(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.error = Some(err);
        self.exit(event_loop);
    }
}

impl<U: UniformSource> ApplicationHandler for App<U> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_surface(event_loop) {
                self.fail(event_loop, e.context("creating window and surface"));
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.cancel.cancel();
                self.exit(event_loop);
            }
            WindowEvent::RedrawRequested => {
                if let Some(pixels) = &self.pixels {
                    if let Err(e) = pixels.render() {
                        log::warn!("redraw failed: {e}");
                    }
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                if event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    self.cancel.cancel();
                    self.exit(event_loop);
                }
            }
            WindowEvent::Resized(size) => self.handle_resize(size),
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(window) = &self.window {
                    let size = window.inner_size();
                    self.handle_resize(size);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            self.driver.abort();
            self.exit(event_loop);
            return;
        }
        if self.driver.scheduler().is_due(Instant::now()) {
            match self.tick() {
                Ok(StepOutcome::Finished) => {
                    log::info!("session finished");
                    self.exit(event_loop);
                    return;
                }
                Ok(StepOutcome::Running) => {}
                Err(e) => {
                    self.fail(event_loop, e);
                    return;
                }
            }
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.driver.scheduler().next_deadline()));
    }
}
