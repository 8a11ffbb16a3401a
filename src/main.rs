// =============================================================================
// VULKAN TEMPLATE - One window, one pipeline, one textured quad
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit event loop, window, FPS stats)                      │
// │    └── Renderer                                                 │
// │          ├── VulkanDevice (instance, surface, queue, allocator) │
// │          ├── Swapchain + render targets                         │
// │          ├── FramePacer (fences, semaphores, command buffers)   │
// │          └── Pipeline, texture, uniforms, quad, overlay         │
// └─────────────────────────────────────────────────────────────────┘
//
// Build with `--features dynamic-rendering` to render through Vulkan 1.3
// dynamic rendering instead of a render pass.
//
// =============================================================================

mod backend;
mod config;
mod file_loader;
mod overlay;
mod quad;
mod renderer;
mod uniform;

use anyhow::{Context, Result};
use config::Config;
use renderer::Renderer;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml. Its outcome is reported once
    // the logger it configures is running.
    let (config, source) = Config::load();

    init_logging(&config)?;
    log::info!("Starting Vulkan template");
    source.log();
    log::debug!("Config: {:?}", config);
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    if let Some(e) = app.error.take() {
        return Err(e);
    }
    Ok(())
}

/// Initialize logging at the configured level. `RUST_LOG` still overrides it.
fn init_logging(config: &Config) -> Result<()> {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let level = config
        .debug
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::Info);

    let mut builder = Builder::new();
    builder.filter_level(level);
    builder.parse_default_env();

    if let Some(path) = &config.debug.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {:?}", path))?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

// =============================================================================
// FPS TRACKING
// =============================================================================

/// Counts presented frames and reports a rate once per second
#[derive(Debug)]
pub struct FrameStats {
    frames: u32,
    window_start: Instant,
    last_frame: Instant,
    frame_time: Duration,
}

const STATS_INTERVAL: Duration = Duration::from_secs(1);

impl FrameStats {
    pub fn new(now: Instant) -> Self {
        Self {
            frames: 0,
            window_start: now,
            last_frame: now,
            frame_time: Duration::ZERO,
        }
    }

    /// Count a frame presented at `now`. Returns the frames per second once
    /// a full interval has passed, then starts a new interval.
    pub fn record_frame(&mut self, now: Instant) -> Option<f32> {
        self.frame_time = now.saturating_duration_since(self.last_frame);
        self.last_frame = now;
        self.frames += 1;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < STATS_INTERVAL {
            return None;
        }

        let fps = self.frames as f32 / elapsed.as_secs_f32();
        self.frames = 0;
        self.window_start = now;
        Some(fps)
    }

    pub fn frame_time_ms(&self) -> f32 {
        self.frame_time.as_secs_f32() * 1000.0
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Window plus renderer. The renderer is declared first so it is dropped
/// before the window its surface belongs to.
pub struct App {
    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,
    config: Config,
    is_fullscreen: bool,
    stats: FrameStats,
    error: Option<anyhow::Error>,
}

impl App {
    pub fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        Self {
            renderer: None,
            window: None,
            config,
            is_fullscreen,
            stats: FrameStats::new(Instant::now()),
            error: None,
        }
    }

    // =========================================================================
    // FULLSCREEN TOGGLE
    // =========================================================================

    fn toggle_fullscreen(&mut self) {
        let Some(window) = &self.window else {
            return;
        };
        self.is_fullscreen = !self.is_fullscreen;

        if self.is_fullscreen {
            window.set_fullscreen(Some(Fullscreen::Borderless(None)));
            log::info!("Entered fullscreen mode");
        } else {
            window.set_fullscreen(None);
            log::info!("Exited fullscreen mode");
        }
        // The resulting Resized event triggers swapchain recreation
    }

    fn update_stats(&mut self) {
        let Some(fps) = self.stats.record_frame(Instant::now()) else {
            return;
        };
        log::debug!("{:.0} FPS ({:.2}ms)", fps, self.stats.frame_time_ms());

        if !self.config.debug.show_fps_in_title {
            return;
        }
        if let Some(window) = &self.window {
            let mode = if self.is_fullscreen { "fullscreen" } else { "windowed" };
            window.set_title(&format!(
                "{} - {:.0} FPS ({:.2}ms) [{}]",
                self.config.window.title,
                fps,
                self.stats.frame_time_ms(),
                mode
            ));
        }
    }

    /// Handle the result of one `draw_frame`. Returns false once rendering
    /// has failed; the error is kept for `main` to return.
    fn finish_frame(&mut self, result: Result<bool>) -> bool {
        match result {
            Ok(true) => {
                self.update_stats();
                true
            }
            Ok(false) => true,
            Err(e) => {
                log::error!("Render error: {:?}", e);
                self.error = Some(e);
                false
            }
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("Failed to initialize: {:?}", error);
        self.error = Some(error);
        event_loop.exit();
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_resizable(self.config.window.resizable)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => return self.fail(event_loop, anyhow::anyhow!("Failed to create window: {e}")),
        };

        match Renderer::new(&self.config, &window) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => return self.fail(event_loop, e),
        }

        self.window = Some(window);
    }

    /// Handle window events.
    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        if let Some(renderer) = &mut self.renderer {
            renderer.handle_window_event(&event);
        }

        match event {
            // ─────────────────────────────────────────────────────────────────
            // CLOSE REQUEST
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            // ─────────────────────────────────────────────────────────────────
            // WINDOW RESIZED
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(renderer) = &mut self.renderer {
                    renderer.notify_resized(size.width, size.height);
                }
            }

            // ─────────────────────────────────────────────────────────────────
            // REDRAW REQUESTED
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::RedrawRequested => {
                let Some(renderer) = &mut self.renderer else {
                    return;
                };
                let result = renderer.draw_frame();
                if !self.finish_frame(result) {
                    event_loop.exit();
                }
            }

            // ─────────────────────────────────────────────────────────────────
            // KEYBOARD INPUT
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() && !event.repeat {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        match key {
                            KeyCode::Escape => {
                                log::info!("ESC pressed, exiting...");
                                event_loop.exit();
                            }
                            KeyCode::F11 => self.toggle_fullscreen(),
                            _ => {}
                        }
                    }
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws. A minimised window sleeps until the next
    /// event instead.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.renderer.as_ref().is_some_and(Renderer::is_minimized) {
            return;
        }
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        // GPU resources and the surface go before the window
        self.renderer.take();
        log::info!("Cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_report_within_first_second() {
        let start = Instant::now();
        let mut stats = FrameStats::new(start);
        for i in 1..10 {
            assert_eq!(stats.record_frame(start + Duration::from_millis(i * 100)), None);
        }
    }

    #[test]
    fn reports_rate_after_one_second() {
        let start = Instant::now();
        let mut stats = FrameStats::new(start);
        for i in 1..60 {
            stats.record_frame(start + Duration::from_millis(i * 16));
        }
        let fps = stats.record_frame(start + Duration::from_millis(1000)).unwrap();
        assert!((fps - 60.0).abs() < 0.01, "fps = {fps}");
    }

    #[test]
    fn counting_restarts_after_a_report() {
        let start = Instant::now();
        let mut stats = FrameStats::new(start);
        assert!(stats.record_frame(start + Duration::from_secs(1)).is_some());

        let later = start + Duration::from_secs(1);
        assert_eq!(stats.record_frame(later + Duration::from_millis(500)), None);
        let fps = stats.record_frame(later + Duration::from_secs(2)).unwrap();
        assert!((fps - 1.0).abs() < 0.01, "fps = {fps}");
    }

    #[test]
    fn frame_time_is_gap_between_frames() {
        let start = Instant::now();
        let mut stats = FrameStats::new(start);
        stats.record_frame(start + Duration::from_millis(10));
        stats.record_frame(start + Duration::from_millis(35));
        assert!((stats.frame_time_ms() - 25.0).abs() < 0.001);
    }

    #[test]
    fn render_errors_stop_the_loop_and_are_kept() {
        let mut app = App::new(Config::default());
        assert!(app.finish_frame(Ok(true)));
        assert!(app.finish_frame(Ok(false)));
        assert!(app.error.is_none());

        assert!(!app.finish_frame(Err(anyhow::anyhow!("Failed to submit draw command buffer"))));
        let error = app.error.take().unwrap();
        assert!(error.to_string().contains("submit"));
    }
}
