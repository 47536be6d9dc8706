use anyhow::{Context, Result, anyhow};
use pixels::{Pixels, SurfaceTexture};
use rand::rngs::StdRng;
use shapecat_core::{ResponseKey, TaskPhase};
use shapecat_experiment::{ExperimentEvent, ExperimentStateMachine};
use shapecat_render::{ScreenView, SkiaRenderer};
use shapecat_timing::{HighPrecisionTimer, Timer};
use std::sync::Arc;
use tracing::{error, info, trace, warn};
use winit::{
    application::ApplicationHandler,
    dpi::{LogicalSize, PhysicalSize},
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Fullscreen, Window, WindowId},
};

use crate::config::DisplayConfig;

pub type TaskMachine = ExperimentStateMachine<TaskPhase, HighPrecisionTimer, StdRng>;

pub struct App {
    // Declared before the window so the surface is dropped first
    pixels: Option<Pixels>,
    window: Option<Arc<Window>>,
    experiment: TaskMachine,
    renderer: Option<SkiaRenderer>,
    display: DisplayConfig,
    frame_timer: HighPrecisionTimer,
    current_size: Option<PhysicalSize<u32>>,
    scale_factor: f64,
    refresh_rate: Option<f64>,

    should_exit: bool,
}

impl App {
    pub fn new(experiment: TaskMachine, display: DisplayConfig) -> Self {
        Self {
            pixels: None,
            window: None,
            experiment,
            renderer: None,
            display,
            frame_timer: HighPrecisionTimer::new(),
            current_size: None,
            scale_factor: 1.0,
            refresh_rate: None,
            should_exit: false,
        }
    }

    pub fn run(mut self) -> Result<TaskMachine> {
        let event_loop = EventLoop::new()?;
        info!(
            platform = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            "starting categorization task"
        );

        event_loop.run_app(&mut self)?;
        self.log_frame_stats();

        // Window closed by the OS without an escape or completion
        if !self.experiment.is_finished() {
            self.experiment.handle_event(ExperimentEvent::Abort);
        }
        Ok(self.experiment)
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let primary_monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next());

        self.refresh_rate = primary_monitor
            .as_ref()
            .and_then(|m| m.refresh_rate_millihertz())
            .map(|rate| rate as f64 / 1000.0);

        let mut window_attributes = Window::default_attributes().with_title("shapecat");
        window_attributes = match (self.display.fullscreen, primary_monitor) {
            (true, Some(monitor)) => window_attributes
                .with_fullscreen(Some(Fullscreen::Borderless(Some(monitor))))
                .with_resizable(false),
            (true, None) => return Err(anyhow!("no monitor available for fullscreen")),
            (false, _) => window_attributes.with_inner_size(LogicalSize::new(
                self.display.width,
                self.display.height,
            )),
        };

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let physical_size = window.inner_size();
        self.current_size = Some(physical_size);
        self.scale_factor = window.scale_factor();

        info!(
            width = physical_size.width,
            height = physical_size.height,
            scale_factor = self.scale_factor,
            refresh_hz = self.refresh_rate,
            "display configured"
        );

        let surface_texture =
            SurfaceTexture::new(physical_size.width, physical_size.height, &*window);
        self.pixels = Some(
            Pixels::new(physical_size.width, physical_size.height, surface_texture)
                .context("failed to create pixel surface")?,
        );
        self.renderer = Some(SkiaRenderer::new(
            physical_size.width,
            physical_size.height,
        )?);

        window.set_cursor_visible(false);
        window.request_redraw();
        self.window = Some(window);

        Ok(())
    }

    fn view(&self) -> ScreenView {
        ScreenView {
            phase: *self.experiment.current_phase(),
            trial_state: self.experiment.current_trial_state(),
            stimulus: self.experiment.current_stimulus(),
            feedback: self.experiment.feedback(),
            volume: self.experiment.noise_volume(),
        }
    }

    fn render(&mut self) -> Result<()> {
        let view = self.view();
        let (Some(pix), Some(renderer)) = (self.pixels.as_mut(), self.renderer.as_mut()) else {
            return Ok(());
        };

        let stats = renderer.render_frame(&view, pix.frame_mut(), &mut self.frame_timer)?;
        let now = self.frame_timer.now();
        pix.render()?;
        let present = self.frame_timer.elapsed(now);

        trace!(
            present_ms = present.as_secs_f64() * 1e3,
            clear_ms = stats.clear.as_secs_f64() * 1e3,
            phase_ms = stats.phase.as_secs_f64() * 1e3,
            copy_ms = stats.copy.as_secs_f64() * 1e3,
            total_ms = stats.total.as_secs_f64() * 1e3,
            dirty = stats.dirty_count,
            "frame"
        );
        Ok(())
    }

    fn update(&mut self) {
        for event in self.experiment.update() {
            self.experiment.handle_event(event);
        }
    }

    fn handle_input(&mut self, key: ResponseKey, event_loop: &ActiveEventLoop) {
        for event in self.experiment.handle_key(key) {
            self.experiment.handle_event(event);
        }
        if self.experiment.is_finished() {
            self.cleanup_and_exit(event_loop);
        }
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 || self.current_size == Some(new_size) {
            return;
        }
        self.current_size = Some(new_size);
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(new_size.width, new_size.height) {
                error!(error = %e, "failed to resize surface");
            }
            if let Err(e) = pixels.resize_buffer(new_size.width, new_size.height) {
                error!(error = %e, "failed to resize buffer");
            }
        }
        if let Some(renderer) = &mut self.renderer {
            if let Err(e) = renderer.resize(new_size.width, new_size.height) {
                error!(error = %e, "failed to resize renderer");
            }
        }
        info!(
            width = new_size.width,
            height = new_size.height,
            scale_factor = self.scale_factor,
            "display resized"
        );
    }

    fn cleanup_and_exit(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        self.should_exit = true;
        event_loop.exit();
    }

    fn log_frame_stats(&self) {
        let stats = self.frame_timer.frame_stats();
        info!(
            frames = self.frame_timer.frame_count(),
            avg_ms = stats.average_frame_time_ns / 1e6,
            jitter_ms = stats.jitter_ns / 1e6,
            max_ms = stats.max_frame_time_ns / 1e6,
            "render timing"
        );
        if let Some(phase) = self
            .renderer
            .as_ref()
            .and_then(|r| r.component_stats("phase"))
        {
            info!(avg_ms = phase.average_frame_time_ns / 1e6, "phase draw timing");
        }
    }
}

/// Maps a logical key to the task's key alphabet
pub fn map_key(key: &Key) -> Option<ResponseKey> {
    match key {
        Key::Named(NamedKey::Space) => Some(ResponseKey::Space),
        Key::Named(NamedKey::Escape) => Some(ResponseKey::Escape),
        Key::Named(NamedKey::Enter) => Some(ResponseKey::Enter),
        Key::Named(NamedKey::ArrowLeft) => Some(ResponseKey::Left),
        Key::Named(NamedKey::ArrowRight) => Some(ResponseKey::Right),
        Key::Character(c) => match c.to_lowercase().as_str() {
            "z" => Some(ResponseKey::Z),
            "m" => Some(ResponseKey::M),
            "p" => Some(ResponseKey::P),
            _ => None,
        },
        _ => None,
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_surface(event_loop) {
                error!(error = %e, "failed to create window and surface");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                warn!("window closed before the session finished");
                self.experiment.handle_event(ExperimentEvent::Abort);
                self.cleanup_and_exit(event_loop);
            }
            WindowEvent::RedrawRequested => {
                self.update();
                if self.experiment.is_finished() {
                    self.cleanup_and_exit(event_loop);
                    return;
                }
                if let Err(e) = self.render() {
                    error!(error = %e, "render failed");
                    self.experiment.handle_event(ExperimentEvent::Abort);
                    self.cleanup_and_exit(event_loop);
                    return;
                }
                // The frame is on screen now, so a new stimulus gets its onset here
                self.experiment.mark_stimulus_presented();
                if let Some(win) = &self.window {
                    win.request_redraw();
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() && !event.repeat => {
                if let Some(key) = map_key(&event.logical_key) {
                    self.handle_input(key, event_loop);
                }
            }
            WindowEvent::Resized(sz) => self.handle_resize(sz),
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.scale_factor = scale_factor;
                if let Some(window) = &self.window {
                    let size = window.inner_size();
                    self.handle_resize(size);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_exit {
            event_loop.exit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_named_keys() {
        assert_eq!(map_key(&Key::Named(NamedKey::Space)), Some(ResponseKey::Space));
        assert_eq!(map_key(&Key::Named(NamedKey::Escape)), Some(ResponseKey::Escape));
        assert_eq!(map_key(&Key::Named(NamedKey::Enter)), Some(ResponseKey::Enter));
        assert_eq!(map_key(&Key::Named(NamedKey::ArrowLeft)), Some(ResponseKey::Left));
        assert_eq!(map_key(&Key::Named(NamedKey::Tab)), None);
    }

    #[test]
    fn test_map_characters_ignore_case() {
        assert_eq!(map_key(&Key::Character("z".into())), Some(ResponseKey::Z));
        assert_eq!(map_key(&Key::Character("M".into())), Some(ResponseKey::M));
        assert_eq!(map_key(&Key::Character("p".into())), Some(ResponseKey::P));
        assert_eq!(map_key(&Key::Character("x".into())), None);
    }
}
