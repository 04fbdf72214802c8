use anyhow::Result;
use cff_core::TrialResult;
use cff_render::FlickerRenderer;
use cff_session::{SessionConfig, SessionStateMachine};
use cff_timing::{HighPrecisionTimer, Timer};
use pixels::{Pixels, SurfaceTexture};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowId},
};

const RESULTS_FILE: &str = "cff_results.json";

#[derive(Serialize)]
struct SessionReport<'a> {
    trials: &'a [TrialResult],
    median_hz: f64,
}

pub struct App {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    session: SessionStateMachine<HighPrecisionTimer>,
    renderer: Option<FlickerRenderer>,
    current_size: Option<PhysicalSize<u32>>,
    scale_factor: f64,
    refresh_rate: Option<f64>,
    results_exported: bool,
    should_exit: bool,
}

impl App {
    pub fn new() -> Result<Self> {
        let config = SessionConfig::default();
        let timer = HighPrecisionTimer::new();
        let session = SessionStateMachine::new(config, timer);

        Ok(Self {
            window: None,
            pixels: None,
            session,
            renderer: None,
            current_size: None,
            scale_factor: 1.0,
            refresh_rate: None,
            results_exported: false,
            should_exit: false,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        println!("=== FLICKER FUSION TEST ===");
        println!("Platform: {}", std::env::consts::OS);
        println!("SPACE to begin / report fusion, R to retry, ESC to exit.\n");

        event_loop.run_app(&mut self).map_err(Into::into)
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let primary_monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow::anyhow!("No monitor available"))?;

        self.refresh_rate = primary_monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let window_attributes = Window::default_attributes()
            .with_title("Flicker Fusion Test")
            .with_fullscreen(Some(Fullscreen::Borderless(Some(primary_monitor.clone()))))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let physical_size = window.inner_size();
        self.current_size = Some(physical_size);
        self.scale_factor = window.scale_factor();

        println!("Display Configuration:");
        println!(
            "  Physical size: {}x{}",
            physical_size.width, physical_size.height
        );
        println!("  Scale factor: {:.2}", self.scale_factor);
        if let Some(refresh_rate) = self.refresh_rate {
            println!("  Refresh rate: {:.1} Hz", refresh_rate);
            // Floor the pulse period at the display's real refresh
            // granularity instead of the 60 Hz default.
            if refresh_rate > 0.0 {
                self.session.config.floor_period_s = 1.0 / refresh_rate;
            }
        }

        let surface_texture =
            SurfaceTexture::new(physical_size.width, physical_size.height, window.clone());
        self.pixels = Some(Pixels::new(
            physical_size.width,
            physical_size.height,
            surface_texture,
        )?);
        self.renderer = Some(FlickerRenderer::new(
            physical_size.width,
            physical_size.height,
        )?);

        window.set_cursor_visible(false);
        window.request_redraw();
        self.window = Some(window);

        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        let (Some(pixels), Some(renderer)) = (self.pixels.as_mut(), self.renderer.as_mut()) else {
            return Ok(());
        };

        let frame_start = self.session.timer.now();
        let phase = self.session.phase();
        let levels = self.session.light_levels();
        let progress = self.session.trial_progress();
        let median = self.session.median_frequency();

        renderer.render_frame(
            phase,
            levels,
            progress,
            self.session.results(),
            median,
            pixels.frame_mut(),
        )?;
        pixels.render()?;

        let frame_time = self.session.timer.elapsed(frame_start);
        self.session.timer.record_frame(frame_time);

        Ok(())
    }

    fn update(&mut self) {
        let events = self.session.update();
        for event in events {
            self.session.handle_event(event);
        }

        if self.session.is_complete() && !self.results_exported {
            if let Err(e) = self.export_results() {
                eprintln!("Failed to write {}: {}", RESULTS_FILE, e);
            }
            self.results_exported = true;
        }
    }

    fn export_results(&self) -> Result<()> {
        let report = SessionReport {
            trials: self.session.results(),
            median_hz: self.session.median_frequency(),
        };
        let file = std::fs::File::create(RESULTS_FILE)?;
        serde_json::to_writer_pretty(file, &report)?;
        println!("Results written to {}", RESULTS_FILE);
        Ok(())
    }

    fn handle_input(&mut self, key: winit::keyboard::PhysicalKey, event_loop: &ActiveEventLoop) {
        use winit::keyboard::{KeyCode, PhysicalKey};
        let PhysicalKey::Code(code) = key else {
            return;
        };
        match code {
            KeyCode::Space => {
                if self.session.phase().is_idle() {
                    self.session.begin_trial();
                } else if self.session.phase().accepts_fusion_report() {
                    self.session.report_fusion_detected();
                }
            }
            KeyCode::KeyR => {
                if self.session.phase().is_finished() {
                    self.session.reset();
                    self.results_exported = false;
                }
            }
            KeyCode::Escape => self.cleanup_and_exit(event_loop),
            _ => {}
        }
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        self.current_size = Some(new_size);
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(new_size.width, new_size.height) {
                eprintln!("Failed to resize surface: {}", e);
            }
            if let Err(e) = pixels.resize_buffer(new_size.width, new_size.height) {
                eprintln!("Failed to resize buffer: {}", e);
            }
        }
        if let Some(renderer) = &mut self.renderer {
            renderer.resize(new_size.width, new_size.height);
        }
    }

    fn cleanup_and_exit(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        let stats = self.session.timer.calibration_stats();
        if stats.effective_fps > 0.0 {
            println!(
                "Frame stats: {:.3} ms avg, jitter {:.3} ms, {:.1} fps",
                stats.average_frame_time_ns / 1e6,
                stats.jitter_ns / 1e6,
                stats.effective_fps,
            );
        }
        self.should_exit = true;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_surface(event_loop) {
                eprintln!("Failed to create window and surface: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.cleanup_and_exit(event_loop),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render() {
                    eprintln!("Render failed: {}", e);
                    self.cleanup_and_exit(event_loop);
                    return;
                }
                self.update();
                // Only the flicker itself needs tight polling; idle screens
                // are paced down to spare the CPU.
                if !self.session.phase().has_active_trial() {
                    self.session.timer.sleep(Duration::from_millis(10));
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                self.handle_input(event.physical_key, event_loop);
            }
            WindowEvent::Resized(size) => self.handle_resize(size),
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.scale_factor = scale_factor;
                if let Some(window) = &self.window {
                    self.handle_resize(window.inner_size());
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
