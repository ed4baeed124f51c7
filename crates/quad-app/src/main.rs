// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use quad_core::init_tracing;
use quad_render::{FrameOutcome, RenderSize, Renderer};
use quad_render_vk::VkRenderer;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use quad_platform::winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    raw_window_handle::{HasDisplayHandle, HasWindowHandle},
    window::{Window, WindowId},
};

mod config;
mod pacing;

use config::{load_cfg, AppCfg};
use pacing::{pace, Pace};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; missing means defaults
    #[arg(long, default_value = "quad.toml")]
    config: PathBuf,
    /// Window width override
    #[arg(long)]
    width: Option<u32>,
    /// Window height override
    #[arg(long)]
    height: Option<u32>,
    /// Never enable the validation layer
    #[arg(long)]
    no_validation: bool,
}

struct App {
    cfg: AppCfg,
    // Declared before `window` so it drops first.
    renderer: Option<VkRenderer>,
    window: Option<Window>,
    fatal: Option<anyhow::Error>,
    exiting: bool,
    // Set when the renderer skips a frame (zero-area surface); cleared by a usable resize.
    paused: bool,

    frames: u32,
    last_fps_instant: Instant,
    next_frame_deadline: Option<Instant>,
}

impl App {
    fn new(cfg: AppCfg) -> Self {
        App {
            cfg,
            renderer: None,
            window: None,
            fatal: None,
            exiting: false,
            paused: false,
            frames: 0,
            last_fps_instant: Instant::now(),
            next_frame_deadline: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let size = self.cfg.window_size();
        let attrs = Window::default_attributes()
            .with_title(self.cfg.window.title.clone())
            .with_inner_size(PhysicalSize::new(size.width, size.height));
        let window = event_loop.create_window(attrs).context("create_window")?;

        let inner = window.inner_size();
        let render_size = RenderSize::new(inner.width, inner.height);
        let wh = window.window_handle().map_err(|e| anyhow!("window_handle: {e}"))?;
        let dh = window.display_handle().map_err(|e| anyhow!("display_handle: {e}"))?;

        let renderer = VkRenderer::new(&wh, &dh, render_size, &self.cfg.render_options())?;
        info!(
            "window {}x{}, frame interval {:?}",
            render_size.width,
            render_size.height,
            self.cfg.frame_interval()
        );

        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    /// Stops the loop; `main` reports the error once `run_app` returns.
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.fatal = Some(err);
        self.shutdown(event_loop);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init(event_loop) {
                self.fail(event_loop, e.context("renderer init"));
                return;
            }
        }
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                let size = RenderSize::new(new_size.width, new_size.height);
                debug!("Resized → {}x{}", size.width, size.height);
                self.paused = size.is_empty();
                self.next_frame_deadline = None;
                if let Some(renderer) = &mut self.renderer {
                    if let Err(e) = renderer.resize(size) {
                        self.fail(event_loop, e);
                        return;
                    }
                }
                if let Some(w) = &self.window {
                    w.request_redraw();
                }
            }

            WindowEvent::RedrawRequested => {
                if self.exiting {
                    return;
                }
                let Some(renderer) = &mut self.renderer else {
                    return;
                };
                match renderer.render() {
                    Ok(FrameOutcome::Presented | FrameOutcome::PresentedThenRebuilt) => {
                        self.frames = self.frames.saturating_add(1);
                    }
                    Ok(FrameOutcome::Rebuilt) => {}
                    Ok(FrameOutcome::Skipped) => {
                        if !self.paused {
                            info!("renderer paused; waiting for a usable size");
                        }
                        self.paused = true;
                    }
                    Err(e) => self.fail(event_loop, e),
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }

        let now = Instant::now();
        match pace(
            self.paused,
            self.next_frame_deadline,
            now,
            self.cfg.frame_interval(),
        ) {
            Pace::Sleep => {
                // Zero-area surface: block until the window changes.
                event_loop.set_control_flow(ControlFlow::Wait);
                self.next_frame_deadline = None;
                self.frames = 0;
                return;
            }
            Pace::Redraw { next } => {
                // Schedule the next deadline first, then ask for one redraw.
                self.next_frame_deadline = Some(next);
                event_loop.set_control_flow(ControlFlow::WaitUntil(next));
                if let Some(w) = &self.window {
                    w.request_redraw();
                }
            }
            Pace::WaitUntil(deadline) => {
                event_loop.set_control_flow(ControlFlow::WaitUntil(deadline));
            }
        }

        if now.duration_since(self.last_fps_instant) >= Duration::from_secs(1) {
            debug!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut cfg = load_cfg(&args.config);
    cfg.apply_overrides(args.width, args.height, args.no_validation);
    debug!("config: {cfg:?}");

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
