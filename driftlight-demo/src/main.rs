//! Minimal host application: opens one window and drives the orchestrator's
//! `update`/`draw_frame` loop every redraw. Exists to give `Orchestrator` a
//! real caller — everything it does (camera, asset set, render options) is
//! a fixed placeholder scene, not an editor.

use std::path::PathBuf;
use std::sync::Arc;

use driftlight_core::camera::{Camera, Frustum};
use driftlight_core::gpu_records::RenderOptions;
use driftlight_core::gpu_types::Viewport;
use driftlight_vulkan::Orchestrator;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

const INITIAL_WIDTH: u32 = 1280;
const INITIAL_HEIGHT: u32 = 720;

struct Demo {
    window: Option<Arc<Window>>,
    orchestrator: Option<Orchestrator>,
    start: std::time::Instant,
    last_frame: std::time::Instant,
}

impl Demo {
    fn new() -> Self {
        let now = std::time::Instant::now();
        Self { window: None, orchestrator: None, start: now, last_frame: now }
    }

    fn camera(&self, width: u32, height: u32) -> Camera {
        let eye = glam::Vec3::new(0.0, 2.0, 6.0);
        let view = glam::Mat4::look_at_rh(eye, glam::Vec3::ZERO, glam::Vec3::Y);
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        let proj = glam::Mat4::perspective_rh(60f32.to_radians(), aspect, 0.1, 500.0);
        let frustum = Frustum::from_view_projection(&(proj * view));
        let viewport = Viewport { x: 0.0, y: 0.0, width: width as f32, height: height as f32, min_depth: 0.0, max_depth: 1.0 };
        Camera::new(view, proj, frustum, viewport)
    }
}

impl ApplicationHandler for Demo {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = Window::default_attributes().with_title("driftlight-demo").with_inner_size(winit::dpi::LogicalSize::new(INITIAL_WIDTH, INITIAL_HEIGHT));
        let window = Arc::new(event_loop.create_window(attrs).expect("failed to create window"));

        let session_config_path = PathBuf::from("driftlight-session.json");
        let shader_dir = PathBuf::from("shaders");
        let orchestrator = Orchestrator::init(window.as_ref(), window.as_ref(), (INITIAL_WIDTH, INITIAL_HEIGHT), session_config_path, shader_dir)
            .expect("failed to initialize orchestrator");

        self.window = Some(window);
        self.orchestrator = Some(orchestrator);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(orchestrator) = &mut self.orchestrator {
                    orchestrator.notify_resized(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(window) = &self.window else { return };
                let Some(orchestrator) = &mut self.orchestrator else { return };

                let now = std::time::Instant::now();
                let delta = (now - self.last_frame).as_secs_f32();
                let time = (now - self.start).as_secs_f32();
                self.last_frame = now;

                let size = window.inner_size();
                let camera = self.camera(size.width, size.height);
                let camera_world_position = glam::Vec3::new(0.0, 2.0, 6.0);
                let light_dir = glam::Vec3::new(-0.4, -1.0, -0.3).normalize();

                if let Err(err) = orchestrator.update(&camera, None, light_dir, delta, time, false, RenderOptions::default(), camera_world_position) {
                    log::error!("update failed: {err}");
                    return;
                }
                if let Err(err) = orchestrator.draw_frame() {
                    log::error!("draw_frame failed: {err}");
                }

                window.request_redraw();
            }
            _ => {}
        }
    }
}

fn main() {
    env_logger::init();

    let event_loop = EventLoop::new().expect("failed to create event loop");
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut demo = Demo::new();
    event_loop.run_app(&mut demo).expect("event loop failed");
}
