//! Native application state and event loop handler.

use std::sync::Arc;
use std::time::Instant;

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::ActiveEventLoop,
    window::{Window, WindowId},
};

use poseview_core::{
    FrameRequest, FrameScheduler, OverlayConfig, SessionController, TrackerBridge, UiCommand,
    ViewportGeometry,
};

use crate::hud::{Hud, NativeHud};
use crate::input::InputHandler;
use crate::renderer::WgpuSurface;
use crate::simulated::{SimulatedTracker, SyntheticOpener};

const APP_NAME: &str = "Poseview";

/// Schedules frames through winit redraw requests.
pub struct WindowScheduler {
    window: Arc<Window>,
    next: u64,
    start: Instant,
}

impl WindowScheduler {
    pub fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            next: 0,
            start: Instant::now(),
        }
    }
}

impl FrameScheduler for WindowScheduler {
    fn request_frame(&mut self) -> FrameRequest {
        self.next += 1;
        self.window.request_redraw();
        FrameRequest(self.next)
    }

    fn cancel_frame(&mut self, _request: FrameRequest) {
        // Redraw requests cannot be withdrawn; the session ignores the
        // callback once its loop is cancelled.
    }

    fn now_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Main application state.
pub struct App {
    config: OverlayConfig,
    window: Option<Arc<Window>>,
    session: Option<SessionController>,
    input: InputHandler,
    hud: NativeHud,
}

impl App {
    pub fn new(config: OverlayConfig) -> Self {
        Self {
            config,
            window: None,
            session: None,
            input: InputHandler::new(),
            hud: NativeHud::new(APP_NAME),
        }
    }

    fn init_window(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window_attrs = Window::default_attributes()
            .with_title(APP_NAME)
            .with_inner_size(PhysicalSize::new(1280, 720));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let size = window.inner_size();
        let geometry = ViewportGeometry::from_dimensions(size.width, size.height);
        self.input.resize(size.width, size.height);
        self.hud.resize(size.width, size.height);

        let tracker = TrackerBridge::new(Box::new(SimulatedTracker::new(true)));
        let scheduler = WindowScheduler::new(window.clone());
        let mut session = SessionController::new(self.config.clone(), geometry, tracker, Box::new(scheduler));
        session.start();
        session.acquire_video(&mut SyntheticOpener);

        // Initialize the surface synchronously on native
        let surface = pollster::block_on(WgpuSurface::new(
            window.clone(),
            size.width,
            size.height,
            self.config.clear_color,
        ))?;
        session.attach_surface(Box::new(surface));

        self.window = Some(window);
        self.session = Some(session);
        tracing::info!("Window and session initialized");
        Ok(())
    }

    fn command(&mut self, command: Option<UiCommand>) {
        if let (Some(command), Some(session)) = (command, &mut self.session) {
            tracing::debug!("Command: {command:?}");
            session.command(command);
        }
    }

    fn refresh_hud(&mut self) {
        let (Some(session), Some(window)) = (&self.session, &self.window) else {
            return;
        };
        if self.hud.update(&session.ui()) {
            window.set_title(self.hud.title());
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new(OverlayConfig::default())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init_window(event_loop) {
            tracing::error!("Failed to initialize: {e:#}");
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                tracing::info!("Close requested, exiting");
                if let Some(session) = &mut self.session {
                    session.teardown();
                }
                event_loop.exit();
            }

            WindowEvent::Resized(new_size) => {
                self.input.resize(new_size.width, new_size.height);
                self.hud.resize(new_size.width, new_size.height);
                if let Some(session) = &mut self.session {
                    session.resize(ViewportGeometry::from_dimensions(new_size.width, new_size.height));
                }
            }

            WindowEvent::RedrawRequested => {
                if let Some(session) = &mut self.session {
                    session.tick();
                }
                self.refresh_hud();
            }

            WindowEvent::CursorMoved { position, .. } => {
                self.input.process_cursor_moved(position.x, position.y);
            }

            WindowEvent::CursorLeft { .. } => self.input.process_cursor_left(),

            WindowEvent::MouseInput { state, button, .. } => {
                let command = self.input.process_mouse_button(button, state);
                self.command(command);
            }

            WindowEvent::Touch(touch) => {
                let command = self
                    .input
                    .process_touch(touch.phase, touch.location.x, touch.location.y);
                self.command(command);
            }

            WindowEvent::KeyboardInput { event, .. } => {
                tracing::trace!("Key event: {:?}", event);
                let command = self.input.process_key(event.physical_key, event.state);
                self.command(command);
            }

            _ => {}
        }
    }
}
