//! Input handling for the client.
//!
//! Converts platform input events to session commands.

use poseview_core::UiCommand;
use winit::event::{ElementState, MouseButton, TouchPhase};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Tracks pointer position and maps clicks, touches and keys to
/// [`UiCommand`]s.
#[derive(Debug, Default)]
pub struct InputHandler {
    cursor: Option<(f32, f32)>,
    viewport: (u32, u32),
}

impl InputHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track the viewport so keyboard locates can aim at its center.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    pub fn process_cursor_moved(&mut self, x: f64, y: f64) {
        self.cursor = Some((x as f32, y as f32));
    }

    pub fn process_cursor_left(&mut self) {
        self.cursor = None;
    }

    /// A left click at the cursor is a tap.
    pub fn process_mouse_button(&mut self, button: MouseButton, state: ElementState) -> Option<UiCommand> {
        if button != MouseButton::Left || state != ElementState::Pressed {
            return None;
        }
        let (x, y) = self.cursor?;
        Some(UiCommand::Tap { x, y })
    }

    /// A touch start is a tap.
    pub fn process_touch(&mut self, phase: TouchPhase, x: f64, y: f64) -> Option<UiCommand> {
        (phase == TouchPhase::Started).then_some(UiCommand::Tap {
            x: x as f32,
            y: y as f32,
        })
    }

    /// Process a key event.
    pub fn process_key(&mut self, key: PhysicalKey, state: ElementState) -> Option<UiCommand> {
        if state != ElementState::Pressed {
            return None;
        }
        match key {
            PhysicalKey::Code(KeyCode::Space) | PhysicalKey::Code(KeyCode::Enter) => {
                let (width, height) = self.viewport;
                Some(UiCommand::Tap {
                    x: width as f32 / 2.0,
                    y: height as f32 / 2.0,
                })
            }
            PhysicalKey::Code(KeyCode::KeyM) => Some(UiCommand::GrantMotionPermission),
            PhysicalKey::Code(KeyCode::Escape) | PhysicalKey::Code(KeyCode::KeyS) => {
                Some(UiCommand::Stop)
            }
            _ => None,
        }
    }
}
