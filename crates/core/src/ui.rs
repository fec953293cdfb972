//! UI commands and the state the status overlay renders from.

/// User intent, produced by the host's input mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UiCommand {
    /// Tap at a viewport point, in pixels. Dismisses the motion prompt
    /// when it is up, locates otherwise.
    Tap { x: f32, y: f32 },
    /// Explicit grant from a permission button.
    GrantMotionPermission,
    /// Stop button.
    Stop,
}

/// What the status overlay should show.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiState {
    /// Spinner while the session initializes.
    pub initializing: bool,
    /// Motion permission prompt.
    pub permission_prompt: bool,
    /// Tap-to-locate hint.
    pub tap_to_locate: bool,
    /// Stop button.
    pub stop_button: bool,
    /// Fatal initialization error.
    pub error: Option<String>,
    /// Most recent locate failure.
    pub locate_error: Option<String>,
}

impl UiState {
    /// One-line summary for text-only overlays.
    pub fn status_line(&self) -> String {
        if let Some(error) = &self.error {
            return format!("Error: {error}");
        }
        if self.initializing {
            return "Initializing...".to_string();
        }
        if self.permission_prompt {
            return "Tap to allow motion sensors".to_string();
        }
        let mut line = if self.stop_button {
            "Tracking".to_string()
        } else if self.tap_to_locate {
            "Tap the target to start tracking".to_string()
        } else {
            "Stopped".to_string()
        };
        if let Some(locate_error) = &self.locate_error {
            line.push_str(&format!(" ({locate_error})"));
        }
        line
    }
}
