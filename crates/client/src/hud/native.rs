//! Native status overlay.
//!
//! There is no text rendering on native; the status line goes to the
//! window title and the log.

use poseview_core::UiState;

use super::Hud;

/// Native HUD: keeps the title the host should show.
pub struct NativeHud {
    app_name: String,
    state: Option<UiState>,
    title: String,
    size: (u32, u32),
}

impl NativeHud {
    pub fn new(app_name: impl Into<String>) -> Self {
        let app_name = app_name.into();
        Self {
            title: app_name.clone(),
            app_name,
            state: None,
            size: (0, 0),
        }
    }

    /// Window title for the current state.
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }
}

impl Hud for NativeHud {
    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    fn update(&mut self, state: &UiState) -> bool {
        if self.state.as_ref() == Some(state) {
            return false;
        }
        let line = state.status_line();
        if state.error.is_some() {
            tracing::error!("{line}");
        } else {
            tracing::info!("{line}");
        }
        self.title = format!("{} - {line}", self.app_name);
        self.state = Some(state.clone());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_follows_state() {
        let mut hud = NativeHud::new("Poseview");
        assert_eq!(hud.title(), "Poseview");

        let state = UiState {
            initializing: true,
            ..Default::default()
        };
        assert!(hud.update(&state));
        assert_eq!(hud.title(), "Poseview - Initializing...");

        // Same state again is not a change
        assert!(!hud.update(&state));
    }
}
