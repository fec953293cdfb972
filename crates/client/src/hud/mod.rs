//! Status overlay: the UI chrome around the camera view.
//!
//! On WASM: DOM elements layered over the canvas
//! On Native: window title plus log lines

use poseview_core::UiState;

/// Platform-specific status overlay.
pub trait Hud {
    /// Resize the overlay viewport.
    fn resize(&mut self, width: u32, height: u32);

    /// Show `state`. Returns true when anything visible changed.
    fn update(&mut self, state: &UiState) -> bool;
}

#[cfg(all(target_arch = "wasm32", feature = "wasm"))]
mod web;

#[cfg(all(target_arch = "wasm32", feature = "wasm"))]
pub use web::WebHud;

#[cfg(not(target_arch = "wasm32"))]
mod native;

#[cfg(not(target_arch = "wasm32"))]
pub use native::NativeHud;
