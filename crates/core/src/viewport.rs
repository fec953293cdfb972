//! Viewport size and orientation.

use std::sync::atomic::{AtomicBool, Ordering};

/// Set once an unclassifiable orientation has been logged.
static UNKNOWN_LOGGED: AtomicBool = AtomicBool::new(false);

/// Device orientation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    Landscape,
    Portrait,
    #[default]
    Unknown,
}

impl Orientation {
    /// Classify a screen-orientation type string (`landscape-primary`, ...).
    pub fn from_screen_type(kind: Option<&str>) -> Self {
        match kind {
            Some("landscape-primary" | "landscape-secondary") => Self::Landscape,
            Some("portrait-primary" | "portrait-secondary") => Self::Portrait,
            Some(other) => {
                if !UNKNOWN_LOGGED.swap(true, Ordering::Relaxed) {
                    tracing::debug!("Unrecognized screen orientation {other:?}");
                }
                Self::Unknown
            }
            None => {
                if !UNKNOWN_LOGGED.swap(true, Ordering::Relaxed) {
                    tracing::debug!("Screen orientation API not available");
                }
                Self::Unknown
            }
        }
    }

    /// Classify by aspect, for hosts without an orientation API.
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        match width.cmp(&height) {
            std::cmp::Ordering::Greater => Self::Landscape,
            std::cmp::Ordering::Less => Self::Portrait,
            std::cmp::Ordering::Equal => Self::Unknown,
        }
    }
}

/// Current viewport dimensions plus orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewportGeometry {
    pub width: u32,
    pub height: u32,
    pub orientation: Orientation,
}

impl ViewportGeometry {
    pub fn new(width: u32, height: u32, orientation: Orientation) -> Self {
        Self {
            width,
            height,
            orientation,
        }
    }

    /// Geometry with orientation derived from the dimensions.
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        Self::new(width, height, Orientation::from_dimensions(width, height))
    }

    /// Width / height, or 1.0 for a degenerate viewport.
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}
