//! Poseview Client
//!
//! Hosts the overlay session in a native window or in the browser.

#[cfg(all(feature = "native", not(target_arch = "wasm32")))]
pub mod app;
pub mod hud;
pub mod input;
pub mod renderer;
pub mod simulated;

#[cfg(all(target_arch = "wasm32", feature = "wasm"))]
pub mod wasm;

/// Config file read from the working directory on native.
pub const CONFIG_FILE: &str = "poseview.toml";

/// Run the overlay against the simulated tracker (native entry point).
#[cfg(all(feature = "native", not(target_arch = "wasm32")))]
pub fn run() -> anyhow::Result<()> {
    use app::App;
    use poseview_core::OverlayConfig;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    use winit::event_loop::EventLoop;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("poseview=debug".parse()?))
        .init();

    tracing::info!("Starting Poseview (native)");

    let config = OverlayConfig::load_or_default(CONFIG_FILE);
    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);

    event_loop.run_app(&mut app)?;

    Ok(())
}

/// WASM entry point - called when the module is instantiated.
///
/// The session itself starts from JavaScript via [`wasm::start_session`]
/// once the page has a tracker module to hand over.
#[cfg(all(target_arch = "wasm32", feature = "wasm"))]
#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn wasm_start() {
    console_error_panic_hook::set_once();
    tracing_wasm::set_as_global_default();

    tracing::info!("Starting Poseview (WASM)");
}
