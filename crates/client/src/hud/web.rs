//! Web status overlay built from DOM elements.

use poseview_core::UiState;
use wasm_bindgen::JsValue;
use web_sys::{Document, HtmlElement};

use super::Hud;

/// Status text, motion prompt and stop button layered over the canvas.
pub struct WebHud {
    status: HtmlElement,
    prompt: HtmlElement,
    stop_button: HtmlElement,
    state: Option<UiState>,
}

impl WebHud {
    pub fn new(document: &Document, parent: &HtmlElement) -> Result<Self, JsValue> {
        let status = create(document, "div", "poseview-status")?;
        set_style(
            &status,
            "position:absolute;left:0;right:0;bottom:16px;text-align:center;\
             color:#fff;font:16px sans-serif;pointer-events:none;",
        )?;

        let prompt = create(document, "div", "poseview-permission")?;
        set_style(
            &prompt,
            "position:absolute;inset:0;display:none;align-items:center;justify-content:center;\
             background:rgba(0,0,0,0.6);color:#fff;font:20px sans-serif;",
        )?;
        prompt.set_inner_text("Tap to allow motion sensors");

        let stop_button = create(document, "button", "poseview-stop")?;
        set_style(&stop_button, "position:absolute;top:16px;left:16px;display:none;")?;
        stop_button.set_inner_text("Stop");

        parent.append_child(&status)?;
        parent.append_child(&prompt)?;
        parent.append_child(&stop_button)?;

        Ok(Self {
            status,
            prompt,
            stop_button,
            state: None,
        })
    }

    /// The stop button, for wiring its click handler.
    pub fn stop_button(&self) -> &HtmlElement {
        &self.stop_button
    }

    /// The motion permission prompt. Tapping it grants permission.
    pub fn permission_prompt(&self) -> &HtmlElement {
        &self.prompt
    }
}

impl Hud for WebHud {
    fn resize(&mut self, _width: u32, _height: u32) {
        // Elements are laid out by CSS
    }

    fn update(&mut self, state: &UiState) -> bool {
        if self.state.as_ref() == Some(state) {
            return false;
        }
        self.status.set_inner_text(&state.status_line());
        let _ = self
            .prompt
            .style()
            .set_property("display", if state.permission_prompt { "flex" } else { "none" });
        let _ = self
            .stop_button
            .style()
            .set_property("display", if state.stop_button { "block" } else { "none" });
        self.state = Some(state.clone());
        true
    }
}

fn create(document: &Document, tag: &str, id: &str) -> Result<HtmlElement, JsValue> {
    use wasm_bindgen::JsCast;

    let element = document.create_element(tag)?;
    element.set_id(id);
    element
        .dyn_into::<HtmlElement>()
        .map_err(|_| JsValue::from_str("element is not an HtmlElement"))
}

fn set_style(element: &HtmlElement, css: &str) -> Result<(), JsValue> {
    element.set_attribute("style", css)
}
