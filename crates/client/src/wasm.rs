//! WASM-specific implementation.
//!
//! Binds the session to the browser: `getUserMedia` for the camera, the
//! page's tracker module for poses, `requestAnimationFrame` for the frame
//! loop and DOM listeners for input. Everything runs on the main thread,
//! so shared state lives in `Rc<RefCell<..>>`.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use js_sys::{Float32Array, Function, Object, Promise, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{
    Document, Event, HtmlCanvasElement, HtmlElement, HtmlVideoElement, ImageData, MediaStream,
    MediaStreamConstraints, MediaStreamTrack, MouseEvent,
};

use poseview_core::completion::{self, Completion};
use poseview_core::{
    ConstraintSupport, FrameImage, FrameRequest, FrameScheduler, LocateError, Orientation,
    OverlayConfig, SessionController, StreamConstraints, TrackerBridge, TrackerError,
    TrackerEventSink, TrackerModule, UiCommand, VideoError, VideoOpener, VideoStream,
    ViewportGeometry,
};

use crate::hud::{Hud, WebHud};
use crate::renderer::WgpuSurface;

const CANVAS_ID: &str = "poseview-canvas";

const EVENT_READY: &str = "geenee-slam-ready";
const EVENT_PERMISSION_REQUEST: &str = "geenee-slam-permission-request";
const EVENT_UPDATE: &str = "geenee-slam-update";

#[wasm_bindgen]
extern "C" {
    /// The page's tracking module.
    pub type JsTracker;

    #[wasm_bindgen(method)]
    fn load(this: &JsTracker) -> Promise;

    #[wasm_bindgen(method)]
    fn initialize(this: &JsTracker, video: &HtmlVideoElement, fov: f32);

    #[wasm_bindgen(method)]
    fn on(this: &JsTracker, event: &str, callback: &Function);

    #[wasm_bindgen(method)]
    fn process(this: &JsTracker, width: u32, height: u32);

    #[wasm_bindgen(method, js_name = startImu)]
    fn start_imu(this: &JsTracker);

    #[wasm_bindgen(method)]
    fn start(this: &JsTracker, x: f32, y: f32, width: u32, height: u32) -> Promise;

    #[wasm_bindgen(method)]
    fn stop(this: &JsTracker);
}

type Listener = Closure<dyn FnMut(JsValue, JsValue)>;

/// [`TrackerModule`] over a [`JsTracker`].
struct JsTrackerModule {
    tracker: JsTracker,
    listeners: Vec<Listener>,
}

impl JsTrackerModule {
    fn new(tracker: JsTracker) -> Self {
        Self {
            tracker,
            listeners: Vec::new(),
        }
    }

    fn listen(&mut self, event: &str, listener: Listener) {
        self.tracker.on(event, listener.as_ref().unchecked_ref());
        self.listeners.push(listener);
    }
}

impl TrackerModule for JsTrackerModule {
    fn load(&mut self) -> Completion<(), TrackerError> {
        let promise = self.tracker.load();
        let (tx, rx) = completion::completion();
        spawn_local(async move {
            let result = JsFuture::from(promise)
                .await
                .map(|_| ())
                .map_err(|e| TrackerError::Load(describe(&e)));
            let _ = tx.send(result);
        });
        rx
    }

    fn initialize(&mut self, video: &dyn VideoStream, fov_degrees: f32, sink: TrackerEventSink) {
        let Some(video) = video.as_any().downcast_ref::<WebVideo>() else {
            tracing::error!("Tracker needs a browser video element");
            return;
        };

        let ready = sink.clone();
        self.listen(
            EVENT_READY,
            Closure::new(move |_: JsValue, _: JsValue| ready.ready()),
        );

        let permission = sink.clone();
        self.listen(
            EVENT_PERMISSION_REQUEST,
            Closure::new(move |_: JsValue, _: JsValue| permission.permission_request()),
        );

        self.listen(
            EVENT_UPDATE,
            Closure::new(move |image: JsValue, rototranslation: JsValue| {
                let pose = Float32Array::new(&rototranslation).to_vec();
                let frame = image.dyn_into::<ImageData>().ok().map(|data| {
                    FrameImage::new(data.width(), data.height(), data.data().0)
                });
                sink.update(&pose, frame);
            }),
        );

        self.tracker.initialize(&video.element, fov_degrees);
    }

    fn process(&mut self, viewport_width: u32, viewport_height: u32) {
        self.tracker.process(viewport_width, viewport_height);
    }

    fn start_imu(&mut self) {
        self.tracker.start_imu();
    }

    fn start(&mut self, x: f32, y: f32, viewport_width: u32, viewport_height: u32) -> Completion<(), LocateError> {
        let promise = self.tracker.start(x, y, viewport_width, viewport_height);
        let (tx, rx) = completion::completion();
        spawn_local(async move {
            let result = match JsFuture::from(promise).await {
                Ok(found) if found.as_bool() != Some(false) => Ok(()),
                Ok(_) => Err(LocateError::NotFound),
                Err(e) => {
                    tracing::debug!("Locate rejected: {}", describe(&e));
                    Err(LocateError::NotFound)
                }
            };
            let _ = tx.send(result);
        });
        rx
    }

    fn stop(&mut self) {
        self.tracker.stop();
    }
}

/// A live `<video>` element fed by a camera stream.
pub struct WebVideo {
    element: HtmlVideoElement,
    stream: MediaStream,
    released: bool,
}

impl VideoStream for WebVideo {
    fn width(&self) -> u32 {
        self.element.video_width()
    }

    fn height(&self) -> u32 {
        self.element.video_height()
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for track in self.stream.get_tracks().iter() {
            if let Ok(track) = track.dyn_into::<MediaStreamTrack>() {
                track.stop();
            }
        }
        self.element.set_src_object(None);
        tracing::info!("Camera released");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Opens the camera through `navigator.mediaDevices.getUserMedia`.
pub struct WebVideoOpener {
    window: web_sys::Window,
    document: Document,
}

impl WebVideoOpener {
    pub fn new(window: web_sys::Window, document: Document) -> Self {
        Self { window, document }
    }
}

impl VideoOpener for WebVideoOpener {
    fn open(&mut self, constraints: &StreamConstraints) -> Completion<Box<dyn VideoStream>, VideoError> {
        let (tx, rx) = completion::completion();
        let request = self
            .window
            .navigator()
            .media_devices()
            .and_then(|devices| devices.get_user_media_with_constraints(&media_constraints(constraints)?));
        let promise = match request {
            Ok(promise) => promise,
            Err(e) => return completion::resolved(Err(VideoError::Other(describe(&e)))),
        };
        let document = self.document.clone();

        spawn_local(async move {
            let result = match JsFuture::from(promise).await {
                Ok(stream) => attach_stream(&document, stream.unchecked_into()).await,
                Err(e) => Err(video_error(&e)),
            };
            let _ = tx.send(result);
        });
        rx
    }
}

async fn attach_stream(document: &Document, stream: MediaStream) -> Result<Box<dyn VideoStream>, VideoError> {
    let other = |e: JsValue| VideoError::Other(describe(&e));

    let element: HtmlVideoElement = document
        .create_element("video")
        .map_err(other)?
        .unchecked_into();
    element.set_attribute("playsinline", "").map_err(other)?;
    element.set_muted(true);
    element.set_autoplay(true);
    element.set_src_object(Some(&stream));

    let playing = element.play().map_err(other)?;
    JsFuture::from(playing).await.map_err(other)?;

    tracing::info!(
        "Camera stream {}x{}",
        element.video_width(),
        element.video_height()
    );
    Ok(Box::new(WebVideo {
        element,
        stream,
        released: false,
    }))
}

fn media_constraints(constraints: &StreamConstraints) -> Result<MediaStreamConstraints, JsValue> {
    let video = Object::new();
    Reflect::set(&video, &"facingMode".into(), &constraints.facing_mode.as_str().into())?;
    if let Some(width) = constraints.width {
        Reflect::set(&video, &"width".into(), &exact(width)?)?;
    }
    if let Some(height) = constraints.height {
        Reflect::set(&video, &"height".into(), &exact(height)?)?;
    }
    if let Some(rate) = constraints.frame_rate {
        Reflect::set(&video, &"frameRate".into(), &rate.into())?;
    }

    let media = Object::new();
    Reflect::set(&media, &"audio".into(), &JsValue::FALSE)?;
    Reflect::set(&media, &"video".into(), &video)?;
    Ok(media.unchecked_into())
}

fn exact(value: u32) -> Result<Object, JsValue> {
    let object = Object::new();
    Reflect::set(&object, &"exact".into(), &value.into())?;
    Ok(object)
}

fn video_error(error: &JsValue) -> VideoError {
    let name = Reflect::get(error, &"name".into())
        .ok()
        .and_then(|name| name.as_string());
    match name.as_deref() {
        Some("NotAllowedError") | Some("SecurityError") => VideoError::Denied(describe(error)),
        Some("OverconstrainedError") | Some("NotFoundError") => {
            VideoError::Unsatisfiable(describe(error))
        }
        _ => VideoError::Other(describe(error)),
    }
}

fn describe(value: &JsValue) -> String {
    Reflect::get(value, &"message".into())
        .ok()
        .and_then(|message| message.as_string())
        .or_else(|| value.as_string())
        .unwrap_or_else(|| format!("{value:?}"))
}

/// Safari on iOS treats resolution constraints as hints.
fn constraint_support(window: &web_sys::Window) -> ConstraintSupport {
    let agent = window.navigator().user_agent().unwrap_or_default();
    if ["iPhone", "iPad", "iPod"].iter().any(|device| agent.contains(device)) {
        ConstraintSupport::Advisory
    } else {
        ConstraintSupport::Exact
    }
}

/// [`FrameScheduler`] over `requestAnimationFrame`.
struct RafScheduler {
    window: web_sys::Window,
    callback: Rc<RefCell<Option<Closure<dyn FnMut()>>>>,
}

impl FrameScheduler for RafScheduler {
    fn request_frame(&mut self) -> FrameRequest {
        let callback = self.callback.borrow();
        let Some(callback) = callback.as_ref() else {
            tracing::warn!("Frame requested before the loop callback exists");
            return FrameRequest(0);
        };
        match self
            .window
            .request_animation_frame(callback.as_ref().unchecked_ref())
        {
            Ok(id) => FrameRequest(id as u64),
            Err(e) => {
                tracing::error!("requestAnimationFrame failed: {}", describe(&e));
                FrameRequest(0)
            }
        }
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        let _ = self.window.cancel_animation_frame(request.0 as i32);
    }

    fn now_seconds(&self) -> f64 {
        self.window
            .performance()
            .map_or(0.0, |performance| performance.now() / 1000.0)
    }
}

fn current_geometry(window: &web_sys::Window) -> ViewportGeometry {
    let dimension = |value: Result<JsValue, JsValue>| {
        value.ok().and_then(|v| v.as_f64()).unwrap_or(0.0).max(0.0) as u32
    };
    let width = dimension(window.inner_width());
    let height = dimension(window.inner_height());

    let kind = window
        .screen()
        .ok()
        .and_then(|screen| Reflect::get(&screen, &"orientation".into()).ok())
        .and_then(|orientation| Reflect::get(&orientation, &"type".into()).ok())
        .and_then(|kind| kind.as_string());
    let orientation = match Orientation::from_screen_type(kind.as_deref()) {
        Orientation::Unknown => Orientation::from_dimensions(width, height),
        known => known,
    };
    ViewportGeometry::new(width, height, orientation)
}

fn size_canvas(canvas: &HtmlCanvasElement, geometry: &ViewportGeometry) {
    canvas.set_width(geometry.width.max(1));
    canvas.set_height(geometry.height.max(1));
}

/// Attach `handler` to `event` on `target` for the lifetime of the page.
fn on_event(target: &web_sys::EventTarget, event: &str, handler: impl FnMut(Event) + 'static) -> Result<(), JsValue> {
    let closure = Closure::<dyn FnMut(Event)>::new(handler);
    target.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())?;
    closure.forget();
    Ok(())
}

/// Start an overlay session on the page's `#poseview-canvas`.
///
/// `config` is optional TOML in the same format as the native config
/// file.
#[wasm_bindgen]
pub async fn start_session(tracker: JsTracker, config: Option<String>) -> Result<(), JsValue> {
    let config = match config {
        Some(text) => OverlayConfig::from_toml(&text).map_err(|e| JsValue::from_str(&e.to_string()))?,
        None => OverlayConfig::default(),
    };

    let window = web_sys::window().ok_or("no window")?;
    let document = window.document().ok_or("no document")?;
    let canvas: HtmlCanvasElement = document
        .get_element_by_id(CANVAS_ID)
        .ok_or("canvas not found")?
        .dyn_into()?;
    let parent: HtmlElement = match canvas.parent_element() {
        Some(parent) => parent.dyn_into()?,
        None => document.body().ok_or("no body")?,
    };

    let geometry = current_geometry(&window);
    size_canvas(&canvas, &geometry);
    tracing::info!("Canvas size: {}x{} ({:?})", geometry.width, geometry.height, geometry.orientation);

    let callback = Rc::new(RefCell::new(None));
    let scheduler = RafScheduler {
        window: window.clone(),
        callback: Rc::clone(&callback),
    };
    let tracker = TrackerBridge::new(Box::new(JsTrackerModule::new(tracker)));
    let clear_color = config.clear_color;
    let session = SessionController::new(config, geometry, tracker, Box::new(scheduler))
        .with_constraint_support(constraint_support(&window));
    let session = Rc::new(RefCell::new(session));
    let hud = Rc::new(RefCell::new(WebHud::new(&document, &parent)?));

    // Frame loop
    {
        let session = Rc::clone(&session);
        let hud = Rc::clone(&hud);
        *callback.borrow_mut() = Some(Closure::new(move || {
            let ui = {
                let mut session = session.borrow_mut();
                session.tick();
                session.ui()
            };
            hud.borrow_mut().update(&ui);
        }));
    }

    // Input
    {
        let session = Rc::clone(&session);
        on_event(&canvas, "click", move |event| {
            if let Some(event) = event.dyn_ref::<MouseEvent>() {
                session.borrow_mut().command(UiCommand::Tap {
                    x: event.offset_x() as f32,
                    y: event.offset_y() as f32,
                });
            }
        })?;
    }
    {
        let session = Rc::clone(&session);
        on_event(hud.borrow().permission_prompt(), "click", move |_| {
            session.borrow_mut().command(UiCommand::GrantMotionPermission);
        })?;
    }
    {
        let session = Rc::clone(&session);
        on_event(hud.borrow().stop_button(), "click", move |event| {
            event.stop_propagation();
            session.borrow_mut().command(UiCommand::Stop);
        })?;
    }

    // Viewport
    for event in ["resize", "orientationchange"] {
        let session = Rc::clone(&session);
        let hud = Rc::clone(&hud);
        let canvas = canvas.clone();
        let window_handle = window.clone();
        on_event(&window, event, move |_| {
            let geometry = current_geometry(&window_handle);
            size_canvas(&canvas, &geometry);
            hud.borrow_mut().resize(geometry.width, geometry.height);
            session.borrow_mut().resize(geometry);
        })?;
    }
    {
        let session = Rc::clone(&session);
        on_event(&window, "pagehide", move |_| session.borrow_mut().teardown())?;
    }

    {
        let mut session = session.borrow_mut();
        session.start();
        session.acquire_video(&mut WebVideoOpener::new(window.clone(), document.clone()));
    }

    // The session keeps ticking while the GPU comes up.
    let surface = WgpuSurface::new(
        wgpu::SurfaceTarget::Canvas(canvas),
        geometry.width,
        geometry.height,
        clear_color,
    )
    .await
    .map_err(|e| JsValue::from_str(&format!("{e:#}")))?;
    session.borrow_mut().attach_surface(Box::new(surface));

    tracing::info!("Session started");
    Ok(())
}
