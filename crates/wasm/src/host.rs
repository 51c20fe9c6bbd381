use std::cell::RefCell;
use std::rc::Rc;

use ember_backend::create_backend;
use ember_core::{
    BridgeSide, ChatSurface, Confirm, InjectionGuard, MessageBridge, Origin, PanelEvent,
    ScrollSignal, TaskSpawner, Transcript, Widget, WidgetParts, WidgetSettings,
};
use futures::future::LocalBoxFuture;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Document, Element, HtmlElement, KeyboardEvent, Window};

use crate::attributes::settings_overrides;
use crate::dom::{
    DomPanel, DomSurfaceView, DomTranscript, GlowDecorator, PanelBody, WidgetDom, build_surface,
    build_widget, install_styles,
};
use crate::page::{WebSessionFlags, WindowPage};
use crate::port::{self, PeerWindow, WindowPort};

const SCRIPT_SELECTOR: &str = "script[data-ember-widget]";

thread_local! {
    static SCROLL_LISTENER: RefCell<Option<Closure<dyn FnMut()>>> = const { RefCell::new(None) };
}

struct BrowserSpawner;

impl TaskSpawner for BrowserSpawner {
    fn spawn_task(&self, task: LocalBoxFuture<'static, ()>) {
        wasm_bindgen_futures::spawn_local(task);
    }
}

struct WindowConfirm {
    window: Window,
}

impl Confirm for WindowConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        match self.window.confirm_with_message(prompt) {
            Ok(approved) => approved,
            Err(error) => {
                tracing::warn!(?error, "confirmation dialog unavailable");
                false
            }
        }
    }
}

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());

    if let Err(error) = mount_widget() {
        tracing::error!(?error, "failed to mount assistant widget");
    }
}

/// Entry point for the chat surface page loaded inside the widget's frame.
#[wasm_bindgen]
pub fn mount_surface(host_origin: &str) -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let document = window.document().ok_or_else(|| JsValue::from_str("no document"))?;
    let origin =
        Origin::parse(host_origin).ok_or_else(|| JsValue::from_str("invalid host origin"))?;
    let parent = window
        .parent()?
        .ok_or_else(|| JsValue::from_str("surface is not framed"))?;

    install_styles(&document)?;
    let body = document.body().ok_or_else(|| JsValue::from_str("document has no body"))?;
    let dom = build_surface(&document, &body)?;

    let bridge = Rc::new(MessageBridge::new(BridgeSide::Surface, origin));
    bridge.connect(WindowPort::to_parent(parent.clone()));
    port::listen(&window, bridge.clone(), PeerWindow::Parent(parent))?;

    let placeholder_text = load_settings(&document).placeholder_text;
    let view = Rc::new(DomSurfaceView::framed(document.clone(), dom, placeholder_text));
    let surface = ChatSurface::attach(bridge, view.clone());
    wire_surface_input(&surface, &view)?;

    let on_escape = Closure::<dyn FnMut(KeyboardEvent)>::new(move |event: KeyboardEvent| {
        if event.key() == "Escape" {
            surface.request_close();
        }
    });
    document.add_event_listener_with_callback("keydown", on_escape.as_ref().unchecked_ref())?;
    on_escape.forget();

    tracing::info!(host_origin = %host_origin, "chat surface mounted");
    Ok(())
}

fn mount_widget() -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let document = window.document().ok_or_else(|| JsValue::from_str("no document"))?;
    let settings = load_settings(&document);
    let page_origin = window.location().origin()?;
    let guard = InjectionGuard::new(WindowPage::new(window.clone()));

    let mut built = None;
    let mounted = Widget::mount(&guard, &settings, || {
        let (parts, dom) = build_parts(&window, &document, &settings, &page_origin)?;
        built = Some(dom);
        Ok::<_, JsValue>(parts)
    })?;
    let (Some(widget), Some(dom)) = (mounted, built) else {
        return Ok(());
    };

    widget.add_decorator(Rc::new(GlowDecorator::new(
        window.clone(),
        dom.bubble.clone(),
    )));

    let bubble_widget = widget.clone();
    on_click(&dom.bubble, move || {
        bubble_widget.dispatch(PanelEvent::BubbleActivated);
    })?;

    let close_widget = widget.clone();
    on_click(&dom.close, move || {
        close_widget.dispatch(PanelEvent::CloseActivated);
    })?;

    if let Some(reindex) = &dom.reindex {
        let reindex_widget = widget.clone();
        on_click(reindex, move || {
            reindex_widget.trigger_reindex();
        })?;
    }

    let escape_widget = widget.clone();
    let on_escape = Closure::<dyn FnMut(KeyboardEvent)>::new(move |event: KeyboardEvent| {
        if event.key() == "Escape" {
            escape_widget.dispatch(PanelEvent::EscapePressed);
        }
    });
    document.add_event_listener_with_callback("keydown", on_escape.as_ref().unchecked_ref())?;
    on_escape.forget();

    watch_scroll(&window, widget)
}

fn build_parts(
    window: &Window,
    document: &Document,
    settings: &WidgetSettings,
    page_origin: &str,
) -> Result<(WidgetParts, WidgetDom), JsValue> {
    let surface_origin = settings
        .resolve_surface_origin(page_origin)
        .ok_or_else(|| JsValue::from_str("invalid surface origin"))?;

    let mut backend_config = settings.backend_config();
    if backend_config.base_url.is_empty() {
        backend_config.base_url = page_origin.to_string();
    }
    let backend = create_backend(backend_config)
        .map_err(|error| JsValue::from_str(&error.to_string()))?;

    install_styles(document)?;
    let dom = build_widget(document, settings.surface_url.as_deref(), settings.admin)?;
    let transcript = Rc::new(RefCell::new(Transcript::new()));

    let (bridge, transcript_list) = match &dom.body {
        PanelBody::Frame(frame) => {
            let bridge = Rc::new(MessageBridge::new(BridgeSide::Host, surface_origin));
            bridge.connect(WindowPort::to_frame(frame)?);
            port::listen(window, bridge.clone(), PeerWindow::Frame(frame.clone()))?;
            (bridge, None)
        }
        PanelBody::Inline(surface_dom) => {
            let (host, surface_bridge) = MessageBridge::loopback_pair(surface_origin);
            transcript.borrow_mut().observe(Rc::new(DomTranscript::new(
                document.clone(),
                surface_dom.transcript.clone(),
            )));

            let view = Rc::new(DomSurfaceView::inline(document.clone(), surface_dom.clone()));
            let surface = ChatSurface::attach(surface_bridge, view.clone());
            wire_surface_input(&surface, &view)?;
            (host, Some(surface_dom.transcript.clone()))
        }
    };

    let panel = Rc::new(DomPanel {
        panel: dom.panel.clone(),
        bubble: dom.bubble.clone(),
        transcript: transcript_list,
    });

    let parts = WidgetParts {
        backend,
        bridge,
        flags: Rc::new(WebSessionFlags::new(window)),
        transcript,
        panel,
        confirm: Rc::new(WindowConfirm {
            window: window.clone(),
        }),
        spawner: Rc::new(BrowserSpawner),
    };
    Ok((parts, dom))
}

fn load_settings(document: &Document) -> WidgetSettings {
    let script = document
        .query_selector(SCRIPT_SELECTOR)
        .ok()
        .flatten()
        .or_else(|| document.current_script().map(Element::from));
    let attributes = script.map(|script| read_attributes(&script)).unwrap_or_default();
    let overrides = settings_overrides(
        attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str())),
    );

    match WidgetSettings::from_overrides(overrides) {
        Ok(settings) => settings,
        Err(error) => {
            tracing::warn!(error = %error, "invalid widget attributes; using defaults");
            WidgetSettings::default()
        }
    }
}

fn read_attributes(element: &Element) -> Vec<(String, String)> {
    element
        .get_attribute_names()
        .iter()
        .filter_map(|name| name.as_string())
        .filter_map(|name| element.get_attribute(&name).map(|value| (name, value)))
        .collect()
}

fn wire_surface_input(
    surface: &Rc<ChatSurface>,
    view: &Rc<DomSurfaceView>,
) -> Result<(), JsValue> {
    let submit = {
        let surface = surface.clone();
        let view = view.clone();
        Rc::new(move || {
            surface.submit(&view.input().value());
        })
    };

    let on_send = submit.clone();
    on_click(view.send_button(), move || on_send())?;

    let on_enter = Closure::<dyn FnMut(KeyboardEvent)>::new(move |event: KeyboardEvent| {
        if event.key() == "Enter" {
            event.prevent_default();
            submit();
        }
    });
    view.input()
        .add_event_listener_with_callback("keydown", on_enter.as_ref().unchecked_ref())?;
    on_enter.forget();
    Ok(())
}

fn on_click(target: &HtmlElement, handler: impl FnMut() + 'static) -> Result<(), JsValue> {
    let listener = Closure::<dyn FnMut()>::new(handler);
    target.add_event_listener_with_callback("click", listener.as_ref().unchecked_ref())?;
    listener.forget();
    Ok(())
}

/// Feeds page scroll into the widget until auto-open has been used up.
fn watch_scroll(window: &Window, widget: Rc<Widget>) -> Result<(), JsValue> {
    if !widget.wants_scroll_signal() {
        return Ok(());
    }

    let scroll_window = window.clone();
    let on_scroll = Closure::<dyn FnMut()>::new(move || {
        let offset = scroll_window.scroll_y().unwrap_or(0.0);
        let viewport_height = scroll_window
            .inner_height()
            .ok()
            .and_then(|height| height.as_f64())
            .unwrap_or(f64::NAN);
        widget.on_scroll(ScrollSignal::new(offset, viewport_height));

        if !widget.wants_scroll_signal() {
            detach_scroll_listener(&scroll_window);
        }
    });
    window.add_event_listener_with_callback("scroll", on_scroll.as_ref().unchecked_ref())?;
    SCROLL_LISTENER.with(|slot| *slot.borrow_mut() = Some(on_scroll));
    Ok(())
}

fn detach_scroll_listener(window: &Window) {
    SCROLL_LISTENER.with(|slot| {
        if let Some(listener) = slot.borrow().as_ref() {
            let _ = window
                .remove_event_listener_with_callback("scroll", listener.as_ref().unchecked_ref());
        }
    });

    // Still inside the listener; release it from a later task.
    wasm_bindgen_futures::spawn_local(async {
        SCROLL_LISTENER.with(|slot| slot.borrow_mut().take());
    });
    tracing::debug!("auto-open consumed; scroll listener detached");
}
