use std::cell::RefCell;
use std::rc::Rc;

use ember_core::{MessageBridge, MessagePort, Origin};
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{HtmlIFrameElement, MessageEvent, Window};

/// Peer window a bridge talks to.
#[derive(Clone)]
pub enum PeerWindow {
    /// The nested frame hosting the chat surface.
    Frame(HtmlIFrameElement),
    /// The page embedding this frame.
    Parent(Window),
}

impl PeerWindow {
    fn window(&self) -> Option<Window> {
        match self {
            Self::Frame(frame) => frame.content_window(),
            Self::Parent(window) => Some(window.clone()),
        }
    }
}

/// `postMessage` transport with an explicit target origin.
///
/// A frame port holds messages until the frame has fired `load`, so a greeting or a
/// restored focus posted at mount is not lost to the frame's initial blank document.
pub struct WindowPort {
    peer: PeerWindow,
    held: RefCell<Option<Vec<(Value, Origin)>>>,
}

impl WindowPort {
    pub fn to_parent(window: Window) -> Rc<Self> {
        Rc::new(Self {
            peer: PeerWindow::Parent(window),
            held: RefCell::new(None),
        })
    }

    pub fn to_frame(frame: &HtmlIFrameElement) -> Result<Rc<Self>, JsValue> {
        let port = Rc::new(Self {
            peer: PeerWindow::Frame(frame.clone()),
            held: RefCell::new(Some(Vec::new())),
        });

        let weak = Rc::downgrade(&port);
        let on_load = Closure::<dyn FnMut()>::new(move || {
            if let Some(port) = weak.upgrade() {
                port.release();
            }
        });
        frame.add_event_listener_with_callback("load", on_load.as_ref().unchecked_ref())?;
        on_load.forget();
        Ok(port)
    }

    fn release(&self) {
        let Some(held) = self.held.borrow_mut().take() else {
            return;
        };
        tracing::debug!(count = held.len(), "surface frame loaded; delivering held messages");
        for (data, target_origin) in held {
            self.deliver(&data, &target_origin);
        }
    }

    fn deliver(&self, data: &Value, target_origin: &Origin) {
        let Some(window) = self.peer.window() else {
            tracing::debug!("peer window not available; message dropped");
            return;
        };

        let serializer = serde_wasm_bindgen::Serializer::json_compatible();
        let message = match data.serialize(&serializer) {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(error = %error, "failed to convert message for postMessage");
                return;
            }
        };

        if let Err(error) = window.post_message(&message, target_origin.as_str()) {
            tracing::warn!(?error, "postMessage failed");
        }
    }
}

impl MessagePort for WindowPort {
    fn post(&self, data: Value, target_origin: &Origin) {
        if let Some(held) = self.held.borrow_mut().as_mut() {
            held.push((data, target_origin.clone()));
            return;
        }
        self.deliver(&data, target_origin);
    }
}

/// Feeds window `message` events coming from `peer` into `bridge`.
pub fn listen(
    window: &Window,
    bridge: Rc<MessageBridge>,
    peer: PeerWindow,
) -> Result<(), JsValue> {
    let on_message = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
        let from_peer = match (event.source(), peer.window()) {
            (Some(source), Some(expected)) => {
                js_sys::Object::is(&JsValue::from(source), &JsValue::from(expected))
            }
            _ => false,
        };
        if !from_peer {
            return;
        }

        let Ok(data) = serde_wasm_bindgen::from_value::<Value>(event.data()) else {
            tracing::debug!(origin = %event.origin(), "discarding non-JSON message");
            return;
        };
        bridge.receive(&event.origin(), &data);
    });

    window.add_event_listener_with_callback("message", on_message.as_ref().unchecked_ref())?;
    on_message.forget();
    Ok(())
}
