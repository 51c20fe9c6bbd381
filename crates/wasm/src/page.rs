use ember_core::{PageContext, SessionFlag, SessionFlags};
use wasm_bindgen::JsValue;
use web_sys::{Storage, Window};

/// The browser window the script was evaluated in.
pub struct WindowPage {
    window: Window,
}

impl WindowPage {
    pub fn new(window: Window) -> Self {
        Self { window }
    }
}

impl PageContext for WindowPage {
    fn is_top_frame(&self) -> bool {
        match self.window.top() {
            Ok(Some(top)) => {
                js_sys::Object::is(&JsValue::from(top), &JsValue::from(self.window.clone()))
            }
            _ => false,
        }
    }

    fn claim_marker(&self, marker: &str) -> bool {
        let key = JsValue::from_str(marker);
        let already_set = js_sys::Reflect::get(&self.window, &key)
            .map(|value| value.is_truthy())
            .unwrap_or(false);
        if !already_set {
            if let Err(error) = js_sys::Reflect::set(&self.window, &key, &JsValue::TRUE) {
                tracing::warn!(?error, "failed to set page marker");
            }
        }
        already_set
    }
}

/// Session flags backed by `sessionStorage`. Reads and writes are best-effort.
pub struct WebSessionFlags {
    storage: Option<Storage>,
}

impl WebSessionFlags {
    pub fn new(window: &Window) -> Self {
        let storage = match window.session_storage() {
            Ok(storage) => storage,
            Err(error) => {
                tracing::warn!(?error, "session storage unavailable; flags will not persist");
                None
            }
        };
        Self { storage }
    }
}

impl SessionFlags for WebSessionFlags {
    fn get(&self, flag: SessionFlag) -> bool {
        let Some(storage) = &self.storage else {
            return false;
        };
        matches!(storage.get_item(flag.key()), Ok(Some(value)) if value == "1")
    }

    fn set(&self, flag: SessionFlag, value: bool) {
        let Some(storage) = &self.storage else {
            return;
        };
        let result = if value {
            storage.set_item(flag.key(), "1")
        } else {
            storage.remove_item(flag.key())
        };
        if let Err(error) = result {
            tracing::warn!(key = flag.key(), ?error, "failed to write session flag");
        }
    }
}
