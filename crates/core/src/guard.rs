use std::cell::{Cell, RefCell};
use std::collections::HashSet;

/// Page-level marker claimed by the first widget instance.
pub const LOADED_MARKER: &str = "__emberWidgetLoaded";

/// Execution context the widget script was evaluated in.
///
/// The marker must live in state shared by every evaluation of the script on the page
/// (the page global in a browser), not in module memory: each duplicate script tag
/// instantiates a fresh module.
pub trait PageContext {
    /// True when the script runs in the top-level frame of the page.
    fn is_top_frame(&self) -> bool;
    /// Sets `marker` and returns whether it was already set.
    fn claim_marker(&self, marker: &str) -> bool;
}

/// Snapshot of the widget's instantiation state in one page context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WidgetInstance {
    pub initialized: bool,
    pub is_top_context: bool,
}

/// The single gate deciding whether this evaluation may build a widget.
pub struct InjectionGuard<P> {
    page: P,
    acquired: Cell<bool>,
}

impl<P: PageContext> InjectionGuard<P> {
    pub fn new(page: P) -> Self {
        Self {
            page,
            acquired: Cell::new(false),
        }
    }

    /// Returns true exactly once per page context, and never inside a nested frame.
    pub fn try_acquire(&self) -> bool {
        if !self.page.is_top_frame() {
            tracing::debug!("widget script evaluated inside a nested frame; not mounting");
            return false;
        }

        if self.acquired.get() || self.page.claim_marker(LOADED_MARKER) {
            tracing::info!("widget already initialized on this page; skipping duplicate load");
            return false;
        }

        self.acquired.set(true);
        tracing::info!("widget guard acquired");
        true
    }

    pub fn instance(&self) -> WidgetInstance {
        WidgetInstance {
            initialized: self.acquired.get(),
            is_top_context: self.page.is_top_frame(),
        }
    }

    pub fn page(&self) -> &P {
        &self.page
    }
}

/// In-memory page context for hosts without a browser global.
#[derive(Debug, Default)]
pub struct MemoryPage {
    nested: bool,
    markers: RefCell<HashSet<String>>,
}

impl MemoryPage {
    pub fn top_level() -> Self {
        Self::default()
    }

    pub fn nested() -> Self {
        Self {
            nested: true,
            markers: RefCell::default(),
        }
    }
}

impl PageContext for MemoryPage {
    fn is_top_frame(&self) -> bool {
        !self.nested
    }

    fn claim_marker(&self, marker: &str) -> bool {
        !self.markers.borrow_mut().insert(marker.to_string())
    }
}

impl<P: PageContext + ?Sized> PageContext for &P {
    fn is_top_frame(&self) -> bool {
        (**self).is_top_frame()
    }

    fn claim_marker(&self, marker: &str) -> bool {
        (**self).claim_marker(marker)
    }
}
