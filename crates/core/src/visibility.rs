use std::rc::Rc;

use crate::flags::{SessionFlag, SessionFlags};

/// Fraction of the viewport height the page must scroll before auto-open fires.
pub const DEFAULT_AUTO_OPEN_RATIO: f64 = 0.3;

/// Panel visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanelState {
    #[default]
    Closed,
    Open,
}

impl PanelState {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    fn toggled(self) -> Self {
        match self {
            Self::Closed => Self::Open,
            Self::Open => Self::Closed,
        }
    }
}

/// Input events for the visibility state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelEvent {
    BubbleActivated,
    CloseActivated,
    EscapePressed,
    AutoOpenEligible,
}

/// Outcome of one event. Hosts perform side effects only for `Opened`/`Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelChange {
    Unchanged,
    Opened,
    Closed,
}

impl PanelChange {
    pub fn is_changed(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Page scroll position reported by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollSignal {
    pub offset: f64,
    pub viewport_height: f64,
}

impl ScrollSignal {
    pub fn new(offset: f64, viewport_height: f64) -> Self {
        Self {
            offset,
            viewport_height,
        }
    }

    fn crosses(&self, ratio: f64) -> bool {
        self.offset.is_finite()
            && self.viewport_height.is_finite()
            && self.offset > self.viewport_height * ratio
    }
}

/// Closed/Open state machine with a one-shot auto-open.
pub struct VisibilityController {
    state: PanelState,
    auto_open_consumed: bool,
    auto_open_armed: bool,
    auto_open_ratio: f64,
    flags: Rc<dyn SessionFlags>,
}

impl VisibilityController {
    pub fn new(flags: Rc<dyn SessionFlags>, auto_open_ratio: f64) -> Self {
        let auto_open_consumed = flags.get(SessionFlag::AutoOpenShown);
        Self {
            state: PanelState::Closed,
            auto_open_consumed,
            auto_open_armed: !auto_open_consumed,
            auto_open_ratio,
            flags,
        }
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    pub fn auto_open_consumed(&self) -> bool {
        self.auto_open_consumed
    }

    /// True while the host should keep its scroll listener attached.
    pub fn wants_scroll_signal(&self) -> bool {
        self.auto_open_armed
    }

    /// Reopens the panel when the previous page load left it open.
    pub fn restore(&mut self) -> PanelChange {
        if self.flags.get(SessionFlag::PanelOpen) {
            self.move_to(PanelState::Open)
        } else {
            PanelChange::Unchanged
        }
    }

    pub fn handle(&mut self, event: PanelEvent) -> PanelChange {
        match event {
            PanelEvent::BubbleActivated => self.move_to(self.state.toggled()),
            PanelEvent::CloseActivated | PanelEvent::EscapePressed => {
                self.move_to(PanelState::Closed)
            }
            PanelEvent::AutoOpenEligible => self.consume_auto_open(),
        }
    }

    /// Feeds one scroll sample; fires `AutoOpenEligible` the first time it crosses.
    pub fn observe_scroll(&mut self, signal: ScrollSignal) -> PanelChange {
        if !self.auto_open_armed || !signal.crosses(self.auto_open_ratio) {
            return PanelChange::Unchanged;
        }

        self.handle(PanelEvent::AutoOpenEligible)
    }

    fn consume_auto_open(&mut self) -> PanelChange {
        if !self.auto_open_armed {
            return PanelChange::Unchanged;
        }

        let was_consumed = self.auto_open_consumed;
        self.auto_open_armed = false;
        self.auto_open_consumed = true;
        self.flags.set(SessionFlag::AutoOpenShown, true);

        if was_consumed || self.state.is_open() {
            tracing::debug!("auto-open eligible but already consumed or open");
            return PanelChange::Unchanged;
        }

        tracing::info!("auto-opening panel after scroll threshold");
        self.move_to(PanelState::Open)
    }

    fn move_to(&mut self, next: PanelState) -> PanelChange {
        if next == self.state {
            return PanelChange::Unchanged;
        }

        self.state = next;
        self.flags.set(SessionFlag::PanelOpen, next.is_open());
        match next {
            PanelState::Open => PanelChange::Opened,
            PanelState::Closed => PanelChange::Closed,
        }
    }
}
