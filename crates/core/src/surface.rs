use std::cell::Cell;
use std::rc::Rc;

use crate::bridge::{BridgeSide, Message, MessageBridge};

/// Rendering side of the chat surface.
pub trait SurfaceView {
    fn focus_input(&self);
    fn scroll_to_latest(&self);
    /// Disables input while a question is outstanding.
    fn set_waiting(&self, waiting: bool);

    /// Called once a question has been handed to the host.
    fn question_sent(&self, _text: &str) {}

    /// Surfaces that keep their own transcript render the answer here.
    fn answer_received(&self, _text: &str) {}

    /// Assistant line not tied to a question, such as a greeting or a reindex report.
    fn notice_received(&self, _text: &str) {}
}

/// Surface end of the message bridge.
pub struct ChatSurface {
    bridge: Rc<MessageBridge>,
    view: Rc<dyn SurfaceView>,
    waiting: Cell<bool>,
}

impl ChatSurface {
    pub fn attach(bridge: Rc<MessageBridge>, view: Rc<dyn SurfaceView>) -> Rc<Self> {
        debug_assert_eq!(bridge.side(), BridgeSide::Surface);

        let surface = Rc::new(Self {
            bridge: bridge.clone(),
            view,
            waiting: Cell::new(false),
        });

        let weak = Rc::downgrade(&surface);
        bridge.subscribe(move |message| {
            if let Some(surface) = weak.upgrade() {
                surface.handle(message);
            }
        });
        surface
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting.get()
    }

    /// Sends the typed question to the host. Returns false when nothing was sent.
    pub fn submit(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() || self.waiting.get() {
            return false;
        }

        // Everything local happens first: a loopback host may answer before `post` returns.
        self.set_waiting(true);
        self.view.question_sent(text);
        if !self.bridge.post(Message::Ask {
            text: text.to_string(),
        }) {
            self.set_waiting(false);
            return false;
        }
        true
    }

    pub fn request_close(&self) -> bool {
        self.bridge.post(Message::Close)
    }

    fn handle(&self, message: &Message) {
        match message {
            Message::Focus => self.view.focus_input(),
            Message::Answer { text } => {
                self.view.answer_received(text);
                self.set_waiting(false);
            }
            Message::Notice { text } => self.view.notice_received(text),
            Message::Scroll => self.view.scroll_to_latest(),
            Message::Ask { .. } | Message::Close => {}
        }
    }

    fn set_waiting(&self, waiting: bool) {
        if self.waiting.replace(waiting) != waiting {
            self.view.set_waiting(waiting);
        }
    }
}
