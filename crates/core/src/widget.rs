use std::cell::RefCell;
use std::rc::{Rc, Weak};

use ember_backend::Backend;
use futures::executor::LocalSpawner;
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;

use crate::bridge::{BridgeSide, Message, MessageBridge};
use crate::flags::SessionFlags;
use crate::guard::{InjectionGuard, PageContext};
use crate::reindex::{Confirm, ReindexTrigger};
use crate::session::ChatSession;
use crate::settings::WidgetSettings;
use crate::transcript::Transcript;
use crate::visibility::{PanelChange, PanelEvent, PanelState, ScrollSignal, VisibilityController};

/// Runs detached tasks on the host's single-threaded executor.
pub trait TaskSpawner {
    fn spawn_task(&self, task: LocalBoxFuture<'static, ()>);
}

impl TaskSpawner for LocalSpawner {
    fn spawn_task(&self, task: LocalBoxFuture<'static, ()>) {
        if let Err(error) = self.spawn_local(task) {
            tracing::warn!(error = %error, "failed to spawn widget task");
        }
    }
}

/// The bubble/panel chrome owned by the host.
pub trait PanelView {
    fn set_open(&self, open: bool);

    fn scroll_to_latest(&self) {}
}

/// Cosmetic hook run on every entry into `Open`.
pub trait OpenDecorator {
    fn on_open(&self);
}

/// Host-provided collaborators for one widget.
pub struct WidgetParts {
    pub backend: Rc<dyn Backend>,
    /// Host end of the bridge, already connected to its surface.
    pub bridge: Rc<MessageBridge>,
    pub flags: Rc<dyn SessionFlags>,
    pub transcript: Rc<RefCell<Transcript>>,
    pub panel: Rc<dyn PanelView>,
    pub confirm: Rc<dyn Confirm>,
    pub spawner: Rc<dyn TaskSpawner>,
}

/// One mounted assistant widget.
pub struct Widget {
    visibility: RefCell<VisibilityController>,
    bridge: Rc<MessageBridge>,
    session: Rc<ChatSession>,
    reindex: Rc<ReindexTrigger>,
    transcript: Rc<RefCell<Transcript>>,
    panel: Rc<dyn PanelView>,
    decorators: RefCell<Vec<Rc<dyn OpenDecorator>>>,
    spawner: Rc<dyn TaskSpawner>,
    admin: bool,
}

impl Widget {
    /// Builds the widget, or nothing when the guard refuses this evaluation.
    ///
    /// `build` creates the host collaborators and only runs once the guard is acquired,
    /// so a refused evaluation leaves the page untouched.
    pub fn mount<P, E>(
        guard: &InjectionGuard<P>,
        settings: &WidgetSettings,
        build: impl FnOnce() -> Result<WidgetParts, E>,
    ) -> Result<Option<Rc<Self>>, E>
    where
        P: PageContext,
    {
        if !guard.try_acquire() {
            return Ok(None);
        }

        let WidgetParts {
            backend,
            bridge,
            flags,
            transcript,
            panel,
            confirm,
            spawner,
        } = build()?;
        debug_assert_eq!(bridge.side(), BridgeSide::Host);

        let session = Rc::new(ChatSession::new(
            backend.clone(),
            transcript.clone(),
            bridge.clone(),
            settings.session_texts(),
        ));
        let reindex = Rc::new(ReindexTrigger::new(
            backend,
            transcript.clone(),
            bridge.clone(),
            confirm,
            settings.reindex_texts(),
        ));

        let widget = Rc::new(Self {
            visibility: RefCell::new(VisibilityController::new(flags, settings.auto_open_ratio)),
            bridge: bridge.clone(),
            session,
            reindex,
            transcript,
            panel,
            decorators: RefCell::new(Vec::new()),
            spawner,
            admin: settings.admin,
        });

        let weak = Rc::downgrade(&widget);
        bridge.subscribe(move |message| Self::on_surface_message(&weak, message));

        if let Some(greeting) = &settings.greeting {
            widget.transcript.borrow_mut().push_assistant(greeting.clone());
            widget.bridge.post(Message::Notice {
                text: greeting.clone(),
            });
        }

        let restored = widget.visibility.borrow_mut().restore();
        widget.apply(restored);

        tracing::info!(
            admin = widget.admin,
            panel_open = widget.state().is_open(),
            "widget mounted"
        );
        Ok(Some(widget))
    }

    pub fn add_decorator(&self, decorator: Rc<dyn OpenDecorator>) {
        self.decorators.borrow_mut().push(decorator);
    }

    pub fn state(&self) -> PanelState {
        self.visibility.borrow().state()
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn wants_scroll_signal(&self) -> bool {
        self.visibility.borrow().wants_scroll_signal()
    }

    pub fn session(&self) -> &Rc<ChatSession> {
        &self.session
    }

    pub fn transcript(&self) -> &Rc<RefCell<Transcript>> {
        &self.transcript
    }

    pub fn dispatch(&self, event: PanelEvent) -> PanelChange {
        let change = self.visibility.borrow_mut().handle(event);
        self.apply(change);
        change
    }

    pub fn on_scroll(&self, signal: ScrollSignal) -> PanelChange {
        let change = self.visibility.borrow_mut().observe_scroll(signal);
        self.apply(change);
        change
    }

    /// Starts a confirmed reindex in the background. Only available to admin widgets.
    pub fn trigger_reindex(&self) -> bool {
        if !self.admin {
            tracing::debug!("reindex requested on a non-admin widget; ignoring");
            return false;
        }

        let reindex = self.reindex.clone();
        self.spawner.spawn_task(Box::pin(async move {
            reindex.trigger().await;
        }));
        true
    }

    fn apply(&self, change: PanelChange) {
        match change {
            PanelChange::Unchanged => {}
            PanelChange::Opened => {
                tracing::info!("panel opened");
                self.panel.set_open(true);
                self.bridge.post(Message::Focus);
                let decorators = self.decorators.borrow().clone();
                for decorator in decorators {
                    decorator.on_open();
                }
            }
            PanelChange::Closed => {
                tracing::info!("panel closed");
                self.panel.set_open(false);
            }
        }
    }

    fn on_surface_message(weak: &Weak<Self>, message: &Message) {
        let Some(widget) = weak.upgrade() else {
            return;
        };

        match message {
            Message::Ask { text } => {
                let session = widget.session.clone();
                let question = text.clone();
                widget.spawner.spawn_task(Box::pin(async move {
                    session.send(&question).await;
                }));
            }
            Message::Close => {
                widget.dispatch(PanelEvent::CloseActivated);
            }
            Message::Scroll => widget.panel.scroll_to_latest(),
            Message::Answer { .. } | Message::Notice { .. } | Message::Focus => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::convert::Infallible;

    use futures::executor::LocalPool;

    use super::*;
    use crate::bridge::Origin;
    use crate::flags::{MemoryFlags, SessionFlag};
    use crate::guard::MemoryPage;
    use crate::surface::{ChatSurface, SurfaceView};
    use crate::testing::{ScriptedBackend, recorded_surface, status_error};

    #[derive(Default)]
    struct RecordingPanel {
        opens: RefCell<Vec<bool>>,
        scrolls: Cell<usize>,
    }

    impl PanelView for RecordingPanel {
        fn set_open(&self, open: bool) {
            self.opens.borrow_mut().push(open);
        }

        fn scroll_to_latest(&self) {
            self.scrolls.set(self.scrolls.get() + 1);
        }
    }

    #[derive(Default)]
    struct CountingDecorator {
        pulses: Cell<usize>,
    }

    impl OpenDecorator for CountingDecorator {
        fn on_open(&self) {
            self.pulses.set(self.pulses.get() + 1);
        }
    }

    /// Surface keeping its own transcript, as a framed surface page does.
    #[derive(Default)]
    struct RecordingSurface {
        shown: RefCell<Vec<String>>,
    }

    impl SurfaceView for RecordingSurface {
        fn focus_input(&self) {}

        fn scroll_to_latest(&self) {}

        fn set_waiting(&self, _waiting: bool) {}

        fn question_sent(&self, text: &str) {
            self.shown.borrow_mut().push(format!("you: {text}"));
        }

        fn answer_received(&self, text: &str) {
            self.shown.borrow_mut().push(format!("assistant: {text}"));
        }

        fn notice_received(&self, text: &str) {
            self.shown.borrow_mut().push(format!("assistant: {text}"));
        }
    }

    struct Harness {
        pool: LocalPool,
        backend: Rc<ScriptedBackend>,
        flags: Rc<MemoryFlags>,
        panel: Rc<RecordingPanel>,
        surface_bridge: Rc<MessageBridge>,
        surface_seen: Rc<RefCell<Vec<Message>>>,
        surface: Option<Rc<ChatSurface>>,
        surface_view: Rc<RecordingSurface>,
        confirmations: Rc<Cell<usize>>,
        builds: usize,
    }

    impl Harness {
        fn new(flags: MemoryFlags) -> Self {
            let origin = Origin::parse("https://shop.example.com").expect("origin");
            let (_, surface_bridge) = MessageBridge::loopback_pair(origin);
            let surface_seen = recorded_surface(&surface_bridge);
            Self {
                pool: LocalPool::new(),
                backend: Rc::new(ScriptedBackend::default()),
                flags: Rc::new(flags),
                panel: Rc::new(RecordingPanel::default()),
                surface_bridge,
                surface_seen,
                surface: None,
                surface_view: Rc::new(RecordingSurface::default()),
                confirmations: Rc::new(Cell::new(0)),
                builds: 0,
            }
        }

        fn mount(
            &mut self,
            guard: &InjectionGuard<&MemoryPage>,
            settings: &WidgetSettings,
        ) -> Option<Rc<Widget>> {
            let mounted = Widget::mount(guard, settings, || {
                self.builds += 1;
                let origin = Origin::parse("https://shop.example.com").expect("origin");
                let (host, surface_bridge) = MessageBridge::loopback_pair(origin);
                self.surface_seen = recorded_surface(&surface_bridge);
                self.surface = Some(ChatSurface::attach(
                    surface_bridge.clone(),
                    self.surface_view.clone(),
                ));
                self.surface_bridge = surface_bridge;

                let confirmations = self.confirmations.clone();
                let confirm = move |_prompt: &str| {
                    confirmations.set(confirmations.get() + 1);
                    true
                };

                Ok::<_, Infallible>(WidgetParts {
                    backend: self.backend.clone(),
                    bridge: host,
                    flags: self.flags.clone(),
                    transcript: Rc::new(RefCell::new(Transcript::new())),
                    panel: self.panel.clone(),
                    confirm: Rc::new(confirm),
                    spawner: Rc::new(self.pool.spawner()),
                })
            });
            match mounted {
                Ok(widget) => widget,
                Err(never) => match never {},
            }
        }
    }

    #[test]
    fn repeated_inclusion_builds_one_widget() {
        let page = MemoryPage::top_level();
        let mut harness = Harness::new(MemoryFlags::default());
        let settings = WidgetSettings::default();

        let mounted = (0..3)
            .filter_map(|_| harness.mount(&InjectionGuard::new(&page), &settings))
            .count();
        assert_eq!(mounted, 1);
        assert_eq!(harness.builds, 1);
    }

    #[test]
    fn nested_frame_builds_nothing() {
        let page = MemoryPage::nested();
        let mut harness = Harness::new(MemoryFlags::default());
        assert!(
            harness
                .mount(&InjectionGuard::new(&page), &WidgetSettings::default())
                .is_none()
        );
        assert!(harness.panel.opens.borrow().is_empty());
        assert_eq!(harness.builds, 0);
    }

    #[test]
    fn opening_focuses_surface_and_runs_decorators() {
        let page = MemoryPage::top_level();
        let mut harness = Harness::new(MemoryFlags::default());
        let widget = harness
            .mount(&InjectionGuard::new(&page), &WidgetSettings::default())
            .expect("widget");
        let decorator = Rc::new(CountingDecorator::default());
        widget.add_decorator(decorator.clone());

        assert_eq!(widget.dispatch(PanelEvent::BubbleActivated), PanelChange::Opened);
        assert_eq!(widget.dispatch(PanelEvent::EscapePressed), PanelChange::Closed);
        assert_eq!(widget.dispatch(PanelEvent::EscapePressed), PanelChange::Unchanged);
        assert_eq!(widget.dispatch(PanelEvent::BubbleActivated), PanelChange::Opened);

        assert_eq!(*harness.panel.opens.borrow(), vec![true, false, true]);
        assert_eq!(decorator.pulses.get(), 2);
        assert_eq!(
            *harness.surface_seen.borrow(),
            vec![Message::Focus, Message::Focus]
        );
        assert!(harness.flags.get(SessionFlag::PanelOpen));
    }

    #[test]
    fn surface_close_closes_the_panel() {
        let page = MemoryPage::top_level();
        let mut harness = Harness::new(MemoryFlags::default());
        let widget = harness
            .mount(&InjectionGuard::new(&page), &WidgetSettings::default())
            .expect("widget");
        widget.dispatch(PanelEvent::BubbleActivated);

        assert!(harness.surface_bridge.post(Message::Close));
        assert_eq!(widget.state(), PanelState::Closed);
        assert!(!harness.flags.get(SessionFlag::PanelOpen));
    }

    #[test]
    fn scroll_auto_opens_once_per_session() {
        let page = MemoryPage::top_level();
        let mut harness = Harness::new(MemoryFlags::default());
        let widget = harness
            .mount(&InjectionGuard::new(&page), &WidgetSettings::default())
            .expect("widget");

        assert_eq!(widget.on_scroll(ScrollSignal::new(100.0, 1000.0)), PanelChange::Unchanged);
        assert!(widget.wants_scroll_signal());
        assert_eq!(widget.on_scroll(ScrollSignal::new(400.0, 1000.0)), PanelChange::Opened);
        assert!(!widget.wants_scroll_signal());

        widget.dispatch(PanelEvent::CloseActivated);
        assert_eq!(widget.on_scroll(ScrollSignal::new(900.0, 1000.0)), PanelChange::Unchanged);
        assert_eq!(widget.state(), PanelState::Closed);
        assert!(harness.flags.get(SessionFlag::AutoOpenShown));
    }

    #[test]
    fn mount_restores_open_panel_and_greets() {
        let page = MemoryPage::top_level();
        let mut harness = Harness::new(MemoryFlags::with([
            (SessionFlag::PanelOpen, true),
            (SessionFlag::AutoOpenShown, true),
        ]));
        let settings = WidgetSettings {
            greeting: Some("Hi! Ask me anything about the catalogue.".to_string()),
            ..WidgetSettings::default()
        };

        let widget = harness
            .mount(&InjectionGuard::new(&page), &settings)
            .expect("widget");
        assert_eq!(widget.state(), PanelState::Open);
        assert!(!widget.wants_scroll_signal());
        assert_eq!(*harness.panel.opens.borrow(), vec![true]);
        assert_eq!(
            *harness.surface_seen.borrow(),
            vec![
                Message::Notice {
                    text: "Hi! Ask me anything about the catalogue.".to_string()
                },
                Message::Focus,
            ]
        );

        let transcript = widget.transcript().borrow();
        assert_eq!(transcript.len(), 1);
        assert_eq!(
            transcript.last().map(|entry| entry.text.as_str()),
            Some("Hi! Ask me anything about the catalogue.")
        );
    }

    #[test]
    fn surface_ask_round_trips_through_the_session() {
        let page = MemoryPage::top_level();
        let mut harness = Harness::new(MemoryFlags::default());
        let settings = WidgetSettings::default();
        let widget = harness
            .mount(&InjectionGuard::new(&page), &settings)
            .expect("widget");
        let surface = harness.surface.clone().expect("surface");

        harness.backend.reply(Err(status_error(500)));
        harness.backend.reply(Ok("The mix rate is 3%.".to_string()));

        assert!(surface.submit("What is the mix rate?"));
        assert!(!surface.submit("What is the mix rate?"));
        harness.pool.run_until_stalled();
        assert!(!surface.is_waiting());

        assert!(surface.submit("What is the mix rate?"));
        harness.pool.run_until_stalled();

        assert_eq!(
            harness.backend.questions(),
            vec!["What is the mix rate?", "What is the mix rate?"]
        );
        let answers = harness
            .surface_seen
            .borrow()
            .iter()
            .filter_map(|message| match message {
                Message::Answer { text } => Some(text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(
            answers,
            vec![settings.error_text.clone(), "The mix rate is 3%.".to_string()]
        );
        assert_eq!(widget.transcript().borrow().len(), 4);
        assert!(!widget.session().is_pending());
    }

    #[test]
    fn surface_scroll_reaches_the_panel() {
        let page = MemoryPage::top_level();
        let mut harness = Harness::new(MemoryFlags::default());
        let _widget = harness
            .mount(&InjectionGuard::new(&page), &WidgetSettings::default())
            .expect("widget");

        assert!(harness.surface_bridge.post(Message::Scroll));
        assert_eq!(harness.panel.scrolls.get(), 1);
    }

    #[test]
    fn reindex_requires_admin() {
        let page = MemoryPage::top_level();
        let mut harness = Harness::new(MemoryFlags::default());
        let widget = harness
            .mount(&InjectionGuard::new(&page), &WidgetSettings::default())
            .expect("widget");

        assert!(!widget.trigger_reindex());
        harness.pool.run_until_stalled();
        assert_eq!(harness.confirmations.get(), 0);
        assert_eq!(harness.backend.reindex_calls(), 0);
    }

    #[test]
    fn admin_reindex_runs_in_background() {
        let page = MemoryPage::top_level();
        let mut harness = Harness::new(MemoryFlags::default());
        let settings = WidgetSettings {
            admin: true,
            ..WidgetSettings::default()
        };
        let widget = harness
            .mount(&InjectionGuard::new(&page), &settings)
            .expect("widget");
        harness.backend.reply(Ok("added: 1, chunks: 9".to_string()));

        assert!(widget.trigger_reindex());
        harness.pool.run_until_stalled();

        assert_eq!(harness.confirmations.get(), 1);
        assert_eq!(harness.backend.reindex_calls(), 1);
        assert_eq!(
            widget
                .transcript()
                .borrow()
                .last()
                .map(|entry| entry.text.clone()),
            Some("added: 1, chunks: 9".to_string())
        );
        assert_eq!(
            *harness.surface_seen.borrow(),
            vec![
                Message::Notice {
                    text: "added: 1, chunks: 9".to_string()
                },
                Message::Scroll,
            ]
        );
    }

    #[test]
    fn surface_with_its_own_transcript_sees_every_assistant_line() {
        let page = MemoryPage::top_level();
        let mut harness = Harness::new(MemoryFlags::default());
        let settings = WidgetSettings {
            admin: true,
            greeting: Some("Hello!".to_string()),
            ..WidgetSettings::default()
        };
        let widget = harness
            .mount(&InjectionGuard::new(&page), &settings)
            .expect("widget");
        let surface = harness.surface.clone().expect("surface");

        harness.backend.reply(Ok("The mix rate is 3%.".to_string()));
        assert!(surface.submit("What is the mix rate?"));
        harness.pool.run_until_stalled();

        harness.backend.reply(Ok("added: 3, chunks: 41".to_string()));
        assert!(widget.trigger_reindex());
        harness.pool.run_until_stalled();

        assert_eq!(
            *harness.surface_view.shown.borrow(),
            vec![
                "assistant: Hello!",
                "you: What is the mix rate?",
                "assistant: The mix rate is 3%.",
                "assistant: added: 3, chunks: 41",
            ]
        );
        assert!(!surface.is_waiting());
    }
}
