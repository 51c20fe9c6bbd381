#![deny(unsafe_code)]

pub mod bridge;
pub mod flags;
pub mod guard;
pub mod reindex;
pub mod session;
pub mod settings;
pub mod surface;
pub mod transcript;
pub mod visibility;
pub mod widget;

#[cfg(test)]
mod testing;

pub use bridge::{
    BridgeSide, LoopbackPort, Message, MessageBridge, MessageKind, MessagePort, Origin, Route,
    SubscriptionId,
};
pub use flags::{MemoryFlags, SessionFlag, SessionFlags};
pub use guard::{InjectionGuard, LOADED_MARKER, MemoryPage, PageContext, WidgetInstance};
pub use reindex::{Confirm, ReindexOutcome, ReindexTexts, ReindexTrigger};
pub use session::{
    ChatSession, ChatTurn, SendOutcome, SendRejection, SessionState, SessionTexts, TurnId,
    TurnStatus,
};
pub use settings::{SettingsError, SettingsStore, WidgetSettings};
pub use surface::{ChatSurface, SurfaceView};
pub use transcript::{EntryId, Speaker, Transcript, TranscriptEntry, TranscriptObserver};
pub use visibility::{PanelChange, PanelEvent, PanelState, ScrollSignal, VisibilityController};
pub use widget::{OpenDecorator, PanelView, TaskSpawner, Widget, WidgetParts};
