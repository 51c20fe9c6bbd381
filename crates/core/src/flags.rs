use std::cell::RefCell;
use std::collections::BTreeMap;

/// Booleans that survive a page reload within one browsing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SessionFlag {
    AutoOpenShown,
    PanelOpen,
}

impl SessionFlag {
    pub const ALL: [SessionFlag; 2] = [SessionFlag::AutoOpenShown, SessionFlag::PanelOpen];

    /// Storage key, shared by every host that persists flags.
    pub const fn key(self) -> &'static str {
        match self {
            Self::AutoOpenShown => "ember.autoOpenShown",
            Self::PanelOpen => "ember.panelOpen",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|flag| flag.key() == key)
    }
}

/// Best-effort session storage.
///
/// Implementations swallow their own storage failures: a flag that cannot be written is
/// logged and otherwise treated as unset.
pub trait SessionFlags {
    fn get(&self, flag: SessionFlag) -> bool;
    fn set(&self, flag: SessionFlag, value: bool);
}

/// Flags kept for the lifetime of the process only.
#[derive(Debug, Default)]
pub struct MemoryFlags {
    values: RefCell<BTreeMap<SessionFlag, bool>>,
}

impl MemoryFlags {
    pub fn with(flags: impl IntoIterator<Item = (SessionFlag, bool)>) -> Self {
        Self {
            values: RefCell::new(flags.into_iter().collect()),
        }
    }
}

impl SessionFlags for MemoryFlags {
    fn get(&self, flag: SessionFlag) -> bool {
        self.values.borrow().get(&flag).copied().unwrap_or(false)
    }

    fn set(&self, flag: SessionFlag, value: bool) {
        self.values.borrow_mut().insert(flag, value);
    }
}
