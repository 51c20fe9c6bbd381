use std::rc::Rc;

/// Stable identifier for one transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub u64);

/// Who a transcript line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub id: EntryId,
    pub speaker: Speaker,
    pub text: String,
    /// True while the line is a placeholder awaiting its terminal text.
    pub pending: bool,
}

/// Renderer hook notified of every transcript mutation.
pub trait TranscriptObserver {
    fn entry_appended(&self, entry: &TranscriptEntry);
    fn entry_settled(&self, entry: &TranscriptEntry);
}

/// Append-only, chronologically ordered chat transcript.
///
/// Entries are never removed or reordered; the only in-place edit is settling a pending
/// placeholder, which happens at most once per placeholder.
#[derive(Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    next_entry_id: u64,
    observers: Vec<Rc<dyn TranscriptObserver>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, observer: Rc<dyn TranscriptObserver>) {
        self.observers.push(observer);
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    pub fn get(&self, id: EntryId) -> Option<&TranscriptEntry> {
        self.entries.iter().rev().find(|entry| entry.id == id)
    }

    pub fn push_user(&mut self, text: impl Into<String>) -> EntryId {
        self.push(Speaker::User, text.into(), false)
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) -> EntryId {
        self.push(Speaker::Assistant, text.into(), false)
    }

    pub fn push_placeholder(&mut self, text: impl Into<String>) -> EntryId {
        self.push(Speaker::Assistant, text.into(), true)
    }

    /// Replaces a pending placeholder with its terminal text.
    ///
    /// Returns false, leaving the transcript untouched, when the entry does not exist or
    /// has already been settled.
    pub fn settle(&mut self, id: EntryId, text: impl Into<String>) -> bool {
        let Some(index) = self.entries.iter().rposition(|entry| entry.id == id) else {
            return false;
        };

        let entry = &mut self.entries[index];
        if !entry.pending {
            return false;
        }

        entry.text = text.into();
        entry.pending = false;

        let entry = &self.entries[index];
        for observer in &self.observers {
            observer.entry_settled(entry);
        }
        true
    }

    fn push(&mut self, speaker: Speaker, text: String, pending: bool) -> EntryId {
        self.next_entry_id = self.next_entry_id.saturating_add(1);
        let id = EntryId(self.next_entry_id);
        self.entries.push(TranscriptEntry {
            id,
            speaker,
            text,
            pending,
        });

        if let Some(entry) = self.entries.last() {
            for observer in &self.observers {
                observer.entry_appended(entry);
            }
        }
        id
    }
}
