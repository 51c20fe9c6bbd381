use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ember_backend::{Backend, BackendResult, ChatRequest};

use crate::bridge::{Message, MessageBridge};
use crate::transcript::{EntryId, Transcript};

/// Stable identifier for one question/answer exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnId(pub u64);

/// Lifecycle of one turn. `Resolved` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Pending,
    Resolved,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub id: TurnId,
    pub question: String,
    pub status: TurnStatus,
    pub answer_text: Option<String>,
    placeholder: EntryId,
}

impl ChatTurn {
    pub fn placeholder(&self) -> EntryId {
        self.placeholder
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, TurnStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Pending(TurnId),
}

/// Why a submission was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRejection {
    EmptyQuestion,
    TurnInFlight(TurnId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Resolved(TurnId),
    Failed(TurnId),
    Ignored(SendRejection),
}

/// User-facing strings of the chat flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTexts {
    pub placeholder: String,
    pub error: String,
}

/// Runs chat turns against the backend, at most one in flight.
pub struct ChatSession {
    backend: Rc<dyn Backend>,
    transcript: Rc<RefCell<Transcript>>,
    bridge: Rc<MessageBridge>,
    texts: SessionTexts,
    state: Cell<SessionState>,
    turns: RefCell<Vec<ChatTurn>>,
    next_turn_id: Cell<u64>,
}

impl ChatSession {
    pub fn new(
        backend: Rc<dyn Backend>,
        transcript: Rc<RefCell<Transcript>>,
        bridge: Rc<MessageBridge>,
        texts: SessionTexts,
    ) -> Self {
        Self {
            backend,
            transcript,
            bridge,
            texts,
            state: Cell::new(SessionState::Idle),
            turns: RefCell::new(Vec::new()),
            next_turn_id: Cell::new(1),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state.get(), SessionState::Pending(_))
    }

    pub fn turns(&self) -> Vec<ChatTurn> {
        self.turns.borrow().clone()
    }

    pub fn turn(&self, id: TurnId) -> Option<ChatTurn> {
        self.turns.borrow().iter().find(|turn| turn.id == id).cloned()
    }

    /// Submits one question.
    ///
    /// Empty questions and submissions made while another turn is pending are dropped
    /// without touching the transcript. Backend failures are absorbed into the fixed
    /// error text; nothing propagates to the caller.
    pub async fn send(&self, question: &str) -> SendOutcome {
        let question = question.trim();
        let turn_id = match self.begin(question) {
            Ok(turn_id) => turn_id,
            Err(rejection) => {
                tracing::debug!(?rejection, "chat submission ignored");
                return SendOutcome::Ignored(rejection);
            }
        };

        let result = self.backend.ask(ChatRequest::new(question)).await;
        self.finish(turn_id, result)
    }

    // Check and transition happen before the first await, so no second submission can
    // observe `Idle` while this one is being set up.
    fn begin(&self, question: &str) -> Result<TurnId, SendRejection> {
        if question.is_empty() {
            return Err(SendRejection::EmptyQuestion);
        }

        if let SessionState::Pending(active) = self.state.get() {
            return Err(SendRejection::TurnInFlight(active));
        }

        let turn_id = TurnId(self.next_turn_id.get());
        self.next_turn_id.set(turn_id.0.saturating_add(1));
        self.state.set(SessionState::Pending(turn_id));

        let placeholder = {
            let mut transcript = self.transcript.borrow_mut();
            transcript.push_user(question);
            transcript.push_placeholder(self.texts.placeholder.clone())
        };

        self.turns.borrow_mut().push(ChatTurn {
            id: turn_id,
            question: question.to_string(),
            status: TurnStatus::Pending,
            answer_text: None,
            placeholder,
        });

        tracing::debug!(turn_id = turn_id.0, "chat turn started");
        Ok(turn_id)
    }

    fn finish(&self, turn_id: TurnId, result: BackendResult<String>) -> SendOutcome {
        let (status, text, outcome) = match result {
            Ok(answer) => (TurnStatus::Resolved, answer, SendOutcome::Resolved(turn_id)),
            Err(error) => {
                tracing::warn!(turn_id = turn_id.0, error = %error, "chat turn failed");
                (
                    TurnStatus::Failed,
                    self.texts.error.clone(),
                    SendOutcome::Failed(turn_id),
                )
            }
        };

        let placeholder = {
            let mut turns = self.turns.borrow_mut();
            let Some(turn) = turns.iter_mut().find(|turn| turn.id == turn_id) else {
                tracing::error!(turn_id = turn_id.0, "finished turn is not tracked");
                self.state.set(SessionState::Idle);
                return SendOutcome::Failed(turn_id);
            };
            turn.status = status;
            turn.answer_text = Some(text.clone());
            turn.placeholder
        };

        // Back to idle before anything is announced, so a surface reacting to the answer
        // can submit again straight away.
        self.state.set(SessionState::Idle);
        self.transcript
            .borrow_mut()
            .settle(placeholder, text.clone());
        self.bridge.post(Message::Answer { text });
        self.bridge.post(Message::Scroll);

        tracing::debug!(turn_id = turn_id.0, ?status, "chat turn finished");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::{LocalPool, block_on};
    use futures::task::LocalSpawnExt;

    use super::*;
    use crate::bridge::Origin;
    use crate::testing::{ScriptedBackend, recorded_surface, status_error};
    use crate::transcript::Speaker;

    const ERROR_TEXT: &str = "Sorry, I couldn't reach the assistant. Please try again.";

    struct Harness {
        session: Rc<ChatSession>,
        backend: Rc<ScriptedBackend>,
        transcript: Rc<RefCell<Transcript>>,
        surface_seen: Rc<RefCell<Vec<Message>>>,
        // Keeps the loopback peer alive; the host port only holds a weak reference.
        _surface: Rc<MessageBridge>,
    }

    fn harness() -> Harness {
        let backend = Rc::new(ScriptedBackend::default());
        let transcript = Rc::new(RefCell::new(Transcript::new()));
        let origin = Origin::parse("https://shop.example.com").expect("origin");
        let (host, surface) = MessageBridge::loopback_pair(origin);
        let surface_seen = recorded_surface(&surface);
        let session = Rc::new(ChatSession::new(
            backend.clone(),
            transcript.clone(),
            host,
            SessionTexts {
                placeholder: "Thinking…".to_string(),
                error: ERROR_TEXT.to_string(),
            },
        ));
        Harness {
            session,
            backend,
            transcript,
            surface_seen,
            _surface: surface,
        }
    }

    fn lines(transcript: &Rc<RefCell<Transcript>>) -> Vec<(Speaker, String)> {
        transcript
            .borrow()
            .entries()
            .iter()
            .map(|entry| (entry.speaker, entry.text.clone()))
            .collect()
    }

    #[test]
    fn successful_turn_replaces_placeholder_with_answer() {
        let harness = harness();
        harness.backend.reply(Ok("3%".to_string()));

        let outcome = block_on(harness.session.send("What is the mix rate?"));

        assert_eq!(outcome, SendOutcome::Resolved(TurnId(1)));
        assert_eq!(
            lines(&harness.transcript),
            vec![
                (Speaker::User, "What is the mix rate?".to_string()),
                (Speaker::Assistant, "3%".to_string()),
            ]
        );
        assert_eq!(harness.backend.questions(), vec!["What is the mix rate?".to_string()]);
        assert_eq!(harness.session.state(), SessionState::Idle);
        assert_eq!(
            harness.session.turn(TurnId(1)).map(|turn| turn.status),
            Some(TurnStatus::Resolved)
        );
        assert_eq!(
            *harness.surface_seen.borrow(),
            vec![Message::Answer { text: "3%".to_string() }, Message::Scroll]
        );
    }

    #[test]
    fn server_error_shows_fixed_text_and_session_accepts_again() {
        let harness = harness();
        harness.backend.reply(Err(status_error(500)));
        harness.backend.reply(Ok("Yes.".to_string()));

        assert_eq!(
            block_on(harness.session.send("What is the mix rate?")),
            SendOutcome::Failed(TurnId(1))
        );
        assert_eq!(
            harness.transcript.borrow().last().map(|entry| entry.text.clone()),
            Some(ERROR_TEXT.to_string())
        );
        assert_eq!(harness.session.state(), SessionState::Idle);
        assert_eq!(
            harness.session.turn(TurnId(1)).map(|turn| turn.status),
            Some(TurnStatus::Failed)
        );

        assert_eq!(
            block_on(harness.session.send("Is it certified?")),
            SendOutcome::Resolved(TurnId(2))
        );
        assert_eq!(harness.transcript.borrow().len(), 4);
    }

    #[test]
    fn empty_questions_are_ignored() {
        let harness = harness();
        for question in ["", "   ", "\n\t"] {
            assert_eq!(
                block_on(harness.session.send(question)),
                SendOutcome::Ignored(SendRejection::EmptyQuestion)
            );
        }
        assert!(harness.transcript.borrow().is_empty());
        assert!(harness.backend.questions().is_empty());
    }

    #[test]
    fn second_send_while_pending_is_dropped() {
        let harness = harness();
        let gate = harness.backend.hold();
        let mut pool = LocalPool::new();
        let spawner = pool.spawner();

        let first = harness.session.clone();
        spawner
            .spawn_local(async move {
                first.send("q1").await;
            })
            .expect("spawn first send");
        pool.run_until_stalled();
        assert!(harness.session.is_pending());

        let second = harness.session.clone();
        let dropped = Rc::new(Cell::new(None));
        let dropped_slot = dropped.clone();
        spawner
            .spawn_local(async move {
                dropped_slot.set(Some(second.send("q2").await));
            })
            .expect("spawn second send");
        pool.run_until_stalled();

        assert_eq!(
            dropped.get(),
            Some(SendOutcome::Ignored(SendRejection::TurnInFlight(TurnId(1))))
        );
        assert_eq!(harness.backend.questions(), vec!["q1".to_string()]);
        assert!(
            lines(&harness.transcript)
                .iter()
                .all(|(_, text)| text != "q2")
        );

        gate.release(Ok("a1".to_string()));
        pool.run_until_stalled();

        assert_eq!(
            lines(&harness.transcript),
            vec![
                (Speaker::User, "q1".to_string()),
                (Speaker::Assistant, "a1".to_string()),
            ]
        );
        assert_eq!(harness.session.state(), SessionState::Idle);
    }

    #[test]
    fn pending_turn_shows_placeholder_until_resolved() {
        let harness = harness();
        let gate = harness.backend.hold();
        let mut pool = LocalPool::new();

        let session = harness.session.clone();
        pool.spawner()
            .spawn_local(async move {
                session.send("  How long does it last?  ").await;
            })
            .expect("spawn send");
        pool.run_until_stalled();

        let entries = harness.transcript.borrow().entries().to_vec();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "How long does it last?");
        assert!(entries[1].pending);
        assert_eq!(entries[1].text, "Thinking…");
        assert!(harness.surface_seen.borrow().is_empty());

        gate.release(Err(status_error(502)));
        pool.run_until_stalled();

        let last = harness.transcript.borrow().last().cloned().expect("entry");
        assert!(!last.pending);
        assert_eq!(last.text, ERROR_TEXT);
        assert_eq!(
            *harness.surface_seen.borrow(),
            vec![
                Message::Answer {
                    text: ERROR_TEXT.to_string()
                },
                Message::Scroll
            ]
        );
    }

    #[test]
    fn every_accepted_turn_gets_exactly_one_terminal_entry() {
        let harness = harness();
        let replies = [Ok("a"), Err(500), Ok("b"), Err(404), Ok("c")];
        for reply in replies {
            harness.backend.reply(match reply {
                Ok(text) => Ok(text.to_string()),
                Err(status) => Err(status_error(status)),
            });
        }

        for index in 0..replies.len() {
            block_on(harness.session.send(&format!("question {index}")));
        }

        let entries = harness.transcript.borrow().entries().to_vec();
        assert_eq!(entries.len(), replies.len() * 2);
        for pair in entries.chunks(2) {
            assert_eq!(pair[0].speaker, Speaker::User);
            assert_eq!(pair[1].speaker, Speaker::Assistant);
            assert!(!pair[1].pending);
        }
        assert!(harness.session.turns().iter().all(ChatTurn::is_terminal));
        let answers = harness
            .surface_seen
            .borrow()
            .iter()
            .filter(|message| matches!(message, Message::Answer { .. }))
            .count();
        assert_eq!(answers, replies.len());
    }
}
