use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ember_backend::Backend;

use crate::bridge::{Message, MessageBridge};
use crate::transcript::Transcript;

/// Asks the user to approve a destructive action.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReindexTexts {
    pub prompt: String,
    pub placeholder: String,
    pub failure: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReindexOutcome {
    Declined,
    Busy,
    Completed(String),
    Failed,
}

/// Confirmation-gated knowledge base rebuild.
pub struct ReindexTrigger {
    backend: Rc<dyn Backend>,
    transcript: Rc<RefCell<Transcript>>,
    bridge: Rc<MessageBridge>,
    confirm: Rc<dyn Confirm>,
    texts: ReindexTexts,
    in_flight: Cell<bool>,
}

impl ReindexTrigger {
    pub fn new(
        backend: Rc<dyn Backend>,
        transcript: Rc<RefCell<Transcript>>,
        bridge: Rc<MessageBridge>,
        confirm: Rc<dyn Confirm>,
        texts: ReindexTexts,
    ) -> Self {
        Self {
            backend,
            transcript,
            bridge,
            confirm,
            texts,
            in_flight: Cell::new(false),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.get()
    }

    /// Runs one reindex after explicit confirmation. Never retried.
    pub async fn trigger(&self) -> ReindexOutcome {
        if self.in_flight.get() {
            tracing::debug!("reindex already in flight; ignoring trigger");
            return ReindexOutcome::Busy;
        }

        if !self.confirm.confirm(&self.texts.prompt) {
            tracing::info!("reindex declined");
            return ReindexOutcome::Declined;
        }

        self.in_flight.set(true);
        let placeholder = self
            .transcript
            .borrow_mut()
            .push_placeholder(self.texts.placeholder.clone());

        let (outcome, text) = match self.backend.reindex().await {
            Ok(summary) => {
                tracing::info!(summary = %summary, "reindex completed");
                (ReindexOutcome::Completed(summary.clone()), summary)
            }
            Err(error) => {
                tracing::warn!(error = %error, "reindex failed");
                (ReindexOutcome::Failed, self.texts.failure.clone())
            }
        };

        self.in_flight.set(false);
        self.transcript.borrow_mut().settle(placeholder, text.clone());
        // Surfaces with their own transcript never saw the placeholder.
        self.bridge.post(Message::Notice { text });
        self.bridge.post(Message::Scroll);
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

    const FAILURE: &str = "Reindex failed. Please try again later.";

    struct Harness {
        backend: Rc<ScriptedBackend>,
        transcript: Rc<RefCell<Transcript>>,
        surface_seen: Rc<RefCell<Vec<Message>>>,
        // Keeps the loopback peer alive; the host port only holds a weak reference.
        _surface: Rc<MessageBridge>,
        prompts: Rc<RefCell<Vec<String>>>,
    }

    fn trigger_with(approve: bool) -> (Rc<ReindexTrigger>, Harness) {
        let backend = Rc::new(ScriptedBackend::default());
        let transcript = Rc::new(RefCell::new(Transcript::new()));
        let origin = Origin::parse("https://shop.example.com").expect("origin");
        let (host, surface) = MessageBridge::loopback_pair(origin);
        let surface_seen = recorded_surface(&surface);
        let prompts = Rc::new(RefCell::new(Vec::new()));
        let prompt_log = prompts.clone();
        let confirm = move |prompt: &str| {
            prompt_log.borrow_mut().push(prompt.to_string());
            approve
        };

        let trigger = Rc::new(ReindexTrigger::new(
            backend.clone(),
            transcript.clone(),
            host,
            Rc::new(confirm),
            ReindexTexts {
                prompt: "Rebuild the knowledge base?".to_string(),
                placeholder: "Reindexing…".to_string(),
                failure: FAILURE.to_string(),
            },
        ));
        (
            trigger,
            Harness {
                backend,
                transcript,
                surface_seen,
                _surface: surface,
                prompts,
            },
        )
    }

    #[test]
    fn declined_confirmation_makes_no_network_call() {
        let (trigger, harness) = trigger_with(false);

        assert_eq!(block_on(trigger.trigger()), ReindexOutcome::Declined);
        assert_eq!(harness.backend.reindex_calls(), 0);
        assert!(harness.transcript.borrow().is_empty());
        assert_eq!(
            *harness.prompts.borrow(),
            vec!["Rebuild the knowledge base?".to_string()]
        );
    }

    #[test]
    fn confirmed_reindex_reports_summary() {
        let (trigger, harness) = trigger_with(true);
        harness.backend.reply(Ok("added: 3, chunks: 41".to_string()));

        assert_eq!(
            block_on(trigger.trigger()),
            ReindexOutcome::Completed("added: 3, chunks: 41".to_string())
        );
        assert_eq!(harness.backend.reindex_calls(), 1);
        assert_eq!(
            harness.transcript.borrow().last().map(|entry| entry.text.clone()),
            Some("added: 3, chunks: 41".to_string())
        );
        assert_eq!(
            *harness.surface_seen.borrow(),
            vec![
                Message::Notice {
                    text: "added: 3, chunks: 41".to_string()
                },
                Message::Scroll,
            ]
        );
    }

    #[test]
    fn failure_reports_fixed_text_without_retry() {
        let (trigger, harness) = trigger_with(true);
        harness.backend.reply(Err(status_error(503)));

        assert_eq!(block_on(trigger.trigger()), ReindexOutcome::Failed);
        assert_eq!(harness.backend.reindex_calls(), 1);
        assert_eq!(
            harness.transcript.borrow().last().map(|entry| entry.text.clone()),
            Some(FAILURE.to_string())
        );
        assert_eq!(
            harness.surface_seen.borrow().first(),
            Some(&Message::Notice {
                text: FAILURE.to_string()
            })
        );
        assert!(!trigger.is_in_flight());
    }

    #[test]
    fn trigger_while_in_flight_is_busy() {
        let (trigger, harness) = trigger_with(true);
        let gate = harness.backend.hold();
        let mut pool = LocalPool::new();

        let running = trigger.clone();
        pool.spawner()
            .spawn_local(async move {
                running.trigger().await;
            })
            .expect("spawn trigger");
        pool.run_until_stalled();
        assert!(trigger.is_in_flight());

        assert_eq!(block_on(trigger.trigger()), ReindexOutcome::Busy);
        assert_eq!(harness.backend.reindex_calls(), 1);
        assert_eq!(harness.prompts.borrow().len(), 1);

        gate.release(Ok("done".to_string()));
        pool.run_until_stalled();
        assert!(!trigger.is_in_flight());
    }
}
