//! Shared fakes for unit tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use ember_backend::{Backend, BackendError, BackendResult, ChatRequest};
use futures::channel::oneshot;
use futures::future::LocalBoxFuture;

use crate::bridge::{Message, MessageBridge};

enum Reply {
    Ready(BackendResult<String>),
    Held(oneshot::Receiver<BackendResult<String>>),
}

/// Backend answering from a queue of scripted replies.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    replies: RefCell<VecDeque<Reply>>,
    questions: RefCell<Vec<String>>,
    reindex_calls: Cell<usize>,
}

/// Completes one held reply.
pub(crate) struct Gate {
    sender: oneshot::Sender<BackendResult<String>>,
}

impl Gate {
    pub(crate) fn release(self, result: BackendResult<String>) {
        let _ = self.sender.send(result);
    }
}

impl ScriptedBackend {
    pub(crate) fn reply(&self, result: BackendResult<String>) {
        self.replies.borrow_mut().push_back(Reply::Ready(result));
    }

    /// Queues a reply that stays pending until the returned gate is released.
    pub(crate) fn hold(&self) -> Gate {
        let (sender, receiver) = oneshot::channel();
        self.replies.borrow_mut().push_back(Reply::Held(receiver));
        Gate { sender }
    }

    pub(crate) fn questions(&self) -> Vec<String> {
        self.questions.borrow().clone()
    }

    pub(crate) fn reindex_calls(&self) -> usize {
        self.reindex_calls.get()
    }

    fn next_reply(&self) -> LocalBoxFuture<'static, BackendResult<String>> {
        let reply = self.replies.borrow_mut().pop_front();
        Box::pin(async move {
            match reply {
                Some(Reply::Ready(result)) => result,
                Some(Reply::Held(receiver)) => receiver.await.unwrap_or_else(|_| {
                    Err(BackendError::Rejected {
                        stage: "scripted-gate-dropped",
                        message: "gate dropped".to_string(),
                    })
                }),
                None => Err(BackendError::Rejected {
                    stage: "scripted-no-reply",
                    message: "no scripted reply".to_string(),
                }),
            }
        })
    }
}

impl Backend for ScriptedBackend {
    fn ask<'a>(&'a self, request: ChatRequest) -> LocalBoxFuture<'a, BackendResult<String>> {
        self.questions.borrow_mut().push(request.question);
        self.next_reply()
    }

    fn reindex<'a>(&'a self) -> LocalBoxFuture<'a, BackendResult<String>> {
        self.reindex_calls.set(self.reindex_calls.get() + 1);
        self.next_reply()
    }
}

pub(crate) fn status_error(status: u16) -> BackendError {
    BackendError::Status {
        stage: "scripted-status",
        url: "https://assist.example.com/chat".to_string(),
        status,
        body: "scripted failure".to_string(),
    }
}

pub(crate) fn recorded_surface(surface: &Rc<MessageBridge>) -> Rc<RefCell<Vec<Message>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    surface.subscribe(move |message| sink.borrow_mut().push(message.clone()));
    seen
}
