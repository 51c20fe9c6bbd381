use std::cell::{Cell, RefCell};

use ember_core::{
    Confirm, PanelView, Speaker, SurfaceView, TaskSpawner, TranscriptEntry, TranscriptObserver,
};
use futures::future::LocalBoxFuture;
use tokio::task::JoinHandle;

/// Prints the transcript and panel changes to stdout.
#[derive(Default)]
pub struct Terminal;

impl Terminal {
    fn print_entry(entry: &TranscriptEntry) {
        let speaker = match entry.speaker {
            Speaker::User => "you",
            Speaker::Assistant => "assistant",
        };
        println!("{speaker}> {}", entry.text);
    }
}

impl TranscriptObserver for Terminal {
    fn entry_appended(&self, entry: &TranscriptEntry) {
        // The user's own line is already on screen.
        if entry.speaker == Speaker::Assistant {
            Self::print_entry(entry);
        }
    }

    fn entry_settled(&self, entry: &TranscriptEntry) {
        Self::print_entry(entry);
    }
}

impl PanelView for Terminal {
    fn set_open(&self, open: bool) {
        println!("[panel {}]", if open { "opened" } else { "closed" });
    }
}

impl SurfaceView for Terminal {
    fn focus_input(&self) {
        tracing::debug!("surface input focused");
    }

    fn scroll_to_latest(&self) {}

    fn set_waiting(&self, waiting: bool) {
        tracing::debug!(waiting, "surface waiting state changed");
    }
}

/// Approves a reindex only when the command carried `--yes`.
#[derive(Default)]
pub struct FlagConfirm {
    approved: Cell<bool>,
}

impl FlagConfirm {
    pub fn arm(&self, approved: bool) {
        self.approved.set(approved);
    }
}

impl Confirm for FlagConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        let approved = self.approved.replace(false);
        if !approved {
            println!("{prompt} (repeat with /reindex --yes to confirm)");
        }
        approved
    }
}

/// Spawns onto the current tokio `LocalSet` and keeps the handles so the session can
/// wait for outstanding answers before exiting.
#[derive(Default)]
pub struct LocalTasks {
    handles: RefCell<Vec<JoinHandle<()>>>,
}

impl LocalTasks {
    /// Resolves once every spawned task, including ones spawned meanwhile, has finished.
    pub async fn finish(&self) {
        loop {
            let handles = std::mem::take(&mut *self.handles.borrow_mut());
            if handles.is_empty() {
                return;
            }
            tracing::debug!(count = handles.len(), "waiting for in-flight tasks");
            for handle in handles {
                if let Err(error) = handle.await {
                    tracing::warn!(error = %error, "widget task did not complete");
                }
            }
        }
    }
}

impl TaskSpawner for LocalTasks {
    fn spawn_task(&self, task: LocalBoxFuture<'static, ()>) {
        let mut handles = self.handles.borrow_mut();
        handles.retain(|handle| !handle.is_finished());
        handles.push(tokio::task::spawn_local(task));
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    #[test]
    fn finish_waits_for_tasks_still_in_flight() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        let local = tokio::task::LocalSet::new();
        let tasks = Rc::new(LocalTasks::default());
        let answered = Rc::new(Cell::new(false));

        let (sender, receiver) = futures::channel::oneshot::channel::<()>();
        let flag = answered.clone();
        let spawner = tasks.clone();
        local.block_on(&runtime, async move {
            spawner.spawn_task(Box::pin(async move {
                let _ = receiver.await;
                flag.set(true);
            }));
            tokio::task::spawn_local(async move {
                tokio::task::yield_now().await;
                let _ = sender.send(());
            });
            spawner.finish().await;
        });

        assert!(answered.get());
    }

    #[test]
    fn confirmation_is_single_use() {
        let confirm = FlagConfirm::default();
        assert!(!confirm.confirm("Rebuild?"));

        confirm.arm(true);
        assert!(confirm.confirm("Rebuild?"));
        assert!(!confirm.confirm("Rebuild?"));
    }
}
