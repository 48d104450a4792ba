//! Live operations of one graphql-ws session, keyed by client id.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to a running operation task.
///
/// The registry can only cancel or await the task. It never reaches into
/// the task's stream.
#[derive(Debug)]
pub struct OperationHandle {
    token: CancellationToken,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl OperationHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Request cancellation and wait for the task to stop.
    pub async fn cancel_and_wait(self) {
        self.token.cancel();
        if let Some(task) = self.task {
            let _ = task.await;
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Drop the task at its next await point.
    pub fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// Mapping from operation id to its running task.
///
/// At most one live entry exists per id. Each entry carries a generation
/// so a finished task removes only its own entry, never a replacement
/// that reused the id.
#[derive(Debug, Default)]
pub struct Registry {
    entries: DashMap<String, OperationHandle>,
    next_generation: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `id` for a task that is about to be spawned.
    ///
    /// Returns the cancellation token the task must observe and the
    /// generation it must pass to [`Registry::finish`]. The caller must
    /// have removed any previous entry for `id` first.
    pub fn reserve(&self, id: &str) -> (CancellationToken, u64) {
        let token = CancellationToken::new();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            id.to_owned(),
            OperationHandle {
                token: token.clone(),
                generation,
                task: None,
            },
        );
        (token, generation)
    }

    /// Attach the spawned task to its reserved entry.
    ///
    /// When the task already finished and removed itself, the handle is
    /// simply dropped.
    pub fn attach(&self, id: &str, generation: u64, task: JoinHandle<()>) {
        if let Some(mut entry) = self.entries.get_mut(id) {
            if entry.generation == generation {
                entry.task = Some(task);
            }
        }
    }

    /// Remove the entry of a task that ended by itself.
    pub fn finish(&self, id: &str, generation: u64) -> bool {
        self.entries
            .remove_if(id, |_, entry| entry.generation == generation)
            .is_some()
    }

    pub fn remove(&self, id: &str) -> Option<OperationHandle> {
        self.entries.remove(id).map(|(_, entry)| entry)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take every entry out and cancel it. Returns the cancelled handles.
    pub fn cancel_all(&self) -> Vec<OperationHandle> {
        let ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        let mut cancelled = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = self.remove(&id) {
                entry.cancel();
                cancelled.push(entry);
            }
        }
        cancelled
    }
}
