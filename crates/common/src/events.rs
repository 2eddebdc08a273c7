use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::ObservedError;

/// Callback attached to an `ErrorStream`.
pub type Observer = Arc<dyn Fn(&ObservedError) + Send + Sync>;

/// Handle returned by `ErrorStream::subscribe`, used to detach the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Synchronous multi-observer event stream.
///
/// Observers are invoked on the emitting thread, outside the lock, so an
/// observer may itself subscribe or unsubscribe.
#[derive(Default)]
pub struct ErrorStream {
    observers: RwLock<Vec<(ObserverId, Observer)>>,
    next_id: AtomicU64,
}

impl ErrorStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Observer) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    /// Returns `false` if the observer was already detached.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        match observers.iter().position(|(existing, _)| *existing == id) {
            Some(idx) => {
                observers.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn emit(&self, error: &ObservedError) {
        let snapshot: Vec<Observer> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in snapshot {
            observer(error);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }
}

impl std::fmt::Debug for ErrorStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorStream")
            .field("observers", &self.observer_count())
            .finish()
    }
}
