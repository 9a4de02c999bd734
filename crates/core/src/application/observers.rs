// Observer list with explicit disposers

use crate::application::panic_guard::{execute_guarded, PanicGuardResult};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::warn;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct ObserverList<T> {
    next_id: u64,
    listeners: Vec<(u64, Listener<T>)>,
}

/// Registered listeners for values of type `T`
///
/// `register` hands back a `Subscription`; calling `unsubscribe` on it
/// removes the listener. Dropping the subscription keeps the listener alive.
pub struct Observers<T> {
    list: Arc<Mutex<ObserverList<T>>>,
}

impl<T: 'static> Observers<T> {
    pub fn new() -> Self {
        Self {
            list: Arc::new(Mutex::new(ObserverList {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Add a listener
    pub fn register<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut list = self.list.lock().unwrap_or_else(PoisonError::into_inner);
            let id = list.next_id;
            list.next_id += 1;
            list.listeners.push((id, Arc::new(listener)));
            id
        };

        let weak: Weak<Mutex<ObserverList<T>>> = Arc::downgrade(&self.list);
        Subscription {
            dispose: Some(Box::new(move || {
                if let Some(list) = weak.upgrade() {
                    let mut list = list.lock().unwrap_or_else(PoisonError::into_inner);
                    list.listeners.retain(|(listener_id, _)| *listener_id != id);
                }
            })),
        }
    }

    /// Call every listener with `value`
    ///
    /// Listeners run outside the lock, so they may register or unsubscribe.
    /// A panicking listener is logged and skipped.
    pub fn notify(&self, value: &T) {
        let listeners: Vec<Listener<T>> = {
            let list = self.list.lock().unwrap_or_else(PoisonError::into_inner);
            list.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };

        for listener in listeners {
            if let PanicGuardResult::Panicked(msg) =
                execute_guarded(AssertUnwindSafe(|| listener(value)))
            {
                warn!(panic_msg = %msg, "Queue listener panicked, continuing with remaining listeners");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.list
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Disposer returned by `Observers::register`
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Remove the listener; later notifications no longer reach it
    pub fn unsubscribe(mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}
