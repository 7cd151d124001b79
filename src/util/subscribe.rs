use std::error::Error;
use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, Mutex, PoisonError};

pub type NextFn<T> = Arc<dyn Fn(&T) + Send + Sync + 'static>;
pub type ErrorFn = Arc<dyn Fn(&(dyn Error + 'static)) + Send + Sync + 'static>;

/// Callback pair handed to a live listener: `next` receives every delivered value,
/// `error` receives transport failures. Either may be absent.
#[derive(Clone)]
pub struct PartialObserver<T> {
    pub next: Option<NextFn<T>>,
    pub error: Option<ErrorFn>,
}

impl<T> PartialObserver<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_next<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.next = Some(Arc::new(callback));
        self
    }

    pub fn with_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) + Send + Sync + 'static,
    {
        self.error = Some(Arc::new(callback));
        self
    }

    pub fn notify_next(&self, value: &T) {
        if let Some(next) = &self.next {
            next(value);
        }
    }

    pub fn notify_error(&self, error: &(dyn Error + 'static)) {
        if let Some(callback) = &self.error {
            callback(error);
        }
    }
}

impl<T> Default for PartialObserver<T> {
    fn default() -> Self {
        Self {
            next: None,
            error: None,
        }
    }
}

pub type Unsubscribe = Box<dyn FnOnce() + Send + 'static>;

/// Handle returned when a listener is attached. Detaching runs the teardown exactly
/// once; dropping the handle detaches as well.
pub struct ListenerRegistration {
    teardown: Mutex<Option<Unsubscribe>>,
}

impl ListenerRegistration {
    pub fn new(teardown: Unsubscribe) -> Self {
        Self {
            teardown: Mutex::new(Some(teardown)),
        }
    }

    /// A registration with nothing to tear down.
    pub fn noop() -> Self {
        Self {
            teardown: Mutex::new(None),
        }
    }

    /// Detaches the listener. Safe to call any number of times.
    pub fn detach(&self) {
        let teardown = self
            .teardown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    pub fn is_detached(&self) -> bool {
        self.teardown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Debug for ListenerRegistration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("detached", &self.is_detached())
            .finish()
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn detach_runs_teardown_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registration = ListenerRegistration::new(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        registration.detach();
        registration.detach();
        drop(registration);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn observer_without_callbacks_is_silent() {
        let observer: PartialObserver<u32> = PartialObserver::new();
        observer.notify_next(&1);
    }
}
