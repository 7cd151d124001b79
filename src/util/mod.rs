pub mod backoff;
pub mod subscribe;

pub use backoff::{BackoffConfig, DEFAULT_JITTER_FACTOR};
pub use subscribe::{ListenerRegistration, PartialObserver, Unsubscribe};
