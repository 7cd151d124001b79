use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Spawns an async task that runs in the background without being awaited.
#[cfg(target_arch = "wasm32")]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}

/// Spawns an async task that runs in the background without being awaited.
///
/// Inside a Tokio context the task lands on the current runtime; otherwise it is handed
/// to a lazily built single-threaded runtime owned by this module.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    use std::sync::LazyLock;
    use tokio::runtime::{Builder, Handle, Runtime};

    static BACKGROUND_RUNTIME: LazyLock<Option<Runtime>> = LazyLock::new(|| {
        match Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => Some(runtime),
            Err(err) => {
                log::error!("failed to build background runtime: {err}");
                None
            }
        }
    });

    if let Ok(handle) = Handle::try_current() {
        handle.spawn(future);
    } else if let Some(runtime) = BACKGROUND_RUNTIME.as_ref() {
        let _ = runtime.spawn(future);
    } else {
        log::warn!("dropping background task: no runtime available");
    }
}

/// Asynchronously waits for the provided duration in a platform-compatible way.
pub async fn sleep(duration: Duration) {
    if duration.is_zero() {
        return;
    }

    sleep_impl(duration).await;
}

#[cfg(target_arch = "wasm32")]
async fn sleep_impl(duration: Duration) {
    gloo_timers::future::sleep(duration).await;
}

#[cfg(not(target_arch = "wasm32"))]
async fn sleep_impl(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Cooperative cancellation flag shared between an owner and its background tasks.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Runs `task` after `delay` unless `flag` was cancelled in the meantime.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_after<F, Fut>(delay: Duration, flag: Option<CancellationFlag>, task: F)
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    spawn_detached(async move {
        sleep(delay).await;
        if flag.as_ref().is_some_and(CancellationFlag::is_cancelled) {
            return;
        }
        task().await;
    });
}

/// Runs `task` after `delay` unless `flag` was cancelled in the meantime.
#[cfg(target_arch = "wasm32")]
pub fn spawn_after<F, Fut>(delay: Duration, flag: Option<CancellationFlag>, task: F)
where
    F: FnOnce() -> Fut + 'static,
    Fut: Future<Output = ()> + 'static,
{
    spawn_detached(async move {
        sleep(delay).await;
        if flag.as_ref().is_some_and(CancellationFlag::is_cancelled) {
            return;
        }
        task().await;
    });
}

/// Runs `task` every `interval` until `flag` is cancelled. The first run happens one
/// full interval after the call.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_interval<F, Fut>(interval: Duration, flag: CancellationFlag, task: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    spawn_detached(async move {
        loop {
            sleep(interval).await;
            if flag.is_cancelled() {
                break;
            }
            task().await;
        }
    });
}

/// Runs `task` every `interval` until `flag` is cancelled. The first run happens one
/// full interval after the call.
#[cfg(target_arch = "wasm32")]
pub fn spawn_interval<F, Fut>(interval: Duration, flag: CancellationFlag, task: F)
where
    F: Fn() -> Fut + 'static,
    Fut: Future<Output = ()> + 'static,
{
    spawn_detached(async move {
        loop {
            sleep(interval).await;
            if flag.is_cancelled() {
                break;
            }
            task().await;
        }
    });
}
