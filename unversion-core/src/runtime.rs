//! Background runtime
//!
//! Detached work (trace forwarding) runs on the caller's Tokio runtime when
//! there is one, and otherwise on a small shared runtime built on first use.

use std::future::Future;

use once_cell::sync::Lazy;
use tokio::runtime::{Handle, Runtime};
use tracing::error;

static RUNTIME: Lazy<Option<Runtime>> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("unversion-bg")
        .enable_all()
        .build()
        .map_err(|e| error!(error = %e, "failed to create background runtime"))
        .ok()
});

/// Spawns `future` without giving the caller anything to wait on.
///
/// Returns `false` if no runtime was available and the future was dropped.
pub fn spawn_detached<F>(future: F) -> bool
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(handle) = Handle::try_current() {
        handle.spawn(future);
        return true;
    }

    match RUNTIME.as_ref() {
        Some(runtime) => {
            runtime.spawn(future);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_spawn_without_ambient_runtime() {
        let (tx, rx) = mpsc::channel();
        assert!(spawn_detached(async move {
            tx.send(42).unwrap();
        }));
        assert_eq!(Ok(42), rx.recv_timeout(Duration::from_secs(5)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spawn_on_ambient_runtime() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        assert!(spawn_detached(async move {
            let _ = tx.send(7);
        }));
        assert_eq!(7, rx.await.unwrap());
    }

    #[test]
    fn test_panicking_task_is_isolated() {
        assert!(spawn_detached(async {
            panic!("boom");
        }));

        let (tx, rx) = mpsc::channel();
        assert!(spawn_detached(async move {
            tx.send(()).unwrap();
        }));
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }
}
