use std::{
    sync::{Arc, Mutex, TryLockError},
    time::Duration,
};

use anyhow::{anyhow, bail, Result};

/// How long a single OS call may take before the caller gives up on it.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Owns an OS handle whose calls may hang. Calls run on the blocking pool under a timeout,
/// and at most one call is in flight: while an earlier call is still stuck, new ones fail
/// right away instead of queueing up behind it.
pub struct BlockingSlot<S> {
    inner: Arc<Mutex<S>>,
    timeout: Duration,
}

impl<S: Send + 'static> BlockingSlot<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inner)),
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    pub async fn run<R: Send + 'static>(
        &self,
        call: impl FnOnce(&mut S) -> Result<R> + Send + 'static,
    ) -> Result<R> {
        let inner = self.inner.clone();
        let task = tokio::task::spawn_blocking(move || {
            let mut inner = match inner.try_lock() {
                Ok(v) => v,
                Err(TryLockError::WouldBlock) => bail!("Previous OS call is still running"),
                Err(TryLockError::Poisoned(_)) => {
                    bail!("OS handle is poisoned by a previous panic")
                }
            };
            call(&mut inner)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(anyhow!("OS call panicked {e}")),
            Err(_) => Err(anyhow!("OS call didn't finish in {:?}", self.timeout)),
        }
    }
}
