//! Bounded, detached cache writes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::types::CacheError;

/// Runs cache writes off the caller's path.
///
/// Every write is bounded by `timeout`; failures and timeouts are logged and
/// dropped. [`BackgroundWriter::wait_idle`] resolves once nothing is in flight.
#[derive(Clone)]
pub struct BackgroundWriter {
    timeout: Duration,
    in_flight: Arc<watch::Sender<usize>>,
}

impl BackgroundWriter {
    pub fn new(timeout: Duration) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            timeout,
            in_flight: Arc::new(in_flight),
        }
    }

    pub fn spawn<F>(&self, label: &'static str, write: F)
    where
        F: Future<Output = Result<(), CacheError>> + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            warn!(label, "no runtime available, dropping cache write");
            return;
        };

        let ticket = InFlight::acquire(self.in_flight.clone());
        let timeout = self.timeout;
        runtime.spawn(async move {
            let _ticket = ticket;
            match tokio::time::timeout(timeout, write).await {
                Ok(Ok(())) => debug!(label, "cache write finished"),
                Ok(Err(error)) => warn!(label, %error, "cache write failed"),
                Err(_) => warn!(label, error = %CacheError::Timeout(timeout), "cache write dropped"),
            }
        });
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    pub async fn wait_idle(&self) {
        let mut receiver = self.in_flight.subscribe();
        let _ = receiver.wait_for(|count| *count == 0).await;
    }
}

struct InFlight(Arc<watch::Sender<usize>>);

impl InFlight {
    fn acquire(counter: Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|count| *count += 1);
        Self(counter)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.send_modify(|count| *count = count.saturating_sub(1));
    }
}
