//! Handle to a running synchronizer task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use stratum_protocol::{ServiceError, ServiceHandle, StratumMessage, SubscriptionStream};
use tokio::sync::watch;

use crate::domain::ChainError;

/// Returned by [`StratumChain::start`](super::StratumChain::start).
pub struct ChainHandle<S> {
    peer_height: Arc<AtomicU64>,
    stream: SubscriptionStream,
    /// Flips to true when the loop exits; the sender drops on panic.
    finished: watch::Receiver<bool>,
    service: ServiceHandle<S, ChainError>,
}

impl<S> ChainHandle<S> {
    pub(crate) fn new(
        peer_height: Arc<AtomicU64>,
        stream: SubscriptionStream,
        finished: watch::Receiver<bool>,
        service: ServiceHandle<S, ChainError>,
    ) -> Self {
        Self {
            peer_height,
            stream,
            finished,
            service,
        }
    }

    /// Last height the server reported.
    pub fn peer_height(&self) -> u64 {
        self.peer_height.load(Ordering::SeqCst)
    }

    /// True once the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.service.is_finished()
    }

    /// Resolve once the loop has exited, for any reason. Unlike [`join`],
    /// this borrows the handle, so it can sit in a `select!` next to other
    /// shutdown triggers.
    ///
    /// [`join`]: Self::join
    pub async fn finished(&self) {
        let mut finished = self.finished.clone();
        let _ = finished.wait_for(|done| *done).await;
    }

    /// Wait for the loop to exit on its own; returns the closed store.
    pub async fn join(self) -> Result<S, ServiceError<ChainError>> {
        self.service.join().await
    }

    /// Stop the loop by queueing a `Sentinel` behind pending notifications,
    /// then wait for it; returns the closed store.
    pub async fn close(self) -> Result<S, ServiceError<ChainError>> {
        let stream = self.stream;
        let join = self.service.join();
        tokio::pin!(join);
        tokio::select! {
            biased;
            outcome = &mut join => return outcome,
            _ = stream.push(StratumMessage::Sentinel) => {}
        }
        join.await
    }
}
