//! Supervised background tasks.
//!
//! Long-lived loops (the client read loop, the chain synchronizer) run as
//! spawned tasks. Their failure or panic is logged here, at the join
//! boundary, instead of vanishing with the task.

use std::fmt::Display;
use std::future::Future;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// How a supervised task ended other than successfully.
#[derive(Debug, Error)]
pub enum ServiceError<E> {
    /// The task returned an error.
    #[error("service failed: {0}")]
    Failed(E),
    /// The task panicked.
    #[error("service panicked: {0}")]
    Panicked(String),
    /// The task was aborted.
    #[error("service cancelled")]
    Cancelled,
}

/// Handle to a supervised task.
#[derive(Debug)]
pub struct ServiceHandle<T, E> {
    name: String,
    join: JoinHandle<Result<T, E>>,
}

impl<T, E: Display> ServiceHandle<T, E> {
    /// Service name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the task has ended.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Abort the task.
    pub fn abort(&self) {
        self.join.abort();
    }

    /// Wait for the task to end.
    pub async fn join(self) -> Result<T, ServiceError<E>> {
        match self.join.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ServiceError::Failed(e)),
            Err(join_error) if join_error.is_cancelled() => Err(ServiceError::Cancelled),
            Err(join_error) => {
                let reason = panic_reason(join_error.into_panic());
                error!(service = %self.name, reason = %reason, "Service panicked");
                Err(ServiceError::Panicked(reason))
            }
        }
    }
}

fn panic_reason(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Spawn `future` and log how it ends.
pub fn spawn_supervised<T, E, F>(name: impl Into<String>, future: F) -> ServiceHandle<T, E>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    let name = name.into();
    let service = name.clone();
    let join = tokio::spawn(async move {
        info!(service = %service, "Service started");
        let result = future.await;
        match &result {
            Ok(_) => info!(service = %service, "Service finished"),
            Err(e) => error!(service = %service, error = %e, "Service failed"),
        }
        result
    });
    ServiceHandle { name, join }
}
