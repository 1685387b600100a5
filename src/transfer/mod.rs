// src/transfer/mod.rs

//! Asynchronous remote transfer lifecycle
//!
//! A transfer moves through `Pending → InProgress` into exactly one of
//! `Succeeded`, `Failed`, or `Canceled`. The driver owns the poll loop:
//! sleep, check status, emit `update` on intermediate states, synthesize a
//! result and emit `finish` on the terminal one. Cancellation is
//! cooperative; a flagged transfer asks the service to cancel at the next
//! tick and still ends through the single `finish` path.

pub mod client;
mod deploy;
mod retrieve;

pub use client::{
    DeployDetails, DeployMessage, DeployOptions, DeployStatus, FileProperty, MetadataConnection,
    RequestStatus, RetrieveRequest, RetrieveStatus,
};
pub use deploy::{DeployResult, FileResponse, FileResponseState, MetadataApiDeploy};
pub use retrieve::{MetadataApiRetrieve, RetrieveResult};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Observer callbacks for one transfer
///
/// Implementations must be thread-safe; the driver may be polled from any
/// worker. Default implementations make every callback optional.
pub trait TransferListener<S, R>: Send + Sync {
    /// An intermediate status arrived
    fn on_update(&self, _status: &S) {}

    /// The transfer reached its terminal state; fired exactly once
    fn on_finish(&self, _result: &R) {}

    /// Cancellation was requested against the service
    fn on_cancel(&self) {}
}

/// One kind of remote transfer (deploy, retrieve)
#[async_trait]
pub trait TransferOperation: Send {
    type Status: Send + Sync;
    type Outcome: Send + Sync;

    /// Prepare and submit the operation; returns the remote id
    async fn pre(&mut self) -> Result<String>;

    /// Poll the remote status once
    async fn check_status(&mut self, id: &str) -> Result<Self::Status>;

    /// Lifecycle state carried by a status
    fn lifecycle(status: &Self::Status) -> RequestStatus;

    /// Force a status into the canceled terminal state
    fn mark_canceled(status: &mut Self::Status);

    /// Synthesize the final result from the terminal status
    async fn post(&mut self, status: Self::Status) -> Result<Self::Outcome>;

    /// Ask the service to cancel; true when cancellation already completed
    async fn request_cancel(&mut self, id: &str) -> Result<bool>;
}

/// Handle for requesting cooperative cancellation
#[derive(Debug, Clone)]
pub struct TransferCancel(Arc<AtomicBool>);

impl TransferCancel {
    /// Flag the transfer; honored at the next poll tick
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Poll-driven state machine around one `TransferOperation`
pub struct MetadataTransfer<O: TransferOperation> {
    operation: O,
    cancel_flag: Arc<AtomicBool>,
    listeners: Vec<Box<dyn TransferListener<O::Status, O::Outcome>>>,
}

impl<O: TransferOperation> MetadataTransfer<O> {
    pub fn new(operation: O) -> Self {
        Self {
            operation,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            listeners: Vec::new(),
        }
    }

    /// Handle that can cancel this transfer from elsewhere
    pub fn canceler(&self) -> TransferCancel {
        TransferCancel(Arc::clone(&self.cancel_flag))
    }

    pub fn with_listener(
        mut self,
        listener: Box<dyn TransferListener<O::Status, O::Outcome>>,
    ) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Run the transfer to its terminal state
    ///
    /// Emits `update` for every intermediate status and exactly one
    /// `finish`. A status-check failure wraps as a request failure and
    /// terminates the loop without a result.
    pub async fn start(mut self, poll_interval: Duration) -> Result<O::Outcome> {
        let id = self.operation.pre().await?;
        info!("transfer {id} started");
        let mut cancel_requested = false;

        loop {
            sleep(poll_interval).await;

            if self.cancel_flag.load(Ordering::SeqCst) && !cancel_requested {
                cancel_requested = true;
                info!("canceling transfer {id}");
                for listener in &self.listeners {
                    listener.on_cancel();
                }
                let done = self.operation.request_cancel(&id).await?;
                if done {
                    let mut status = self.checked(&id).await?;
                    O::mark_canceled(&mut status);
                    return self.finish(status).await;
                }
                // The service is still winding down; keep polling until it
                // reports the canceled terminal state.
                warn!("transfer {id} still canceling");
            }

            let status = self.checked(&id).await?;
            if O::lifecycle(&status).is_terminal() {
                return self.finish(status).await;
            }
            for listener in &self.listeners {
                listener.on_update(&status);
            }
        }
    }

    async fn checked(&mut self, id: &str) -> Result<O::Status> {
        self.operation.check_status(id).await.map_err(|e| match e {
            Error::Request(_) => e,
            other => Error::Request(other.to_string()),
        })
    }

    async fn finish(mut self, status: O::Status) -> Result<O::Outcome> {
        let state = O::lifecycle(&status);
        let outcome = self.operation.post(status).await?;
        info!("transfer finished: {state}");
        for listener in &self.listeners {
            listener.on_finish(&outcome);
        }
        Ok(outcome)
    }
}
