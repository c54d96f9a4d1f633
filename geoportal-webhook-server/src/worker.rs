//! Background work queue between the receiver endpoint and the dispatcher.
//!
//! The handler enqueues and returns immediately. A single worker drains the
//! queue in order, so batches are processed one at a time.

use geoportal_webhook_core::dispatch::EventDispatcher;
use geoportal_webhook_core::webhook::ReceiverPayload;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::Sender<ReceiverPayload>,
}

impl WorkQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ReceiverPayload>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Hand a payload to the worker, waiting for capacity if the queue is full.
    /// Returns false (and logs) if the worker has stopped.
    pub async fn enqueue(&self, payload: ReceiverPayload) -> bool {
        match self.tx.send(payload).await {
            Ok(()) => true,
            Err(_) => {
                tracing::error!("background worker has stopped, dropping webhook payload");
                false
            }
        }
    }
}

/// Drain the queue until every sender is dropped.
pub async fn run_worker(mut rx: mpsc::Receiver<ReceiverPayload>, dispatcher: Arc<EventDispatcher>) {
    tracing::info!("webhook worker started");
    while let Some(payload) = rx.recv().await {
        let report = dispatcher.handle_payload(&payload).await;
        tracing::debug!(?report, "payload handled");
    }
    tracing::info!("webhook worker stopped");
}

pub fn spawn_worker(
    rx: mpsc::Receiver<ReceiverPayload>,
    dispatcher: Arc<EventDispatcher>,
) -> JoinHandle<()> {
    tokio::spawn(run_worker(rx, dispatcher))
}
