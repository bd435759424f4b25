//! Background handoff queue
//!
//! Webhook receivers acknowledge fast and push the envelope here; a fixed
//! pool of workers drains the queue and runs the pipeline. The queue is
//! bounded: when it is full the update is dropped with an error log rather
//! than blocking the acknowledgment. Once accepted, a task runs to
//! completion or failure - there is no cancellation.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;

use crate::chat::pipeline::ChatPipeline;
use crate::chat::types::ChatEvent;

#[derive(Clone)]
pub struct ChatQueue {
    tx: mpsc::Sender<ChatEvent>,
}

impl ChatQueue {
    /// Spawn `workers` tasks draining a queue of `capacity` events.
    pub fn start(pipeline: Arc<ChatPipeline>, workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..workers.max(1) {
            let pipeline = pipeline.clone();
            let rx = rx.clone();
            tokio::spawn(async move {
                loop {
                    let event = { rx.lock().await.recv().await };
                    match event {
                        Some(event) => pipeline.process(event).await,
                        None => {
                            tracing::debug!(worker_id = worker_id, "Chat queue closed");
                            break;
                        }
                    }
                }
            });
        }

        tracing::info!(workers = workers.max(1), capacity = capacity, "Chat workers started");
        Self { tx }
    }

    /// Enqueue an accepted envelope. Never blocks; returns whether the
    /// event was accepted.
    pub fn enqueue(&self, event: ChatEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::error!("Chat queue full - dropping update");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::error!("Chat queue closed - dropping update");
                false
            }
        }
    }
}
