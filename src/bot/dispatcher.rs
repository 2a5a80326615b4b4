//! Per-user dispatch: one worker task per user, fed in arrival order.
//!
//! A worker exits once its queue has been idle for [`WORKER_IDLE_TIMEOUT`]
//! and is pruned on the next dispatch, so one-off users do not pin a task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::service::BotService;
use crate::channels::IncomingMessage;
use crate::store::UserId;

/// How long a worker waits for its next message before exiting.
pub const WORKER_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

struct Worker {
    generation: u64,
    tx: mpsc::UnboundedSender<IncomingMessage>,
    handle: JoinHandle<()>,
}

/// Routes inbound messages to per-user workers. Different users run
/// concurrently; one user's messages are handled strictly in order.
pub struct Dispatcher {
    service: Arc<BotService>,
    workers: HashMap<UserId, Worker>,
    next_generation: u64,
    exited_tx: mpsc::UnboundedSender<(UserId, u64)>,
    exited_rx: mpsc::UnboundedReceiver<(UserId, u64)>,
}

impl Dispatcher {
    pub fn new(service: Arc<BotService>) -> Self {
        let (exited_tx, exited_rx) = mpsc::unbounded_channel();
        Self {
            service,
            workers: HashMap::new(),
            next_generation: 0,
            exited_tx,
            exited_rx,
        }
    }

    /// Queue a message on its user's worker, starting one if needed.
    pub fn dispatch(&mut self, message: IncomingMessage) {
        self.prune();
        let user_id = message.user_id;

        let (message, previous) = match self.workers.remove(&user_id) {
            Some(worker) => match worker.tx.send(message) {
                Ok(()) => {
                    self.workers.insert(user_id, worker);
                    return;
                }
                // Worker went idle (or panicked); replace it below.
                Err(mpsc::error::SendError(message)) => {
                    tracing::debug!(user_id, "User worker gone, restarting");
                    (message, Some(worker.handle))
                }
            },
            None => (message, None),
        };

        let worker = self.spawn_worker(user_id, previous);
        if worker.tx.send(message).is_err() {
            tracing::error!(user_id, "Freshly spawned user worker rejected a message");
        }
        self.workers.insert(user_id, worker);
    }

    /// Forget workers that have exited. Returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let mut removed = 0;
        while let Ok((user_id, generation)) = self.exited_rx.try_recv() {
            let current = self
                .workers
                .get(&user_id)
                .is_some_and(|w| w.generation == generation);
            if current {
                self.workers.remove(&user_id);
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::trace!(removed, "Pruned idle user workers");
        }
        removed
    }

    /// Number of users with a worker.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Close every queue and wait for queued messages to drain.
    pub async fn close(self) {
        let count = self.workers.len();
        for (user_id, worker) in self.workers {
            drop(worker.tx);
            if let Err(e) = worker.handle.await {
                tracing::warn!(user_id, "User worker ended abnormally: {e}");
            }
        }
        tracing::debug!(count, "Dispatcher closed");
    }

    /// A replacement worker waits for its predecessor to finish draining,
    /// so messages queued before an idle exit still run first.
    fn spawn_worker(&mut self, user_id: UserId, previous: Option<JoinHandle<()>>) -> Worker {
        let generation = self.next_generation;
        self.next_generation += 1;

        let (tx, mut rx) = mpsc::unbounded_channel::<IncomingMessage>();
        let service = Arc::clone(&self.service);
        let exited = self.exited_tx.clone();
        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            loop {
                match tokio::time::timeout(WORKER_IDLE_TIMEOUT, rx.recv()).await {
                    Ok(Some(message)) => service.handle_message(&message).await,
                    Ok(None) => break,
                    Err(_) => {
                        // Refuse new sends, then finish whatever slipped in.
                        rx.close();
                        while let Some(message) = rx.recv().await {
                            service.handle_message(&message).await;
                        }
                        break;
                    }
                }
            }
            let _ = exited.send((user_id, generation));
            tracing::trace!(user_id, "User worker finished");
        });
        Worker {
            generation,
            tx,
            handle,
        }
    }
}
