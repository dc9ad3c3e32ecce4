//! Bounded background queue for order notifications.
//!
//! Producers never wait: when the queue is full the job is dropped. A single
//! consumer loop spawns each job under a semaphore so at most `workers`
//! dispatches run at once.

use std::sync::Arc;

use common::OrderStatus;
use domain::OrderNotifier;
use store::{NotificationLog, Order, User};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;

use crate::dispatcher::Dispatcher;
use crate::notification::Notification;

/// Producer half of the dispatch queue.
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<Notification>,
}

/// Consumer half of the dispatch queue.
#[derive(Debug)]
pub struct DispatchReceiver {
    rx: mpsc::Receiver<Notification>,
}

impl DispatchQueue {
    /// Creates an unstarted queue holding at most `capacity` pending jobs.
    pub fn channel(capacity: usize) -> (Self, DispatchReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, DispatchReceiver { rx })
    }

    /// Creates a queue and starts its consumer on the current runtime.
    pub fn start<L>(
        dispatcher: Arc<Dispatcher<L>>,
        capacity: usize,
        workers: usize,
    ) -> (Self, JoinHandle<()>)
    where
        L: NotificationLog + 'static,
    {
        let (queue, receiver) = Self::channel(capacity);
        (queue, receiver.spawn(dispatcher, workers))
    }

    /// Hands a job to the consumer. Returns false if it was dropped.
    pub fn enqueue(&self, notification: Notification) -> bool {
        let kind = notification.kind();
        match self.tx.try_send(notification) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                metrics::counter!("notification_jobs_dropped_total").increment(1);
                tracing::warn!(%kind, "notification queue full, dropping job");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                metrics::counter!("notification_jobs_dropped_total").increment(1);
                tracing::warn!(%kind, "notification queue closed, dropping job");
                false
            }
        }
    }
}

impl OrderNotifier for DispatchQueue {
    fn order_placed(&self, order: Order, customer: User) {
        self.enqueue(Notification::OrderConfirmation {
            order,
            user: customer,
        });
    }

    fn status_changed(&self, order: Order, customer: User, status: OrderStatus) {
        self.enqueue(Notification::StatusUpdate {
            order,
            user: customer,
            status,
        });
    }
}

impl DispatchReceiver {
    /// Spawns the consumer loop.
    ///
    /// The loop ends once every producer is dropped, after waiting for
    /// in-flight jobs to finish.
    pub fn spawn<L>(self, dispatcher: Arc<Dispatcher<L>>, workers: usize) -> JoinHandle<()>
    where
        L: NotificationLog + 'static,
    {
        tokio::spawn(self.run(dispatcher, workers.max(1)))
    }

    async fn run<L>(mut self, dispatcher: Arc<Dispatcher<L>>, workers: usize)
    where
        L: NotificationLog + 'static,
    {
        let permits = Arc::new(Semaphore::new(workers));

        while let Some(notification) = self.rx.recv().await {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher.dispatch(&notification).await;
                drop(permit);
            });
        }

        // All producers are gone; wait for in-flight dispatches.
        let Ok(workers) = u32::try_from(workers) else {
            return;
        };
        if permits.acquire_many(workers).await.is_err() {
            tracing::warn!("notification worker pool closed during drain");
        }
        tracing::info!("notification queue drained");
    }
}
