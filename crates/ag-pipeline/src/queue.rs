//! Bounded ingestion queue between the watchers and the detection worker.
//!
//! Producers block while the queue is full; nothing is ever dropped on the
//! way in. The termination sentinel travels out of band: once
//! [`QueueSender::send_shutdown`] is called, the next [`QueueReceiver::next`]
//! returns [`QueueItem::Shutdown`] even if files are still buffered, and
//! those files are then discarded.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ag_watcher::{FileSink, ReadyFile, WatchError};

use crate::error::QueueError;

/// One item taken off the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    /// A file to run through detection.
    File(ReadyFile),
    /// The termination sentinel.
    Shutdown,
}

/// Creates a queue holding at most `capacity` files.
///
/// A capacity of zero is raised to one.
#[must_use]
pub fn bounded(capacity: usize) -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let stop = CancellationToken::new();
    (
        QueueSender {
            tx,
            stop: stop.clone(),
        },
        QueueReceiver { rx, stop },
    )
}

/// Producer half. Cheap to clone; one clone per watcher.
#[derive(Debug, Clone)]
pub struct QueueSender {
    tx: mpsc::Sender<ReadyFile>,
    stop: CancellationToken,
}

impl QueueSender {
    /// Enqueues from a blocking thread, waiting while the queue is full.
    ///
    /// Must not be called from an async context.
    pub fn enqueue_blocking(&self, file: ReadyFile) -> Result<(), QueueError> {
        self.tx
            .blocking_send(file)
            .map_err(|mpsc::error::SendError(file)| QueueError::Closed(file))
    }

    /// Enqueues, waiting while the queue is full.
    pub async fn enqueue(&self, file: ReadyFile) -> Result<(), QueueError> {
        self.tx
            .send(file)
            .await
            .map_err(|mpsc::error::SendError(file)| QueueError::Closed(file))
    }

    /// Enqueues without waiting.
    pub fn try_enqueue(&self, file: ReadyFile) -> Result<(), QueueError> {
        self.tx.try_send(file).map_err(|err| match err {
            mpsc::error::TrySendError::Full(file) => QueueError::Full(file),
            mpsc::error::TrySendError::Closed(file) => QueueError::Closed(file),
        })
    }

    /// Posts the termination sentinel. Never blocks.
    pub fn send_shutdown(&self) {
        self.stop.cancel();
    }

    /// Number of files currently buffered.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Maximum number of buffered files.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

impl FileSink for QueueSender {
    fn deliver(&self, file: ReadyFile) -> Result<(), WatchError> {
        self.enqueue_blocking(file)
            .map_err(|_| WatchError::ChannelClosed)
    }
}

/// Consumer half, owned by the detection worker.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::Receiver<ReadyFile>,
    stop: CancellationToken,
}

impl QueueReceiver {
    /// Waits for the next item.
    ///
    /// The sentinel takes priority over buffered files. Returns `None` once
    /// every sender is gone and the buffer is empty.
    pub async fn next(&mut self) -> Option<QueueItem> {
        tokio::select! {
            biased;

            () = self.stop.cancelled() => Some(QueueItem::Shutdown),
            file = self.rx.recv() => file.map(QueueItem::File),
        }
    }

    /// Closes the queue and drops everything still buffered.
    ///
    /// Producers blocked on a full queue are released with
    /// [`QueueError::Closed`]. Returns the number of discarded files.
    pub fn discard_pending(&mut self) -> usize {
        self.rx.close();
        let mut discarded = 0;
        while let Ok(file) = self.rx.try_recv() {
            tracing::debug!(path = %file.path, "Discarding queued file");
            discarded += 1;
        }
        discarded
    }
}
