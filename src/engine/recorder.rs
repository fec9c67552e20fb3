use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::metrics::RequestSample;

/// Default number of request samples that may queue up between two
/// drains by the engine task.
pub const DEFAULT_QUEUE_CAPACITY: usize = 8192;

/// Append-only handle the request listener uses to report completed
/// requests. Cheap to clone; never blocks.
#[derive(Debug, Clone)]
pub struct RequestRecorder {
    tx: mpsc::Sender<RequestSample>,
    dropped: Arc<AtomicU64>,
}

/// Engine side of the request queue.
#[derive(Debug)]
pub(crate) struct RequestQueue {
    rx: mpsc::Receiver<RequestSample>,
    dropped: Arc<AtomicU64>,
    capacity: usize,
}

pub(crate) fn channel(capacity: usize) -> (RequestRecorder, RequestQueue) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    (
        RequestRecorder {
            tx,
            dropped: dropped.clone(),
        },
        RequestQueue {
            rx,
            dropped,
            capacity,
        },
    )
}

impl RequestRecorder {
    /// Queue one completed request for the current period. When the queue
    /// is full the sample is counted as dropped; once the engine has
    /// stopped it is discarded.
    pub fn record(&self, sample: RequestSample) {
        match self.tx.try_send(sample) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// `true` once the engine that handed out this recorder has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl RequestQueue {
    pub(crate) async fn recv(&mut self) -> Option<RequestSample> {
        self.rx.recv().await
    }

    /// Samples already waiting in the queue, at most one queue's worth.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = RequestSample> + '_ {
        let rx = &mut self.rx;
        (0..self.capacity).map_while(move |_| rx.try_recv().ok())
    }

    /// Samples dropped since the previous call.
    pub(crate) fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}
