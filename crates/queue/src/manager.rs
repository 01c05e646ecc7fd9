//! Concurrent upload queue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use airlift_connectivity::ConnectivityWatch;
use airlift_core::{File, UploadResult};
use airlift_uploader::Uploader;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::signal::QueueSignal;
use crate::synchronizer::UploadSynchronizer;

/// Default number of uploads allowed in flight at once.
const DEFAULT_CONCURRENCY: usize = 4;

/// Capacity of the outward event stream and per-operation signal streams.
const CHANNEL_CAPACITY: usize = 64;

/// A registered queue operation.
struct OperationHandle {
    file: File,
    cancel: CancellationToken,
}

/// Owns the concurrent execution of upload operations and aggregates
/// their outcomes into one outward stream of [`UploadResult`].
///
/// `upload_file` returns as soon as the operation is enqueued; every
/// submitted file eventually yields exactly one terminal result on the
/// outward stream. Events for different files may interleave arbitrarily;
/// per file, progress precedes the terminal result in emission order.
pub struct UploadManager {
    uploader: Arc<dyn Uploader>,
    connectivity: ConnectivityWatch,
    limiter: Arc<Semaphore>,
    suspended: watch::Sender<bool>,
    operations: Arc<Mutex<HashMap<Uuid, OperationHandle>>>,
    events_tx: mpsc::Sender<UploadResult>,
    events_rx: tokio::sync::Mutex<Option<mpsc::Receiver<UploadResult>>>,
}

impl UploadManager {
    /// Creates a manager with the default concurrency limit.
    pub fn new(uploader: Arc<dyn Uploader>, connectivity: ConnectivityWatch) -> Self {
        Self::with_concurrency(uploader, connectivity, DEFAULT_CONCURRENCY)
    }

    /// Creates a manager allowing at most `limit` uploads in flight.
    pub fn with_concurrency(
        uploader: Arc<dyn Uploader>,
        connectivity: ConnectivityWatch,
        limit: usize,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (suspended, _) = watch::channel(false);
        Self {
            uploader,
            connectivity,
            limiter: Arc::new(Semaphore::new(limit.max(1))),
            suspended,
            operations: Arc::new(Mutex::new(HashMap::new())),
            events_tx,
            events_rx: tokio::sync::Mutex::new(Some(events_rx)),
        }
    }

    /// Takes the outward event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<UploadResult>> {
        self.events_rx.lock().await.take()
    }

    /// Number of operations currently queued or running.
    pub fn in_flight(&self) -> usize {
        self.operations.lock().unwrap().len()
    }

    /// Enqueues a file for upload and returns the operation id.
    ///
    /// Returns immediately; outcomes arrive on the outward stream.
    pub fn upload_file(&self, file: File) -> Uuid {
        let operation_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        self.operations.lock().unwrap().insert(
            operation_id,
            OperationHandle {
                file: file.clone(),
                cancel: cancel.clone(),
            },
        );

        let (signals_tx, signals_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let synchronizer = UploadSynchronizer::new(
            self.uploader.clone(),
            file.clone(),
            self.connectivity.clone(),
            signals_tx,
        );
        debug!(operation = %operation_id, file = %file.id(), "upload queued");

        self.spawn_signal_forwarder(signals_rx);

        let limiter = self.limiter.clone();
        let mut gate = self.suspended.subscribe();
        let operations = self.operations.clone();
        tokio::spawn(async move {
            let permit = tokio::select! {
                biased;
                permit = async {
                    // Queued operations wait for a free slot, then for the
                    // queue to be resumed; running ones are unaffected by
                    // suspension.
                    let permit = limiter.acquire_owned().await;
                    while *gate.borrow() {
                        if gate.changed().await.is_err() {
                            break;
                        }
                    }
                    permit
                } => permit.ok(),
                _ = cancel.cancelled() => None,
            };
            match permit {
                Some(_permit) => synchronizer.run(&cancel).await,
                None => synchronizer.abort_queued().await,
            }
            operations.lock().unwrap().remove(&operation_id);
            debug!(operation = %operation_id, "operation retired");
        });

        operation_id
    }

    /// Forwards one operation's state stream: lifecycle results go out on
    /// the merged stream, queue-control signals act on the whole queue.
    fn spawn_signal_forwarder(&self, mut signals_rx: mpsc::Receiver<QueueSignal>) {
        let events_tx = self.events_tx.clone();
        let suspended = self.suspended.clone();
        let operations = self.operations.clone();
        tokio::spawn(async move {
            while let Some(signal) = signals_rx.recv().await {
                match signal {
                    QueueSignal::ResumeQueue => {
                        suspended.send_replace(false);
                    }
                    QueueSignal::SuspendQueue => {
                        suspended.send_replace(true);
                    }
                    QueueSignal::Terminate => cancel_all(&operations),
                    QueueSignal::Pending(result) => {
                        debug_assert!(
                            !result.is_terminal(),
                            "pending signal carried a terminal result"
                        );
                        let _ = events_tx.send(result).await;
                    }
                    QueueSignal::Completed(result) => {
                        debug_assert!(
                            result.is_terminal(),
                            "completed signal carried a progress result"
                        );
                        let _ = events_tx.send(result).await;
                    }
                }
            }
        });
    }

    /// Stops starting queued operations; running ones are unaffected.
    pub fn suspend(&self) {
        self.suspended.send_replace(true);
    }

    /// Resumes starting queued operations.
    pub fn resume(&self) {
        self.suspended.send_replace(false);
    }

    /// Cancels every queued and running operation.
    pub fn terminate(&self) {
        info!("terminating upload queue");
        cancel_all(&self.operations);
    }

    /// Cancels the operation uploading `file`, matched by identity.
    ///
    /// Returns whether an operation was found. No-op for files that were
    /// never submitted or have already completed.
    pub fn cancel_uploading(&self, file: &File) -> bool {
        let operations = self.operations.lock().unwrap();
        match operations.values().find(|op| op.file == *file) {
            Some(op) => {
                debug!(file = %file.id(), "cancelling upload");
                op.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

fn cancel_all(operations: &Mutex<HashMap<Uuid, OperationHandle>>) {
    let operations = operations.lock().unwrap();
    for op in operations.values() {
        op.cancel.cancel();
    }
}
