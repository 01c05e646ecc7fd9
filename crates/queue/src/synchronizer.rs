//! Per-file upload coordination.

use std::sync::Arc;

use airlift_connectivity::ConnectivityWatch;
use airlift_core::{File, UploadError, UploadResult};
use airlift_uploader::Uploader;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::signal::QueueSignal;

/// Coordinates one file's upload: starts the backend transfer, filters
/// the backend's shared stream down to this file, and force-cancels when
/// connectivity is lost.
///
/// Single-use: `run` consumes the synchronizer and emits exactly one
/// `Completed` signal. A synthesized `NoConnectivity` failure takes
/// priority over anything the backend reports afterwards; once the
/// synchronizer has completed, remaining backend events for its file are
/// discarded.
pub(crate) struct UploadSynchronizer {
    uploader: Arc<dyn Uploader>,
    file: File,
    connectivity: ConnectivityWatch,
    signals: mpsc::Sender<QueueSignal>,
}

impl UploadSynchronizer {
    pub fn new(
        uploader: Arc<dyn Uploader>,
        file: File,
        connectivity: ConnectivityWatch,
        signals: mpsc::Sender<QueueSignal>,
    ) -> Self {
        Self {
            uploader,
            file,
            connectivity,
            signals,
        }
    }

    pub async fn run(self, cancel: &CancellationToken) {
        // Subscribe to transitions before the reachability check so a
        // disconnect landing in between still wakes the loop.
        let mut transitions = self.connectivity.subscribe();
        if !self.connectivity.is_connected() {
            self.abort_offline().await;
            return;
        }

        // Subscribe before invoking the backend so no event can slip in
        // between the upload call and the subscription.
        let mut results = self.uploader.subscribe();

        match self.file.route() {
            Some(route) => self.uploader.upload_routed(&self.file, route).await,
            None => self.uploader.upload(&self.file).await,
        }

        let mut watch_alive = true;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.uploader.cancel(&self.file).await;
                    debug!(file = %self.file.id(), "upload cancelled by queue");
                    self.complete(UploadResult::Cancelled(self.file.clone())).await;
                    return;
                }
                changed = transitions.changed(), if watch_alive => {
                    match changed {
                        Ok(()) => {
                            if !self.connectivity.is_connected() {
                                self.abort_offline().await;
                                return;
                            }
                        }
                        // Monitor gone; keep the last known state.
                        Err(_) => watch_alive = false,
                    }
                }
                event = results.recv() => match event {
                    Ok(result) if result.file() == &self.file => {
                        if result.is_terminal() {
                            self.complete(result).await;
                            return;
                        }
                        let _ = self.signals.send(QueueSignal::Pending(result)).await;
                    }
                    // Event for another file on the shared stream.
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(file = %self.file.id(), skipped, "result stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        // The backend went away without a terminal event;
                        // synthesize one so the file still completes.
                        self.complete(UploadResult::Failure(
                            self.file.clone(),
                            UploadError::Backend("result stream closed".into()),
                        ))
                        .await;
                        return;
                    }
                },
            }
        }
    }

    /// Terminal path for an operation cancelled while still queued: the
    /// transfer never starts, the backend gets a best-effort cancel, and
    /// the terminal result is synthesized locally.
    pub async fn abort_queued(self) {
        self.uploader.cancel(&self.file).await;
        debug!(file = %self.file.id(), "queued upload cancelled");
        self.complete(UploadResult::Cancelled(self.file.clone())).await;
    }

    /// Best-effort backend cancel, then a locally synthesized terminal
    /// failure. Never waits for backend acknowledgment, so the
    /// cancellation signal has bounded latency.
    async fn abort_offline(&self) {
        self.uploader.cancel(&self.file).await;
        debug!(file = %self.file.id(), "upload aborted: no connectivity");
        self.complete(UploadResult::Failure(
            self.file.clone(),
            UploadError::NoConnectivity,
        ))
        .await;
    }

    async fn complete(&self, result: UploadResult) {
        let _ = self.signals.send(QueueSignal::Completed(result)).await;
    }
}
