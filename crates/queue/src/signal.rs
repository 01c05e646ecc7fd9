//! Queue control and lifecycle signals.

use airlift_core::UploadResult;

/// Signal emitted on an operation's state stream.
///
/// `Pending` carries intermediate (progress) results and `Completed` the
/// terminal one. An operation emits exactly one `Completed`, preceded by
/// zero or more `Pending`. The queue-control variants affect the whole
/// queue, not just the emitting operation.
#[derive(Debug, Clone)]
pub enum QueueSignal {
    /// Resume starting queued operations.
    ResumeQueue,
    /// Stop starting queued operations; running ones are unaffected.
    SuspendQueue,
    /// Cancel every queued and running operation.
    Terminate,
    /// Intermediate result for the operation's file.
    Pending(UploadResult),
    /// Terminal result for the operation's file.
    Completed(UploadResult),
}
