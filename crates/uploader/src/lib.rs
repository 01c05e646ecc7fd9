//! Upload backends and the capability trait they share.
//!
//! Each backend owns **one** broadcast stream of [`UploadResult`] events
//! multiplexing every file in flight through that instance. Consumers
//! subscribe to the shared stream and filter by file identity; nothing
//! here hands out per-file channels.

mod bucket;
mod http;
mod registry;

pub use bucket::{BucketConfig, S3Uploader};
pub use http::HttpUploader;

use std::future::Future;
use std::pin::Pin;

use airlift_core::{File, UploadResult, UploadRoute};
use tokio::sync::broadcast;

/// Capacity of a backend's shared result stream.
pub(crate) const RESULT_STREAM_CAPACITY: usize = 256;

/// A transfer backend.
///
/// Exactly one upload entry point is applicable per backend, and the
/// not-applicable one is loud rather than a silent no-op:
/// [`HttpUploader::upload`] cannot build a request without routing info
/// and emits `failure(RouteRequired)`, while [`S3Uploader::upload_routed`]
/// logs a warning and ignores the route.
///
/// Entry points initiate the transfer and return; outcomes arrive on the
/// shared stream. For each accepted file the backend assigns a task id,
/// emits zero or more progress events with a non-decreasing fraction in
/// `[0, 1]`, and eventually emits exactly one terminal result. Success
/// events are published only after the file's URL/response fields have
/// been recorded, so subscribers observe a consistent file.
pub trait Uploader: Send + Sync {
    /// Joins the backend's shared result stream.
    fn subscribe(&self) -> broadcast::Receiver<UploadResult>;

    /// Starts an unrouted transfer.
    fn upload<'a>(&'a self, file: &'a File) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

    /// Starts a routed transfer.
    fn upload_routed<'a>(
        &'a self,
        file: &'a File,
        route: &'a UploadRoute,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

    /// Requests cancellation of an in-flight transfer for `file`.
    ///
    /// Best-effort: an unknown or already-finished file is a no-op, never
    /// an error.
    fn cancel<'a>(&'a self, file: &'a File) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}
