//! HTTP multipart backend.
//!
//! Data-backed files go out as a multipart form with the payload chunked
//! through a counting stream, so progress events are emitted as the body
//! is consumed by the transport. JSON route parameters are spliced into
//! the form as text fields. Path-backed files are streamed as a raw
//! request body.

use std::future::Future;
use std::pin::Pin;

use airlift_core::{File, FileSource, HttpMethod, UploadError, UploadResult, UploadRoute};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::registry::TaskRegistry;
use crate::{RESULT_STREAM_CAPACITY, Uploader};

/// Chunk size for in-memory payload streaming (progress granularity).
const BODY_CHUNK_SIZE: usize = 64 * 1024;

/// Uploads files to a generic HTTP endpoint described by an
/// [`UploadRoute`].
pub struct HttpUploader {
    client: reqwest::Client,
    results: broadcast::Sender<UploadResult>,
    tasks: TaskRegistry,
}

impl Default for HttpUploader {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpUploader {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Creates an uploader reusing an existing client (shares its
    /// connection pool).
    pub fn with_client(client: reqwest::Client) -> Self {
        let (results, _) = broadcast::channel(RESULT_STREAM_CAPACITY);
        Self {
            client,
            results,
            tasks: TaskRegistry::default(),
        }
    }

    async fn start(&self, file: &File, route: &UploadRoute) {
        if let Err(err) = route.validate() {
            warn!(file = %file.id(), error = %err, "rejecting upload route");
            let _ = self
                .results
                .send(UploadResult::Failure(file.clone(), err));
            return;
        }
        let url = match reqwest::Url::parse(route.url.trim()) {
            Ok(url) => url,
            Err(err) => {
                warn!(file = %file.id(), error = %err, "rejecting upload route");
                let _ = self.results.send(UploadResult::Failure(
                    file.clone(),
                    UploadError::InvalidRoute(err.to_string()),
                ));
                return;
            }
        };

        let (task_id, cancel) = self.tasks.register();
        file.set_task_id(task_id);
        debug!(file = %file.id(), url = %url, task_id, "starting http upload");

        let client = self.client.clone();
        let results = self.results.clone();
        let tasks = self.tasks.clone();
        let file = file.clone();
        let route = route.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                res = perform(&client, &file, &route, url, &results) => Some(res),
            };
            match outcome {
                None => {
                    debug!(file = %file.id(), "http upload cancelled");
                    let _ = results.send(UploadResult::Cancelled(file.clone()));
                }
                Some(Ok(response)) => {
                    file.set_response(response);
                    debug!(file = %file.id(), "http upload complete");
                    let _ = results.send(UploadResult::Success(file.clone()));
                }
                Some(Err(err)) => {
                    warn!(file = %file.id(), error = %err, "http upload failed");
                    let _ = results.send(UploadResult::Failure(file.clone(), err));
                }
            }
            tasks.complete(task_id);
        });
    }
}

impl Uploader for HttpUploader {
    fn subscribe(&self) -> broadcast::Receiver<UploadResult> {
        self.results.subscribe()
    }

    /// Not applicable for this backend: without routing info there is no
    /// request to build, so `failure(RouteRequired)` is emitted.
    fn upload<'a>(&'a self, file: &'a File) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            warn!(file = %file.id(), "http backend invoked without routing info");
            let _ = self.results.send(UploadResult::Failure(
                file.clone(),
                UploadError::RouteRequired,
            ));
        })
    }

    fn upload_routed<'a>(
        &'a self,
        file: &'a File,
        route: &'a UploadRoute,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(self.start(file, route))
    }

    fn cancel<'a>(&'a self, file: &'a File) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if let Some(task_id) = file.task_id()
                && self.tasks.cancel(task_id)
            {
                debug!(file = %file.id(), task_id, "cancel requested");
            }
        })
    }
}

/// Runs the request and returns the response payload (parsed as JSON when
/// possible, kept as a JSON string otherwise).
async fn perform(
    client: &reqwest::Client,
    file: &File,
    route: &UploadRoute,
    url: reqwest::Url,
    results: &broadcast::Sender<UploadResult>,
) -> Result<serde_json::Value, UploadError> {
    let builder = client.request(request_method(route.method), url);
    let builder = match file.source() {
        FileSource::Data(data) => {
            let body = reqwest::Body::wrap_stream(progress_chunks(
                data.clone(),
                file.clone(),
                results.clone(),
            ));
            let part = reqwest::multipart::Part::stream_with_length(body, data.len() as u64)
                .file_name(file.name().to_string())
                .mime_str(file.media_type().mime())
                .map_err(|e| UploadError::Backend(e.to_string()))?;
            let mut form =
                reqwest::multipart::Form::new().part(file.upload_key().to_string(), part);
            if let Some(params) = route.json_params() {
                for (key, value) in params {
                    form = form.text(key.clone(), param_text(value));
                }
            }
            builder.multipart(form)
        }
        FileSource::Path(path) => {
            let handle = tokio::fs::File::open(path).await.map_err(UploadError::from)?;
            let total = handle.metadata().await.map_err(UploadError::from)?.len();
            let stream = count_progress(
                ReaderStream::with_capacity(handle, BODY_CHUNK_SIZE),
                total,
                file.clone(),
                results.clone(),
            );
            builder
                .header(reqwest::header::CONTENT_TYPE, file.media_type().mime())
                .body(reqwest::Body::wrap_stream(stream))
        }
    };

    let response = builder
        .send()
        .await
        .map_err(|e| UploadError::Backend(e.to_string()))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| UploadError::Backend(e.to_string()))?;
    if !status.is_success() {
        return Err(UploadError::Backend(format!("HTTP {status}")));
    }
    Ok(serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)))
}

fn request_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

/// Form-field rendering for JSON route parameters: strings go in bare,
/// everything else as its JSON text.
fn param_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Splits an in-memory payload into chunks, emitting a progress event as
/// each chunk is pulled by the transport.
fn progress_chunks(
    data: Bytes,
    file: File,
    results: broadcast::Sender<UploadResult>,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let total = data.len() as u64;
    let chunks: Vec<Bytes> = if data.is_empty() {
        vec![Bytes::new()]
    } else {
        (0..data.len())
            .step_by(BODY_CHUNK_SIZE)
            .map(|start| data.slice(start..usize::min(start + BODY_CHUNK_SIZE, data.len())))
            .collect()
    };
    let mut sent = 0u64;
    futures_util::stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        let fraction = if total == 0 {
            1.0
        } else {
            sent as f64 / total as f64
        };
        let _ = results.send(UploadResult::Progress(file.clone(), fraction));
        Ok(chunk)
    })
}

/// Wraps a byte stream, emitting a progress event per chunk read.
fn count_progress<S>(
    stream: S,
    total: u64,
    file: File,
    results: broadcast::Sender<UploadResult>,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
{
    let mut sent = 0u64;
    stream.map(move |item| {
        if let Ok(chunk) = &item
            && total > 0
        {
            sent += chunk.len() as u64;
            let fraction = (sent as f64 / total as f64).min(1.0);
            let _ = results.send(UploadResult::Progress(file.clone(), fraction));
        }
        item
    })
}
