//! Object-storage backend.
//!
//! Uploads land at the file's destination key inside a configured bucket.
//! Payloads above one part size go through a multi-part transfer so a
//! progress event can be emitted per part; smaller ones are a single put.
//! On success the object URL is recorded on the file before the success
//! event is published.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use airlift_core::{File, FileSource, UploadError, UploadResult, UploadRoute};
use aws_config::BehaviorVersion;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::registry::TaskRegistry;
use crate::{RESULT_STREAM_CAPACITY, Uploader};

/// Part size for multi-part transfers, also the single-put threshold.
/// Object stores reject multi-part parts below 5 MiB.
const PART_SIZE: usize = 5 * 1024 * 1024;

/// Bucket backend configuration.
///
/// Validated eagerly: [`S3Uploader::connect`] panics if the region is
/// unset or the pool id/bucket name are empty. Credential issuance is out
/// of scope here; the SDK's default provider chain supplies credentials
/// for the configured pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Region of the storage endpoint.
    #[serde(default)]
    pub region: Option<String>,
    /// Identity pool the embedder's credential setup hangs off.
    #[serde(default)]
    pub credential_pool_id: String,
    /// Destination bucket.
    pub bucket: String,
    /// Custom endpoint for S3-compatible providers. Forces path-style
    /// addressing and path-style object URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
}

impl BucketConfig {
    /// Block-style constructor.
    ///
    /// ```
    /// use airlift_uploader::BucketConfig;
    ///
    /// let config = BucketConfig::build(|c| {
    ///     c.region = Some("eu-west-1".into());
    ///     c.credential_pool_id = "pool-1".into();
    ///     c.bucket = "attachments".into();
    /// });
    /// assert_eq!(config.bucket, "attachments");
    /// ```
    pub fn build(configure: impl FnOnce(&mut BucketConfig)) -> Self {
        let mut config = BucketConfig::default();
        configure(&mut config);
        config
    }
}

/// Uploads files to an S3-compatible bucket.
pub struct S3Uploader {
    client: Client,
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
    results: broadcast::Sender<UploadResult>,
    tasks: TaskRegistry,
}

impl S3Uploader {
    /// Builds the client and connects the uploader.
    ///
    /// Panics if the configuration is incomplete (missing region, empty
    /// pool id or bucket name).
    pub async fn connect(config: BucketConfig) -> Self {
        let region = config
            .region
            .clone()
            .expect("the storage region is required");
        assert!(
            !config.credential_pool_id.is_empty(),
            "the credential pool id is required"
        );
        assert!(!config.bucket.is_empty(), "the bucket name is required");

        let region_provider =
            RegionProviderChain::first_try(aws_config::Region::new(region.clone()));
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let client = if let Some(endpoint) = &config.endpoint_url {
            let s3_config = aws_sdk_s3::config::Builder::from(&shared)
                .endpoint_url(endpoint)
                .force_path_style(true)
                .build();
            Client::from_conf(s3_config)
        } else {
            Client::new(&shared)
        };

        let (results, _) = broadcast::channel(RESULT_STREAM_CAPACITY);
        Self {
            client,
            bucket: config.bucket,
            region,
            endpoint_url: config.endpoint_url,
            results,
            tasks: TaskRegistry::default(),
        }
    }

    /// Final URL of an uploaded object.
    fn object_url(&self, key: &str) -> String {
        object_url(self.endpoint_url.as_deref(), &self.bucket, &self.region, key)
    }

    async fn start(&self, file: &File) {
        let (task_id, cancel) = self.tasks.register();
        file.set_task_id(task_id);
        let key = file.key();
        debug!(file = %file.id(), key = %key, task_id, "starting bucket upload");

        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let url = self.object_url(&key);
        let results = self.results.clone();
        let tasks = self.tasks.clone();
        let file = file.clone();

        tokio::spawn(async move {
            // Multi-part upload id in flight, for abort on cancellation.
            let pending = Mutex::new(None::<String>);
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                res = transfer(&client, &bucket, &key, &file, &results, &pending) => Some(res),
            };
            match outcome {
                None => {
                    let pending_upload = pending.lock().unwrap().take();
                    if let Some(upload_id) = pending_upload {
                        abort_multipart(&client, &bucket, &key, &upload_id).await;
                    }
                    debug!(file = %file.id(), key = %key, "bucket upload cancelled");
                    let _ = results.send(UploadResult::Cancelled(file.clone()));
                }
                Some(Ok(())) => {
                    file.set_uploaded_url(url.clone());
                    info!(file = %file.id(), key = %key, url = %url, "bucket upload complete");
                    let _ = results.send(UploadResult::Success(file.clone()));
                }
                Some(Err(err)) => {
                    warn!(file = %file.id(), key = %key, error = %err, "bucket upload failed");
                    let _ = results.send(UploadResult::Failure(file.clone(), err));
                }
            }
            tasks.complete(task_id);
        });
    }
}

impl Uploader for S3Uploader {
    fn subscribe(&self) -> broadcast::Receiver<UploadResult> {
        self.results.subscribe()
    }

    fn upload<'a>(&'a self, file: &'a File) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(self.start(file))
    }

    /// Routing info is not applicable to bucket uploads; the route is
    /// ignored with a warning and the transfer proceeds unrouted.
    fn upload_routed<'a>(
        &'a self,
        file: &'a File,
        _route: &'a UploadRoute,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            warn!(file = %file.id(), "bucket backend ignores routing info");
            self.start(file).await;
        })
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

fn object_url(endpoint_url: Option<&str>, bucket: &str, region: &str, key: &str) -> String {
    match endpoint_url {
        // Path-style for S3-compatible providers.
        Some(endpoint) => format!("{}/{bucket}/{key}", endpoint.trim_end_matches('/')),
        None => format!("https://{bucket}.s3.{region}.amazonaws.com/{key}"),
    }
}

/// Payload source yielding parts of at most [`PART_SIZE`] bytes.
enum PartSource {
    Memory { data: Bytes, offset: usize },
    Disk(tokio::fs::File),
}

impl PartSource {
    async fn next_part(&mut self) -> Result<Option<Bytes>, UploadError> {
        match self {
            PartSource::Memory { data, offset } => {
                if *offset >= data.len() {
                    return Ok(None);
                }
                let end = usize::min(*offset + PART_SIZE, data.len());
                let chunk = data.slice(*offset..end);
                *offset = end;
                Ok(Some(chunk))
            }
            PartSource::Disk(handle) => {
                let mut buf = vec![0u8; PART_SIZE];
                let mut filled = 0;
                while filled < buf.len() {
                    let n = handle
                        .read(&mut buf[filled..])
                        .await
                        .map_err(UploadError::from)?;
                    if n == 0 {
                        break;
                    }
                    filled += n;
                }
                if filled == 0 {
                    return Ok(None);
                }
                buf.truncate(filled);
                Ok(Some(Bytes::from(buf)))
            }
        }
    }
}

async fn transfer(
    client: &Client,
    bucket: &str,
    key: &str,
    file: &File,
    results: &broadcast::Sender<UploadResult>,
    pending: &Mutex<Option<String>>,
) -> Result<(), UploadError> {
    match file.source() {
        FileSource::Data(data) => {
            if data.len() <= PART_SIZE {
                put_single(client, bucket, key, file, ByteStream::from(data.clone())).await
            } else {
                let total = data.len() as u64;
                let source = PartSource::Memory {
                    data: data.clone(),
                    offset: 0,
                };
                multi_part(client, bucket, key, file, source, total, results, pending).await
            }
        }
        FileSource::Path(path) => {
            let total = tokio::fs::metadata(path).await.map_err(UploadError::from)?.len();
            if total as usize <= PART_SIZE {
                let data = tokio::fs::read(path).await.map_err(UploadError::from)?;
                put_single(client, bucket, key, file, ByteStream::from(data)).await
            } else {
                let handle = tokio::fs::File::open(path).await.map_err(UploadError::from)?;
                let source = PartSource::Disk(handle);
                multi_part(client, bucket, key, file, source, total, results, pending).await
            }
        }
    }
}

async fn put_single(
    client: &Client,
    bucket: &str,
    key: &str,
    file: &File,
    body: ByteStream,
) -> Result<(), UploadError> {
    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .content_type(file.media_type().mime())
        .body(body)
        .send()
        .await
        .map_err(|e| UploadError::Backend(e.to_string()))?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn multi_part(
    client: &Client,
    bucket: &str,
    key: &str,
    file: &File,
    mut source: PartSource,
    total: u64,
    results: &broadcast::Sender<UploadResult>,
    pending: &Mutex<Option<String>>,
) -> Result<(), UploadError> {
    let created = client
        .create_multipart_upload()
        .bucket(bucket)
        .key(key)
        .content_type(file.media_type().mime())
        .send()
        .await
        .map_err(|e| UploadError::Backend(e.to_string()))?;
    let upload_id = created.upload_id().unwrap_or_default().to_string();
    if upload_id.is_empty() {
        return Err(UploadError::Backend("missing multipart upload id".into()));
    }
    *pending.lock().unwrap() = Some(upload_id.clone());

    let mut completed = Vec::new();
    let mut sent = 0u64;
    let mut part_number = 1i32;
    loop {
        let chunk = match source.next_part().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(err) => {
                abort_multipart(client, bucket, key, &upload_id).await;
                pending.lock().unwrap().take();
                return Err(err);
            }
        };
        let len = chunk.len() as u64;
        let part = match client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(&upload_id)
            .part_number(part_number)
            .body(ByteStream::from(chunk))
            .send()
            .await
        {
            Ok(part) => part,
            Err(err) => {
                abort_multipart(client, bucket, key, &upload_id).await;
                pending.lock().unwrap().take();
                return Err(UploadError::Backend(err.to_string()));
            }
        };
        completed.push(
            CompletedPart::builder()
                .part_number(part_number)
                .set_e_tag(part.e_tag().map(str::to_string))
                .build(),
        );
        sent += len;
        let _ = results.send(UploadResult::Progress(
            file.clone(),
            (sent as f64 / total as f64).min(1.0),
        ));
        part_number += 1;
    }

    let assembled = CompletedMultipartUpload::builder()
        .set_parts(Some(completed))
        .build();
    let finished = client
        .complete_multipart_upload()
        .bucket(bucket)
        .key(key)
        .upload_id(&upload_id)
        .multipart_upload(assembled)
        .send()
        .await;
    pending.lock().unwrap().take();
    if let Err(err) = finished {
        abort_multipart(client, bucket, key, &upload_id).await;
        return Err(UploadError::Backend(err.to_string()));
    }
    Ok(())
}

async fn abort_multipart(client: &Client, bucket: &str, key: &str, upload_id: &str) {
    if let Err(err) = client
        .abort_multipart_upload()
        .bucket(bucket)
        .key(key)
        .upload_id(upload_id)
        .send()
        .await
    {
        debug!(key = %key, error = %err, "failed to abort multipart upload");
    }
}
