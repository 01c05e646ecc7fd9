//! The upload unit.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use uuid::Uuid;

use crate::media::MediaType;
use crate::route::UploadRoute;

/// Where a file's payload comes from.
#[derive(Debug, Clone)]
pub enum FileSource {
    /// In-memory payload.
    Data(Bytes),
    /// Path to a local file.
    Path(PathBuf),
}

/// Destination classification for a file.
///
/// Message uploads land under `Message/`, everything else under `Temp/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadScope {
    Message,
    #[default]
    Staging,
}

/// Fields the active backend records mid-flight.
#[derive(Debug, Default)]
struct FileState {
    task_id: Option<u64>,
    uploaded_url: Option<String>,
    response: Option<serde_json::Value>,
}

#[derive(Debug)]
struct FileShared {
    id: Uuid,
    name: String,
    original_name: String,
    upload_key: String,
    media_type: MediaType,
    scope: UploadScope,
    source: FileSource,
    route: Option<UploadRoute>,
    state: Mutex<FileState>,
}

/// One upload unit.
///
/// A `File` is a cheap-clone handle: the active backend records the task
/// identifier, final URL and response payload on it mid-flight, and every
/// result event carries it. Two files are equal iff their ids match.
#[derive(Debug, Clone)]
pub struct File {
    shared: Arc<FileShared>,
}

/// Builder for [`File`].
pub struct FileBuilder {
    id: Uuid,
    stem: String,
    media_type: MediaType,
    source: FileSource,
    scope: UploadScope,
    upload_key: String,
    route: Option<UploadRoute>,
}

impl FileBuilder {
    /// Overrides the generated id (stable identity for callers that track
    /// uploads across restarts).
    pub fn id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Classifies the file as a message upload (`Message/` destination key).
    pub fn for_message(mut self) -> Self {
        self.scope = UploadScope::Message;
        self
    }

    /// Overrides the multipart form field name (default `file_name`).
    pub fn upload_key(mut self, key: impl Into<String>) -> Self {
        self.upload_key = key.into();
        self
    }

    /// Attaches routing info, selecting the routed upload entry point.
    pub fn route(mut self, route: UploadRoute) -> Self {
        self.route = Some(route);
        self
    }

    pub fn build(self) -> File {
        let ext = self.media_type.extension();
        File {
            shared: Arc::new(FileShared {
                id: self.id,
                name: format!("{}_{}.{ext}", self.stem, self.id),
                original_name: format!("{}.{ext}", self.stem),
                upload_key: self.upload_key,
                media_type: self.media_type,
                scope: self.scope,
                source: self.source,
                route: self.route,
                state: Mutex::new(FileState::default()),
            }),
        }
    }
}

impl File {
    /// Starts building a file from a bare name (no extension), its media
    /// type and a payload source.
    pub fn builder(
        stem: impl Into<String>,
        media_type: MediaType,
        source: FileSource,
    ) -> FileBuilder {
        FileBuilder {
            id: Uuid::new_v4(),
            stem: stem.into(),
            media_type,
            source,
            scope: UploadScope::default(),
            upload_key: "file_name".into(),
            route: None,
        }
    }

    /// Shorthand for [`File::builder`] with defaults.
    pub fn new(stem: impl Into<String>, media_type: MediaType, source: FileSource) -> Self {
        Self::builder(stem, media_type, source).build()
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Generated storage name, `{stem}_{id}.{ext}`.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Name without the id attached, `{stem}.{ext}`.
    pub fn original_name(&self) -> &str {
        &self.shared.original_name
    }

    /// Multipart form field name used by the routed backend.
    pub fn upload_key(&self) -> &str {
        &self.shared.upload_key
    }

    pub fn media_type(&self) -> MediaType {
        self.shared.media_type
    }

    pub fn scope(&self) -> UploadScope {
        self.shared.scope
    }

    pub fn source(&self) -> &FileSource {
        &self.shared.source
    }

    pub fn route(&self) -> Option<&UploadRoute> {
        self.shared.route.as_ref()
    }

    /// Destination key derived from the message/staging classification.
    pub fn key(&self) -> String {
        match self.shared.scope {
            UploadScope::Message => format!("Message/{}", self.shared.name),
            UploadScope::Staging => format!("Temp/{}", self.shared.name),
        }
    }

    /// Backend-assigned task identifier, set once the transfer starts.
    pub fn task_id(&self) -> Option<u64> {
        self.shared.state.lock().unwrap().task_id
    }

    pub fn set_task_id(&self, task_id: u64) {
        self.shared.state.lock().unwrap().task_id = Some(task_id);
    }

    /// Final remote URL, recorded by the backend before the success event.
    pub fn uploaded_url(&self) -> Option<String> {
        self.shared.state.lock().unwrap().uploaded_url.clone()
    }

    pub fn set_uploaded_url(&self, url: impl Into<String>) {
        self.shared.state.lock().unwrap().uploaded_url = Some(url.into());
    }

    /// Opaque backend response payload, recorded on success.
    pub fn response(&self) -> Option<serde_json::Value> {
        self.shared.state.lock().unwrap().response.clone()
    }

    pub fn set_response(&self, value: serde_json::Value) {
        self.shared.state.lock().unwrap().response = Some(value);
    }
}

impl PartialEq for File {
    fn eq(&self, other: &Self) -> bool {
        self.shared.id == other.shared.id
    }
}

impl Eq for File {}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_file(stem: &str) -> File {
        File::new(stem, MediaType::Png, FileSource::Data(Bytes::from_static(b"png")))
    }

    #[test]
    fn generated_names_carry_id_and_extension() {
        let id = Uuid::new_v4();
        let file = File::builder("avatar", MediaType::Jpeg, FileSource::Data(Bytes::new()))
            .id(id)
            .build();
        assert_eq!(file.name(), format!("avatar_{id}.jpg"));
        assert_eq!(file.original_name(), "avatar.jpg");
    }

    #[test]
    fn key_follows_scope() {
        let staged = data_file("report");
        assert_eq!(staged.key(), format!("Temp/{}", staged.name()));

        let message = File::builder("voice", MediaType::Png, FileSource::Data(Bytes::new()))
            .for_message()
            .build();
        assert_eq!(message.key(), format!("Message/{}", message.name()));
    }

    #[test]
    fn equality_is_by_id() {
        let a = data_file("same");
        let b = a.clone();
        let c = data_file("same");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn clones_share_backend_recorded_state() {
        let a = data_file("shared");
        let b = a.clone();
        a.set_task_id(7);
        a.set_uploaded_url("https://cdn.example.com/x");
        assert_eq!(b.task_id(), Some(7));
        assert_eq!(b.uploaded_url().as_deref(), Some("https://cdn.example.com/x"));
        assert!(b.response().is_none());
    }

    #[test]
    fn default_upload_key() {
        assert_eq!(data_file("f").upload_key(), "file_name");
        let custom = File::builder("f", MediaType::Pdf, FileSource::Data(Bytes::new()))
            .upload_key("attachment")
            .build();
        assert_eq!(custom.upload_key(), "attachment");
    }
}
