//! Upload result events.

use crate::error::UploadError;
use crate::file::File;

/// Outcome event for a file upload.
///
/// Every variant carries the file it concerns so subscribers on a shared
/// stream can match by identity. A file sees zero or more `Progress`
/// events followed by exactly one terminal event.
#[derive(Debug, Clone)]
pub enum UploadResult {
    /// Upload finished; the file carries the recorded URL and response.
    Success(File),
    /// Intermediate progress, fraction in `[0.0, 1.0]`.
    Progress(File, f64),
    /// The transfer failed.
    Failure(File, UploadError),
    /// The transfer was cancelled.
    Cancelled(File),
}

impl UploadResult {
    /// The file this result concerns.
    pub fn file(&self) -> &File {
        match self {
            UploadResult::Success(file)
            | UploadResult::Progress(file, _)
            | UploadResult::Failure(file, _)
            | UploadResult::Cancelled(file) => file,
        }
    }

    /// Whether this result ends the file's upload lifecycle.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UploadResult::Progress(..))
    }
}
