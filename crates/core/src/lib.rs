//! Upload unit model shared by every Airlift crate.
//!
//! This crate is the leaf of the workspace: it defines the [`File`] value
//! object, its MIME classification, the routing info consumed by the HTTP
//! backend, and the [`UploadResult`] events flowing through the rest of
//! the stack. No async machinery lives here.

mod error;
mod file;
mod media;
mod result;
mod route;

pub use error::UploadError;
pub use file::{File, FileBuilder, FileSource, UploadScope};
pub use media::MediaType;
pub use result::UploadResult;
pub use route::{HttpMethod, ParamEncoding, UploadRoute};
