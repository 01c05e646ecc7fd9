//! Routing info consumed by the HTTP multipart backend.

use serde_json::{Map, Value};

use crate::error::UploadError;

/// HTTP method for an upload route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// The method name as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// A parameter-encoding directive carried by an upload route.
#[derive(Debug, Clone)]
pub enum ParamEncoding {
    /// JSON parameters spliced into the multipart body as text fields.
    Json(Map<String, Value>),
}

/// Request descriptor for the HTTP multipart backend.
///
/// Bucket uploads ignore routing info; a route on a [`File`](crate::File)
/// selects the routed upload entry point.
#[derive(Debug, Clone)]
pub struct UploadRoute {
    pub method: HttpMethod,
    pub url: String,
    pub encodings: Vec<ParamEncoding>,
}

impl UploadRoute {
    /// Creates a route with no parameter encodings.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            encodings: Vec::new(),
        }
    }

    /// Appends a JSON parameter-encoding directive.
    pub fn with_json_params(mut self, params: Map<String, Value>) -> Self {
        self.encodings.push(ParamEncoding::Json(params));
        self
    }

    /// The first JSON parameter set among the encoding directives.
    pub fn json_params(&self) -> Option<&Map<String, Value>> {
        self.encodings.iter().find_map(|e| match e {
            ParamEncoding::Json(params) => Some(params),
        })
    }

    /// Checks that the route can produce a request.
    pub fn validate(&self) -> Result<(), UploadError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(UploadError::InvalidRoute("empty url".into()));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(UploadError::InvalidRoute(format!(
                "unsupported url scheme in {url}"
            )));
        }
        Ok(())
    }
}
