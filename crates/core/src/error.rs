//! Upload error types.

/// Errors surfaced through upload result events.
///
/// Results fan out on broadcast channels, so every variant is `Clone`;
/// source errors are captured as strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("no network connection")]
    NoConnectivity,

    #[error("backend error: {0}")]
    Backend(String),

    #[error("invalid upload route: {0}")]
    InvalidRoute(String),

    #[error("backend requires routing info")]
    RouteRequired,

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for UploadError {
    fn from(err: std::io::Error) -> Self {
        UploadError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: UploadError = io.into();
        assert!(matches!(err, UploadError::Io(ref msg) if msg.contains("missing")));
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            UploadError::NoConnectivity.to_string(),
            "no network connection"
        );
        assert_eq!(
            UploadError::Backend("503".into()).to_string(),
            "backend error: 503"
        );
    }
}
