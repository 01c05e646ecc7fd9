//! MIME classification for upload units.

/// The media type of a file queued for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Jpeg,
    Png,
    Pdf,
    Doc,
    DocX,
    Xls,
    Xlsx,
    Ppt,
    PptX,
}

impl MediaType {
    /// All supported media types.
    pub const ALL: [MediaType; 9] = [
        MediaType::Jpeg,
        MediaType::Png,
        MediaType::Pdf,
        MediaType::Doc,
        MediaType::DocX,
        MediaType::Xls,
        MediaType::Xlsx,
        MediaType::Ppt,
        MediaType::PptX,
    ];

    /// The MIME identifier sent as the transfer content type.
    pub fn mime(self) -> &'static str {
        match self {
            MediaType::Jpeg => "image/jpg",
            MediaType::Png => "image/png",
            MediaType::Pdf => "application/pdf",
            MediaType::Doc => "application/msword",
            MediaType::DocX => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            MediaType::Xls => "application/vnd.ms-excel",
            MediaType::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            MediaType::Ppt => "application/vnd.ms-powerpoint",
            MediaType::PptX => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
        }
    }

    /// The canonical file extension (without the dot).
    pub fn extension(self) -> &'static str {
        match self {
            MediaType::Jpeg => "jpg",
            MediaType::Png => "png",
            MediaType::Pdf => "pdf",
            MediaType::Doc => "doc",
            MediaType::DocX => "docx",
            MediaType::Xls => "xls",
            MediaType::Xlsx => "xlsx",
            MediaType::Ppt => "ppt",
            MediaType::PptX => "pptx",
        }
    }

    /// Looks up a media type from a file extension, case-insensitive.
    ///
    /// `jpeg` is accepted as an alias for `jpg`.
    pub fn from_extension(ext: &str) -> Option<MediaType> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        if ext == "jpeg" {
            return Some(MediaType::Jpeg);
        }
        MediaType::ALL.iter().copied().find(|m| m.extension() == ext)
    }
}
