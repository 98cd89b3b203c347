//! Uploaded file kinds.

use std::path::Path;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "tif"];
pub const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "docx", "doc"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    Document,
}

impl AttachmentKind {
    /// Classify by MIME type first, then by file extension. Anything that is
    /// not recognisably an image is treated as a document.
    pub fn detect(file_name: Option<&str>, mime_type: Option<&str>) -> Self {
        if mime_type.is_some_and(|m| m.to_ascii_lowercase().starts_with("image/")) {
            return AttachmentKind::Image;
        }
        match file_name.and_then(extension_of) {
            Some(ext) if IMAGE_EXTENSIONS.contains(&ext.as_str()) => AttachmentKind::Image,
            _ => AttachmentKind::Document,
        }
    }

    pub fn of_path(path: &Path) -> Self {
        Self::detect(path.to_str(), None)
    }
}

/// Whether the file name carries an extension the analysis service accepts.
pub fn is_supported_file_name(file_name: &str) -> bool {
    extension_of(file_name).is_some_and(|ext| {
        IMAGE_EXTENSIONS.contains(&ext.as_str()) || DOCUMENT_EXTENSIONS.contains(&ext.as_str())
    })
}

/// MIME type sent along with an upload.
pub fn mime_type_for(path: &Path) -> &'static str {
    match path.to_str().and_then(extension_of).as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("tif" | "tiff") => "image/tiff",
        Some("pdf") => "application/pdf",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("doc") => "application/msword",
        _ => "application/octet-stream",
    }
}

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_type_wins_over_extension() {
        assert_eq!(
            AttachmentKind::detect(Some("scan.pdf"), Some("image/png")),
            AttachmentKind::Image
        );
        assert_eq!(
            AttachmentKind::detect(Some("Invoice.JPG"), None),
            AttachmentKind::Image
        );
        assert_eq!(
            AttachmentKind::detect(Some("act.docx"), Some("application/octet-stream")),
            AttachmentKind::Document
        );
        assert_eq!(AttachmentKind::detect(None, None), AttachmentKind::Document);
    }

    #[test]
    fn supported_names() {
        assert!(is_supported_file_name("a.TIF"));
        assert!(is_supported_file_name("act.doc"));
        assert!(!is_supported_file_name("table.xlsx"));
        assert!(!is_supported_file_name("README"));
    }

    #[test]
    fn mime_types_by_extension() {
        assert_eq!(mime_type_for(Path::new("/tmp/x.pdf")), "application/pdf");
        assert_eq!(mime_type_for(Path::new("photo.jpeg")), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("blob")), "application/octet-stream");
    }
}
