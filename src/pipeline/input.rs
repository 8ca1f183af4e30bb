//! Input resolution: turn a user-supplied path, URL or byte buffer into a
//! [`Document`] with a known [`DocumentKind`].
//!
//! Kind is decided from the leading bytes first and the file extension
//! second. Magic bytes win because scanners and phones happily save a JPEG
//! as `scan.pdf`; the extension only breaks ties for container formats such
//! as ZIP, where the bytes alone do not say "workbook".

use crate::error::ExtractError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What a document is, for routing through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// A single bitmap (PNG, JPEG, TIFF …): exactly one page.
    Image,
    /// A paginated PDF: one page image per physical page.
    Pdf,
    /// A workbook (xlsx, xls, ods): read directly, never sent to the model.
    Spreadsheet,
}

/// One user-submitted file. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub bytes: Vec<u8>,
    pub kind: DocumentKind,
    /// Original file name, when known. Used in error messages only.
    pub name: Option<String>,
}

impl Document {
    /// A document with a declared kind.
    pub fn new(bytes: Vec<u8>, kind: DocumentKind) -> Self {
        Self {
            bytes,
            kind,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Detect the kind from the bytes, falling back to the file name.
    pub fn sniff(bytes: Vec<u8>, name: Option<&str>) -> Result<Self, ExtractError> {
        let kind = sniff_kind(&bytes, name).ok_or_else(|| ExtractError::UnsupportedFormat {
            name: name.map(str::to_string),
            detail: if bytes.is_empty() {
                "empty input".to_string()
            } else {
                format!("unrecognised signature {:02x?}", &bytes[..bytes.len().min(4)])
            },
        })?;
        debug!("Sniffed {:?} ({} bytes)", kind, bytes.len());
        Ok(Self {
            bytes,
            kind,
            name: name.map(str::to_string),
        })
    }

    /// Read a local file and detect its kind.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => ExtractError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => ExtractError::FileNotFound {
                path: path.to_path_buf(),
            },
        })?;
        let name = path.file_name().map(|n| n.to_string_lossy().to_string());
        Self::sniff(bytes, name.as_deref())
    }
}

const IMAGE_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "tif", "tiff", "gif", "bmp", "webp"];
const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

fn extension(name: Option<&str>) -> Option<String> {
    name.and_then(|n| Path::new(n).extension())
        .map(|e| e.to_string_lossy().to_lowercase())
}

/// Decide the document kind, or `None` when nothing matches.
pub fn sniff_kind(bytes: &[u8], name: Option<&str>) -> Option<DocumentKind> {
    if bytes.starts_with(b"%PDF") {
        return Some(DocumentKind::Pdf);
    }
    if image::guess_format(bytes).is_ok() {
        return Some(DocumentKind::Image);
    }

    let ext = extension(name);
    let ext = ext.as_deref();

    // ZIP container (xlsx/ods) or OLE compound file (legacy xls).
    let is_zip = bytes.starts_with(b"PK\x03\x04");
    let is_ole = bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]);
    if is_zip || is_ole {
        return match ext {
            Some(e) if SPREADSHEET_EXTENSIONS.contains(&e) => Some(DocumentKind::Spreadsheet),
            // Without a name, a ZIP/OLE upload on this path is a workbook.
            None => Some(DocumentKind::Spreadsheet),
            Some(_) => None,
        };
    }

    match ext {
        Some("pdf") if bytes.windows(4).take(1024).any(|w| w == b"%PDF") => Some(DocumentKind::Pdf),
        Some(e) if IMAGE_EXTENSIONS.contains(&e) && !bytes.is_empty() => Some(DocumentKind::Image),
        _ => None,
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a path or HTTP(S) URL to a [`Document`].
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<Document, ExtractError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        let path = PathBuf::from(input);
        if !path.exists() {
            return Err(ExtractError::FileNotFound { path });
        }
        let doc = tokio::task::spawn_blocking(move || Document::from_path(&path))
            .await
            .map_err(|e| ExtractError::Internal(format!("Read task panicked: {}", e)))??;
        debug!("Resolved local {:?}: {}", doc.kind, input);
        Ok(doc)
    }
}

/// Download a URL into memory and detect its kind.
async fn download_url(url: &str, timeout_secs: u64) -> Result<Document, ExtractError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ExtractError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = filename_from_url(url);
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());
    Document::sniff(bytes.to_vec(), filename.as_deref())
}

/// Last path segment of the URL, if it looks like a file name.
fn filename_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    (!last.is_empty() && last.contains('.')).then(|| last.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG_MAGIC: &[u8] = b"\xFF\xD8\xFF\xE0\0\x10JFIF";

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/note.pdf"));
        assert!(is_url("http://example.com/note.pdf"));
        assert!(!is_url("/tmp/note.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn magic_bytes_win_over_extension() {
        assert_eq!(sniff_kind(JPEG_MAGIC, Some("scan.pdf")), Some(DocumentKind::Image));
        assert_eq!(sniff_kind(b"%PDF-1.7\n", Some("scan.png")), Some(DocumentKind::Pdf));
        assert_eq!(sniff_kind(PNG_MAGIC, None), Some(DocumentKind::Image));
    }

    #[test]
    fn zip_needs_a_spreadsheet_extension_when_named() {
        let zip = b"PK\x03\x04rest";
        assert_eq!(sniff_kind(zip, Some("stock.xlsx")), Some(DocumentKind::Spreadsheet));
        assert_eq!(sniff_kind(zip, Some("STOCK.ODS")), Some(DocumentKind::Spreadsheet));
        assert_eq!(sniff_kind(zip, None), Some(DocumentKind::Spreadsheet));
        assert_eq!(sniff_kind(zip, Some("letter.docx")), None);
    }

    #[test]
    fn legacy_xls_is_spreadsheet() {
        let ole = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
        assert_eq!(sniff_kind(&ole, Some("old.xls")), Some(DocumentKind::Spreadsheet));
    }

    #[test]
    fn pdf_with_leading_junk_is_found_via_extension() {
        let mut bytes = b"\r\n\r\n".to_vec();
        bytes.extend_from_slice(b"%PDF-1.4\n");
        assert_eq!(sniff_kind(&bytes, Some("bon.pdf")), Some(DocumentKind::Pdf));
        assert_eq!(sniff_kind(&bytes, None), None);
    }

    #[test]
    fn unknown_is_unsupported_format() {
        let err = Document::sniff(b"hello world".to_vec(), Some("notes.txt")).unwrap_err();
        match err {
            ExtractError::UnsupportedFormat { name, .. } => {
                assert_eq!(name.as_deref(), Some("notes.txt"))
            }
            other => panic!("unexpected {other:?}"),
        }
        let err = Document::sniff(Vec::new(), None).unwrap_err();
        assert!(err.to_string().contains("empty input"));
    }

    #[test]
    fn filename_is_taken_from_url_path() {
        assert_eq!(
            filename_from_url("https://example.com/a/bon_12.pdf?x=1").as_deref(),
            Some("bon_12.pdf")
        );
        assert_eq!(filename_from_url("https://example.com/download"), None);
    }

    #[tokio::test]
    async fn missing_local_file_is_reported() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound { .. }));
    }
}
