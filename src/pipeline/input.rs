//! Input resolution: normalise a path or an in-memory buffer to a local file.
//!
//! ## Why write buffers to a temp file?
//!
//! pdfium works best with a file-system path, and OCR engines that shell out
//! need one anyway. Writing in-memory bytes to a `TempDir` gives every later
//! stage a uniform path to work with, and the `TempDir` handle kept inside
//! [`ResolvedInput`] guarantees cleanup when processing completes, even on
//! panic. The input kind is sniffed from magic bytes (`%PDF`), not from the
//! file extension, so a misnamed scan still routes correctly.

use crate::error::ScanFuseError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// What the user handed us.
pub enum InputSource {
    /// A file on disk, PDF or image.
    FilePath(PathBuf),
    /// Raw bytes of a PDF or image, e.g. an upload body.
    InMemoryBytes(Vec<u8>),
}

/// The sniffed kind of a resolved input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pdf,
    Image,
}

/// A local file every later stage can open, plus its sniffed kind.
#[derive(Debug)]
pub struct ResolvedInput {
    path: PathBuf,
    kind: InputKind,
    /// Keeps the backing temp directory alive for buffer inputs.
    _temp_dir: Option<TempDir>,
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }
}

/// Resolve an [`InputSource`] to a local file with a known kind.
pub fn resolve_input(source: InputSource) -> Result<ResolvedInput, ScanFuseError> {
    match source {
        InputSource::FilePath(path) => resolve_path(path),
        InputSource::InMemoryBytes(bytes) => resolve_bytes(&bytes),
    }
}

fn resolve_path(path: PathBuf) -> Result<ResolvedInput, ScanFuseError> {
    if !path.exists() {
        return Err(ScanFuseError::FileNotFound { path });
    }

    // A short prefix is enough for both the PDF magic and the image format
    // guess; no need to pull a large scan into memory here.
    let magic = match std::fs::File::open(&path) {
        Ok(mut f) => {
            use std::io::Read;
            let mut prefix = [0u8; 64];
            let n = f.read(&mut prefix).unwrap_or(0);
            sniff_kind(&prefix[..n])
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ScanFuseError::PermissionDenied { path });
        }
        Err(_) => return Err(ScanFuseError::FileNotFound { path }),
    };

    let kind = magic.ok_or_else(|| ScanFuseError::UnsupportedInput {
        detail: format!("'{}' is neither a PDF nor a known image format", path.display()),
    })?;

    debug!(path = %path.display(), ?kind, "resolved local input");
    Ok(ResolvedInput {
        path,
        kind,
        _temp_dir: None,
    })
}

fn resolve_bytes(bytes: &[u8]) -> Result<ResolvedInput, ScanFuseError> {
    let kind = sniff_kind(bytes).ok_or_else(|| ScanFuseError::UnsupportedInput {
        detail: format!("{}-byte buffer is neither a PDF nor a known image format", bytes.len()),
    })?;

    let temp_dir = TempDir::new().map_err(|e| ScanFuseError::Internal(e.to_string()))?;
    let filename = match kind {
        InputKind::Pdf => "input.pdf",
        InputKind::Image => "input.img",
    };
    let path = temp_dir.path().join(filename);
    std::fs::write(&path, bytes)
        .map_err(|e| ScanFuseError::Internal(format!("failed to write temp file: {e}")))?;

    debug!(bytes = bytes.len(), ?kind, "resolved buffer input");
    Ok(ResolvedInput {
        path,
        kind,
        _temp_dir: Some(temp_dir),
    })
}

/// Identify the input by magic bytes.
///
/// Anything that is not a PDF but passes the image decoder's format guess is
/// treated as an image; actual decodability is checked at split time.
fn sniff_kind(bytes: &[u8]) -> Option<InputKind> {
    if bytes.starts_with(b"%PDF") {
        return Some(InputKind::Pdf);
    }
    image::guess_format(bytes).ok().map(|_| InputKind::Image)
}
