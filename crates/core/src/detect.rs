//! Format detection via magic bytes, file extension, and content heuristics.

use std::io::{Cursor, Read};
use std::path::Path;

use crate::error::DetectError;

/// The result of format detection.
#[derive(Debug, Clone)]
pub struct DetectResult {
    pub format: Format,
    pub confidence: f64,
    pub mime_type: &'static str,
}

/// Inputs the pipeline knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// FictionBook 2 XML.
    Fb2,
    /// A zip wrapping a single FB2 document.
    Fb2Zip,
    /// A zip of page images (manga/comic chapter).
    ImageArchive,
    Html,
    Unknown,
}

impl Format {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::Fb2 => "application/x-fictionbook+xml",
            Format::Fb2Zip => "application/x-zip-compressed-fb2",
            Format::ImageArchive => "application/vnd.comicbook+zip",
            Format::Html => "text/html",
            Format::Unknown => "application/octet-stream",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Format::Fb2 => "fb2",
            Format::Fb2Zip => "fb2.zip",
            Format::ImageArchive => "zip",
            Format::Html => "html",
            Format::Unknown => "bin",
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension().to_uppercase())
    }
}

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"];

/// Detect the format of data by its bytes and optionally its filename.
///
/// Zip disambiguation needs the central directory, so pass the whole blob
/// when it is an archive.
pub fn detect(data: &[u8], filename: Option<&str>) -> Result<DetectResult, DetectError> {
    if let Some(result) = detect_magic_bytes(data) {
        return Ok(result);
    }

    if let Some(result) = filename.and_then(detect_by_name) {
        return Ok(result);
    }

    Err(DetectError::Unknown(
        "Could not determine file format from magic bytes, extension, or content".to_string(),
    ))
}

/// Convenience: detect format from a file path.
pub fn detect_file(path: &Path) -> Result<DetectResult, DetectError> {
    let data = std::fs::read(path)?;
    let filename = path.file_name().and_then(|f| f.to_str());
    detect(&data, filename)
}

fn detect_magic_bytes(data: &[u8]) -> Option<DetectResult> {
    if data.len() < 4 {
        return None;
    }

    if data.starts_with(b"PK\x03\x04") {
        return detect_zip_subformat(data);
    }

    let text = skip_bom_and_decode(data)?;
    if text.contains("<FictionBook") {
        return Some(result(Format::Fb2, 0.95));
    }

    let lower = text.to_lowercase();
    if lower.contains("<!doctype html") || lower.contains("<html") {
        return Some(result(Format::Html, 0.85));
    }

    None
}

/// Tell an FB2 wrapper from a page-image archive by listing entry names.
fn detect_zip_subformat(data: &[u8]) -> Option<DetectResult> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data)).ok()?;
    let names: Vec<String> = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_lowercase()))
        .collect();

    if names.iter().any(|n| n.ends_with(".fb2")) {
        return Some(result(Format::Fb2Zip, 1.0));
    }

    let files: Vec<&String> = names.iter().filter(|n| !n.ends_with('/')).collect();
    let images = files
        .iter()
        .filter(|n| IMAGE_EXTENSIONS.iter().any(|ext| n.ends_with(ext)))
        .count();
    if images > 0 && images * 2 >= files.len() {
        return Some(result(Format::ImageArchive, 0.8));
    }

    // Peek into a lone entry in case the wrapper uses an odd extension.
    if files.len() == 1 {
        if let Ok(mut entry) = archive.by_index(0) {
            let mut head = Vec::new();
            if entry.by_ref().take(4096).read_to_end(&mut head).is_ok()
                && skip_bom_and_decode(&head).is_some_and(|t| t.contains("<FictionBook"))
            {
                return Some(result(Format::Fb2Zip, 0.9));
            }
        }
    }

    None
}

fn detect_by_name(filename: &str) -> Option<DetectResult> {
    let lower = filename.to_lowercase();
    if lower.ends_with(".fb2.zip") || lower.ends_with(".fbz") {
        return Some(result(Format::Fb2Zip, 0.6));
    }
    let ext = Path::new(&lower).extension()?.to_str()?.to_string();
    let (format, confidence) = match ext.as_str() {
        "fb2" => (Format::Fb2, 0.6),
        "html" | "htm" | "xhtml" => (Format::Html, 0.5),
        "zip" | "cbz" => (Format::ImageArchive, 0.4),
        _ => return None,
    };
    Some(result(format, confidence))
}

fn result(format: Format, confidence: f64) -> DetectResult {
    DetectResult {
        format,
        confidence,
        mime_type: format.mime_type(),
    }
}

/// Skip a UTF-8 BOM and decode for content inspection.
fn skip_bom_and_decode(bytes: &[u8]) -> Option<&str> {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => Some(text),
        // A truncated header may split a multi-byte character.
        Err(e) if e.valid_up_to() > 0 => std::str::from_utf8(&bytes[..e.valid_up_to()]).ok(),
        Err(_) => None,
    }
}
