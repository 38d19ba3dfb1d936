//! Archive image extraction: a zip of page images → ordered page list.
//!
//! Entries are visited in archive order. Anything that does not decode to a
//! non-empty image is skipped with a warning; only an unreadable archive (or
//! one with too many entries) is an error. Cancellation stops the walk early
//! and keeps whatever was extracted so far.

use std::io::{Cursor, Read};

use image::ImageReader;

use crate::arena::{Resource, ResourceArena};
use crate::cancel::CancelToken;
use crate::error::ExtractError;
use crate::progress::{emit_progress, ProgressHandler};
use crate::security::{self, SecurityLimits};

const OPERATION: &str = "Extracting pages";

/// One decoded page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedImage {
    pub name: String,
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// Extracted pages plus the arena that owns their bytes.
#[derive(Debug, Default)]
pub struct ExtractedPages {
    pub images: Vec<ExtractedImage>,
    arena: ResourceArena,
}

impl ExtractedPages {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Resolve a page URL while the list is alive.
    pub fn fetch(&self, url: &str) -> Option<&Resource> {
        self.arena.get(url)
    }

    /// Release every page buffer. Returns how many were freed.
    pub fn destroy(&mut self) -> usize {
        self.images.clear();
        self.arena.release_all()
    }
}

/// Mime type for a page file name, with `jpg` normalized to `jpeg`.
pub fn mime_for(name: &str) -> Option<&'static str> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

pub async fn extract_images(blob: &[u8], cancel: &CancelToken) -> Result<ExtractedPages, ExtractError> {
    extract_images_with(blob, cancel, &SecurityLimits::default()).await
}

pub async fn extract_images_with(
    blob: &[u8],
    cancel: &CancelToken,
    limits: &SecurityLimits,
) -> Result<ExtractedPages, ExtractError> {
    extract_pages(blob, cancel, limits, None).await
}

/// Extract every decodable page, reporting `(entries visited, total entries)`
/// after each entry.
pub async fn extract_pages(
    blob: &[u8],
    cancel: &CancelToken,
    limits: &SecurityLimits,
    progress: Option<&dyn ProgressHandler>,
) -> Result<ExtractedPages, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(blob))?;
    let total = archive.len();
    security::check_entry_count(total as u64, limits)?;

    let mut pages = ExtractedPages::default();
    for i in 0..total {
        if cancel.is_cancelled() {
            tracing::debug!("extraction cancelled after {} pages", pages.len());
            break;
        }

        if let Some((name, data)) = read_entry(&mut archive, i, limits) {
            let decoded = decode_entry(&name, data).await;
            if cancel.is_cancelled() {
                tracing::debug!("extraction cancelled after {} pages", pages.len());
                break;
            }
            if let Some((data, width, height, guessed)) = decoded {
                let media_type = mime_for(&name).unwrap_or(guessed);
                let url = pages.arena.allocate(media_type, data);
                pages.images.push(ExtractedImage {
                    name,
                    url,
                    width,
                    height,
                });
            }
        }
        emit_progress(progress, OPERATION, i as u64 + 1, Some(total as u64), None);
    }

    tracing::debug!("extracted {} pages from {} entries", pages.len(), total);
    Ok(pages)
}

/// Decode one entry off the async thread. Returns the bytes back with the
/// pixel size and sniffed mime type.
async fn decode_entry(name: &str, data: Vec<u8>) -> Option<(Vec<u8>, u32, u32, &'static str)> {
    let probed = tokio::task::spawn_blocking(move || {
        let dims = probe(&data);
        (data, dims)
    })
    .await;

    match probed {
        Ok((data, Some((width, height, guessed)))) => Some((data, width, height, guessed)),
        Ok((_, None)) => {
            tracing::warn!("skipping {name}: not a decodable image");
            None
        }
        Err(e) => {
            tracing::warn!("image decode for {name} did not finish: {e}");
            None
        }
    }
}

/// Read one file entry, or None if it should be skipped.
fn read_entry(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    index: usize,
    limits: &SecurityLimits,
) -> Option<(String, Vec<u8>)> {
    let mut entry = match archive.by_index(index) {
        Ok(entry) => entry,
        Err(e) => {
            tracing::warn!("skipping unreadable archive entry {index}: {e}");
            return None;
        }
    };
    if entry.is_dir() {
        return None;
    }
    let name = entry.name().to_string();
    if let Err(e) = security::check_entry(&name, entry.compressed_size(), entry.size(), limits) {
        tracing::warn!("skipping {name}: {e}");
        return None;
    }

    let mut data = Vec::new();
    if let Err(e) = entry
        .by_ref()
        .take(limits.max_entry_size_bytes)
        .read_to_end(&mut data)
    {
        tracing::warn!("skipping {name}: {e}");
        return None;
    }
    if data.is_empty() {
        tracing::warn!("skipping {name}: empty entry");
        return None;
    }
    Some((name, data))
}

/// Pixel size and sniffed mime type after a full decode, or None for anything
/// that fails to decode or has no pixels.
fn probe(data: &[u8]) -> Option<(u32, u32, &'static str)> {
    let reader = ImageReader::new(Cursor::new(data)).with_guessed_format().ok()?;
    let format = reader.format()?;
    let image = reader.decode().ok()?;
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height, format.to_mime_type()))
}

/// Pull the first entry whose name ends with `suffix` out of a wrapper zip.
pub fn unzip_document(
    blob: &[u8],
    suffix: &str,
    limits: &SecurityLimits,
) -> Result<Vec<u8>, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(blob))?;
    security::check_entry_count(archive.len() as u64, limits)?;

    let suffix = suffix.to_ascii_lowercase();
    let count = archive.len();
    let mut fallback = None;
    for i in 0..count {
        let entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        if entry.name().to_ascii_lowercase().ends_with(&suffix) {
            fallback = Some(i);
            break;
        }
        // A wrapper holding exactly one file is accepted whatever its name.
        if count == 1 {
            fallback = Some(i);
        }
    }

    let index = fallback.ok_or_else(|| ExtractError::MissingDocument(suffix.clone()))?;
    let mut entry = archive.by_index(index)?;
    security::check_entry(entry.name(), entry.compressed_size(), entry.size(), limits)?;
    let mut data = Vec::new();
    entry
        .by_ref()
        .take(limits.max_entry_size_bytes)
        .read_to_end(&mut data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::new(width, height);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn zip_of(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let opts = zip::write::SimpleFileOptions::default();
            for (name, data) in entries {
                if name.ends_with('/') {
                    zip.add_directory(*name, opts).unwrap();
                } else {
                    zip.start_file(*name, opts).unwrap();
                    zip.write_all(data).unwrap();
                }
            }
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for("01.JPG"), Some("image/jpeg"));
        assert_eq!(mime_for("a/b.png"), Some("image/png"));
        assert_eq!(mime_for("notes.txt"), None);
        assert_eq!(mime_for("noext"), None);
    }

    #[tokio::test]
    async fn test_extracts_in_archive_order_and_skips_junk() {
        let blob = zip_of(&[
            ("pages/", vec![]),
            ("pages/02.png", png(4, 3)),
            ("pages/readme.txt", b"hello".to_vec()),
            ("pages/01.jpg", png(2, 5)),
            ("pages/broken.png", b"\x89PNG nope".to_vec()),
        ]);
        let pages = extract_images(&blob, &CancelToken::new()).await.unwrap();

        let summary: Vec<(&str, u32, u32)> = pages
            .images
            .iter()
            .map(|p| (p.name.as_str(), p.width, p.height))
            .collect();
        assert_eq!(summary, vec![("pages/02.png", 4, 3), ("pages/01.jpg", 2, 5)]);

        // Extension wins over the sniffed format.
        let jpg = pages.fetch(&pages.images[1].url).unwrap();
        assert_eq!(jpg.media_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_cancelled_before_start_yields_nothing() {
        let blob = zip_of(&[("01.png", png(1, 1))]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let pages = extract_images(&blob, &cancel).await.unwrap();
        assert!(pages.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_midway_keeps_extracted_pages() {
        let blob = zip_of(&[("01.png", png(3, 2)), ("02.png", png(3, 2)), ("03.png", png(3, 2))]);
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let after_first = move |visited: u64, _total: Option<u64>| {
            if visited == 1 {
                trigger.cancel();
            }
        };

        let pages = extract_pages(&blob, &cancel, &SecurityLimits::default(), Some(&after_first))
            .await
            .unwrap();
        let names: Vec<&str> = pages.images.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["01.png"]);
        assert!(pages.fetch(&pages.images[0].url).is_some());
    }

    #[tokio::test]
    async fn test_corrupt_pixel_data_is_skipped() {
        let noisy = image::RgbImage::from_fn(64, 64, |x, y| {
            image::Rgb([(x * 4) as u8, (y * 4) as u8, (x ^ y) as u8])
        });
        let mut out = Cursor::new(Vec::new());
        noisy.write_to(&mut out, image::ImageFormat::Png).unwrap();
        let mut corrupt = out.into_inner();
        let idat = corrupt.windows(4).position(|w| w == b"IDAT").unwrap() + 4;
        corrupt[idat..idat + 16].fill(0xff);
        assert!(image::load_from_memory(&corrupt).is_err());

        let blob = zip_of(&[("01.png", corrupt), ("02.png", png(5, 7))]);
        let pages = extract_images(&blob, &CancelToken::new()).await.unwrap();
        let summary: Vec<(&str, u32, u32)> = pages
            .images
            .iter()
            .map(|p| (p.name.as_str(), p.width, p.height))
            .collect();
        assert_eq!(summary, vec![("02.png", 5, 7)]);
    }

    #[tokio::test]
    async fn test_destroy_releases_buffers() {
        let blob = zip_of(&[("01.png", png(1, 1)), ("02.png", png(1, 1))]);
        let mut pages = extract_images(&blob, &CancelToken::new()).await.unwrap();
        let url = pages.images[0].url.clone();
        assert_eq!(pages.destroy(), 2);
        assert!(pages.fetch(&url).is_none());
        assert!(pages.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_archive_is_an_error() {
        let err = extract_images(b"not a zip", &CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, ExtractError::InvalidArchive(_)));
    }

    #[tokio::test]
    async fn test_too_many_entries_is_fatal() {
        let blob = zip_of(&[("01.png", png(1, 1)), ("02.png", png(1, 1))]);
        let limits = SecurityLimits {
            max_entry_count: 1,
            ..SecurityLimits::default()
        };
        let err = extract_images_with(&blob, &CancelToken::new(), &limits)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Security(_)));
    }

    #[test]
    fn test_unzip_document() {
        let blob = zip_of(&[("cover.jpg", png(1, 1)), ("Book.FB2", b"<FictionBook/>".to_vec())]);
        let data = unzip_document(&blob, ".fb2", &SecurityLimits::default()).unwrap();
        assert_eq!(data, b"<FictionBook/>");

        let lone = zip_of(&[("book.xml", b"<FictionBook/>".to_vec())]);
        assert!(unzip_document(&lone, ".fb2", &SecurityLimits::default()).is_ok());

        let none = zip_of(&[("a.txt", b"x".to_vec()), ("b.txt", b"y".to_vec())]);
        assert!(matches!(
            unzip_document(&none, ".fb2", &SecurityLimits::default()),
            Err(ExtractError::MissingDocument(_))
        ));
    }
}
