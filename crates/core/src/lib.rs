pub mod acquire;
pub mod arena;
pub mod book;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod detect;
pub mod document;
pub mod encoding;
pub mod error;
pub mod extract;
pub mod markup;
pub mod progress;
pub mod readers;
pub mod rules;
pub mod security;
pub mod writers;
pub mod xml;

use crate::book::Book;
use crate::detect::Format;
use crate::document::RichNode;
use crate::error::FolioError;
use crate::markup::MarkupNode;
use crate::readers::fb2::Fb2Reader;
use crate::readers::ReadOptions;
use crate::writers::RenderOptions;

pub mod prelude {
    pub use crate::acquire::{AcquireOutcome, Acquirer, ArchiveRequest, ContentLoader, HttpLoader};
    pub use crate::book::*;
    pub use crate::cache::{ContentCache, DirCache, MemoryCache};
    pub use crate::cancel::CancelToken;
    pub use crate::document::*;
    pub use crate::error::*;
    pub use crate::extract::{extract_images, extract_pages, ExtractedImage, ExtractedPages};
    pub use crate::writers::RenderOptions;
    pub use crate::{import_book, import_rich_document, render_rich_document};
}

/// Import an FB2 document, or a zip wrapping one.
pub fn import_book(blob: &[u8]) -> Result<Book, FolioError> {
    import_book_with(blob, &ReadOptions::default())
}

pub fn import_book_with(blob: &[u8], opts: &ReadOptions) -> Result<Book, FolioError> {
    let zipped = matches!(
        detect::detect(blob, None).map(|d| d.format),
        Ok(Format::Fb2Zip)
    );
    if zipped {
        let inner = extract::unzip_document(blob, ".fb2", &opts.security)?;
        return Ok(Fb2Reader::read_bytes(&inner, opts, None)?);
    }
    Ok(Fb2Reader::read_bytes(blob, opts, None)?)
}

/// Import an HTML fragment into the editable tree. Never fails.
pub fn import_rich_document(html: &str) -> Vec<RichNode> {
    readers::html::import(html)
}

pub fn render_rich_document(nodes: &[RichNode], opts: &RenderOptions) -> Vec<MarkupNode> {
    writers::html::render(nodes, opts)
}
