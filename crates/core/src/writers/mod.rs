//! Format writers: each output format implements FormatWriter to emit from
//! the rich-document tree.

pub mod html;

use crate::document::RichNode;
use crate::error::WriteError;
use crate::progress::ProgressHandler;

pub trait FormatWriter: Send + Sync {
    /// Write the rendered document to a byte sink.
    fn write<W: std::io::Write>(
        nodes: &[RichNode],
        output: W,
        opts: &RenderOptions,
        progress: Option<&dyn ProgressHandler>,
    ) -> Result<(), WriteError>
    where
        Self: Sized;
}

#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Skip image nodes (and their subtrees) entirely.
    pub suppress_images: bool,
}
