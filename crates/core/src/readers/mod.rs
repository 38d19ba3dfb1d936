//! Format readers: each source format implements FormatReader to parse into
//! one of the two internal models (Book or rich-document tree).

pub mod fb2;
pub mod fb2_rules;
pub mod html;

use crate::error::ReadError;
use crate::progress::ProgressHandler;
use crate::security::SecurityLimits;

pub trait FormatReader: Send + Sync {
    /// The model this reader produces.
    type Output;

    /// Check if this reader can handle the given input. Called with first 4KB.
    fn detect(header: &[u8]) -> crate::detect::DetectResult
    where
        Self: Sized;

    /// Read from a byte source into the output model.
    fn read<R: std::io::Read + std::io::Seek>(
        input: R,
        opts: &ReadOptions,
        progress: Option<&dyn ProgressHandler>,
    ) -> Result<Self::Output, ReadError>
    where
        Self: Sized;
}

#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub security: SecurityLimits,
}
