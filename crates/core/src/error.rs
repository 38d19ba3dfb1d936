/// Top-level error type. All public API functions that can fail return this
/// or one of the per-concern errors it wraps.
#[derive(Debug, thiserror::Error)]
pub enum FolioError {
    #[error("Format detection failed: {0}")]
    Detect(#[from] DetectError),

    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    #[error("Acquisition error: {0}")]
    Acquire(#[from] AcquireError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Security violation: {0}")]
    Security(#[from] SecurityError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("ZIP bomb detected: decompression ratio {ratio}:1 exceeds limit {limit}:1")]
    ZipBomb { ratio: u64, limit: u64 },

    #[error("Archive contains {count} entries, exceeding limit of {limit}")]
    TooManyEntries { count: u64, limit: u64 },

    #[error("Entry {name} is {size_mb}MB, exceeding limit of {limit_mb}MB")]
    OversizedEntry {
        name: String,
        size_mb: u64,
        limit_mb: u64,
    },

    #[error("XML nesting depth {depth} exceeds limit of {limit}")]
    ExcessiveNesting { depth: u32, limit: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("Could not determine format: {0}")]
    Unknown(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("Malformed {format} file: {detail}")]
    MalformedFile { format: String, detail: String },

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ReadError {
    pub(crate) fn malformed(format: &str, detail: impl std::fmt::Display) -> Self {
        ReadError::MalformedFile {
            format: format.to_string(),
            detail: detail.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures inside one acquisition attempt. These never escape the
/// acquisition boundary; they are logged and counted against the attempt bound.
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server returned HTTP {status} for {url}")]
    Http { status: u16, url: String },

    #[error("Response size header unavailable for {0}")]
    MissingLength(String),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl From<reqwest::Error> for AcquireError {
    fn from(e: reqwest::Error) -> Self {
        AcquireError::Network(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache index is corrupt: {0}")]
    Index(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Invalid ZIP archive: {0}")]
    InvalidArchive(String),

    #[error("Archive does not contain a {0} document")]
    MissingDocument(String),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<zip::result::ZipError> for ExtractError {
    fn from(e: zip::result::ZipError) -> Self {
        ExtractError::InvalidArchive(e.to_string())
    }
}
