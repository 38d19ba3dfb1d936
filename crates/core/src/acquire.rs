//! Archive acquisition: cache lookup, size validation, bounded retries.
//!
//! Each request walks a small state machine. The cache is consulted first; a
//! cached entry whose byte size matches the declared size is handed on, a
//! mismatched one is evicted. On a miss the loader streams the archive into
//! the cache and the lookup runs again. Every load counts against the attempt
//! bound. Failures never escape: the caller sees a failure callback (or
//! `AcquireOutcome::Failed`) and cancellation resolves to no result at all.

use std::path::PathBuf;

use reqwest::header::{HeaderMap, CONTENT_ENCODING, CONTENT_LENGTH};

use crate::book::Book;
use crate::cache::ContentCache;
use crate::cancel::CancelToken;
use crate::error::AcquireError;
use crate::extract::{self, ExtractedPages};
use crate::progress::{emit_progress, ProgressHandler};
use crate::readers::ReadOptions;
use crate::security::SecurityLimits;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

pub const DEFAULT_USER_AGENT: &str = concat!("folio/", env!("CARGO_PKG_VERSION"));

/// Size header consulted when the body is content-encoded, since
/// `Content-Length` then describes the encoded stream.
pub const FILE_SIZE_HEADER: &str = "x-file-size";

const OPERATION: &str = "Downloading";

#[derive(Debug, Clone)]
pub struct AcquireOptions {
    pub max_attempts: u32,
    /// Directory for the on-disk cache; `None` means the platform default.
    pub cache_dir: Option<PathBuf>,
    pub user_agent: String,
    pub security: SecurityLimits,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cache_dir: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            security: SecurityLimits::default(),
        }
    }
}

/// Provides the raw bytes of an archive.
#[allow(async_fn_in_trait)]
pub trait ContentLoader {
    /// Fetch `path`, reporting `(loaded, total)` per chunk. `Ok(None)` means
    /// the token fired mid-stream and the partial body was discarded.
    async fn load(
        &self,
        path: &str,
        progress: Option<&dyn ProgressHandler>,
        cancel: &CancelToken,
    ) -> Result<Option<Vec<u8>>, AcquireError>;
}

/// Streams archives over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpLoader {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl HttpLoader {
    pub fn new(user_agent: &str) -> Result<Self, AcquireError> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self {
            client,
            base_url: None,
        })
    }

    /// Resolve relative remote paths against `base`.
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = Some(base.into());
        self
    }

    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        match &self.base_url {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                path.trim_start_matches('/')
            ),
            None => path.to_string(),
        }
    }
}

/// Total body size as declared by the server.
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    let value = if headers.contains_key(CONTENT_ENCODING) {
        headers.get(FILE_SIZE_HEADER)?
    } else {
        headers.get(CONTENT_LENGTH)?
    };
    value.to_str().ok()?.trim().parse().ok()
}

impl ContentLoader for HttpLoader {
    async fn load(
        &self,
        path: &str,
        progress: Option<&dyn ProgressHandler>,
        cancel: &CancelToken,
    ) -> Result<Option<Vec<u8>>, AcquireError> {
        let url = self.url_for(path);
        let mut response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AcquireError::Http {
                status: status.as_u16(),
                url,
            });
        }

        let total = declared_length(response.headers())
            .ok_or_else(|| AcquireError::MissingLength(url.clone()))?;

        let mut data = Vec::with_capacity(total.min(64 * 1024 * 1024) as usize);
        while let Some(chunk) = response.chunk().await? {
            data.extend_from_slice(&chunk);
            emit_progress(progress, OPERATION, data.len() as u64, Some(total), None);
            if cancel.is_cancelled() {
                tracing::debug!("download of {url} cancelled at {} bytes", data.len());
                return Ok(None);
            }
        }
        Ok(Some(data))
    }
}

/// One archive to acquire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRequest {
    /// Stable remote path; also the cache key.
    pub remote_path: String,
    /// Byte size the caller expects the archive to have.
    pub expected_size: u64,
    /// Human-readable name recorded next to the cache entry.
    pub save_name: String,
}

impl ArchiveRequest {
    pub fn new(remote_path: impl Into<String>, expected_size: u64) -> Self {
        let remote_path = remote_path.into();
        let save_name = remote_path
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or(&remote_path)
            .to_string();
        Self {
            remote_path,
            expected_size,
            save_name,
        }
    }

    pub fn with_save_name(mut self, name: impl Into<String>) -> Self {
        self.save_name = name.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// A validated blob of exactly the expected size.
    Ready(Vec<u8>),
    /// The attempt bound ran out.
    Failed,
    /// The token fired; there is no result.
    Cancelled,
}

/// Cache-validate-retry machine over a loader and a cache.
#[derive(Debug)]
pub struct Acquirer<L, C> {
    loader: L,
    cache: C,
    max_attempts: u32,
}

impl<L: ContentLoader, C: ContentCache> Acquirer<L, C> {
    pub fn new(loader: L, cache: C) -> Self {
        Self {
            loader,
            cache,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run the machine to completion.
    pub async fn fetch(
        &self,
        request: &ArchiveRequest,
        progress: Option<&dyn ProgressHandler>,
        cancel: &CancelToken,
    ) -> AcquireOutcome {
        let path = request.remote_path.as_str();
        let mut attempts = 0;

        loop {
            if stopped(cancel, path) {
                return AcquireOutcome::Cancelled;
            }

            let cached = self.cache.get(path).await;
            if stopped(cancel, path) {
                return AcquireOutcome::Cancelled;
            }
            match cached {
                Ok(Some(data)) if data.len() as u64 == request.expected_size => {
                    tracing::info!("acquired {path} ({} bytes)", data.len());
                    return AcquireOutcome::Ready(data);
                }
                Ok(Some(data)) => {
                    tracing::warn!(
                        "cached {path} is {} bytes, expected {}; evicting",
                        data.len(),
                        request.expected_size
                    );
                    if let Err(e) = self.cache.remove(path).await {
                        tracing::warn!("could not evict {path}: {e}");
                    }
                    if stopped(cancel, path) {
                        return AcquireOutcome::Cancelled;
                    }
                }
                Ok(None) => tracing::debug!("cache miss for {path}"),
                Err(e) => tracing::warn!("cache lookup for {path} failed: {e}"),
            }

            if attempts >= self.max_attempts {
                tracing::warn!("giving up on {path} after {attempts} attempts");
                return AcquireOutcome::Failed;
            }
            attempts += 1;
            tracing::debug!("loading {path}, attempt {attempts}/{}", self.max_attempts);

            match self.loader.load(path, progress, cancel).await {
                Ok(Some(data)) => {
                    let stored = self.cache.put(path, &data, &request.save_name).await;
                    if stopped(cancel, path) {
                        return AcquireOutcome::Cancelled;
                    }
                    if let Err(e) = stored {
                        tracing::warn!("could not cache {path}: {e}");
                        // Validate the in-memory copy instead.
                        if data.len() as u64 == request.expected_size {
                            return AcquireOutcome::Ready(data);
                        }
                    }
                }
                Ok(None) => {
                    tracing::debug!("acquisition of {path} cancelled mid-stream");
                    return AcquireOutcome::Cancelled;
                }
                Err(e) => {
                    tracing::warn!(
                        "attempt {attempts}/{} for {path} failed: {e}",
                        self.max_attempts
                    );
                    if stopped(cancel, path) {
                        return AcquireOutcome::Cancelled;
                    }
                }
            }
        }
    }

    /// Callback form: exactly one of `on_success`/`on_failure` runs, unless
    /// the token fires, in which case neither does.
    pub async fn acquire(
        &self,
        request: &ArchiveRequest,
        progress: Option<&dyn ProgressHandler>,
        on_success: impl FnOnce(Vec<u8>),
        on_failure: impl FnOnce(),
        cancel: &CancelToken,
    ) {
        let outcome = self.fetch(request, progress, cancel).await;
        if cancel.is_cancelled() {
            return;
        }
        match outcome {
            AcquireOutcome::Ready(data) => on_success(data),
            AcquireOutcome::Failed => on_failure(),
            AcquireOutcome::Cancelled => {}
        }
    }

    /// Acquire a text archive and import it as a book. An import error is
    /// reported through `on_failure`.
    pub async fn acquire_book(
        &self,
        request: &ArchiveRequest,
        opts: &ReadOptions,
        progress: Option<&dyn ProgressHandler>,
        on_success: impl FnOnce(Book),
        on_failure: impl FnOnce(),
        cancel: &CancelToken,
    ) {
        let data = match self.fetch(request, progress, cancel).await {
            AcquireOutcome::Ready(data) if !cancel.is_cancelled() => data,
            AcquireOutcome::Failed if !cancel.is_cancelled() => return on_failure(),
            _ => return,
        };

        match crate::import_book_with(&data, opts) {
            Ok(mut book) => {
                if cancel.is_cancelled() {
                    book.destroy();
                    return;
                }
                on_success(book)
            }
            Err(_) if cancel.is_cancelled() => {}
            Err(e) => {
                tracing::warn!("could not import {}: {e}", request.remote_path);
                on_failure()
            }
        }
    }

    /// Acquire a zip of page images and extract it.
    pub async fn acquire_pages(
        &self,
        request: &ArchiveRequest,
        limits: &SecurityLimits,
        progress: Option<&dyn ProgressHandler>,
        on_success: impl FnOnce(ExtractedPages),
        on_failure: impl FnOnce(),
        cancel: &CancelToken,
    ) {
        let data = match self.fetch(request, progress, cancel).await {
            AcquireOutcome::Ready(data) if !cancel.is_cancelled() => data,
            AcquireOutcome::Failed if !cancel.is_cancelled() => return on_failure(),
            _ => return,
        };

        match extract::extract_images_with(&data, cancel, limits).await {
            Ok(mut pages) => {
                if cancel.is_cancelled() {
                    pages.destroy();
                    return;
                }
                on_success(pages)
            }
            Err(_) if cancel.is_cancelled() => {}
            Err(e) => {
                tracing::warn!("could not extract {}: {e}", request.remote_path);
                on_failure()
            }
        }
    }
}

/// True once the token has fired. Checked after every await in the machine.
fn stopped(cancel: &CancelToken, path: &str) -> bool {
    let cancelled = cancel.is_cancelled();
    if cancelled {
        tracing::debug!("acquisition of {path} cancelled");
    }
    cancelled
}
