//! Security hardening: ZIP bomb protection, entry limits, nesting limits.

use serde::{Deserialize, Serialize};

use crate::error::SecurityError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityLimits {
    /// Maximum decompression ratio before flagging as ZIP bomb.
    pub max_compression_ratio: u64,
    /// Maximum number of entries allowed in an archive.
    pub max_entry_count: u64,
    /// Maximum uncompressed size of a single archive entry in bytes.
    pub max_entry_size_bytes: u64,
    /// Maximum XML nesting depth.
    pub max_nesting_depth: u32,
}

impl Default for SecurityLimits {
    fn default() -> Self {
        Self {
            max_compression_ratio: 100,
            max_entry_count: 10_000,
            max_entry_size_bytes: 200 * 1024 * 1024, // 200 MB
            max_nesting_depth: 256,
        }
    }
}

/// Check if a decompression ratio exceeds the configured limit (ZIP bomb detection).
pub fn check_compression_ratio(
    compressed_size: u64,
    uncompressed_size: u64,
    limits: &SecurityLimits,
) -> Result<(), SecurityError> {
    if compressed_size == 0 {
        if uncompressed_size > 0 {
            return Err(SecurityError::ZipBomb {
                ratio: u64::MAX,
                limit: limits.max_compression_ratio,
            });
        }
        return Ok(());
    }

    let ratio = uncompressed_size / compressed_size;
    if ratio > limits.max_compression_ratio {
        return Err(SecurityError::ZipBomb {
            ratio,
            limit: limits.max_compression_ratio,
        });
    }

    Ok(())
}

/// Check if the number of entries in an archive exceeds the limit.
pub fn check_entry_count(count: u64, limits: &SecurityLimits) -> Result<(), SecurityError> {
    if count > limits.max_entry_count {
        return Err(SecurityError::TooManyEntries {
            count,
            limit: limits.max_entry_count,
        });
    }
    Ok(())
}

/// Check if a single entry exceeds the size limit.
pub fn check_entry_size(
    name: &str,
    size_bytes: u64,
    limits: &SecurityLimits,
) -> Result<(), SecurityError> {
    if size_bytes > limits.max_entry_size_bytes {
        return Err(SecurityError::OversizedEntry {
            name: name.to_string(),
            size_mb: size_bytes / (1024 * 1024),
            limit_mb: limits.max_entry_size_bytes / (1024 * 1024),
        });
    }
    Ok(())
}

/// Run every per-entry check for one archive entry.
pub fn check_entry(
    name: &str,
    compressed_size: u64,
    uncompressed_size: u64,
    limits: &SecurityLimits,
) -> Result<(), SecurityError> {
    check_entry_size(name, uncompressed_size, limits)?;
    check_compression_ratio(compressed_size, uncompressed_size, limits)
}

/// Check if XML nesting depth exceeds the limit.
pub fn check_nesting_depth(depth: u32, limits: &SecurityLimits) -> Result<(), SecurityError> {
    if depth > limits.max_nesting_depth {
        return Err(SecurityError::ExcessiveNesting {
            depth,
            limit: limits.max_nesting_depth,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_ratio_ok() {
        let limits = SecurityLimits::default();
        assert!(check_compression_ratio(1000, 50_000, &limits).is_ok()); // 50:1
    }

    #[test]
    fn test_compression_ratio_bomb() {
        let limits = SecurityLimits::default();
        assert!(check_compression_ratio(100, 100_000, &limits).is_err()); // 1000:1
    }

    #[test]
    fn test_compression_ratio_zero_compressed() {
        let limits = SecurityLimits::default();
        assert!(check_compression_ratio(0, 0, &limits).is_ok());
        assert!(check_compression_ratio(0, 100, &limits).is_err());
    }

    #[test]
    fn test_entry_count_ok() {
        let limits = SecurityLimits::default();
        assert!(check_entry_count(100, &limits).is_ok());
        assert!(check_entry_count(10_000, &limits).is_ok());
    }

    #[test]
    fn test_entry_count_exceeded() {
        let limits = SecurityLimits::default();
        assert!(check_entry_count(10_001, &limits).is_err());
    }

    #[test]
    fn test_entry_size_exceeded() {
        let limits = SecurityLimits::default();
        let size = 201 * 1024 * 1024; // 201 MB
        let err = check_entry_size("001.png", size, &limits).unwrap_err();
        match err {
            SecurityError::OversizedEntry { name, size_mb, .. } => {
                assert_eq!(name, "001.png");
                assert_eq!(size_mb, 201);
            }
            _ => panic!("Expected OversizedEntry error"),
        }
    }

    #[test]
    fn test_check_entry_combines_checks() {
        let limits = SecurityLimits::default();
        assert!(check_entry("page.jpg", 900, 1000, &limits).is_ok());
        assert!(check_entry("bomb.jpg", 1, 1_000_000, &limits).is_err());
    }

    #[test]
    fn test_nesting_depth() {
        let limits = SecurityLimits::default();
        assert!(check_nesting_depth(256, &limits).is_ok());
        assert!(check_nesting_depth(257, &limits).is_err());
    }
}
