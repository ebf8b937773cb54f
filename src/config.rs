/// Reader configuration loaded from environment variables.
use std::num::NonZeroUsize;
use std::path::PathBuf;

use thiserror::Error;

/// Default library file, relative to the working directory
const DEFAULT_LIBRARY_FILE: &str = "Library.json";
const DEFAULT_PAGE_CACHE: usize = 32;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("COMIC_READER_PAGE_CACHE must be a positive integer, got {0:?}")]
    InvalidCacheSize(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    pub library_path: PathBuf,
    pub page_cache_capacity: NonZeroUsize,
}

impl ReaderConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - COMIC_READER_LIBRARY: library file (default: ./Library.json)
    /// - COMIC_READER_PAGE_CACHE: pages kept decoded for reloaded comics (default: 32)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let library_path = lookup("COMIC_READER_LIBRARY")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LIBRARY_FILE));

        let page_cache_capacity = match lookup("COMIC_READER_PAGE_CACHE") {
            Some(raw) => raw
                .trim()
                .parse::<NonZeroUsize>()
                .map_err(|_| ConfigError::InvalidCacheSize(raw))?,
            None => NonZeroUsize::new(DEFAULT_PAGE_CACHE).unwrap_or(NonZeroUsize::MIN),
        };

        Ok(Self {
            library_path,
            page_cache_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ReaderConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.library_path, PathBuf::from("Library.json"));
        assert_eq!(config.page_cache_capacity.get(), 32);
    }

    #[test]
    fn test_overrides() {
        let config = ReaderConfig::from_lookup(lookup(&[
            ("COMIC_READER_LIBRARY", "/data/comics.json"),
            ("COMIC_READER_PAGE_CACHE", "8"),
        ]))
        .unwrap();
        assert_eq!(config.library_path, PathBuf::from("/data/comics.json"));
        assert_eq!(config.page_cache_capacity.get(), 8);
    }

    #[test]
    fn test_invalid_cache_size() {
        for bad in ["0", "-3", "lots"] {
            let result = ReaderConfig::from_lookup(lookup(&[("COMIC_READER_PAGE_CACHE", bad)]));
            assert!(matches!(result, Err(ConfigError::InvalidCacheSize(_))));
        }
    }
}
