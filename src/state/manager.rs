/// The command surface behind the library worker.
///
/// The LibraryManager owns the in-memory library (the source of truth),
/// the store it is persisted to, and the set of comics currently open in a
/// view. Every state-changing command writes the whole library to the store
/// before returning.
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::cache::PageCache;
use super::catalog::LibraryStore;
use super::data::{Comic, Library, Page, PageImage};
use super::error::LibraryError;
use crate::archive::format;

/// Result of a folder import operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportResult {
    pub imported_count: usize,
    /// Archives whose title is already in the library
    pub skipped_count: usize,
    pub failed_count: usize,
}

/// Where a page image can be had from
#[derive(Debug, Clone)]
pub enum PageLookup {
    Loaded(PageImage),
    Archive { source: PathBuf, entry: String },
}

pub struct LibraryManager {
    library: Library,
    store: LibraryStore,
    cache: PageCache,
    open_views: BTreeSet<String>,
}

impl LibraryManager {
    /// Load the library from its store (or start empty) and take ownership of both.
    pub fn load(store: LibraryStore, cache_capacity: NonZeroUsize) -> Self {
        let library = store.load();
        Self {
            library,
            store,
            cache: PageCache::new(cache_capacity),
            open_views: BTreeSet::new(),
        }
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn store(&self) -> &LibraryStore {
        &self.store
    }

    pub fn list_titles(&self) -> Vec<String> {
        self.library.titles()
    }

    pub fn get_comic(&self, title: &str) -> Result<&Comic, LibraryError> {
        self.library.get(title)
    }

    /// Validate an archive path before any extraction happens: the format
    /// must be supported and the derived title must be new.
    pub fn check_openable(&self, path: &Path) -> Result<String, LibraryError> {
        format::ArchiveFormat::detect(path)?;
        let title = format::title_for(path)?;
        if self.library.contains(&title) {
            return Err(LibraryError::DuplicateTitle(title));
        }
        Ok(title)
    }

    /// Add an extracted archive to the library and open it in a view.
    /// The path is checked again, since the library may have changed while
    /// the archive was being extracted.
    pub fn insert_extracted(&mut self, path: &Path, pages: Vec<Page>) -> Result<&Comic, LibraryError> {
        let title = self.check_openable(path)?;
        let source = absolute(path);

        self.library.insert(Comic::new(title.clone(), source, pages))?;
        self.open_views.insert(title.clone());
        tracing::info!(title = %title, "comic added to library");

        self.persist()?;
        self.library.get(&title)
    }

    /// Re-open a comic that is already in the library, at its stored position.
    pub fn show(&mut self, title: &str) -> Result<&Comic, LibraryError> {
        let comic = self.library.get(title)?;
        self.open_views.insert(title.to_string());
        Ok(comic)
    }

    /// Remove a comic and its pages for good.
    pub fn delete(&mut self, title: &str) -> Result<(), LibraryError> {
        self.library.remove(title)?;
        self.open_views.remove(title);
        self.cache.evict(title);
        tracing::info!(title, "comic deleted from library");

        self.persist()
    }

    /// Close a comic's view, recording its current page as read.
    pub fn close(&mut self, title: &str) -> Result<(), LibraryError> {
        self.library.get_mut(title)?.mark_read();
        self.open_views.remove(title);

        self.persist()
    }

    /// Close every open view. Called once, on shutdown.
    pub fn close_all(&mut self) -> Result<(), LibraryError> {
        for title in std::mem::take(&mut self.open_views) {
            if let Ok(comic) = self.library.get_mut(&title) {
                comic.mark_read();
            }
        }

        self.persist()
    }

    /// Move a comic to `index`. Out-of-range indices (negative included) are
    /// refused without touching the comic.
    pub fn set_page(&mut self, title: &str, index: i64) -> Result<usize, LibraryError> {
        let page = self.library.get_mut(title)?.set_current_page(index)?;
        tracing::debug!(title, page, "page changed");

        self.persist()?;
        Ok(page)
    }

    pub fn next(&mut self, title: &str) -> Result<usize, LibraryError> {
        let current = self.library.get(title)?.current_page() as i64;
        self.set_page(title, current + 1)
    }

    pub fn previous(&mut self, title: &str) -> Result<usize, LibraryError> {
        let current = self.library.get(title)?.current_page() as i64;
        self.set_page(title, current - 1)
    }

    pub fn first(&mut self, title: &str) -> Result<usize, LibraryError> {
        self.set_page(title, 0)
    }

    pub fn last(&mut self, title: &str) -> Result<usize, LibraryError> {
        let count = self.library.get(title)?.page_count() as i64;
        self.set_page(title, count - 1)
    }

    /// Jump to a page number as typed by a user (1-based).
    pub fn go_to_page_number(&mut self, title: &str, input: &str) -> Result<usize, LibraryError> {
        self.library.get(title)?;
        let number: i64 = input
            .trim()
            .parse()
            .map_err(|_| LibraryError::InvalidPageNumber(input.to_string()))?;
        self.set_page(title, number - 1)
    }

    /// Find a page image: pages extracted in this session are held in
    /// memory, pages restored from the store may be in the cache. Anything
    /// else has to be decoded from the source archive.
    pub fn locate_page(&mut self, title: &str, index: usize) -> Result<PageLookup, LibraryError> {
        let comic = self.library.get(title)?;
        let page = comic.pages().get(index).ok_or_else(|| LibraryError::PageOutOfRange {
            title: title.to_string(),
            index: index as i64,
            page_count: comic.page_count(),
        })?;

        if let Some(image) = &page.image {
            return Ok(PageLookup::Loaded(Arc::clone(image)));
        }
        if let Some(image) = self.cache.get(title, index) {
            return Ok(PageLookup::Loaded(image));
        }

        Ok(PageLookup::Archive {
            source: comic.source_path().to_path_buf(),
            entry: page.entry.clone(),
        })
    }

    /// Keep a page decoded from the source archive for later lookups.
    pub fn cache_page(&mut self, title: &str, index: usize, image: PageImage) {
        self.cache.put(title, index, image);
        tracing::debug!(title, page = index, cached = self.cache.len(), "page reloaded from archive");
    }

    /// Titles whose source archive no longer exists on disk
    pub fn missing_sources(&self) -> Vec<String> {
        self.library
            .comics()
            .filter(|comic| !comic.source_path().exists())
            .map(|comic| comic.title().to_string())
            .collect()
    }

    /// Write the whole library. On failure the in-memory change stands and
    /// the next successful save reconciles the store.
    fn persist(&self) -> Result<(), LibraryError> {
        self.store.save(&self.library).map_err(|e| {
            tracing::error!(error = %e, "library save failed");
            e
        })
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

// Implement Debug for better error messages
impl std::fmt::Debug for LibraryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryManager")
            .field("store", &self.store)
            .field("comics", &self.library.len())
            .field("open_views", &self.open_views)
            .finish()
    }
}
