/// Shared data structures for the application state
///
/// These structs represent the data model that flows between
/// the library store, the archive extractor and the UI layer.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use super::error::LibraryError;

/// Decoded raster data of one page, shared cheaply with the UI
pub type PageImage = Arc<DynamicImage>;

/// One page of a comic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Zero-based position within the comic, in archive entry order
    pub id: usize,
    /// Name of the archive entry the page was decoded from
    pub entry: String,
    /// Decoded image (never persisted; re-read from the archive on demand)
    #[serde(skip)]
    pub image: Option<PageImage>,
}

impl Page {
    pub fn new(id: usize, entry: impl Into<String>, image: DynamicImage) -> Self {
        Self {
            id,
            entry: entry.into(),
            image: Some(Arc::new(image)),
        }
    }
}

// Image bytes are not part of a page's identity.
impl PartialEq for Page {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.entry == other.entry
    }
}

/// One archive's extracted representation plus reading position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comic {
    title: String,
    source_path: PathBuf,
    pages: Vec<Page>,
    current_page: usize,
    last_page_read: usize,
    added_at: DateTime<Utc>,
}

impl Comic {
    /// Build a freshly opened comic positioned on its first page
    pub fn new(title: impl Into<String>, source_path: impl Into<PathBuf>, pages: Vec<Page>) -> Self {
        Self {
            title: title.into(),
            source_path: source_path.into(),
            pages,
            current_page: 0,
            last_page_read: 0,
            added_at: Utc::now(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn last_page_read(&self) -> usize {
        self.last_page_read
    }

    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    /// Move the reading position. `index` is signed so that navigation
    /// arithmetic below zero is reported rather than wrapped.
    pub(crate) fn set_current_page(&mut self, index: i64) -> Result<usize, LibraryError> {
        let page_count = self.pages.len();
        match usize::try_from(index) {
            Ok(index) if index < page_count => {
                self.current_page = index;
                Ok(index)
            }
            _ => Err(LibraryError::PageOutOfRange {
                title: self.title.clone(),
                index,
                page_count,
            }),
        }
    }

    /// Record the current page as the reading-progress marker
    pub(crate) fn mark_read(&mut self) {
        self.last_page_read = self.current_page;
    }

    /// Restore the invariants of a comic read back from the store.
    /// Returns true if anything had to be corrected.
    pub(crate) fn repair(&mut self) -> bool {
        let mut repaired = false;

        for (position, page) in self.pages.iter_mut().enumerate() {
            if page.id != position {
                page.id = position;
                repaired = true;
            }
        }

        let last = self.pages.len().saturating_sub(1);
        if self.current_page > last {
            self.current_page = last;
            repaired = true;
        }
        if self.last_page_read > last {
            self.last_page_read = last;
            repaired = true;
        }

        repaired
    }

    /// Read-only view handed to the UI layer
    pub fn snapshot(&self) -> ComicSnapshot {
        ComicSnapshot {
            title: self.title.clone(),
            source_path: self.source_path.clone(),
            page_count: self.pages.len(),
            current_page: self.current_page,
            last_page_read: self.last_page_read,
            added_at: self.added_at(),
        }
    }
}

/// Plain copy of a comic's display data, safe to hold outside the library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComicSnapshot {
    pub title: String,
    pub source_path: PathBuf,
    pub page_count: usize,
    pub current_page: usize,
    pub last_page_read: usize,
    pub added_at: DateTime<Utc>,
}

/// The set of comics known to the application, keyed by title
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Library {
    comics: BTreeMap<String, Comic>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.comics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comics.is_empty()
    }

    pub fn contains(&self, title: &str) -> bool {
        self.comics.contains_key(title)
    }

    /// Titles in stable (sorted) display order
    pub fn titles(&self) -> Vec<String> {
        self.comics.keys().cloned().collect()
    }

    pub fn comics(&self) -> impl Iterator<Item = &Comic> {
        self.comics.values()
    }

    pub fn get(&self, title: &str) -> Result<&Comic, LibraryError> {
        self.comics
            .get(title)
            .ok_or_else(|| LibraryError::NotFound(title.to_string()))
    }

    pub(crate) fn get_mut(&mut self, title: &str) -> Result<&mut Comic, LibraryError> {
        self.comics
            .get_mut(title)
            .ok_or_else(|| LibraryError::NotFound(title.to_string()))
    }

    /// Add a comic; titles are the identity key, so a second comic with
    /// the same title is refused.
    pub fn insert(&mut self, comic: Comic) -> Result<&Comic, LibraryError> {
        use std::collections::btree_map::Entry;

        match self.comics.entry(comic.title.clone()) {
            Entry::Occupied(_) => Err(LibraryError::DuplicateTitle(comic.title)),
            Entry::Vacant(slot) => Ok(&*slot.insert(comic)),
        }
    }

    pub fn remove(&mut self, title: &str) -> Result<Comic, LibraryError> {
        self.comics
            .remove(title)
            .ok_or_else(|| LibraryError::NotFound(title.to_string()))
    }
}
