use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::data::{Comic, Library};
use super::error::LibraryError;

/// Current layout of the library file
const CATALOG_VERSION: u32 = 1;

/// On-disk shape of the library: every comic with its page list and
/// reading position, but never any image data.
#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    version: u32,
    saved_at: DateTime<Utc>,
    comics: Vec<Comic>,
}

/// The LibraryStore persists the library as a single JSON document.
///
/// Writes go to a temporary sibling file which is synced and then renamed
/// over the target, so a reader never sees a half-written library.
pub struct LibraryStore {
    path: PathBuf,
    /// Set when an existing file could be neither loaded nor moved aside;
    /// saving would destroy it
    locked: AtomicBool,
}

impl LibraryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            locked: AtomicBool::new(false),
        }
    }

    /// Get the path to the library file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the store with the whole library.
    pub fn save(&self, library: &Library) -> Result<(), LibraryError> {
        if self.locked.load(Ordering::Acquire) {
            return Err(LibraryError::io(
                &self.path,
                std::io::Error::other("library file could not be loaded, refusing to overwrite it"),
            ));
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| LibraryError::io(parent, e))?;
        }

        let document = CatalogFile {
            version: CATALOG_VERSION,
            saved_at: Utc::now(),
            comics: library.comics().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| LibraryError::io(&self.path, std::io::Error::other(e)))?;

        let tmp_path = self.sibling("tmp");
        let written = write_synced(&tmp_path, json.as_bytes())
            .and_then(|()| fs::rename(&tmp_path, &self.path));

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(LibraryError::io(&self.path, e));
        }

        tracing::debug!(path = %self.path.display(), comics = library.len(), "library saved");
        Ok(())
    }

    /// Read the library back. Never fails:
    /// - no file yet: an empty library is written and returned
    /// - unreadable or unparseable file: it is moved aside to `<name>.bak`
    ///   and replaced; if it cannot be moved, the store refuses to save
    pub fn load(&self) -> Library {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "no library file, starting empty");
            return self.reset();
        }

        // Invalid UTF-8 surfaces as a parse error, same as malformed JSON
        let parsed = fs::read(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| serde_json::from_slice::<CatalogFile>(&bytes).map_err(|e| e.to_string()));

        match parsed {
            Ok(document) => {
                let library = Self::rebuild(document);
                tracing::info!(path = %self.path.display(), comics = library.len(), "library loaded");
                library
            }
            Err(reason) => self.set_aside(&reason),
        }
    }

    fn set_aside(&self, reason: &str) -> Library {
        let backup = self.sibling("bak");
        tracing::warn!(
            path = %self.path.display(),
            backup = %backup.display(),
            error = reason,
            "library file is unusable, moving it aside"
        );
        if let Err(e) = fs::rename(&self.path, &backup) {
            tracing::error!(error = %e, "could not move library file, it will not be overwritten");
            self.locked.store(true, Ordering::Release);
            return Library::new();
        }
        self.reset()
    }

    /// Write an empty library so later saves have a known-good base file
    fn reset(&self) -> Library {
        let library = Library::new();
        if let Err(e) = self.save(&library) {
            tracing::warn!(error = %e, "could not create library file");
        }
        library
    }

    fn rebuild(document: CatalogFile) -> Library {
        if document.version != CATALOG_VERSION {
            tracing::warn!(version = document.version, "library file has an unknown version");
        }

        let mut library = Library::new();
        for mut comic in document.comics {
            if comic.repair() {
                tracing::warn!(title = comic.title(), "repaired reading position of stored comic");
            }
            if let Err(e) = library.insert(comic) {
                tracing::warn!(error = %e, "dropping stored comic");
            }
        }
        library
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".");
        name.push(suffix);
        self.path.with_file_name(name)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

// Implement Debug for better error messages
impl std::fmt::Debug for LibraryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryStore")
            .field("path", &self.path)
            .field("locked", &self.locked.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::Page;
    use image::{DynamicImage, RgbImage};
    use tempfile::TempDir;

    fn comic(title: &str, pages: usize) -> Comic {
        let pages = (0..pages)
            .map(|id| Page::new(id, format!("{:03}.png", id), DynamicImage::ImageRgb8(RgbImage::new(2, 2))))
            .collect();
        Comic::new(title, format!("/comics/{}", title), pages)
    }

    fn sample_library() -> Library {
        let mut library = Library::new();
        let mut spiderman = comic("spiderman.cbz", 12);
        spiderman.set_current_page(11).unwrap();
        spiderman.mark_read();
        spiderman.set_current_page(4).unwrap();
        library.insert(spiderman).unwrap();
        library.insert(comic("batman.cbr", 3)).unwrap();
        library
    }

    #[test]
    fn test_load_missing_file_creates_empty_library() {
        let dir = TempDir::new().unwrap();
        let store = LibraryStore::new(dir.path().join("Library.json"));

        let library = store.load();

        assert!(library.is_empty());
        assert!(store.path().exists());
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let dir = TempDir::new().unwrap();
        let store = LibraryStore::new(dir.path().join("Library.json"));
        let library = sample_library();

        store.save(&library).unwrap();
        let loaded = store.load();

        assert_eq!(loaded, library);
        let spiderman = loaded.get("spiderman.cbz").unwrap();
        assert_eq!(spiderman.page_count(), 12);
        assert_eq!(spiderman.current_page(), 4);
        assert_eq!(spiderman.last_page_read(), 11);
        assert!(spiderman.pages().iter().all(|p| p.image.is_none()));
    }

    #[test]
    fn test_save_twice_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = LibraryStore::new(dir.path().join("Library.json"));
        let library = sample_library();

        store.save(&library).unwrap();
        let first = store.load();
        store.save(&library).unwrap();
        let second = store.load();

        assert_eq!(first, second);
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = LibraryStore::new(dir.path().join("Library.json"));

        store.save(&sample_library()).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["Library.json".to_string()]);
    }

    #[test]
    fn test_save_creates_directory() {
        let dir = TempDir::new().unwrap();
        let store = LibraryStore::new(dir.path().join("deep").join("nested").join("Library.json"));

        store.save(&sample_library()).unwrap();

        assert_eq!(store.load().len(), 2);
    }

    #[test]
    fn test_save_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        // The target's parent is a regular file, so nothing can be written there
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"x").unwrap();
        let store = LibraryStore::new(blocker.join("Library.json"));

        assert!(matches!(store.save(&sample_library()), Err(LibraryError::Io { .. })));
    }

    #[test]
    fn test_corrupt_file_is_moved_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Library.json");
        fs::write(&path, b"{ this is not json").unwrap();
        let store = LibraryStore::new(&path);

        let library = store.load();

        assert!(library.is_empty());
        let backup = dir.path().join("Library.json.bak");
        assert_eq!(fs::read(&backup).unwrap(), b"{ this is not json");
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_non_utf8_file_is_moved_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Library.json");
        fs::write(&path, b"\xff\xfe").unwrap();
        let store = LibraryStore::new(&path);

        assert!(store.load().is_empty());
        store.save(&sample_library()).unwrap();

        assert_eq!(fs::read(dir.path().join("Library.json.bak")).unwrap(), b"\xff\xfe");
        assert_eq!(store.load().len(), 2);
    }

    #[test]
    fn test_unreadable_file_is_moved_aside() {
        let dir = TempDir::new().unwrap();
        // Reading a directory fails with an io error rather than bad contents
        let path = dir.path().join("Library.json");
        fs::create_dir(&path).unwrap();
        let store = LibraryStore::new(&path);

        assert!(store.load().is_empty());

        assert!(dir.path().join("Library.json.bak").is_dir());
        assert!(path.is_file());
    }

    #[test]
    fn test_file_that_cannot_be_moved_is_never_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Library.json");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), b"x").unwrap();
        // A non-empty directory in the backup slot makes the rename fail
        let backup = dir.path().join("Library.json.bak");
        fs::create_dir(&backup).unwrap();
        fs::write(backup.join("occupied"), b"x").unwrap();
        let store = LibraryStore::new(&path);

        assert!(store.load().is_empty());

        assert!(matches!(store.save(&sample_library()), Err(LibraryError::Io { .. })));
        assert_eq!(fs::read(path.join("keep")).unwrap(), b"x");
    }

    #[test]
    fn test_store_is_human_readable_json() {
        let dir = TempDir::new().unwrap();
        let store = LibraryStore::new(dir.path().join("Library.json"));
        store.save(&sample_library()).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();

        assert_eq!(value["version"], serde_json::json!(CATALOG_VERSION));
        let comics = value["comics"].as_array().unwrap();
        assert_eq!(comics.len(), 2);
        assert_eq!(comics[1]["title"], "spiderman.cbz");
        assert_eq!(comics[1]["last_page_read"], 11);
        assert_eq!(comics[1]["pages"][0]["entry"], "000.png");
        assert!(comics[1]["pages"][0].get("image").is_none());
    }
}
