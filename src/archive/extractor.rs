/// Archive extraction
///
/// Turns a `.cbz` or `.cbr` file into an ordered list of decoded pages.
/// Archive entry order is the reading order; entries are never re-sorted.
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use walkdir::WalkDir;
use zip::ZipArchive;

use super::format::{is_image_entry, ArchiveFormat};
use crate::state::data::Page;
use crate::state::error::LibraryError;

/// Raw bytes of one image entry, tagged with its entry name
type RawEntry = (String, Vec<u8>);

/// Extract and decode every page of an archive.
///
/// Pages get dense, zero-based ids in container entry order. Non-image
/// entries (metadata, directories) are skipped. Any entry that fails to
/// decode fails the whole extraction; nothing partial is returned.
pub fn extract(path: &Path) -> Result<Vec<Page>, LibraryError> {
    let format = ArchiveFormat::detect(path)?;

    let entries = match format {
        ArchiveFormat::Zip => zip_image_entries(path)?,
        ArchiveFormat::Rar => rar_image_entries(path, None)?,
    };

    if entries.is_empty() {
        return Err(LibraryError::corrupt(path, "archive holds no page images"));
    }

    let pages = entries
        .into_iter()
        .enumerate()
        .map(|(id, (name, bytes))| -> Result<Page, LibraryError> {
            let image = decode(path, &name, &bytes)?;
            Ok(Page::new(id, name, image))
        })
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(
        path = %path.display(),
        format = format.display_name(),
        pages = pages.len(),
        "extracted archive"
    );

    Ok(pages)
}

/// Decode a single entry of an archive, used to reload pages that were
/// not kept in memory.
pub fn read_page(path: &Path, entry: &str) -> Result<DynamicImage, LibraryError> {
    let bytes = match ArchiveFormat::detect(path)? {
        ArchiveFormat::Zip => {
            let mut archive = open_zip(path)?;
            let mut file = archive
                .by_name(entry)
                .map_err(|e| LibraryError::corrupt(path, format!("{}: {}", entry, e)))?;
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)
                .map_err(|e| LibraryError::corrupt(path, format!("{}: {}", entry, e)))?;
            bytes
        }
        ArchiveFormat::Rar => rar_image_entries(path, Some(entry))?
            .pop()
            .map(|(_, bytes)| bytes)
            .ok_or_else(|| LibraryError::corrupt(path, format!("entry {} is missing", entry)))?,
    };

    decode(path, entry, &bytes)
}

/// Find every comic archive below `dir`, in file-name order.
/// Unreadable directory entries are skipped.
pub fn scan_folder(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| ArchiveFormat::detect(path).is_ok())
        .collect()
}

fn decode(path: &Path, entry: &str, bytes: &[u8]) -> Result<DynamicImage, LibraryError> {
    image::load_from_memory(bytes)
        .map_err(|e| LibraryError::corrupt(path, format!("cannot decode {}: {}", entry, e)))
}

fn open_zip(path: &Path) -> Result<ZipArchive<File>, LibraryError> {
    let file = File::open(path).map_err(|e| LibraryError::io(path, e))?;
    ZipArchive::new(file).map_err(|e| LibraryError::corrupt(path, e))
}

fn zip_image_entries(path: &Path) -> Result<Vec<RawEntry>, LibraryError> {
    let mut archive = open_zip(path)?;
    let mut entries = Vec::new();

    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .map_err(|e| LibraryError::corrupt(path, e))?;

        if file.is_dir() || !is_image_entry(file.name()) {
            continue;
        }

        let name = file.name().to_string();
        // Declared sizes come from the archive and are not trusted for allocation
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| LibraryError::corrupt(path, format!("{}: {}", name, e)))?;
        entries.push((name, bytes));
    }

    Ok(entries)
}

/// Walk a rar archive in entry order. With `only` set, stops at the first
/// image entry of that name.
fn rar_image_entries(path: &Path, only: Option<&str>) -> Result<Vec<RawEntry>, LibraryError> {
    // unrar reports a missing file as a generic open failure
    std::fs::metadata(path).map_err(|e| LibraryError::io(path, e))?;

    let mut archive = unrar::Archive::new(path)
        .open_for_processing()
        .map_err(|e| LibraryError::corrupt(path, e))?;
    let mut entries = Vec::new();

    loop {
        let header = match archive
            .read_header()
            .map_err(|e| LibraryError::corrupt(path, e))?
        {
            Some(header) => header,
            None => break,
        };

        let name = header.entry().filename.to_string_lossy().replace('\\', "/");
        let wanted = header.entry().is_file()
            && is_image_entry(&name)
            && only.map_or(true, |only| only == name);

        archive = if wanted {
            let (bytes, rest) = header
                .read()
                .map_err(|e| LibraryError::corrupt(path, format!("{}: {}", name, e)))?;
            entries.push((name, bytes));
            if only.is_some() {
                break;
            }
            rest
        } else {
            header.skip().map_err(|e| LibraryError::corrupt(path, e))?
        };
    }

    Ok(entries)
}
