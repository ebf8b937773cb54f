use std::path::Path;

use crate::state::error::LibraryError;

/// Container formats a comic archive can come in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// `.cbz`
    Zip,
    /// `.cbr`
    Rar,
}

impl ArchiveFormat {
    /// Detect the container from the file extension (case-insensitive).
    /// Contents are never sniffed: a `.cbz` holding rar data is corrupt, not rar.
    pub fn detect(path: &Path) -> Result<Self, LibraryError> {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase());

        match extension.as_deref() {
            Some("cbz") => Ok(Self::Zip),
            Some("cbr") => Ok(Self::Rar),
            _ => Err(LibraryError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Zip => "CBZ (zip)",
            Self::Rar => "CBR (rar)",
        }
    }
}

/// Derive a comic's title from its archive path.
///
/// The title is the raw file name, extension included (`batman.cbz`), and is
/// the comic's identity in the library: two archives with the same file name
/// in different folders are the same comic as far as the library is concerned.
/// File names that are not valid UTF-8 are refused, since a lossy conversion
/// could map two different files onto one title.
pub fn title_for(path: &Path) -> Result<String, LibraryError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .ok_or_else(|| LibraryError::UnsupportedFormat(path.to_path_buf()))
}

/// Page images are recognised by the entry's extension.
const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "bmp", "webp", "tif"];

pub fn is_image_entry(name: &str) -> bool {
    let file_name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    // macOS resource forks and dotfiles are never pages
    if file_name.starts_with('.') || name.starts_with("__MACOSX") {
        return false;
    }

    match file_name.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}
