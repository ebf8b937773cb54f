/// Comic archive module
///
/// This module handles:
/// - Detecting the container format from the file extension
/// - Extracting and decoding page images from .cbz (zip) and .cbr (rar)
/// - Reloading single pages on demand
/// - Generating cover thumbnails

pub mod extractor;
pub mod format;
pub mod thumbnail;
