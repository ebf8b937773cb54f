use image::{imageops::FilterType, DynamicImage};

/// Size of generated cover thumbnails (fits within a square)
pub const THUMBNAIL_SIZE: u32 = 256;

/// Scale a cover page down for the library grid, keeping its aspect ratio.
/// Covers already smaller than the box are returned as-is.
pub fn cover_thumbnail(cover: &DynamicImage) -> DynamicImage {
    if cover.width() <= THUMBNAIL_SIZE && cover.height() <= THUMBNAIL_SIZE {
        return cover.clone();
    }

    cover.resize(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Lanczos3)
}
