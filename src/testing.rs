/// Fixture builders shared by the unit tests.
///
/// Zip archives are generated on the fly. There is no rar writer crate, so
/// rar coverage uses one small archive checked in under `fixtures/`.
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// A tiny PNG whose pixels all carry `shade` in the red channel, so a test
/// can tell which page it is looking at after decoding.
pub fn png_bytes(shade: u8) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 6, Rgb([shade, 0, 0])));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Red channel of the top-left pixel
pub fn shade_of(image: &DynamicImage) -> u8 {
    image.to_rgb8().get_pixel(0, 0)[0]
}

/// Write a zip archive with the given entries, in the given order.
pub fn write_archive(dir: &Path, name: &str, entries: &[(&str, Vec<u8>)]) -> PathBuf {
    let path = dir.join(name);
    let mut zip = ZipWriter::new(File::create(&path).unwrap());
    let options = SimpleFileOptions::default();

    for (entry, bytes) in entries {
        if entry.ends_with('/') {
            zip.add_directory(*entry, options).unwrap();
        } else {
            zip.start_file(*entry, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
    }

    zip.finish().unwrap();
    path
}

/// Write a `.cbz` with a metadata file followed by `pages` PNG pages;
/// page `n` has shade `n`.
pub fn write_cbz(dir: &Path, name: &str, pages: usize) -> PathBuf {
    let mut entries: Vec<(String, Vec<u8>)> =
        vec![("ComicInfo.xml".to_string(), b"<ComicInfo/>".to_vec())];
    for page in 0..pages {
        entries.push((format!("{:03}.png", page), png_bytes(page as u8)));
    }

    let borrowed: Vec<(&str, Vec<u8>)> = entries
        .iter()
        .map(|(entry, bytes)| (entry.as_str(), bytes.clone()))
        .collect();
    write_archive(dir, name, &borrowed)
}

/// `fixtures/pages.cbr`: a stored (uncompressed) rar holding, in order,
/// `z_cover.png` (shade 10), `ComicInfo.xml`, `a.png` (20), `m.png` (30).
pub fn rar_fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join("pages.cbr")
}
