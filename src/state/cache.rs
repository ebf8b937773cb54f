use std::num::NonZeroUsize;

use lru::LruCache;

use super::data::PageImage;

/// Pages decoded on demand for comics whose images are not held in memory
/// (everything restored from the library file). Keyed by (title, page id).
pub struct PageCache {
    pages: LruCache<(String, usize), PageImage>,
}

impl PageCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            pages: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, title: &str, page: usize) -> Option<PageImage> {
        self.pages.get(&(title.to_string(), page)).cloned()
    }

    pub fn put(&mut self, title: &str, page: usize, image: PageImage) {
        self.pages.put((title.to_string(), page), image);
    }

    /// Drop every cached page of one comic
    pub fn evict(&mut self, title: &str) {
        let keys: Vec<(String, usize)> = self
            .pages
            .iter()
            .filter(|((cached, _), _)| cached == title)
            .map(|(key, _)| key.clone())
            .collect();

        for key in keys {
            self.pages.pop(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};
    use std::sync::Arc;

    fn image() -> PageImage {
        Arc::new(DynamicImage::ImageRgb8(RgbImage::new(1, 1)))
    }

    #[test]
    fn test_cache_is_bounded() {
        let mut cache = PageCache::new(NonZeroUsize::new(2).unwrap());
        cache.put("a.cbz", 0, image());
        cache.put("a.cbz", 1, image());
        cache.put("a.cbz", 2, image());

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a.cbz", 0).is_none());
        assert!(cache.get("a.cbz", 2).is_some());
    }

    #[test]
    fn test_evict_only_touches_one_comic() {
        let mut cache = PageCache::new(NonZeroUsize::new(8).unwrap());
        cache.put("a.cbz", 0, image());
        cache.put("a.cbz", 1, image());
        cache.put("b.cbz", 0, image());

        cache.evict("a.cbz");

        assert_eq!(cache.len(), 1);
        assert!(cache.get("b.cbz", 0).is_some());
    }
}
