use glam::{UVec2, Vec4};
use lru::LruCache;

use crate::{
    atlas::{AtlasError, AtlasSlot, DynamicAtlas},
    font::GlyphMetrics,
    key::GlyphKey,
    texture::Bitmap,
};

/// A glyph stored in the atlas.
#[derive(Debug, Clone, Copy)]
pub struct AtlasEntry {
    slot: AtlasSlot,
    uv: Vec4,
    metrics: GlyphMetrics,
    last_used: u32,
}

impl AtlasEntry {
    /// Position of the bitmap in the atlas, in pixels.
    pub fn pos(&self) -> UVec2 {
        self.slot.pos
    }

    /// Size of the bitmap, in pixels.
    pub fn size(&self) -> UVec2 {
        self.slot.size
    }

    /// Normalized texture coordinates `(u0, v0, u1, v1)`.
    pub fn uv(&self) -> Vec4 {
        self.uv
    }

    pub fn metrics(&self) -> GlyphMetrics {
        self.metrics
    }

    /// The generation in which the glyph was last looked up or inserted.
    pub fn last_used(&self) -> u32 {
        self.last_used
    }

    /// Whether the glyph has no pixels (e.g. a space).
    pub fn is_empty(&self) -> bool {
        self.slot.is_empty()
    }
}

/// A cache of rasterized glyphs stored in a fixed-size texture atlas.
///
/// Each glyph is uniquely identified by a [`GlyphKey`]. When the atlas runs
/// out of space, glyphs are evicted in least-recently-used order, but never
/// those used during the current generation: evicting them would destroy
/// data still referenced by buffers built this frame.
///
/// Every change to the atlas contents bumps the revision, which buffers
/// compare against to detect stale texture coordinates.
pub struct GlyphCache {
    atlas: DynamicAtlas,
    entries: LruCache<GlyphKey, AtlasEntry>,

    revision: u32,
    generation: u32,
}

impl GlyphCache {
    pub fn new(size: UVec2) -> Self {
        Self {
            atlas: DynamicAtlas::new(size),
            entries: LruCache::unbounded(), // bounded by atlas space instead
            revision: 0,
            generation: 0,
        }
    }

    pub fn size(&self) -> UVec2 {
        self.atlas.size()
    }

    /// The atlas contents, for upload.
    pub fn bitmap(&self) -> &Bitmap {
        self.atlas.bitmap()
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks for a glyph without refreshing its recency.
    pub fn contains(&self, key: &GlyphKey) -> bool {
        self.entries.contains(key)
    }

    /// Starts a new generation. Glyphs not used since become evictable.
    pub fn begin_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    /// Looks up a glyph, marking it as used in the current generation.
    pub fn lookup(&mut self, key: &GlyphKey) -> Option<AtlasEntry> {
        let generation = self.generation;
        let entry = self.entries.get_mut(key)?;
        entry.last_used = generation;
        Some(*entry)
    }

    /// Stores a rasterized glyph.
    ///
    /// If the atlas has no room, least recently used glyphs from earlier
    /// generations are evicted one at a time until the glyph fits. The revision
    /// grows by one if anything changed, however many glyphs were evicted.
    pub fn insert(
        &mut self,
        key: GlyphKey,
        bitmap: &Bitmap,
        metrics: GlyphMetrics,
    ) -> Result<AtlasEntry, AtlasError> {
        if let Some(entry) = self.lookup(&key) {
            return Ok(entry);
        }

        if !bitmap.is_empty() && !self.atlas.can_fit(bitmap.width(), bitmap.height()) {
            let size = self.atlas.size();
            return Err(AtlasError::TooLarge {
                width: bitmap.width(),
                height: bitmap.height(),
                atlas_width: size.x,
                atlas_height: size.y,
            });
        }

        let mut evicted = 0;
        let slot = loop {
            if let Some(slot) = self.atlas.insert(bitmap) {
                break Some(slot);
            }
            if !self.evict_oldest() {
                break None;
            }
            evicted += 1;
        };

        if slot.is_some() || evicted > 0 {
            self.revision = self.revision.wrapping_add(1);
        }
        if evicted > 0 {
            log::debug!(
                "Evicted {} glyphs from the atlas (revision {})",
                evicted,
                self.revision
            );
        }

        let slot = slot.ok_or(AtlasError::Full)?;
        let entry = AtlasEntry {
            slot,
            uv: slot.uv(self.atlas.size()),
            metrics,
            last_used: self.generation,
        };
        self.entries.put(key, entry);
        Ok(entry)
    }

    /// Drops every glyph.
    pub fn flush(&mut self) {
        log::debug!("Flushing {} glyphs from the atlas", self.entries.len());
        self.entries.clear();
        self.atlas.clear();
        self.revision = self.revision.wrapping_add(1);
    }

    fn evict_oldest(&mut self) -> bool {
        match self.entries.peek_lru() {
            Some((_, oldest)) if oldest.last_used != self.generation => {}
            _ => return false,
        }
        match self.entries.pop_lru() {
            Some((_, entry)) => {
                self.atlas.remove(&entry.slot);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::{ivec2, uvec2};

    use super::*;
    use crate::{font::FontId, key::GlyphFlags};

    fn key(code_point: u32) -> GlyphKey {
        GlyphKey::new(FontId::new(0), code_point, 16, GlyphFlags::Plain)
    }

    fn glyph(size: u32) -> (Bitmap, GlyphMetrics) {
        (
            Bitmap::from_data(size, size, vec![255; (size * size) as usize]).unwrap(),
            GlyphMetrics::new(ivec2(0, size as i32), size as i32 * 64),
        )
    }

    /// A 64x64 atlas holds exactly four 30x30 glyphs (32x32 with padding).
    fn full_cache() -> GlyphCache {
        let mut cache = GlyphCache::new(uvec2(64, 64));
        for c in 0..4 {
            let (bitmap, metrics) = glyph(30);
            cache.insert(key(c), &bitmap, metrics).unwrap();
        }
        cache
    }

    #[test]
    fn lookup_does_not_change_revision() {
        let mut cache = full_cache();
        let revision = cache.revision();
        assert!(cache.lookup(&key(0)).is_some());
        assert!(cache.lookup(&key(99)).is_none());
        assert_eq!(cache.revision(), revision);
    }

    #[test]
    fn each_insert_bumps_revision_once() {
        let mut cache = GlyphCache::new(uvec2(64, 64));
        assert_eq!(cache.revision(), 0);
        let (bitmap, metrics) = glyph(10);
        cache.insert(key(1), &bitmap, metrics).unwrap();
        assert_eq!(cache.revision(), 1);
        // Already cached: nothing changes.
        cache.insert(key(1), &bitmap, metrics).unwrap();
        assert_eq!(cache.revision(), 1);
    }

    #[test]
    fn glyphs_of_the_current_generation_are_not_evicted() {
        let mut cache = full_cache();
        let revision = cache.revision();
        let (bitmap, metrics) = glyph(30);
        assert_eq!(
            cache.insert(key(4), &bitmap, metrics).unwrap_err(),
            AtlasError::Full
        );
        assert_eq!(cache.revision(), revision);
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn evicts_least_recently_used_first() {
        let mut cache = full_cache();
        cache.begin_generation();
        // Refresh glyph 0 so glyph 1 becomes the oldest.
        cache.lookup(&key(0)).unwrap();
        let revision = cache.revision();

        let (bitmap, metrics) = glyph(30);
        cache.insert(key(4), &bitmap, metrics).unwrap();

        assert_eq!(cache.revision(), revision + 1);
        assert!(cache.contains(&key(0)));
        assert!(!cache.contains(&key(1)));
        assert!(cache.contains(&key(2)));
        assert!(cache.contains(&key(3)));
        assert!(cache.contains(&key(4)));
    }

    #[test]
    fn many_evictions_count_as_one_revision() {
        let mut cache = full_cache();
        cache.begin_generation();
        let revision = cache.revision();

        // Needs the whole atlas, so all four glyphs go.
        let (bitmap, metrics) = glyph(62);
        cache.insert(key(10), &bitmap, metrics).unwrap();
        assert_eq!(cache.revision(), revision + 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_insert_after_evicting_still_bumps_revision() {
        let mut cache = full_cache();
        cache.begin_generation();
        // Keep three glyphs alive in this generation.
        for c in 1..4 {
            cache.lookup(&key(c)).unwrap();
        }
        let revision = cache.revision();

        let (bitmap, metrics) = glyph(62);
        assert_eq!(
            cache.insert(key(10), &bitmap, metrics).unwrap_err(),
            AtlasError::Full
        );
        assert_eq!(cache.revision(), revision + 1);
        assert!(!cache.contains(&key(0)));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn oversized_glyphs_are_rejected() {
        let mut cache = GlyphCache::new(uvec2(16, 16));
        let (bitmap, metrics) = glyph(16);
        assert!(matches!(
            cache.insert(key(1), &bitmap, metrics),
            Err(AtlasError::TooLarge { .. })
        ));
        assert_eq!(cache.revision(), 0);
    }

    #[test]
    fn empty_glyphs_are_cached_without_space() {
        let mut cache = GlyphCache::new(uvec2(16, 16));
        let entry = cache
            .insert(key(' ' as u32), &Bitmap::new(0, 0), GlyphMetrics::new(ivec2(0, 0), 256))
            .unwrap();
        assert!(entry.is_empty());
        assert_eq!(entry.metrics().advance, 256);
        assert!(cache.lookup(&key(' ' as u32)).is_some());
    }

    #[test]
    fn flush_drops_everything() {
        let mut cache = full_cache();
        let revision = cache.revision();
        cache.flush();
        assert!(cache.is_empty());
        assert_eq!(cache.revision(), revision + 1);
        assert!(cache.bitmap().data().iter().all(|&p| p == 0));
    }

    #[test]
    fn random_workload_never_evicts_current_generation() {
        let mut cache = GlyphCache::new(uvec2(128, 128));
        let rng = fastrand::Rng::with_seed(7);
        for _frame in 0..20 {
            cache.begin_generation();
            let mut used = Vec::new();
            for _ in 0..12 {
                let code_point = rng.u32(0..40);
                let size = rng.u32(4..24);
                let (bitmap, metrics) = glyph(size);
                let revision = cache.revision();
                let k = GlyphKey::new(FontId::new(0), code_point, size, GlyphFlags::Plain);
                match cache.insert(k, &bitmap, metrics) {
                    Ok(_) => used.push(k),
                    Err(AtlasError::Full) => assert!(cache.revision() <= revision + 1),
                    Err(e) => panic!("unexpected error {}", e),
                }
                for k in &used {
                    assert!(cache.contains(k));
                }
            }
        }
    }
}
