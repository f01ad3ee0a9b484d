use glam::{uvec2, UVec2};
use guillotiere::{AtlasAllocator, Size};

use super::AtlasSlot;
use crate::texture::Bitmap;

/// Padding on each side of a stored image.
const PADDING: u32 = 1;

/// A fixed-size texture atlas that supports adding and removing
/// images on demand. Space from removed images can be reused.
///
/// A padding of two pixels is inserted between stitched images
/// to avoid bleeding. The atlas keeps a CPU copy of its contents;
/// uploading it is left to a [`TextureBackend`](crate::TextureBackend).
pub struct DynamicAtlas {
    allocator: AtlasAllocator,
    bitmap: Bitmap,
}

impl DynamicAtlas {
    /// Creates an atlas. Each dimension is rounded up to the next power of two.
    pub fn new(size: UVec2) -> Self {
        let width = size.x.max(1).next_power_of_two();
        let height = size.y.max(1).next_power_of_two();
        log::info!("Creating {}x{} glyph atlas", width, height);
        Self {
            allocator: AtlasAllocator::new(Size::new(width as i32, height as i32)),
            bitmap: Bitmap::new(width, height),
        }
    }

    pub fn size(&self) -> UVec2 {
        uvec2(self.bitmap.width(), self.bitmap.height())
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    /// Whether an image of this size could be stored in an empty atlas.
    pub fn can_fit(&self, width: u32, height: u32) -> bool {
        width + PADDING * 2 <= self.bitmap.width() && height + PADDING * 2 <= self.bitmap.height()
    }

    /// Inserts an image, returning its slot, or `None` if there
    /// is currently no free space large enough.
    ///
    /// Empty images take no space.
    pub fn insert(&mut self, image: &Bitmap) -> Option<AtlasSlot> {
        if image.is_empty() {
            return Some(AtlasSlot::empty());
        }

        let size = Size::new(
            (image.width() + PADDING * 2) as i32,
            (image.height() + PADDING * 2) as i32,
        );
        let allocation = self.allocator.allocate(size)?;

        let pos = uvec2(
            allocation.rectangle.min.x as u32 + PADDING,
            allocation.rectangle.min.y as u32 + PADDING,
        );
        self.bitmap.copy_from(image, pos.x as i32, pos.y as i32);

        Some(AtlasSlot {
            pos,
            size: uvec2(image.width(), image.height()),
            id: Some(allocation.id),
        })
    }

    /// Frees a slot, allowing its space to be reused.
    pub fn remove(&mut self, slot: &AtlasSlot) {
        if let Some(id) = slot.alloc_id() {
            self.allocator.deallocate(id);
            self.bitmap
                .clear_rect(slot.pos.x, slot.pos.y, slot.size.x, slot.size.y);
        }
    }

    /// Removes every image.
    pub fn clear(&mut self) {
        self.allocator.clear();
        self.bitmap.clear();
    }
}
