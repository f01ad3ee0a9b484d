//! Texture atlas storing rasterized glyphs in a single bitmap.

use glam::{vec4, UVec2, Vec4};
use guillotiere::AllocId;

mod dynamic;

pub use dynamic::DynamicAtlas;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AtlasError {
    /// No free space is left, even after evicting every glyph not
    /// used in the current generation.
    #[error("glyph atlas is full")]
    Full,
    /// The glyph is larger than the whole atlas.
    #[error("{width}x{height} glyph does not fit in a {atlas_width}x{atlas_height} atlas")]
    TooLarge {
        width: u32,
        height: u32,
        atlas_width: u32,
        atlas_height: u32,
    },
}

/// Placement of an image inside an atlas, excluding padding.
#[derive(Debug, Clone, Copy)]
pub struct AtlasSlot {
    pub pos: UVec2,
    pub size: UVec2,
    id: Option<AllocId>,
}

impl AtlasSlot {
    /// A slot for a zero-sized image. It occupies no space.
    pub fn empty() -> Self {
        Self {
            pos: UVec2::ZERO,
            size: UVec2::ZERO,
            id: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none()
    }

    /// Normalized texture coordinates `(u0, v0, u1, v1)` of the slot
    /// within an atlas of `atlas_size`.
    pub fn uv(&self, atlas_size: UVec2) -> Vec4 {
        let w = atlas_size.x as f32;
        let h = atlas_size.y as f32;
        vec4(
            self.pos.x as f32 / w,
            self.pos.y as f32 / h,
            (self.pos.x + self.size.x) as f32 / w,
            (self.pos.y + self.size.y) as f32 / h,
        )
    }

    pub(crate) fn alloc_id(&self) -> Option<AllocId> {
        self.id
    }
}
