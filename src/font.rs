//! Font faces, rasterization and shaping.
//!
//! The layout code only talks to fonts through the [`FaceService`] trait.
//! [`SwashFaces`] implements it on top of the `swash` crate.

use glam::IVec2;

use crate::{
    locale::{Direction, ScriptTag},
    texture::Bitmap,
    SmartString,
};

mod swash_faces;

pub use swash_faces::SwashFaces;

#[derive(Debug, thiserror::Error)]
#[error("failed to parse font as TTF/OTF font data")]
pub struct MalformedFont;

#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("font '{0}' is not available")]
    Unavailable(SmartString),
    #[error(transparent)]
    Malformed(#[from] MalformedFont),
}

/// Identifies a font opened by a [`FaceService`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FontId(u32);

impl FontId {
    pub const fn new(index: u32) -> Self {
        FontId(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

/// Vertical metrics of a face at some pixel size.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FaceMetrics {
    /// Distance from the baseline to the top of the face, in pixels.
    pub ascender: f32,
    /// Distance from the baseline to the bottom of the face. Not positive.
    pub descender: f32,
    pub line_gap: f32,
}

/// Placement of a rasterized glyph relative to the pen position.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct GlyphMetrics {
    /// Offset of the bitmap's left edge from the pen (x) and of its
    /// top edge above the baseline (y), in pixels.
    pub bearing: IVec2,
    /// Horizontal advance in 1/64 pixels.
    pub advance: i32,
}

impl GlyphMetrics {
    pub fn new(bearing: IVec2, advance: i32) -> Self {
        Self { bearing, advance }
    }
}

#[derive(Debug, Clone)]
pub struct RasterizedGlyph {
    pub bitmap: Bitmap,
    pub metrics: GlyphMetrics,
}

/// A glyph produced by shaping.
///
/// Distances are in 1/64 pixels.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ShapedGlyph {
    /// The font in the fallback list that provided the glyph.
    pub font: FontId,
    pub glyph_id: u32,
    /// Byte offset of the first character of the glyph's cluster.
    pub cluster: u32,
    pub x_advance: i32,
    pub y_advance: i32,
    pub x_offset: i32,
    pub y_offset: i32,
}

/// Opens fonts, rasterizes glyphs and shapes text.
pub trait FaceService {
    /// Opens the font called `name`. Opening an already open font
    /// returns the existing ID.
    fn open(&mut self, name: &str) -> Result<FontId, FontError>;

    /// Closes a font. Returns `false` if it was not open.
    fn close(&mut self, font: FontId) -> bool;

    fn face_metrics(&self, font: FontId, pixel_size: u32) -> Option<FaceMetrics>;

    /// Rasterizes one glyph. Returns `None` if the font has no such glyph.
    fn rasterize(&mut self, font: FontId, glyph_id: u32, pixel_size: u32)
        -> Option<RasterizedGlyph>;

    /// Shapes `text`, picking for each character the first font in `fonts`
    /// that supports it.
    ///
    /// Glyphs are returned in visual order: for right-to-left text the
    /// glyph of the last character comes first.
    fn shape(
        &mut self,
        fonts: &[FontId],
        text: &str,
        script: ScriptTag,
        direction: Direction,
        pixel_size: u32,
    ) -> Vec<ShapedGlyph>;
}
