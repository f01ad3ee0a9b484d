//! Cache keys for glyphs and buffers.

use std::hash::{BuildHasher, Hash, Hasher};

use glam::IVec2;
use serde::{Deserialize, Serialize};

use crate::{font::FontId, FIXED_POINT_UNIT};

// Fixed seeds so that IDs are stable for the lifetime of a build.
const SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// A precomputed 64-bit hash of a string, used to key caches
/// by font name or text without storing the string itself.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct HashedId(u64);

impl HashedId {
    pub const NULL: HashedId = HashedId(0);

    pub fn of(s: &str) -> Self {
        Self::of_all([s])
    }

    /// Hashes a sequence of strings, e.g. a font fallback list.
    /// The order of the strings is significant.
    pub fn of_all<'a>(strings: impl IntoIterator<Item = &'a str>) -> Self {
        let mut hasher =
            ahash::RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]).build_hasher();
        for s in strings {
            s.hash(&mut hasher);
        }
        HashedId(hasher.finish())
    }

    pub fn from_raw(raw: u64) -> Self {
        HashedId(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Horizontal alignment of a laid out text block.
///
/// The justified variants stretch the space between words so that both ends
/// of each line touch the box edges. They differ in how the last line of a
/// paragraph is aligned, except for `JustifyAll` which justifies every line.
///
/// In right-to-left layout the alignment is mirrored, so `Left` behaves like
/// `Right` and vice versa.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TextAlignment {
    Left = 0,
    Right = 1,
    Center = 2,
    /// Justified, with the last line flushed left.
    Justify = 4,
    /// Justified, with the last line flushed right.
    RightJustify = 5,
    /// Justified, with the last line centered.
    CenterJustify = 6,
    /// Every line is justified, including the last line of a paragraph.
    JustifyAll = 7,
}

impl Default for TextAlignment {
    fn default() -> Self {
        TextAlignment::Left
    }
}

impl TextAlignment {
    pub fn is_justified(self) -> bool {
        (self as u8) & (TextAlignment::Justify as u8) != 0
    }

    /// Alignment applied to the last line of a paragraph.
    pub fn last_line_alignment(self) -> TextAlignment {
        match self {
            TextAlignment::Justify => TextAlignment::Left,
            TextAlignment::RightJustify => TextAlignment::Right,
            TextAlignment::CenterJustify => TextAlignment::Center,
            other => other,
        }
    }

    /// Mirrors the alignment for right-to-left layout.
    pub fn flipped(self) -> TextAlignment {
        match self {
            TextAlignment::Left => TextAlignment::Right,
            TextAlignment::Right => TextAlignment::Left,
            TextAlignment::Justify => TextAlignment::RightJustify,
            TextAlignment::RightJustify => TextAlignment::Justify,
            other => other,
        }
    }
}

/// Controls how glyph bitmaps are produced before they enter the atlas.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GlyphFlags {
    /// Plain coverage bitmaps.
    Plain,
    /// Distance field covering the outside of the outline only.
    OuterSdf,
    /// Distance field covering the inside of the outline only.
    InnerSdf,
    /// Distance field on both sides of the outline.
    Sdf,
}

impl Default for GlyphFlags {
    fn default() -> Self {
        GlyphFlags::Plain
    }
}

impl GlyphFlags {
    pub fn is_sdf(self) -> bool {
        !matches!(self, GlyphFlags::Plain)
    }
}

/// Identifies one rasterized glyph in the atlas.
///
/// `code_point` is the glyph index produced by the shaper for `font`,
/// not a Unicode scalar value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct GlyphKey {
    pub font: FontId,
    pub code_point: u32,
    pub pixel_size: u32,
    pub flags: GlyphFlags,
}

impl GlyphKey {
    pub fn new(font: FontId, code_point: u32, pixel_size: u32, flags: GlyphFlags) -> Self {
        Self {
            font,
            code_point,
            pixel_size,
            flags,
        }
    }
}

/// Parameters identifying a cached [`Buffer`](crate::Buffer).
///
/// Two keys are equal only if every field is equal, so texts laid out
/// into different boxes or with different alignments never share a buffer.
#[derive(Copy, Clone, Debug)]
pub struct BufferKey {
    font_id: HashedId,
    text_id: HashedId,
    font_size: f32,
    box_size: IVec2,
    alignment: TextAlignment,
    glyph_flags: GlyphFlags,
    caret_info: bool,
}

impl BufferKey {
    /// Creates a key for `text` rendered with the font (or font list)
    /// identified by `font_id`. The box is empty, so the text is laid out
    /// on a single line.
    pub fn new(font_id: HashedId, text: &str, font_size: f32) -> Self {
        Self::from_ids(font_id, HashedId::of(text), font_size)
    }

    pub fn from_ids(font_id: HashedId, text_id: HashedId, font_size: f32) -> Self {
        Self {
            font_id,
            text_id,
            font_size,
            box_size: IVec2::ZERO,
            alignment: TextAlignment::Left,
            glyph_flags: GlyphFlags::Plain,
            caret_info: false,
        }
    }

    /// Sets the requested box size in pixels. A width of zero disables wrapping;
    /// a height of zero leaves the height unconstrained.
    pub fn with_box_size(mut self, box_size: IVec2) -> Self {
        self.box_size = box_size;
        self
    }

    pub fn with_alignment(mut self, alignment: TextAlignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_glyph_flags(mut self, glyph_flags: GlyphFlags) -> Self {
        self.glyph_flags = glyph_flags;
        self
    }

    pub fn with_caret_info(mut self, caret_info: bool) -> Self {
        self.caret_info = caret_info;
        self
    }

    pub fn font_id(&self) -> HashedId {
        self.font_id
    }

    pub fn text_id(&self) -> HashedId {
        self.text_id
    }

    pub fn font_size(&self) -> f32 {
        self.font_size
    }

    pub fn box_size(&self) -> IVec2 {
        self.box_size
    }

    pub fn alignment(&self) -> TextAlignment {
        self.alignment
    }

    pub fn glyph_flags(&self) -> GlyphFlags {
        self.glyph_flags
    }

    pub fn caret_info(&self) -> bool {
        self.caret_info
    }

    /// The fixed line length in 1/64 pixels.
    ///
    /// Left and centered text is measured by the layout itself and reports zero.
    /// Every other alignment uses the full box width.
    pub fn line_length(&self) -> i32 {
        match self.alignment {
            TextAlignment::Left | TextAlignment::Center => 0,
            _ => self.box_size.x * FIXED_POINT_UNIT,
        }
    }

    /// Whether the text may wrap onto multiple lines.
    pub fn is_multi_line(&self) -> bool {
        if self.box_size.x == 0 {
            return false;
        }
        if self.alignment != TextAlignment::Left {
            return true;
        }
        self.box_size.y == 0 || self.box_size.y as f32 > self.font_size
    }
}

impl PartialEq for BufferKey {
    fn eq(&self, other: &Self) -> bool {
        self.font_id == other.font_id
            && self.text_id == other.text_id
            && self.font_size.to_bits() == other.font_size.to_bits()
            && self.box_size == other.box_size
            && self.alignment == other.alignment
            && self.glyph_flags == other.glyph_flags
            && self.caret_info == other.caret_info
    }
}

impl Eq for BufferKey {}

impl Hash for BufferKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.font_id.hash(state);
        self.text_id.hash(state);
        self.font_size.to_bits().hash(state);
        self.box_size.x.hash(state);
        self.box_size.y.hash(state);
        self.alignment.hash(state);
        self.glyph_flags.hash(state);
        self.caret_info.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;

    use glam::ivec2;

    use super::*;

    fn key(width: i32, height: i32, size: f32, alignment: TextAlignment) -> BufferKey {
        BufferKey::new(HashedId::of("font"), "text", size)
            .with_box_size(ivec2(width, height))
            .with_alignment(alignment)
    }

    fn hash_of(key: &BufferKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn line_length_policy() {
        assert_eq!(key(100, 0, 20., TextAlignment::Left).line_length(), 0);
        assert_eq!(key(100, 0, 20., TextAlignment::Center).line_length(), 0);
        assert_eq!(key(100, 0, 20., TextAlignment::Justify).line_length(), 100 * 64);
        assert_eq!(key(100, 0, 20., TextAlignment::Right).line_length(), 100 * 64);
        assert_eq!(key(100, 0, 20., TextAlignment::JustifyAll).line_length(), 100 * 64);
    }

    #[test]
    fn multi_line_policy() {
        assert!(!key(0, 50, 20., TextAlignment::Justify).is_multi_line());
        assert!(key(100, 10, 20., TextAlignment::Right).is_multi_line());
        assert!(!key(100, 10, 20., TextAlignment::Left).is_multi_line());
        assert!(!key(100, 20, 20., TextAlignment::Left).is_multi_line());
        assert!(key(100, 30, 20., TextAlignment::Left).is_multi_line());
        assert!(key(100, 0, 20., TextAlignment::Left).is_multi_line());
    }

    #[test]
    fn keys_compare_field_wise() {
        let a = key(100, 30, 20., TextAlignment::Left);
        let b = key(100, 30, 20., TextAlignment::Left);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        assert_ne!(a, key(101, 30, 20., TextAlignment::Left));
        assert_ne!(a, key(100, 31, 20., TextAlignment::Left));
        assert_ne!(a, key(100, 30, 20., TextAlignment::Center));
        assert_ne!(a, key(100, 30, 20.5, TextAlignment::Left));
        assert_ne!(a, a.with_caret_info(true));
        assert_ne!(a, a.with_glyph_flags(GlyphFlags::Sdf));
    }

    #[test]
    fn hashed_ids_are_stable() {
        assert_eq!(HashedId::of("Roboto"), HashedId::of("Roboto"));
        assert_ne!(HashedId::of("Roboto"), HashedId::of("Noto"));
        assert_ne!(
            HashedId::of_all(["a", "b"]),
            HashedId::of_all(["b", "a"])
        );
    }

    #[test]
    fn alignment_helpers() {
        assert!(!TextAlignment::Right.is_justified());
        assert!(TextAlignment::CenterJustify.is_justified());
        assert_eq!(TextAlignment::Left.flipped(), TextAlignment::Right);
        assert_eq!(TextAlignment::Justify.flipped(), TextAlignment::RightJustify);
        assert_eq!(TextAlignment::Center.flipped(), TextAlignment::Center);
        assert_eq!(
            TextAlignment::RightJustify.last_line_alignment(),
            TextAlignment::Right
        );
        assert_eq!(
            TextAlignment::JustifyAll.last_line_alignment(),
            TextAlignment::JustifyAll
        );
    }
}
