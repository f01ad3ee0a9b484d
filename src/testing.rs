//! Deterministic services for tests.

use glam::ivec2;

use crate::{
    font::{FaceMetrics, FaceService, FontError, FontId, GlyphMetrics, RasterizedGlyph, ShapedGlyph},
    locale::{Direction, ScriptTag},
    text::{BreakClass, LineBreaker},
    texture::{Bitmap, PassId, TextureBackend},
    FIXED_POINT_UNIT,
};

/// Glyph ID of the "fi" ligature.
pub const FI_LIGATURE: u32 = 0xFB01;

/// A monospace face where every glyph is half as wide as the pixel size.
///
/// Two fonts exist: `mono` (no Hebrew letters) and `fallback` (everything).
/// The glyph ID of a character is its scalar value.
#[derive(Debug, Default)]
pub struct MockFaces {
    closed: Vec<FontId>,
    pub ligatures: bool,
    pub missing: Vec<u32>,
    pub shape_calls: usize,
    pub raster_calls: usize,
}

impl MockFaces {
    pub const MONO: FontId = FontId::new(0);
    pub const FALLBACK: FontId = FontId::new(1);

    pub fn new() -> Self {
        Self::default()
    }

    /// Shapes "fi" into a single ligature glyph.
    pub fn with_ligatures() -> Self {
        Self {
            ligatures: true,
            ..Self::default()
        }
    }

    /// Fonts report no glyph for these code points.
    pub fn with_missing(code_points: &[u32]) -> Self {
        Self {
            missing: code_points.to_vec(),
            ..Self::default()
        }
    }

    fn supports(&self, font: FontId, c: char) -> bool {
        if self.closed.contains(&font) {
            return false;
        }
        font == Self::FALLBACK || !('\u{05D0}'..='\u{05EA}').contains(&c)
    }

    pub fn advance(pixel_size: u32) -> i32 {
        pixel_size as i32 / 2 * FIXED_POINT_UNIT
    }
}

impl FaceService for MockFaces {
    fn open(&mut self, name: &str) -> Result<FontId, FontError> {
        let id = match name {
            "mono" => Self::MONO,
            "fallback" => Self::FALLBACK,
            _ => return Err(FontError::Unavailable(name.into())),
        };
        self.closed.retain(|&f| f != id);
        Ok(id)
    }

    fn close(&mut self, font: FontId) -> bool {
        if font.index() > 1 || self.closed.contains(&font) {
            return false;
        }
        self.closed.push(font);
        true
    }

    fn face_metrics(&self, font: FontId, pixel_size: u32) -> Option<FaceMetrics> {
        if font.index() > 1 || self.closed.contains(&font) {
            return None;
        }
        Some(FaceMetrics {
            ascender: pixel_size as f32 * 0.75,
            descender: pixel_size as f32 * -0.25,
            line_gap: 0.,
        })
    }

    fn rasterize(
        &mut self,
        font: FontId,
        glyph_id: u32,
        pixel_size: u32,
    ) -> Option<RasterizedGlyph> {
        if font.index() > 1 || self.missing.contains(&glyph_id) {
            return None;
        }
        self.raster_calls += 1;

        let mut advance = Self::advance(pixel_size);
        if glyph_id == FI_LIGATURE {
            advance *= 2;
        }
        let is_space = char::from_u32(glyph_id).map_or(false, char::is_whitespace);
        if is_space {
            return Some(RasterizedGlyph {
                bitmap: Bitmap::new(0, 0),
                metrics: GlyphMetrics::new(ivec2(0, 0), advance),
            });
        }

        let width = (advance / FIXED_POINT_UNIT) as u32;
        let height = (pixel_size as f32 * 0.7).round() as u32;
        let data = vec![255; (width * height) as usize];
        Some(RasterizedGlyph {
            bitmap: Bitmap::from_data(width, height, data).ok()?,
            metrics: GlyphMetrics::new(ivec2(0, height as i32), advance),
        })
    }

    fn shape(
        &mut self,
        fonts: &[FontId],
        text: &str,
        _script: ScriptTag,
        direction: Direction,
        pixel_size: u32,
    ) -> Vec<ShapedGlyph> {
        self.shape_calls += 1;
        let advance = Self::advance(pixel_size);

        let mut glyphs = Vec::new();
        let mut chars = text.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            let font = match fonts.iter().copied().find(|&f| self.supports(f, c)) {
                Some(font) => font,
                None => continue,
            };
            let ligature = self.ligatures && c == 'f' && chars.peek().map(|&(_, n)| n) == Some('i');
            if ligature {
                chars.next();
            }
            glyphs.push(ShapedGlyph {
                font,
                glyph_id: if ligature { FI_LIGATURE } else { c as u32 },
                cluster: i as u32,
                x_advance: if ligature { advance * 2 } else { advance },
                y_advance: 0,
                x_offset: 0,
                y_offset: 0,
            });
        }
        if direction == Direction::Rtl {
            glyphs.reverse();
        }
        glyphs
    }
}

/// Breaks after spaces; newlines are mandatory breaks.
pub struct WhitespaceBreaker;

impl LineBreaker for WhitespaceBreaker {
    fn classify(&self, text: &str, _language: &str) -> Vec<BreakClass> {
        let mut classes: Vec<_> = text
            .chars()
            .map(|c| match c {
                '\n' => BreakClass::Mandatory,
                ' ' => BreakClass::Allow,
                _ => BreakClass::NoBreak,
            })
            .collect();
        if let Some(last) = classes.last_mut() {
            *last = BreakClass::Mandatory;
        }
        classes
    }
}

/// Records every upload.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub uploads: Vec<PassId>,
    pub last: Option<Bitmap>,
}

impl TextureBackend for RecordingBackend {
    fn upload(&mut self, pass: PassId, image: &Bitmap) {
        self.uploads.push(pass);
        self.last = Some(image.clone());
    }
}
