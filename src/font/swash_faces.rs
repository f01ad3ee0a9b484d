use ahash::AHashMap;
use swash::{
    scale::{Render, ScaleContext, Source},
    shape::{self, ShapeContext},
    text::Script,
    zeno::Format,
    CacheKey, FontRef, StringId,
};

use super::{
    FaceMetrics, FaceService, FontError, FontId, GlyphMetrics, MalformedFont, RasterizedGlyph,
    ShapedGlyph,
};
use crate::{
    locale::{Direction, ScriptTag},
    texture::Bitmap,
    SmartString, FIXED_POINT_UNIT,
};

struct Font {
    data: Vec<u8>,
    key: CacheKey,
    offset: u32,
}

impl Font {
    fn from_data(data: Vec<u8>) -> Result<Self, MalformedFont> {
        let font = FontRef::from_index(&data, 0).ok_or(MalformedFont)?;
        let FontRef { key, offset, .. } = font;
        Ok(Self { data, key, offset })
    }

    fn as_ref(&self) -> FontRef {
        FontRef {
            data: &self.data,
            key: self.key,
            offset: self.offset,
        }
    }
}

/// A [`FaceService`] backed by `swash`.
///
/// Fonts are opened by file path, or registered from memory
/// with [`SwashFaces::add_font`].
pub struct SwashFaces {
    fonts: Vec<Option<Font>>,
    names: AHashMap<SmartString, FontId>,

    shape_context: ShapeContext,
    scale_context: ScaleContext,
}

impl SwashFaces {
    pub fn new() -> Self {
        Self {
            fonts: Vec::new(),
            names: AHashMap::new(),
            shape_context: ShapeContext::new(),
            scale_context: ScaleContext::new(),
        }
    }

    /// Registers font data under `name`, so that a later
    /// [`open`](FaceService::open) of the same name finds it.
    pub fn add_font(&mut self, name: &str, data: Vec<u8>) -> Result<FontId, MalformedFont> {
        if let Some(&id) = self.names.get(name) {
            return Ok(id);
        }

        let font = Font::from_data(data)?;
        let family = font
            .as_ref()
            .localized_strings()
            .find_by_id(StringId::Family, None)
            .map(|s| s.to_string())
            .unwrap_or_default();
        log::info!("Loaded font '{}' ({})", name, family);

        let id = FontId::new(self.fonts.len() as u32);
        self.fonts.push(Some(font));
        self.names.insert(name.into(), id);
        Ok(id)
    }

    fn get(&self, id: FontId) -> Option<FontRef> {
        self.fonts
            .get(id.index() as usize)
            .and_then(Option::as_ref)
            .map(Font::as_ref)
    }

    /// Picks the first font in `fonts` that has a glyph for `c`,
    /// falling back to the first font.
    fn font_for_char(&self, fonts: &[FontId], c: char) -> Option<FontId> {
        fonts
            .iter()
            .copied()
            .find(|&id| self.get(id).map_or(false, |font| font.charmap().map(c) != 0))
            .or_else(|| fonts.first().copied())
    }
}

impl Default for SwashFaces {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceService for SwashFaces {
    fn open(&mut self, name: &str) -> Result<FontId, FontError> {
        if let Some(&id) = self.names.get(name) {
            return Ok(id);
        }
        let data = std::fs::read(name).map_err(|e| {
            log::warn!("Failed to read font '{}': {}", name, e);
            FontError::Unavailable(name.into())
        })?;
        Ok(self.add_font(name, data)?)
    }

    fn close(&mut self, font: FontId) -> bool {
        let slot = match self.fonts.get_mut(font.index() as usize) {
            Some(slot) => slot,
            None => return false,
        };
        if slot.take().is_none() {
            return false;
        }
        self.names.retain(|_, id| *id != font);
        true
    }

    fn face_metrics(&self, font: FontId, pixel_size: u32) -> Option<FaceMetrics> {
        let metrics = self.get(font)?.metrics(&[]).scale(pixel_size as f32);
        Some(FaceMetrics {
            ascender: metrics.ascent,
            descender: -metrics.descent,
            line_gap: metrics.leading,
        })
    }

    fn rasterize(
        &mut self,
        font: FontId,
        glyph_id: u32,
        pixel_size: u32,
    ) -> Option<RasterizedGlyph> {
        let glyph_id = u16::try_from(glyph_id).ok()?;
        let font = self
            .fonts
            .get(font.index() as usize)
            .and_then(Option::as_ref)?
            .as_ref();

        let advance = font
            .glyph_metrics(&[])
            .scale(pixel_size as f32)
            .advance_width(glyph_id);

        let mut scaler = self
            .scale_context
            .builder(font)
            .hint(false)
            .size(pixel_size as f32)
            .build();
        let image = Render::new(&[Source::Outline])
            .format(Format::Alpha)
            .render(&mut scaler, glyph_id)?;

        let placement = image.placement;
        let bitmap = if placement.width == 0 || placement.height == 0 {
            Bitmap::new(0, 0)
        } else {
            Bitmap::from_data(placement.width, placement.height, image.data).ok()?
        };

        Some(RasterizedGlyph {
            bitmap,
            metrics: GlyphMetrics::new(
                glam::ivec2(placement.left, placement.top),
                (advance * FIXED_POINT_UNIT as f32).round() as i32,
            ),
        })
    }

    fn shape(
        &mut self,
        fonts: &[FontId],
        text: &str,
        script: ScriptTag,
        direction: Direction,
        pixel_size: u32,
    ) -> Vec<ShapedGlyph> {
        // Split into runs of characters supported by the same font.
        let mut runs: Vec<(FontId, usize, usize)> = Vec::new();
        for (i, c) in text.char_indices() {
            let font = match self.font_for_char(fonts, c) {
                Some(font) => font,
                None => return Vec::new(),
            };
            match runs.last_mut() {
                Some((run_font, _, end)) if *run_font == font => *end = i + c.len_utf8(),
                _ => runs.push((font, i, i + c.len_utf8())),
            }
        }

        let dir = match direction {
            Direction::Rtl => shape::Direction::RightToLeft,
            _ => shape::Direction::LeftToRight,
        };

        // Clusters in logical order; each holds its glyphs in visual order.
        let mut clusters: Vec<(u32, Vec<ShapedGlyph>)> = Vec::new();
        for (font_id, start, end) in runs {
            let font = match self
                .fonts
                .get(font_id.index() as usize)
                .and_then(Option::as_ref)
            {
                Some(font) => font.as_ref(),
                None => continue,
            };
            let mut shaper = self
                .shape_context
                .builder(font)
                .script(swash_script(script))
                .direction(dir)
                .size(pixel_size as f32)
                .build();
            shaper.add_str(&text[start..end]);
            shaper.shape_with(|cluster| {
                let offset = start as u32 + cluster.source.start;
                let glyphs = cluster
                    .glyphs
                    .iter()
                    .map(|glyph| ShapedGlyph {
                        font: font_id,
                        glyph_id: glyph.id as u32,
                        cluster: offset,
                        x_advance: to_fixed(glyph.advance),
                        y_advance: 0,
                        x_offset: to_fixed(glyph.x),
                        y_offset: to_fixed(glyph.y),
                    })
                    .collect();
                clusters.push((offset, glyphs));
            });
        }

        clusters.sort_by_key(|(offset, _)| *offset);
        if direction == Direction::Rtl {
            clusters.reverse();
        }
        clusters.into_iter().flat_map(|(_, glyphs)| glyphs).collect()
    }
}

fn to_fixed(value: f32) -> i32 {
    (value * FIXED_POINT_UNIT as f32).round() as i32
}

fn swash_script(script: ScriptTag) -> Script {
    match script.as_str() {
        "Arab" => Script::Arabic,
        "Hebr" => Script::Hebrew,
        "Cyrl" => Script::Cyrillic,
        "Grek" => Script::Greek,
        "Thai" => Script::Thai,
        "Deva" => Script::Devanagari,
        "Hans" | "Hant" | "Hani" | "Jpan" => Script::Han,
        "Kore" | "Hang" => Script::Hangul,
        _ => Script::Latin,
    }
}
