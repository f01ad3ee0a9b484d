//! Turns text into a [`Buffer`]: word segmentation, shaping,
//! line wrapping and glyph placement.

use glam::{vec2, Vec2};
use smallvec::SmallVec;
use unicode_bidi::{BidiInfo, Level};

use crate::{
    buffer::{Buffer, BufferBuilder, LaidGlyph, LineParams, Quad, WordLayout},
    error::Error,
    font::{FaceMetrics, FaceService, FontId, ShapedGlyph},
    glyph::{AtlasEntry, GlyphCache},
    key::{BufferKey, GlyphFlags, GlyphKey},
    locale::{Direction, LanguageSettings},
    manager::SizeSelector,
    metrics::FontMetrics,
    sdf::SdfTransform,
    text::{split_words, LineBreaker, Word},
    texture::PassId,
    FIXED_POINT_UNIT,
};

/// The services a layout needs.
pub(crate) struct Services<'a> {
    pub faces: &'a mut dyn FaceService,
    pub breaker: &'a dyn LineBreaker,
    pub sdf: &'a mut dyn SdfTransform,
    pub size_selector: Option<&'a dyn SizeSelector>,
}

pub(crate) struct LayoutRequest<'a> {
    pub text: &'a str,
    pub key: &'a BufferKey,
    /// Font fallback list, in priority order.
    pub fonts: &'a [FontId],
    pub language: &'a LanguageSettings,
    /// Line height as a multiple of the font size.
    pub line_height: f32,
    pub pass: PassId,
}

/// Glyph pixel sizes for a font size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PixelSize {
    /// The size glyphs are rasterized and cached at.
    pub quantized: u32,
    /// Factor from the quantized size to the requested size.
    pub scale: f32,
}

impl PixelSize {
    pub fn resolve(font_size: f32, selector: Option<&dyn SizeSelector>) -> Self {
        let requested = (font_size.round() as u32).max(1);
        let quantized = selector
            .map_or(requested, |s| s.quantize(requested))
            .max(1);
        Self {
            quantized,
            scale: requested as f32 / quantized as f32,
        }
    }

    fn scale_fixed(&self, value: i32) -> i32 {
        (value as f32 * self.scale).round() as i32
    }
}

/// Whether `c` forces a line break.
pub(crate) fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\u{0b}' | '\u{0c}' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}

/// Metrics of the first font in `fonts`, or an estimate if the
/// font cannot report any.
pub(crate) fn face_metrics(faces: &dyn FaceService, fonts: &[FontId], pixel_size: u32) -> FaceMetrics {
    fonts
        .first()
        .and_then(|&font| faces.face_metrics(font, pixel_size))
        .unwrap_or_else(|| {
            log::debug!("No face metrics for {:?}, estimating", fonts.first());
            FaceMetrics {
                ascender: pixel_size as f32 * 0.8,
                descender: pixel_size as f32 * -0.2,
                line_gap: 0.,
            }
        })
}

/// Lays out a buffer. Glyphs missing from the cache are rasterized
/// and inserted.
///
/// Fails with [`Error::AtlasFull`] if the atlas cannot take every glyph
/// this frame; the partially built buffer is discarded.
pub(crate) fn build_buffer(
    services: &mut Services,
    cache: &mut GlyphCache,
    request: &LayoutRequest,
) -> Result<Buffer, Error> {
    if request.fonts.is_empty() {
        return Err(Error::NoFontSelected);
    }
    Layouter::new(services, cache, request).run()
}

struct Layouter<'a, 'b> {
    services: &'a mut Services<'b>,
    cache: &'a mut GlyphCache,
    request: &'a LayoutRequest<'a>,

    size: PixelSize,
    base_line: f32,
    flags: GlyphFlags,
    multi_line: bool,
    caret_info: bool,

    /// BiDi levels indexed by byte, for right-to-left paragraphs.
    levels: Option<Vec<Level>>,

    builder: BufferBuilder,
}

impl<'a, 'b> Layouter<'a, 'b> {
    fn new(
        services: &'a mut Services<'b>,
        cache: &'a mut GlyphCache,
        request: &'a LayoutRequest<'a>,
    ) -> Self {
        let key = request.key;
        let size = PixelSize::resolve(key.font_size(), services.size_selector);
        let metrics = face_metrics(&*services.faces, request.fonts, size.quantized);
        let base_line = metrics.ascender * size.scale;

        let rtl = request.language.direction() == Direction::Rtl;
        let levels = if rtl && !request.text.is_empty() {
            Some(BidiInfo::new(request.text, Some(Level::rtl())).levels)
        } else {
            None
        };

        let builder = BufferBuilder::new(LineParams {
            box_width: key.box_size().x,
            alignment: key.alignment(),
            rtl,
            line_height: key.font_size() * request.line_height,
            base_line,
            caret_info: key.caret_info(),
        });

        Self {
            services,
            cache,
            request,

            size,
            base_line,
            flags: key.glyph_flags(),
            multi_line: key.is_multi_line(),
            caret_info: key.caret_info(),

            levels,

            builder,
        }
    }

    fn run(mut self) -> Result<Buffer, Error> {
        let text = self.request.text;
        let classes = self
            .services
            .breaker
            .classify(text, self.request.language.language());
        let line_limit = self.request.key.box_size().x * FIXED_POINT_UNIT;

        for word in split_words(text, &classes) {
            let mandatory = word.mandatory;
            let layout = self.layout_word(&word)?;

            if self.multi_line
                && !self.builder.line_is_empty()
                && self.builder.line_pen() + layout.content_width > line_limit
            {
                self.builder.finish_line(false);
            }
            self.builder.push_word(layout);

            if mandatory && self.multi_line {
                self.builder.finish_line(true);
            }
        }

        let metrics = self.buffer_metrics()?;
        let revision = self.cache.revision();
        self.builder.finish(metrics, revision, self.request.pass)
    }

    fn buffer_metrics(&self) -> Result<FontMetrics, Error> {
        let face = face_metrics(&*self.services.faces, self.request.fonts, self.size.quantized);
        let ascender = (face.ascender * self.size.scale).round() as i32;
        let descender = (face.descender * self.size.scale).round() as i32;
        Ok(FontMetrics::new(
            self.base_line.round() as i32,
            0,
            ascender.max(0),
            descender.min(0),
            0,
        )?)
    }

    fn layout_word(&mut self, word: &Word) -> Result<WordLayout, Error> {
        let text = self.request.text;
        let text = &text[word.range.clone()];
        let content = text.trim_end();
        let whitespace: String = text[content.len()..]
            .chars()
            .filter_map(|c| {
                if !is_line_break(c) {
                    Some(c)
                } else if self.multi_line {
                    None
                } else {
                    Some(' ')
                }
            })
            .collect();

        let rtl = match &self.levels {
            Some(levels) => {
                let first = word.range.start + (text.len() - text.trim_start().len());
                levels.get(first).map_or(true, |level| level.is_rtl())
            }
            None => false,
        };

        let mut layout = WordLayout {
            rtl,
            ..Default::default()
        };

        if !content.is_empty() {
            let direction = if rtl { Direction::Rtl } else { Direction::Ltr };
            let shaped = self.shape(content, direction);
            let mut clusters = cluster_lengths(content, &shaped);
            let mut pen = 0;
            for glyph in &shaped {
                let advance = self.size.scale_fixed(glyph.x_advance);
                let chars = clusters.take(glyph.cluster);
                let laid = self.place(glyph, pen, advance, chars, rtl)?;
                layout.glyphs.push(laid);
                pen += advance;
            }
            layout.content_width = pen;
        }

        if !whitespace.is_empty() {
            let shaped = self.shape(&whitespace, Direction::Ltr);
            let mut clusters = cluster_lengths(&whitespace, &shaped);
            let mut pen = 0;
            for glyph in &shaped {
                let advance = self.size.scale_fixed(glyph.x_advance);
                let chars = clusters.take(glyph.cluster);
                // In right-to-left words the whitespace sits left of the content.
                let x = if rtl {
                    -pen - advance
                } else {
                    layout.content_width + pen
                };
                let laid = self.place(glyph, x, advance, chars, rtl)?;
                layout.glyphs.push(laid);
                pen += advance;
            }
            layout.advance = layout.content_width + pen;
        } else {
            layout.advance = layout.content_width;
        }

        if self.caret_info && self.multi_line {
            self.push_break_carets(&mut layout, &text[content.len()..]);
        }

        Ok(layout)
    }

    /// Line breaks dropped from multi-line text still get a caret stop each,
    /// at the end of the line they close.
    fn push_break_carets(&self, layout: &mut WordLayout, whitespace: &str) {
        let breaks = whitespace.chars().filter(|&c| is_line_break(c)).count();
        if breaks == 0 {
            return;
        }
        let trailing = layout.advance - layout.content_width;
        let x = if layout.rtl {
            -trailing
        } else {
            layout.advance
        };
        let caret = vec2(x as f32 / FIXED_POINT_UNIT as f32, self.base_line);
        layout.glyphs.push(LaidGlyph {
            code_point: '\n' as u32,
            key: GlyphKey::new(
                self.request.fonts.first().copied().unwrap_or_default(),
                '\n' as u32,
                self.size.quantized,
                self.flags,
            ),
            quad: None,
            carets: std::iter::repeat(caret).take(breaks).collect(),
        });
    }

    fn shape(&mut self, text: &str, direction: Direction) -> Vec<ShapedGlyph> {
        self.services.faces.shape(
            self.request.fonts,
            text,
            self.request.language.script(),
            direction,
            self.size.quantized,
        )
    }

    /// Positions one glyph at `x` (1/64 px from the start of the word).
    fn place(
        &mut self,
        glyph: &ShapedGlyph,
        x: i32,
        advance: i32,
        chars: usize,
        rtl: bool,
    ) -> Result<LaidGlyph, Error> {
        let key = GlyphKey::new(glyph.font, glyph.glyph_id, self.size.quantized, self.flags);
        let entry = self.entry(key)?;

        let pen = x as f32 / FIXED_POINT_UNIT as f32;
        let scale = self.size.scale;
        let quad = entry.filter(|e| !e.is_empty()).map(|entry| {
            let bearing = entry.metrics().bearing;
            let offset = vec2(
                self.size.scale_fixed(glyph.x_offset) as f32,
                self.size.scale_fixed(glyph.y_offset) as f32,
            ) / FIXED_POINT_UNIT as f32;
            let size = entry.size();
            Quad {
                pos: vec2(
                    pen + bearing.x as f32 * scale + offset.x,
                    self.base_line - bearing.y as f32 * scale - offset.y,
                ),
                size: vec2(size.x as f32, size.y as f32) * scale,
                uv: entry.uv(),
            }
        });

        let mut carets = SmallVec::new();
        if self.caret_info {
            let width = advance as f32 / FIXED_POINT_UNIT as f32;
            for k in 0..chars {
                let step = width * k as f32 / chars as f32;
                let caret_x = if rtl { pen + width - step } else { pen + step };
                carets.push(Vec2::new(caret_x, self.base_line));
            }
        }

        Ok(LaidGlyph {
            code_point: glyph.glyph_id,
            key,
            quad,
            carets,
        })
    }

    /// Finds a glyph in the cache, rasterizing it on a miss.
    /// Returns `None` if the font has no such glyph.
    fn entry(&mut self, key: GlyphKey) -> Result<Option<AtlasEntry>, Error> {
        if let Some(entry) = self.cache.lookup(&key) {
            return Ok(Some(entry));
        }

        let glyph = match self
            .services
            .faces
            .rasterize(key.font, key.code_point, key.pixel_size)
        {
            Some(glyph) => glyph,
            None => {
                log::debug!(
                    "Font {:?} has no glyph {} at {}px, skipping",
                    key.font,
                    key.code_point,
                    key.pixel_size
                );
                return Ok(None);
            }
        };

        let mut bitmap = glyph.bitmap;
        let mut metrics = glyph.metrics;
        if key.flags.is_sdf() && !bitmap.is_empty() {
            let spread = self.services.sdf.spread();
            bitmap = self.services.sdf.to_sdf(&bitmap.padded(spread), key.flags);
            metrics.bearing.x -= spread as i32;
            metrics.bearing.y += spread as i32;
        }

        Ok(Some(self.cache.insert(key, &bitmap, metrics)?))
    }
}

/// Number of characters in each cluster of a shaped run.
struct ClusterLengths {
    /// `(cluster start, character count)` sorted by start.
    clusters: Vec<(u32, usize)>,
}

impl ClusterLengths {
    /// Returns the character count of `cluster` the first time it is asked
    /// for, and zero afterwards, so only one glyph per cluster gets carets.
    fn take(&mut self, cluster: u32) -> usize {
        match self.clusters.binary_search_by_key(&cluster, |&(start, _)| start) {
            Ok(i) => std::mem::take(&mut self.clusters[i].1),
            Err(_) => 0,
        }
    }
}

fn cluster_lengths(text: &str, glyphs: &[ShapedGlyph]) -> ClusterLengths {
    let mut starts: Vec<u32> = glyphs.iter().map(|g| g.cluster).collect();
    starts.sort_unstable();
    starts.dedup();
    let clusters = starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).map_or(text.len(), |&e| e as usize);
            let count = text
                .get(start as usize..end)
                .map_or(0, |s| s.chars().count());
            (start, count)
        })
        .collect();
    ClusterLengths { clusters }
}

#[cfg(test)]
mod tests {
    use glam::uvec2;

    use super::*;
    use crate::{
        key::{HashedId, TextAlignment},
        sdf::DistanceField,
        testing::{MockFaces, WhitespaceBreaker, FI_LIGATURE},
    };

    const FONTS: [FontId; 2] = [MockFaces::MONO, MockFaces::FALLBACK];

    fn key(text: &str) -> BufferKey {
        BufferKey::new(HashedId::of("mono"), text, 20.)
    }

    fn layout_with(
        faces: &mut MockFaces,
        cache: &mut GlyphCache,
        text: &str,
        key: BufferKey,
        language: &LanguageSettings,
        size_selector: Option<&dyn SizeSelector>,
    ) -> Result<Buffer, Error> {
        let mut sdf = DistanceField::new(2);
        let mut services = Services {
            faces,
            breaker: &WhitespaceBreaker,
            sdf: &mut sdf,
            size_selector,
        };
        build_buffer(
            &mut services,
            cache,
            &LayoutRequest {
                text,
                key: &key,
                fonts: &FONTS,
                language,
                line_height: 1.2,
                pass: PassId::default(),
            },
        )
    }

    fn layout(text: &str, key: BufferKey) -> Buffer {
        let mut faces = MockFaces::new();
        let mut cache = GlyphCache::new(uvec2(256, 256));
        layout_with(
            &mut faces,
            &mut cache,
            text,
            key,
            &LanguageSettings::default(),
            None,
        )
        .unwrap()
    }

    /// Top-left corner of every visible glyph.
    fn corners(buffer: &Buffer) -> Vec<(f32, f32)> {
        buffer
            .vertices()
            .chunks(4)
            .map(|v| (v[0].position.x, v[0].position.y))
            .collect()
    }

    fn chars(s: &str) -> Vec<u32> {
        s.chars().map(|c| c as u32).collect()
    }

    #[test]
    fn single_line() {
        let buffer = layout("ab cd", key("ab cd"));
        assert_eq!(buffer.code_points(), chars("abcd").as_slice());
        // Ascender is 15px and glyphs are 14px tall.
        assert_eq!(
            corners(&buffer),
            vec![(0., 1.), (10., 1.), (30., 1.), (40., 1.)]
        );
        assert_eq!(buffer.size(), glam::ivec2(50, 24));
        assert_eq!(buffer.metrics().base_line(), 15);
        assert_eq!(buffer.metrics().descender(), -5);
        assert!(buffer.verify().is_ok());
    }

    #[test]
    fn wraps_at_box_width() {
        let text = "ab cd ef";
        let buffer = layout(text, key(text).with_box_size(glam::ivec2(45, 0)));
        assert_eq!(
            corners(&buffer),
            vec![
                (0., 1.),
                (10., 1.),
                (0., 25.),
                (10., 25.),
                (0., 49.),
                (10., 49.)
            ]
        );
        assert_eq!(buffer.size().y, 72);
    }

    #[test]
    fn short_boxes_do_not_wrap() {
        // One line tall: single-line layout.
        let text = "ab cd ef";
        let buffer = layout(text, key(text).with_box_size(glam::ivec2(45, 20)));
        assert_eq!(buffer.size(), glam::ivec2(80, 24));
    }

    #[test]
    fn mandatory_breaks() {
        let text = "ab\ncd";
        let multi = layout(text, key(text).with_box_size(glam::ivec2(100, 0)));
        assert_eq!(corners(&multi)[2], (0., 25.));
        assert_eq!(multi.size().y, 48);

        // Single-line layout treats the newline as a space.
        let single = layout(text, key(text));
        assert_eq!(corners(&single)[2], (30., 1.));
        assert_eq!(single.size().y, 24);
    }

    #[test]
    fn justified_lines_match_box_width() {
        let text = "aa bb cc dd ee ff gg hh";
        let buffer = layout(
            text,
            key(text)
                .with_box_size(glam::ivec2(100, 0))
                .with_alignment(TextAlignment::Justify),
        );
        let glyphs = corners(&buffer);
        for line_top in [1., 25.] {
            let right = glyphs
                .iter()
                .filter(|(_, y)| *y == line_top)
                .map(|(x, _)| x + 10.)
                .fold(0., f32::max);
            assert!((right - 100.).abs() <= 1., "line at {} ends at {}", line_top, right);
        }
        // The last line is flush left.
        let last: Vec<_> = glyphs.iter().filter(|(_, y)| *y == 49.).collect();
        assert_eq!(last[0].0, 0.);
        assert_eq!(last[2].0, 30.);
    }

    #[test]
    fn rtl_words_are_reordered() {
        let text = "\u{05D0}\u{05D1} \u{05D2}\u{05D3}";
        let mut faces = MockFaces::new();
        let mut cache = GlyphCache::new(uvec2(256, 256));
        let hebrew = LanguageSettings::from_locale("he").unwrap();
        let buffer =
            layout_with(&mut faces, &mut cache, text, key(text), &hebrew, None).unwrap();

        assert_eq!(
            buffer.code_points(),
            &[0x05D1, 0x05D0, 0x05D3, 0x05D2]
        );
        let x: Vec<_> = corners(&buffer).into_iter().map(|(x, _)| x).collect();
        assert_eq!(x, vec![30., 40., 0., 10.]);
        assert!(cache.contains(&GlyphKey::new(
            MockFaces::FALLBACK,
            0x05D0,
            20,
            GlyphFlags::Plain
        )));
    }

    #[test]
    fn ligatures_get_one_caret_per_character() {
        let mut faces = MockFaces::with_ligatures();
        let mut cache = GlyphCache::new(uvec2(256, 256));
        let buffer = layout_with(
            &mut faces,
            &mut cache,
            "fi",
            key("fi").with_caret_info(true),
            &LanguageSettings::default(),
            None,
        )
        .unwrap();
        assert_eq!(buffer.code_points(), &[FI_LIGATURE]);
        assert_eq!(
            buffer.caret_positions(),
            &[glam::ivec2(0, 15), glam::ivec2(10, 15), glam::ivec2(20, 15)]
        );
    }

    #[test]
    fn line_breaks_keep_their_caret_stops() {
        let text = "ab\ncd";
        let multi = layout(
            text,
            key(text).with_box_size(glam::ivec2(100, 0)).with_caret_info(true),
        );
        let single = layout(text, key(text).with_caret_info(true));

        assert_eq!(multi.caret_positions().len(), text.chars().count() + 1);
        assert_eq!(single.caret_positions().len(), text.chars().count() + 1);
        assert_eq!(
            multi.caret_positions(),
            &[
                glam::ivec2(0, 15),
                glam::ivec2(10, 15),
                glam::ivec2(20, 15),
                glam::ivec2(0, 39),
                glam::ivec2(10, 39),
                glam::ivec2(20, 39),
            ]
        );
        assert_eq!(multi.caret_position(3), Some(glam::ivec2(0, 39)));
    }

    #[test]
    fn glyphs_are_rasterized_at_the_selected_size() {
        let mut faces = MockFaces::new();
        let mut cache = GlyphCache::new(uvec2(256, 256));
        let selector = |px: u32| px / 8 * 8;
        let buffer = layout_with(
            &mut faces,
            &mut cache,
            "ab",
            key("ab"),
            &LanguageSettings::default(),
            Some(&selector),
        )
        .unwrap();

        assert!(cache.contains(&GlyphKey::new(MockFaces::MONO, 'a' as u32, 16, GlyphFlags::Plain)));
        // 8px advances at 16px, scaled by 1.25.
        let x: Vec<_> = corners(&buffer).into_iter().map(|(x, _)| x).collect();
        assert_eq!(x, vec![0., 10.]);
        let v = buffer.vertices();
        assert_eq!(v[1].position.x - v[0].position.x, 10.);
    }

    #[test]
    fn missing_glyphs_are_skipped() {
        let mut faces = MockFaces::with_missing(&['b' as u32]);
        let mut cache = GlyphCache::new(uvec2(256, 256));
        let buffer = layout_with(
            &mut faces,
            &mut cache,
            "abc",
            key("abc"),
            &LanguageSettings::default(),
            None,
        )
        .unwrap();
        assert_eq!(buffer.code_points(), chars("ac").as_slice());
        assert_eq!(corners(&buffer)[1].0, 20.);
    }

    #[test]
    fn distance_field_glyphs_are_padded() {
        let buffer = layout("a", key("a").with_glyph_flags(GlyphFlags::Sdf));
        let v = buffer.vertices();
        assert_eq!(v[0].position.x, -2.);
        assert_eq!(v[1].position.x - v[0].position.x, 14.);
        assert_eq!(v[3].position.y - v[0].position.y, 18.);
    }

    #[test]
    fn cached_glyphs_are_not_rasterized_again() {
        let mut faces = MockFaces::new();
        let mut cache = GlyphCache::new(uvec2(256, 256));
        layout_with(
            &mut faces,
            &mut cache,
            "aaa",
            key("aaa"),
            &LanguageSettings::default(),
            None,
        )
        .unwrap();
        assert_eq!(faces.raster_calls, 1);
        assert_eq!(cache.revision(), 1);
    }

    #[test]
    fn oversized_glyphs_fail() {
        let mut faces = MockFaces::new();
        let mut cache = GlyphCache::new(uvec2(64, 64));
        let result = layout_with(
            &mut faces,
            &mut cache,
            "a",
            BufferKey::new(HashedId::of("mono"), "a", 200.),
            &LanguageSettings::default(),
            None,
        );
        assert!(matches!(result, Err(Error::GlyphTooLarge { .. })));
    }

    #[test]
    fn full_atlas_fails() {
        let text = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJ";
        let mut faces = MockFaces::new();
        let mut cache = GlyphCache::new(uvec2(64, 64));
        let result = layout_with(
            &mut faces,
            &mut cache,
            text,
            key(text),
            &LanguageSettings::default(),
            None,
        );
        assert!(matches!(result, Err(Error::AtlasFull)));
    }

    #[test]
    fn no_fonts_no_layout() {
        let mut faces = MockFaces::new();
        let mut cache = GlyphCache::new(uvec2(64, 64));
        let mut sdf = DistanceField::default();
        let mut services = Services {
            faces: &mut faces,
            breaker: &WhitespaceBreaker,
            sdf: &mut sdf,
            size_selector: None,
        };
        let result = build_buffer(
            &mut services,
            &mut cache,
            &LayoutRequest {
                text: "a",
                key: &key("a"),
                fonts: &[],
                language: &LanguageSettings::default(),
                line_height: 1.2,
                pass: PassId::default(),
            },
        );
        assert!(matches!(result, Err(Error::NoFontSelected)));
    }

    #[test]
    fn too_many_glyphs_for_16_bit_indices() {
        let text = "a".repeat(16385);
        let mut faces = MockFaces::new();
        let mut cache = GlyphCache::new(uvec2(64, 64));
        let result = layout_with(
            &mut faces,
            &mut cache,
            &text,
            key(&text),
            &LanguageSettings::default(),
            None,
        );
        assert!(matches!(result, Err(Error::TooManyGlyphs(16385))));
    }
}
