use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use glam::{ivec2, vec2, vec3, IVec2, Vec2, Vec3, Vec4};
use smallvec::SmallVec;

use crate::{
    error::Error, glyph::GlyphCache, key::GlyphKey, key::TextAlignment, metrics::FontMetrics,
    texture::PassId, FIXED_POINT_UNIT,
};

pub const VERTICES_PER_GLYPH: usize = 4;
pub const INDICES_PER_GLYPH: usize = 6;

/// Largest number of visible glyphs a buffer can hold with 16-bit indices.
const MAX_GLYPHS: usize = (u16::MAX as usize + 1) / VERTICES_PER_GLYPH;

#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    pub position: Vec3,
    pub uv: Vec2,
}

/// A textured rectangle drawn for one glyph. Units are pixels.
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) struct Quad {
    pub pos: Vec2,
    pub size: Vec2,
    /// `(u0, v0, u1, v1)`
    pub uv: Vec4,
}

/// One glyph of a buffer. Glyphs without a quad (whitespace)
/// still carry caret stops.
#[derive(Clone, Debug)]
pub(crate) struct LaidGlyph {
    pub code_point: u32,
    pub key: GlyphKey,
    pub quad: Option<Quad>,
    pub carets: SmallVec<[Vec2; 1]>,
}

impl LaidGlyph {
    fn translate(&mut self, offset: Vec2) {
        if let Some(quad) = &mut self.quad {
            quad.pos += offset;
        }
        for caret in &mut self.carets {
            *caret += offset;
        }
    }
}

/// Text laid out into vertices and indices, ready to draw with the glyph atlas.
///
/// Every visible glyph contributes one code point, four vertices and six
/// indices. Positions are in pixels relative to the top-left corner of the
/// text box.
#[derive(Debug, Clone)]
pub struct Buffer {
    glyphs: Vec<LaidGlyph>,

    vertices: Vec<Vertex>,
    indices: Vec<u16>,
    code_points: Vec<u32>,
    caret_positions: Vec<IVec2>,
    word_boundaries: Vec<u32>,

    size: IVec2,
    metrics: FontMetrics,
    caret_info: bool,

    revision: u32,
    pass: PassId,
    /// Cache generation in which the glyphs were last marked as used.
    generation: Option<u32>,
}

impl Buffer {
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    /// Glyph indices of the visible glyphs, in drawing order.
    pub fn code_points(&self) -> &[u32] {
        &self.code_points
    }

    /// Caret stops in pixels, one per character plus one at the end of the
    /// text. Empty unless the buffer was requested with caret info.
    pub fn caret_positions(&self) -> &[IVec2] {
        &self.caret_positions
    }

    pub fn caret_position(&self, index: usize) -> Option<IVec2> {
        if !self.caret_info {
            return None;
        }
        self.caret_positions.get(index).copied()
    }

    pub fn has_caret_info(&self) -> bool {
        self.caret_info
    }

    /// Indices into [`code_points`](Self::code_points) of the first glyph of
    /// every word that does not start a line.
    pub fn word_boundaries(&self) -> &[u32] {
        &self.word_boundaries
    }

    /// Size of the laid out text in pixels.
    pub fn size(&self) -> IVec2 {
        self.size
    }

    pub fn metrics(&self) -> &FontMetrics {
        &self.metrics
    }

    /// Atlas revision the texture coordinates were computed against.
    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// The atlas upload the buffer must be drawn with.
    pub fn pass(&self) -> PassId {
        self.pass
    }

    pub fn num_glyphs(&self) -> usize {
        self.code_points.len()
    }

    /// Checks that the parallel arrays agree in length.
    pub fn verify(&self) -> Result<(), Error> {
        if self.vertices.len() != self.code_points.len() * VERTICES_PER_GLYPH {
            return Err(Error::Invariant("vertex count does not match glyph count"));
        }
        if self.indices.len() != self.code_points.len() * INDICES_PER_GLYPH {
            return Err(Error::Invariant("index count does not match glyph count"));
        }
        Ok(())
    }

    /// Refreshes texture coordinates after the atlas changed, without
    /// laying the text out again.
    ///
    /// Returns `false` if a glyph is no longer in the atlas, in which case
    /// the buffer must be rebuilt.
    pub(crate) fn update_uv(&mut self, cache: &mut GlyphCache, pass: PassId) -> bool {
        for glyph in &mut self.glyphs {
            if let Some(quad) = &mut glyph.quad {
                match cache.lookup(&glyph.key) {
                    Some(entry) => quad.uv = entry.uv(),
                    None => return false,
                }
            }
        }

        let quads = self.glyphs.iter().filter_map(|g| g.quad);
        for (vertices, quad) in self.vertices.chunks_exact_mut(VERTICES_PER_GLYPH).zip(quads) {
            for (vertex, uv) in vertices.iter_mut().zip(corner_uvs(quad.uv)) {
                vertex.uv = uv;
            }
        }
        self.revision = cache.revision();
        self.pass = pass;
        self.generation = Some(cache.generation());
        true
    }

    /// Marks every glyph as used in the current cache generation, so that
    /// layouts later in the frame cannot evict them.
    ///
    /// Returns `false` if a glyph is no longer in the atlas.
    pub(crate) fn touch(&mut self, cache: &mut GlyphCache) -> bool {
        let generation = cache.generation();
        if self.generation == Some(generation) {
            return true;
        }
        for glyph in &self.glyphs {
            if glyph.quad.is_some() && cache.lookup(&glyph.key).is_none() {
                return false;
            }
        }
        self.generation = Some(generation);
        true
    }
}

fn corner_uvs(uv: Vec4) -> [Vec2; 4] {
    [
        vec2(uv.x, uv.y),
        vec2(uv.z, uv.y),
        vec2(uv.z, uv.w),
        vec2(uv.x, uv.w),
    ]
}

/// A shaped word, positioned relative to its own start.
///
/// Glyph x coordinates are relative to the pen position at the start of the
/// word and y coordinates to the top of the line.
#[derive(Debug, Default)]
pub(crate) struct WordLayout {
    pub glyphs: Vec<LaidGlyph>,
    /// Advance of the word without trailing whitespace, in 1/64 px.
    pub content_width: i32,
    /// Advance including trailing whitespace, in 1/64 px.
    pub advance: i32,
    pub rtl: bool,
}

#[derive(Debug)]
struct WordSpan {
    glyphs: Range<usize>,
    /// Start and end of the content in 1/64 px, relative to the line start.
    x0: i32,
    x1: i32,
    rtl: bool,
}

#[derive(Debug, Default)]
struct Line {
    words: Vec<WordSpan>,
    /// Pen position in 1/64 px, including trailing whitespace.
    pen: i32,
    /// Width in 1/64 px, excluding trailing whitespace.
    width: i32,
    trailing_caret: Option<Vec2>,
}

/// Layout parameters shared by every line of a buffer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LineParams {
    /// Box width in pixels. Zero if unconstrained.
    pub box_width: i32,
    pub alignment: TextAlignment,
    pub rtl: bool,
    /// Distance between baselines in pixels.
    pub line_height: f32,
    /// Baseline offset from the top of a line, in pixels.
    pub base_line: f32,
    pub caret_info: bool,
}

/// Accumulates words into lines and produces a [`Buffer`].
pub(crate) struct BufferBuilder {
    params: LineParams,
    glyphs: Vec<LaidGlyph>,
    boundaries: Vec<usize>,
    line: Line,
    lines: u32,
    max_width: i32,
}

impl BufferBuilder {
    pub fn new(params: LineParams) -> Self {
        Self {
            params,
            glyphs: Vec::new(),
            boundaries: Vec::new(),
            line: Line::default(),
            lines: 0,
            max_width: 0,
        }
    }

    /// Pen position on the current line, in 1/64 px.
    pub fn line_pen(&self) -> i32 {
        self.line.pen
    }

    pub fn line_is_empty(&self) -> bool {
        self.line.words.is_empty()
    }

    fn line_top(&self) -> f32 {
        self.lines as f32 * self.params.line_height
    }

    pub fn push_word(&mut self, word: WordLayout) {
        let offset = vec2(self.line.pen as f32 / FIXED_POINT_UNIT as f32, 0.);
        let start = self.glyphs.len();
        self.glyphs.extend(word.glyphs.into_iter().map(|mut glyph| {
            glyph.translate(offset);
            glyph
        }));

        let x0 = self.line.pen;
        let x1 = x0 + word.content_width;
        self.line.words.push(WordSpan {
            glyphs: start..self.glyphs.len(),
            x0,
            x1,
            rtl: word.rtl,
        });
        self.line.pen += word.advance;
        self.line.width = self.line.width.max(x1);
    }

    /// Aligns the current line and starts a new one.
    ///
    /// `last_line` marks the end of a paragraph, whose line is never
    /// justified except with [`TextAlignment::JustifyAll`].
    pub fn finish_line(&mut self, last_line: bool) {
        let line = std::mem::take(&mut self.line);
        let params = self.params;
        let top = self.line_top();

        let alignment = if params.rtl {
            params.alignment.flipped()
        } else {
            params.alignment
        };
        let box_width = params.box_width * FIXED_POINT_UNIT;

        // Shift of each word in 1/64 px.
        let mut shifts = vec![0; line.words.len()];
        let mut width = line.width;
        let mut trailing_shift = 0;

        let slack = box_width - line.width;
        let boundaries = line.words.len().saturating_sub(1);
        let justify = alignment.is_justified()
            && (!last_line || alignment == TextAlignment::JustifyAll)
            && boundaries > 0
            && slack > 0;

        if justify {
            let per_boundary = slack / boundaries as i32;
            let remainder = slack % boundaries as i32;
            for (k, shift) in shifts.iter_mut().enumerate().skip(1) {
                *shift = per_boundary * k as i32;
                if k == boundaries {
                    *shift += remainder;
                }
            }
            trailing_shift = slack;
            width = box_width;
        } else if params.box_width > 0 {
            let fallback = match alignment.last_line_alignment() {
                TextAlignment::JustifyAll if params.rtl => TextAlignment::Right,
                other => other,
            };
            let offset = match fallback {
                TextAlignment::Right => slack.max(0),
                TextAlignment::Center => (slack / 2).max(0),
                _ => 0,
            };
            shifts.iter_mut().for_each(|s| *s = offset);
            trailing_shift = offset;
        }

        let left = shifts.first().copied().unwrap_or(trailing_shift);
        let right = left + width;

        let mut moves = shifts.clone();
        if params.rtl {
            mirror(&line.words, &shifts, left + right, &mut moves);
        }

        for (word, dx) in line.words.iter().zip(&moves) {
            let offset = vec2(*dx as f32 / FIXED_POINT_UNIT as f32, top);
            for glyph in &mut self.glyphs[word.glyphs.clone()] {
                glyph.translate(offset);
            }
        }
        for word in line.words.iter().skip(1) {
            if !word.glyphs.is_empty() {
                self.boundaries.push(word.glyphs.start);
            }
        }

        if let Some(caret) = line.trailing_caret {
            let pen = line.pen + trailing_shift;
            let x = if params.rtl { left + right - pen } else { pen };
            let caret = vec2(x as f32 / FIXED_POINT_UNIT as f32, caret.y + top);
            if let Some(glyph) = self.glyphs.last_mut() {
                glyph.carets.push(caret);
            } else {
                self.glyphs.push(LaidGlyph {
                    code_point: 0,
                    key: GlyphKey::new(Default::default(), 0, 0, Default::default()),
                    quad: None,
                    carets: SmallVec::from_elem(caret, 1),
                });
            }
        }

        self.max_width = self.max_width.max(width);
        self.lines += 1;
    }

    /// Finishes the last line and builds the buffer.
    pub fn finish(
        mut self,
        metrics: FontMetrics,
        revision: u32,
        pass: PassId,
    ) -> Result<Buffer, Error> {
        if !self.line.words.is_empty() || self.lines == 0 {
            if self.params.caret_info {
                self.line.trailing_caret = Some(vec2(
                    self.line.pen as f32 / FIXED_POINT_UNIT as f32,
                    self.params.base_line,
                ));
            }
            self.finish_line(true);
        }

        let visible = self.glyphs.iter().filter(|g| g.quad.is_some()).count();
        if visible > MAX_GLYPHS {
            return Err(Error::TooManyGlyphs(visible));
        }

        let mut vertices = Vec::with_capacity(visible * VERTICES_PER_GLYPH);
        let mut indices = Vec::with_capacity(visible * INDICES_PER_GLYPH);
        let mut code_points = Vec::with_capacity(visible);
        let mut caret_positions = Vec::new();
        let mut word_boundaries = Vec::with_capacity(self.boundaries.len());

        let mut boundaries = self.boundaries.iter().peekable();
        for (i, glyph) in self.glyphs.iter().enumerate() {
            while boundaries.next_if(|&&b| b <= i).is_some() {
                word_boundaries.push(code_points.len() as u32);
            }

            if self.params.caret_info {
                caret_positions.extend(
                    glyph
                        .carets
                        .iter()
                        .map(|c| ivec2(c.x.round() as i32, c.y.round() as i32)),
                );
            }

            let quad = match glyph.quad {
                Some(quad) => quad,
                None => continue,
            };
            let base = vertices.len() as u16;
            let corners = [
                quad.pos,
                quad.pos + vec2(quad.size.x, 0.),
                quad.pos + quad.size,
                quad.pos + vec2(0., quad.size.y),
            ];
            for (corner, uv) in corners.iter().zip(corner_uvs(quad.uv)) {
                vertices.push(Vertex {
                    position: vec3(corner.x, corner.y, 0.),
                    uv,
                });
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
            code_points.push(glyph.code_point);
        }

        let size = ivec2(
            (self.max_width as f32 / FIXED_POINT_UNIT as f32).ceil() as i32,
            (self.lines as f32 * self.params.line_height).ceil() as i32,
        );

        let buffer = Buffer {
            glyphs: self.glyphs,
            vertices,
            indices,
            code_points,
            caret_positions,
            word_boundaries,
            size,
            metrics,
            caret_info: self.params.caret_info,
            revision,
            pass,
            generation: None,
        };
        buffer.verify()?;
        Ok(buffer)
    }
}

/// Reorders the words of a right-to-left line visually by mirroring them
/// within the line. Left-to-right runs are mirrored as a block so their
/// internal order is kept.
fn mirror(words: &[WordSpan], shifts: &[i32], extent: i32, moves: &mut [i32]) {
    let mut i = 0;
    while i < words.len() {
        if words[i].rtl {
            let x0 = words[i].x0 + shifts[i];
            let x1 = words[i].x1 + shifts[i];
            moves[i] = shifts[i] + extent - x1 - x0;
            i += 1;
            continue;
        }

        let start = i;
        while i < words.len() && !words[i].rtl {
            i += 1;
        }
        let a = words[start].x0 + shifts[start];
        let b = words[i - 1].x1 + shifts[i - 1];
        for (dx, shift) in moves[start..i].iter_mut().zip(&shifts[start..i]) {
            *dx = shift + extent - b - a;
        }
    }
}
