use ahash::AHashMap;
use glam::UVec2;

use crate::{
    buffer::Buffer,
    config::Settings,
    error::Error,
    font::{FaceService, FontId},
    glyph::GlyphCache,
    key::{BufferKey, HashedId},
    locale::{Direction, LanguageSettings, ScriptTag},
    metrics::FontMetrics,
    sdf::{DistanceField, SdfTransform},
    text::{
        layout::{self, face_metrics, LayoutRequest, Services},
        LineBreaker, SwashLineBreaker,
    },
    texture::{Bitmap, PassId, StandaloneTexture, TextureBackend},
    SmartString, FIXED_POINT_UNIT,
};

/// Where a [`FontManager`] is in its frame cycle.
///
/// `Idle -> Layout -> Render -> Idle`, with `SubPass` entered from `Render`
/// when the atlas is flushed mid-frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PassState {
    Idle,
    Layout,
    Render,
    SubPass,
}

/// Maps a requested pixel size to the size glyphs are rasterized at,
/// so that nearby sizes can share atlas entries.
pub trait SizeSelector {
    fn quantize(&self, pixel_size: u32) -> u32;
}

impl<F> SizeSelector for F
where
    F: Fn(u32) -> u32,
{
    fn quantize(&self, pixel_size: u32) -> u32 {
        self(pixel_size)
    }
}

/// Builder for a [`FontManager`].
pub struct FontManagerBuilder<F, T> {
    faces: F,
    texture: T,
    settings: Settings,
    line_breaker: Option<Box<dyn LineBreaker>>,
    sdf: Option<Box<dyn SdfTransform>>,
    size_selector: Option<Box<dyn SizeSelector>>,
}

impl<F, T> FontManagerBuilder<F, T>
where
    F: FaceService,
    T: TextureBackend,
{
    /// Replaces all settings at once.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the glyph atlas size. Each dimension is rounded up to a power of two.
    ///
    /// The default is 1024x1024.
    pub fn atlas_size(mut self, size: UVec2) -> Self {
        self.settings.atlas_width = size.x;
        self.settings.atlas_height = size.y;
        self
    }

    /// Sets the line height as a multiple of the font size.
    ///
    /// The default is 1.2.
    pub fn line_height(mut self, factor: f32) -> Self {
        self.settings.line_height = factor;
        self
    }

    pub fn locale(mut self, locale: &str) -> Self {
        self.settings.locale = locale.into();
        self
    }

    /// Overrides the direction implied by the locale.
    pub fn direction(mut self, direction: Direction) -> Self {
        self.settings.direction = Some(direction);
        self
    }

    /// Fonts to open and select as a fallback list.
    pub fn fonts<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.settings.fonts = names.into_iter().map(SmartString::from).collect();
        self
    }

    pub fn size_selector(mut self, selector: impl SizeSelector + 'static) -> Self {
        self.size_selector = Some(Box::new(selector));
        self
    }

    /// Replaces the default [`SwashLineBreaker`].
    pub fn line_breaker(mut self, breaker: impl LineBreaker + 'static) -> Self {
        self.line_breaker = Some(Box::new(breaker));
        self
    }

    /// Replaces the default [`DistanceField`] transform.
    pub fn sdf_transform(mut self, sdf: impl SdfTransform + 'static) -> Self {
        self.sdf = Some(Box::new(sdf));
        self
    }

    /// Builds the manager, opening and selecting the configured fonts.
    pub fn build(self) -> Result<FontManager<F, T>, Error> {
        let settings = self.settings;

        let mut language = LanguageSettings::from_locale(&settings.locale)
            .ok_or_else(|| Error::UnknownLocale(settings.locale.clone()))?;
        if let Some(script) = &settings.script {
            language.set_script(
                ScriptTag::new(script).ok_or_else(|| Error::InvalidScript(script.clone()))?,
            );
        }
        if let Some(direction) = settings.direction {
            if direction == Direction::Ttb {
                return Err(Error::UnsupportedDirection(direction));
            }
            language.set_direction(direction);
        }

        let sdf = self
            .sdf
            .unwrap_or_else(|| Box::new(DistanceField::new(settings.sdf_spread)));
        let line_breaker = self
            .line_breaker
            .unwrap_or_else(|| Box::new(SwashLineBreaker));

        let mut manager = FontManager {
            faces: self.faces,
            texture: self.texture,
            line_breaker,
            sdf,
            size_selector: self.size_selector,

            glyph_cache: GlyphCache::new(settings.atlas_size()),
            buffers: AHashMap::new(),
            textures: AHashMap::new(),

            opened: AHashMap::new(),
            selected: Vec::new(),
            selected_id: None,
            language,

            state: PassState::Idle,
            pass: PassId::default(),
            uploaded: None,

            settings,
        };

        let fonts = manager.settings.fonts.clone();
        if !fonts.is_empty() {
            for name in &fonts {
                manager.open(name)?;
            }
            manager.select_fonts(fonts.iter().map(|s| s.as_str()))?;
        }

        Ok(manager)
    }
}

/// Lays out text into [`Buffer`]s backed by a shared glyph atlas.
///
/// Each frame runs in two passes:
///
/// 1. [`start_layout_pass`](Self::start_layout_pass), then
///    [`get_buffer`](Self::get_buffer) for every string to draw. Glyphs
///    are rasterized into the atlas as needed.
/// 2. [`start_render_pass`](Self::start_render_pass), which uploads the
///    atlas at most once, then [`buffer`](Self::buffer) to draw.
///
/// If the atlas fills up during layout, `get_buffer` fails with
/// [`Error::AtlasFull`]. Draw what is ready, call
/// [`flush_and_update`](Self::flush_and_update) and request the buffer again;
/// [`get_buffer_with_retry`](Self::get_buffer_with_retry) does the retry.
pub struct FontManager<F, T> {
    faces: F,
    texture: T,
    line_breaker: Box<dyn LineBreaker>,
    sdf: Box<dyn SdfTransform>,
    size_selector: Option<Box<dyn SizeSelector>>,

    settings: Settings,

    glyph_cache: GlyphCache,
    buffers: AHashMap<BufferKey, Buffer>,
    textures: AHashMap<BufferKey, StandaloneTexture>,

    opened: AHashMap<SmartString, FontId>,
    selected: Vec<FontId>,
    selected_id: Option<HashedId>,
    language: LanguageSettings,

    state: PassState,
    pass: PassId,
    /// Pass and atlas revision of the last upload.
    uploaded: Option<(PassId, u32)>,
}

impl<F, T> FontManager<F, T>
where
    F: FaceService,
    T: TextureBackend,
{
    pub fn builder(faces: F, texture: T) -> FontManagerBuilder<F, T> {
        FontManagerBuilder {
            faces,
            texture,
            settings: Settings::default(),
            line_breaker: None,
            sdf: None,
            size_selector: None,
        }
    }

    fn check_state(&self, operation: &'static str, allowed: &[PassState]) -> Result<(), Error> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::Protocol {
                operation,
                state: self.state,
            })
        }
    }

    /// Begins a frame. Glyphs not used since the previous layout pass
    /// become candidates for eviction.
    pub fn start_layout_pass(&mut self) -> Result<(), Error> {
        self.check_state("start_layout_pass", &[PassState::Idle, PassState::Render])?;
        self.glyph_cache.begin_generation();
        self.pass = PassId::default();
        self.state = PassState::Layout;
        Ok(())
    }

    /// Returns the buffer for `text`, laying it out if it is not cached.
    ///
    /// The text is laid out with the selected fonts and language settings.
    pub fn get_buffer(&mut self, text: &str, key: &BufferKey) -> Result<&Buffer, Error> {
        self.check_state("get_buffer", &[PassState::Layout, PassState::SubPass])?;
        self.ensure_buffer(text, key)?;
        self.cached_buffer(key)
    }

    /// Like [`get_buffer`](Self::get_buffer), but if the atlas is full,
    /// flushes it and tries once more.
    pub fn get_buffer_with_retry(
        &mut self,
        text: &str,
        key: &BufferKey,
    ) -> Result<&Buffer, Error> {
        self.check_state("get_buffer", &[PassState::Layout, PassState::SubPass])?;
        match self.ensure_buffer(text, key) {
            Err(e) if e.is_recoverable() => {
                log::debug!("Glyph atlas is full, flushing and retrying");
                self.flush_and_update()?;
                self.ensure_buffer(text, key)?;
            }
            result => result?,
        }
        self.cached_buffer(key)
    }

    fn cached_buffer(&self, key: &BufferKey) -> Result<&Buffer, Error> {
        self.buffers
            .get(key)
            .ok_or(Error::Invariant("buffer missing after layout"))
    }

    fn ensure_buffer(&mut self, text: &str, key: &BufferKey) -> Result<(), Error> {
        let revision = self.glyph_cache.revision();
        let pass = self.pass;
        if let Some(buffer) = self.buffers.get_mut(key) {
            let valid = if buffer.revision() == revision {
                buffer.touch(&mut self.glyph_cache)
            } else {
                buffer.update_uv(&mut self.glyph_cache, pass)
            };
            if valid {
                return Ok(());
            }
        }

        match self.layout(text, key) {
            Ok(buffer) => {
                self.buffers.insert(*key, buffer);
                Ok(())
            }
            Err(e) => {
                self.buffers.remove(key);
                Err(e)
            }
        }
    }

    fn layout(&mut self, text: &str, key: &BufferKey) -> Result<Buffer, Error> {
        let mut services = Services {
            faces: &mut self.faces,
            breaker: &*self.line_breaker,
            sdf: &mut *self.sdf,
            size_selector: self.size_selector.as_deref(),
        };
        let request = LayoutRequest {
            text,
            key,
            fonts: &self.selected,
            language: &self.language,
            line_height: self.settings.line_height,
            pass: self.pass,
        };
        layout::build_buffer(&mut services, &mut self.glyph_cache, &request)
    }

    /// Empties the atlas and the buffer cache.
    ///
    /// During rendering, the current atlas is uploaded first so that buffers
    /// already drawn stay valid, and a new sub-pass begins.
    pub fn flush_and_update(&mut self) -> Result<(), Error> {
        self.check_state(
            "flush_and_update",
            &[PassState::Layout, PassState::Render, PassState::SubPass],
        )?;
        if matches!(self.state, PassState::Render | PassState::SubPass) {
            self.upload_atlas();
            self.pass = self.pass.next();
            self.state = PassState::SubPass;
        }
        self.glyph_cache.flush();
        self.buffers.clear();
        Ok(())
    }

    /// Ends layout. Uploads the atlas if it changed and refreshes the
    /// texture coordinates of cached buffers.
    ///
    /// Buffers whose glyphs were evicted are dropped.
    pub fn start_render_pass(&mut self) -> Result<(), Error> {
        self.check_state("start_render_pass", &[PassState::Layout, PassState::SubPass])?;
        self.upload_atlas();

        let revision = self.glyph_cache.revision();
        let pass = self.pass;
        let cache = &mut self.glyph_cache;
        self.buffers.retain(|_, buffer| {
            if buffer.revision() == revision && buffer.pass() == pass {
                return true;
            }
            let valid = buffer.update_uv(cache, pass);
            if !valid {
                log::warn!("Dropping cached text buffer whose glyphs were evicted");
            }
            valid
        });

        self.state = PassState::Render;
        Ok(())
    }

    pub fn finish_frame(&mut self) -> Result<(), Error> {
        self.check_state("finish_frame", &[PassState::Render, PassState::SubPass])?;
        self.state = PassState::Idle;
        Ok(())
    }

    /// Drops every cached buffer. The atlas is kept.
    pub fn flush_layout(&mut self) {
        self.buffers.clear();
    }

    /// Drops buffers and standalone textures, which were shaped with the
    /// old language settings.
    fn flush_shaped(&mut self) {
        self.flush_layout();
        self.textures.clear();
    }

    /// A buffer laid out in this frame, for drawing.
    pub fn buffer(&self, key: &BufferKey) -> Result<Option<&Buffer>, Error> {
        self.check_state("buffer", &[PassState::Render, PassState::SubPass])?;
        Ok(self.buffers.get(key))
    }

    fn upload_atlas(&mut self) {
        let current = (self.pass, self.glyph_cache.revision());
        if self.uploaded == Some(current) {
            return;
        }
        log::debug!(
            "Uploading glyph atlas (pass {}, revision {})",
            current.0.get(),
            current.1
        );
        self.texture.upload(self.pass, self.glyph_cache.bitmap());
        self.uploaded = Some(current);
    }

    /// Opens a font. Opening the same name twice returns the same ID.
    pub fn open(&mut self, name: &str) -> Result<FontId, Error> {
        if let Some(&id) = self.opened.get(name) {
            return Ok(id);
        }
        let id = self.faces.open(name)?;
        log::info!("Opened font '{}'", name);
        self.opened.insert(name.into(), id);
        Ok(id)
    }

    pub fn close(&mut self, name: &str) -> Result<(), Error> {
        let id = self
            .opened
            .remove(name)
            .ok_or_else(|| Error::UnknownFont(name.into()))?;
        self.faces.close(id);
        if self.selected.contains(&id) {
            self.selected.retain(|&f| f != id);
            if self.selected.is_empty() {
                self.selected_id = None;
            }
            self.flush_layout();
        }
        Ok(())
    }

    /// Selects a single open font. Returns the ID to build
    /// [`BufferKey`]s with.
    pub fn select_font(&mut self, name: &str) -> Result<HashedId, Error> {
        self.select_fonts([name])
    }

    /// Selects a fallback list of open fonts: each character is drawn with
    /// the first font that has it.
    pub fn select_fonts<'a>(
        &mut self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<HashedId, Error> {
        let names: Vec<&str> = names.into_iter().collect();
        let ids = names
            .iter()
            .map(|&name| {
                self.opened
                    .get(name)
                    .copied()
                    .ok_or_else(|| Error::UnknownFont(name.into()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if ids.is_empty() {
            return Err(Error::NoFontSelected);
        }

        let id = HashedId::of_all(names.iter().copied());
        self.selected = ids;
        self.selected_id = Some(id);
        Ok(id)
    }

    /// ID of the selected font list.
    pub fn current_font_id(&self) -> Option<HashedId> {
        self.selected_id
    }

    /// Switches locale, which sets the script and direction too.
    ///
    /// An unknown locale leaves the settings unchanged.
    pub fn set_locale(&mut self, locale: &str) -> Result<(), Error> {
        let language = match LanguageSettings::from_locale(locale) {
            Some(language) => language,
            None => {
                log::warn!("Unknown locale '{}'", locale);
                return Err(Error::UnknownLocale(locale.into()));
            }
        };
        if language.script() != self.language.script()
            || language.direction() != self.language.direction()
            || language.language() != self.language.language()
        {
            self.flush_shaped();
        }
        self.language = language;
        Ok(())
    }

    pub fn set_script(&mut self, script: &str) -> Result<(), Error> {
        let script = ScriptTag::new(script).ok_or_else(|| Error::InvalidScript(script.into()))?;
        if script != self.language.script() {
            self.language.set_script(script);
            self.flush_shaped();
        }
        Ok(())
    }

    /// Sets the layout direction. Top-to-bottom layout is not supported.
    pub fn set_layout_direction(&mut self, direction: Direction) -> Result<(), Error> {
        if direction == Direction::Ttb {
            log::error!("Top-to-bottom layout is not supported");
            return Err(Error::UnsupportedDirection(direction));
        }
        if direction != self.language.direction() {
            self.language.set_direction(direction);
            self.flush_shaped();
        }
        Ok(())
    }

    pub fn set_line_height(&mut self, factor: f32) {
        if factor != self.settings.line_height {
            self.settings.line_height = factor;
            self.flush_layout();
        }
    }

    /// Rasterizes `text` into its own bitmap instead of the atlas.
    ///
    /// The metrics grow to fit glyphs reaching past the ascender or
    /// descender. Results are cached; this works in any pass state.
    pub fn get_texture(&mut self, text: &str, font_size: f32) -> Result<&StandaloneTexture, Error> {
        let font_id = self.selected_id.ok_or(Error::NoFontSelected)?;
        let key = BufferKey::new(font_id, text, font_size);
        if !self.textures.contains_key(&key) {
            let texture = self.render_texture(text, font_size)?;
            self.textures.insert(key, texture);
        }
        self.textures
            .get(&key)
            .ok_or(Error::Invariant("texture missing after rendering"))
    }

    fn render_texture(&mut self, text: &str, font_size: f32) -> Result<StandaloneTexture, Error> {
        let pixel_size = (font_size.round() as u32).max(1);
        let face = face_metrics(&self.faces, &self.selected, pixel_size);
        let ascender = face.ascender.round() as i32;
        let mut metrics = FontMetrics::new(
            ascender.max(0),
            0,
            ascender.max(0),
            (face.descender.round() as i32).min(0),
            0,
        )?;

        let shaped = self.faces.shape(
            &self.selected,
            text,
            self.language.script(),
            self.language.direction(),
            pixel_size,
        );

        let mut glyphs = Vec::with_capacity(shaped.len());
        let mut pen = 0;
        for glyph in &shaped {
            let x = (pen + glyph.x_offset) / FIXED_POINT_UNIT;
            pen += glyph.x_advance;
            let raster = match self.faces.rasterize(glyph.font, glyph.glyph_id, pixel_size) {
                Some(raster) if !raster.bitmap.is_empty() => raster,
                _ => continue,
            };
            let top = raster.metrics.bearing.y + glyph.y_offset / FIXED_POINT_UNIT;
            metrics.expand_to_fit(top, top - raster.bitmap.height() as i32);
            glyphs.push((x + raster.metrics.bearing.x, top, raster.bitmap));
        }

        let width = ((pen + FIXED_POINT_UNIT - 1) / FIXED_POINT_UNIT).max(0) as u32;
        let mut bitmap = Bitmap::new(width, metrics.total().max(0) as u32);
        for (x, top, image) in &glyphs {
            bitmap.blend_max(image, *x, metrics.base_line() - top);
        }

        Ok(StandaloneTexture::new(bitmap, metrics, pixel_size))
    }

    pub fn atlas(&self) -> &GlyphCache {
        &self.glyph_cache
    }

    /// The CPU copy of the atlas texture.
    pub fn atlas_texture(&self) -> &Bitmap {
        self.glyph_cache.bitmap()
    }

    pub fn revision(&self) -> u32 {
        self.glyph_cache.revision()
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn current_pass(&self) -> PassId {
        self.pass
    }

    pub fn language(&self) -> &LanguageSettings {
        &self.language
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn faces(&self) -> &F {
        &self.faces
    }

    pub fn faces_mut(&mut self) -> &mut F {
        &mut self.faces
    }

    pub fn texture_backend(&self) -> &T {
        &self.texture
    }
}
