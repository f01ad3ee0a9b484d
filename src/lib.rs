//! Text layout into GPU-ready glyph buffers backed by a shared,
//! size-limited glyph atlas.
//!
//! The entry point is [`FontManager`]. It is used in two passes each frame:
//! a layout pass, during which [`FontManager::get_buffer`] shapes text and
//! pulls every needed glyph into the [`GlyphCache`], and a render pass, which
//! uploads the atlas bitmap at most once and hands out finished [`Buffer`]s
//! for drawing.
//!
//! Font parsing, shaping, line breaking, distance fields and texture upload
//! are reached through the [`FaceService`], [`LineBreaker`], [`SdfTransform`]
//! and [`TextureBackend`] traits. `swash`-backed implementations ship with the
//! crate, and a `wgpu` texture backend is available behind the `wgpu` feature.

#![allow(clippy::too_many_arguments)]

mod atlas;
mod buffer;
mod config;
mod error;
pub mod font;
mod glyph;
mod key;
pub mod locale;
mod manager;
mod metrics;
pub mod sdf;
pub mod text;
mod texture;

#[cfg(feature = "wgpu")]
pub mod backend;

#[cfg(test)]
mod testing;

/// FreeType-style fixed point unit: shaper advances and line lengths are
/// expressed in 1/64 of a pixel.
pub const FIXED_POINT_UNIT: i32 = 64;

/// Default atlas dimensions in pixels.
pub const DEFAULT_CACHE_SIZE: u32 = 1024;

/// Default line height factor. The line height of multi-line text is
/// the factor multiplied by the font size.
pub const DEFAULT_LINE_HEIGHT: f32 = 1.2;

/// Language used for line breaking when the locale does not name a supported one.
pub const DEFAULT_LANGUAGE: &str = "en";

pub use atlas::{AtlasError, AtlasSlot, DynamicAtlas};
pub use buffer::{Buffer, Vertex, INDICES_PER_GLYPH, VERTICES_PER_GLYPH};
pub use config::Settings;
pub use error::Error;
pub use font::{
    FaceMetrics, FaceService, FontError, FontId, GlyphMetrics, MalformedFont, RasterizedGlyph,
    ShapedGlyph, SwashFaces,
};
pub use glyph::{AtlasEntry, GlyphCache};
pub use key::{BufferKey, GlyphFlags, GlyphKey, HashedId, TextAlignment};
pub use locale::{Direction, LanguageSettings, LocaleEntry, ScriptTag};
pub use manager::{FontManager, FontManagerBuilder, PassState, SizeSelector};
pub use metrics::{FontMetrics, InvalidMetrics};
pub use sdf::{DistanceField, SdfTransform};
pub use text::{BreakClass, LineBreaker, SwashLineBreaker};
pub use texture::{Bitmap, InvalidBitmap, PassId, StandaloneTexture, TextureBackend};

pub use glam;

pub type SmartString = smartstring::SmartString<smartstring::LazyCompact>;
