use glam::{uvec2, UVec2};
use serde::{Deserialize, Serialize};

use crate::{locale::Direction, SmartString, DEFAULT_CACHE_SIZE, DEFAULT_LANGUAGE, DEFAULT_LINE_HEIGHT};

/// Settings for a [`FontManager`](crate::FontManager).
///
/// Can be deserialized from any `serde` format; missing fields take
/// their default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Atlas width in pixels. Rounded up to a power of two.
    pub atlas_width: u32,
    /// Atlas height in pixels. Rounded up to a power of two.
    pub atlas_height: u32,
    /// Fonts to open on startup. They are selected as a fallback list,
    /// in order.
    pub fonts: Vec<SmartString>,
    /// Locale such as `en` or `zh-TW`.
    pub locale: SmartString,
    /// Overrides the script implied by the locale.
    pub script: Option<SmartString>,
    /// Overrides the direction implied by the locale.
    pub direction: Option<Direction>,
    /// Line height as a multiple of the font size.
    pub line_height: f32,
    /// Padding around distance field glyphs, in pixels.
    pub sdf_spread: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            atlas_width: DEFAULT_CACHE_SIZE,
            atlas_height: DEFAULT_CACHE_SIZE,
            fonts: Vec::new(),
            locale: DEFAULT_LANGUAGE.into(),
            script: None,
            direction: None,
            line_height: DEFAULT_LINE_HEIGHT,
            sdf_spread: 4,
        }
    }
}

impl Settings {
    pub fn atlas_size(&self) -> UVec2 {
        uvec2(self.atlas_width, self.atlas_height)
    }
}
