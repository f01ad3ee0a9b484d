use crate::{
    atlas::AtlasError,
    font::FontError,
    locale::Direction,
    manager::PassState,
    metrics::InvalidMetrics,
    SmartString,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The atlas has no room for a glyph this frame. Call
    /// [`FontManager::flush_and_update`](crate::FontManager::flush_and_update)
    /// and request the buffer again.
    #[error("glyph atlas is full; flush and retry")]
    AtlasFull,
    #[error("{width}x{height} glyph can never fit in the {atlas_width}x{atlas_height} atlas")]
    GlyphTooLarge {
        width: u32,
        height: u32,
        atlas_width: u32,
        atlas_height: u32,
    },
    #[error("{operation} is not allowed in the {state:?} state")]
    Protocol {
        operation: &'static str,
        state: PassState,
    },
    #[error("font '{0}' is not open")]
    UnknownFont(SmartString),
    #[error("no font is selected")]
    NoFontSelected,
    #[error("layout direction {0:?} is not supported")]
    UnsupportedDirection(Direction),
    #[error("unknown locale '{0}'")]
    UnknownLocale(SmartString),
    #[error("'{0}' is not a four-letter script code")]
    InvalidScript(SmartString),
    #[error("buffer has {0} glyphs, more than 16-bit indices can address")]
    TooManyGlyphs(usize),
    #[error(transparent)]
    InvalidMetrics(#[from] InvalidMetrics),
    #[error("buffer invariant violated: {0}")]
    Invariant(&'static str),
    #[error(transparent)]
    Font(#[from] FontError),
}

impl Error {
    /// Whether flushing the atlas and retrying can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::AtlasFull)
    }
}

impl From<AtlasError> for Error {
    fn from(e: AtlasError) -> Self {
        match e {
            AtlasError::Full => Error::AtlasFull,
            AtlasError::TooLarge {
                width,
                height,
                atlas_width,
                atlas_height,
            } => Error::GlyphTooLarge {
                width,
                height,
                atlas_width,
                atlas_height,
            },
        }
    }
}
