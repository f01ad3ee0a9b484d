use crate::metrics::FontMetrics;

#[derive(Debug, thiserror::Error)]
#[error("bitmap data has {len} bytes, expected {width}x{height}")]
pub struct InvalidBitmap {
    width: u32,
    height: u32,
    len: usize,
}

/// A single-channel, 8-bit image. Rows are tightly packed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bitmap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Bitmap {
    /// Creates a zeroed bitmap.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    pub fn from_data(width: u32, height: u32, data: Vec<u8>) -> Result<Self, InvalidBitmap> {
        if data.len() != width as usize * height as usize {
            return Err(InvalidBitmap {
                width,
                height,
                len: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        let index = self.index(x, y);
        self.data[index] = value;
    }

    /// Copies `src` into this bitmap with its top-left corner at `(x, y)`.
    /// Pixels falling outside are clipped.
    pub fn copy_from(&mut self, src: &Bitmap, x: i32, y: i32) {
        self.blit(src, x, y, |_, s| s);
    }

    /// Like [`copy_from`](Self::copy_from) but keeps the brighter of the two
    /// pixels, so overlapping glyphs do not erase each other.
    pub fn blend_max(&mut self, src: &Bitmap, x: i32, y: i32) {
        self.blit(src, x, y, u8::max);
    }

    /// Returns a copy with `padding` empty pixels added on every side.
    pub fn padded(&self, padding: u32) -> Bitmap {
        let mut out = Bitmap::new(self.width + padding * 2, self.height + padding * 2);
        out.copy_from(self, padding as i32, padding as i32);
        out
    }

    /// Clears the rectangle at `(x, y)` with the given size.
    pub(crate) fn clear_rect(&mut self, x: u32, y: u32, width: u32, height: u32) {
        for row in y..(y + height).min(self.height) {
            let start = self.index(x.min(self.width), row);
            let end = self.index((x + width).min(self.width), row);
            self.data[start..end].fill(0);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.data.fill(0);
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    fn blit(&mut self, src: &Bitmap, x: i32, y: i32, combine: impl Fn(u8, u8) -> u8) {
        for sy in 0..src.height {
            let dy = y + sy as i32;
            if dy < 0 || dy >= self.height as i32 {
                continue;
            }
            for sx in 0..src.width {
                let dx = x + sx as i32;
                if dx < 0 || dx >= self.width as i32 {
                    continue;
                }
                let index = self.index(dx as u32, dy as u32);
                self.data[index] = combine(self.data[index], src.get(sx, sy));
            }
        }
    }
}

/// Identifies one atlas upload. Every layout/render cycle starts at pass zero;
/// sub-passes started by a mid-render flush get the following ids, so draw calls
/// issued against an earlier upload stay valid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PassId(u32);

impl PassId {
    pub fn new(id: u32) -> Self {
        PassId(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub(crate) fn next(self) -> Self {
        PassId(self.0 + 1)
    }
}

/// Receives atlas bitmaps for upload to the GPU.
pub trait TextureBackend {
    /// Uploads the whole atlas bitmap into the texture slot for `pass`.
    fn upload(&mut self, pass: PassId, image: &Bitmap);
}

/// A string rasterized into its own bitmap instead of the shared atlas.
///
/// Useful for long-lived strings (e.g. a HUD label) that should not take up
/// atlas space.
#[derive(Debug, Clone)]
pub struct StandaloneTexture {
    bitmap: Bitmap,
    metrics: FontMetrics,
    pixel_size: u32,
}

impl StandaloneTexture {
    pub(crate) fn new(bitmap: Bitmap, metrics: FontMetrics, pixel_size: u32) -> Self {
        Self {
            bitmap,
            metrics,
            pixel_size,
        }
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    pub fn metrics(&self) -> &FontMetrics {
        &self.metrics
    }

    pub fn pixel_size(&self) -> u32 {
        self.pixel_size
    }
}
