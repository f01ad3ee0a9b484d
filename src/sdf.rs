//! Signed distance fields for glyph bitmaps.

use crate::{key::GlyphFlags, texture::Bitmap};

/// Converts coverage bitmaps to distance fields.
pub trait SdfTransform {
    /// Returns a bitmap of the same size as `image`. The outline of the glyph
    /// maps to 128; values grow towards the inside.
    ///
    /// Callers pad `image` beforehand so the field has room to fall off.
    fn to_sdf(&mut self, image: &Bitmap, flags: GlyphFlags) -> Bitmap;

    /// Pixels of padding needed on each side of a glyph.
    fn spread(&self) -> u32;
}

/// Euclidean distance field computed by searching a square window
/// of `spread` pixels around every pixel.
#[derive(Debug, Clone, Copy)]
pub struct DistanceField {
    spread: u32,
}

impl Default for DistanceField {
    fn default() -> Self {
        Self { spread: 4 }
    }
}

impl DistanceField {
    pub fn new(spread: u32) -> Self {
        Self {
            spread: spread.max(1),
        }
    }

    /// Distance to the nearest pixel whose inside/outside state differs,
    /// capped at the spread.
    fn distance(&self, image: &Bitmap, x: u32, y: u32) -> f32 {
        let inside = image.get(x, y) >= 128;
        let r = self.spread as i32;
        let mut best = (r * r) as f32;
        for dy in -r..=r {
            let sy = y as i32 + dy;
            if sy < 0 || sy >= image.height() as i32 {
                continue;
            }
            for dx in -r..=r {
                let sx = x as i32 + dx;
                if sx < 0 || sx >= image.width() as i32 {
                    continue;
                }
                if (image.get(sx as u32, sy as u32) >= 128) != inside {
                    best = best.min((dx * dx + dy * dy) as f32);
                }
            }
        }
        best.sqrt().min(self.spread as f32)
    }
}

impl SdfTransform for DistanceField {
    fn to_sdf(&mut self, image: &Bitmap, flags: GlyphFlags) -> Bitmap {
        if !flags.is_sdf() {
            return image.clone();
        }

        let spread = self.spread as f32;
        let mut out = Bitmap::new(image.width(), image.height());
        for y in 0..image.height() {
            for x in 0..image.width() {
                let inside = image.get(x, y) >= 128;
                let d = self.distance(image, x, y) / spread;
                let value = match (flags, inside) {
                    (GlyphFlags::OuterSdf, true) => 255.,
                    (GlyphFlags::InnerSdf, false) => 0.,
                    (_, true) => 128. + d * 127.,
                    (_, false) => 128. - d * 128.,
                };
                out.set(x, y, value.round().clamp(0., 255.) as u8);
            }
        }
        out
    }

    fn spread(&self) -> u32 {
        self.spread
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A 9x9 bitmap with a filled 3x3 square in the middle.
    fn square() -> Bitmap {
        let mut image = Bitmap::new(9, 9);
        for y in 3..6 {
            for x in 3..6 {
                image.set(x, y, 255);
            }
        }
        image
    }

    #[test]
    fn plain_glyphs_pass_through() {
        let image = square();
        assert_eq!(DistanceField::new(3).to_sdf(&image, GlyphFlags::Plain), image);
    }

    #[test]
    fn field_falls_off_from_the_edge() {
        let sdf = DistanceField::new(3).to_sdf(&square(), GlyphFlags::Sdf);
        let center = sdf.get(4, 4);
        let edge = sdf.get(3, 4);
        let near = sdf.get(2, 4);
        let far = sdf.get(0, 4);
        assert!(center > edge);
        assert!(edge > 128);
        assert!(near < 128);
        assert!(far < near);
        assert_eq!(far, 0);
    }

    #[test]
    fn one_sided_fields() {
        let outer = DistanceField::new(3).to_sdf(&square(), GlyphFlags::OuterSdf);
        assert_eq!(outer.get(4, 4), 255);
        assert!(outer.get(2, 4) > 0);

        let inner = DistanceField::new(3).to_sdf(&square(), GlyphFlags::InnerSdf);
        assert_eq!(inner.get(2, 4), 0);
        assert!(inner.get(4, 4) > inner.get(3, 4));
    }
}
