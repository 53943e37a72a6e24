//! Solid color rasterizer.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::rast::{RasterInfo, Rasterizer, TargetBuffer};
use crate::Pixel;

/// Fills lines with a single color, which can be changed while video is
/// running.
///
/// Unlike [`solid_color_fill`], this writes every pixel, so it exercises the
/// full-rate scanout path.
///
/// [`solid_color_fill`]: fn.solid_color_fill.html
#[derive(Debug)]
pub struct SolidColor {
    width: usize,
    color: AtomicU8,
}

impl SolidColor {
    /// Creates a rasterizer producing `width` pixels of `color`. `width` is
    /// rounded down to a multiple of four.
    pub const fn new(width: usize, color: Pixel) -> Self {
        SolidColor {
            width,
            color: AtomicU8::new(color),
        }
    }

    pub fn set_color(&self, color: Pixel) {
        self.color.store(color, Ordering::Relaxed)
    }

    pub fn color(&self) -> Pixel {
        self.color.load(Ordering::Relaxed)
    }
}

impl Rasterizer for SolidColor {
    fn rasterize(
        &self,
        cycles_per_pixel: usize,
        _line_number: usize,
        target: &mut TargetBuffer,
    ) -> RasterInfo {
        let words = (self.width / 4).min(target.as_words().len());
        let color32 = u32::from(self.color()) * 0x01_01_01_01;
        for w in &mut target.as_words_mut()[..words] {
            *w = color32;
        }
        RasterInfo {
            length: words * 4,
            ..RasterInfo::blank(cycles_per_pixel)
        }
    }
}
