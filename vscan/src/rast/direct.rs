//! Direct-color rasterizer.

use crate::rast::{RasterInfo, Rasterizer, TargetBuffer};
use crate::util::copy_words::copy_words;
use crate::MAX_PIXELS_PER_LINE;

/// Scans out a framebuffer of packed 8-bit pixels, optionally magnified.
///
/// Horizontal magnification stretches the pixel clock; vertical magnification
/// repeats lines. Neither costs any rasterization time.
#[derive(Debug)]
pub struct Direct<'a> {
    framebuffer: &'a [u32],
    width: usize,
    height: usize,
    scale_x: usize,
    scale_y: usize,
    top_line: usize,
}

impl<'a> Direct<'a> {
    /// Creates a rasterizer for a `width` x `height` image stored row-major in
    /// `framebuffer`, four pixels per word, to be displayed starting at visible
    /// line `top_line`.
    ///
    /// # Panics
    ///
    /// If `width` isn't a multiple of four or exceeds `MAX_PIXELS_PER_LINE`,
    /// if either scale is zero, or if `framebuffer` is too short.
    pub fn new(
        framebuffer: &'a [u32],
        width: usize,
        height: usize,
        scale_x: usize,
        scale_y: usize,
        top_line: usize,
    ) -> Self {
        assert!(width % 4 == 0 && width <= MAX_PIXELS_PER_LINE);
        assert!(scale_x > 0 && scale_y > 0);
        assert!(framebuffer.len() >= width / 4 * height);
        Direct {
            framebuffer,
            width,
            height,
            scale_x,
            scale_y,
            top_line,
        }
    }
}

impl<'a> Rasterizer for Direct<'a> {
    fn rasterize(
        &self,
        cycles_per_pixel: usize,
        line_number: usize,
        target: &mut TargetBuffer,
    ) -> RasterInfo {
        let line_number = match line_number.checked_sub(self.top_line) {
            Some(n) => n,
            None => return RasterInfo::blank(cycles_per_pixel),
        };
        let repeat = (self.scale_y - 1) - (line_number % self.scale_y);
        let row = line_number / self.scale_y;
        if row >= self.height {
            return RasterInfo::blank(cycles_per_pixel);
        }

        let stride = self.width / 4;
        let offset = row * stride;
        copy_words(
            &self.framebuffer[offset..offset + stride],
            &mut target.as_words_mut()[..stride],
        );
        RasterInfo {
            offset: 0,
            length: self.width,
            cycles_per_pixel: cycles_per_pixel * self.scale_x,
            repeat_lines: repeat,
        }
    }
}
