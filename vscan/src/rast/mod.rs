//! Rasterizer support.

pub mod direct;
pub mod solid;

pub use self::direct::Direct;
pub use self::solid::SolidColor;

use crate::{Pixel, MAX_PIXELS_PER_LINE};

/// Number of words in a `TargetBuffer`.
pub const TARGET_BUFFER_WORDS: usize = MAX_PIXELS_PER_LINE / 4;

/// The buffer given to rasterizers by reference, to fill with pixels. This is
/// word-aligned but we usually pun it as `u8`.
#[derive(Clone)]
#[repr(transparent)]
pub struct TargetBuffer([u32; TARGET_BUFFER_WORDS]);

impl TargetBuffer {
    pub const fn new() -> Self {
        TargetBuffer([0; TARGET_BUFFER_WORDS])
    }

    pub fn as_words(&self) -> &[u32; TARGET_BUFFER_WORDS] {
        &self.0
    }

    pub fn as_words_mut(&mut self) -> &mut [u32; TARGET_BUFFER_WORDS] {
        &mut self.0
    }
}

impl core::ops::Deref for TargetBuffer {
    type Target = [Pixel; MAX_PIXELS_PER_LINE];
    fn deref(&self) -> &Self::Target {
        // Safety: same size, and u8 has no alignment requirement or invalid
        // bit patterns.
        unsafe { &*(self.0.as_ptr() as *const [Pixel; MAX_PIXELS_PER_LINE]) }
    }
}

impl core::ops::DerefMut for TargetBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // Safety: as above.
        unsafe {
            &mut *(self.0.as_mut_ptr() as *mut [Pixel; MAX_PIXELS_PER_LINE])
        }
    }
}

/// Description of one rasterized line, returned by a `Rasterizer`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RasterInfo {
    /// Number of pixels to shift the start of active video by. Negative offsets
    /// shift it earlier (closer to the hsync) and may impinge on code running
    /// during hblank. The shifted start is kept between the start of the line
    /// and the pixel before the end of active video.
    pub offset: isize,
    /// Number of valid pixels generated at the start of the target buffer.
    /// Pixels past this are not output.
    pub length: usize,
    /// Number of AHB cycles per pixel of output. Rasterizers are told the
    /// current mode's value and can return a larger one to stretch pixels
    /// horizontally.
    pub cycles_per_pixel: usize,
    /// Number of times to repeat this line after its first appearance -- zero
    /// gives full vertical resolution, while larger numbers divide vertical
    /// resolution by (1+n).
    ///
    /// The rasterizer isn't called again during the repeats, which can be used
    /// to save compute. Reaching the end of a band cuts a repeat short.
    pub repeat_lines: usize,
}

impl RasterInfo {
    /// Shape of a line with no pixels in it, which displays as black.
    pub const fn blank(cycles_per_pixel: usize) -> Self {
        RasterInfo {
            offset: 0,
            length: 0,
            cycles_per_pixel,
            repeat_lines: 0,
        }
    }
}

/// A producer of pixels, one scanline at a time.
///
/// Rasterizers are called from the driver's deferred interrupt handler, once
/// per line they're responsible for (less any repeats they request). They must
/// not block, and should finish well within a line period.
///
/// Rasterizers are shared between the application and the interrupt handler,
/// and may be referenced from several `Band`s, so they only get `&self`. State
/// that changes while video is running needs interior mutability -- generally
/// atomics.
pub trait Rasterizer: Sync {
    /// Produces a single scanline of pixels into `target`.
    ///
    /// `cycles_per_pixel` is the current mode's value, a sensible default for
    /// the returned `RasterInfo`. `line_number` counts from the top of active
    /// video, not from the top of the band; rasterizers that care where their
    /// band starts are told so when they're constructed.
    fn rasterize(
        &self,
        cycles_per_pixel: usize,
        line_number: usize,
        target: &mut TargetBuffer,
    ) -> RasterInfo;
}

impl<F> Rasterizer for F
where
    F: Fn(usize, usize, &mut TargetBuffer) -> RasterInfo + Sync,
{
    fn rasterize(
        &self,
        cycles_per_pixel: usize,
        line_number: usize,
        target: &mut TargetBuffer,
    ) -> RasterInfo {
        self(cycles_per_pixel, line_number, target)
    }
}

/// Utility routine for cheaply filling a line with a solid color: one pixel,
/// stretched across `width`.
pub fn solid_color_fill(
    target: &mut TargetBuffer,
    cycles_per_pixel: usize,
    width: usize,
    fill: Pixel,
) -> RasterInfo {
    target[0] = fill;
    RasterInfo {
        offset: 0,
        length: 1,
        cycles_per_pixel: cycles_per_pixel * width,
        repeat_lines: 0,
    }
}
