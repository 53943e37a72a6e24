//! Software-defined video scanout.
//!
//! `vscan` generates analog-timed raster video using nothing but timers, a DMA
//! controller, and a GPIO port. Pixels are produced one scanline at a time, just
//! ahead of the beam, by [`Rasterizer`]s arranged into [`Band`]s.
//!
//! The engine itself lives in [`driver::Driver`], which is generic over the
//! capability traits in [`hw`]. On the STM32F407 target, [`stm32`] provides the
//! concrete hardware and the interrupt entry points.
//!
//! [`Rasterizer`]: rast/trait.Rasterizer.html
//! [`Band`]: band/struct.Band.html
//! [`driver::Driver`]: driver/struct.Driver.html
//! [`hw`]: hw/index.html
//! [`stm32`]: stm32/index.html

#![cfg_attr(not(test), no_std)]

pub mod band;
pub mod driver;
pub mod hw;
pub mod priority;
pub mod rast;
pub mod timing;
pub mod util;

/// Representation of a pixel in memory.
///
/// The driver consistently uses 8 bits per pixel. It is technically possible to
/// upgrade to 16, but performance is not great.
///
/// On the reference board only the bottom 6 bits are wired to the DAC, encoded
/// as `0bBB_GG_RR`.
pub type Pixel = u8;

/// Maximum number of visible pixels in a scanline.
///
/// Timing limitations mean we can't really pull off modes above 800x600, so
/// we'll use this fact to size some data structures.
pub const MAX_PIXELS_PER_LINE: usize = 800;

pub use crate::band::Band;
pub use crate::driver::{Buffers, Driver};
pub use crate::rast::{RasterInfo, Rasterizer, TargetBuffer};
pub use crate::timing::{Polarity, Timing, TimingError};

cfg_if::cfg_if! {
    if #[cfg(target_os = "none")] {
        pub mod stm32;

        // re-export ISR entry points
        pub use crate::stm32::{
            init, take_hardware, pendsv_raster_isr, tim3_shock_isr,
            tim4_horiz_isr,
        };
    }
}
