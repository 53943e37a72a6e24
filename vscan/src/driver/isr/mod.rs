//! The driver's interrupt handlers.
//!
//! These are methods on `Driver`; the platform's interrupt vectors call them
//! through a `static` instance (see `vscan::stm32`).

mod hstate;
mod raster;
