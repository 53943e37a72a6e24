//! Definition of display timing and modes.

use core::fmt;

use crate::MAX_PIXELS_PER_LINE;

/// Minimum number of CPU/AHB cycles per pixel.
///
/// This is a fundamental hardware limitation. (Though if you can prove
/// otherwise, please write me.)
pub const MIN_CYCLES_PER_PIXEL: usize = 4;

/// Clock tree parameters for running the system from an external crystal
/// through the main PLL.
///
/// These are plain numbers rather than register encodings, so that timings can
/// be described (and checked) without reference to a particular chip. The
/// backend translates them when [`apply`] reaches the clock programming step.
///
/// [`apply`]: ../driver/struct.Driver.html#method.apply
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ClockConfig {
    /// Frequency of the external crystal.
    pub crystal_hz: u32,
    /// Divides the crystal down to the PLL input frequency.
    pub crystal_divisor: u8,
    /// Multiplies the PLL input up to the VCO frequency.
    pub vco_multiplier: u16,
    /// Divides the VCO down to the CPU clock. One of 2, 4, 6, 8.
    pub general_divisor: u8,
    /// Divides the VCO down to the 48MHz-ish peripheral clock.
    pub pll48_divisor: u8,

    /// AHB prescaler: 1, 2, 4, 8, 16, 64, 128, 256 or 512.
    pub ahb_divisor: u16,
    /// APB1 prescaler: 1, 2, 4, 8 or 16.
    pub apb1_divisor: u8,
    /// APB2 prescaler: 1, 2, 4, 8 or 16.
    pub apb2_divisor: u8,

    /// Flash wait states, 0 through 7.
    pub flash_latency: u8,
}

impl ClockConfig {
    /// CPU clock frequency produced by this configuration.
    pub fn cpu_hz(&self) -> u32 {
        let pll_in = self.crystal_hz / u32::from(self.crystal_divisor);
        pll_in * u32::from(self.vco_multiplier) / u32::from(self.general_divisor)
    }

    /// Frequency seen by timers on the APB1 bus. Like all APB timers they get
    /// their clocks doubled whenever the bus is divided.
    pub fn apb1_timer_hz(&self) -> u32 {
        let ahb = self.cpu_hz() / u32::from(self.ahb_divisor);
        if self.apb1_divisor > 1 {
            ahb * 2 / u32::from(self.apb1_divisor)
        } else {
            ahb
        }
    }

    fn check_divisors(&self) -> Result<(), TimingError> {
        let ok = self.crystal_divisor >= 2
            && matches!(self.general_divisor, 2 | 4 | 6 | 8)
            && matches!(self.ahb_divisor, 1 | 2 | 4 | 8 | 16 | 64 | 128 | 256 | 512)
            && matches!(self.apb1_divisor, 1 | 2 | 4 | 8 | 16)
            && matches!(self.apb2_divisor, 1 | 2 | 4 | 8 | 16)
            && self.flash_latency <= 7;
        if ok {
            Ok(())
        } else {
            Err(TimingError::UnsupportedClock)
        }
    }
}

/// Defines the timing parameters for a video mode.
///
/// The horizontal and vertical timing information are each expressed
/// differently, so that each can be consumed efficiently by the implementation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Timing {
    /// Configuration for the system clocks and PLL to achieve this timing.
    pub clock_config: ClockConfig,

    /// Number of AHB cycles per pixel clock cycle. Must be at least
    /// [`MIN_CYCLES_PER_PIXEL`]. Values above the minimum reduce both the
    /// resolution and the compute/bandwidth requirements.
    ///
    /// [`MIN_CYCLES_PER_PIXEL`]: constant.MIN_CYCLES_PER_PIXEL.html
    pub cycles_per_pixel: usize,

    /// Total horizontal pixels per line, including blanking.
    pub line_pixels: usize,
    /// Length of horizontal sync pulse, in pixels.
    pub sync_pixels: usize,
    /// Number of pixels between end of sync and start of video (the "back
    /// porch").
    pub back_porch_pixels: usize,
    /// Moves the start-of-video interrupt backwards in time, to compensate for
    /// interrupt latency and code execution time. Measured in units of pixel
    /// clocks.
    pub video_lead: usize,
    /// Maximum visible pixels per line. This controls the timing of the
    /// end-of-active interrupt.
    pub video_pixels: usize,
    /// Polarity of horizontal sync pulse.
    pub hsync_polarity: Polarity,

    /// Scanline number of onset of vertical sync pulse, numbered from the top
    /// of the vertical blanking interval.
    pub vsync_start_line: usize,
    /// Scanline number of end of vertical sync pulse, numbered from the top of
    /// the vertical blanking interval.
    pub vsync_end_line: usize,
    /// Scanline number of start of active video, numbered from the top of the
    /// vertical blanking interval. At least 2, since rendering starts on the
    /// line before, and line 0 is never a transition.
    pub video_start_line: usize,
    /// Scanline number of end of active video, numbered from the top of the
    /// vertical blanking interval. This is also the total number of lines per
    /// frame, including the VBI.
    pub video_end_line: usize,
    /// Polarity of the vertical sync pulse.
    pub vsync_polarity: Polarity,
}

/// Polarity of a sync pulse, and, by implication, the idle state of the sync
/// signal.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Polarity {
    Positive = 0, // note: value assignments for cheaper timer configuration
    Negative = 1,
}

/// Reasons a `Timing` can't be used.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimingError {
    /// `cycles_per_pixel` is below `MIN_CYCLES_PER_PIXEL`.
    PixelTooFast,
    /// The pixel clock can't be expressed in units of the line timers' input
    /// clock.
    PixelClockNotDivisible,
    /// Some clock tree parameter can't be programmed.
    UnsupportedClock,
    /// Active video doesn't start after line 0 and end after it starts.
    VideoLines,
    /// Vertical sync doesn't start after line 0, end after it starts, and end
    /// within the frame.
    VsyncLines,
    /// Two vertical events land on the same line.
    LinesCoincide,
    /// Sync, porch, lead and active video don't fit into the line.
    HorizontalLayout,
    /// More visible pixels than `MAX_PIXELS_PER_LINE`.
    LineTooWide,
}

impl fmt::Display for TimingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            TimingError::PixelTooFast => "fewer than 4 cycles per pixel",
            TimingError::PixelClockNotDivisible => {
                "pixel clock not a multiple of the timer clock"
            }
            TimingError::UnsupportedClock => "unsupported clock configuration",
            TimingError::VideoLines => "bad active video line range",
            TimingError::VsyncLines => "bad vertical sync line range",
            TimingError::LinesCoincide => "vertical events on the same line",
            TimingError::HorizontalLayout => "horizontal timing doesn't fit",
            TimingError::LineTooWide => "too many visible pixels",
        };
        f.write_str(msg)
    }
}

/// Compare and reload values for the two chained line timers, in units of
/// pixels, derived from a `Timing` by [`Timing::line_timer_config`].
///
/// [`Timing::line_timer_config`]: struct.Timing.html#method.line_timer_config
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LineTimerConfig {
    /// Timer input clocks per pixel. Prescalers are loaded with one less.
    pub ticks_per_pixel: u32,
    /// Pixels per line. Reload registers are loaded with one less.
    pub period: u32,
    /// End of the horizontal sync pulse.
    pub sync_end: u32,
    /// Early warning on the primary timer, ahead of `active_start`.
    pub shock: u32,
    /// Start of active video on the scanout timer, before any per-line offset.
    pub active_start: u32,
    /// End of active video on the scanout timer.
    pub active_end: u32,
    pub hsync_polarity: Polarity,
}

impl Timing {
    /// Position of the start-of-active-video edge within the line, before any
    /// offset requested by a rasterizer.
    pub fn active_start(&self) -> usize {
        self.sync_pixels + self.back_porch_pixels - self.video_lead
    }

    /// Position of the end-of-active-video edge within the line.
    pub fn active_end(&self) -> usize {
        self.sync_pixels + self.back_porch_pixels + self.video_pixels
    }

    /// Checks that this timing can be generated.
    pub fn validate(&self) -> Result<(), TimingError> {
        if self.cycles_per_pixel < MIN_CYCLES_PER_PIXEL {
            return Err(TimingError::PixelTooFast);
        }

        self.clock_config.check_divisors()?;

        // Horizontal timing is managed by timers on the slower APB1 bus, so we
        // must be able to express cycles_per_pixel in APB1 timer ticks.
        let apb1 = usize::from(self.clock_config.apb1_divisor);
        if apb1 > 1 && self.cycles_per_pixel % (apb1 / 2) != 0 {
            return Err(TimingError::PixelClockNotDivisible);
        }

        if self.video_start_line < 2
            || self.video_start_line >= self.video_end_line
        {
            return Err(TimingError::VideoLines);
        }

        if self.vsync_start_line == 0
            || self.vsync_start_line >= self.vsync_end_line
            || self.vsync_end_line >= self.video_end_line
        {
            return Err(TimingError::VsyncLines);
        }

        let events = [
            self.vsync_start_line,
            self.vsync_end_line,
            self.video_start_line - 1,
            self.video_start_line,
            self.video_end_line - 1,
        ];
        for (i, a) in events.iter().enumerate() {
            if events[i + 1..].contains(a) {
                return Err(TimingError::LinesCoincide);
            }
        }

        if self.video_pixels > MAX_PIXELS_PER_LINE {
            return Err(TimingError::LineTooWide);
        }

        let porch = self.sync_pixels + self.back_porch_pixels;
        if self.sync_pixels == 0
            || self.video_lead > porch
            || porch + self.video_pixels >= self.line_pixels
        {
            return Err(TimingError::HorizontalLayout);
        }

        Ok(())
    }

    /// Derives the line timer settings, checking the timing first.
    ///
    /// `shock_lead` is how far ahead of start-of-active-video the primary
    /// timer's early-warning compare fires, in pixels. It's a property of the
    /// hardware, not the mode.
    pub fn line_timer_config(
        &self,
        shock_lead: u32,
    ) -> Result<LineTimerConfig, TimingError> {
        self.validate()?;

        let apb1 = usize::from(self.clock_config.apb1_divisor);
        let ticks_per_pixel = if apb1 > 1 {
            self.cycles_per_pixel * 2 / apb1
        } else {
            self.cycles_per_pixel
        };

        let active_start = self.active_start() as u32;
        if active_start < shock_lead {
            return Err(TimingError::HorizontalLayout);
        }

        Ok(LineTimerConfig {
            ticks_per_pixel: ticks_per_pixel as u32,
            period: self.line_pixels as u32,
            sync_end: self.sync_pixels as u32,
            shock: active_start - shock_lead,
            active_start,
            active_end: self.active_end() as u32,
            hsync_polarity: self.hsync_polarity,
        })
    }
}

/// Industry standard 800x600 60Hz timing.
///
/// This produces a 160MHz CPU clock speed for a 40MHz pixel clock.
pub static SVGA_800_600: Timing = Timing {
    clock_config: ClockConfig {
        crystal_hz: 8_000_000, // external crystal Hz
        crystal_divisor: 4,    // divide down to 2Mhz
        vco_multiplier: 160,   // multiply up to 320MHz VCO
        general_divisor: 2,    // divide by 2 for 160MHz CPU clock
        pll48_divisor: 7,      // divide by 7 for 48MHz-ish SDIO clock
        ahb_divisor: 1,        // divide CPU clock by 1 for 160MHz AHB clock
        apb1_divisor: 4,       // divide CPU clock by 4 for 40MHz APB1 clock.
        apb2_divisor: 2,       // divide CPU clock by 2 for 80MHz APB2 clock.

        // 5 wait states for 160MHz at 3.3V.
        flash_latency: 5,
    },

    cycles_per_pixel: 4,

    line_pixels: 1056,
    sync_pixels: 128,
    back_porch_pixels: 88,
    video_lead: 20,
    video_pixels: 800,
    hsync_polarity: Polarity::Positive,

    vsync_start_line: 1,
    vsync_end_line: 1 + 4,
    video_start_line: 1 + 4 + 23,
    video_end_line: 1 + 4 + 23 + 600,
    vsync_polarity: Polarity::Positive,
};

/// 800x600 at 56Hz, which gets by on a 144MHz CPU clock (36MHz pixel clock).
pub static SVGA_800_600_56HZ: Timing = Timing {
    clock_config: ClockConfig {
        crystal_hz: 8_000_000,
        crystal_divisor: 4,  // 2MHz
        vco_multiplier: 144, // 288MHz VCO
        general_divisor: 2,  // 144MHz CPU
        pll48_divisor: 6,    // exactly 48MHz
        ahb_divisor: 1,
        apb1_divisor: 4, // 36MHz
        apb2_divisor: 2, // 72MHz

        flash_latency: 4,
    },

    cycles_per_pixel: 4,

    line_pixels: 1024,
    sync_pixels: 72,
    back_porch_pixels: 128,
    video_lead: 22,
    video_pixels: 800,
    hsync_polarity: Polarity::Positive,

    vsync_start_line: 1,
    vsync_end_line: 1 + 2,
    video_start_line: 1 + 2 + 22,
    video_end_line: 1 + 2 + 22 + 600,
    vsync_polarity: Polarity::Positive,
};

/// Industry standard 640x480 60Hz timing.
///
/// The 25.175MHz pixel clock is approximated by running the CPU at 151MHz with
/// 6 cycles per pixel, so scanout is always timer-paced in this mode.
pub static VGA_640_480: Timing = Timing {
    clock_config: ClockConfig {
        crystal_hz: 8_000_000,
        crystal_divisor: 4,  // 2MHz
        vco_multiplier: 151, // 302MHz VCO
        general_divisor: 2,  // 151MHz CPU
        pll48_divisor: 7,
        ahb_divisor: 1,
        apb1_divisor: 4, // 37.75MHz
        apb2_divisor: 2, // 75.5MHz

        flash_latency: 5,
    },

    cycles_per_pixel: 6,

    line_pixels: 800,
    sync_pixels: 96,
    back_porch_pixels: 48,
    video_lead: 25,
    video_pixels: 640,
    hsync_polarity: Polarity::Negative,

    vsync_start_line: 10,
    vsync_end_line: 10 + 2,
    video_start_line: 10 + 2 + 33,
    video_end_line: 10 + 2 + 33 + 480,
    vsync_polarity: Polarity::Negative,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_modes_validate() {
        for t in &[&SVGA_800_600, &SVGA_800_600_56HZ, &VGA_640_480] {
            assert_eq!(t.validate(), Ok(()), "{:?}", t);
        }
    }

    #[test]
    fn svga_clocks() {
        let c = &SVGA_800_600.clock_config;
        assert_eq!(c.cpu_hz(), 160_000_000);
        assert_eq!(c.apb1_timer_hz(), 80_000_000);
    }

    #[test]
    fn svga_line_timers() {
        let cfg = SVGA_800_600.line_timer_config(20).unwrap();
        assert_eq!(
            cfg,
            LineTimerConfig {
                ticks_per_pixel: 2,
                period: 1056,
                sync_end: 128,
                shock: 196 - 20,
                active_start: 128 + 88 - 20,
                active_end: 128 + 88 + 800,
                hsync_polarity: Polarity::Positive,
            }
        );
    }

    #[test]
    fn vga_ticks_per_pixel() {
        let cfg = VGA_640_480.line_timer_config(20).unwrap();
        // 6 AHB cycles, APB1 timers at half the AHB rate.
        assert_eq!(cfg.ticks_per_pixel, 3);
    }

    #[test]
    fn too_fast() {
        let t = Timing {
            cycles_per_pixel: 3,
            ..SVGA_800_600
        };
        assert_eq!(t.validate(), Err(TimingError::PixelTooFast));
    }

    #[test]
    fn indivisible_pixel_clock() {
        // APB1 at /4 means timers tick every 2 AHB cycles.
        let t = Timing {
            cycles_per_pixel: 5,
            ..SVGA_800_600
        };
        assert_eq!(t.validate(), Err(TimingError::PixelClockNotDivisible));

        // ...but undivided APB1 takes anything.
        let mut t = t;
        t.clock_config.apb1_divisor = 1;
        assert_eq!(t.validate(), Ok(()));
    }

    #[test]
    fn bad_divisor() {
        let mut t = SVGA_800_600;
        t.clock_config.ahb_divisor = 32;
        assert_eq!(t.validate(), Err(TimingError::UnsupportedClock));
    }

    #[test]
    fn coinciding_lines() {
        // Vsync ends on the line where rasterization should warm up.
        let t = Timing {
            vsync_end_line: 27,
            ..SVGA_800_600
        };
        assert_eq!(t.validate(), Err(TimingError::LinesCoincide));
    }

    #[test]
    fn empty_active_region() {
        let t = Timing {
            video_start_line: 628,
            ..SVGA_800_600
        };
        assert_eq!(t.validate(), Err(TimingError::VideoLines));
        let t = Timing {
            video_start_line: 0,
            ..SVGA_800_600
        };
        assert_eq!(t.validate(), Err(TimingError::VideoLines));
        // Rendering would have to start on line 0, which the line counter
        // only reaches by wrapping.
        let t = Timing {
            vsync_start_line: 2,
            vsync_end_line: 3,
            video_start_line: 1,
            ..SVGA_800_600
        };
        assert_eq!(t.validate(), Err(TimingError::VideoLines));
    }

    #[test]
    fn horizontal_overflow() {
        let t = Timing {
            line_pixels: 1000,
            ..SVGA_800_600
        };
        assert_eq!(t.validate(), Err(TimingError::HorizontalLayout));
        assert_eq!(
            SVGA_800_600.line_timer_config(500),
            Err(TimingError::HorizontalLayout)
        );
    }

    #[test]
    fn too_wide() {
        let t = Timing {
            video_pixels: 804,
            line_pixels: 1100,
            ..SVGA_800_600
        };
        assert_eq!(t.validate(), Err(TimingError::LineTooWide));
    }
}
