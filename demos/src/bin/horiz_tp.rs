//! Horizontal test pattern: alternating black and white pixels across the
//! whole screen, for checking pixel clock alignment on a monitor or scope.

#![no_std]
#![no_main]

#[cfg(feature = "panic-halt")]
extern crate panic_halt;
#[cfg(feature = "panic-itm")]
extern crate panic_itm;

use cortex_m::iprintln;
use stm32f4::stm32f407 as device;
use stm32f4::stm32f407::interrupt;

use vscan::{Band, RasterInfo, TargetBuffer};

/// Draws one line of the pattern and repeats it down the rest of the screen.
fn test_pattern(
    cycles_per_pixel: usize,
    _line_number: usize,
    target: &mut TargetBuffer,
) -> RasterInfo {
    let mut pixel = 0xFF;
    for t in target.iter_mut() {
        *t = pixel;
        pixel ^= 0xFF;
    }
    RasterInfo {
        offset: 0,
        length: vscan::MAX_PIXELS_PER_LINE,
        cycles_per_pixel,
        repeat_lines: 599,
    }
}

static SCREEN: Band<'static> = Band {
    rasterizer: Some(&test_pattern),
    line_count: 600,
    next: None,
};

#[allow(unused_parens)]
#[cortex_m_rt::entry]
fn main() -> ! {
    let mut cp = cortex_m::Peripherals::take().unwrap();

    {
        // Enable faults, so they don't immediately escalate to HardFault.
        let shcsr = cp.SCB.shcrs.read();
        unsafe { cp.SCB.shcrs.write(shcsr | (0b111 << 16)) }
    }

    let p = device::Peripherals::take().unwrap();

    let vga = vscan::init(
        cp.NVIC,
        &mut cp.SCB,
        p.FLASH,
        &p.DBG,
        p.RCC,
        p.GPIOB,
        p.GPIOE,
        p.TIM1,
        p.TIM3,
        p.TIM4,
        p.DMA2,
        None,
    );
    vga.apply(&vscan::timing::SVGA_800_600)
        .expect("standard mode rejected");

    iprintln!(&mut cp.ITM.stim[0], "clocks configured, starting rasterization");

    vga.configure_band_list(&SCREEN);
    vga.video_on();
    loop {
        cortex_m::asm::wfi()
    }
}

/// Wires up the PendSV handler expected by the driver.
#[cortex_m_rt::exception]
fn PendSV() {
    vscan::pendsv_raster_isr()
}

/// Wires up the TIM3 handler expected by the driver.
#[interrupt]
fn TIM3() {
    vscan::tim3_shock_isr()
}

/// Wires up the TIM4 handler expected by the driver.
#[interrupt]
fn TIM4() {
    vscan::tim4_horiz_isr()
}
