//! Several rasterizers sharing the screen: solid color bands above and below
//! a magnified image, with colors that change every frame.

#![no_std]
#![no_main]

#[cfg(feature = "panic-halt")]
extern crate panic_halt;
#[cfg(feature = "panic-itm")]
extern crate panic_itm;

use cortex_m::iprintln;
use stm32f4::stm32f407::interrupt;

use vscan::priority;
use vscan::rast::{Direct, SolidColor};
use vscan::Band;

const WIDTH: usize = 800;

const IMAGE_WIDTH: usize = 160;
const IMAGE_HEIGHT: usize = 50;
const IMAGE_SCALE_X: usize = WIDTH / IMAGE_WIDTH;
const IMAGE_SCALE_Y: usize = 4;

const TOP_LINES: usize = 150;
const IMAGE_LINES: usize = IMAGE_HEIGHT * IMAGE_SCALE_Y;
const MIDDLE_LINES: usize = 150;
const BOTTOM_LINES: usize = 100;

static TOP: SolidColor = SolidColor::new(WIDTH, 0b00_00_11);
static MIDDLE: SolidColor = SolidColor::new(WIDTH, 0b00_11_00);
static BOTTOM: SolidColor = SolidColor::new(WIDTH, 0b11_00_00);

/// Fills `image` with diagonal stripes through the whole 6-bit palette.
fn draw_image(image: &mut [u32]) {
    for (y, row) in image.chunks_mut(IMAGE_WIDTH / 4).enumerate() {
        for (x, word) in row.iter_mut().enumerate() {
            let mut packed = 0;
            for i in 0..4 {
                let color = ((x * 4 + i + y) / 2) as u32 & 0x3F;
                packed |= color << (i * 8);
            }
            *word = packed;
        }
    }
}

#[allow(unused_parens)]
#[cortex_m_rt::entry]
fn main() -> ! {
    let mut cp = cortex_m::Peripherals::take().unwrap();

    unsafe {
        // Use lazy context stacking for FP, so that we can use FP from
        // interrupts but don't always incur an FP context save.
        cp.FPU.fpccr.write(
            (1 << 31)  // automatic save
                | (1 << 30), // lazy save
        );
    }

    let vga = vscan::take_hardware(None);
    vga.apply(&vscan::timing::SVGA_800_600)
        .expect("standard mode rejected");

    iprintln!(&mut cp.ITM.stim[0], "clocks configured, drawing image");

    let mut image = [0u32; IMAGE_WIDTH / 4 * IMAGE_HEIGHT];
    draw_image(&mut image);
    let picture = Direct::new(
        &image,
        IMAGE_WIDTH,
        IMAGE_HEIGHT,
        IMAGE_SCALE_X,
        IMAGE_SCALE_Y,
        TOP_LINES,
    );

    let bottom = Band {
        rasterizer: Some(&BOTTOM),
        line_count: BOTTOM_LINES,
        next: None,
    };
    let middle = Band {
        rasterizer: Some(&MIDDLE),
        line_count: MIDDLE_LINES,
        next: Some(&bottom),
    };
    let picture_band = Band {
        rasterizer: Some(&picture),
        line_count: IMAGE_LINES,
        next: Some(&middle),
    };
    let top = Band {
        rasterizer: Some(&TOP),
        line_count: TOP_LINES,
        next: Some(&picture_band),
    };

    let thread = priority::Thread::new_checked().unwrap();

    iprintln!(&mut cp.ITM.stim[0], "starting rasterization");

    vga.with_band_list(&top, &thread, |vga| {
        vga.video_on();
        let mut frame = 0u8;
        loop {
            vga.sync_to_vblank(&thread);
            TOP.set_color(frame & 0x3F);
            MIDDLE.set_color((frame >> 1) & 0x3F);
            BOTTOM.set_color(!frame & 0x3F);
            frame = frame.wrapping_add(1);
        }
    })
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
