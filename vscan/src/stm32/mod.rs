//! STM32F407 hardware for the scanout engine.
//!
//! Resource map:
//!
//! - TIM3 is the primary line timer. CH1 drives hsync on PB6 (AF2); CH2 is
//!   the shock absorber's early warning.
//! - TIM4 is the scanout timer, started by TIM3's trigger output. CH2 marks
//!   the start of active video, CH3 the end.
//! - TIM1 paces pixel transfers for modes slower than the minimum, by
//!   raising a DMA request on each update.
//! - DMA2 stream 5 channel 6 moves pixels from the scan buffer to the high
//!   byte of GPIOE, i.e. PE8 through PE15.
//! - PB7 is vsync, driven by software.

mod clocks;
mod shock;

use core::sync::atomic::{AtomicBool, Ordering};

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::{NVIC, SCB};
use stm32f4::stm32f407 as device;

use crate::driver::scanout::{ScanoutPlan, TransferUnit};
use crate::driver::{Buffers, Driver, ScanBuffer, WorkingBuffer};
use crate::hw::{
    ClockControl, LineEvents, LineTimers, PixelTimer, Platform, StreamEngine,
    SyncOutputs, VideoPort,
};
use crate::priority::I0;
use crate::timing::{ClockConfig, LineTimerConfig, Polarity};
use crate::util::armv7m::{
    clear_pending_irq, clear_pending_sv, disable_irq, enable_irq,
};
use crate::util::measurement;

pub use self::clocks::configure_clocks;
pub use self::shock::tim3_shock_isr;

/// Address of the high byte of GPIOE's output data register.
const VIDEO_PORT: u32 = 0x4002_1015;

/// The driver instance served by the ISR entry points below.
pub static VGA: Driver<Stm32Hw> = Driver::new();

/// Records whether `init` has run, since its buffers can only be handed out
/// once.
static HW_INIT_FLAG: AtomicBool = AtomicBool::new(false);

/// The peripherals used by the driver.
pub struct Stm32Hw {
    nvic: NVIC,
    rcc: device::RCC,
    flash: device::FLASH,
    gpiob: device::GPIOB,
    gpioe: device::GPIOE,
    tim1: device::TIM1,
    tim3: device::TIM3,
    tim4: device::TIM4,
    dma2: device::DMA2,
    /// Stream control value that starts the prepared transfer.
    xfer: u32,
}

impl LineTimers for Stm32Hw {
    const SHOCK_LEAD: u32 = 20;

    fn stop_line_timers(&mut self) {
        // Place the timers in reset, disabling interrupts.
        disable_irq(&mut self.nvic, device::Interrupt::TIM4);
        disable_irq(&mut self.nvic, device::Interrupt::TIM3);
        self.rcc
            .apb1rstr
            .modify(|_, w| w.tim4rst().set_bit().tim3rst().set_bit());
        cortex_m::asm::dsb();
        clear_pending_irq(device::Interrupt::TIM4);
        clear_pending_irq(device::Interrupt::TIM3);
    }

    fn configure_line_timers(&mut self, config: &LineTimerConfig) {
        self.rcc
            .apb1enr
            .modify(|_, w| w.tim3en().set_bit().tim4en().set_bit());
        cortex_m::asm::dsb();
        self.rcc
            .apb1rstr
            .modify(|_, w| w.tim3rst().clear_bit().tim4rst().clear_bit());
        cortex_m::asm::dsb();

        configure_line_timer(&self.tim3, config);
        configure_line_timer(&self.tim4, config);

        // Move TIM3's CC2 ahead of active video.
        self.tim3.ccr2.write(|w| w.ccr2().bits(config.shock));

        // TIM3 distributes its enable signal as its trigger output...
        self.tim3.cr2.write(|w| w.mms().enable().ccds().clear_bit());
        // ...and TIM4 starts on that trigger (TS = ITR2, SMS = trigger mode).
        // Safety: the slave mode fields aren't modeled; this is a valid
        // combination.
        self.tim4
            .smcr
            .write(|w| unsafe { w.bits((0b010 << 4) | 0b110) });

        self.tim4.dier.write(|w| {
            w.cc2ie()
                .set_bit() // start of active video
                .cc3ie()
                .set_bit() // end of active video
        });
        self.tim3.dier.write(|w| w.cc2ie().set_bit());
    }

    fn start_line_timers(&mut self) {
        // Start TIM3, which starts TIM4.
        self.tim3.cr1.modify(|_, w| w.cen().set_bit());

        // TIM4 has to be on before TIM3, or TIM3 may just wake up and idle
        // forever.
        enable_irq(&mut self.nvic, device::Interrupt::TIM4);
        enable_irq(&mut self.nvic, device::Interrupt::TIM3);
    }

    fn take_line_events(&mut self) -> LineEvents {
        let sr = self.tim4.sr.read();
        // Safety: SR is write-zero-to-clear; writing back what we read, less
        // the flags we handle, leaves the rest alone.
        self.tim4.sr.write(|w| {
            unsafe { w.bits(sr.bits()) }
                .cc2if()
                .clear_bit()
                .cc3if()
                .clear_bit()
        });
        LineEvents {
            active_start: sr.cc2if().bit_is_set(),
            active_end: sr.cc3if().bit_is_set(),
        }
    }

    fn set_active_start(&mut self, position: u32) {
        self.tim4.ccr2.write(|w| w.ccr2().bits(position));
    }
}

/// Loads one of the line timers. Both count in pixels, share a period and
/// produce the hsync waveform on CH1, though only TIM3's is pinned out.
fn configure_line_timer(
    tim: &device::tim3::RegisterBlock,
    config: &LineTimerConfig,
) {
    // Safety: the prescaler field isn't modeled; any 16-bit value works.
    tim.psc
        .write(|w| unsafe { w.bits(config.ticks_per_pixel - 1) });
    tim.arr.write(|w| w.arr().bits(config.period - 1));

    tim.ccr1.write(|w| w.ccr1().bits(config.sync_end));
    tim.ccr2.write(|w| w.ccr2().bits(config.active_start));
    tim.ccr3.write(|w| w.ccr3().bits(config.active_end));

    // CH1 in PWM mode 1 (OC1M = 0b110), as an output (CC1S = 0).
    // Safety: the output compare mode fields aren't modeled.
    tim.ccmr1_output.write(|w| unsafe { w.bits(0b110 << 4) });

    tim.ccer.write(|w| {
        w.cc1e()
            .set_bit()
            .cc1p()
            .bit(config.hsync_polarity == Polarity::Negative)
    });
}

impl PixelTimer for Stm32Hw {
    const DRQ_LEAD: u32 = 2;

    fn load_pixel_timer(&mut self, reload: u32, preload: u32) {
        // Safety: the TIM1 count fields aren't modeled; these are both
        // less than a line of pixels.
        self.tim1.arr.write(|w| unsafe { w.bits(reload) });
        // Force an update to reset the timer state.
        self.tim1.egr.write(|w| w.ug().set_bit());
        // Gotta do this after the update event, which clears CNT.
        self.tim1.cnt.write(|w| unsafe { w.bits(preload) });
        self.tim1.sr.reset();
    }

    fn run_pixel_timer(&mut self, run: bool) {
        self.tim1.cr1.write(|w| w.urs().counter_only().cen().bit(run));
    }
}

impl StreamEngine for Stm32Hw {
    fn stream_busy(&self) -> bool {
        self.dma2.s5cr.read().en().bit_is_set()
    }

    fn prepare_stream(&mut self, plan: &ScanoutPlan, source: *const u32) {
        let dma = &self.dma2;
        // Shut off the stream for reconfiguration.
        dma.s5cr.modify(|_, w| w.en().clear_bit());

        let source = source as u32;
        let (count, (par, m0ar)) = match *plan {
            // Memory to the port, one byte per pacing request.
            ScanoutPlan::Paced { count, .. } => (count, (VIDEO_PORT, source)),
            // Memory to memory at full speed. The controller insists the
            // source be on the "peripheral" side for this.
            ScanoutPlan::Direct { count, .. } => (count, (source, VIDEO_PORT)),
        };
        // Safety: both are the addresses of things that outlive the
        // transfer.
        dma.s5par.write(|w| unsafe { w.bits(par) });
        dma.s5m0ar.write(|w| unsafe { w.bits(m0ar) });
        dma.s5ndtr.write(|w| w.ndt().bits(count as u16));

        // Load everything but the enable bit now, so that starting the
        // transfer at SAV is a single store.
        dma.s5cr.write(|w| {
            let w = w
                .chsel()
                .bits(6)
                .pl()
                .very_high()
                .pburst()
                .single()
                .mburst()
                .single();
            match *plan {
                ScanoutPlan::Paced { unit, .. } => {
                    let w = w
                        .dir()
                        .memory_to_peripheral()
                        .minc()
                        .set_bit()
                        .pinc()
                        .clear_bit()
                        .psize()
                        .byte()
                        .msize();
                    match unit {
                        TransferUnit::Word => w.word(),
                        TransferUnit::HalfWord => w.half_word(),
                        TransferUnit::Byte => w.byte(),
                    }
                }
                ScanoutPlan::Direct { unit, .. } => {
                    let w = w
                        .dir()
                        .memory_to_memory()
                        .pinc()
                        .set_bit()
                        .minc()
                        .clear_bit()
                        .msize()
                        .byte()
                        .psize();
                    match unit {
                        TransferUnit::Word => w.word(),
                        TransferUnit::HalfWord => w.half_word(),
                        TransferUnit::Byte => w.byte(),
                    }
                }
            }
        });
        self.xfer = dma.s5cr.read().bits() | 1;
    }

    fn clear_stream_flags(&mut self) {
        // HIFCR is a write-1-to-clear register.
        self.dma2.hifcr.write(|w| {
            w.cdmeif5()
                .set_bit()
                .cteif5()
                .set_bit()
                .chtif5()
                .set_bit()
                .ctcif5()
                .set_bit()
        });
    }

    fn start_stream(&mut self) {
        let xfer = self.xfer;
        // Safety: this is the value `prepare_stream` built, plus EN.
        self.dma2.s5cr.write(|w| unsafe { w.bits(xfer) });
    }
}

impl SyncOutputs for Stm32Hw {
    fn sync_on(&mut self) {
        let gpiob = &self.gpiob;
        // Configure PB6/PB7 for fairly sharp edges.
        gpiob.ospeedr.modify(|_, w| {
            w.ospeedr6().high_speed().ospeedr7().high_speed()
        });
        // Disable pullups/pulldowns.
        gpiob
            .pupdr
            .modify(|_, w| w.pupdr6().floating().pupdr7().floating());
        // Configure PB6 as AF2 and PB7 as output.
        gpiob.afrl.modify(|_, w| w.afrl6().af2());
        gpiob
            .moder
            .modify(|_, w| w.moder6().alternate().moder7().output());
    }

    fn sync_off(&mut self) {
        let gpiob = &self.gpiob;
        gpiob.moder.modify(|_, w| w.moder6().input().moder7().input());
        gpiob
            .pupdr
            .modify(|_, w| w.pupdr6().pull_down().pupdr7().pull_down());
    }

    fn set_vsync_idle(&mut self, polarity: Polarity) {
        match polarity {
            Polarity::Positive => self.gpiob.bsrr.write(|w| w.br7().set_bit()),
            Polarity::Negative => self.gpiob.bsrr.write(|w| w.bs7().set_bit()),
        }
    }

    fn toggle_vsync(&mut self) {
        let odr = self.gpiob.odr.read().bits();
        let mask = 1 << 7;
        // Set the bit if clear, reset it if set, in one store.
        // Safety: BSRR writes only affect the pins named.
        self.gpiob
            .bsrr
            .write(|w| unsafe { w.bits((!odr & mask) | ((odr & mask) << 16)) });
    }
}

impl VideoPort for Stm32Hw {
    fn video_on(&mut self) {
        let gpioe = &self.gpioe;
        // Disable pullups/pulldowns.
        gpioe.pupdr.modify(|_, w| {
            w.pupdr8()
                .floating()
                .pupdr9()
                .floating()
                .pupdr10()
                .floating()
                .pupdr11()
                .floating()
                .pupdr12()
                .floating()
                .pupdr13()
                .floating()
                .pupdr14()
                .floating()
                .pupdr15()
                .floating()
        });
        // Very sharp edges: this sets the output filter to 100MHz, which is an
        // improvement at a 40MHz pixel clock.
        gpioe.ospeedr.modify(|_, w| {
            w.ospeedr8()
                .very_high_speed()
                .ospeedr9()
                .very_high_speed()
                .ospeedr10()
                .very_high_speed()
                .ospeedr11()
                .very_high_speed()
                .ospeedr12()
                .very_high_speed()
                .ospeedr13()
                .very_high_speed()
                .ospeedr14()
                .very_high_speed()
                .ospeedr15()
                .very_high_speed()
        });
        gpioe.moder.modify(|_, w| {
            w.moder8()
                .output()
                .moder9()
                .output()
                .moder10()
                .output()
                .moder11()
                .output()
                .moder12()
                .output()
                .moder13()
                .output()
                .moder14()
                .output()
                .moder15()
                .output()
        });
    }

    fn video_off(&mut self) {
        let gpioe = &self.gpioe;
        gpioe.pupdr.modify(|_, w| {
            w.pupdr8()
                .pull_down()
                .pupdr9()
                .pull_down()
                .pupdr10()
                .pull_down()
                .pupdr11()
                .pull_down()
                .pupdr12()
                .pull_down()
                .pupdr13()
                .pull_down()
                .pupdr14()
                .pull_down()
                .pupdr15()
                .pull_down()
        });
        gpioe.moder.modify(|_, w| {
            w.moder8()
                .input()
                .moder9()
                .input()
                .moder10()
                .input()
                .moder11()
                .input()
                .moder12()
                .input()
                .moder13()
                .input()
                .moder14()
                .input()
                .moder15()
                .input()
        });
    }
}

impl ClockControl for Stm32Hw {
    fn configure_clocks(&mut self, config: &ClockConfig) {
        configure_clocks(&self.rcc, &self.flash, config)
    }
}

impl Platform for Stm32Hw {
    fn pend_deferred() {
        SCB::set_pendsv()
    }

    fn unpend_deferred() {
        clear_pending_sv()
    }

    fn wait_for_interrupt() {
        cortex_m::asm::wfi()
    }

    fn interrupt_free<R>(f: impl FnOnce() -> R) -> R {
        cortex_m::interrupt::free(|_| f())
    }
}

/// Initializes the driver using the given hardware capabilities, and returns
/// it.
///
/// You can get the capabilities from the `cortex_m` and `stm32f4` crates like
/// so:
///
/// ```ignore
/// let mut cp = cortex_m::peripheral::Peripherals::take().unwrap();
/// let p = stm32f4::stm32f407::Peripherals::take().unwrap();
///
/// let vga = vscan::init(
///     cp.NVIC,
///     &mut cp.SCB,
///     p.FLASH,
///     &p.DBG,
///     p.RCC,
///     p.GPIOB,
///     p.GPIOE,
///     p.TIM1,
///     p.TIM3,
///     p.TIM4,
///     p.DMA2,
///     None,
/// );
/// ```
///
/// Output is off; you will likely want to call `apply` next, followed by
/// `configure_band_list` and `video_on`. `hblank`, if given, runs on every
/// line; see `Driver::init`.
///
/// This variant is useful if you want to *retain* access to peripherals not
/// used by the driver, to do other things. If you're not using hardware other
/// than video output, [`take_hardware`] is a simpler option.
///
/// After a `teardown`, hand the returned hardware and buffers back to
/// `VGA.init` rather than calling this again.
///
/// # Panics
///
/// If called more than once.
///
/// [`take_hardware`]: fn.take_hardware.html
pub fn init(
    mut nvic: NVIC,
    scb: &mut SCB,
    flash: device::FLASH,
    dbg: &device::DBG,
    rcc: device::RCC,
    gpiob: device::GPIOB,
    gpioe: device::GPIOE,
    tim1: device::TIM1,
    tim3: device::TIM3,
    tim4: device::TIM4,
    dma2: device::DMA2,
    hblank: Option<fn(I0)>,
) -> &'static Driver<Stm32Hw> {
    let previous_instance = HW_INIT_FLAG.swap(true, Ordering::SeqCst);
    assert_eq!(previous_instance, false, "stm32 hardware already initialized");

    unsafe {
        measurement::init();
    }

    // Ensure that our interrupts are disabled.
    disable_irq(&mut nvic, device::Interrupt::TIM3);
    disable_irq(&mut nvic, device::Interrupt::TIM4);

    // Turn on I/O compensation cell to reduce noise on power supply.
    rcc.apb2enr.modify(|_, w| w.syscfgen().enabled());

    // Turn a bunch of stuff on.
    rcc.ahb1enr.modify(|_, w| {
        w.gpioben().enabled().gpioeen().enabled().dma2en().enabled()
    });
    cortex_m::asm::dmb(); // ensure DMA is powered on before we write to it

    // Configure the DMA FIFO.
    dma2.s5fcr
        .write(|w| w.fth().quarter().dmdis().enabled().feie().disabled());

    // Enable the pixel pacing timer. TIM1 is an APB2 (fast) peripheral, and
    // with our clock configs it gets clocked at the full CPU rate. Its reload
    // value is set per line to synthesize 1/n rates.
    rcc.apb2enr.modify(|_, w| w.tim1en().enabled());
    tim1.psc.reset(); // Divide by 1 => PSC=0
    tim1.cr1.write(|w| w.urs().counter_only());
    tim1.dier.write(|w| w.ude().set_bit());

    // Configure interrupt priorities.
    // Safety: messing with interrupt priorities is inherently unsafe, but we
    // disabled our device interrupts above and haven't pended a PendSV.
    unsafe {
        nvic.set_priority(device::Interrupt::TIM4, 0x00);
        nvic.set_priority(device::Interrupt::TIM3, 0x10);
        scb.set_priority(SystemHandler::PendSV, 0xFF);
    }

    // Enable Flash cache and prefetching to reduce jitter.
    flash.acr.modify(|_, w| {
        w.dcen().enabled().icen().enabled().prften().enabled()
    });

    // Stop all video-related timers on debug halt, which makes debugging
    // waaaaay easier.
    dbg.dbgmcu_apb1_fz
        .modify(|_, w| w.dbg_tim4_stop().set_bit().dbg_tim3_stop().set_bit());
    dbg.dbgmcu_apb2_fz.modify(|_, w| w.dbg_tim1_stop().set_bit());

    let hw = Stm32Hw {
        nvic,
        rcc,
        flash,
        gpiob,
        gpioe,
        tim1,
        tim3,
        tim4,
        dma2,
        xfer: 0,
    };

    // `HW_INIT_FLAG` ensures these are reached once.
    let buffers = Buffers {
        working: cortex_m::singleton!(: WorkingBuffer = WorkingBuffer::new())
            .expect("working buffer taken"),
        scan: cortex_m::singleton!(: ScanBuffer = ScanBuffer::new())
            .expect("scan buffer taken"),
    };

    VGA.init(hw, buffers, hblank);
    &VGA
}

/// Starts up the video driver, taking possession of all hardware peripherals.
///
/// ```ignore
/// let vga = vscan::take_hardware(None);
/// ```
///
/// This is shorthand for [`init`] for cases where you don't plan on using
/// hardware other than video output.
///
/// # Panics
///
/// If the peripherals have already been taken.
///
/// [`init`]: fn.init.html
pub fn take_hardware(hblank: Option<fn(I0)>) -> &'static Driver<Stm32Hw> {
    let mut cp = cortex_m::Peripherals::take().expect("core peripherals taken");
    let p = device::Peripherals::take().expect("device peripherals taken");

    init(
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
        hblank,
    )
}

/// Horizontal state machine ISR: call this from `TIM4`.
///
/// This is one of three ISRs you must wire up for the driver to work:
///
/// ```ignore
/// use stm32f4::stm32f407::interrupt;
///
/// #[interrupt]
/// fn TIM4() {
///     vscan::tim4_horiz_isr()
/// }
/// ```
pub fn tim4_horiz_isr() {
    VGA.hstate_isr()
}

/// Rasterization ISR: call this from `PendSV`.
///
/// This is one of three ISRs you must wire up for the driver to work:
///
/// ```ignore
/// #[cortex_m_rt::exception]
/// fn PendSV() {
///     vscan::pendsv_raster_isr()
/// }
/// ```
pub fn pendsv_raster_isr() {
    VGA.deferred_isr()
}
