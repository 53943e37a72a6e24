//! Hardware capabilities used by the driver.
//!
//! The driver doesn't touch registers itself. Instead it's generic over a
//! `Hardware` implementation that provides these operations, and that type
//! owns whatever peripherals it needs. The STM32F407 implementation lives in
//! `vscan::stm32`.
//!
//! Most operations take `&mut self`: the driver keeps the hardware behind a
//! lock, and whoever holds the lock has exclusive use of it. Operations on
//! `Platform` concern the processor itself and take no receiver.

use crate::driver::scanout::ScanoutPlan;
use crate::timing::{ClockConfig, LineTimerConfig, Polarity};

/// Line timer events that have occurred since the last check.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LineEvents {
    /// Start of active video (SAV).
    pub active_start: bool,
    /// End of active video (EAV).
    pub active_end: bool,
}

/// The two chained timers that generate horizontal timing.
///
/// The primary timer produces the hsync pulse and an early warning shortly
/// before active video. The scanout timer, started in lockstep with the
/// primary, raises the SAV and EAV events.
pub trait LineTimers {
    /// How many pixels before SAV the early warning fires.
    const SHOCK_LEAD: u32;

    /// Stops both timers and ensures their interrupts can neither fire nor be
    /// left pending.
    fn stop_line_timers(&mut self);
    /// Loads a new configuration. The timers must be stopped.
    fn configure_line_timers(&mut self, config: &LineTimerConfig);
    /// Starts both timers together and enables their interrupts.
    fn start_line_timers(&mut self);
    /// Reads and acknowledges pending SAV/EAV events.
    fn take_line_events(&mut self) -> LineEvents;
    /// Moves the SAV event for subsequent lines.
    fn set_active_start(&mut self, position: u32);
}

/// Timer that paces the stream engine for pixels wider than the minimum.
pub trait PixelTimer {
    /// How many cycles before its period elapses the timer is preloaded, so
    /// that its first request arrives promptly.
    const DRQ_LEAD: u32;

    /// Sets the period (as a reload value) and the starting count.
    fn load_pixel_timer(&mut self, reload: u32, preload: u32);
    /// Starts or stops the timer.
    fn run_pixel_timer(&mut self, run: bool);
}

/// The DMA stream that carries pixels to the output port.
pub trait StreamEngine {
    /// Checks whether a transfer is still in progress.
    fn stream_busy(&self) -> bool;
    /// Loads everything about the next transfer except the final enable.
    /// `source` is the first word of the scan buffer.
    fn prepare_stream(&mut self, plan: &ScanoutPlan, source: *const u32);
    /// Clears status flags left by the previous transfer.
    fn clear_stream_flags(&mut self);
    /// Starts the prepared transfer. Latency sensitive.
    fn start_stream(&mut self);
}

/// Horizontal and vertical sync outputs.
pub trait SyncOutputs {
    /// Connects the sync pins to their generators.
    fn sync_on(&mut self);
    /// Disconnects the sync pins.
    fn sync_off(&mut self);
    /// Drives vsync to the inactive level for `polarity`.
    fn set_vsync_idle(&mut self, polarity: Polarity);
    /// Flips vsync.
    fn toggle_vsync(&mut self);
}

/// The parallel port carrying pixel data.
pub trait VideoPort {
    fn video_on(&mut self);
    fn video_off(&mut self);
}

/// The system clock tree.
pub trait ClockControl {
    /// Switches the CPU and bus clocks. This may take a while.
    fn configure_clocks(&mut self, config: &ClockConfig);
}

/// Processor-level operations.
pub trait Platform {
    /// Requests the deferred task, to run once the line interrupt returns.
    fn pend_deferred();
    /// Cancels a pending request for the deferred task.
    fn unpend_deferred();
    /// Idles until some interrupt has been handled.
    fn wait_for_interrupt();
    /// Runs `f` with interrupts masked.
    fn interrupt_free<R>(f: impl FnOnce() -> R) -> R;
}

/// Everything the driver needs from the hardware.
pub trait Hardware:
    LineTimers
    + PixelTimer
    + StreamEngine
    + SyncOutputs
    + VideoPort
    + ClockControl
    + Platform
    + Send
{
}

impl<T> Hardware for T where
    T: LineTimers
        + PixelTimer
        + StreamEngine
        + SyncOutputs
        + VideoPort
        + ClockControl
        + Platform
        + Send
{
}

/// Simulated hardware for host tests.
#[cfg(test)]
pub mod mock {
    use core::cell::{Cell, RefCell};

    use super::*;

    thread_local! {
        static PENDED: Cell<bool> = Cell::new(false);
        static ON_WAIT: RefCell<Option<Box<dyn FnMut()>>> = RefCell::new(None);
    }

    /// Reports whether the deferred task is pending, and clears it.
    pub fn take_pended() -> bool {
        PENDED.with(|p| p.replace(false))
    }

    /// Installs something to happen each time the driver idles, standing in
    /// for the interrupts that would wake it.
    pub fn on_wait(f: impl FnMut() + 'static) {
        ON_WAIT.with(|w| *w.borrow_mut() = Some(Box::new(f)));
    }

    /// Records what the driver has done to it.
    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct MockHw {
        pub clocks: Option<ClockConfig>,
        pub line_timers: Option<LineTimerConfig>,
        pub timers_running: bool,
        pub active_start: u32,
        /// Events to report at the next `take_line_events`.
        pub events: LineEvents,

        pub pixel_timer: (u32, u32),
        pub pixel_timer_running: bool,

        pub plan: Option<ScanoutPlan>,
        source: usize,
        pub flags_cleared: bool,
        /// Number of polls for which the stream still reports busy.
        pub busy_polls: Cell<usize>,
        /// Bytes sent out by each transfer started.
        pub scanned: Vec<Vec<u8>>,

        pub sync: bool,
        pub vsync_high: bool,
        pub video: bool,
    }

    impl LineTimers for MockHw {
        const SHOCK_LEAD: u32 = 20;

        fn stop_line_timers(&mut self) {
            self.timers_running = false;
            self.events = LineEvents::default();
        }

        fn configure_line_timers(&mut self, config: &LineTimerConfig) {
            assert!(!self.timers_running);
            self.line_timers = Some(*config);
            self.active_start = config.active_start;
        }

        fn start_line_timers(&mut self) {
            self.timers_running = true;
        }

        fn take_line_events(&mut self) -> LineEvents {
            core::mem::replace(&mut self.events, LineEvents::default())
        }

        fn set_active_start(&mut self, position: u32) {
            self.active_start = position;
        }
    }

    impl PixelTimer for MockHw {
        const DRQ_LEAD: u32 = 2;

        fn load_pixel_timer(&mut self, reload: u32, preload: u32) {
            self.pixel_timer = (reload, preload);
        }

        fn run_pixel_timer(&mut self, run: bool) {
            self.pixel_timer_running = run;
        }
    }

    impl StreamEngine for MockHw {
        fn stream_busy(&self) -> bool {
            let n = self.busy_polls.get();
            if n > 0 {
                self.busy_polls.set(n - 1);
                true
            } else {
                false
            }
        }

        fn prepare_stream(&mut self, plan: &ScanoutPlan, source: *const u32) {
            self.plan = Some(*plan);
            self.source = source as usize;
        }

        fn clear_stream_flags(&mut self) {
            self.flags_cleared = true;
        }

        fn start_stream(&mut self) {
            assert!(self.flags_cleared, "stream started with stale flags");
            self.flags_cleared = false;
            let plan = self.plan.take().expect("stream started unprepared");
            // Safety: the driver hands us its scan buffer, which outlives it.
            let bytes = unsafe {
                core::slice::from_raw_parts(
                    self.source as *const u8,
                    plan.transfer_bytes(),
                )
            };
            self.scanned.push(bytes.to_vec());
        }
    }

    impl SyncOutputs for MockHw {
        fn sync_on(&mut self) {
            self.sync = true;
        }

        fn sync_off(&mut self) {
            self.sync = false;
        }

        fn set_vsync_idle(&mut self, polarity: Polarity) {
            self.vsync_high = polarity == Polarity::Negative;
        }

        fn toggle_vsync(&mut self) {
            self.vsync_high = !self.vsync_high;
        }
    }

    impl VideoPort for MockHw {
        fn video_on(&mut self) {
            self.video = true;
        }

        fn video_off(&mut self) {
            self.video = false;
        }
    }

    impl ClockControl for MockHw {
        fn configure_clocks(&mut self, config: &ClockConfig) {
            assert!(!self.timers_running);
            self.clocks = Some(*config);
        }
    }

    impl Platform for MockHw {
        fn pend_deferred() {
            PENDED.with(|p| p.set(true))
        }

        fn unpend_deferred() {
            PENDED.with(|p| p.set(false))
        }

        fn wait_for_interrupt() {
            ON_WAIT.with(|w| match w.borrow_mut().as_mut() {
                Some(f) => f(),
                None => panic!("idle with nothing to wake it"),
            })
        }

        fn interrupt_free<R>(f: impl FnOnce() -> R) -> R {
            f()
        }
    }
}
