//! The scanout engine.
//!
//! A [`Driver`] holds all of the engine's state. It's driven from two
//! interrupt handlers:
//!
//! - [`hstate_isr`], at high priority, runs at the start and end of active
//!   video on every line. It starts pixel transfers and tracks where the beam
//!   is.
//! - [`deferred_isr`], at the lowest priority, runs once per line after the
//!   end of active video. It prepares the next transfer and renders one line
//!   ahead.
//!
//! Applications talk to it from thread mode through the remaining methods.
//!
//! [`Driver`]: struct.Driver.html
//! [`hstate_isr`]: struct.Driver.html#method.hstate_isr
//! [`deferred_isr`]: struct.Driver.html#method.deferred_isr

pub mod buffer;
pub mod isr;
pub mod scanout;
pub mod vstate;

use core::ptr;
use core::sync::atomic::{
    AtomicBool, AtomicIsize, AtomicPtr, AtomicUsize, Ordering,
};

use scopeguard::defer;

use crate::band::Band;
use crate::hw::Hardware;
use crate::priority::{Thread, I0};
use crate::rast::RasterInfo;
use crate::timing::{Timing, TimingError, MIN_CYCLES_PER_PIXEL};
use crate::util::spin_lock::{SpinLock, SpinLockGuard};

pub use self::buffer::{ScanBuffer, WorkingBuffer};
pub use self::vstate::VState;

/// The two line buffers the driver needs, loaned to it for as long as it runs.
///
/// These are kept apart so that rendering into `working` can't disturb a
/// transfer out of `scan`. On parts with several SRAMs, put them in different
/// ones.
pub struct Buffers {
    pub working: &'static mut WorkingBuffer,
    pub scan: &'static mut ScanBuffer,
}

/// Hardware shared by the two interrupt handlers, and the pacing decision
/// made by the deferred task for the next start of active video.
struct Shared<H> {
    hw: H,
    use_timer: bool,
}

/// State private to the deferred task.
struct RasterState {
    buffers: Buffers,
    /// Shape of the line in the working buffer, clamped. Its `repeat_lines`
    /// counts down as the line is repeated.
    shape: RasterInfo,
    /// A new line has been rendered since the scan buffer was last updated.
    update_scan_buffer: bool,
    hblank: Option<fn(I0)>,
}

/// Scanout engine state, for a particular kind of hardware `H`.
///
/// This is normally a `static`, since the interrupt handlers need to find it.
/// The lifecycle is:
///
/// 1. `new` (usable in a `static` initializer).
/// 2. `init`, to hand over the hardware and buffers.
/// 3. `apply`, to start generating sync. Can be repeated to change modes.
/// 4. `configure_band_list` or `with_band_list`, to produce pixels, and
///    `video_on` to let them out.
/// 5. Optionally, `teardown` to get the hardware back.
pub struct Driver<H> {
    /// Set by `init`; only one initialization is allowed at a time.
    init_flag: AtomicBool,
    /// Set once sync is being generated.
    configured: AtomicBool,

    /// Current scanline, counted from the top of the vertical blanking
    /// interval.
    line: AtomicUsize,
    /// Current `VState`, as its discriminant.
    vstate: AtomicUsize,
    /// First line of active video in the current mode.
    video_start_line: AtomicUsize,
    /// Horizontal shift requested by the most recent rasterizer.
    offset: AtomicIsize,

    /// Head of the band list, or null for none.
    band_head: AtomicPtr<Band<'static>>,
    /// Set when the line handler copies `band_head` at the top of a frame.
    band_taken: AtomicBool,

    shared: SpinLock<Option<Shared<H>>>,
    /// Shared copy of the current timing settings. Locked at different times
    /// than `shared`, and so stands separate.
    timing: SpinLock<Option<Timing>>,
    /// Working copy of the band being rendered.
    band: SpinLock<Band<'static>>,
    raster: SpinLock<Option<RasterState>>,
}

impl<H> Driver<H> {
    pub const fn new() -> Self {
        Driver {
            init_flag: AtomicBool::new(false),
            configured: AtomicBool::new(false),
            line: AtomicUsize::new(0),
            vstate: AtomicUsize::new(VState::Blank as usize),
            video_start_line: AtomicUsize::new(0),
            offset: AtomicIsize::new(0),
            band_head: AtomicPtr::new(ptr::null_mut()),
            band_taken: AtomicBool::new(false),
            shared: SpinLock::new(None),
            timing: SpinLock::new(None),
            band: SpinLock::new(Band::EMPTY),
            raster: SpinLock::new(None),
        }
    }

    /// Current scanline, counted from the top of the vertical blanking
    /// interval. Before `apply`, this is zero.
    pub fn current_line(&self) -> usize {
        self.line.load(Ordering::Relaxed)
    }

    pub fn vert_state(&self) -> VState {
        VState::from_bits(self.vstate.load(Ordering::Relaxed))
    }

    fn set_vert_state(&self, s: VState) {
        self.vstate.store(s as usize, Ordering::Relaxed)
    }

    /// Checks whether the beam is in the vertical blanking interval.
    pub fn in_vblank(&self) -> bool {
        self.current_line() < self.video_start_line.load(Ordering::Relaxed)
    }

    fn assert_configured(&self) {
        assert!(
            self.configured.load(Ordering::Acquire),
            "driver not generating sync"
        );
    }
}

impl<H: Hardware> Driver<H> {
    /// Hands the hardware and buffers to the driver.
    ///
    /// Sync and video outputs are turned off, and stay that way until `apply`.
    /// `hblank`, if provided, is called from the deferred task on every line,
    /// after the next transfer has been prepared but before rendering.
    ///
    /// # Panics
    ///
    /// If the driver has already been initialized (and not torn down).
    pub fn init(&self, mut hw: H, buffers: Buffers, hblank: Option<fn(I0)>) {
        let previous_instance = self.init_flag.swap(true, Ordering::SeqCst);
        assert_eq!(previous_instance, false, "driver already initialized");

        hw.sync_off();
        hw.video_off();
        hw.stop_line_timers();

        *self.shared.try_lock().expect("init: hw") = Some(Shared {
            hw,
            use_timer: false,
        });
        *self.raster.try_lock().expect("init: raster") = Some(RasterState {
            buffers,
            shape: RasterInfo::blank(MIN_CYCLES_PER_PIXEL),
            update_scan_buffer: false,
            hblank,
        });
    }

    /// Switches to a new video mode and starts generating sync.
    ///
    /// The timing is checked first; if it can't be used, nothing changes and
    /// the reason is returned. Otherwise, the outputs are shut off, the clocks
    /// and line timers reprogrammed, the line buffers reset, and sync started
    /// from the top of the frame. Video output is left off; see `video_on`.
    ///
    /// The timing is copied, so the caller's value can be discarded.
    ///
    /// # Panics
    ///
    /// If the driver hasn't been initialized.
    pub fn apply(&self, timing: &Timing) -> Result<(), TimingError> {
        let config = timing.line_timer_config(H::SHOCK_LEAD)?;

        H::interrupt_free(|| {
            let mut shared = acquire(&self.shared, "apply: hw");
            let mut raster = acquire(&self.raster, "apply: raster");

            let hw = &mut shared.hw;
            hw.sync_off();
            hw.video_off();
            hw.stop_line_timers();
            hw.run_pixel_timer(false);
            while hw.stream_busy() {
                // busy wait
            }

            hw.configure_clocks(&timing.clock_config);
            hw.configure_line_timers(&config);
            hw.set_vsync_idle(timing.vsync_polarity);

            raster.buffers.working.scribble();
            raster.buffers.scan.clear();
            raster.shape = RasterInfo::blank(timing.cycles_per_pixel);
            raster.update_scan_buffer = false;
            shared.use_timer = false;

            *self.timing.try_lock().expect("apply: timing") = Some(*timing);
            self.line.store(0, Ordering::Relaxed);
            self.set_vert_state(VState::Blank);
            self.offset.store(0, Ordering::Relaxed);
            self.video_start_line
                .store(timing.video_start_line, Ordering::Relaxed);
            H::unpend_deferred();
            self.configured.store(true, Ordering::Release);

            let hw = &mut shared.hw;
            hw.start_line_timers();
            hw.sync_on();
        });
        Ok(())
    }

    /// Stops all output and returns the hardware and buffers, leaving the
    /// driver ready for another `init`. Returns `None` if it wasn't
    /// initialized.
    ///
    /// The band list is cleared without waiting.
    pub fn teardown(&self) -> Option<(H, Buffers)> {
        if !self.init_flag.load(Ordering::SeqCst) {
            return None;
        }
        H::interrupt_free(|| {
            let mut shared = self.shared.try_lock().expect("teardown: hw");
            let mut raster = self.raster.try_lock().expect("teardown: raster");
            let Shared { mut hw, .. } = shared.take()?;
            let RasterState { buffers, .. } = raster.take()?;

            hw.stop_line_timers();
            hw.run_pixel_timer(false);
            hw.sync_off();
            hw.video_off();
            while hw.stream_busy() {
                // busy wait
            }
            H::unpend_deferred();

            *self.timing.try_lock().expect("teardown: timing") = None;
            *self.band.try_lock().expect("teardown: band") = Band::EMPTY;
            self.band_head.store(ptr::null_mut(), Ordering::Release);
            self.band_taken.store(false, Ordering::Relaxed);
            self.configured.store(false, Ordering::Release);
            self.line.store(0, Ordering::Relaxed);
            self.set_vert_state(VState::Blank);
            self.offset.store(0, Ordering::Relaxed);
            self.video_start_line.store(0, Ordering::Relaxed);
            self.init_flag.store(false, Ordering::SeqCst);
            Some((hw, buffers))
        })
    }

    /// Enables video output. This is not synchronized and can happen in the
    /// middle of the frame; if that bothers you, synchronize with vblank.
    pub fn video_on(&self) {
        H::interrupt_free(|| acquire(&self.shared, "video_on").hw.video_on())
    }

    /// Disables video output. This is not synchronized and can happen in the
    /// middle of the frame; if that bothers you, synchronize with vblank.
    pub fn video_off(&self) {
        H::interrupt_free(|| acquire(&self.shared, "video_off").hw.video_off())
    }

    /// Installs `head` as the band list, starting with the next frame.
    pub fn configure_band_list(&self, head: &'static Band<'static>) {
        self.band_head.store(
            head as *const Band<'static> as *mut Band<'static>,
            Ordering::Release,
        );
        self.band_taken.store(false, Ordering::Release);
    }

    /// Removes the band list, waiting until the driver has stopped using it.
    /// This takes until the top of the next frame.
    ///
    /// # Panics
    ///
    /// If sync isn't being generated, since the wait would never end.
    pub fn clear_band_list(&self, _: &Thread) {
        self.assert_configured();
        self.band_head.store(ptr::null_mut(), Ordering::Release);
        self.band_taken.store(false, Ordering::Release);
        while !self.band_taken.load(Ordering::Acquire) {
            H::wait_for_interrupt();
        }
    }

    /// Uses `head` as the band list while running `scope`, then clears it.
    ///
    /// Unlike `configure_band_list`, the bands and rasterizers needn't be
    /// `'static`: they're guaranteed out of use by the time this returns,
    /// including when `scope` panics.
    ///
    /// # Panics
    ///
    /// If sync isn't being generated.
    pub fn with_band_list<'b, R>(
        &self,
        head: &Band<'b>,
        thread: &Thread,
        scope: impl FnOnce(&Self) -> R,
    ) -> R {
        self.assert_configured();
        // Safety: the driver stops looking at the list before
        // clear_band_list returns, and the guard below runs that before
        // `head` can go out of scope.
        let head: &'static Band<'static> =
            unsafe { core::mem::transmute::<&Band<'b>, _>(head) };
        self.configure_band_list(head);
        defer! {
            self.clear_band_list(thread);
        }
        scope(self)
    }

    /// Waits until the beam is in the vertical blanking interval. Returns at
    /// once if it already is.
    ///
    /// # Panics
    ///
    /// If sync isn't being generated.
    pub fn wait_for_vblank(&self, _: &Thread) {
        self.assert_configured();
        while !self.in_vblank() {
            H::wait_for_interrupt();
        }
    }

    /// Waits for the *transition* from active video to vertical blank. If
    /// called during vblank, this waits for an entire frame, so that a loop
    /// around it runs once per frame.
    ///
    /// # Panics
    ///
    /// If sync isn't being generated.
    pub fn sync_to_vblank(&self, thread: &Thread) {
        self.assert_configured();
        while self.in_vblank() {
            H::wait_for_interrupt();
        }
        self.wait_for_vblank(thread);
    }

    #[cfg(test)]
    pub(crate) fn with_hw<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut acquire(&self.shared, "test").hw)
    }
}

/// Pattern for acquiring state loaned to an interrupt handler.
///
/// # Panics
///
/// If the lock is held, which implies that two handlers are colliding (one
/// overran) or that a previous holder leaked its guard. Also if the state
/// hasn't been provided, which implies the handler was enabled too early.
/// Either message starts with `context`.
fn acquire<'a, T: Send>(
    lock: &'a SpinLock<Option<T>>,
    context: &'static str,
) -> SpinLockGuard<'a, T> {
    match lock.try_lock() {
        Ok(guard) => SpinLockGuard::map(guard, |o| match o {
            Some(contents) => contents,
            None => panic!("{}: driver not initialized", context),
        }),
        Err(_) => panic!("{}: lock held", context),
    }
}

#[cfg(test)]
mod tests;
