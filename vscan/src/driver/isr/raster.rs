//! Interrupt handler for "background" (i.e. lower priority than the timing
//! interrupts) rasterization.

use core::sync::atomic::Ordering;

use crate::driver::scanout::ScanoutPlan;
use crate::driver::{acquire, Driver, RasterState};
use crate::hw::Hardware;
use crate::priority::I0;
use crate::rast::RasterInfo;
use crate::timing::MIN_CYCLES_PER_PIXEL;
use crate::util::measurement::{probe, Signal};
use crate::MAX_PIXELS_PER_LINE;

impl<H: Hardware> Driver<H> {
    /// Deferred task, pended by `hstate_isr` at the end of every line. Must run
    /// at a lower priority than `hstate_isr`.
    ///
    /// During hblank, this moves the line rendered last time into the scan
    /// buffer and prepares its transfer. Then it calls the hblank hook, and
    /// renders the line after next, which can take a while and may run
    /// concurrently with scanout.
    ///
    /// # Panics
    ///
    /// If the driver isn't initialized and configured, or if this overruns
    /// badly enough to collide with `hstate_isr`.
    pub fn deferred_isr(&self) {
        let mut state = acquire(&self.raster, "deferred");
        let state = &mut *state;

        let vs = self.vert_state();

        // First, prepare for scanout from SAV on this line. This frees up the
        // working buffer so that we can overwrite it, and applies pixel timing
        // from the *last* rasterizer run to the scanout machinery so that we can
        // replace it as well.
        //
        // This writes to the scan buffer *and* reprograms the stream, so it
        // *cannot* run concurrently with scanout -- so we do it first, during
        // hblank.
        if vs.is_displayed_state() {
            let _probe = probe(Signal::B);
            if state.update_scan_buffer {
                state
                    .buffers
                    .scan
                    .update(state.buffers.working.target(), state.shape.length);
                state.update_scan_buffer = false;
            }

            let plan = ScanoutPlan::for_line(
                state.shape.length,
                state.shape.cycles_per_pixel,
                H::DRQ_LEAD,
            );
            // Note: we are now racing hstate SAV for control of this lock.
            let mut shared = acquire(&self.shared, "deferred: hw");
            shared.hw.prepare_stream(&plan, state.buffers.scan.as_ptr());
            if let ScanoutPlan::Paced {
                reload, preload, ..
            } = plan
            {
                shared.hw.load_pixel_timer(reload, preload);
            }
            shared.use_timer = plan.is_paced();
        }

        // Allow the application to do additional work during what's left of
        // hblank.
        if let Some(hook) = state.hblank {
            let _probe = probe(Signal::C);
            // Safety: we are, in fact, at I0 priority.
            hook(unsafe { I0::new() });
        }

        // Second, rasterize the *next* line, if there's a useful next line.
        if vs.is_rendered_state() {
            let _probe = probe(Signal::B);
            self.rasterize_next_line(state);
        }
    }

    fn rasterize_next_line(&self, state: &mut RasterState) {
        // Hold the timing lock for as short as possible.
        let timing = self
            .timing
            .try_lock()
            .expect("deferred: timing")
            .expect("deferred: no timing");

        let mut band = self.band.try_lock().expect("deferred: band");
        let edge = band.advance();

        if !edge && state.shape.repeat_lines > 0 {
            state.shape.repeat_lines -= 1;
            return;
        }

        let next_line = self.current_line() + 1;
        let visible_line = next_line.wrapping_sub(timing.video_start_line);
        let cycles_per_pixel = timing.cycles_per_pixel;

        let target = state.buffers.working.target_mut();
        let shape = match band.rasterizer {
            Some(r) => r.rasterize(cycles_per_pixel, visible_line, target),
            None => RasterInfo::blank(cycles_per_pixel),
        };
        state.shape = RasterInfo {
            length: shape.length.min(MAX_PIXELS_PER_LINE),
            cycles_per_pixel: shape.cycles_per_pixel.max(MIN_CYCLES_PER_PIXEL),
            ..shape
        };
        self.offset.store(shape.offset, Ordering::Relaxed);
        state.update_scan_buffer = true;
    }
}
