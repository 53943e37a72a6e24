//! Interrupt handler for horizontal retrace.

use core::ptr;
use core::sync::atomic::Ordering;

use crate::band::Band;
use crate::driver::vstate::{self, VState};
use crate::driver::{acquire, Driver};
use crate::hw::Hardware;
use crate::util::measurement::{probe, Signal};

impl<H: Hardware> Driver<H> {
    /// Horizontal state machine handler, for the line timer's interrupt.
    ///
    /// Runs at the start of active video (SAV), where it kicks off the pixel
    /// transfer prepared by `deferred_isr`, and at the end (EAV), where it
    /// advances the line and vertical state and pends `deferred_isr`.
    ///
    /// This must be the highest-priority interrupt in the system, or SAV
    /// latency will wander and the picture with it.
    ///
    /// # Panics
    ///
    /// If the driver isn't initialized and configured, or if it collides with
    /// an overrunning `deferred_isr`.
    pub fn hstate_isr(&self) {
        let _probe = probe(Signal::A);

        // This also detects races with the deferred task, which is lower
        // priority and can't preempt us.
        let mut shared = acquire(&self.shared, "hstate");
        let events = shared.hw.take_line_events();

        // THIS PATH IS LATENCY SENSITIVE.
        if events.active_start && self.vert_state().is_displayed_state() {
            let use_timer = shared.use_timer;
            let hw = &mut shared.hw;
            hw.clear_stream_flags();
            hw.run_pixel_timer(use_timer);
            hw.start_stream();
        }

        // This path is not latency sensitive, but should be pretty quick to
        // give the deferred task time to do stuff.
        if events.active_end {
            let timing = self
                .timing
                .try_lock()
                .expect("hstate: timing")
                .expect("hstate: no timing");
            let hw = &mut shared.hw;

            // Shut off the pixel timer; only really matters when paced.
            hw.run_pixel_timer(false);

            // Apply the shift requested for the line being rendered now, which
            // is the one that starts next. SAV has to stay ahead of EAV or it
            // never fires.
            let offset = self.offset.load(Ordering::Relaxed);
            let latest = timing.active_end() as isize - 1;
            let start = (timing.active_start() as isize + offset)
                .max(0)
                .min(latest);
            hw.set_active_start(start as u32);

            // Takes effect when we return.
            H::pend_deferred();

            let step = vstate::step(&timing, self.current_line());
            if step.toggle_vsync {
                hw.toggle_vsync();
            }
            match step.enter {
                Some(VState::Starting) => {
                    self.prime_band();
                    self.set_vert_state(VState::Starting);
                }
                Some(s) => self.set_vert_state(s),
                None => (),
            }
            self.line.store(step.next_line, Ordering::Relaxed);
        }
    }

    /// Loads the working band from the head of the band list, at the top of
    /// a frame, and records that the list is in use.
    fn prime_band(&self) {
        let head = self.band_head.load(Ordering::Acquire);
        let band = if head.is_null() {
            Band::EMPTY
        } else {
            // Safety: non-null heads come from `configure_band_list`, and stay
            // valid until a `clear_band_list` sees `band_taken` after a newer
            // head has replaced them.
            unsafe { ptr::read(head) }
        };
        *self.band.try_lock().expect("hstate: band") = band;
        self.band_taken.store(true, Ordering::Release);
    }
}
