//! Type-level representation of execution priorities.
//!
//! All the priority types are zero-sized tokens. When the driver invokes the
//! hblank hook, it pulls an `I0` token out of thin air and hands it over. Driver
//! operations that block demand a `Thread` token, so they can't be called from
//! an interrupt handler, where they would wait forever.

use core::marker::PhantomData;

// Marker type used to cause things to stop being Sync/Send.
type NotSyncOrSend = PhantomData<*mut ()>;

/// Priority of the driver's deferred task, which runs rasterizers and the
/// hblank hook.
#[derive(Copy, Clone, Debug)]
pub struct I0(NotSyncOrSend);

/// Thread mode execution occurs outside any interrupt handler.
#[derive(Copy, Clone, Debug)]
pub struct Thread(NotSyncOrSend);

impl I0 {
    pub(crate) unsafe fn new() -> Self {
        I0(PhantomData)
    }
}

impl Thread {
    pub(crate) unsafe fn new() -> Self {
        Thread(PhantomData)
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "none")] {
        impl Thread {
            /// Returns a `Thread` token only if called from thread priority.
            pub fn new_checked() -> Option<Self> {
                // Safety: reads of the ICSR are safe.
                let icsr =
                    unsafe { &(*cortex_m::peripheral::SCB::ptr()).icsr }.read();
                // VECTACTIVE is zero in thread mode.
                if icsr & 0xFF == 0 {
                    Some(unsafe { Self::new() })
                } else {
                    None
                }
            }
        }
    } else {
        impl Thread {
            /// Returns a `Thread` token. Hosted builds have no interrupt
            /// handlers, so this always succeeds.
            pub fn new_checked() -> Option<Self> {
                Some(unsafe { Self::new() })
            }
        }
    }
}
