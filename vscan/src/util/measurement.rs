//! Performance measurement support using GPIOs, compiled out unless the
//! `measurement` feature is set.
//!
//! Because this is intended as a debug facility, this totally circumvents all
//! hardware ownership. If your application is using the measurement output pins
//! (C8-C11) for anything... weird stuff ensues.
//!
//! The driver uses the signals as follows:
//!
//! - A (C8): line interrupt handler.
//! - B (C9): deferred task.
//! - C (C10): hblank hook.
//! - D (C11): free for applications.
//!
//! On the host, and without the feature, every operation here is a no-op.

use scopeguard::ScopeGuard;

/// One of the four measurement outputs.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Signal {
    A = 8,
    B = 9,
    C = 10,
    D = 11,
}

/// Sets up the measurement subsystem.
///
/// Note: if the `measurement` feature is enabled, this will power on GPIOC and
/// configure pins 8-11 as outputs.
///
/// # Safety
///
/// This is safe *as long as* it's not preempted. If interrupts are enabled, and
/// interrupts attempt to configure either RCC or GPIOC, their updates may be
/// reverted. Call this from early in `main` and you're good.
pub unsafe fn init() {
    #[cfg(all(feature = "measurement", target_os = "none"))]
    {
        use stm32f4::stm32f407 as device;
        let rcc = &*device::RCC::ptr();
        let gpioc = &*device::GPIOC::ptr();

        rcc.ahb1enr.modify(|_, w| w.gpiocen().set_bit());

        gpioc.pupdr.modify(|_, w| {
            w.pupdr8()
                .floating()
                .pupdr9()
                .floating()
                .pupdr10()
                .floating()
                .pupdr11()
                .floating()
        });
        gpioc.ospeedr.modify(|_, w| {
            w.ospeedr8()
                .very_high_speed()
                .ospeedr9()
                .very_high_speed()
                .ospeedr10()
                .very_high_speed()
                .ospeedr11()
                .very_high_speed()
        });
        gpioc.moder.modify(|_, w| {
            w.moder8()
                .output()
                .moder9()
                .output()
                .moder10()
                .output()
                .moder11()
                .output()
        })
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(target_os = "none", feature = "measurement"))] {
        use stm32f4::stm32f407 as device;

        fn write_bsrr(bits: u32) {
            // Safety: writes to this register are atomic and idempotent, and
            // any bit pattern is meaningful.
            unsafe { (*device::GPIOC::ptr()).bsrr.write(|w| w.bits(bits)) }
        }

        /// Drives `signal` high.
        pub fn set(signal: Signal) {
            write_bsrr(1 << signal as u32)
        }

        /// Drives `signal` low.
        pub fn clear(signal: Signal) {
            write_bsrr(1 << (signal as u32 + 16))
        }
    } else {
        /// Drives `signal` high.
        pub fn set(_signal: Signal) {}

        /// Drives `signal` low.
        pub fn clear(_signal: Signal) {}
    }
}

/// Guard holding a signal high; it goes low when the guard is dropped.
pub type Probe = ScopeGuard<Signal, fn(Signal)>;

/// Sets `signal` for the lifetime of the returned guard, which brackets a
/// region of code on a logic analyzer.
pub fn probe(signal: Signal) -> Probe {
    set(signal);
    scopeguard::guard(signal, clear as fn(Signal))
}
