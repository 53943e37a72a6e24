//! Augmented ARMv7M operations
//!
//! The `enable_irq`, `disable_irq`, and `clear_pending_irq` functions add the
//! memory barriers that the `cortex_m` equivalents leave out. Without them, an
//! interrupt can still fire for a few instructions after being disabled, which
//! matters when tearing down the line timers. The barrier sequence comes from
//! *ARM Cortex-M Programming Guide to Memory Barrier Instructions*.

use cortex_m::interrupt::Nr;
use cortex_m::peripheral::{NVIC, SCB};

/// Enables an interrupt; if it's pending, it will have had its chance to run
/// by the time this returns.
pub fn enable_irq(nvic: &mut NVIC, i: impl Nr) {
    nvic.enable(i);
    cortex_m::asm::dmb();
    cortex_m::asm::isb();
}

/// Disables an interrupt; starting at the next instruction, it can't preempt
/// the caller.
pub fn disable_irq(nvic: &mut NVIC, i: impl Nr) {
    nvic.disable(i);
    cortex_m::asm::dmb();
    cortex_m::asm::isb();
}

/// Ensures that an interrupt is not pending. If hardware continues generating
/// IRQs, the interrupt may immediately start pending again.
pub fn clear_pending_irq(i: impl Nr) {
    NVIC::unpend(i);
    cortex_m::asm::dmb();
    cortex_m::asm::isb();
}

/// Withdraws a pending PendSV, with the same guarantee as `clear_pending_irq`.
pub fn clear_pending_sv() {
    // Safety: PENDSVCLR is write-one-to-clear and the other ICSR bits ignore
    // writes of zero.
    unsafe { (*SCB::ptr()).icsr.write(1 << 27) }
    cortex_m::asm::dmb();
    cortex_m::asm::isb();
}
