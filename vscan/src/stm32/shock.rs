//! The "shock absorber" ISR.
//!
//! The time between the SAV compare event and the first instruction of
//! `hstate_isr` wanders by a few cycles depending on what the CPU was doing:
//! a wait-stated Flash fetch, a multi-word bus transaction, or a tail chain
//! out of another handler. Any wander shows up as horizontal jitter.
//!
//! So the primary line timer fires this slightly lower-priority interrupt
//! `SHOCK_LEAD` pixels before SAV, and it parks the CPU in `wfi`. When the SAV
//! event arrives the core is idle and the bus quiet, so latency is constant.

use stm32f4::stm32f407 as device;

/// Shock absorber ISR: call this from `TIM3`.
///
/// This is one of three ISRs you must wire up for the driver to work:
///
/// ```ignore
/// use stm32f4::stm32f407::interrupt;
///
/// #[interrupt]
/// fn TIM3() {
///     vscan::tim3_shock_isr()
/// }
/// ```
pub fn tim3_shock_isr() {
    // TIM3 belongs to the driver's hardware, which may be locked by the
    // deferred task we just preempted. Acknowledging the compare is a single
    // store that no other code performs, so go around the lock.
    //
    // Safety: SR is write-zero-to-clear, and clearing CC2IF alone leaves the
    // other flags untouched.
    unsafe {
        (*device::TIM3::ptr())
            .sr
            .write(|w| w.bits(!0).cc2if().clear_bit());
    }
    // Idle the CPU until the SAV interrupt arrives.
    cortex_m::asm::wfi()
}
