//! Clock tree programming for the STM32F4 RCC, using the High Speed External
//! oscillator and the main PLL.

use stm32f4::stm32f407 as device;

use device::flash::acr::LATENCYW;
use device::rcc::cfgr::{HPREW, PPRE1W, PPRE2W, SWSR, SWW};
use device::rcc::pllcfgr::PLLPW;

use crate::timing::ClockConfig;

macro_rules! block_while {
    ($condition:expr) => {
        while $condition {}
    };
}

macro_rules! block_until {
    ($condition:expr) => {
        block_while!(!$condition)
    };
}

/// Applies the settings described in `cfg` to the `rcc` and `flash`. (The flash
/// controller gets involved because we have to adjust wait states.)
///
/// The algorithm used can transition from any valid clock config to any other,
/// by switching to the internal high-speed oscillator in between modes.
///
/// # Panics
///
/// If a divisor is one the hardware can't do. `Timing::validate` catches
/// these earlier.
pub fn configure_clocks(
    rcc: &device::RCC,
    flash: &device::FLASH,
    cfg: &ClockConfig,
) {
    let hpre = ahb_prescaler(cfg.ahb_divisor);
    let ppre1 = apb1_prescaler(cfg.apb1_divisor);
    let ppre2 = apb2_prescaler(cfg.apb2_divisor);
    let pllp = pll_p_divisor(cfg.general_divisor);
    let latency = flash_wait_states(cfg.flash_latency);

    // Switch to the internal 16MHz oscillator while messing with the PLL.
    rcc.cr.modify(|_, w| w.hsion().set_bit());
    block_until! { rcc.cr.read().hsirdy().bit() }
    rcc.cfgr.modify(|_, w| w.sw().variant(SWW::HSI));
    block_until! { rcc.cfgr.read().sws() == SWSR::HSI }

    // Turn off the PLL.
    rcc.cr.modify(|_, w| w.pllon().clear_bit());
    block_while! { rcc.cr.read().pllrdy().bit() }

    // Apply divisors before boosting frequency.
    rcc.cfgr.modify(|_, w| {
        w.hpre()
            .variant(hpre)
            .ppre1()
            .variant(ppre1)
            .ppre2()
            .variant(ppre2)
    });

    flash.acr.modify(|_, w| w.latency().variant(latency));

    // Switch on the crystal oscillator.
    rcc.cr.modify(|_, w| w.hseon().set_bit());
    block_until! { rcc.cr.read().hserdy().bit() }

    // Configure the PLL.
    rcc.pllcfgr.modify(|_, w| {
        // Safety: these fields aren't modeled as enums. `cfg` has been
        // checked by `Timing::validate`.
        unsafe {
            w.pllm()
                .bits(cfg.crystal_divisor)
                .plln()
                .bits(cfg.vco_multiplier)
                .pllq()
                .bits(cfg.pll48_divisor)
        }
        .pllp()
        .variant(pllp)
        .pllsrc()
        .hse()
    });

    // Turn it on.
    rcc.cr.modify(|_, w| w.pllon().set_bit());
    block_until! { rcc.cr.read().pllrdy().bit() }

    // Select PLL as clock source.
    rcc.cfgr.modify(|_, w| w.sw().variant(SWW::PLL));
    block_until! { rcc.cfgr.read().sws() == SWSR::PLL }
}

fn ahb_prescaler(divisor: u16) -> HPREW {
    match divisor {
        1 => HPREW::DIV1,
        2 => HPREW::DIV2,
        4 => HPREW::DIV4,
        8 => HPREW::DIV8,
        16 => HPREW::DIV16,
        64 => HPREW::DIV64,
        128 => HPREW::DIV128,
        256 => HPREW::DIV256,
        512 => HPREW::DIV512,
        _ => panic!("bad AHB divisor"),
    }
}

fn apb1_prescaler(divisor: u8) -> PPRE1W {
    match divisor {
        1 => PPRE1W::DIV1,
        2 => PPRE1W::DIV2,
        4 => PPRE1W::DIV4,
        8 => PPRE1W::DIV8,
        16 => PPRE1W::DIV16,
        _ => panic!("bad APB1 divisor"),
    }
}

fn apb2_prescaler(divisor: u8) -> PPRE2W {
    match divisor {
        1 => PPRE2W::DIV1,
        2 => PPRE2W::DIV2,
        4 => PPRE2W::DIV4,
        8 => PPRE2W::DIV8,
        16 => PPRE2W::DIV16,
        _ => panic!("bad APB2 divisor"),
    }
}

fn pll_p_divisor(divisor: u8) -> PLLPW {
    match divisor {
        2 => PLLPW::DIV2,
        4 => PLLPW::DIV4,
        6 => PLLPW::DIV6,
        8 => PLLPW::DIV8,
        _ => panic!("bad PLL P divisor"),
    }
}

fn flash_wait_states(latency: u8) -> LATENCYW {
    match latency {
        0 => LATENCYW::WS0,
        1 => LATENCYW::WS1,
        2 => LATENCYW::WS2,
        3 => LATENCYW::WS3,
        4 => LATENCYW::WS4,
        5 => LATENCYW::WS5,
        6 => LATENCYW::WS6,
        7 => LATENCYW::WS7,
        _ => panic!("bad flash latency"),
    }
}
