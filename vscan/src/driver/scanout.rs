//! Planning the pixel transfer for one line.

use crate::timing::MIN_CYCLES_PER_PIXEL;

/// Size of the individual reads or writes making up a pixel transfer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransferUnit {
    Byte = 1,
    HalfWord = 2,
    Word = 4,
}

impl TransferUnit {
    /// Picks the widest unit that evenly divides `length` bytes.
    ///
    /// The stream engine requires the bytes read to exactly match the bytes
    /// written, so the unit has to divide the line (plus its black padding)
    /// evenly.
    pub fn for_length(length: usize) -> Self {
        match length & 3 {
            0 => TransferUnit::Word,
            2 => TransferUnit::HalfWord,
            _ => TransferUnit::Byte,
        }
    }

    pub fn bytes(self) -> usize {
        self as usize
    }
}

/// How to move one line of pixels from the scan buffer to the output port.
///
/// Built by the deferred task during hblank, well ahead of the start of active
/// video, so that starting the transfer costs as little as possible.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScanoutPlan {
    /// Free-running transfer at the maximum rate of one pixel per
    /// `MIN_CYCLES_PER_PIXEL` cycles.
    ///
    /// This runs as a memory-to-memory transfer with the scan buffer on the
    /// "peripheral" side, because that's the only mode that doesn't wait for
    /// requests. `count` is in units of `unit` and includes one unit of black.
    Direct { unit: TransferUnit, count: usize },
    /// Transfer paced one byte at a time by the pixel timer, for pixels wider
    /// than the minimum.
    ///
    /// Memory is read in units of `unit`; the port is written a byte at a
    /// time, and `count` is in bytes, including one unit of black. The pixel
    /// timer is loaded with `reload` and started from `preload`, so that the
    /// first request arrives promptly.
    Paced {
        unit: TransferUnit,
        count: usize,
        reload: u32,
        preload: u32,
    },
}

impl ScanoutPlan {
    /// Plans the transfer for a line of `length` pixels, each lasting
    /// `cycles_per_pixel` cycles.
    ///
    /// `drq_lead` is how many cycles early the pixel timer must fire to get the
    /// first pixel out on time; it's a property of the hardware.
    pub fn for_line(
        length: usize,
        cycles_per_pixel: usize,
        drq_lead: u32,
    ) -> Self {
        let unit = TransferUnit::for_length(length);
        if cycles_per_pixel > MIN_CYCLES_PER_PIXEL {
            // Reload registers hold one less than the period.
            let reload = cycles_per_pixel as u32 - 1;
            ScanoutPlan::Paced {
                unit,
                count: length + unit.bytes(),
                reload,
                preload: reload.saturating_sub(drq_lead),
            }
        } else {
            ScanoutPlan::Direct {
                unit,
                count: length / unit.bytes() + 1,
            }
        }
    }

    pub fn is_paced(&self) -> bool {
        match self {
            ScanoutPlan::Paced { .. } => true,
            ScanoutPlan::Direct { .. } => false,
        }
    }

    pub fn unit(&self) -> TransferUnit {
        match *self {
            ScanoutPlan::Direct { unit, .. } => unit,
            ScanoutPlan::Paced { unit, .. } => unit,
        }
    }

    /// Total bytes the transfer moves, including black padding.
    pub fn transfer_bytes(&self) -> usize {
        match *self {
            ScanoutPlan::Direct { unit, count } => count * unit.bytes(),
            ScanoutPlan::Paced { count, .. } => count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::buffer::SCAN_BUFFER_WORDS;
    use crate::MAX_PIXELS_PER_LINE;

    #[test]
    fn units_divide_every_length() {
        for cpp in &[4, 5, 8] {
            for length in 0..=MAX_PIXELS_PER_LINE {
                let plan = ScanoutPlan::for_line(length, *cpp, 2);
                let unit = plan.unit().bytes();
                let total = plan.transfer_bytes();
                assert_eq!(length % unit, 0, "length {}", length);
                assert_eq!(total % unit, 0, "length {}", length);
                // At least one byte of black, at most one word.
                assert!(total > length && total <= length + 4);
                assert!(total <= SCAN_BUFFER_WORDS * 4);
            }
        }
    }

    #[test]
    fn unit_choice() {
        assert_eq!(TransferUnit::for_length(800), TransferUnit::Word);
        assert_eq!(TransferUnit::for_length(6), TransferUnit::HalfWord);
        assert_eq!(TransferUnit::for_length(7), TransferUnit::Byte);
        assert_eq!(TransferUnit::for_length(1), TransferUnit::Byte);
        assert_eq!(TransferUnit::for_length(0), TransferUnit::Word);
    }

    #[test]
    fn direct_at_minimum_rate() {
        assert_eq!(
            ScanoutPlan::for_line(800, 4, 2),
            ScanoutPlan::Direct {
                unit: TransferUnit::Word,
                count: 201,
            }
        );
        // An empty line still sends one word of black.
        assert_eq!(ScanoutPlan::for_line(0, 4, 2).transfer_bytes(), 4);
    }

    #[test]
    fn paced_above_minimum_rate() {
        let plan = ScanoutPlan::for_line(640, 6, 2);
        assert_eq!(
            plan,
            ScanoutPlan::Paced {
                unit: TransferUnit::Word,
                count: 644,
                reload: 5,
                preload: 3,
            }
        );
        assert!(plan.is_paced());
        assert!(!ScanoutPlan::for_line(640, 4, 2).is_paced());
    }
}
