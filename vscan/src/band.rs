//! Band lists: how the screen is divided between rasterizers.

use core::fmt;

use crate::rast::Rasterizer;

/// A horizontal strip of the display handled by a single rasterizer.
///
/// Bands form a singly linked list through `next`. The driver walks the list
/// once per frame, starting over from the head at the top of each frame. A
/// list that runs out before the bottom of the screen leaves the remaining
/// lines blank.
///
/// The driver keeps a working copy of the band it's currently in and counts
/// `line_count` down in that copy, so the list itself is never modified and
/// can live in read-only memory.
#[derive(Copy, Clone)]
pub struct Band<'a> {
    /// Rasterizer for this band, or `None` for blank lines.
    pub rasterizer: Option<&'a dyn Rasterizer>,
    /// Number of lines in this band. Bands with zero lines are skipped.
    pub line_count: usize,
    /// Band below this one, if any.
    pub next: Option<&'a Band<'a>>,
}

impl<'a> Band<'a> {
    /// A band that covers no lines and renders nothing. Used as the list head
    /// when no list has been configured.
    pub const EMPTY: Band<'static> = Band {
        rasterizer: None,
        line_count: 0,
        next: None,
    };

    /// Moves down one line.
    ///
    /// If lines remain in this band, counts one off. Otherwise, replaces `self`
    /// with the next band in the list, or `EMPTY` at the end of the list, and
    /// keeps going. Returns `true` if a band boundary was crossed.
    ///
    /// A list containing a cycle made entirely of zero-length bands will spin
    /// here forever.
    pub fn advance(&mut self) -> bool {
        let mut edge = false;
        loop {
            if self.line_count > 0 {
                self.line_count -= 1;
                return edge;
            }
            match self.next {
                Some(next) => {
                    *self = *next;
                    edge = true;
                }
                None => {
                    *self = Band::EMPTY;
                    return edge;
                }
            }
        }
    }
}

impl<'a> fmt::Debug for Band<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Band")
            .field("rasterizer", &self.rasterizer.is_some())
            .field("line_count", &self.line_count)
            .field("next", &self.next)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rast::{RasterInfo, TargetBuffer};

    fn nop(cpp: usize, _: usize, _: &mut TargetBuffer) -> RasterInfo {
        RasterInfo::blank(cpp)
    }

    fn is(band: &Band, r: &dyn Rasterizer) -> bool {
        match band.rasterizer {
            Some(b) => core::ptr::eq(
                b as *const dyn Rasterizer as *const u8,
                r as *const dyn Rasterizer as *const u8,
            ),
            None => false,
        }
    }

    #[test]
    fn walks_three_then_two() {
        let r1 = nop;
        let r2 = |cpp: usize, _: usize, _: &mut TargetBuffer| {
            RasterInfo::blank(cpp)
        };
        let second = Band {
            rasterizer: Some(&r2),
            line_count: 2,
            next: None,
        };
        let head = Band {
            rasterizer: Some(&r1),
            line_count: 3,
            next: Some(&second),
        };

        // The driver primes its working copy with the head, then advances
        // before every rendered line.
        let mut working = head;
        let mut edges = vec![];
        for _ in 0..5 {
            edges.push(working.advance());
        }
        assert_eq!(edges, [false, false, false, true, false]);
        assert!(is(&working, &r2));

        // Running off the end leaves an empty band.
        assert!(!working.advance());
        assert!(working.rasterizer.is_none());
        assert!(!working.advance());
    }

    #[test]
    fn skips_empty_bands() {
        let r = nop;
        let last = Band {
            rasterizer: Some(&r),
            line_count: 1,
            next: None,
        };
        let hollow = Band {
            rasterizer: None,
            line_count: 0,
            next: Some(&last),
        };
        let mut working = Band {
            rasterizer: None,
            line_count: 0,
            next: Some(&hollow),
        };
        assert!(working.advance());
        assert!(is(&working, &r));
        assert_eq!(working.line_count, 0);
    }

    #[test]
    fn empty_stays_empty() {
        let mut b = Band::EMPTY;
        assert!(!b.advance());
        assert!(b.rasterizer.is_none());
        assert_eq!(b.line_count, 0);
    }
}
