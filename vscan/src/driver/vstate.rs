//! Vertical retrace state machine.

use crate::timing::Timing;

/// Possible states of the vertical retrace state machine.
///
/// This is encoded as a Gray code so that each of the two questions asked by
/// the interrupt handlers (see `is_displayed_state` and `is_rendered_state`)
/// is a single bit test.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VState {
    /// Deep in the vertical blanking interval.
    Blank = 0b00,
    /// On the line just before active video, so the rasterizer needs to be
    /// warming up.
    Starting = 0b01,
    /// Active video.
    Active = 0b11,
    /// On the final line in active video -- rasterizer must shut down but
    /// scanout will continue.
    Finishing = 0b10,
}

impl VState {
    /// Does scanout occur in this state?
    pub fn is_displayed_state(self) -> bool {
        (self as usize & 0b10) != 0
    }

    /// Does rasterization need to run in this state?
    pub fn is_rendered_state(self) -> bool {
        (self as usize & 1) != 0
    }

    /// Decodes a state stored as its discriminant.
    pub(crate) fn from_bits(bits: usize) -> Self {
        match bits & 0b11 {
            0b00 => VState::Blank,
            0b01 => VState::Starting,
            0b11 => VState::Active,
            _ => VState::Finishing,
        }
    }
}

/// What happens at one end-of-active-video edge.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LineStep {
    /// The line we're about to start.
    pub next_line: usize,
    /// Whether the vertical sync output flips at this edge.
    pub toggle_vsync: bool,
    /// New vertical state, if it changes.
    pub enter: Option<VState>,
}

/// Works out the transition taken at the end of `current_line`.
///
/// The conditions are tested as a cascade, in order, so at most one of them
/// applies to any line even if a degenerate timing puts two events on the same
/// line. (`Timing::validate` rejects such timings, but this function doesn't
/// rely on that.)
pub fn step(timing: &Timing, current_line: usize) -> LineStep {
    let next_line = current_line + 1;
    let mut s = LineStep {
        next_line,
        toggle_vsync: false,
        enter: None,
    };

    if next_line == timing.vsync_start_line
        || next_line == timing.vsync_end_line
    {
        // Either edge of vsync pulse.
        s.toggle_vsync = true;
    } else if next_line + 1 == timing.video_start_line {
        // We're one line before scanout begins -- need to start rasterizing.
        s.enter = Some(VState::Starting);
    } else if next_line == timing.video_start_line {
        // Time to start output.  This will cause the deferred task to copy
        // rasterization output into place for scanout, and the next SAV will
        // start DMA.
        s.enter = Some(VState::Active);
    } else if next_line + 1 == timing.video_end_line {
        // For the final line, suppress rasterization but continue preparing
        // previously rasterized data for scanout, and continue starting DMA in
        // SAV.
        s.enter = Some(VState::Finishing);
    } else if next_line == timing.video_end_line {
        // All done!  Suppress all scanout activity.
        s.enter = Some(VState::Blank);
        s.next_line = 0;
    }

    s
}
