use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::*;
use crate::hw::mock::{self, MockHw};
use crate::hw::LineEvents;
use crate::rast::{Rasterizer, TargetBuffer};
use crate::timing::{SVGA_800_600, VGA_640_480};

const FRAME: usize = 628;

fn buffers() -> Buffers {
    Buffers {
        working: Box::leak(Box::new(WorkingBuffer::new())),
        scan: Box::leak(Box::new(ScanBuffer::new())),
    }
}

fn driver() -> &'static Driver<MockHw> {
    let d = Box::leak(Box::new(Driver::new()));
    d.init(MockHw::default(), buffers(), None);
    d
}

fn running() -> &'static Driver<MockHw> {
    let d = driver();
    d.apply(&SVGA_800_600).unwrap();
    d
}

fn raise(d: &Driver<MockHw>, events: LineEvents) {
    d.with_hw(|hw| hw.events = events);
    d.hstate_isr();
}

fn sav(d: &Driver<MockHw>) {
    raise(
        d,
        LineEvents {
            active_start: true,
            active_end: false,
        },
    );
}

fn eav(d: &Driver<MockHw>) {
    raise(
        d,
        LineEvents {
            active_start: false,
            active_end: true,
        },
    );
    if mock::take_pended() {
        d.deferred_isr();
    }
}

fn run_line(d: &Driver<MockHw>) {
    sav(d);
    eav(d);
}

fn run_lines(d: &Driver<MockHw>, n: usize) {
    for _ in 0..n {
        run_line(d);
    }
}

fn scanned(d: &Driver<MockHw>) -> Vec<Vec<u8>> {
    d.with_hw(|hw| core::mem::replace(&mut hw.scanned, vec![]))
}

fn thread() -> Thread {
    Thread::new_checked().unwrap()
}

/// Fills the requested length with the visible line number plus one, and
/// records which lines it was asked for.
struct Recorder {
    calls: Mutex<Vec<usize>>,
    info: RasterInfo,
}

impl Recorder {
    fn new(info: RasterInfo) -> Self {
        Recorder {
            calls: Mutex::new(vec![]),
            info,
        }
    }

    fn full_width() -> Self {
        Recorder::new(RasterInfo {
            length: 800,
            ..RasterInfo::blank(4)
        })
    }

    fn calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

impl Rasterizer for Recorder {
    fn rasterize(
        &self,
        _cycles_per_pixel: usize,
        line_number: usize,
        target: &mut TargetBuffer,
    ) -> RasterInfo {
        self.calls.lock().unwrap().push(line_number);
        let n = self.info.length.min(crate::MAX_PIXELS_PER_LINE);
        for p in &mut target[..n] {
            *p = (line_number as u8).wrapping_add(1);
        }
        self.info
    }
}

fn leak_band(
    r: &'static dyn Rasterizer,
    line_count: usize,
    next: Option<&'static Band<'static>>,
) -> &'static Band<'static> {
    Box::leak(Box::new(Band {
        rasterizer: Some(r),
        line_count,
        next,
    }))
}

fn leak<T: 'static>(t: T) -> &'static T {
    Box::leak(Box::new(t))
}

#[test]
#[should_panic(expected = "already initialized")]
fn init_twice() {
    let d = driver();
    d.init(MockHw::default(), buffers(), None);
}

#[test]
#[should_panic(expected = "driver not initialized")]
fn isr_before_init() {
    let d: Driver<MockHw> = Driver::new();
    d.hstate_isr();
}

#[test]
fn apply_programs_hardware() {
    let d = driver();
    d.with_hw(|hw| hw.busy_polls.set(3));
    d.apply(&SVGA_800_600).unwrap();

    let hw = d.with_hw(|hw| hw.clone());
    assert_eq!(hw.clocks, Some(SVGA_800_600.clock_config));
    assert_eq!(
        hw.line_timers,
        Some(SVGA_800_600.line_timer_config(20).unwrap())
    );
    assert_eq!(hw.active_start, 196);
    assert_eq!(hw.busy_polls.get(), 0);
    assert!(hw.timers_running);
    assert!(hw.sync);
    assert!(!hw.video);
    assert!(!hw.vsync_high);
    assert_eq!(d.current_line(), 0);
    assert_eq!(d.vert_state(), VState::Blank);

    d.apply(&VGA_640_480).unwrap();
    assert!(d.with_hw(|hw| hw.vsync_high));
}

#[test]
fn bad_timing_changes_nothing() {
    let d = driver();
    let before = d.with_hw(|hw| hw.clone());
    let t = Timing {
        cycles_per_pixel: 3,
        ..SVGA_800_600
    };
    assert_eq!(d.apply(&t), Err(TimingError::PixelTooFast));
    assert_eq!(d.with_hw(|hw| hw.clone()), before);
}

#[test]
fn apply_is_idempotent() {
    let once = running();
    let twice = running();
    twice.apply(&SVGA_800_600).unwrap();
    assert_eq!(once.with_hw(|hw| hw.clone()), twice.with_hw(|hw| hw.clone()));
}

#[test]
fn apply_resets_buffers() {
    let d = running();
    let (hw, buffers) = d.teardown().unwrap();
    assert!(!hw.timers_running);
    assert!(!hw.sync);
    assert_eq!(&buffers.working.target()[..2], &[0xFF, 0x00]);
    assert!(buffers.scan.as_words().iter().all(|&w| w == 0));
}

#[test]
fn teardown_and_reinit() {
    let d = running();
    run_lines(d, 40);
    let (hw, buffers) = d.teardown().unwrap();
    assert!(d.teardown().is_none());
    // Back to the state of a fresh driver, with no mode to be in vblank of.
    assert!(!d.in_vblank());
    assert_eq!(d.vert_state(), VState::Blank);

    d.init(hw, buffers, None);
    assert_eq!(d.current_line(), 0);
    d.apply(&SVGA_800_600).unwrap();
    run_lines(d, FRAME);
    assert_eq!(d.current_line(), 0);
}

#[test]
fn frame_walk() {
    let d = running();
    let mut vsync = vec![];
    for n in 1..=FRAME {
        run_line(d);
        vsync.push(d.with_hw(|hw| hw.vsync_high));
        let expected = match n {
            27 => VState::Starting,
            28..=626 => VState::Active,
            627 => VState::Finishing,
            _ => VState::Blank,
        };
        assert_eq!(d.vert_state(), expected, "after {} lines", n);
    }
    assert_eq!(d.current_line(), 0);
    // Pulse covers lines 1 through 4.
    assert!(vsync[..4].iter().all(|&v| v));
    assert!(vsync[4..].iter().all(|&v| !v));
}

#[test]
fn empty_list_scans_black() {
    let d = running();
    run_lines(d, FRAME);
    let lines = scanned(d);
    assert_eq!(lines.len(), 600);
    assert!(lines.iter().all(|l| l == &[0, 0, 0, 0]));
}

#[test]
fn renders_one_line_ahead() {
    let d = running();
    let r = leak(Recorder::full_width());
    d.configure_band_list(leak_band(r, 600, None));
    run_lines(d, FRAME);

    assert_eq!(r.calls(), (0..600).collect::<Vec<_>>());
    let lines = scanned(d);
    assert_eq!(lines.len(), 600);
    for (k, line) in lines.iter().enumerate() {
        assert_eq!(line.len(), 804);
        let expected = (k as u8).wrapping_add(1);
        assert!(line[..800].iter().all(|&p| p == expected), "line {}", k);
        assert_eq!(&line[800..], &[0; 4]);
    }
}

#[test]
fn repeats_until_band_edge() {
    let d = running();
    let a = leak(Recorder::new(RasterInfo {
        length: 4,
        repeat_lines: 1,
        ..RasterInfo::blank(4)
    }));
    let b = leak(Recorder::new(RasterInfo {
        length: 4,
        ..RasterInfo::blank(4)
    }));
    let second = leak_band(b, 597, None);
    d.configure_band_list(leak_band(a, 3, Some(second)));
    run_lines(d, FRAME);

    // Line 1 repeats line 0; line 3 would repeat line 2, but it's in the next
    // band.
    assert_eq!(a.calls(), [0, 2]);
    assert_eq!(b.calls(), (3..600).collect::<Vec<_>>());

    let lines = scanned(d);
    assert_eq!(&lines[0][..4], &[1; 4]);
    assert_eq!(&lines[1][..4], &[1; 4]);
    assert_eq!(&lines[2][..4], &[3; 4]);
    assert_eq!(&lines[3][..4], &[4; 4]);
}

#[test]
fn clamps_returned_shape() {
    let d = running();
    let r = leak(Recorder::new(RasterInfo {
        length: 2000,
        cycles_per_pixel: 1,
        ..RasterInfo::blank(4)
    }));
    d.configure_band_list(leak_band(r, 600, None));
    run_lines(d, FRAME);
    let lines = scanned(d);
    assert_eq!(lines.len(), 600);
    assert!(lines.iter().all(|l| l.len() == 804));
    assert!(!d.with_hw(|hw| hw.pixel_timer_running));
}

#[test]
fn wide_pixels_are_paced() {
    let d = running();
    let r = leak(Recorder::new(RasterInfo {
        length: 640,
        ..RasterInfo::blank(8)
    }));
    d.configure_band_list(leak_band(r, 600, None));

    // Up to the start of active video, with the first transfer prepared.
    run_lines(d, 28);
    let hw = d.with_hw(|hw| hw.clone());
    assert_eq!(hw.pixel_timer, (7, 5));
    assert!(hw.plan.map_or(false, |p| p.is_paced()));

    sav(d);
    assert!(d.with_hw(|hw| hw.pixel_timer_running));
    assert_eq!(scanned(d)[0].len(), 644);
    eav(d);
    assert!(!d.with_hw(|hw| hw.pixel_timer_running));
}

#[test]
fn offset_moves_active_start() {
    let d = running();
    let r = leak(Recorder::new(RasterInfo {
        offset: -5,
        ..RasterInfo::blank(4)
    }));
    d.configure_band_list(leak_band(r, 600, None));
    run_lines(d, 29);
    assert_eq!(d.with_hw(|hw| hw.active_start), 196 - 5);

    let d = running();
    let r = leak(Recorder::new(RasterInfo {
        offset: -1000,
        ..RasterInfo::blank(4)
    }));
    d.configure_band_list(leak_band(r, 600, None));
    run_lines(d, 29);
    assert_eq!(d.with_hw(|hw| hw.active_start), 0);

    let d = running();
    let r = leak(Recorder::new(RasterInfo {
        offset: 5000,
        ..RasterInfo::blank(4)
    }));
    d.configure_band_list(leak_band(r, 600, None));
    run_lines(d, 29);
    // One pixel before the end of active video, at 128 + 88 + 800.
    assert_eq!(d.with_hw(|hw| hw.active_start), 1015);
}

#[test]
fn clear_waits_for_next_frame() {
    let d = running();
    let r = leak(Recorder::full_width());
    d.configure_band_list(leak_band(r, 600, None));
    run_lines(d, FRAME);

    let waits = leak(AtomicUsize::new(0));
    mock::on_wait(move || {
        waits.fetch_add(1, Ordering::Relaxed);
        run_line(d);
    });
    d.clear_band_list(&thread());
    // The list is released when the next frame starts rendering.
    assert_eq!(waits.load(Ordering::Relaxed), 27);

    scanned(d);
    run_lines(d, FRAME);
    assert_eq!(r.calls().len(), 600);
    assert!(scanned(d).iter().all(|l| l == &[0, 0, 0, 0]));
}

#[test]
fn scoped_band_list() {
    let d = running();
    mock::on_wait(move || run_line(d));

    let r = Recorder::full_width();
    let band = Band {
        rasterizer: Some(&r),
        line_count: 600,
        next: None,
    };
    let n = d.with_band_list(&band, &thread(), |d| {
        run_lines(d, FRAME);
        42
    });
    assert_eq!(n, 42);
    assert_eq!(r.calls().len(), 600);
    assert_eq!(d.vert_state(), VState::Starting);
}

#[test]
fn vblank_waits() {
    let d = running();
    // Already in vblank: no waiting, and nothing installed to wake us.
    d.wait_for_vblank(&thread());

    let waits = leak(AtomicUsize::new(0));
    mock::on_wait(move || {
        waits.fetch_add(1, Ordering::Relaxed);
        run_line(d);
    });
    d.sync_to_vblank(&thread());
    assert_eq!(waits.load(Ordering::Relaxed), FRAME);
    assert_eq!(d.current_line(), 0);
    assert!(d.in_vblank());
}

static HOOK_CALLS: AtomicUsize = AtomicUsize::new(0);

fn count_hook(_: I0) {
    HOOK_CALLS.fetch_add(1, Ordering::Relaxed);
}

#[test]
fn hblank_hook_runs_every_line() {
    let d = Box::leak(Box::new(Driver::new()));
    d.init(MockHw::default(), buffers(), Some(count_hook));
    d.apply(&SVGA_800_600).unwrap();
    run_lines(d, FRAME);
    assert_eq!(HOOK_CALLS.load(Ordering::Relaxed), FRAME);
}

#[test]
fn video_switch() {
    let d = running();
    d.video_on();
    assert!(d.with_hw(|hw| hw.video));
    d.video_off();
    assert!(!d.with_hw(|hw| hw.video));
}

#[test]
#[should_panic(expected = "not generating sync")]
fn waits_need_sync() {
    let d = driver();
    d.wait_for_vblank(&thread());
}
