//! Line buffers owned by the driver.

use crate::rast::{TargetBuffer, TARGET_BUFFER_WORDS};

/// Words of guard space on either side of a `WorkingBuffer`'s target.
pub const GUARD_WORDS: usize = 4;

/// Words in a `ScanBuffer`: a full line plus one word of black.
pub const SCAN_BUFFER_WORDS: usize = TARGET_BUFFER_WORDS + 1;

/// Rasterization working buffer. During rasterization, the CPU can scribble
/// into this freely without interfering with any ongoing DMA transfer.
///
/// The target is flanked by guard words, so that a rasterizer that writes a
/// little outside its line (as some fast fills do) damages nothing important.
/// For best results place this in closely-coupled RAM.
#[derive(Clone)]
#[repr(C)]
pub struct WorkingBuffer {
    left_guard: [u32; GUARD_WORDS],
    target: TargetBuffer,
    right_guard: [u32; GUARD_WORDS],
}

impl WorkingBuffer {
    pub const fn new() -> Self {
        WorkingBuffer {
            left_guard: [0; GUARD_WORDS],
            target: TargetBuffer::new(),
            right_guard: [0; GUARD_WORDS],
        }
    }

    pub fn target(&self) -> &TargetBuffer {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut TargetBuffer {
        &mut self.target
    }

    /// Fills the target with alternating white and black pixels, so that any
    /// pixels a rasterizer fails to write stand out on the display.
    pub fn scribble(&mut self) {
        for (i, p) in self.target.iter_mut().enumerate() {
            *p = if i % 2 == 0 { 0xFF } else { 0x00 };
        }
    }
}

/// Scanout buffer: the source for pixel DMA. For best results place this in
/// the AHB-attached SRAM, away from the working buffer.
///
/// Whatever has been copied in is always followed by black, so that the
/// outputs return to black level for hblank even if the transfer over-reads.
#[derive(Clone)]
#[repr(transparent)]
pub struct ScanBuffer([u32; SCAN_BUFFER_WORDS]);

impl ScanBuffer {
    pub const fn new() -> Self {
        ScanBuffer([0; SCAN_BUFFER_WORDS])
    }

    pub fn as_ptr(&self) -> *const u32 {
        self.0.as_ptr()
    }

    pub fn as_words(&self) -> &[u32; SCAN_BUFFER_WORDS] {
        &self.0
    }

    /// Copies the words covering the first `length` pixels of `source` in,
    /// then terminates them with black.
    ///
    /// # Panics
    ///
    /// If `length` exceeds `MAX_PIXELS_PER_LINE`.
    pub fn update(&mut self, source: &TargetBuffer, length: usize) {
        let count = (length + 3) / 4;
        crate::util::copy_words::copy_words(
            &source.as_words()[..count],
            &mut self.0[..count],
        );
        self.blank_tail(length);
    }

    /// Zeroes the four bytes after the first `length` pixels, which may
    /// include the unused bytes of a partially filled word.
    pub fn blank_tail(&mut self, length: usize) {
        let bytes = self.bytes_mut();
        let end = (length + 4).min(bytes.len());
        for b in &mut bytes[length..end] {
            *b = 0;
        }
    }

    /// Zeroes the whole buffer.
    pub fn clear(&mut self) {
        for w in self.0.iter_mut() {
            *w = 0;
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8; SCAN_BUFFER_WORDS * 4] {
        // Safety: same size, and u8 has no alignment requirement or invalid
        // bit patterns.
        unsafe { &mut *(self.0.as_mut_ptr() as *mut [u8; SCAN_BUFFER_WORDS * 4]) }
    }
}
