//! Accumulated mouse state decoded from HID input reports.
//!
//! Input report layout (boot protocol compatible):
//! ```text
//! Byte 0: Button bitfield (bit 0 = left, bit 1 = right, bit 2 = middle)
//! Byte 1: X displacement (signed delta)
//! Byte 2: Y displacement (signed delta)
//! Byte 3: Scroll wheel   (signed delta)
//! ```

/// Number of button bits carried in a report's button byte.
pub const BUTTON_COUNT: u8 = 8;

/// Accumulated mouse state for one connection.
///
/// `buttons` mirrors the latest report verbatim; `x`, `y`, and `wheel`
/// accumulate signed deltas across reports.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct MouseState {
    /// Button bitfield, absolute: overwritten by every report.
    pub buttons: u8,
    /// Relative X motion accumulator.
    pub x: i32,
    /// Relative Y motion accumulator.
    pub y: i32,
    /// Scroll wheel accumulator.
    pub wheel: i32,
}

impl MouseState {
    /// All buttons released, all accumulators at zero.
    pub const fn new() -> Self {
        Self {
            buttons: 0,
            x: 0,
            y: 0,
            wheel: 0,
        }
    }

    /// Apply one raw input report.
    ///
    /// A short report is a partial update, not a reset: fields whose
    /// byte is absent keep their value. Bytes past index 3 are ignored.
    pub fn apply_report(&mut self, data: &[u8]) {
        if let Some(&byte) = data.first() {
            self.buttons = byte;
        }
        if let Some(&byte) = data.get(1) {
            self.x += byte as i8 as i32;
        }
        if let Some(&byte) = data.get(2) {
            self.y += byte as i8 as i32;
        }
        if let Some(&byte) = data.get(3) {
            self.wheel += byte as i8 as i32;
        }
    }

    /// State of button `bit` (0-7) as the 0/1 value delivered to
    /// subscribers.
    pub fn button(&self, bit: u8) -> i32 {
        debug_assert!(bit < BUTTON_COUNT);
        ((self.buttons >> bit) & 1) as i32
    }
}
