//! HID Report Descriptor item decoder.
//!
//! A Report Descriptor is a stream of short items (a one-byte header
//! followed by 0, 1, 2, or 4 data bytes) plus the rare long item whose
//! data length comes from the stream itself. [`items`] walks the raw
//! bytes and yields one [`ReportItem`] per fully parsed item, in order.
//!
//! The decoder tracks collection nesting only as a depth counter for
//! display indentation; it does not build a collection tree.

use std::fmt;

use crate::hid::sign_extend;

/// Header byte of a long item: tag bits 0xF with a two-byte size field.
/// The data length follows in the next byte, the long tag in the one
/// after that.
pub const LONG_ITEM_PREFIX: u8 = 0xFE;

// Main item tags (header byte with the size bits zeroed).
pub const TAG_INPUT: u8 = 0x80;
pub const TAG_OUTPUT: u8 = 0x90;
pub const TAG_COLLECTION: u8 = 0xA0;
pub const TAG_FEATURE: u8 = 0xB0;
pub const TAG_END_COLLECTION: u8 = 0xC0;

// Global item tags.
pub const TAG_USAGE_PAGE: u8 = 0x04;
pub const TAG_LOGICAL_MINIMUM: u8 = 0x14;
pub const TAG_LOGICAL_MAXIMUM: u8 = 0x24;
pub const TAG_PHYSICAL_MINIMUM: u8 = 0x34;
pub const TAG_PHYSICAL_MAXIMUM: u8 = 0x44;
pub const TAG_UNIT_EXPONENT: u8 = 0x54;
pub const TAG_UNIT: u8 = 0x64;
pub const TAG_REPORT_SIZE: u8 = 0x74;
pub const TAG_REPORT_ID: u8 = 0x84;
pub const TAG_REPORT_COUNT: u8 = 0x94;
pub const TAG_PUSH: u8 = 0xA4;
pub const TAG_POP: u8 = 0xB4;

// Local item tags.
pub const TAG_USAGE: u8 = 0x08;
pub const TAG_USAGE_MINIMUM: u8 = 0x18;
pub const TAG_USAGE_MAXIMUM: u8 = 0x28;

/// Item classification from header bits 2-3; long items are classified
/// separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Main,
    Global,
    Local,
    Reserved,
    Long,
}

impl ItemKind {
    fn from_header(header: u8) -> Self {
        match (header >> 2) & 0x3 {
            0 => ItemKind::Main,
            1 => ItemKind::Global,
            2 => ItemKind::Local,
            _ => ItemKind::Reserved,
        }
    }

    /// Fixed-width label used by the diagnostic reporter.
    pub fn label(&self) -> &'static str {
        match self {
            ItemKind::Main => "Main",
            ItemKind::Global => "Global",
            ItemKind::Local => "Local",
            ItemKind::Reserved => "Reserved",
            ItemKind::Long => "Long",
        }
    }
}

/// One decoded Report Descriptor item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportItem {
    pub kind: ItemKind,
    /// Header byte with the size bits zeroed; for long items, the long
    /// tag byte read from the stream.
    pub tag: u8,
    /// Number of data bytes the item carried.
    pub size: usize,
    /// Raw data, accumulated little-endian. Long item data is skipped
    /// and left at zero.
    pub data: u32,
    /// Collection nesting depth at this item. End Collection items are
    /// reported at the outer depth they return to.
    pub depth: u32,
}

impl ReportItem {
    /// The item value under its tag's signedness.
    ///
    /// Logical and Physical Minimum/Maximum are signed at exactly the
    /// item's width (a one-byte 0xFF is -1, not 255); every other tag
    /// keeps the unsigned interpretation.
    pub fn value(&self) -> i64 {
        if self.is_signed() {
            sign_extend(self.size, self.data)
        } else {
            self.data as i64
        }
    }

    fn is_signed(&self) -> bool {
        matches!(
            self.tag,
            TAG_LOGICAL_MINIMUM | TAG_LOGICAL_MAXIMUM | TAG_PHYSICAL_MINIMUM | TAG_PHYSICAL_MAXIMUM
        ) && self.kind == ItemKind::Global
    }
}

/// Decode the items of a raw Report Descriptor.
///
/// The returned iterator is lazy and borrows `buf`; calling `items`
/// again restarts the walk. A buffer that ends mid-item yields only the
/// items that were fully parsed.
pub fn items(buf: &[u8]) -> ReportItems<'_> {
    ReportItems {
        buf,
        pos: 0,
        depth: 0,
    }
}

/// Iterator over [`ReportItem`]s; see [`items`].
#[derive(Debug, Clone)]
pub struct ReportItems<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: u32,
}

impl Iterator for ReportItems<'_> {
    type Item = ReportItem;

    fn next(&mut self) -> Option<ReportItem> {
        let header = *self.buf.get(self.pos)?;

        if header == LONG_ITEM_PREFIX {
            // The data length comes from the stream, not the header:
            // prefix byte, length byte, long tag byte, then the data.
            let size = *self.buf.get(self.pos + 1)? as usize;
            let tag = *self.buf.get(self.pos + 2)?;
            if self.pos + 3 + size > self.buf.len() {
                self.pos = self.buf.len();
                return None;
            }
            let item = ReportItem {
                kind: ItemKind::Long,
                tag,
                size,
                data: 0,
                depth: self.depth,
            };
            self.pos += 3 + size;
            return Some(item);
        }

        let size = match header & 0x3 {
            3 => 4,
            s => s as usize,
        };
        if self.pos + 1 + size > self.buf.len() {
            // Truncated item: stop, keeping everything parsed so far.
            self.pos = self.buf.len();
            return None;
        }

        let tag = header & !0x3;
        let mut data = 0u32;
        for (i, &byte) in self.buf[self.pos + 1..self.pos + 1 + size].iter().enumerate() {
            data |= (byte as u32) << (i * 8);
        }

        if tag == TAG_END_COLLECTION && self.depth > 0 {
            self.depth -= 1;
        }
        let item = ReportItem {
            kind: ItemKind::from_header(header),
            tag,
            size,
            data,
            depth: self.depth,
        };
        if tag == TAG_COLLECTION {
            self.depth += 1;
        }

        self.pos += 1 + size;
        Some(item)
    }
}

fn fmt_input_flags(f: &mut fmt::Formatter<'_>, label: &str, data: u32, volatile_bit: bool) -> fmt::Result {
    write!(
        f,
        "{}: {}, {}, {}, {}, {}, {}, {}",
        label,
        if data & 0x001 != 0 { "Constant" } else { "Data" },
        if data & 0x002 != 0 { "Variable" } else { "Array" },
        if data & 0x004 != 0 { "Relative" } else { "Absolute" },
        if data & 0x008 != 0 { "Wrap" } else { "No wrap" },
        if data & 0x010 != 0 { "Nonlinear" } else { "Linear" },
        if data & 0x020 != 0 { "No preferred state" } else { "Preferred state" },
        if data & 0x040 != 0 { "Null state" } else { "No null position" },
    )?;
    if volatile_bit {
        write!(f, ", {}", if data & 0x080 != 0 { "Volatile" } else { "Non-volatile" })?;
    }
    write!(f, ", {}", if data & 0x100 != 0 { "Buffered bytes" } else { "Bitfield" })
}

fn fmt_collection(f: &mut fmt::Formatter<'_>, data: u32) -> fmt::Result {
    write!(f, "Collection: ")?;
    match data {
        0x00 => write!(f, "Physical (group of axes)"),
        0x01 => write!(f, "Application (mouse, keyboard)"),
        0x02 => write!(f, "Logical (interrelated data)"),
        0x03 => write!(f, "Report"),
        0x04 => write!(f, "Named array"),
        0x05 => write!(f, "Usage switch"),
        0x06 => write!(f, "Usage modifier"),
        d if d <= 0x7F => write!(f, "Reserved {d:#X}"),
        d => write!(f, "Vendor-defined {d:#X}"),
    }
}

impl fmt::Display for ReportItem {
    /// Human label for the diagnostic report; indentation and the kind
    /// column are added by the caller.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == ItemKind::Long {
            return write!(f, "Long item tag {:02X} ({} data bytes)", self.tag, self.size);
        }
        match self.tag {
            TAG_INPUT => fmt_input_flags(f, "Input", self.data, false),
            TAG_FEATURE => fmt_input_flags(f, "Feature", self.data, true),
            TAG_COLLECTION => fmt_collection(f, self.data),
            TAG_END_COLLECTION => write!(f, "End of collection"),
            TAG_USAGE_PAGE => write!(f, "Usage page {:04X}", self.data),
            TAG_LOGICAL_MINIMUM => write!(f, "Logical minimum {}", self.value()),
            TAG_LOGICAL_MAXIMUM => write!(f, "Logical maximum {}", self.value()),
            TAG_PHYSICAL_MINIMUM => write!(f, "Physical minimum {}", self.value()),
            TAG_PHYSICAL_MAXIMUM => write!(f, "Physical maximum {}", self.value()),
            TAG_UNIT_EXPONENT => write!(f, "Unit exponent {}", self.data),
            TAG_UNIT => write!(f, "Unit {}", self.data),
            TAG_REPORT_SIZE => write!(f, "Report size {}", self.data),
            TAG_REPORT_ID => write!(f, "Report ID {}", self.data),
            TAG_REPORT_COUNT => write!(f, "Report count {}", self.data),
            TAG_PUSH => write!(f, "PUSH"),
            TAG_POP => write!(f, "POP"),
            TAG_USAGE => write!(f, "Usage {}", self.data),
            TAG_USAGE_MINIMUM => write!(f, "Usage minimum {}", self.data),
            TAG_USAGE_MAXIMUM => write!(f, "Usage maximum {}", self.data),
            tag => write!(
                f,
                "Tag {tag:02X} data {data:0width$X}",
                data = self.data,
                width = self.size * 2
            ),
        }
    }
}
