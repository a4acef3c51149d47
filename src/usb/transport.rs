//! USB transport abstraction.
//!
//! [`MouseTransport`] covers everything the session state machine needs
//! from the USB stack: enumeration, interface setup, descriptor
//! retrieval, and the synchronous GET_REPORT poll. The production
//! implementation drives a libusb device handle; tests substitute a
//! scripted transport.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::config::POLL_INTERVAL_UNIT;

/// Transport-level failure.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying libusb call failed.
    #[error("libusb: {0}")]
    Usb(#[from] rusb::Error),

    /// Enumeration found no device with the requested identity.
    #[error("no device with vendor {vendor_id:04X} product {product_id:04X}")]
    NoMatch { vendor_id: u16, product_id: u16 },

    /// The operation requires an open device handle.
    #[error("device is not open")]
    NotOpen,

    /// A descriptor answer was shorter than its declared length.
    #[error("short descriptor: expected {expected} bytes, got {actual}")]
    ShortDescriptor { expected: usize, actual: usize },

    /// The device answered a report request with zero bytes.
    #[error("device returned an empty report")]
    EmptyReport,
}

/// Identity of the physical device a port binds to. Immutable after
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Interface number used for claiming and report requests.
    pub interface: u8,
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04X}:{:04X} interface {}",
            self.vendor_id, self.product_id, self.interface
        )
    }
}

/// String descriptor indexes from the device descriptor; 0 means the
/// device declares no string for that field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StringIndexes {
    pub manufacturer: u8,
    pub product: u8,
    pub serial_number: u8,
}

/// Endpoint fields surfaced for poll-interval selection and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointProfile {
    /// bEndpointAddress: endpoint number in bits 0-3, direction in bit 7.
    pub address: u8,
    /// bmAttributes: transfer type, synchronization, usage.
    pub attributes: u8,
    pub max_packet_size: u16,
    /// bInterval, in the encoding of [`endpoint_poll_interval`].
    pub interval: u8,
}

/// First interface, first alternate setting of the active configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigProfile {
    /// Maximum bus current of the configuration, in milliamps.
    pub max_power_ma: u16,
    pub interface_class: u8,
    pub endpoints: Vec<EndpointProfile>,
    /// Class-specific bytes trailing the interface descriptor; for HID
    /// interfaces this holds the HID class descriptor.
    pub extra: Vec<u8>,
}

/// Poll interval advertised by an endpoint: 125 us x 2^(bInterval - 1).
///
/// bInterval is clamped to 1..=16 to keep the shift defined; 16 already
/// corresponds to a 4-second interval.
pub fn endpoint_poll_interval(b_interval: u8) -> Duration {
    let exponent = b_interval.clamp(1, 16) - 1;
    POLL_INTERVAL_UNIT * (1u32 << exponent)
}

/// Synchronous, blocking transport bound to at most one USB device.
///
/// All calls run on the session's polling thread; implementations need
/// no internal locking.
pub trait MouseTransport: Send {
    /// Enumerate attached devices and open the first one matching
    /// `identity`. Returns the device's string descriptor indexes.
    fn open(&mut self, identity: &DeviceIdentity) -> Result<StringIndexes, TransportError>;

    /// Detach a kernel driver bound to the interface, if one is active.
    fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), TransportError>;

    /// Claim the interface for this handle.
    fn claim_interface(&mut self, interface: u8) -> Result<(), TransportError>;

    /// Describe the active configuration's first interface.
    fn config_profile(&mut self) -> Result<ConfigProfile, TransportError>;

    /// Fetch `length` bytes of the interface's Report Descriptor via a
    /// standard GET_DESCRIPTOR request.
    fn read_report_descriptor(
        &mut self,
        interface: u8,
        length: usize,
    ) -> Result<Vec<u8>, TransportError>;

    /// Fetch a string descriptor in the device's first supported
    /// language, decoded under the ASCII-subset assumption.
    fn read_string_descriptor(&mut self, index: u8) -> Result<String, TransportError>;

    /// Read one input report via a class GET_REPORT control transfer.
    /// Returns the number of bytes the device produced, which may be
    /// less than `buf.len()`.
    fn read_input_report(&mut self, interface: u8, buf: &mut [u8])
        -> Result<usize, TransportError>;

    /// Drop the device handle. Safe to call when already closed.
    fn close(&mut self);
}
