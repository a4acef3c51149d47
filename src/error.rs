//! Unified error type for mousehub.
//!
//! Connection-fatal conditions are [`Error`] variants; conditions the
//! connection sequence tolerates are collected as [`ConnectWarning`]
//! values so callers see a partial-success record instead of a bare log
//! line.

use thiserror::Error;

use crate::usb::transport::TransportError;

/// Top-level error type used across the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Enumeration found no device matching the configured identity.
    #[error("no USB device with vendor {vendor_id:04X} product {product_id:04X}")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },

    /// The matching device could not be opened.
    #[error("failed to open device: {0}")]
    OpenFailed(#[source] TransportError),

    /// An input-report transfer failed; fatal to the current connection.
    #[error("input report transfer failed: {0}")]
    TransferFailed(#[source] TransportError),

    /// Any other transport failure during the connection sequence.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The port configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(&'static str),

    /// The reader thread could not be started.
    #[error("could not start reader thread: {0}")]
    Thread(#[from] std::io::Error),
}

/// Non-fatal conditions observed while connecting.
///
/// Each is logged as a warning and recorded in the port state; none of
/// them aborts the connection attempt.
#[derive(Debug, Error)]
pub enum ConnectWarning {
    /// A kernel driver owned the interface and could not be detached.
    #[error("could not detach kernel driver: {0}")]
    KernelDetachFailed(#[source] TransportError),

    /// The interface could not be claimed.
    #[error("could not claim interface {interface}: {source}")]
    ClaimFailed {
        interface: u8,
        #[source]
        source: TransportError,
    },

    /// The first interface does not carry the HID class code.
    #[error("interface class {0} is not HID")]
    NotHidClass(u8),

    /// The interface extra bytes held no valid HID class descriptor.
    #[error("no valid HID class descriptor in interface extra bytes")]
    HidDescriptorMissing,

    /// The Report Descriptor could not be fetched.
    #[error("report descriptor fetch failed: {0}")]
    ReportDescriptorFetchFailed(#[source] TransportError),

    /// A string descriptor could not be read; a placeholder was used.
    #[error("{which} string descriptor unavailable: {source}")]
    StringDescriptorFailed {
        which: &'static str,
        #[source]
        source: TransportError,
    },
}
