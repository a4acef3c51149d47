//! USB transport layer.
//!
//! [`transport`] defines the seam between the session state machine and
//! libusb; [`device`] is the production implementation over `rusb`.

pub mod device;
pub mod transport;
