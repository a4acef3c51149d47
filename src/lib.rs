//! USB HID mouse polling driver.
//!
//! mousehub binds a vendor/product-identified USB mouse to a logical
//! port, polls it over synchronous GET_REPORT control transfers, and
//! republishes state changes (buttons, relative motion, wheel) to
//! registered subscribers. Transient disconnects are recovered
//! automatically with a fixed backoff.
//!
//! Module map:
//! - [`hid`] - Report Descriptor decoding and input-report accumulation
//! - [`usb`] - transport seam over libusb
//! - [`session`] - connect/poll/reconnect state machine and port glue
//! - [`notify`] - change-driven subscriber fan-out
//!
//! ```no_run
//! use mousehub::{MousePort, PortConfig, ADDRESS_X};
//!
//! let port = MousePort::configure(PortConfig {
//!     port_name: "mouse0".into(),
//!     vendor_id: 0x046D,
//!     product_id: 0xC077,
//!     interface: 0,
//!     poll_interval: None,
//!     priority: None,
//! })?;
//! port.register(ADDRESS_X, |x| println!("x is now {x}"));
//! # Ok::<(), mousehub::Error>(())
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod hid;
pub mod notify;
pub mod session;
pub mod usb;

mod report;

pub use clock::{Clock, SystemClock};
pub use error::{ConnectWarning, Error};
pub use hid::mouse::MouseState;
pub use notify::{
    SubscriptionHandle, ADDRESS_BUTTON_MAX, ADDRESS_WHEEL, ADDRESS_X, ADDRESS_Y,
};
pub use session::{
    ConnectionState, MousePort, MouseSession, PortConfig, PortState, ShutdownToken,
};
pub use usb::transport::{DeviceIdentity, MouseTransport, TransportError};
