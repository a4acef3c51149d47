//! Timing and protocol constants.
//!
//! All request timeouts, retry parameters, and buffer capacities live
//! here so they can be tuned in one place.

use std::time::Duration;

// USB requests

/// How long to wait for a control-transfer response.
pub const USB_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest string descriptor we will request from a device.
pub const STRING_BUFFER_CAPACITY: usize = 255;

// Polling

/// Capacity of the input-report read buffer. Boot-protocol mice produce
/// 3-4 byte reports; the headroom accommodates vendor extensions.
pub const REPORT_BUFFER_CAPACITY: usize = 80;

/// Base unit for device-derived poll intervals (one high-speed
/// microframe, 125 microseconds).
pub const POLL_INTERVAL_UNIT: Duration = Duration::from_micros(125);

/// Fallback poll interval when the operator requested device-derived
/// polling but the interface exposes no endpoint to derive it from.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

// Reconnection

/// Fixed delay before each reconnection attempt. Retries are unbounded.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(10);

// Strings

/// Placeholder substituted when a device declares no string descriptor.
pub const MISSING_STRING_PLACEHOLDER: &str = "???";
