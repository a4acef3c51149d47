//! Human-readable port diagnostics.
//!
//! Pure presentation over [`PortState`]. Detail levels: 1 shows device
//! identity, poll interval, and strings; 2 adds the HID class
//! descriptor, decoded Report Descriptor items, and endpoint
//! descriptors; 3 adds the packet counter; 4 adds the last raw report
//! bytes in hexadecimal.

use std::fmt::Write;

use crate::hid::descriptor;
use crate::session::{ConnectionState, PortState};
use crate::usb::transport::{endpoint_poll_interval, DeviceIdentity, EndpointProfile};

const TRANSFER_TYPES: [&str; 4] = ["Control", "Isochronous", "Bulk", "Interrupt"];
const SYNCHRONIZATION_TYPES: [&str; 4] = ["None", "Asynchronous", "Adaptive", "Synchronous"];
const USAGE_TYPES: [&str; 4] = ["Data", "Feedback", "Data (implicit feedback)", "Reserved"];

pub(crate) fn render(identity: &DeviceIdentity, state: &PortState, details: u8) -> String {
    let mut out = String::new();

    if details >= 1 {
        let _ = writeln!(out, "          Vendor ID: 0x{:04X}", identity.vendor_id);
        let _ = writeln!(out, "         Product ID: 0x{:04X}", identity.product_id);
        let _ = writeln!(out, "   Interface number: {}", identity.interface);
        let _ = writeln!(
            out,
            "   Connection state: {}",
            match state.connection {
                ConnectionState::Connected => "Connected",
                ConnectionState::Disconnected => "Disconnected",
            }
        );
        let _ = writeln!(
            out,
            "      Poll interval: {:.3} ms",
            state.poll_interval.as_secs_f64() * 1e3
        );
        if let Some(profile) = &state.profile {
            let _ = writeln!(out, "    Maximum current: {} mA", profile.max_power_ma);
        }
        let _ = writeln!(out, "       Manufacturer: \"{}\"", state.manufacturer);
        let _ = writeln!(out, "            Product: \"{}\"", state.product);
        let _ = writeln!(out, "      Serial number: \"{}\"", state.serial_number);
        for warning in &state.warnings {
            let _ = writeln!(out, "            Warning: {warning}");
        }
    }

    if details >= 2 {
        if let Some(hid) = &state.hid_class {
            let _ = writeln!(
                out,
                "           HID Code: {:02X}.{:02X}",
                hid.bcd_hid >> 8,
                hid.bcd_hid & 0xFF
            );
            let _ = writeln!(
                out,
                "   HID Country Code: {}{}",
                hid.country_code,
                if hid.country_code == 0 {
                    " (non-localized)"
                } else {
                    ""
                }
            );
            let _ = writeln!(out, "  HID # Descriptors: {}", hid.num_descriptors);
            let _ = writeln!(
                out,
                "  HID Report Length: {}",
                hid.report_descriptor_length
            );
            for item in descriptor::items(&state.report_descriptor) {
                let _ = writeln!(
                    out,
                    "           {:>8}  {:indent$}{}",
                    item.kind.label(),
                    "",
                    item,
                    indent = (item.depth * 3) as usize
                );
            }
        }
        if let Some(profile) = &state.profile {
            for endpoint in &profile.endpoints {
                render_endpoint(&mut out, endpoint);
            }
        }
    }

    if details >= 3 {
        let _ = writeln!(out, "       Packet Count: {}", state.packet_count);
    }

    if details >= 4 && !state.last_report.is_empty() {
        let mut line = String::from("    ");
        for byte in &state.last_report {
            let _ = write!(line, " {byte:02X}");
        }
        let _ = writeln!(out, "{line}");
    }

    out
}

fn render_endpoint(out: &mut String, endpoint: &EndpointProfile) {
    let _ = writeln!(out, "   Endpoint descriptor:");
    let _ = writeln!(
        out,
        "              Endpoint: {} ({})",
        endpoint.address & 0xF,
        if endpoint.address & 0x80 != 0 {
            "IN"
        } else {
            "OUT"
        }
    );
    let _ = writeln!(
        out,
        "                  Type: {}",
        TRANSFER_TYPES[(endpoint.attributes & 0x3) as usize]
    );
    let _ = writeln!(
        out,
        "       Synchronization: {}",
        SYNCHRONIZATION_TYPES[((endpoint.attributes >> 2) & 0x3) as usize]
    );
    let _ = writeln!(
        out,
        "                 Usage: {}",
        USAGE_TYPES[((endpoint.attributes >> 4) & 0x3) as usize]
    );
    let _ = writeln!(
        out,
        "       Max packet size: {}",
        endpoint.max_packet_size
    );
    let _ = writeln!(
        out,
        "             bInterval: {} ({:.3} ms)",
        endpoint.interval,
        endpoint_poll_interval(endpoint.interval).as_secs_f64() * 1e3
    );
}
