//! libusb-backed [`MouseTransport`] implementation.
//!
//! Thin adapter over `rusb`: every method maps to one or two libusb
//! calls with the crate-wide request timeout. String descriptors are
//! fetched manually in two control round trips (language list, then the
//! string) and decoded under the ASCII-subset assumption rather than as
//! full UTF-16.

use std::time::Duration;

use rusb::constants::{LIBUSB_DT_STRING, LIBUSB_REQUEST_GET_DESCRIPTOR};
use rusb::{Context, DeviceHandle, Direction, Recipient, RequestType, UsbContext};

use crate::config::{STRING_BUFFER_CAPACITY, USB_TIMEOUT};
use crate::hid::{DESCRIPTOR_TYPE_REPORT, REPORT_TYPE_INPUT, REQUEST_GET_REPORT};
use crate::usb::transport::{
    ConfigProfile, DeviceIdentity, EndpointProfile, MouseTransport, StringIndexes, TransportError,
};

/// Production transport over a libusb context.
pub struct UsbDeviceTransport {
    context: Context,
    handle: Option<DeviceHandle<Context>>,
    timeout: Duration,
}

impl UsbDeviceTransport {
    pub fn new() -> Result<Self, TransportError> {
        Ok(Self {
            context: Context::new()?,
            handle: None,
            timeout: USB_TIMEOUT,
        })
    }

    fn handle(&self) -> Result<&DeviceHandle<Context>, TransportError> {
        self.handle.as_ref().ok_or(TransportError::NotOpen)
    }

    fn handle_mut(&mut self) -> Result<&mut DeviceHandle<Context>, TransportError> {
        self.handle.as_mut().ok_or(TransportError::NotOpen)
    }
}

fn endpoint_attributes(
    transfer: rusb::TransferType,
    sync: rusb::SyncType,
    usage: rusb::UsageType,
) -> u8 {
    let transfer = match transfer {
        rusb::TransferType::Control => 0,
        rusb::TransferType::Isochronous => 1,
        rusb::TransferType::Bulk => 2,
        rusb::TransferType::Interrupt => 3,
    };
    let sync = match sync {
        rusb::SyncType::NoSync => 0,
        rusb::SyncType::Asynchronous => 1,
        rusb::SyncType::Adaptive => 2,
        rusb::SyncType::Synchronous => 3,
    };
    let usage = match usage {
        rusb::UsageType::Data => 0,
        rusb::UsageType::Feedback => 1,
        rusb::UsageType::FeedbackData => 2,
        rusb::UsageType::Reserved => 3,
    };
    transfer | (sync << 2) | (usage << 4)
}

impl MouseTransport for UsbDeviceTransport {
    fn open(&mut self, identity: &DeviceIdentity) -> Result<StringIndexes, TransportError> {
        for device in self.context.devices()?.iter() {
            let descriptor = device.device_descriptor()?;
            if descriptor.vendor_id() != identity.vendor_id
                || descriptor.product_id() != identity.product_id
            {
                continue;
            }
            self.handle = Some(device.open()?);
            return Ok(StringIndexes {
                manufacturer: descriptor.manufacturer_string_index().unwrap_or(0),
                product: descriptor.product_string_index().unwrap_or(0),
                serial_number: descriptor.serial_number_string_index().unwrap_or(0),
            });
        }
        Err(TransportError::NoMatch {
            vendor_id: identity.vendor_id,
            product_id: identity.product_id,
        })
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), TransportError> {
        let handle = self.handle_mut()?;
        if handle.kernel_driver_active(interface)? {
            handle.detach_kernel_driver(interface)?;
        }
        Ok(())
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), TransportError> {
        self.handle_mut()?.claim_interface(interface)?;
        Ok(())
    }

    fn config_profile(&mut self) -> Result<ConfigProfile, TransportError> {
        let device = self.handle()?.device();
        let config = device.active_config_descriptor()?;
        let mut profile = ConfigProfile {
            max_power_ma: config.max_power(),
            ..ConfigProfile::default()
        };
        if let Some(interface) = config.interfaces().next() {
            if let Some(setting) = interface.descriptors().next() {
                profile.interface_class = setting.class_code();
                profile.extra = setting.extra().to_vec();
                profile.endpoints = setting
                    .endpoint_descriptors()
                    .map(|endpoint| EndpointProfile {
                        address: endpoint.address(),
                        attributes: endpoint_attributes(
                            endpoint.transfer_type(),
                            endpoint.sync_type(),
                            endpoint.usage_type(),
                        ),
                        max_packet_size: endpoint.max_packet_size(),
                        interval: endpoint.interval(),
                    })
                    .collect();
            }
        }
        Ok(profile)
    }

    fn read_report_descriptor(
        &mut self,
        interface: u8,
        length: usize,
    ) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; length];
        let read = self.handle()?.read_control(
            rusb::request_type(Direction::In, RequestType::Standard, Recipient::Interface),
            LIBUSB_REQUEST_GET_DESCRIPTOR,
            (DESCRIPTOR_TYPE_REPORT as u16) << 8,
            interface as u16,
            &mut buf,
            self.timeout,
        )?;
        if read != length {
            return Err(TransportError::ShortDescriptor {
                expected: length,
                actual: read,
            });
        }
        Ok(buf)
    }

    fn read_string_descriptor(&mut self, index: u8) -> Result<String, TransportError> {
        let handle = self.handle()?;
        let request_type =
            rusb::request_type(Direction::In, RequestType::Standard, Recipient::Device);
        let mut buf = [0u8; STRING_BUFFER_CAPACITY];

        // First round trip: the supported language identifiers live in
        // string descriptor index 0.
        let read = handle.read_control(
            request_type,
            LIBUSB_REQUEST_GET_DESCRIPTOR,
            (LIBUSB_DT_STRING as u16) << 8,
            0,
            &mut buf,
            self.timeout,
        )?;
        if read < 4 {
            return Err(TransportError::ShortDescriptor {
                expected: 4,
                actual: read,
            });
        }
        let language = u16::from_le_bytes([buf[2], buf[3]]);

        // Second round trip: the string itself, in that language.
        let read = handle.read_control(
            request_type,
            LIBUSB_REQUEST_GET_DESCRIPTOR,
            ((LIBUSB_DT_STRING as u16) << 8) | index as u16,
            language,
            &mut buf,
            self.timeout,
        )?;
        if read < 2 {
            return Err(TransportError::ShortDescriptor {
                expected: 2,
                actual: read,
            });
        }

        // The payload is UTF-16LE; the ASCII subset lands in every other
        // byte, which is all this driver needs from mice.
        let end = (buf[0] as usize).min(read).max(2);
        let value = buf[2..end].iter().step_by(2).map(|&b| b as char).collect();
        Ok(value)
    }

    fn read_input_report(
        &mut self,
        interface: u8,
        buf: &mut [u8],
    ) -> Result<usize, TransportError> {
        let read = self.handle()?.read_control(
            rusb::request_type(Direction::In, RequestType::Class, Recipient::Interface),
            REQUEST_GET_REPORT,
            (REPORT_TYPE_INPUT as u16) << 8,
            interface as u16,
            buf,
            self.timeout,
        )?;
        Ok(read)
    }

    fn close(&mut self) {
        self.handle = None;
    }
}
