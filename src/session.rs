//! Device session state machine.
//!
//! A session binds a configured device identity to a live USB
//! connection and drives the connect -> poll -> reconnect cycle for the
//! lifetime of the port. Every iteration reads one input report over a
//! control transfer, folds it into the accumulated mouse state, and
//! runs the change-driven fan-out. Any transfer failure drops the
//! connection; the loop retries after a fixed backoff, forever.
//!
//! [`MousePort`] is the operator-facing wrapper: it validates the
//! configuration, owns the shared port state, and runs the session on a
//! dedicated `<port>_READER` thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{DEFAULT_POLL_INTERVAL, RECONNECT_BACKOFF, REPORT_BUFFER_CAPACITY};
use crate::error::{ConnectWarning, Error};
use crate::hid::mouse::MouseState;
use crate::hid::HidClassDescriptor;
use crate::notify::{Subscribers, SubscriptionHandle};
use crate::report;
use crate::usb::device::UsbDeviceTransport;
use crate::usb::transport::{
    endpoint_poll_interval, ConfigProfile, DeviceIdentity, MouseTransport, TransportError,
};

/// Connection state as seen by diagnostics and the fan-out.
///
/// There is no partially-connected state: a session is `Connected` only
/// once every mandatory connection step has succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

/// Operator-supplied port configuration.
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Name of the logical port; the reader thread is named after it.
    pub port_name: String,
    pub vendor_id: u16,
    pub product_id: u16,
    /// Interface number used for claiming and report requests.
    pub interface: u8,
    /// Fixed poll interval; `None` derives the interval from the
    /// device's endpoint descriptor at connect time.
    pub poll_interval: Option<Duration>,
    /// Requested scheduling priority for the reader thread. Recorded
    /// for diagnostics; std threads run at the platform default.
    pub priority: Option<i32>,
}

/// Port state shared between the polling thread (single writer) and
/// diagnostic readers.
#[derive(Default)]
pub struct PortState {
    pub connection: ConnectionState,
    pub manufacturer: String,
    pub product: String,
    pub serial_number: String,
    /// HID class descriptor extracted from the interface extra bytes.
    pub hid_class: Option<HidClassDescriptor>,
    /// Raw Report Descriptor bytes, empty until fetched.
    pub report_descriptor: Vec<u8>,
    /// Active configuration profile from the last connection.
    pub profile: Option<ConfigProfile>,
    /// Effective poll interval (operator-specified or device-derived).
    pub poll_interval: Duration,
    /// Input reports decoded since configuration.
    pub packet_count: u64,
    /// Bytes of the most recent input report.
    pub last_report: Vec<u8>,
    /// Non-fatal conditions from the most recent connection attempt.
    pub warnings: Vec<ConnectWarning>,
}

pub(crate) fn lock_state(state: &Mutex<PortState>) -> MutexGuard<'_, PortState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cooperative stop signal for the polling thread.
///
/// Deployed ports never set it; it exists so tests and interactive use
/// can stop the otherwise endless loop.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One logical device session: identity, transport, and the accumulated
/// mouse state. Generic over transport and clock so tests can drive the
/// state machine deterministically.
pub struct MouseSession<T, C> {
    name: String,
    identity: DeviceIdentity,
    transport: T,
    clock: C,
    subscribers: Arc<Subscribers>,
    state: Arc<Mutex<PortState>>,
    /// Operator-specified interval; `None` selects the device's.
    requested_interval: Option<Duration>,
    poll_interval: Duration,
    previous: MouseState,
    current: MouseState,
    delivered_first_sample: bool,
    connected: bool,
}

impl<T: MouseTransport, C: Clock> MouseSession<T, C> {
    pub fn new(
        config: &PortConfig,
        transport: T,
        clock: C,
        subscribers: Arc<Subscribers>,
        state: Arc<Mutex<PortState>>,
    ) -> Self {
        let identity = DeviceIdentity {
            vendor_id: config.vendor_id,
            product_id: config.product_id,
            interface: config.interface,
        };
        let poll_interval = config.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL);
        lock_state(&state).poll_interval = poll_interval;
        Self {
            name: config.port_name.clone(),
            identity,
            transport,
            clock,
            subscribers,
            state,
            requested_interval: config.poll_interval,
            poll_interval,
            previous: MouseState::new(),
            current: MouseState::new(),
            delivered_first_sample: false,
            connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Attempt the full connection sequence.
    ///
    /// On success the session is `Connected` and the next poll delivers
    /// a first sample to every subscriber. Tolerated failures are
    /// logged, collected into the port state, and do not abort the
    /// attempt; a mandatory-step failure closes the handle and leaves
    /// the session `Disconnected`.
    pub fn connect(&mut self) -> Result<(), Error> {
        match self.try_connect() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.transport.close();
                Err(e)
            }
        }
    }

    fn try_connect(&mut self) -> Result<(), Error> {
        let mut warnings = Vec::new();
        let interface = self.identity.interface;

        let strings = match self.transport.open(&self.identity) {
            Ok(strings) => strings,
            Err(TransportError::NoMatch {
                vendor_id,
                product_id,
            }) => {
                return Err(Error::DeviceNotFound {
                    vendor_id,
                    product_id,
                })
            }
            Err(e) => return Err(Error::OpenFailed(e)),
        };

        if let Err(e) = self.transport.detach_kernel_driver(interface) {
            warn!("{}: could not detach kernel driver: {e}", self.name);
            warnings.push(ConnectWarning::KernelDetachFailed(e));
        }
        if let Err(e) = self.transport.claim_interface(interface) {
            warn!("{}: could not claim interface {interface}: {e}", self.name);
            warnings.push(ConnectWarning::ClaimFailed {
                interface,
                source: e,
            });
        }

        let profile = self.transport.config_profile().map_err(Error::Transport)?;

        if self.requested_interval.is_none() {
            self.poll_interval = match profile.endpoints.first() {
                Some(endpoint) => endpoint_poll_interval(endpoint.interval),
                None => {
                    warn!(
                        "{}: no endpoint to derive a poll interval from, using {:?}",
                        self.name, DEFAULT_POLL_INTERVAL
                    );
                    DEFAULT_POLL_INTERVAL
                }
            };
        }

        let mut hid_class = None;
        let mut report_descriptor = Vec::new();
        if profile.interface_class == crate::hid::CLASS_HID {
            match HidClassDescriptor::parse(&profile.extra) {
                Some(descriptor) => {
                    hid_class = Some(descriptor);
                    let length = descriptor.report_descriptor_length as usize;
                    match self.transport.read_report_descriptor(interface, length) {
                        Ok(bytes) => report_descriptor = bytes,
                        Err(e) => {
                            warn!("{}: report descriptor fetch failed: {e}", self.name);
                            warnings.push(ConnectWarning::ReportDescriptorFetchFailed(e));
                        }
                    }
                }
                None => {
                    warn!(
                        "{}: interface carries no valid HID class descriptor",
                        self.name
                    );
                    warnings.push(ConnectWarning::HidDescriptorMissing);
                }
            }
        } else {
            warn!(
                "{}: interface class {} is not HID",
                self.name, profile.interface_class
            );
            warnings.push(ConnectWarning::NotHidClass(profile.interface_class));
        }

        let manufacturer = self.fetch_string(strings.manufacturer, "manufacturer", &mut warnings);
        let product = self.fetch_string(strings.product, "product", &mut warnings);
        let serial_number =
            self.fetch_string(strings.serial_number, "serial number", &mut warnings);

        {
            let mut state = lock_state(&self.state);
            state.connection = ConnectionState::Connected;
            state.manufacturer = manufacturer;
            state.product = product;
            state.serial_number = serial_number;
            state.hid_class = hid_class;
            state.report_descriptor = report_descriptor;
            state.profile = Some(profile);
            state.poll_interval = self.poll_interval;
            state.warnings = warnings;
        }
        self.delivered_first_sample = false;
        self.connected = true;
        info!("{}: connected to {}", self.name, self.identity);
        Ok(())
    }

    fn fetch_string(
        &mut self,
        index: u8,
        which: &'static str,
        warnings: &mut Vec<ConnectWarning>,
    ) -> String {
        if index == 0 {
            return crate::config::MISSING_STRING_PLACEHOLDER.to_owned();
        }
        match self.transport.read_string_descriptor(index) {
            Ok(value) => value,
            Err(e) => {
                warn!("{}: could not read {which} string: {e}", self.name);
                warnings.push(ConnectWarning::StringDescriptorFailed { which, source: e });
                format!("<{which} unavailable>")
            }
        }
    }

    /// Read and decode one input report, then run the fan-out pass.
    fn poll_once(&mut self) -> Result<(), Error> {
        let mut buf = [0u8; REPORT_BUFFER_CAPACITY];
        let read = match self
            .transport
            .read_input_report(self.identity.interface, &mut buf)
        {
            Ok(0) => return Err(Error::TransferFailed(TransportError::EmptyReport)),
            Ok(read) => read,
            Err(e) => return Err(Error::TransferFailed(e)),
        };
        let data = &buf[..read];

        self.current.apply_report(data);
        self.subscribers
            .notify(&self.previous, &self.current, !self.delivered_first_sample);
        self.previous = self.current;
        self.delivered_first_sample = true;

        let mut state = lock_state(&self.state);
        state.packet_count += 1;
        state.last_report.clear();
        state.last_report.extend_from_slice(data);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.transport.close();
        self.connected = false;
        lock_state(&self.state).connection = ConnectionState::Disconnected;
    }

    /// Drive one iteration of the state machine: while disconnected,
    /// sleep the backoff and attempt a reconnect; while connected, poll
    /// one report and sleep the poll interval.
    pub fn step(&mut self) {
        if !self.connected {
            self.clock.sleep(RECONNECT_BACKOFF);
            if let Err(e) = self.connect() {
                error!("{}: connect failed: {e}", self.name);
            }
            return;
        }
        match self.poll_once() {
            Ok(()) => self.clock.sleep(self.poll_interval),
            Err(e) => {
                error!("{}: {e}; will reconnect", self.name);
                self.disconnect();
            }
        }
    }

    /// Run until `shutdown` is set. Deployed ports never set it, so the
    /// loop effectively runs for the process lifetime.
    pub fn run(&mut self, shutdown: &ShutdownToken) {
        while !shutdown.is_set() {
            self.step();
        }
        self.transport.close();
    }
}

/// A configured port: owns the reader thread and exposes registration
/// and diagnostics to collaborators.
pub struct MousePort {
    identity: DeviceIdentity,
    subscribers: Arc<Subscribers>,
    state: Arc<Mutex<PortState>>,
    shutdown: ShutdownToken,
    thread: Option<thread::JoinHandle<()>>,
}

impl MousePort {
    /// Validate `config`, open a libusb context, attempt one eager
    /// connection, and start the reader thread. A failed first attempt
    /// is not fatal; the reader retries with the standard backoff.
    pub fn configure(config: PortConfig) -> Result<Self, Error> {
        let transport = UsbDeviceTransport::new()?;
        Self::with_transport(config, transport, SystemClock)
    }

    /// [`configure`](Self::configure) with an explicit transport and
    /// clock.
    pub fn with_transport<T, C>(config: PortConfig, transport: T, clock: C) -> Result<Self, Error>
    where
        T: MouseTransport + 'static,
        C: Clock + 'static,
    {
        if config.port_name.is_empty() {
            return Err(Error::Config("port name must not be empty"));
        }
        if let Some(priority) = config.priority {
            if priority > 0 {
                debug!(
                    "{}: priority {priority} requested; reader thread uses the platform default",
                    config.port_name
                );
            }
        }

        let subscribers = Arc::new(Subscribers::new());
        let state = Arc::new(Mutex::new(PortState::default()));
        let mut session = MouseSession::new(
            &config,
            transport,
            clock,
            Arc::clone(&subscribers),
            Arc::clone(&state),
        );

        if let Err(e) = session.connect() {
            warn!("{}: initial connect failed: {e}", config.port_name);
        }

        let shutdown = ShutdownToken::new();
        let thread_shutdown = shutdown.clone();
        let thread = thread::Builder::new()
            .name(format!("{}_READER", config.port_name))
            .spawn(move || session.run(&thread_shutdown))?;

        Ok(Self {
            identity: DeviceIdentity {
                vendor_id: config.vendor_id,
                product_id: config.product_id,
                interface: config.interface,
            },
            subscribers,
            state,
            shutdown,
            thread: Some(thread),
        })
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    /// Register a subscriber; see [`crate::notify`] for the address
    /// semantics.
    pub fn register(
        &self,
        address: i32,
        callback: impl Fn(i32) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.subscribers.register(address, callback)
    }

    /// Render the diagnostic report at the given detail level (0-4).
    pub fn report(&self, details: u8) -> String {
        let state = lock_state(&self.state);
        report::render(&self.identity, &state, details)
    }

    /// Signal the reader thread to stop after its current iteration.
    /// Does not wait; pair with [`join`](Self::join) when completion
    /// matters.
    pub fn shutdown(&self) {
        self.shutdown.set();
    }

    /// Stop the reader thread and wait for it to finish. The thread may
    /// be mid-sleep; with the system clock this blocks up to one
    /// backoff period.
    pub fn join(mut self) {
        self.shutdown.set();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for MousePort {
    fn drop(&mut self) {
        self.shutdown.set();
    }
}
