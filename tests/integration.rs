//! End-to-end tests: the session state machine driven by a scripted
//! transport and a deterministic clock, observed through subscribers
//! and the shared port state.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mousehub::config::RECONNECT_BACKOFF;
use mousehub::notify::{Subscribers, ADDRESS_WHEEL, ADDRESS_X, ADDRESS_Y};
use mousehub::usb::transport::{
    ConfigProfile, DeviceIdentity, EndpointProfile, MouseTransport, StringIndexes, TransportError,
};
use mousehub::{Clock, ConnectionState, ConnectWarning, Error, MousePort, MouseSession, PortConfig, PortState};

// ═══════════════════════════════════════════════════════════════════════════
// Test doubles
// ═══════════════════════════════════════════════════════════════════════════

/// Shared journal of transport and clock activity, used to assert
/// ordering (e.g. that the backoff sleep precedes the reconnect).
#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Clock whose sleeps advance virtual time instantly.
#[derive(Clone)]
struct FakeClock {
    journal: Journal,
    now: Arc<Mutex<Instant>>,
}

impl FakeClock {
    fn new(journal: Journal) -> Self {
        Self {
            journal,
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        self.journal.push(format!("sleep {}ms", duration.as_millis()));
        *self.now.lock().unwrap() += duration;
    }
}

/// Scripted transport: a queue of poll outcomes plus knobs for the
/// failure modes the state machine must tolerate.
struct ScriptedTransport {
    journal: Journal,
    reports: VecDeque<Result<Vec<u8>, TransportError>>,
    profile: ConfigProfile,
    report_descriptor: Vec<u8>,
    missing_device: bool,
    fail_claim: bool,
}

impl ScriptedTransport {
    fn new(journal: Journal) -> Self {
        Self {
            journal,
            reports: VecDeque::new(),
            profile: ConfigProfile {
                max_power_ma: 100,
                interface_class: 0x03,
                endpoints: vec![EndpointProfile {
                    address: 0x81,
                    attributes: 0x03,
                    max_packet_size: 4,
                    // 125 us x 2^3 = 1 ms.
                    interval: 4,
                }],
                extra: vec![0x09, 0x21, 0x11, 0x01, 0x00, 0x01, 0x22, 0x04, 0x00],
            },
            report_descriptor: vec![0x05, 0x01, 0x09, 0x02],
            missing_device: false,
            fail_claim: false,
        }
    }

    fn push_report(&mut self, bytes: &[u8]) {
        self.reports.push_back(Ok(bytes.to_vec()));
    }

    fn push_transfer_failure(&mut self) {
        self.reports.push_back(Err(TransportError::Usb(rusb::Error::Io)));
    }
}

impl MouseTransport for ScriptedTransport {
    fn open(&mut self, identity: &DeviceIdentity) -> Result<StringIndexes, TransportError> {
        if self.missing_device {
            return Err(TransportError::NoMatch {
                vendor_id: identity.vendor_id,
                product_id: identity.product_id,
            });
        }
        self.journal.push("open");
        Ok(StringIndexes {
            manufacturer: 1,
            product: 2,
            serial_number: 0,
        })
    }

    fn detach_kernel_driver(&mut self, _interface: u8) -> Result<(), TransportError> {
        Ok(())
    }

    fn claim_interface(&mut self, _interface: u8) -> Result<(), TransportError> {
        if self.fail_claim {
            return Err(TransportError::Usb(rusb::Error::Busy));
        }
        Ok(())
    }

    fn config_profile(&mut self) -> Result<ConfigProfile, TransportError> {
        Ok(self.profile.clone())
    }

    fn read_report_descriptor(
        &mut self,
        _interface: u8,
        length: usize,
    ) -> Result<Vec<u8>, TransportError> {
        assert_eq!(length, self.report_descriptor.len());
        Ok(self.report_descriptor.clone())
    }

    fn read_string_descriptor(&mut self, index: u8) -> Result<String, TransportError> {
        match index {
            1 => Ok("Example Corp".to_owned()),
            2 => Ok("Example Mouse".to_owned()),
            _ => Err(TransportError::NotOpen),
        }
    }

    fn read_input_report(
        &mut self,
        _interface: u8,
        buf: &mut [u8],
    ) -> Result<usize, TransportError> {
        self.journal.push("poll");
        match self.reports.pop_front() {
            Some(Ok(bytes)) => {
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok(bytes.len())
            }
            Some(Err(e)) => Err(e),
            None => Err(TransportError::EmptyReport),
        }
    }

    fn close(&mut self) {
        self.journal.push("close");
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Harness
// ═══════════════════════════════════════════════════════════════════════════

fn port_config() -> PortConfig {
    PortConfig {
        port_name: "mouse0".into(),
        vendor_id: 0x046D,
        product_id: 0xC077,
        interface: 0,
        poll_interval: None,
        priority: None,
    }
}

type TestSession = MouseSession<ScriptedTransport, FakeClock>;

fn new_session(
    config: PortConfig,
    transport: ScriptedTransport,
    clock: FakeClock,
) -> (TestSession, Arc<Subscribers>, Arc<Mutex<PortState>>) {
    let subscribers = Arc::new(Subscribers::new());
    let state = Arc::new(Mutex::new(PortState::default()));
    let session = MouseSession::new(
        &config,
        transport,
        clock,
        Arc::clone(&subscribers),
        Arc::clone(&state),
    );
    (session, subscribers, state)
}

fn recorder() -> (Arc<Mutex<Vec<i32>>>, impl Fn(i32) + Send + Sync + 'static) {
    let values = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&values);
    (values, move |v| sink.lock().unwrap().push(v))
}

fn values(recorded: &Arc<Mutex<Vec<i32>>>) -> Vec<i32> {
    recorded.lock().unwrap().clone()
}

// ═══════════════════════════════════════════════════════════════════════════
// First-sample and change-driven delivery
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn first_sample_is_delivered_even_without_change() {
    let journal = Journal::default();
    let mut transport = ScriptedTransport::new(journal.clone());
    // Two all-zero reports: identical to the zero-initialized previous
    // state in every field.
    transport.push_report(&[0, 0, 0, 0]);
    transport.push_report(&[0, 0, 0, 0]);

    let (mut session, subscribers, _state) =
        new_session(port_config(), transport, FakeClock::new(journal));
    let (button, cb) = recorder();
    subscribers.register(3, cb);
    let (x, cb) = recorder();
    subscribers.register(ADDRESS_X, cb);
    let (y, cb) = recorder();
    subscribers.register(ADDRESS_Y, cb);
    let (wheel, cb) = recorder();
    subscribers.register(ADDRESS_WHEEL, cb);

    session.connect().unwrap();
    session.step();

    // Exactly one forced delivery per subscriber.
    assert_eq!(values(&button), vec![0]);
    assert_eq!(values(&x), vec![0]);
    assert_eq!(values(&y), vec![0]);
    assert_eq!(values(&wheel), vec![0]);

    // The second identical sample fires nothing.
    session.step();
    assert_eq!(values(&button), vec![0]);
    assert_eq!(values(&x), vec![0]);
    assert_eq!(values(&y), vec![0]);
    assert_eq!(values(&wheel), vec![0]);
}

#[test]
fn button_bit_three_fires_iff_the_bit_flips() {
    let journal = Journal::default();
    let mut transport = ScriptedTransport::new(journal.clone());
    transport.push_report(&[0x00]);
    transport.push_report(&[0x08]);
    transport.push_report(&[0x08]);
    transport.push_report(&[0x00]);

    let (mut session, subscribers, _state) =
        new_session(port_config(), transport, FakeClock::new(journal));
    let (bit3, cb) = recorder();
    subscribers.register(3, cb);

    session.connect().unwrap();
    for _ in 0..4 {
        session.step();
    }

    // First sample, press, (no change), release.
    assert_eq!(values(&bit3), vec![0, 1, 0]);
}

#[test]
fn motion_subscriber_sees_accumulated_positions() {
    let journal = Journal::default();
    let mut transport = ScriptedTransport::new(journal.clone());
    transport.push_report(&[0x00, 0x05, 0x00, 0x00]);
    transport.push_report(&[0x00, 0x05, 0x00, 0x00]);
    transport.push_report(&[0x00, 0x00, 0x00, 0x00]);

    let (mut session, subscribers, _state) =
        new_session(port_config(), transport, FakeClock::new(journal));
    let (x, cb) = recorder();
    subscribers.register(ADDRESS_X, cb);

    session.connect().unwrap();
    for _ in 0..3 {
        session.step();
    }

    // Accumulator values, not deltas; the unchanged third pass is quiet.
    assert_eq!(values(&x), vec![5, 10]);
}

// ═══════════════════════════════════════════════════════════════════════════
// Disconnect and reconnect
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn transfer_failure_disconnects_and_recovery_redelivers_first_sample() {
    let journal = Journal::default();
    let mut transport = ScriptedTransport::new(journal.clone());
    transport.push_report(&[0x01]);
    transport.push_transfer_failure();
    transport.push_report(&[0x01]);

    let (mut session, subscribers, state) =
        new_session(port_config(), transport, FakeClock::new(journal.clone()));
    let (bit0, cb) = recorder();
    subscribers.register(0, cb);

    session.connect().unwrap();
    session.step();
    assert_eq!(values(&bit0), vec![1]);

    // The failing transfer closes the handle and leaves the session
    // disconnected; no decode or fan-out happens on the way down.
    session.step();
    assert!(!session.is_connected());
    assert_eq!(state.lock().unwrap().connection, ConnectionState::Disconnected);
    assert_eq!(values(&bit0), vec![1]);

    // The next iteration reconnects (after the backoff) and the first
    // sample is forced again even though the value never changed.
    session.step();
    assert!(session.is_connected());
    session.step();
    assert_eq!(values(&bit0), vec![1, 1]);
}

#[test]
fn reconnect_waits_the_full_backoff() {
    let journal = Journal::default();
    let mut transport = ScriptedTransport::new(journal.clone());
    transport.push_transfer_failure();
    transport.push_report(&[0x00]);

    let clock = FakeClock::new(journal.clone());
    let (mut session, _subscribers, _state) =
        new_session(port_config(), transport, clock.clone());

    session.connect().unwrap();
    session.step();
    assert!(!session.is_connected());

    let disconnected_at = clock.now();
    session.step();
    assert!(session.is_connected());
    assert!(clock.now().duration_since(disconnected_at) >= RECONNECT_BACKOFF);

    // The backoff sleep strictly precedes the reconnection attempt.
    let entries = journal.entries();
    let close = entries.iter().position(|e| e == "close").unwrap();
    let sleep = entries[close..]
        .iter()
        .position(|e| e == "sleep 10000ms")
        .unwrap()
        + close;
    let reopen = entries[close..].iter().position(|e| e == "open").unwrap() + close;
    assert!(sleep < reopen);
}

#[test]
fn missing_device_leaves_the_session_disconnected() {
    let journal = Journal::default();
    let mut transport = ScriptedTransport::new(journal.clone());
    transport.missing_device = true;

    let (mut session, _subscribers, state) =
        new_session(port_config(), transport, FakeClock::new(journal));

    match session.connect() {
        Err(Error::DeviceNotFound { vendor_id, product_id }) => {
            assert_eq!(vendor_id, 0x046D);
            assert_eq!(product_id, 0xC077);
        }
        other => panic!("expected DeviceNotFound, got {other:?}"),
    }
    assert!(!session.is_connected());
    assert_eq!(state.lock().unwrap().connection, ConnectionState::Disconnected);
}

// ═══════════════════════════════════════════════════════════════════════════
// Connection sequence details
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn connect_captures_descriptor_strings_and_interval() {
    let journal = Journal::default();
    let transport = ScriptedTransport::new(journal.clone());
    let expected_descriptor = transport.report_descriptor.clone();

    let (mut session, _subscribers, state) =
        new_session(port_config(), transport, FakeClock::new(journal));
    session.connect().unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.connection, ConnectionState::Connected);
    assert_eq!(state.report_descriptor, expected_descriptor);
    assert_eq!(state.hid_class.unwrap().report_descriptor_length, 4);
    assert_eq!(state.manufacturer, "Example Corp");
    assert_eq!(state.product, "Example Mouse");
    // Index 0 means the device declares no serial number.
    assert_eq!(state.serial_number, "???");
    // bInterval 4 on the endpoint: 125 us x 2^3.
    assert_eq!(state.poll_interval, Duration::from_millis(1));
    assert!(state.warnings.is_empty());
}

#[test]
fn device_derived_interval_paces_the_polling_loop() {
    let journal = Journal::default();
    let mut transport = ScriptedTransport::new(journal.clone());
    transport.push_report(&[0x00]);

    let (mut session, _subscribers, _state) =
        new_session(port_config(), transport, FakeClock::new(journal.clone()));
    session.connect().unwrap();
    session.step();

    assert!(journal.entries().contains(&"sleep 1ms".to_owned()));
}

#[test]
fn operator_interval_overrides_the_device() {
    let journal = Journal::default();
    let mut transport = ScriptedTransport::new(journal.clone());
    transport.push_report(&[0x00]);

    let mut config = port_config();
    config.poll_interval = Some(Duration::from_millis(25));
    let (mut session, _subscribers, state) =
        new_session(config, transport, FakeClock::new(journal.clone()));
    session.connect().unwrap();
    session.step();

    assert_eq!(state.lock().unwrap().poll_interval, Duration::from_millis(25));
    assert!(journal.entries().contains(&"sleep 25ms".to_owned()));
}

#[test]
fn claim_failure_is_a_warning_not_an_error() {
    let journal = Journal::default();
    let mut transport = ScriptedTransport::new(journal.clone());
    transport.fail_claim = true;

    let (mut session, _subscribers, state) =
        new_session(port_config(), transport, FakeClock::new(journal));
    session.connect().unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.connection, ConnectionState::Connected);
    assert_eq!(state.warnings.len(), 1);
    assert!(matches!(
        state.warnings[0],
        ConnectWarning::ClaimFailed { interface: 0, .. }
    ));
}

#[test]
fn non_hid_interface_is_tolerated() {
    let journal = Journal::default();
    let mut transport = ScriptedTransport::new(journal.clone());
    transport.profile.interface_class = 0xFF;

    let (mut session, _subscribers, state) =
        new_session(port_config(), transport, FakeClock::new(journal));
    session.connect().unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.connection, ConnectionState::Connected);
    assert!(state.report_descriptor.is_empty());
    assert!(state
        .warnings
        .iter()
        .any(|w| matches!(w, ConnectWarning::NotHidClass(0xFF))));
}

// ═══════════════════════════════════════════════════════════════════════════
// Port glue
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn configure_rejects_an_empty_port_name() {
    let journal = Journal::default();
    let transport = ScriptedTransport::new(journal.clone());
    let mut config = port_config();
    config.port_name = String::new();

    match MousePort::with_transport(config, transport, FakeClock::new(journal)) {
        Err(Error::Config(_)) => {}
        other => panic!("expected Error::Config, got {:?}", other.err()),
    }
}

#[test]
fn port_runs_on_a_thread_and_stops_on_shutdown() {
    let journal = Journal::default();
    let mut transport = ScriptedTransport::new(journal.clone());
    for _ in 0..4 {
        transport.push_report(&[0x00, 0x01]);
    }

    let port =
        MousePort::with_transport(port_config(), transport, FakeClock::new(journal)).unwrap();
    let report = port.report(2);
    assert!(report.contains("Vendor ID: 0x046D"));
    assert!(report.contains("Manufacturer: \"Example Corp\""));
    assert!(report.contains("Usage page 0001"));

    // FakeClock sleeps return immediately, so the reader spins; join
    // must still terminate promptly once the token is set.
    port.join();
}
