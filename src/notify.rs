//! Change-driven notification fan-out.
//!
//! Subscribers register a callback against an address; after every
//! successful poll the registry compares the previous and current mouse
//! state and invokes each callback at most once, in registration order.
//! The first sample after a (re)connection is always delivered so every
//! subscriber starts from a known value, even when it matches the stale
//! previous state.

use std::sync::{Arc, Mutex, PoisonError};

use log::warn;

use crate::hid::mouse::MouseState;

/// Highest subscription address mapped to an individual button bit;
/// addresses 0 through this value select bits 0-7 of the button byte.
pub const ADDRESS_BUTTON_MAX: i32 = 7;
/// Subscription address of the X motion accumulator.
pub const ADDRESS_X: i32 = 10;
/// Subscription address of the Y motion accumulator.
pub const ADDRESS_Y: i32 = 11;
/// Subscription address of the wheel accumulator.
pub const ADDRESS_WHEEL: i32 = 12;

/// Callback invoked with the subscribed value: 0/1 for button bits, the
/// accumulator value for motion addresses.
///
/// Callbacks run on the polling thread and must be cheap; they must not
/// block or perform USB I/O.
pub type SubscriberCallback = Arc<dyn Fn(i32) + Send + Sync>;

struct Subscription {
    address: i32,
    callback: SubscriberCallback,
}

/// Identifies one registration. Registrations are never removed; the
/// handle exists so a removal operation can be added without changing
/// the registration interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle(usize);

/// Append-only subscriber registry, shared between the polling thread
/// and any thread that registers.
#[derive(Default)]
pub struct Subscribers {
    inner: Mutex<Vec<Subscription>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription. Many subscriptions may share one address.
    pub fn register(
        &self,
        address: i32,
        callback: impl Fn(i32) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let mut subscriptions = self.lock();
        subscriptions.push(Subscription {
            address,
            callback: Arc::new(callback),
        });
        SubscriptionHandle(subscriptions.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panicking subscriber must not take the registry down with it.
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscription>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One fan-out pass over `previous` -> `current`.
    ///
    /// `first_sample` forces delivery on every valid address and
    /// downgrades invalid addresses to a single warning. The lock is
    /// held only to snapshot the list; callbacks run outside it so
    /// concurrent registration is never blocked by subscriber code.
    pub fn notify(&self, previous: &MouseState, current: &MouseState, first_sample: bool) {
        let snapshot: Vec<(i32, SubscriberCallback)> = self
            .lock()
            .iter()
            .map(|s| (s.address, Arc::clone(&s.callback)))
            .collect();

        let changed_buttons = previous.buttons ^ current.buttons;
        for (address, callback) in snapshot {
            match address {
                0..=ADDRESS_BUTTON_MAX => {
                    let bit = 1u8 << address;
                    if changed_buttons & bit != 0 || first_sample {
                        callback(current.button(address as u8));
                    }
                }
                ADDRESS_X | ADDRESS_Y | ADDRESS_WHEEL => {
                    let (new_value, old_value) = match address {
                        ADDRESS_X => (current.x, previous.x),
                        ADDRESS_Y => (current.y, previous.y),
                        _ => (current.wheel, previous.wheel),
                    };
                    if new_value != old_value || first_sample {
                        callback(new_value);
                    }
                }
                other => {
                    if first_sample {
                        warn!("subscription on unsupported address {other} will never fire");
                    }
                }
            }
        }
    }
}
