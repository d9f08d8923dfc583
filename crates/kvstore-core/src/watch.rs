//! Change-notification registry
//!
//! Each store owns one [`WatcherRegistry`]. Mutations call
//! [`WatcherRegistry::notify`] after the backend write succeeds; every live
//! subscription whose [`Matcher`] accepts the key receives one
//! [`ChangeEvent`] on its bounded queue.
//!
//! # Backpressure
//!
//! A full queue blocks the notifying mutation until the subscriber drains an
//! event or the subscription is cancelled. Slow consumers throttle writers
//! rather than losing events.
//!
//! # Lock protocol
//!
//! `notify` holds the index in shared mode for the whole fan-out. Registration
//! and removal need exclusive mode. Cancellation is two-phase:
//!
//! 1. Fire the subscription's cancel signal. This takes no registry lock, so a
//!    notifier blocked on that subscription's full queue wakes immediately and
//!    skips it.
//! 2. Take the exclusive lock and remove the subscription. Dropping the entry
//!    drops the queue's sender, which closes the event stream.
//!
//! Reversing the phases deadlocks: the canceller would wait for the exclusive
//! lock while the notifier, holding the shared lock, waits for a queue slot
//! that only the (now blocked) consumer could free.

use crate::observe;
use crate::types::ChangeEvent;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Which keys a subscription receives events for
///
/// Matching is done on the rendered key (see [`crate::Codec::render_key`]):
/// `"user:1"` for a string key, `"42"` for an integer key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// Rendered key equals the string
    Key(String),
    /// Rendered key starts with the string
    Prefix(String),
}

impl Matcher {
    pub fn key(key: impl Into<String>) -> Self {
        Matcher::Key(key.into())
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        Matcher::Prefix(prefix.into())
    }

    pub fn matches(&self, rendered_key: &str) -> bool {
        match self {
            Matcher::Key(key) => rendered_key == key,
            Matcher::Prefix(prefix) => rendered_key.starts_with(prefix.as_str()),
        }
    }
}

/// Lock-free cancellation signal
///
/// The listener side never receives a message; it observes disconnection once
/// the trigger sender is dropped, which wakes every `select!` parked on it.
struct CancelSignal {
    cancelled: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    listener: Receiver<()>,
}

impl CancelSignal {
    fn new() -> Self {
        let (trigger, listener) = bounded(0);
        Self {
            cancelled: AtomicBool::new(false),
            trigger: Mutex::new(Some(trigger)),
            listener,
        }
    }

    /// Returns true only for the call that actually cancelled.
    fn fire(&self) -> bool {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.trigger.lock().take();
        true
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

struct Subscription<K, V> {
    matcher: Matcher,
    sender: Sender<ChangeEvent<K, V>>,
    signal: Arc<CancelSignal>,
}

struct RegistryInner<K, V> {
    subscriptions: RwLock<BTreeMap<u64, Subscription<K, V>>>,
    next_id: AtomicU64,
    capacity: usize,
}

/// Removal half of the cancel protocol, erased over the event types
trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<K: Send, V: Send> Detach for RegistryInner<K, V> {
    fn detach(&self, id: u64) {
        let removed = self.subscriptions.write().remove(&id);
        if removed.is_some() {
            tracing::debug!(subscription = id, "Subscription removed");
        }
        // `removed` drops here, closing the event stream
    }
}

/// Cancels one subscription
///
/// Cloneable and idempotent. Dropping the handle does **not** cancel. A
/// subscription is also cancelled and removed by the first matching
/// notification after its receiver has been dropped.
#[derive(Clone)]
pub struct CancelHandle {
    id: u64,
    signal: Arc<CancelSignal>,
    registry: Weak<dyn Detach>,
}

impl CancelHandle {
    /// Stop delivery and close the event stream
    ///
    /// Safe to call from any thread, including while a mutation is blocked
    /// delivering to this subscription.
    pub fn cancel(&self) {
        if !self.signal.fire() {
            return;
        }
        tracing::debug!(subscription = self.id, "Subscription cancelled");
        if let Some(registry) = self.registry.upgrade() {
            registry.detach(self.id);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Per-store fan-out of change events to subscriptions
pub struct WatcherRegistry<K, V> {
    inner: Arc<RegistryInner<K, V>>,
}

impl<K, V> WatcherRegistry<K, V>
where
    K: Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Create a registry whose subscriptions buffer up to `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                subscriptions: RwLock::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                capacity,
            }),
        }
    }

    /// Register a subscription
    ///
    /// Returns the receive side of the subscription's queue and the handle
    /// that cancels it. The stream yields events in mutation order and ends
    /// once the subscription is cancelled and its buffered events are drained.
    pub fn subscribe(&self, matcher: Matcher) -> (Receiver<ChangeEvent<K, V>>, CancelHandle) {
        let (sender, receiver) = bounded(self.inner.capacity);
        let signal = Arc::new(CancelSignal::new());
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(subscription = id, matcher = ?matcher, "Subscription registered");
        self.inner.subscriptions.write().insert(
            id,
            Subscription {
                matcher,
                sender,
                signal: Arc::clone(&signal),
            },
        );

        let registry: Arc<dyn Detach> = self.inner.clone();
        let handle = CancelHandle {
            id,
            signal,
            registry: Arc::downgrade(&registry),
        };
        (receiver, handle)
    }

    /// Deliver `event` to every live subscription matching `rendered_key`
    ///
    /// Blocks on full queues. Each blocked delivery races the subscription's
    /// cancel signal; a cancelled subscription is skipped. A subscription
    /// whose receiver was dropped is cancelled and removed. Returns the
    /// number of subscriptions the event was delivered to.
    pub fn notify(&self, rendered_key: &str, event: &ChangeEvent<K, V>) -> usize {
        let mut delivered = 0;
        let mut disconnected = Vec::new();

        {
            let subscriptions = self.inner.subscriptions.read();
            for (id, sub) in subscriptions.iter() {
                if !sub.matcher.matches(rendered_key) || sub.signal.is_cancelled() {
                    continue;
                }

                let started = Instant::now();
                select! {
                    send(sub.sender, event.clone()) -> res => match res {
                        Ok(()) => delivered += 1,
                        Err(_) => {
                            sub.signal.fire();
                            disconnected.push(*id);
                        }
                    },
                    recv(sub.signal.listener) -> _ => {
                        tracing::trace!(subscription = *id, "Cancelled during delivery");
                    }
                }
                observe::record_delivery_wait(started.elapsed());
            }
        }

        if !disconnected.is_empty() {
            let mut subscriptions = self.inner.subscriptions.write();
            for id in &disconnected {
                subscriptions.remove(id);
            }
            tracing::debug!(
                count = disconnected.len(),
                "Removed subscriptions whose receiver was dropped"
            );
        }

        delivered
    }

    /// Cancel every subscription and reset the registry to empty
    pub fn stop_all(&self) {
        // Phase 1 uses a recursive read so it is not queued behind a waiting
        // writer while a notifier still holds the shared lock.
        {
            let subscriptions = self.inner.subscriptions.read_recursive();
            for sub in subscriptions.values() {
                sub.signal.fire();
            }
        }

        // Entries registered after phase 1 are signalled here
        let drained = std::mem::take(&mut *self.inner.subscriptions.write());
        for sub in drained.values() {
            sub.signal.fire();
        }
        tracing::debug!(count = drained.len(), "Stopped all subscriptions");
    }
}

impl<K, V> WatcherRegistry<K, V> {
    /// Number of live subscriptions
    pub fn len(&self) -> usize {
        self.inner.subscriptions.read_recursive().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue capacity given to new subscriptions
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

impl<K, V> fmt::Debug for WatcherRegistry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherRegistry")
            .field("subscriptions", &self.len())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}
