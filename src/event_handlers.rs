//! Typed listener registries used for every event civic-link broadcasts.
//!
//! Each event kind (auth-state changes, connection status, notifications,
//! errors) gets its own [`Listeners<T>`] registry.  Registering a callback
//! returns a [`Subscription`] handle; dropping the handle (or calling
//! [`Subscription::unsubscribe`]) removes the callback again.
//!
//! # Example
//!
//! ```rust
//! use civic_link::event_handlers::Listeners;
//!
//! let listeners: Listeners<String> = Listeners::new();
//! let sub = listeners.subscribe(|msg| println!("got {}", msg));
//! listeners.emit(&"hello".to_string());
//! sub.unsubscribe();
//! assert!(listeners.is_empty());
//! ```

use crate::models::{ConnectionStatus, Notification};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Callback stored in a [`Listeners`] registry.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct ListenerSet<T> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Listener<T>)>>,
}

impl<T> ListenerSet<T> {
    fn remove(&self, id: u64) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|(entry_id, _)| *entry_id != id);
    }
}

/// Registry of callbacks for a single event type.
///
/// Cloning is cheap and yields a handle to the same registry.  Callbacks are
/// invoked synchronously, in registration order, outside the registry lock so
/// a callback may itself subscribe, unsubscribe or emit.
pub struct Listeners<T> {
    inner: Arc<ListenerSet<T>>,
}

impl<T: 'static> Listeners<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ListenerSet {
                next_id: AtomicU64::new(1),
                entries: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a callback. It stays registered while the returned
    /// [`Subscription`] is alive.
    pub fn subscribe(&self, f: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(f)));

        let weak: Weak<ListenerSet<T>> = Arc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(set) = weak.upgrade() {
                    set.remove(id);
                }
            })),
        }
    }

    /// Dispatch `value` to every registered callback.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = {
            let entries = self.inner.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.iter().map(|(_, cb)| cb.clone()).collect()
        };
        for cb in snapshot {
            cb(value);
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns `true` if no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Listeners<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.inner.entries.lock().map(|e| e.len()).unwrap_or(0);
        f.debug_struct("Listeners").field("count", &count).finish()
    }
}

/// Handle returned by [`Listeners::subscribe`].
///
/// The callback is removed when the handle is dropped.  Use
/// [`Subscription::detach`] to keep it registered for the lifetime of the
/// registry instead.
#[must_use = "dropping a Subscription immediately unregisters the callback"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Remove the callback now.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Keep the callback registered until the registry itself is dropped.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Error information passed to connection `error` listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionError {
    /// Human-readable error message.
    pub message: String,
    /// Whether this error is recoverable (i.e. auto-reconnect may succeed).
    pub recoverable: bool,
}

impl ConnectionError {
    /// Create a new connection error.
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// The three registries a [`ConnectionManager`](crate::ConnectionManager)
/// broadcasts on.
#[derive(Clone, Default, Debug)]
pub struct ConnectionEvents {
    pub notification: Listeners<Notification>,
    pub status: Listeners<ConnectionStatus>,
    pub error: Listeners<ConnectionError>,
}

impl ConnectionEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn emit_notification(&self, notification: &Notification) {
        self.notification.emit(notification);
    }

    pub(crate) fn emit_status(&self, status: ConnectionStatus) {
        self.status.emit(&status);
    }

    pub(crate) fn emit_error(&self, error: ConnectionError) {
        self.error.emit(&error);
    }
}
