//! Typed event dispatcher
//!
//! Synchronous publish/subscribe keyed by an event's name. Events are a
//! tagged union implementing [`Event`]; the name is the union's
//! discriminant, so a handler registered for `Positions` only ever sees
//! position events.
//!
//! # Guarantees
//!
//! - Handlers for one name run in registration order, on the emitting task
//! - A panicking handler is logged and skipped; the rest still run
//! - Handlers may register or remove listeners (including themselves)
//!   while being invoked

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::error;

/// An event that can be routed by name
pub trait Event: Send + Sync + 'static {
    /// Discriminant used as the registry key
    type Name: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn name(&self) -> Self::Name;
}

/// Callback invoked with every matching event
pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Identifies one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener<E> {
    id: ListenerId,
    handler: Handler<E>,
    once: bool,
}

struct Registry<E: Event> {
    listeners: RwLock<HashMap<E::Name, Vec<Listener<E>>>>,
    next_id: AtomicU64,
}

impl<E: Event> Registry<E> {
    fn remove(&self, name: E::Name, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(list) = listeners.get_mut(&name) else {
            return false;
        };
        let before = list.len();
        list.retain(|l| l.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(&name);
        }
        removed
    }
}

/// Handle returned by [`EventDispatcher::on`] and [`EventDispatcher::once`]
///
/// Dropping it keeps the listener registered.
pub struct Unsubscribe<E: Event> {
    registry: Weak<Registry<E>>,
    name: E::Name,
    id: ListenerId,
}

impl<E: Event> Unsubscribe<E> {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn name(&self) -> E::Name {
        self.name
    }

    /// Remove the listener; false if it was already gone
    pub fn unsubscribe(self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.remove(self.name, self.id))
    }
}

impl<E: Event> Debug for Unsubscribe<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish()
    }
}

/// Registry of event handlers keyed by event name
pub struct EventDispatcher<E: Event> {
    registry: Arc<Registry<E>>,
}

impl<E: Event> Clone for EventDispatcher<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E: Event> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> EventDispatcher<E> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                listeners: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a handler for every event named `name`
    pub fn on<F>(&self, name: E::Name, handler: F) -> Unsubscribe<E>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(name, Arc::new(handler), false)
    }

    /// Register a handler for the next event named `name` only
    pub fn once<F>(&self, name: E::Name, handler: F) -> Unsubscribe<E>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(name, Arc::new(handler), true)
    }

    /// Remove one registration; false if it was not registered
    pub fn off(&self, name: E::Name, id: ListenerId) -> bool {
        self.registry.remove(name, id)
    }

    fn register(&self, name: E::Name, handler: Handler<E>, once: bool) -> Unsubscribe<E> {
        let id = ListenerId(self.registry.next_id.fetch_add(1, Ordering::Relaxed));
        self.registry
            .listeners
            .write()
            .entry(name)
            .or_default()
            .push(Listener { id, handler, once });

        Unsubscribe {
            registry: Arc::downgrade(&self.registry),
            name,
            id,
        }
    }

    /// Deliver `event` to its handlers; returns how many ran
    ///
    /// Meant for the component that owns the dispatcher, not for
    /// subscribers.
    pub fn emit(&self, event: &E) -> usize {
        let name = event.name();

        // Snapshot under the lock, invoke without it
        let handlers: Vec<Handler<E>> = {
            let mut listeners = self.registry.listeners.write();
            let Some(list) = listeners.get_mut(&name) else {
                return 0;
            };
            let snapshot = list.iter().map(|l| Arc::clone(&l.handler)).collect();
            list.retain(|l| !l.once);
            if list.is_empty() {
                listeners.remove(&name);
            }
            snapshot
        };

        for handler in &handlers {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(event))) {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(event = ?name, "Event handler panicked: {}", message);
            }
        }

        handlers.len()
    }

    /// Remove every listener for `name`, or every listener when `None`
    pub fn remove_all_listeners(&self, name: Option<E::Name>) {
        let mut listeners = self.registry.listeners.write();
        match name {
            Some(name) => {
                listeners.remove(&name);
            }
            None => listeners.clear(),
        }
    }

    pub fn listener_count(&self, name: E::Name) -> usize {
        self.registry
            .listeners
            .read()
            .get(&name)
            .map_or(0, Vec::len)
    }

    pub fn has_listeners(&self, name: E::Name) -> bool {
        self.listener_count(name) > 0
    }

    /// Names with at least one registered listener
    pub fn event_names(&self) -> Vec<E::Name> {
        self.registry.listeners.read().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Name {
        Ping,
        Pong,
    }

    #[derive(Debug)]
    enum TestEvent {
        Ping(u32),
        Pong,
    }

    impl Event for TestEvent {
        type Name = Name;

        fn name(&self) -> Name {
            match self {
                TestEvent::Ping(_) => Name::Ping,
                TestEvent::Pong => Name::Pong,
            }
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> Handler<TestEvent>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = Arc::clone(&log);
        let make = move |tag: &'static str| -> Handler<TestEvent> {
            let log = Arc::clone(&log_clone);
            Arc::new(move |event: &TestEvent| log.lock().push(format!("{tag}:{event:?}")))
        };
        (log, make)
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let dispatcher = EventDispatcher::<TestEvent>::new();
        let (log, make) = recorder();
        for tag in ["a", "b", "c"] {
            let handler = make(tag);
            dispatcher.on(Name::Ping, move |e| handler(e));
        }

        assert_eq!(dispatcher.emit(&TestEvent::Ping(7)), 3);
        assert_eq!(*log.lock(), vec!["a:Ping(7)", "b:Ping(7)", "c:Ping(7)"]);
    }

    #[test]
    fn test_events_only_reach_their_name() {
        let dispatcher = EventDispatcher::<TestEvent>::new();
        let (log, make) = recorder();
        let handler = make("pong");
        dispatcher.on(Name::Pong, move |e| handler(e));

        assert_eq!(dispatcher.emit(&TestEvent::Ping(1)), 0);
        assert_eq!(dispatcher.emit(&TestEvent::Pong), 1);
        assert_eq!(*log.lock(), vec!["pong:Pong"]);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let dispatcher = EventDispatcher::<TestEvent>::new();
        let (log, make) = recorder();
        let first = make("first");
        let last = make("last");
        dispatcher.on(Name::Ping, move |e| first(e));
        dispatcher.on(Name::Ping, |_| panic!("handler failure"));
        dispatcher.on(Name::Ping, move |e| last(e));

        assert_eq!(dispatcher.emit(&TestEvent::Ping(3)), 3);
        assert_eq!(*log.lock(), vec!["first:Ping(3)", "last:Ping(3)"]);
    }

    #[test]
    fn test_once_fires_a_single_time() {
        let dispatcher = EventDispatcher::<TestEvent>::new();
        let (log, make) = recorder();
        let handler = make("once");
        dispatcher.once(Name::Ping, move |e| handler(e));

        dispatcher.emit(&TestEvent::Ping(1));
        dispatcher.emit(&TestEvent::Ping(2));
        assert_eq!(*log.lock(), vec!["once:Ping(1)"]);
        assert!(!dispatcher.has_listeners(Name::Ping));
    }

    #[test]
    fn test_unsubscribe_and_off() {
        let dispatcher = EventDispatcher::<TestEvent>::new();
        let first = dispatcher.on(Name::Ping, |_| {});
        let second = dispatcher.on(Name::Ping, |_| {});
        assert_eq!(dispatcher.listener_count(Name::Ping), 2);

        assert!(first.unsubscribe());
        assert!(dispatcher.off(Name::Ping, second.id()));
        assert!(!dispatcher.off(Name::Ping, second.id()));
        assert!(!second.unsubscribe());
        assert!(dispatcher.event_names().is_empty());
    }

    #[test]
    fn test_handler_can_unsubscribe_itself() {
        let dispatcher = EventDispatcher::<TestEvent>::new();
        let slot: Arc<Mutex<Option<Unsubscribe<TestEvent>>>> = Arc::new(Mutex::new(None));
        let slot_clone = Arc::clone(&slot);
        let calls = Arc::new(AtomicU64::new(0));
        let calls_clone = Arc::clone(&calls);

        let handle = dispatcher.on(Name::Ping, move |_| {
            calls_clone.fetch_add(1, Ordering::Relaxed);
            if let Some(handle) = slot_clone.lock().take() {
                handle.unsubscribe();
            }
        });
        *slot.lock() = Some(handle);

        dispatcher.emit(&TestEvent::Ping(1));
        dispatcher.emit(&TestEvent::Ping(2));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_remove_all_listeners() {
        let dispatcher = EventDispatcher::<TestEvent>::new();
        dispatcher.on(Name::Ping, |_| {});
        dispatcher.on(Name::Pong, |_| {});

        dispatcher.remove_all_listeners(Some(Name::Ping));
        assert_eq!(dispatcher.event_names(), vec![Name::Pong]);

        dispatcher.remove_all_listeners(None);
        assert!(!dispatcher.has_listeners(Name::Pong));
    }

    #[test]
    fn test_unsubscribe_after_dispatcher_dropped() {
        let dispatcher = EventDispatcher::<TestEvent>::new();
        let handle = dispatcher.on(Name::Pong, |_| {});
        drop(dispatcher);
        assert!(!handle.unsubscribe());
    }
}
