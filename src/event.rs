//! A dynamic, named publish/subscribe channel, owned per-registry.
//!
//! Events are identified by name and carry a positional [`Value`] argument list whose arity
//! and types are a contract between emitter and subscribers, not something the bus enforces.
//! Dispatch is synchronous, on the calling thread, in subscription order; an emit with no
//! subscribers is a no-op.
//!
//! Event naming:
//! - Framework events are prefixed with `core:` (see [`events`]).
//! - External code should prefix its events with its own namespace and `:`, for example
//!   `interstellar:start_hyperspace`, to avoid name clashes. The bus does not enforce the
//!   convention.
//!
//! It is the responsibility of the subscriber to remove its handlers once it is deleted or
//! no longer interested; the bus never drops a subscription on its own.

use std::rc::Rc;

use crate::entity::EntityId;
use crate::hashing::hash_str;
use crate::physics::DynamicsWorld;
use crate::universe::Registry;
use crate::value::Value;
use crate::HashMap;

/// Event names reserved by the framework.
pub mod events {
    /// Emitted by the registry right after a new object is registered, before its
    /// `init`/`create` hooks run. Arguments: the new object's id.
    pub const NEW_OBJECT: &str = "core:new_object";
    /// Emitted by the registry when an object's removal is requested, before the object
    /// is excised. Arguments: the removed object's id.
    pub const REMOVE_OBJECT: &str = "core:remove_object";
}

/// Handlers receive the registry and the physics world so they can look objects up,
/// create or remove them, and emit further events. Re-entrant emits are permitted;
/// handlers are responsible for avoiding infinite recursion.
pub type EventHandler = dyn Fn(&mut Registry, &mut dyn DynamicsWorld, &[Value]);

/// Identifies the owner of a subscription so it can be removed later. Entities use their
/// id; host subsystems can derive a stable token from a name.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub u64);

impl SubscriberId {
    /// Derives a stable subscriber token from a name, e.g. `"renderer"`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self(hash_str(name))
    }
}

impl From<EntityId> for SubscriberId {
    #[allow(clippy::cast_sign_loss)]
    fn from(id: EntityId) -> Self {
        Self(id.0 as u64)
    }
}

struct Subscription {
    subscriber: SubscriberId,
    handler: Rc<EventHandler>,
}

/// The subscription table. Owned by a [`Registry`]; dispatch happens through
/// [`Registry::emit_event`](crate::universe::Registry::emit_event), which snapshots the
/// handler list so handlers may re-entrantly subscribe, unsubscribe or emit.
#[derive(Default)]
pub struct EventBus {
    subscriptions: HashMap<String, Vec<Subscription>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> EventBus {
        EventBus::default()
    }

    /// Adds a handler for `event`. A subscriber may hold any number of subscriptions,
    /// including several for the same event; they are dispatched in subscription order.
    pub fn subscribe(
        &mut self,
        event: &str,
        subscriber: SubscriberId,
        handler: impl Fn(&mut Registry, &mut dyn DynamicsWorld, &[Value]) + 'static,
    ) {
        let handler: Rc<EventHandler> = Rc::new(handler);
        self.subscriptions
            .entry(event.to_string())
            .or_default()
            .push(Subscription {
                subscriber,
                handler,
            });
    }

    /// Removes every subscription held by `subscriber`, across all events.
    pub fn unsubscribe(&mut self, subscriber: SubscriberId) {
        for subscriptions in self.subscriptions.values_mut() {
            subscriptions.retain(|s| s.subscriber != subscriber);
        }
        self.subscriptions.retain(|_, s| !s.is_empty());
    }

    /// Removes `subscriber`'s subscriptions for a single event.
    pub fn unsubscribe_from(&mut self, event: &str, subscriber: SubscriberId) {
        if let Some(subscriptions) = self.subscriptions.get_mut(event) {
            subscriptions.retain(|s| s.subscriber != subscriber);
            if subscriptions.is_empty() {
                self.subscriptions.remove(event);
            }
        }
    }

    /// Snapshots the handlers for `event` in subscription order. The snapshot is what makes
    /// dispatch safe against handlers that mutate the subscription table mid-emit: changes
    /// only affect the next emit.
    #[must_use]
    pub fn handlers(&self, event: &str) -> Vec<Rc<EventHandler>> {
        match self.subscriptions.get(event) {
            Some(subscriptions) => subscriptions.iter().map(|s| Rc::clone(&s.handler)).collect(),
            None => Vec::new(),
        }
    }

    /// The number of subscriptions currently held for `event`.
    #[must_use]
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.subscriptions.get(event).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::physics::FixedStepWorld;
    use crate::script::NativeRuntime;

    fn scratch_registry() -> (Registry, FixedStepWorld) {
        (
            Registry::new(Box::new(NativeRuntime::new())),
            FixedStepWorld::new(),
        )
    }

    #[test]
    fn dispatch_runs_in_subscription_order() {
        let (mut registry, mut world) = scratch_registry();
        let mut bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Rc::clone(&seen);
            bus.subscribe("test:ping", SubscriberId::from_name(tag), move |_, _, _| {
                seen.borrow_mut().push(tag);
            });
        }

        for handler in bus.handlers("test:ping") {
            handler(&mut registry, &mut world, &[]);
        }
        assert_eq!(*seen.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn emit_with_no_subscribers_is_a_noop() {
        let bus = EventBus::new();
        assert!(bus.handlers("test:nobody_home").is_empty());
        assert_eq!(bus.subscriber_count("test:nobody_home"), 0);
    }

    #[test]
    fn unsubscribe_removes_all_subscriptions_of_a_subscriber() {
        let mut bus = EventBus::new();
        let chatty = SubscriberId::from_name("chatty");
        let quiet = SubscriberId::from_name("quiet");

        bus.subscribe("test:a", chatty, |_, _, _| {});
        bus.subscribe("test:a", quiet, |_, _, _| {});
        bus.subscribe("test:b", chatty, |_, _, _| {});
        assert_eq!(bus.subscriber_count("test:a"), 2);
        assert_eq!(bus.subscriber_count("test:b"), 1);

        bus.unsubscribe(chatty);
        assert_eq!(bus.subscriber_count("test:a"), 1);
        assert_eq!(bus.subscriber_count("test:b"), 0);
    }

    #[test]
    fn unsubscribe_from_is_per_event() {
        let mut bus = EventBus::new();
        let subscriber = SubscriberId::from_name("selective");

        bus.subscribe("test:a", subscriber, |_, _, _| {});
        bus.subscribe("test:b", subscriber, |_, _, _| {});
        bus.unsubscribe_from("test:a", subscriber);

        assert_eq!(bus.subscriber_count("test:a"), 0);
        assert_eq!(bus.subscriber_count("test:b"), 1);
    }

    #[test]
    fn handler_snapshot_is_stable_against_mutation() {
        let mut bus = EventBus::new();
        let subscriber = SubscriberId::from_name("once");
        bus.subscribe("test:tick", subscriber, |_, _, _| {});

        let snapshot = bus.handlers("test:tick");
        bus.unsubscribe(subscriber);

        // The already-taken snapshot still holds the handler; the table does not.
        assert_eq!(snapshot.len(), 1);
        assert_eq!(bus.subscriber_count("test:tick"), 0);
    }

    #[test]
    fn entity_ids_make_valid_subscriber_tokens() {
        assert_eq!(SubscriberId::from(EntityId(42)), SubscriberId(42));
        assert_ne!(
            SubscriberId::from_name("renderer"),
            SubscriberId::from_name("audio")
        );
    }
}
