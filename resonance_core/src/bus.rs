//! Event Bus
//! =========
//!
//! Typed publish/subscribe. Each topic is a marker type with a fixed payload
//! shape and a kebab-case name:
//!
//! | Topic                        | Name                          | Payload          |
//! |------------------------------|-------------------------------|------------------|
//! | [`NewWave`]                  | `new-event`                   | [`Wave`]         |
//! | [`WaveUpdated`]              | `event-updated`               | [`Wave`]         |
//! | [`KpiUpdated`]               | `kpi-updated`                 | [`KpiSnapshot`]  |
//! | [`EventsPerIntervalUpdated`] | `events-per-interval-updated` | `Vec<f64>`       |
//! | [`RewardPerIntervalUpdated`] | `reward-per-interval-updated` | `Vec<f64>`       |
//! | [`TickerUpdated`]            | `ticker-updated`              | `Vec<String>`    |
//! | [`GraphUpdated`]             | `graph-updated`               | [`GraphSnapshot`]|
//!
//! Handlers run synchronously, in registration order, on the engine's
//! thread. They receive a reference to a freshly built copy of engine state,
//! never to the state itself. Publishing to a topic without handlers is a
//! no-op; a late subscriber never sees earlier events.

use crate::metrics::KpiSnapshot;
use crate::topology::GraphSnapshot;
use crate::wave::Wave;
use std::marker::PhantomData;
use tokio::sync::mpsc;

/// A typed topic.
pub trait Topic: 'static {
    type Payload: Clone + Send + 'static;
    const NAME: &'static str;

    #[doc(hidden)]
    fn slot(bus: &mut EventBus) -> &mut Slot<Self::Payload>;
}

/// Boxed topic handler.
pub type Handler<P> = Box<dyn FnMut(&P) + Send>;

/// Handle returned by `subscribe`; pass it back to `unsubscribe`.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Subscription<T: Topic> {
    id: u64,
    _topic: PhantomData<fn() -> T>,
}

impl<T: Topic> Subscription<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topic(&self) -> &'static str {
        T::NAME
    }
}

impl<T: Topic> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Topic> Copy for Subscription<T> {}

/// Listener list for one topic.
pub struct Slot<P> {
    handlers: Vec<(u64, Handler<P>)>,
}

impl<P> Default for Slot<P> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}

impl<P> Slot<P> {
    fn len(&self) -> usize {
        self.handlers.len()
    }
}

macro_rules! topics {
    ($($marker:ident => $field:ident : $payload:ty, $name:literal;)*) => {
        $(
            #[doc = concat!("`", $name, "` topic.")]
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub struct $marker;

            impl Topic for $marker {
                type Payload = $payload;
                const NAME: &'static str = $name;

                fn slot(bus: &mut EventBus) -> &mut Slot<Self::Payload> {
                    &mut bus.$field
                }
            }
        )*

        /// Registry of listener lists, one per topic.
        #[derive(Default)]
        pub struct EventBus {
            next_id: u64,
            $($field: Slot<$payload>,)*
        }

        /// Names of every topic, in declaration order.
        pub fn topic_names() -> &'static [&'static str] {
            &[$($name,)*]
        }

        impl EventBus {
            /// Total handlers registered across all topics.
            pub fn handler_count(&self) -> usize {
                0 $(+ self.$field.len())*
            }
        }
    };
}

topics! {
    NewWave => new_wave: Wave, "new-event";
    WaveUpdated => wave_updated: Wave, "event-updated";
    KpiUpdated => kpi_updated: KpiSnapshot, "kpi-updated";
    EventsPerIntervalUpdated => events_per_interval: Vec<f64>, "events-per-interval-updated";
    RewardPerIntervalUpdated => reward_per_interval: Vec<f64>, "reward-per-interval-updated";
    TickerUpdated => ticker: Vec<String>, "ticker-updated";
    GraphUpdated => graph: GraphSnapshot, "graph-updated";
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler; it will run after every handler registered before it.
    pub fn subscribe<T, F>(&mut self, handler: F) -> Subscription<T>
    where
        T: Topic,
        F: FnMut(&T::Payload) + Send + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        T::slot(self).handlers.push((id, Box::new(handler)));
        Subscription {
            id,
            _topic: PhantomData,
        }
    }

    /// Forwards every payload of a topic into an unbounded channel.
    ///
    /// Once the receiver is dropped, sends fail silently until the
    /// subscription is removed.
    pub fn subscribe_channel<T: Topic>(&mut self) -> (Subscription<T>, mpsc::UnboundedReceiver<T::Payload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = self.subscribe::<T, _>(move |payload: &T::Payload| {
            let _ = tx.send(payload.clone());
        });
        (sub, rx)
    }

    /// Removes a handler. Returns false if it was already gone.
    pub fn unsubscribe<T: Topic>(&mut self, subscription: Subscription<T>) -> bool {
        let slot = T::slot(self);
        let before = slot.handlers.len();
        slot.handlers.retain(|(id, _)| *id != subscription.id);
        slot.handlers.len() != before
    }

    /// Invokes every handler of the topic, in registration order.
    pub fn publish<T: Topic>(&mut self, payload: &T::Payload) {
        for (_, handler) in T::slot(self).handlers.iter_mut() {
            handler(payload);
        }
    }

    /// Handlers currently registered for a topic.
    pub fn subscriber_count<T: Topic>(&mut self) -> usize {
        T::slot(self).len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handler_count())
            .finish()
    }
}
