use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::message::{ClusterMessage, Envelope, Topic};

/// Callback invoked for every envelope delivered on a subscribed topic. The
/// second argument names the originating server.
pub type TopicCallback = Arc<dyn Fn(&ClusterMessage, &str) + Send + Sync>;

/// Per-transport subscription registry.
///
/// Every transport owns its own table, so two transports in one process
/// never observe each other's subscriptions. Registration order defines
/// invocation order; there is no unsubscribe.
#[derive(Default)]
pub struct SubscriptionTable {
    callbacks: RwLock<HashMap<Topic, Vec<TopicCallback>>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, topic: Topic, callback: F)
    where
        F: Fn(&ClusterMessage, &str) + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .entry(topic)
            .or_default()
            .push(Arc::new(callback));
    }

    /// Invoke every callback registered for the envelope's topic, in
    /// registration order. Callbacks are cloned out of the table first, so
    /// one of them may subscribe while dispatch is in flight.
    pub fn dispatch(&self, envelope: &Envelope) {
        let matched: Vec<TopicCallback> = {
            let callbacks = self.callbacks.read();
            match callbacks.get(&envelope.message.topic) {
                Some(list) => list.clone(),
                None => return,
            }
        };

        for callback in matched {
            callback(&envelope.message, &envelope.from_server);
        }
    }
}

impl fmt::Debug for SubscriptionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let callbacks = self.callbacks.read();
        let mut map = f.debug_map();
        for (topic, list) in callbacks.iter() {
            map.entry(topic, &list.len());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::message::Action;
    use parking_lot::Mutex;

    fn event_envelope() -> Envelope {
        Envelope::broadcast(ClusterMessage::new(Topic::Event, Action::Emit), "origin")
    }

    #[test]
    fn callbacks_fire_in_registration_order() {
        let table = SubscriptionTable::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let seen = seen.clone();
            table.subscribe(Topic::Event, move |_, _| seen.lock().push(label));
        }

        table.dispatch(&event_envelope());
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn other_topics_stay_silent() {
        let table = SubscriptionTable::new();
        let seen = Arc::new(Mutex::new(0u32));

        let counter = seen.clone();
        table.subscribe(Topic::Record, move |_, _| *counter.lock() += 1);

        table.dispatch(&event_envelope());
        assert_eq!(*seen.lock(), 0);
    }

    #[test]
    fn callbacks_receive_message_and_origin() {
        let table = SubscriptionTable::new();
        let seen = Arc::new(Mutex::new(None));

        let slot = seen.clone();
        table.subscribe(Topic::Event, move |message, origin| {
            *slot.lock() = Some((message.clone(), origin.to_string()));
        });

        table.dispatch(&event_envelope());
        let (message, origin) = seen.lock().take().expect("callback did not fire");
        assert_eq!(message.topic, Topic::Event);
        assert_eq!(origin, "origin");
    }
}
