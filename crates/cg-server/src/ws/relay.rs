//! Broadcast relay: fans one chat message out to every open connection.

use std::sync::Arc;

use super::events::{ChatEvent, ChatMessage};
use super::registry::{ConnectionId, ConnectionRegistry};

/// Fan-out over the connection registry. The sender receives its own
/// message back, like every other member.
#[derive(Debug, Clone)]
pub struct Relay {
    registry: Arc<ConnectionRegistry>,
}

impl Relay {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver `message` to every connection in the current snapshot and
    /// return how many accepted it.
    ///
    /// A recipient whose socket has gone away is evicted and skipped; it
    /// never affects delivery to the rest or surfaces to the sender.
    pub fn relay(&self, message: &ChatMessage, sender: Option<ConnectionId>) -> usize {
        let frame = match ChatEvent::Message(message.clone()).to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode chat event");
                return 0;
            }
        };

        let recipients = self.registry.all();
        let mut delivered = 0;
        for connection in &recipients {
            if connection.send(frame.clone()) {
                delivered += 1;
            } else {
                tracing::debug!(id = %connection.id, "Recipient closed during relay, evicting");
                self.registry.unregister(connection);
            }
        }

        tracing::info!(
            sender = ?sender,
            name = %message.name,
            recipients = recipients.len(),
            delivered,
            "Message relayed"
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::registry::Connection;
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn open(registry: &ConnectionRegistry) -> (ConnectionId, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        registry.register(Connection::new(id, tx));
        (id, rx)
    }

    fn chat(name: &str, message: &str) -> ChatMessage {
        ChatMessage {
            name: name.into(),
            message: message.into(),
        }
    }

    fn received(rx: &mut mpsc::UnboundedReceiver<Message>) -> ChatEvent {
        match rx.try_recv() {
            Ok(Message::Text(text)) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn delivers_to_every_connection_including_sender() {
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = Relay::new(registry.clone());
        let (sender, mut rx_sender) = open(&registry);
        let mut others: Vec<_> = (0..4).map(|_| open(&registry).1).collect();

        let delivered = relay.relay(&chat("A", "hi"), Some(sender));
        assert_eq!(delivered, 5);

        let expected = ChatEvent::Message(chat("A", "hi"));
        assert_eq!(received(&mut rx_sender), expected);
        for rx in &mut others {
            assert_eq!(received(rx), expected);
        }
    }

    #[test]
    fn closed_recipient_is_skipped_and_evicted() {
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = Relay::new(registry.clone());
        let (sender, mut rx_sender) = open(&registry);
        let (_gone, rx_gone) = open(&registry);
        let (_alive, mut rx_alive) = open(&registry);
        drop(rx_gone);

        let delivered = relay.relay(&chat("A", "hi"), Some(sender));

        assert_eq!(delivered, 2);
        assert_eq!(registry.len(), 2);
        assert!(rx_sender.try_recv().is_ok());
        assert!(rx_alive.try_recv().is_ok());
    }

    #[test]
    fn per_connection_order_is_preserved() {
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = Relay::new(registry.clone());
        let (a, _rx_a) = open(&registry);
        let (_b, mut rx_b) = open(&registry);

        for body in ["one", "two", "three"] {
            relay.relay(&chat("A", body), Some(a));
        }

        for body in ["one", "two", "three"] {
            assert_eq!(received(&mut rx_b), ChatEvent::Message(chat("A", body)));
        }
    }

    #[test]
    fn empty_registry_delivers_nothing() {
        let relay = Relay::new(Arc::new(ConnectionRegistry::new()));
        assert_eq!(relay.relay(&chat("A", "hi"), None), 0);
    }
}
