//! Wire transport seam.
//!
//! Delivery, encoding, and peer liveness detection belong to an
//! external transport layer; the agent only needs fire-and-forget
//! sends and a way to ask for link-loss notification. A mock
//! implementation records traffic for tests and development.

use std::sync::Mutex;

use tracing::debug;

use crate::messages::{Address, WireMessage};

/// Outbound side of the wire.
///
/// Sends are best-effort and must return immediately: a message to a
/// dead peer is silently dropped. `link` asks the transport to watch
/// a peer and report its loss back to the agent as an event.
pub trait Transport: Send + Sync {
    /// The agent's own endpoint, stamped into messages that expect a
    /// reply.
    fn self_address(&self) -> Address;

    /// Send a message to a peer.
    fn send(&self, to: &Address, message: WireMessage);

    /// Watch a peer for liveness.
    fn link(&self, peer: &Address);
}

/// Mock transport for testing and development: records every send.
pub struct MockTransport {
    self_address: Address,
    sent: Mutex<Vec<(Address, WireMessage)>>,
    linked: Mutex<Vec<Address>>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new(self_address: impl Into<String>) -> Self {
        Self {
            self_address: Address::new(self_address),
            sent: Mutex::new(Vec::new()),
            linked: Mutex::new(Vec::new()),
        }
    }

    /// All messages sent so far, in order.
    pub fn sent(&self) -> Vec<(Address, WireMessage)> {
        self.sent.lock().expect("transport log poisoned").clone()
    }

    /// Messages sent to one peer, in order.
    pub fn sent_to(&self, to: &Address) -> Vec<WireMessage> {
        self.sent
            .lock()
            .expect("transport log poisoned")
            .iter()
            .filter(|(addr, _)| addr == to)
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    /// Peers watched for liveness.
    pub fn linked(&self) -> Vec<Address> {
        self.linked.lock().expect("transport log poisoned").clone()
    }

    /// Forget recorded traffic.
    pub fn clear(&self) {
        self.sent.lock().expect("transport log poisoned").clear();
    }
}

impl Transport for MockTransport {
    fn self_address(&self) -> Address {
        self.self_address.clone()
    }

    fn send(&self, to: &Address, message: WireMessage) {
        debug!(to = %to, "[MOCK] Sending message");
        self.sent
            .lock()
            .expect("transport log poisoned")
            .push((to.clone(), message));
    }

    fn link(&self, peer: &Address) {
        debug!(peer = %peer, "[MOCK] Linking peer");
        self.linked
            .lock()
            .expect("transport log poisoned")
            .push(peer.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_transport_records_sends() {
        let transport = MockTransport::new("slave@node1:5051");
        let master = Address::new("master@m1:5050");

        transport.send(&master, WireMessage::Pong);
        transport.send(&Address::new("executor@node1:9000"), WireMessage::ShutdownExecutor);

        assert_eq!(transport.sent().len(), 2);
        assert_eq!(transport.sent_to(&master), vec![WireMessage::Pong]);
    }

    #[test]
    fn test_mock_transport_links() {
        let transport = MockTransport::new("slave@node1:5051");
        let master = Address::new("master@m1:5050");

        transport.link(&master);
        assert_eq!(transport.linked(), vec![master]);
    }

    #[test]
    fn test_mock_transport_clear() {
        let transport = MockTransport::new("slave@node1:5051");
        transport.send(&Address::new("x"), WireMessage::Pong);
        transport.clear();
        assert!(transport.sent().is_empty());
    }
}
