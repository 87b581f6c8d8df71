//! Transport abstraction for the sync RPC surface.
//!
//! A transport delivers one encoded request frame to a peer and returns the
//! peer's encoded response. Framing and schema live in [`crate::messages`];
//! implementations only move bytes.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::messages::NodeId;

/// Request/response transport between hubs.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send an encoded request to `peer` and wait for its encoded response.
    async fn call(&self, peer: &NodeId, request: Bytes) -> Result<Bytes>;

    /// Get the local node's identity.
    fn local_node_id(&self) -> NodeId;
}

/// Serves encoded requests on the receiving side of a transport.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Answer one encoded request. Failures are encoded into the response.
    async fn handle(&self, request: Bytes) -> Bytes;
}

/// A simple in-memory transport for testing.
///
/// Every node registers a handler on a shared network; calls are routed to the
/// handler directly. Per-node delays and disconnects simulate slow or absent
/// peers.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::RwLock;

    use crate::error::SyncError;

    struct Endpoint {
        handler: Arc<dyn RequestHandler>,
        delay: Option<Duration>,
    }

    /// Shared state for the memory transport network.
    pub struct MemoryNetwork {
        endpoints: RwLock<HashMap<NodeId, Endpoint>>,
    }

    impl MemoryNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Serve `handler` as `node_id` and return a transport for that node.
        pub async fn register(
            self: &Arc<Self>,
            node_id: NodeId,
            handler: Arc<dyn RequestHandler>,
        ) -> MemoryTransport {
            self.endpoints.write().await.insert(
                node_id,
                Endpoint {
                    handler,
                    delay: None,
                },
            );

            MemoryTransport {
                node_id,
                network: Arc::clone(self),
            }
        }

        /// Delay every response from `node_id`.
        pub async fn set_delay(&self, node_id: &NodeId, delay: Option<Duration>) {
            if let Some(endpoint) = self.endpoints.write().await.get_mut(node_id) {
                endpoint.delay = delay;
            }
        }

        /// Remove `node_id` from the network.
        pub async fn disconnect(&self, node_id: &NodeId) {
            self.endpoints.write().await.remove(node_id);
        }

        /// Whether `node_id` is reachable.
        pub async fn is_connected(&self, node_id: &NodeId) -> bool {
            self.endpoints.read().await.contains_key(node_id)
        }
    }

    impl Default for MemoryNetwork {
        fn default() -> Self {
            Self {
                endpoints: RwLock::new(HashMap::new()),
            }
        }
    }

    /// In-memory transport implementation.
    #[derive(Clone)]
    pub struct MemoryTransport {
        node_id: NodeId,
        network: Arc<MemoryNetwork>,
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn call(&self, peer: &NodeId, request: Bytes) -> Result<Bytes> {
            // Release the network lock before serving so handlers can call out.
            let (handler, delay) = {
                let endpoints = self.network.endpoints.read().await;
                let endpoint = endpoints
                    .get(peer)
                    .ok_or_else(|| SyncError::Transport("peer not found".into()))?;
                (Arc::clone(&endpoint.handler), endpoint.delay)
            };

            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(handler.handle(request).await)
        }

        fn local_node_id(&self) -> NodeId {
            self.node_id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryNetwork;
    use super::*;
    use crate::error::SyncError;
    use std::sync::Arc;
    use std::time::Duration;

    struct Echo;

    #[async_trait]
    impl RequestHandler for Echo {
        async fn handle(&self, request: Bytes) -> Bytes {
            let mut out = request.to_vec();
            out.reverse();
            Bytes::from(out)
        }
    }

    #[tokio::test]
    async fn test_memory_transport_call() {
        let network = MemoryNetwork::new();

        let node_a = NodeId::from_bytes([0xAA; 32]);
        let node_b = NodeId::from_bytes([0xBB; 32]);

        let transport_a = network.register(node_a, Arc::new(Echo)).await;
        network.register(node_b, Arc::new(Echo)).await;

        let response = transport_a
            .call(&node_b, Bytes::from_static(&[1, 2, 3]))
            .await
            .unwrap();
        assert_eq!(&response[..], &[3, 2, 1]);
        assert_eq!(transport_a.local_node_id(), node_a);
    }

    #[tokio::test]
    async fn test_unknown_peer_is_transport_error() {
        let network = MemoryNetwork::new();
        let node_a = NodeId::from_bytes([0xAA; 32]);
        let transport_a = network.register(node_a, Arc::new(Echo)).await;

        let err = transport_a
            .call(&NodeId::from_bytes([0xCC; 32]), Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
    }

    #[tokio::test]
    async fn test_disconnect_and_delay() {
        let network = MemoryNetwork::new();
        let node_a = NodeId::from_bytes([0xAA; 32]);
        let node_b = NodeId::from_bytes([0xBB; 32]);
        let transport_a = network.register(node_a, Arc::new(Echo)).await;
        network.register(node_b, Arc::new(Echo)).await;

        network
            .set_delay(&node_b, Some(Duration::from_millis(200)))
            .await;
        let slow = tokio::time::timeout(
            Duration::from_millis(20),
            transport_a.call(&node_b, Bytes::new()),
        )
        .await;
        assert!(slow.is_err());

        network.disconnect(&node_b).await;
        assert!(!network.is_connected(&node_b).await);
        assert!(transport_a.call(&node_b, Bytes::new()).await.is_err());
    }
}
