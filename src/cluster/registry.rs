//! Message Handler Registry
//!
//! Maps message kinds (e.g. "store_atom") to async closures so components
//! layered on top of the cluster, such as the storage node, can serve their
//! own request types without the cluster knowing about them.

use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::protocol::{ClusterMessage, ClusterResponse};

pub type MessageHandlerFn = Arc<
    dyn Fn(ClusterMessage) -> Pin<Box<dyn Future<Output = ClusterResponse> + Send>> + Send + Sync,
>;

#[derive(Default)]
pub struct MessageHandlerRegistry {
    handlers: DashMap<String, MessageHandlerFn>,
}

impl MessageHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `kind`, replacing any previous one.
    pub fn register<F, Fut>(&self, kind: &str, handler: F)
    where
        F: Fn(ClusterMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ClusterResponse> + Send + 'static,
    {
        let handler_fn: MessageHandlerFn = Arc::new(move |message: ClusterMessage| {
            Box::pin(handler(message)) as Pin<Box<dyn Future<Output = ClusterResponse> + Send>>
        });
        if self.handlers.insert(kind.to_string(), handler_fn).is_some() {
            tracing::warn!("Replaced message handler: {}", kind);
        } else {
            tracing::info!("Registered message handler: {}", kind);
        }
    }

    /// Runs the handler registered for the message's kind. `None` if there is none.
    pub async fn dispatch(&self, message: ClusterMessage) -> Option<ClusterResponse> {
        // Clone the closure out so no shard lock is held across the await.
        let handler = self
            .handlers
            .get(message.kind())
            .map(|entry| entry.value().clone())?;
        tracing::debug!("Dispatching {} to registered handler", message.kind());
        Some(handler(message).await)
    }

    pub fn has_handler(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    pub fn list_handlers(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.handlers.iter().map(|entry| entry.key().clone()).collect();
        kinds.sort();
        kinds
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}
