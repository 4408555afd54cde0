//! Hook registry: subscriptions and event dispatch.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::events::RagEvent;

/// Hook handler function type.
///
/// Handlers run inline on the emitting task, so they must be cheap.
pub type HookHandler = Arc<dyn Fn(&RagEvent) + Send + Sync>;

/// Manages hook subscriptions and dispatches events.
pub struct HookRegistry {
    /// Map from event type name to handlers.
    handlers: RwLock<HashMap<String, Vec<HookHandler>>>,
}

impl HookRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with a wildcard handler forwarding every event to `tracing`.
    pub fn with_tracing() -> Self {
        let registry = Self::new();
        registry.on("*", Arc::new(log_event));
        registry
    }

    /// Register a handler for a specific event type ("*" matches all).
    pub fn on(&self, event_type: &str, handler: HookHandler) {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers
            .entry(event_type.to_string())
            .or_default()
            .push(handler);
    }

    /// Register a handler for multiple event types.
    pub fn on_many(&self, event_types: &[&str], handler: HookHandler) {
        for event_type in event_types {
            self.on(event_type, handler.clone());
        }
    }

    /// Dispatch an event to all registered handlers.
    ///
    /// Handlers are called after the lock is released, so they may register
    /// further handlers.
    pub fn emit(&self, event: RagEvent) {
        let targets: Vec<HookHandler> = {
            let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            // Specific handlers first, then "*" (wildcard) handlers
            [event.name(), "*"]
                .iter()
                .filter_map(|key| handlers.get(*key))
                .flatten()
                .cloned()
                .collect()
        };

        for handler in targets {
            handler(&event);
        }
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn log_event(event: &RagEvent) {
    match event {
        RagEvent::Ingested {
            source_id,
            segments,
        } => tracing::info!(source = %source_id, segments, "Document indexed"),
        RagEvent::QueryTransformed { original, queries } => {
            tracing::debug!(original = %original, ?queries, "Query transformed")
        }
        RagEvent::TransformFailed { error } => {
            tracing::warn!(%error, "Query transformation failed, using original query")
        }
        RagEvent::RouteSelected {
            query,
            retrievers,
            fallback,
        } => {
            if *fallback {
                tracing::warn!(query = %query, ?retrievers, "Ambiguous routing, using all sources")
            } else {
                tracing::debug!(query = %query, ?retrievers, "Route selected")
            }
        }
        RagEvent::RetrieverFailed { retriever, error } => {
            tracing::warn!(retriever = %retriever, %error, "Retriever failed, skipping source")
        }
        RagEvent::ContextAssembled { segments, status } => {
            tracing::debug!(segments, ?status, "Context assembled")
        }
        RagEvent::GenerationFailed { error } => tracing::warn!(%error, "Generation failed"),
        RagEvent::TurnRecorded { memory_len } => tracing::trace!(memory_len, "Turn recorded"),
    }
}
