//! Event dispatch: dedup, context, routing, persistence.

use crate::inference::InferenceClient;
use crate::message::{split_stages, InboundEvent};
use async_trait::async_trait;
use relay_common::Result;
use relay_extensions::{ExtensionInfo, ExtensionRegistry, IntentClassifier};
use relay_store::types::MessageRole;
use relay_store::{ContextStore, DedupStore};
use std::sync::Arc;

/// How many trailing messages accompany a chat prompt. The token budget
/// bounds total stored history; this bounds a single request payload.
const HISTORY_TAIL: usize = 50;

/// Ties the stores, the registry and the inference client into one
/// per-event flow. Nothing in this path is fatal: store failures
/// degrade, handler failures fall through to inference, inference
/// failures yield no reply.
pub struct SessionService {
    dedup: DedupStore,
    context: ContextStore,
    registry: Arc<ExtensionRegistry>,
    inference: Arc<dyn InferenceClient>,
    max_history_tokens: u64,
}

/// Lets the inference client stand in where the registry expects a
/// classifier.
struct AsClassifier<'a>(&'a dyn InferenceClient);

#[async_trait]
impl IntentClassifier for AsClassifier<'_> {
    async fn classify(
        &self,
        message: &str,
        extensions: &[ExtensionInfo],
    ) -> Result<Option<String>> {
        self.0.classify(message, extensions).await
    }
}

impl SessionService {
    pub fn new(
        dedup: DedupStore,
        context: ContextStore,
        registry: Arc<ExtensionRegistry>,
        inference: Arc<dyn InferenceClient>,
        max_history_tokens: u64,
    ) -> Self {
        Self {
            dedup,
            context,
            registry,
            inference,
            max_history_tokens,
        }
    }

    /// Handle one inbound event. Returns the staged reply texts in
    /// delivery order, or `None` when there is nothing to send (dup,
    /// inference failure, empty reply).
    pub async fn handle_event(&self, event: InboundEvent) -> Option<Vec<String>> {
        if self.dedup.is_processed(&event.event_id).await {
            tracing::debug!(event_id = %event.event_id, "Duplicate event skipped");
            return None;
        }
        // Mark before the (potentially long) inference call so a
        // redelivery during it is still suppressed.
        if let Err(e) = self.dedup.mark_processed(&event.event_id).await {
            tracing::warn!(event_id = %event.event_id, error = %e, "Could not mark event processed");
        }

        let conversation_id = self.resolve_conversation(&event.chat_handle).await;

        if let Err(e) = self
            .context
            .append_message(&conversation_id, MessageRole::User, &event.text)
            .await
        {
            tracing::warn!(error = %e, "Could not persist user message");
        }

        let classifier = AsClassifier(self.inference.as_ref());
        if let Some(reply) = self
            .registry
            .route(&event.text, &conversation_id, &classifier)
            .await
        {
            tracing::info!(chat = %event.chat_handle, "Extension handled the message");
            self.finish_turn(&event.chat_handle, &conversation_id, &reply)
                .await;
            return stages_or_none(&reply);
        }

        let history = match self
            .context
            .list_messages(&conversation_id, Some(HISTORY_TAIL))
            .await
        {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(error = %e, "Could not load history, chatting without it");
                Vec::new()
            }
        };

        let reply = match self.inference.chat(&event.text, &history).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(chat = %event.chat_handle, error = %e, "Inference failed, no reply");
                return None;
            }
        };

        // The service may assign its own conversation id on the first
        // turn; adopt it so later turns share that context.
        let final_id = reply
            .conversation_id
            .as_deref()
            .unwrap_or(&conversation_id);
        self.finish_turn(&event.chat_handle, final_id, &reply.text)
            .await;
        stages_or_none(&reply.text)
    }

    /// Map the chat to its conversation, defaulting to the chat handle
    /// itself. Lookup failure degrades the same way.
    async fn resolve_conversation(&self, chat_handle: &str) -> String {
        match self.context.get_context(chat_handle).await {
            Ok(Some(ctx)) => ctx.conversation_id,
            Ok(None) => chat_handle.to_string(),
            Err(e) => {
                tracing::warn!(chat = %chat_handle, error = %e, "Context lookup failed");
                chat_handle.to_string()
            }
        }
    }

    /// Persist the assistant turn, refresh the mapping and enforce the
    /// history budget. All best-effort.
    async fn finish_turn(&self, chat_handle: &str, conversation_id: &str, reply: &str) {
        if let Err(e) = self
            .context
            .append_message(conversation_id, MessageRole::Assistant, reply)
            .await
        {
            tracing::warn!(error = %e, "Could not persist assistant reply");
        }
        if let Err(e) = self.context.save_context(chat_handle, conversation_id).await {
            tracing::warn!(error = %e, "Could not refresh context mapping");
        }
        match self
            .context
            .truncate_to_budget(conversation_id, self.max_history_tokens)
            .await
        {
            Ok(0) => {}
            Ok(deleted) => {
                tracing::info!(conversation = %conversation_id, deleted, "History truncated to budget");
            }
            Err(e) => tracing::warn!(error = %e, "History truncation failed"),
        }
    }
}

fn stages_or_none(reply: &str) -> Option<Vec<String>> {
    let stages = split_stages(reply);
    if stages.is_empty() {
        None
    } else {
        Some(stages)
    }
}
