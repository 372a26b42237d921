//! Inbound event shape and reply staging.

use serde::Deserialize;

/// Marker the inference service embeds to split one reply into several
/// outbound messages delivered in order.
pub const STAGE_MARKER: &str = "---STAGE---";

/// A normalized inbound message, as handed over by the transport layer.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEvent {
    /// Platform-unique event id, used for dedup.
    pub event_id: String,
    /// Stable identifier of the chat the message arrived in.
    pub chat_handle: String,
    /// The user's message text.
    pub text: String,
}

/// Split a reply on [`STAGE_MARKER`] into ordered delivery units.
/// Segments are trimmed; blank segments are dropped.
pub fn split_stages(reply: &str) -> Vec<String> {
    reply
        .split(STAGE_MARKER)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(String::from)
        .collect()
}
