//! Session layer core: inference boundary, event dispatch, reclaimer.
//!
//! `SessionService` ties the stores and the extension registry together
//! into one `handle_event` flow. The actual LLM, transport and delivery
//! live behind the [`InferenceClient`] trait and the embedder.

pub mod inference;
pub mod message;
pub mod reclaimer;
pub mod session;

pub use inference::{ChatReply, HttpInferenceClient, InferenceClient};
pub use message::{split_stages, InboundEvent, STAGE_MARKER};
pub use reclaimer::{Reclaimer, ReclaimerSettings};
pub use session::SessionService;
