// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrieval-augmented answering: the orchestrator and its generation gateway.

pub mod generation;
pub mod orchestrator;

pub use generation::{ChatMessage, GenerationGateway, OpenAiCompatibleGateway};
pub use orchestrator::{
    build_messages, Answer, AnswerOutcome, CommitReport, CorpusState, CorpusStatus, IngestMode,
    RetrievalOrchestrator, DEFAULT_TOP_K, GATEWAY_UNAVAILABLE_ANSWER, NO_CONTEXT_ANSWER,
    SYSTEM_PROMPT,
};
