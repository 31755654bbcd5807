//! Retrieval-augmented answering over PubMed literature.

pub mod engine;
pub mod prompt;
pub mod ranker;

pub use engine::{AnswerResult, ChatEvent, RagEngine, Reference};
