//! Conversational goal collection
//!
//! The state machine drives a slot-filling conversation; the extractor is
//! its NLP collaborator.

mod extractor;
mod machine;

pub use extractor::{ExtractError, HttpNlpExtractor, NlpExtractor, Role, Turn};
pub use machine::{DialogueError, DialogueEvent, DialogueState, DialogueStateMachine, TurnOutcome};
