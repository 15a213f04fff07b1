//! DebateArena Core Library
//!
//! Turn orchestration for persona debates: persona resolution, prompt
//! construction, response cleanup, turn scheduling and token accounting.

pub mod config;
pub mod error;
pub mod generation;
pub mod ledger;
pub mod orchestrator;
pub mod persona;
pub mod prompt;
pub mod sanitizer;
pub mod scheduler;

pub use config::Config;
pub use error::DebateError;
pub use generation::{GenerationRequest, GenerationService, OpenAiGenerator};
pub use ledger::{
    AccountStore, JsonFileAccountStore, MemoryAccountStore, QuotaCheck, Reservation, TokenAccount,
    TokenLedger, token_cost,
};
pub use orchestrator::{
    DebateCallback, DebateConfig, DebateEvent, DebateOrchestrator, DebateOutcome, GeneratedTurn,
    NextTurn, StartedDebate,
};
pub use persona::{PersonaDescriptor, PersonaReference};
pub use prompt::PromptBuilder;
pub use sanitizer::sanitize_response;
pub use scheduler::{ContextMessage, Speaker, Turn, TurnScheduler};
