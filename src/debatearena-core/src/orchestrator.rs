//! Debate orchestration logic.
//!
//! Ties persona resolution, scheduling, prompting, generation, sanitizing
//! and token accounting together. The orchestrator keeps no debate state
//! between calls: the caller passes the debate setup and transcript every
//! time and persists the turns it gets back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::DebateError;
use crate::generation::{GenerationRequest, GenerationService};
use crate::ledger::{
    AccountStore, QuotaCheck, Reservation, TokenAccount, TokenLedger, token_cost,
};
use crate::persona::{PersonaDescriptor, PersonaReference};
use crate::prompt::PromptBuilder;
use crate::sanitizer::sanitize_optional;
use crate::scheduler::{ContextMessage, Speaker, Turn, TurnScheduler};

/// The two debaters and the topic. Repeated on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateConfig {
    pub profile1: PersonaReference,
    pub profile2: PersonaReference,
    pub topic: String,
}

impl DebateConfig {
    pub fn new(
        profile1: PersonaReference,
        profile2: PersonaReference,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            profile1,
            profile2,
            topic: topic.into(),
        }
    }
}

/// A freshly generated turn with its token cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedTurn {
    pub speaker: Speaker,
    pub content: String,
    pub tokens: u64,
}

impl GeneratedTurn {
    /// The transcript entry for this turn.
    pub fn to_turn(&self) -> Turn {
        Turn::new(self.speaker, self.content.clone())
    }
}

/// Result of starting a debate: the opening pair of turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedDebate {
    pub turn0: GeneratedTurn,
    pub turn1: GeneratedTurn,
}

impl StartedDebate {
    pub fn total_tokens(&self) -> u64 {
        self.turn0.tokens + self.turn1.tokens
    }
}

/// Result of continuing a debate: exactly one new turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextTurn {
    pub turn: GeneratedTurn,
}

/// Either the requested work, or a refusal because the quota is spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebateOutcome<T> {
    Completed(T),
    QuotaExhausted(TokenAccount),
}

impl<T> DebateOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            DebateOutcome::Completed(value) => Some(value),
            DebateOutcome::QuotaExhausted(_) => None,
        }
    }
}

/// Events emitted while turns are generated.
#[derive(Debug, Clone)]
pub enum DebateEvent {
    /// A debater is about to speak.
    SpeakerStart { speaker: Speaker, name: String },
    /// A debater has finished speaking.
    SpeakerMessage {
        speaker: Speaker,
        name: String,
        content: String,
        tokens: u64,
    },
}

/// Callback for debate events.
pub type DebateCallback = Box<dyn Fn(DebateEvent) + Send + Sync>;

/// Source of the current time, used for the daily quota reset.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Orchestrates turns between two personas.
pub struct DebateOrchestrator {
    generator: Arc<dyn GenerationService>,
    ledger: TokenLedger,
    prompts: PromptBuilder,
    empty_response_retries: u32,
    placeholder: Option<String>,
    clock: Clock,
    callback: Option<DebateCallback>,
}

impl DebateOrchestrator {
    pub fn new(
        config: &Config,
        generator: Arc<dyn GenerationService>,
        accounts: Arc<dyn AccountStore>,
    ) -> Self {
        Self {
            generator,
            ledger: TokenLedger::new(accounts, config.generation.max_tokens_per_turn),
            prompts: config.prompt_builder(),
            empty_response_retries: config.generation.empty_response_retries,
            placeholder: config.prompts.placeholder.clone(),
            clock: Arc::new(Utc::now),
            callback: None,
        }
    }

    /// Set a callback for debate events.
    pub fn with_callback(mut self, callback: DebateCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Generate the opening two turns.
    ///
    /// Quota for both turns is held before the first call and settled to
    /// the actual cost only after both were generated; a failure on either
    /// call aborts the whole start and gives the hold back.
    pub async fn start(
        &self,
        account_id: &str,
        debate: &DebateConfig,
    ) -> Result<DebateOutcome<StartedDebate>, DebateError> {
        let reservation = match self.ledger.reserve(account_id, 2, (self.clock)()).await? {
            QuotaCheck::Reserved(reservation, _) => reservation,
            QuotaCheck::Exhausted(account) => return Ok(DebateOutcome::QuotaExhausted(account)),
        };

        let profile1 = debate.profile1.resolve();
        let profile2 = debate.profile2.resolve();
        info!(
            account_id,
            profile1 = %profile1.name,
            profile2 = %profile2.name,
            topic = %debate.topic,
            "Starting debate"
        );

        let opening = async {
            let budget = self.ledger.turn_budget(&reservation, 0);
            let turn0 = self
                .generate_turn(&profile1, &profile2, &debate.topic, &[], budget)
                .await?;

            let budget = self.ledger.turn_budget(&reservation, turn0.tokens);
            let turn1 = self
                .generate_turn(
                    &profile1,
                    &profile2,
                    &debate.topic,
                    &[turn0.to_turn()],
                    budget,
                )
                .await?;
            Ok::<_, DebateError>(StartedDebate { turn0, turn1 })
        }
        .await;

        match opening {
            Ok(started) => {
                self.ledger
                    .settle(&reservation, started.total_tokens(), (self.clock)())
                    .await?;
                Ok(DebateOutcome::Completed(started))
            }
            Err(e) => {
                self.release(&reservation).await;
                Err(e)
            }
        }
    }

    /// Generate the next single turn for an existing transcript.
    ///
    /// The transcript is not modified; the caller appends the returned turn.
    /// Calls for the same debate must not overlap, since the next speaker is
    /// derived from the transcript length.
    pub async fn continue_debate(
        &self,
        account_id: &str,
        debate: &DebateConfig,
        transcript: &[Turn],
    ) -> Result<DebateOutcome<NextTurn>, DebateError> {
        let reservation = match self.ledger.reserve(account_id, 1, (self.clock)()).await? {
            QuotaCheck::Reserved(reservation, _) => reservation,
            QuotaCheck::Exhausted(account) => return Ok(DebateOutcome::QuotaExhausted(account)),
        };

        let next = TurnScheduler::next_speaker_for(transcript);
        if transcript.last().is_some_and(|last| last.speaker == next) {
            warn!(
                turns = transcript.len(),
                speaker = %next,
                "Transcript speakers do not alternate; scheduling by length"
            );
        }

        let profile1 = debate.profile1.resolve();
        let profile2 = debate.profile2.resolve();
        let generated = self
            .generate_turn(
                &profile1,
                &profile2,
                &debate.topic,
                transcript,
                self.ledger.turn_budget(&reservation, 0),
            )
            .await;

        match generated {
            Ok(turn) => {
                self.ledger
                    .settle(&reservation, turn.tokens, (self.clock)())
                    .await?;
                Ok(DebateOutcome::Completed(NextTurn { turn }))
            }
            Err(e) => {
                self.release(&reservation).await;
                Err(e)
            }
        }
    }

    /// Give held quota back after a failed generation.
    async fn release(&self, reservation: &Reservation) {
        if let Err(e) = self.ledger.release(reservation, (self.clock)()).await {
            warn!(
                account_id = %reservation.account_id,
                held = reservation.amount,
                error = %e,
                "Failed to release reserved tokens"
            );
        }
    }

    /// Prior statements sent as context. Placeholder and empty turns carry
    /// nothing the debaters said.
    fn context(&self, transcript: &[Turn]) -> Vec<ContextMessage> {
        TurnScheduler::context(transcript)
            .into_iter()
            .filter(|message| {
                let content = message.content();
                !content.is_empty() && self.placeholder.as_deref() != Some(content)
            })
            .collect()
    }

    /// Generate, sanitize and cost the turn following `transcript`.
    async fn generate_turn(
        &self,
        profile1: &PersonaDescriptor,
        profile2: &PersonaDescriptor,
        topic: &str,
        transcript: &[Turn],
        max_tokens: u32,
    ) -> Result<GeneratedTurn, DebateError> {
        let speaker = TurnScheduler::next_speaker_for(transcript);
        let name = if speaker.is_profile1() {
            &profile1.name
        } else {
            &profile2.name
        };

        self.emit_event(DebateEvent::SpeakerStart {
            speaker,
            name: name.clone(),
        });

        let request = GenerationRequest {
            prompt: self
                .prompts
                .build(profile1, profile2, topic, speaker.is_profile1()),
            context: self.context(transcript),
            max_tokens,
        };

        let attempts = self.empty_response_retries + 1;
        let mut utterance = String::new();
        for attempt in 0..attempts {
            let raw = self.generator.generate(&request).await?;
            utterance = sanitize_optional(raw.as_deref());
            if !utterance.is_empty() {
                break;
            }
            if attempt + 1 < attempts {
                warn!(
                    speaker = %speaker,
                    attempt = attempt + 1,
                    "Empty response from {}, retrying", name
                );
            }
        }

        let tokens = token_cost(&utterance);
        let content = if utterance.is_empty() {
            warn!(speaker = %speaker, "Accepting empty turn from {}", name);
            self.placeholder.clone().unwrap_or_default()
        } else {
            utterance
        };

        info!(speaker = %speaker, tokens, "Generated turn");
        self.emit_event(DebateEvent::SpeakerMessage {
            speaker,
            name: name.clone(),
            content: content.clone(),
            tokens,
        });

        Ok(GeneratedTurn {
            speaker,
            content,
            tokens,
        })
    }

    /// Emit an event if a callback is registered.
    fn emit_event(&self, event: DebateEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}
