//! Turn scheduling: who speaks next and what prior context is sent.

use serde::{Deserialize, Serialize};

/// Side of the debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Profile1,
    Profile2,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::Profile1 => "profile1",
            Speaker::Profile2 => "profile2",
        }
    }

    pub fn is_profile1(&self) -> bool {
        matches!(self, Speaker::Profile1)
    }

    pub fn other(&self) -> Speaker {
        match self {
            Speaker::Profile1 => Speaker::Profile2,
            Speaker::Profile2 => Speaker::Profile1,
        }
    }
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One utterance in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub content: String,
}

impl Turn {
    pub fn new(speaker: Speaker, content: impl Into<String>) -> Self {
        Self {
            speaker,
            content: content.into(),
        }
    }
}

/// A prior statement handed to the generation service.
///
/// History is untagged. The prompt names the current speaker and earlier
/// turns are presented as undifferentiated prior statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextMessage {
    PriorStatement(String),
}

impl ContextMessage {
    pub fn content(&self) -> &str {
        match self {
            ContextMessage::PriorStatement(content) => content,
        }
    }
}

/// Stateless scheduler over a caller-owned transcript.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnScheduler;

impl TurnScheduler {
    /// Profile 1 speaks on even counts, so it always opens.
    pub fn next_speaker(prior_turns: usize) -> Speaker {
        if prior_turns % 2 == 0 {
            Speaker::Profile1
        } else {
            Speaker::Profile2
        }
    }

    /// Next speaker for the given transcript.
    pub fn next_speaker_for(transcript: &[Turn]) -> Speaker {
        Self::next_speaker(transcript.len())
    }

    /// Every prior turn, in order, as generic prior statements.
    pub fn context(transcript: &[Turn]) -> Vec<ContextMessage> {
        transcript
            .iter()
            .map(|turn| ContextMessage::PriorStatement(turn.content.clone()))
            .collect()
    }
}
