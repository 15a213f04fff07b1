//! Turn prompt construction.
//!
//! One deterministic template carries both personas, the topic and the
//! behavioral rules, so every generation call is self-contained.

use crate::persona::PersonaDescriptor;

/// Default per-turn instruction template.
///
/// Placeholders: `{name}`, `{description}`, `{opponent_name}`,
/// `{opponent_description}`, `{topic}`.
pub const DEFAULT_TURN_TEMPLATE: &str = r#"You are {name} taking part in a live debate.
{description}

YOUR OPPONENT: {opponent_name}
{opponent_description}

DEBATE TOPIC: {topic}

RULES FOR YOUR RESPONSE:
- Speak in first person as {name}: "I think", "I believe", "In my opinion"
- Keep your response to 1-2 sentences maximum
- Directly respond to or build upon what was previously said
- Be persuasive but respectful
- Do NOT add labels, names, or commentary about the debate itself
- Do NOT announce that you are continuing, summarizing, or responding
- Do NOT use asterisks, dashes, underscores, brackets, headings, or any markdown formatting
- Output only your plain spoken words

Give your response now:"#;

/// Builds the instruction text sent to the generation service for one turn.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_TURN_TEMPLATE)
    }
}

impl PromptBuilder {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Render the prompt for whichever side is speaking.
    ///
    /// `profile1_speaks` selects the acting persona; the other one becomes
    /// the opponent.
    pub fn build(
        &self,
        profile1: &PersonaDescriptor,
        profile2: &PersonaDescriptor,
        topic: &str,
        profile1_speaks: bool,
    ) -> String {
        let (speaker, opponent) = if profile1_speaks {
            (profile1, profile2)
        } else {
            (profile2, profile1)
        };

        // Descriptions go in before names so a name containing a placeholder
        // is never expanded twice.
        self.template
            .replace("{opponent_description}", &opponent.description)
            .replace("{description}", &speaker.description)
            .replace("{topic}", topic.trim())
            .replace("{opponent_name}", &opponent.name)
            .replace("{name}", &speaker.name)
    }
}
