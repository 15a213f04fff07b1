//! Persona references, the built-in catalog, and descriptor resolution.
//!
//! A debater is referenced either by a catalog key or by inline custom
//! attributes. Resolution always yields a usable [`PersonaDescriptor`].

use serde::{Deserialize, Serialize};

/// Name used when a reference carries no usable name at all.
pub const UNNAMED_DEBATER: &str = "Unnamed debater";

/// A built-in persona.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub key: &'static str,
    pub name: &'static str,
    pub avatar: &'static str,
    pub description: &'static str,
}

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        key: "virat_kohli",
        name: "Virat Kohli",
        avatar: "🏏",
        description: "A legendary cricket player with precision and competitive spirit. Speaks with confidence about sport, strategy, and excellence.",
    },
    CatalogEntry {
        key: "cristiano_ronaldo",
        name: "Cristiano Ronaldo",
        avatar: "⚽",
        description: "A renowned footballer known for dedication and winning mentality. Speaks about hard work, achievement, and performance.",
    },
    CatalogEntry {
        key: "narendra_modi",
        name: "Narendra Modi",
        avatar: "🇮🇳",
        description: "An experienced political leader with strong conviction. Speaks about development, nationalism, and pragmatic governance.",
    },
    CatalogEntry {
        key: "donald_trump",
        name: "Donald Trump",
        avatar: "🦅",
        description: "A prominent businessman and personality with bold opinions. Speaks directly, confidently, and often provocatively.",
    },
    CatalogEntry {
        key: "elon_musk",
        name: "Elon Musk",
        avatar: "🚀",
        description: "A visionary entrepreneur focused on innovation. Speaks about technology, future, and ambitious goals.",
    },
    CatalogEntry {
        key: "sam_altman",
        name: "Sam Altman",
        avatar: "🤖",
        description: "An AI researcher and entrepreneur. Speaks thoughtfully about technology, ethics, and progress.",
    },
];

/// All built-in personas, in display order.
pub fn catalog() -> &'static [CatalogEntry] {
    CATALOG
}

/// Look up a built-in persona by key (case-insensitive).
pub fn lookup(key: &str) -> Option<&'static CatalogEntry> {
    let key = key.trim();
    CATALOG.iter().find(|entry| entry.key.eq_ignore_ascii_case(key))
}

/// How the caller refers to a debater.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PersonaReference {
    /// A built-in persona. `name` overrides the catalog display name.
    Catalog {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// A user-defined persona.
    Custom {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        personality: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        background: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speaking_style: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        topics_expertise: Vec<String>,
    },
}

impl PersonaReference {
    /// Reference a built-in persona.
    pub fn catalog(key: impl Into<String>) -> Self {
        PersonaReference::Catalog {
            key: key.into(),
            name: None,
        }
    }

    /// A custom persona with a free-text description.
    pub fn custom(name: impl Into<String>, description: impl Into<String>) -> Self {
        PersonaReference::Custom {
            name: name.into(),
            description: Some(description.into()),
            personality: None,
            background: None,
            speaking_style: None,
            topics_expertise: Vec::new(),
        }
    }

    /// A custom persona known only by name.
    pub fn named(name: impl Into<String>) -> Self {
        PersonaReference::Custom {
            name: name.into(),
            description: None,
            personality: None,
            background: None,
            speaking_style: None,
            topics_expertise: Vec::new(),
        }
    }

    /// Parse a command-line persona argument.
    ///
    /// Accepts a JSON object, a catalog key, or a bare name.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.starts_with('{') {
            if let Ok(reference) = serde_json::from_str::<PersonaReference>(trimmed) {
                return reference;
            }
        }
        if lookup(trimmed).is_some() {
            return PersonaReference::catalog(trimmed);
        }
        PersonaReference::named(trimmed)
    }

    /// Resolve this reference into a prompt-ready descriptor.
    pub fn resolve(&self) -> PersonaDescriptor {
        resolve(self)
    }
}

/// Normalized `{name, description}` pair used in prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaDescriptor {
    pub name: String,
    pub description: String,
}

/// Resolve a persona reference. Never fails; unknown or empty references
/// degrade to a generic description.
pub fn resolve(reference: &PersonaReference) -> PersonaDescriptor {
    match reference {
        PersonaReference::Catalog { key, name } => match lookup(key) {
            Some(entry) => PersonaDescriptor {
                name: non_blank(name.as_deref()).unwrap_or(entry.name).to_string(),
                description: entry.description.to_string(),
            },
            None => {
                let name = display_name(
                    non_blank(name.as_deref()).or(non_blank(Some(key.as_str()))),
                );
                PersonaDescriptor {
                    description: fallback_description(&name),
                    name,
                }
            }
        },
        PersonaReference::Custom {
            name,
            description,
            personality,
            background,
            speaking_style,
            topics_expertise,
        } => {
            let name = display_name(non_blank(Some(name.as_str())));
            let description = non_blank(description.as_deref())
                .map(str::to_string)
                .or_else(|| {
                    compose_attributes(
                        personality.as_deref(),
                        background.as_deref(),
                        speaking_style.as_deref(),
                        topics_expertise,
                    )
                })
                .unwrap_or_else(|| fallback_description(&name));
            PersonaDescriptor { name, description }
        }
    }
}

/// Generic description for personas with nothing else to go on.
pub fn fallback_description(name: &str) -> String {
    format!("{} is a notable figure with unique perspectives.", name)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn display_name(name: Option<&str>) -> String {
    name.unwrap_or(UNNAMED_DEBATER).to_string()
}

/// Build a description out of free-form custom attributes.
fn compose_attributes(
    personality: Option<&str>,
    background: Option<&str>,
    speaking_style: Option<&str>,
    topics_expertise: &[String],
) -> Option<String> {
    let mut parts = Vec::new();

    if let Some(personality) = non_blank(personality) {
        parts.push(sentence(personality));
    }
    if let Some(background) = non_blank(background) {
        parts.push(sentence(&format!("Background: {}", background)));
    }
    if let Some(style) = non_blank(speaking_style) {
        parts.push(sentence(&format!("Speaking style: {}", style)));
    }
    let topics: Vec<&str> = topics_expertise
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if !topics.is_empty() {
        parts.push(sentence(&format!("Expertise: {}", topics.join(", "))));
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

fn sentence(text: &str) -> String {
    if text.ends_with(['.', '!', '?']) {
        text.to_string()
    } else {
        format!("{}.", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_key_uses_canned_description() {
        let descriptor = PersonaReference::catalog("elon_musk").resolve();
        assert_eq!(descriptor.name, "Elon Musk");
        assert!(descriptor.description.starts_with("A visionary entrepreneur"));
    }

    #[test]
    fn test_catalog_lookup_is_case_insensitive() {
        assert_eq!(lookup("Sam_Altman").map(|e| e.name), Some("Sam Altman"));
        assert!(lookup("nobody").is_none());
    }

    #[test]
    fn test_catalog_name_override() {
        let reference = PersonaReference::Catalog {
            key: "virat_kohli".to_string(),
            name: Some("King Kohli".to_string()),
        };
        let descriptor = reference.resolve();
        assert_eq!(descriptor.name, "King Kohli");
        assert!(descriptor.description.contains("cricket"));
    }

    #[test]
    fn test_unknown_catalog_key_degrades_to_fallback() {
        let descriptor = PersonaReference::catalog("mystery_guest").resolve();
        assert_eq!(descriptor.name, "mystery_guest");
        assert_eq!(
            descriptor.description,
            "mystery_guest is a notable figure with unique perspectives."
        );
    }

    #[test]
    fn test_custom_description_wins_over_attributes() {
        let reference = PersonaReference::Custom {
            name: "Ada".to_string(),
            description: Some("A mathematician.".to_string()),
            personality: Some("Curious".to_string()),
            background: None,
            speaking_style: None,
            topics_expertise: vec![],
        };
        assert_eq!(reference.resolve().description, "A mathematician.");
    }

    #[test]
    fn test_custom_attributes_are_composed() {
        let reference = PersonaReference::Custom {
            name: "Priya".to_string(),
            description: None,
            personality: Some("Aggressive debater, uses stats".to_string()),
            background: Some("Software engineer from Mumbai".to_string()),
            speaking_style: Some("formal".to_string()),
            topics_expertise: vec!["AI".to_string(), " ".to_string(), "startups".to_string()],
        };
        assert_eq!(
            reference.resolve().description,
            "Aggressive debater, uses stats. Background: Software engineer from Mumbai. \
             Speaking style: formal. Expertise: AI, startups."
        );
    }

    #[test]
    fn test_custom_without_attributes_falls_back() {
        let descriptor = PersonaReference::named("Bob").resolve();
        assert_eq!(
            descriptor.description,
            "Bob is a notable figure with unique perspectives."
        );

        let blank = PersonaReference::custom("  ", "   ").resolve();
        assert_eq!(blank.name, UNNAMED_DEBATER);
        assert_eq!(blank.description, fallback_description(UNNAMED_DEBATER));
    }

    #[test]
    fn test_parse_reference_forms() {
        assert_eq!(
            PersonaReference::parse("donald_trump"),
            PersonaReference::catalog("donald_trump")
        );
        assert_eq!(
            PersonaReference::parse(r#"{"kind":"custom","name":"Zed","description":"A cat."}"#),
            PersonaReference::custom("Zed", "A cat.")
        );
        assert_eq!(PersonaReference::parse("Zed"), PersonaReference::named("Zed"));
    }

    #[test]
    fn test_reference_serde_tagging() {
        let json = serde_json::to_string(&PersonaReference::catalog("sam_altman")).unwrap();
        assert_eq!(json, r#"{"kind":"catalog","key":"sam_altman"}"#);
    }
}
