//! Cleanup of raw generated text into a short plain-text utterance.
//!
//! Cleanup runs an ordered table of [`SanitizeRule`]s, each a named
//! `(applies, transform)` pair, and then picks one sentence-like segment.
//! Nothing here can fail: malformed input degrades to an empty or truncated
//! string.

use regex::{Captures, Regex};

/// Segments shorter than this are discarded outright.
pub const MIN_SEGMENT_CHARS: usize = 4;

/// A segment shorter than this is skipped in favour of a later one.
pub const MIN_PREFERRED_CHARS: usize = 10;

/// Length of the fallback when no segment qualifies.
pub const FALLBACK_CHARS: usize = 200;

/// Reasoning/internal tags stripped together with their content.
const REASONING_TAGS: &[&str] = &[
    "thinking",
    "think",
    "reflection",
    "reflect",
    "internal",
    "reasoning",
    "thought",
    "scratch",
    "scratchpad",
    "plan",
    "analysis",
    "analyze",
    "consider",
    "pondering",
    "deliberation",
];

/// Segments starting with one of these are treated as meta-commentary.
const META_LEAD_PHRASES: &[&str] = &[
    "as mentioned",
    "as i said",
    "as i mentioned",
    "as noted",
    "as stated",
    "as previously",
    "however",
    "to continue",
    "continuing",
    "let's continue",
    "moving on",
    "in response",
    "here's my",
    "here is my",
    "sure",
    "certainly",
    "okay",
    "ok",
    "well",
    "note",
];

/// Longest opening sentence dropped when the next sentence announces a
/// continuation ("Fine. Let's continue: ...").
const MAX_LEAD_IN_CHARS: usize = 40;

const CLAUSE_FILLERS: &str = r"as (?:i )?(?:mentioned|said|noted|stated)(?: (?:earlier|before|previously))?|however|well|okay|ok|so|now|sure|alright";

const CONTINUATION: &str = r"(?:let's|lets|let us|i'll|i will|to) continue(?: the debate)?";

const OPENING_FILLERS: &str = r"as (?:i )?(?:mentioned|said|noted|stated)(?: (?:earlier|before|previously))?|however|to continue|continuing(?: on)?|in response|here(?:'s| is) my (?:response|reply|rebuttal)|sure|certainly|okay|ok|well";

/// A continuation clause opening a sentence, with any fillers in front of it.
fn continuation_clause() -> String {
    format!(
        r"(?i)(^|[.!?]\s+)(?:(?:{CLAUSE_FILLERS})\s*,\s*)*{CONTINUATION}\s*:\s*(\w)(\w?)"
    )
}

/// A short first sentence directly followed by a continuation clause.
fn continuation_lead_in() -> String {
    format!(
        r"(?i)^[^.!?]{{1,{MAX_LEAD_IN_CHARS}}}[.!?]\s+((?:(?:{CLAUSE_FILLERS})\s*,\s*)*{CONTINUATION}\s*:)"
    )
}

/// A filler clause at the very start of the text.
fn opening_filler() -> String {
    format!(r"(?i)^(?:{OPENING_FILLERS})\s*[,:]\s*(\w)(\w?)")
}

/// One cleanup step.
#[derive(Clone, Copy)]
pub struct SanitizeRule {
    pub name: &'static str,
    /// Whether `transform` has anything to do on this text.
    pub applies: fn(&str) -> bool,
    pub transform: fn(&str) -> String,
}

impl std::fmt::Debug for SanitizeRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SanitizeRule").field("name", &self.name).finish()
    }
}

const RULES: &[SanitizeRule] = &[
    SanitizeRule {
        name: "reasoning_tags",
        applies: has_tags,
        transform: strip_reasoning_tags,
    },
    SanitizeRule {
        name: "markup",
        applies: has_markup,
        transform: strip_markup,
    },
    SanitizeRule {
        name: "whitespace",
        applies: has_irregular_whitespace,
        transform: collapse_whitespace,
    },
    SanitizeRule {
        name: "typographic_quotes",
        applies: has_typographic_quotes,
        transform: normalize_quotes,
    },
    SanitizeRule {
        name: "meta_commentary",
        applies: has_meta_commentary,
        transform: strip_meta_commentary,
    },
];

/// The cleanup rules in the order they are applied.
pub fn rules() -> &'static [SanitizeRule] {
    RULES
}

/// Sanitize raw generated text into a single plain-text utterance.
pub fn sanitize_response(raw: &str) -> String {
    select_utterance(&clean_text(raw))
}

/// Like [`sanitize_response`], treating absent output as empty.
pub fn sanitize_optional(raw: Option<&str>) -> String {
    raw.map(sanitize_response).unwrap_or_default()
}

/// Run every applicable rule over the text, in order.
pub fn clean_text(raw: &str) -> String {
    RULES.iter().fold(raw.to_string(), |text, rule| {
        if (rule.applies)(&text) {
            (rule.transform)(&text)
        } else {
            text
        }
    })
}

/// Pick the utterance out of already-cleaned text.
pub fn select_utterance(cleaned: &str) -> String {
    let segments: Vec<&str> = cleaned
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| s.chars().count() >= MIN_SEGMENT_CHARS)
        .collect();

    let chosen = match segments.split_first() {
        Some((first, _)) if is_preferred(first) => Some(*first),
        Some((_, rest)) => rest.iter().copied().find(|s| is_preferred(s)),
        None => None,
    };

    match chosen {
        Some(segment) => segment.to_string(),
        None => cleaned
            .chars()
            .take(FALLBACK_CHARS)
            .collect::<String>()
            .trim()
            .to_string(),
    }
}

fn is_preferred(segment: &str) -> bool {
    segment.chars().count() >= MIN_PREFERRED_CHARS && !starts_with_meta_lead(segment)
}

/// Whether the segment opens with a known meta-commentary phrase.
pub fn starts_with_meta_lead(segment: &str) -> bool {
    let lowered = segment.trim_start().to_lowercase();
    META_LEAD_PHRASES.iter().any(|phrase| {
        lowered.starts_with(phrase)
            && !lowered[phrase.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric())
    })
}

fn is_match(pattern: &str, text: &str) -> bool {
    Regex::new(pattern).is_ok_and(|re| re.is_match(text))
}

fn replace_all(pattern: &str, text: &str, replacement: &str) -> String {
    match Regex::new(pattern) {
        Ok(re) => re.replace_all(text, replacement).into_owned(),
        Err(_) => text.to_string(),
    }
}

fn has_tags(text: &str) -> bool {
    is_match(r"</?[\w]+[^>]*>", text)
}

/// Strip reasoning blocks such as `<thinking>...</thinking>`, then any
/// remaining orphan tags.
fn strip_reasoning_tags(text: &str) -> String {
    let mut result = text.to_string();

    for tag in REASONING_TAGS {
        let pattern = format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag);
        result = replace_all(&pattern, &result, "");
    }

    replace_all(r"</?[\w]+[^>]*>", &result, "")
}

fn has_markup(text: &str) -> bool {
    text.contains(['*', '_', '#', '`', '~']) || is_match(r"(?m)^\s*(?:>|[-+]\s|-{3,})", text)
}

fn strip_markup(text: &str) -> String {
    let mut result = replace_all(r"\[([^\]]*)\]\([^)]*\)", text, "$1");
    result = replace_all(r"(?m)^\s*-{3,}\s*$", &result, "");
    result = replace_all(r"(?m)^\s*(?:>+\s*|[-+]\s+)", &result, "");
    result.replace(['*', '_', '#', '`', '~'], "")
}

fn has_irregular_whitespace(text: &str) -> bool {
    text != text.trim()
        || text.contains("  ")
        || text.chars().any(|c| c.is_whitespace() && c != ' ')
}

fn collapse_whitespace(text: &str) -> String {
    replace_all(r"\s+", text, " ").trim().to_string()
}

fn has_typographic_quotes(text: &str) -> bool {
    text.chars().any(|c| plain_quote(c).is_some())
}

fn normalize_quotes(text: &str) -> String {
    text.chars().map(|c| plain_quote(c).unwrap_or(c)).collect()
}

fn plain_quote(c: char) -> Option<char> {
    match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => Some('\''),
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' | '\u{00AB}' | '\u{00BB}' => {
            Some('"')
        }
        _ => None,
    }
}

fn has_meta_commentary(text: &str) -> bool {
    is_match(&continuation_clause(), text) || is_match(&opening_filler(), text)
}

/// Upper-case the first letter of a word unless it is already mixed case
/// ("iPhones").
fn capitalized(first: &str, second: &str) -> String {
    if second.chars().next().is_some_and(char::is_uppercase) {
        format!("{}{}", first, second)
    } else {
        format!("{}{}", first.to_uppercase(), second)
    }
}

/// Drop continuation clauses opening a sentence ("As mentioned, let's
/// continue: "), a short lead-in sentence right before one, and filler
/// clauses at the start of the text ("However, ").
fn strip_meta_commentary(text: &str) -> String {
    let mut result = replace_all(&continuation_lead_in(), text, "$1");

    if let Ok(clause) = Regex::new(&continuation_clause()) {
        result = clause
            .replace_all(&result, |caps: &Captures| {
                format!("{}{}", &caps[1], capitalized(&caps[2], &caps[3]))
            })
            .into_owned();
    }

    let Ok(filler) = Regex::new(&opening_filler()) else {
        return result;
    };
    // Fillers can be stacked ("Well, as I said, ..."); a few passes unwrap them.
    for _ in 0..3 {
        let next = filler
            .replace(&result, |caps: &Captures| capitalized(&caps[1], &caps[2]))
            .into_owned();
        if next == result {
            break;
        }
        result = next;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str) -> SanitizeRule {
        *rules().iter().find(|r| r.name == name).unwrap()
    }

    #[test]
    fn test_rule_order() {
        let names: Vec<&str> = rules().iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec!["reasoning_tags", "markup", "whitespace", "typographic_quotes", "meta_commentary"]
        );
    }

    #[test]
    fn test_sanitize_scenario_meta_and_markup() {
        let raw = "**I** *believe* this.\n\nAs mentioned, let's continue: Taxes are unfair.";
        assert_eq!(sanitize_response(raw), "Taxes are unfair");
    }

    #[test]
    fn test_sanitize_empty_and_absent() {
        assert_eq!(sanitize_response(""), "");
        assert_eq!(sanitize_optional(None), "");
        assert_eq!(sanitize_optional(Some("   \n ")), "");
    }

    #[test]
    fn test_reasoning_tags_rule() {
        let r = rule("reasoning_tags");
        let input = "<thinking>\nMultiple\nlines\n</thinking>Final answer here.";
        assert!((r.applies)(input));
        assert_eq!((r.transform)(input), "Final answer here.");
        assert!(!(r.applies)("No tags here."));
    }

    #[test]
    fn test_reasoning_tags_nested_content() {
        let input = "Start <think>nested <inner>tags</inner> content</think> end";
        let output = (rule("reasoning_tags").transform)(input);
        assert!(!output.contains('<'));
        assert!(!output.contains('>'));
    }

    #[test]
    fn test_markup_rule() {
        let r = rule("markup");
        let input = "# Heading\n> quoted **bold** _em_ `code` [link](http://x.y)\n- item\n---";
        assert!((r.applies)(input));
        let output = (r.transform)(input);
        for marker in ['*', '_', '#', '`', '~', '>', '[', ']'] {
            assert!(!output.contains(marker), "{marker} left in {output:?}");
        }
        assert!(output.contains("quoted bold em code link"));
        assert!(output.contains("item"));
        assert!(!(r.applies)("Plain words, nothing else."));
    }

    #[test]
    fn test_whitespace_rule() {
        let r = rule("whitespace");
        assert!((r.applies)("a\n\nb"));
        assert_eq!((r.transform)("  a \n\n\t b  "), "a b");
        assert!(!(r.applies)("a b"));
    }

    #[test]
    fn test_quotes_rule() {
        let r = rule("typographic_quotes");
        assert!((r.applies)("It\u{2019}s \u{201C}fine\u{201D}"));
        assert_eq!((r.transform)("It\u{2019}s \u{201C}fine\u{201D}"), "It's \"fine\"");
        assert!(!(r.applies)("It's \"fine\""));
    }

    #[test]
    fn test_meta_commentary_rule() {
        let r = rule("meta_commentary");
        assert!((r.applies)("However, taxes are high."));
        assert_eq!((r.transform)("However, taxes are high."), "Taxes are high.");
        assert_eq!(
            (r.transform)("Well, as I said before, we need roads."),
            "We need roads."
        );
        assert_eq!(
            (r.transform)("Sure thing. To continue: Roads matter."),
            "Roads matter."
        );
        assert!(!(r.applies)("As a teacher I disagree."));
    }

    #[test]
    fn test_continuation_words_inside_an_argument_are_kept() {
        let raw = "Renewable energy creates millions of jobs and cuts emissions, \
                   so we have to continue: subsidies work.";
        assert_eq!(
            sanitize_response(raw),
            "Renewable energy creates millions of jobs and cuts emissions, \
             so we have to continue: subsidies work"
        );
    }

    #[test]
    fn test_continuation_clause_removal_keeps_capitals() {
        assert_eq!(
            sanitize_response("I will continue: investing in schools is vital."),
            "Investing in schools is vital"
        );
        assert_eq!(
            clean_text("Nuclear power is the safest option we have today. To continue: costs fall."),
            "Nuclear power is the safest option we have today. Costs fall."
        );
    }

    #[test]
    fn test_fillers_are_only_stripped_at_the_start() {
        let r = rule("meta_commentary");
        let text = "Costs matter a lot. However, iPhones are pricey.";
        assert!(!(r.applies)(text));
        assert_eq!(clean_text(text), text);
        assert_eq!((r.transform)("However, iPhones cost more."), "iPhones cost more.");
    }

    #[test]
    fn test_selection_skips_short_first_segment() {
        assert_eq!(
            select_utterance("Yes. Public transit reduces traffic."),
            "Public transit reduces traffic"
        );
    }

    #[test]
    fn test_selection_skips_meta_first_segment() {
        assert_eq!(
            select_utterance("Here is my reply to that point. Cities need more parks."),
            "Cities need more parks"
        );
    }

    #[test]
    fn test_selection_keeps_first_good_segment() {
        assert_eq!(
            sanitize_response("I believe remote work boosts output! It also saves time."),
            "I believe remote work boosts output"
        );
    }

    #[test]
    fn test_fallback_truncates_when_nothing_qualifies() {
        let murmurs = "Hmm. ".repeat(100);
        let output = sanitize_response(&murmurs);
        assert!(output.chars().count() <= FALLBACK_CHARS);
        assert!(output.starts_with("Hmm. Hmm."));

        assert_eq!(sanitize_response("Ok. No."), "Ok. No.");
    }

    #[test]
    fn test_output_has_no_markup_or_newlines() {
        let raw = "## Opening\n\n***Bold*** claim: __markets__ self-correct.\n\n# End";
        let output = sanitize_response(raw);
        assert!(!output.contains('\n'));
        assert!(!output.contains('*'));
        assert!(!output.contains('#'));
        assert!(!output.contains('_'));
    }

    #[test]
    fn test_meta_lead_detection_is_word_bounded() {
        assert!(starts_with_meta_lead("Okay, here goes"));
        assert!(!starts_with_meta_lead("Okayish results are fine"));
        assert!(!starts_with_meta_lead("Notably, costs fell"));
    }
}
