//! Input classification heuristics.
//!
//! Everything here is a cheap textual check that decides which pipeline
//! branches a Steward message takes: greetings skip search and retrieval,
//! memory prefixes never reach the backend, `@ref` tokens only load files
//! when an authorizing verb is present.

use regex_lite::Regex;
use std::sync::OnceLock;

const GREETINGS: &[&str] = &[
    "hey", "hi", "hello", "yo", "sup", "what's up", "howdy", "greetings",
];

/// Verbs that authorize an `@ref` file load. Mentioning a path is not
/// enough; the Steward has to ask for it to be read.
const REF_LOAD_VERBS: &[&str] = &[
    "look at", "looking at",
    "read", "reading",
    "review", "reviewing",
    "analyze", "analyzing", "analyse", "analysing",
    "check", "checking",
    "examine", "examining",
    "inspect", "inspecting",
    "see", "seeing",
    "view", "viewing",
    "use", "using",
    "open", "opening",
    "show me", "showing",
];

const MEMORY_QUERY_PHRASES: &[&str] =
    &["what do you remember", "what did i tell", "do you know"];

/// Short casual openers skip search and retrieval.
pub fn is_greeting(message: &str) -> bool {
    let lowered = message.trim().to_lowercase();
    GREETINGS.iter().any(|g| lowered.starts_with(g)) && message.split_whitespace().count() < 5
}

/// The content after a `remember:`/`store:`/`save:` prefix, if present.
pub fn memory_intent(message: &str) -> Option<&str> {
    let lowered = message.trim_start().to_lowercase();
    for prefix in ["remember:", "store:", "save:"] {
        if lowered.starts_with(prefix) {
            let start = message.len() - message.trim_start().len();
            return Some(message[start + prefix.len()..].trim());
        }
    }
    None
}

/// Heuristic entity extraction for a direct memory write.
///
/// "my name is X" produces a person entity named X; everything else files
/// under a generic note.
pub fn extract_memory_entity(content: &str) -> (String, String) {
    let lowered = content.to_lowercase();
    if let Some(idx) = lowered.find("my name is") {
        let after = &content[idx + "my name is".len()..];
        if let Some(name) = after.split_whitespace().next() {
            let name = name.trim_matches(|c: char| !c.is_alphanumeric());
            if !name.is_empty() {
                let mut chars = name.chars();
                let capitalized = match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => name.to_string(),
                };
                return (capitalized, "person".to_string());
            }
        }
    }
    ("note".to_string(), "fact".to_string())
}

/// Is the Steward asking what the Node knows? Triggers explicit memory
/// injection instead of the silent background kind.
pub fn is_memory_query(message: &str) -> bool {
    let lowered = message.to_lowercase();
    MEMORY_QUERY_PHRASES.iter().any(|p| lowered.contains(p))
}

/// Extract `@<path>` tokens from a message.
pub fn extract_refs(message: &str) -> Vec<String> {
    message
        .split_whitespace()
        .filter_map(|token| {
            let path = token.strip_prefix('@')?;
            let path = path.trim_matches(|c: char| matches!(c, ',' | ';' | '?' | '!' | ')'));
            (!path.is_empty()).then(|| path.to_string())
        })
        .collect()
}

/// Does the message contain a verb that authorizes loading refs?
pub fn has_load_verb(message: &str) -> bool {
    let lowered = message.to_lowercase();
    REF_LOAD_VERBS.iter().any(|v| lowered.contains(v))
}

fn paired_tag_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        ["think", "thinking", "reasoning", "internal", "reflection"]
            .iter()
            .filter_map(|tag| Regex::new(&format!(r"(?is)<{tag}>.*?</{tag}>")).ok())
            .collect()
    })
}

fn orphan_tag_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        ["think", "thinking", "reasoning"]
            .iter()
            .filter_map(|tag| Regex::new(&format!(r"(?is)^.*?</{tag}>")).ok())
            .collect()
    })
}

/// Remove reasoning-model chain-of-thought blocks from a response.
///
/// Handles both paired tags and the missing-opening-tag case where a model
/// starts with reasoning and closes with `</think>`. Returns the cleaned
/// display text and whether anything was stripped.
pub fn strip_reasoning(response: &str) -> (String, bool) {
    let mut text = response.to_string();
    let mut stripped = false;

    for pattern in paired_tag_patterns() {
        if pattern.is_match(&text) {
            stripped = true;
            text = pattern.replace_all(&text, "").into_owned();
        }
    }
    for pattern in orphan_tag_patterns() {
        if pattern.is_match(&text) {
            stripped = true;
            text = pattern.replace(&text, "").into_owned();
        }
    }

    // collapse the gaps left behind
    static GAPS: OnceLock<Option<Regex>> = OnceLock::new();
    if let Some(gaps) = GAPS.get_or_init(|| Regex::new(r"\n{3,}").ok()) {
        text = gaps.replace_all(&text, "\n\n").into_owned();
    }

    (text.trim().to_string(), stripped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greetings_are_short_casual_openers() {
        assert!(is_greeting("hey"));
        assert!(is_greeting("Hello there"));
        assert!(is_greeting("what's up"));
        assert!(!is_greeting("hey can you review the retriever module for me"));
        assert!(!is_greeting("tell me about lifetimes"));
    }

    #[test]
    fn memory_prefixes_are_recognized() {
        assert_eq!(
            memory_intent("remember: the index lives under workspace/knowledge"),
            Some("the index lives under workspace/knowledge")
        );
        assert_eq!(memory_intent("Store: a fact"), Some("a fact"));
        assert_eq!(memory_intent("saved you some time"), None);
        assert_eq!(memory_intent("please remember: x"), None);
    }

    #[test]
    fn name_intro_becomes_a_person_entity() {
        let (name, kind) = extract_memory_entity("my name is ada and I like planners");
        assert_eq!(name, "Ada");
        assert_eq!(kind, "person");

        let (name, kind) = extract_memory_entity("the deploy runs on fridays");
        assert_eq!(name, "note");
        assert_eq!(kind, "fact");
    }

    #[test]
    fn memory_query_phrasing() {
        assert!(is_memory_query("What do you remember about me?"));
        assert!(is_memory_query("do you know my timezone"));
        assert!(!is_memory_query("remember: my timezone is UTC"));
    }

    #[test]
    fn refs_are_extracted_without_punctuation() {
        assert_eq!(
            extract_refs("please read @src/main.rs and @notes.md, thanks"),
            vec!["src/main.rs", "notes.md"]
        );
        // mid-token @ is not a ref
        assert!(extract_refs("email me at user@example.com").is_empty());
        assert!(extract_refs("no refs here").is_empty());
    }

    #[test]
    fn load_verbs_gate_ref_loading() {
        assert!(has_load_verb("take a look at @config.toml"));
        assert!(has_load_verb("Reviewing @lib.rs now"));
        assert!(!has_load_verb("@config.toml is mentioned but nothing asked"));
    }

    #[test]
    fn paired_reasoning_tags_are_stripped() {
        let (text, stripped) =
            strip_reasoning("<think>step one\nstep two</think>The answer is 4.");
        assert_eq!(text, "The answer is 4.");
        assert!(stripped);

        let (text, stripped) = strip_reasoning("Plain answer.");
        assert_eq!(text, "Plain answer.");
        assert!(!stripped);
    }

    #[test]
    fn orphan_close_tag_drops_the_preamble() {
        let (text, stripped) =
            strip_reasoning("I should consider both cases...</think>Use a BTreeMap.");
        assert_eq!(text, "Use a BTreeMap.");
        assert!(stripped);
    }

    #[test]
    fn mixed_case_tags_are_stripped() {
        let (text, stripped) = strip_reasoning("<Thinking>hmm</Thinking>Done.");
        assert_eq!(text, "Done.");
        assert!(stripped);
    }
}
