//! Final answer composition: source attribution, preamble stripping, and
//! denial normalization.
//!
//! Every way the pipeline can fail to ground an answer converges on one
//! canonical refusal string, so callers and tests can rely on a stable
//! user-visible contract instead of a model paraphrase.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::RetrievedChunk;

/// Canonical "no knowledge" answer.
pub const NO_KNOWLEDGE_ANSWER: &str = "Nie mam tej informacji w dostępnych dokumentach.";

/// Fixed reply for input that fails the language gate.
pub const UNSUPPORTED_LANGUAGE_ANSWER: &str =
    "Przepraszam, odpowiadam tylko na pytania zadane w języku polskim.";

/// Heading above the deduplicated source list.
pub const SOURCES_HEADING: &str = "Źródła:";

/// Display name used when a retrieved document has none.
const UNKNOWN_SOURCE: &str = "unknown";

/// Generation preambles that reference the provided context; stripped from
/// the front of the model's answer.
static CONTEXT_PREAMBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(na podstawie (dostarczonego |podanego )?kontekstu|zgodnie z (dostarczonym )?kontekstem|według (dostarczonego )?kontekstu|based on the (provided )?context|according to the (provided )?context)[\s,.:]*",
    )
    .expect("static pattern")
});

/// Phrases that mean the model itself declined to answer.
const DENIAL_PHRASES: &[&str] = &[
    "nie ma jej w dokumentach",
    "nie ma takiej informacji",
    "nie ma tej informacji",
    "nie znajduje się w kontekście",
    "nie znajduje się w dokumentach",
    "nie znalazłem informacji",
    "nie znalazłam informacji",
    "brak informacji",
    "nie mam informacji",
    "nie zawiera informacji",
    "nie zawiera odpowiedzi",
    "no such information",
    "does not contain",
];

/// Deduplicated document display names in first-seen order.
pub fn dedupe_sources(chunks: &[RetrievedChunk]) -> Vec<String> {
    let mut seen = Vec::new();
    for chunk in chunks {
        let name = if chunk.file.trim().is_empty() {
            UNKNOWN_SOURCE.to_string()
        } else {
            chunk.file.clone()
        };
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

/// Strip a leading "based on the context"-style preamble.
pub fn strip_context_preamble(answer: &str) -> String {
    CONTEXT_PREAMBLE.replace(answer.trim(), "").trim().to_string()
}

/// True when the answer text semantically denies knowledge.
pub fn is_denial(answer: &str) -> bool {
    let lowered = answer.to_lowercase();
    DENIAL_PHRASES.iter().any(|p| lowered.contains(p))
}

/// Compose the final user-visible message from the raw generation output
/// and the retrieved chunks it was grounded on.
pub fn render_answer(raw_answer: &str, retrieved: &[RetrievedChunk]) -> String {
    let answer = strip_context_preamble(raw_answer);

    if answer.is_empty() || is_denial(&answer) {
        return NO_KNOWLEDGE_ANSWER.to_string();
    }

    let sources = dedupe_sources(retrieved);
    if sources.is_empty() {
        return answer;
    }

    let mut out = answer;
    out.push_str("\n\n");
    out.push_str(SOURCES_HEADING);
    for source in sources {
        out.push_str("\n- ");
        out.push_str(&source);
    }
    out
}
