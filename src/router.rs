//! First routing decision for a user turn: conversation recap vs document
//! question.
//!
//! Pattern-based and fully deterministic — no model call. A fixed phrase
//! set catches requests about prior questions and conversation history;
//! everything else (including empty input) goes down the RAG path.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The user is asking about the conversation itself.
    Recap,
    /// The user is asking about the document corpus.
    Rag,
}

/// Phrases that mark a recap request, matched on the lowercased input.
const RECAP_PATTERNS: &[&str] = &[
    "co pytałem",
    "co pytałam",
    "o co pytałem",
    "o co pytałam",
    "o co wcześniej pytałem",
    "o co wcześniej pytałam",
    "jakie było moje pytanie",
    "jakie było moje poprzednie pytanie",
    "moje poprzednie pytanie",
    "poprzednie pytanie",
    "historia rozmowy",
    "historię rozmowy",
    "podsumuj naszą rozmowę",
    "podsumuj rozmowę",
    "o czym rozmawialiśmy",
    "what did i ask",
    "my previous question",
    "summarize our chat",
    "summarize our conversation",
];

/// Classify a user turn.
pub fn route(input: &str) -> Route {
    let normalized = input.trim().to_lowercase();
    if normalized.is_empty() {
        return Route::Rag;
    }
    if RECAP_PATTERNS.iter().any(|p| normalized.contains(p)) {
        Route::Recap
    } else {
        Route::Rag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recap_phrases_route_to_recap() {
        assert_eq!(route("Co pytałem wcześniej?"), Route::Recap);
        assert_eq!(route("O co wcześniej pytałam?"), Route::Recap);
        assert_eq!(route("Podsumuj naszą rozmowę"), Route::Recap);
        assert_eq!(route("Jakie było moje poprzednie pytanie?"), Route::Recap);
        assert_eq!(route("what did I ask before?"), Route::Recap);
    }

    #[test]
    fn document_questions_route_to_rag() {
        assert_eq!(route("Ile dni urlopu mi przysługuje?"), Route::Rag);
        assert_eq!(route("Jak rozliczyć delegację?"), Route::Rag);
        assert_eq!(route("pytanie o regulamin pracy"), Route::Rag);
    }

    #[test]
    fn empty_input_routes_to_rag() {
        assert_eq!(route(""), Route::Rag);
        assert_eq!(route("   "), Route::Rag);
    }
}
