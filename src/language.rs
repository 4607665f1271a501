//! Heuristic Polish-language detection for the answering pipeline.
//!
//! The corpus is Polish and the generation prompts are Polish, so questions
//! in another language cannot be answered faithfully. The gate is
//! approximate by design: Polish diacritics are decisive, short greetings
//! are accepted outright, and everything else falls back to stop-word
//! overlap scoring between Polish and English. Ties go to Polish — the gate
//! should only reject clear-cut foreign input.

/// Polish stop-words (also used by the relevance gate's tokenizer).
pub const POLISH_STOPWORDS: &[&str] = &[
    "a", "aby", "albo", "ale", "bez", "będzie", "być", "był", "była", "było", "co", "czy", "dla",
    "do", "gdy", "gdzie", "i", "ich", "jak", "jaka", "jaki", "jakie", "jego", "jej", "jest",
    "jestem", "już", "kiedy", "kto", "która", "które", "który", "lub", "ma", "mam", "mi", "mnie",
    "moje", "może", "my", "na", "nad", "nie", "o", "od", "oraz", "po", "pod", "przez", "przy",
    "się", "są", "ta", "tak", "te", "tego", "ten", "to", "tylko", "tym", "u", "w", "we", "z",
    "za", "że", "żeby",
];

/// English stop-words (also used by the relevance gate's tokenizer).
pub const ENGLISH_STOPWORDS: &[&str] = &[
    "a", "about", "all", "an", "and", "any", "are", "as", "at", "be", "been", "but", "by", "can",
    "could", "did", "do", "does", "for", "from", "had", "has", "have", "here", "how", "i", "if",
    "in", "is", "it", "its", "me", "my", "no", "not", "of", "on", "or", "our", "should", "so",
    "some", "than", "that", "the", "their", "them", "then", "there", "these", "they", "this",
    "those", "to", "was", "we", "were", "what", "when", "where", "which", "who", "why", "will",
    "with", "would", "you", "your",
];

/// Short greetings accepted without scoring.
const GREETINGS: &[&str] = &[
    "cześć",
    "czesc",
    "hej",
    "hejka",
    "witam",
    "witaj",
    "siema",
    "halo",
    "dzień dobry",
    "dzien dobry",
    "dobry wieczór",
    "dobry wieczor",
];

const POLISH_DIACRITICS: &str = "ąćęłńóśźżĄĆĘŁŃÓŚŹŻ";

pub fn has_polish_diacritics(text: &str) -> bool {
    text.chars().any(|c| POLISH_DIACRITICS.contains(c))
}

/// Judge whether the input is in the expected (Polish) language.
pub fn is_expected_language(input: &str) -> bool {
    let trimmed = input
        .trim()
        .trim_end_matches(['!', '?', '.', ','])
        .to_lowercase();
    if trimmed.is_empty() {
        return true;
    }

    if GREETINGS.contains(&trimmed.as_str()) {
        return true;
    }

    if has_polish_diacritics(&trimmed) {
        return true;
    }

    let mut polish_hits = 0usize;
    let mut english_hits = 0usize;
    for token in trimmed.split(|c: char| !c.is_alphanumeric()) {
        if token.is_empty() {
            continue;
        }
        if POLISH_STOPWORDS.contains(&token) {
            polish_hits += 1;
        }
        if ENGLISH_STOPWORDS.contains(&token) {
            english_hits += 1;
        }
    }

    polish_hits >= english_hits
}
