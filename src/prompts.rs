//! Prompt templates sent to the chat model.
//!
//! All templates are Polish, matching the corpus and the expected question
//! language. The judge template answers with the literal tokens YES/NO
//! regardless, since the caller normalizes on `YES`.

/// Grounded answer: respond strictly from the provided context.
pub fn answer_prompt(context: &str, question: &str) -> String {
    format!(
        "Odpowiadaj wyłącznie na podstawie dostarczonego kontekstu.\n\
         Jeśli odpowiedź nie znajduje się w kontekście - napisz że nie ma jej w dokumentach.\n\n\
         Kontekst:\n{context}\n\nPytanie:\n{question}\n\nOdpowiedź:"
    )
}

/// Fold the conversation into one self-contained question. The rewrite must
/// preserve topic and polarity — a negated condition must stay negated.
pub fn condense_prompt(history: &str, question: &str) -> String {
    format!(
        "Na podstawie poniższej rozmowy przekształć ostatnie pytanie użytkownika \
         w jedno samodzielne pytanie, zrozumiałe bez historii rozmowy.\n\
         Zachowaj temat i sens pytania; nie zamieniaj przeczeń na twierdzenia.\n\
         Zwróć wyłącznie przekształcone pytanie, bez żadnego komentarza.\n\n\
         Rozmowa:\n{history}\n\nOstatnie pytanie:\n{question}\n\nSamodzielne pytanie:"
    )
}

/// YES/NO relevance judgment. The reply is normalized by the caller on the
/// literal token `YES`.
pub fn judge_prompt(context: &str, question: &str) -> String {
    format!(
        "Oceń, czy poniższy kontekst zawiera informacje istotne dla pytania.\n\
         Odpowiedz dokładnie jednym słowem: YES albo NO.\n\n\
         Kontekst:\n{context}\n\nPytanie:\n{question}\n\nOdpowiedź:"
    )
}

/// Recap: paraphrase the user's previous question in second person.
pub fn recap_prompt(previous_question: &str) -> String {
    format!(
        "Sparafrazuj poniższe pytanie w drugiej osobie, np. \"Pytałeś o...\".\n\
         Nie używaj słów \"kontekst\" ani \"historia\". Zwróć tylko parafrazę.\n\n\
         Pytanie:\n{previous_question}\n\nParafraza:"
    )
}

/// Render conversation history for the condense prompt.
pub fn format_history(turns: &[crate::models::ChatTurn]) -> String {
    turns
        .iter()
        .map(|t| match t.role {
            crate::models::Role::Human => format!("Użytkownik: {}", t.content),
            crate::models::Role::Assistant => format!("Asystent: {}", t.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatTurn;

    #[test]
    fn answer_prompt_embeds_context_and_question() {
        let p = answer_prompt("fragment dokumentu", "jakie są zasady?");
        assert!(p.contains("fragment dokumentu"));
        assert!(p.contains("jakie są zasady?"));
        assert!(p.contains("wyłącznie na podstawie"));
    }

    #[test]
    fn history_renders_roles() {
        let history = [
            ChatTurn::human("Ile dni urlopu przysługuje?"),
            ChatTurn::assistant("Przysługuje 26 dni."),
        ];
        let rendered = format_history(&history);
        assert_eq!(
            rendered,
            "Użytkownik: Ile dni urlopu przysługuje?\nAsystent: Przysługuje 26 dni."
        );
    }
}
