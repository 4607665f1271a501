//! Relevance gate: decides whether retrieved context may be used to answer.
//!
//! Two independent checks, both of which must pass before the generation
//! call is made:
//!
//! 1. **Lexical overlap** — the standalone query and the concatenated
//!    context must share at least one content token (lowercased, stop-words
//!    stripped, tokens shorter than 3 chars dropped). A query with no
//!    content tokens trivially passes.
//! 2. **Model judge** — a YES/NO completion on whether the context is
//!    relevant to the question.
//!
//! Failing either check short-circuits the pipeline to the canonical
//! refusal, skipping the generation call entirely.

use std::collections::HashSet;

use crate::error::PipelineError;
use crate::language::{ENGLISH_STOPWORDS, POLISH_STOPWORDS};
use crate::llm::ChatModel;
use crate::prompts;

/// Content tokens of `text`: lowercased, split on non-alphanumeric chars,
/// stop-words and tokens shorter than 3 chars dropped.
pub fn content_tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
        .filter(|t| !POLISH_STOPWORDS.contains(t) && !ENGLISH_STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Lexical overlap check. Queries with no content tokens trivially pass.
pub fn lexical_overlap(query: &str, context: &str) -> bool {
    let query_tokens = content_tokens(query);
    if query_tokens.is_empty() {
        return true;
    }
    let context_tokens = content_tokens(context);
    query_tokens.iter().any(|t| context_tokens.contains(t))
}

/// Model judge. The reply is normalized to a boolean by presence of the
/// literal token `YES`.
pub async fn judge_relevance(
    chat: &dyn ChatModel,
    question: &str,
    context: &str,
) -> Result<bool, PipelineError> {
    let verdict = chat
        .complete(&prompts::judge_prompt(context, question))
        .await?;
    Ok(verdict.to_uppercase().contains("YES"))
}
