//! The staged answering pipeline.
//!
//! A user turn flows through guard stages in a fixed order — route →
//! language gate → contextualize → retrieve → relevance gate → generate →
//! render — and any stage may terminate the request with a fixed answer:
//!
//! - recap requests never touch the index;
//! - non-Polish input returns the unsupported-language reply;
//! - empty retrieval, failed lexical overlap, or a negative judge verdict
//!   all return the canonical refusal *without* making the generation call.
//!
//! Collaborator handles are injected at construction and shared by
//! reference; the pipeline itself is stateless per request.

use std::sync::Arc;
use tracing::debug;

use crate::answer::{self, NO_KNOWLEDGE_ANSWER, UNSUPPORTED_LANGUAGE_ANSWER};
use crate::config::RetrievalConfig;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::PipelineError;
use crate::gate;
use crate::index::{SearchIndex, SearchMode};
use crate::language;
use crate::llm::ChatModel;
use crate::models::{ChatTurn, RetrievedChunk, Role};
use crate::prompts;
use crate::router::{self, Route};

pub struct AnswerPipeline {
    chat: Arc<dyn ChatModel>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn SearchIndex>,
    mode: SearchMode,
    k: usize,
}

impl AnswerPipeline {
    pub fn new(
        chat: Arc<dyn ChatModel>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn SearchIndex>,
        retrieval: &RetrievalConfig,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            chat,
            embedder,
            index,
            mode: retrieval.mode.parse()?,
            k: retrieval.k,
        })
    }

    /// Answer one user turn given the prior session history.
    pub async fn answer(
        &self,
        input: &str,
        history: &[ChatTurn],
    ) -> Result<String, PipelineError> {
        match router::route(input) {
            Route::Recap => self.recap(history).await,
            Route::Rag => self.rag(input, history).await,
        }
    }

    async fn rag(&self, input: &str, history: &[ChatTurn]) -> Result<String, PipelineError> {
        if !language::is_expected_language(input) {
            debug!("language gate rejected input");
            return Ok(UNSUPPORTED_LANGUAGE_ANSWER.to_string());
        }

        let standalone = self.contextualize(input, history).await?;
        let retrieved = self.retrieve(&standalone).await?;
        if retrieved.is_empty() {
            debug!("no context retrieved");
            return Ok(NO_KNOWLEDGE_ANSWER.to_string());
        }

        let context = retrieved
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        if !gate::lexical_overlap(&standalone, &context) {
            debug!("lexical overlap check failed");
            return Ok(NO_KNOWLEDGE_ANSWER.to_string());
        }
        if !gate::judge_relevance(self.chat.as_ref(), &standalone, &context).await? {
            debug!("judge rejected context");
            return Ok(NO_KNOWLEDGE_ANSWER.to_string());
        }

        let raw = self
            .chat
            .complete(&prompts::answer_prompt(&context, &standalone))
            .await?;
        Ok(answer::render_answer(&raw, &retrieved))
    }

    /// Rewrite a follow-up into a standalone query. With no history the
    /// input is already standalone and is returned unchanged.
    pub async fn contextualize(
        &self,
        input: &str,
        history: &[ChatTurn],
    ) -> Result<String, PipelineError> {
        if history.is_empty() {
            return Ok(input.to_string());
        }
        let prompt = prompts::condense_prompt(&prompts::format_history(history), input);
        let standalone = self.chat.complete(&prompt).await?;
        Ok(standalone.trim().to_string())
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>, PipelineError> {
        let query_vector = if self.mode == SearchMode::Keyword {
            None
        } else {
            Some(embedding::embed_query(self.embedder.as_ref(), query).await?)
        };
        self.index
            .search(query, query_vector.as_deref(), self.k, self.mode)
            .await
    }

    /// Paraphrase the most recent human turn strictly before the current
    /// one. With no prior human turn there is nothing to recap.
    async fn recap(&self, history: &[ChatTurn]) -> Result<String, PipelineError> {
        let previous = history.iter().rev().find(|t| t.role == Role::Human);
        let Some(previous) = previous else {
            return Ok(NO_KNOWLEDGE_ANSWER.to_string());
        };
        let paraphrase = self
            .chat
            .complete(&prompts::recap_prompt(&previous.content))
            .await?;
        Ok(paraphrase.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DisabledEmbeddings;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedChat {
        replies: Mutex<VecDeque<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedChat {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedChat {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _prompt: &str) -> Result<String, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| PipelineError::ModelCall("no scripted reply left".into()))
        }
    }

    struct FixedIndex {
        results: Vec<RetrievedChunk>,
    }

    #[async_trait]
    impl SearchIndex for FixedIndex {
        async fn upsert(&self, _entries: &[crate::index::IndexEntry]) -> Result<(), PipelineError> {
            Ok(())
        }

        async fn delete_document(&self, _doc_id: &str) -> Result<u64, PipelineError> {
            Ok(0)
        }

        async fn search(
            &self,
            _query: &str,
            _query_vector: Option<&[f32]>,
            k: usize,
            _mode: SearchMode,
        ) -> Result<Vec<RetrievedChunk>, PipelineError> {
            Ok(self.results.iter().take(k).cloned().collect())
        }
    }

    fn retrieved(file: &str, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            doc_id: file.to_string(),
            file: file.to_string(),
            text: text.to_string(),
            score: 1.0,
        }
    }

    fn pipeline(chat: Arc<ScriptedChat>, results: Vec<RetrievedChunk>) -> AnswerPipeline {
        AnswerPipeline::new(
            chat,
            Arc::new(DisabledEmbeddings),
            Arc::new(FixedIndex { results }),
            &RetrievalConfig {
                k: 6,
                mode: "keyword".to_string(),
                hybrid_alpha: 0.6,
                candidate_k: 80,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn empty_context_refuses_without_any_model_call() {
        let chat = Arc::new(ScriptedChat::new(&[]));
        let p = pipeline(chat.clone(), Vec::new());

        let out = p.answer("Ile dni urlopu mi przysługuje?", &[]).await.unwrap();
        assert_eq!(out, NO_KNOWLEDGE_ANSWER);
        assert_eq!(chat.call_count(), 0);
    }

    #[tokio::test]
    async fn failed_overlap_skips_judge_and_generation() {
        let chat = Arc::new(ScriptedChat::new(&[]));
        let p = pipeline(
            chat.clone(),
            vec![retrieved("parking.pdf", "Zasady korzystania z parkingu firmowego.")],
        );

        let out = p.answer("Ile wynosi budżet szkoleniowy?", &[]).await.unwrap();
        assert_eq!(out, NO_KNOWLEDGE_ANSWER);
        assert_eq!(chat.call_count(), 0);
    }

    #[tokio::test]
    async fn negative_judge_verdict_refuses_without_generation() {
        let chat = Arc::new(ScriptedChat::new(&["NO"]));
        let p = pipeline(
            chat.clone(),
            vec![retrieved("urlopy.pdf", "Urlop wypoczynkowy wynosi 26 dni.")],
        );

        let out = p.answer("Ile dni urlopu mi przysługuje?", &[]).await.unwrap();
        assert_eq!(out, NO_KNOWLEDGE_ANSWER);
        assert_eq!(chat.call_count(), 1, "only the judge call is made");
    }

    #[tokio::test]
    async fn grounded_answer_carries_sources() {
        let chat = Arc::new(ScriptedChat::new(&["YES", "Urlop wynosi 26 dni."]));
        let p = pipeline(
            chat.clone(),
            vec![retrieved("urlopy.pdf", "Urlop wypoczynkowy wynosi 26 dni.")],
        );

        let out = p.answer("Ile dni urlopu mi przysługuje?", &[]).await.unwrap();
        assert_eq!(out, "Urlop wynosi 26 dni.\n\nŹródła:\n- urlopy.pdf");
        assert_eq!(chat.call_count(), 2);
    }

    #[tokio::test]
    async fn non_polish_input_is_turned_away_before_retrieval() {
        let chat = Arc::new(ScriptedChat::new(&[]));
        let p = pipeline(chat.clone(), vec![retrieved("a.pdf", "tekst")]);

        let out = p.answer("What is the vacation policy?", &[]).await.unwrap();
        assert_eq!(out, UNSUPPORTED_LANGUAGE_ANSWER);
        assert_eq!(chat.call_count(), 0);
    }

    #[tokio::test]
    async fn contextualize_returns_input_unchanged_for_empty_history() {
        let chat = Arc::new(ScriptedChat::new(&[]));
        let p = pipeline(chat.clone(), Vec::new());

        let out = p
            .contextualize("Ile dni urlopu mi przysługuje?", &[])
            .await
            .unwrap();
        assert_eq!(out, "Ile dni urlopu mi przysługuje?");
        assert_eq!(chat.call_count(), 0);
    }

    #[tokio::test]
    async fn contextualize_rewrites_follow_ups() {
        let chat = Arc::new(ScriptedChat::new(&[
            "Czy urlop wypoczynkowy przepada po roku?",
        ]));
        let p = pipeline(chat.clone(), Vec::new());

        let history = [
            ChatTurn::human("Ile dni urlopu mi przysługuje?"),
            ChatTurn::assistant("Przysługuje 26 dni urlopu."),
        ];
        let out = p.contextualize("A czy on przepada?", &history).await.unwrap();
        assert_eq!(out, "Czy urlop wypoczynkowy przepada po roku?");
        assert_ne!(out, "A czy on przepada?");
    }

    #[tokio::test]
    async fn recap_paraphrases_the_previous_question() {
        let chat = Arc::new(ScriptedChat::new(&["Pytałeś o wymiar urlopu."]));
        let p = pipeline(chat.clone(), Vec::new());

        let history = [
            ChatTurn::human("Ile dni urlopu mi przysługuje?"),
            ChatTurn::assistant("Przysługuje 26 dni urlopu."),
        ];
        let out = p.answer("Co pytałem wcześniej?", &history).await.unwrap();
        assert_eq!(out, "Pytałeś o wymiar urlopu.");
    }

    #[tokio::test]
    async fn recap_without_history_is_a_refusal() {
        let chat = Arc::new(ScriptedChat::new(&[]));
        let p = pipeline(chat.clone(), Vec::new());

        let out = p.answer("Co pytałem wcześniej?", &[]).await.unwrap();
        assert_eq!(out, NO_KNOWLEDGE_ANSWER);
        assert_eq!(chat.call_count(), 0);
    }

    #[tokio::test]
    async fn model_failure_propagates_instead_of_fabricating() {
        let chat = Arc::new(ScriptedChat::new(&[]));
        let p = pipeline(
            chat.clone(),
            vec![retrieved("urlopy.pdf", "Urlop wypoczynkowy wynosi 26 dni.")],
        );

        // Judge call has no scripted reply, simulating an outage.
        let err = p
            .answer("Ile dni urlopu mi przysługuje?", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ModelCall(_)));
    }
}
