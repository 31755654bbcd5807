//! Chat orchestration: retrieve → rank → prompt → stream.
//!
//! One request is one pass through the pipeline. Retrieval and ranking run
//! before anything is emitted, so their failures abort the request cleanly;
//! once the reference list has gone out, every exit path still delivers a
//! terminal `StreamEnd` so the client-side parser never hangs.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use super::prompt::build_prompt;
use super::ranker::rank_articles;
use crate::embedding::Embedder;
use crate::errors::ApiError;
use crate::llm::{ChatProvider, Fragment};
use crate::pubmed::{Article, DocumentSource};

/// Citation entry sent to the client before the answer starts streaming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub pmid: String,
    pub title: String,
}

/// Outbound event, in emission order: exactly one `References`, any number
/// of `Answer` fragments, exactly one `StreamEnd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    References(Vec<Reference>),
    Answer(String),
    StreamEnd,
}

/// Non-streaming answer with its citation list.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub answer: String,
    pub references: Vec<Reference>,
}

#[derive(Clone)]
pub struct RagEngine {
    source: Arc<dyn DocumentSource>,
    embedder: Arc<dyn Embedder>,
    provider: Arc<dyn ChatProvider>,
    top_k: usize,
}

impl RagEngine {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        embedder: Arc<dyn Embedder>,
        provider: Arc<dyn ChatProvider>,
        top_k: usize,
    ) -> Self {
        Self {
            source,
            embedder,
            provider,
            top_k,
        }
    }

    /// Single-shot question answering for the non-streaming endpoint.
    pub async fn answer(&self, question: &str) -> Result<AnswerResult, ApiError> {
        let articles = self.source.search(question).await?;
        let top = rank_articles(self.embedder.as_ref(), question, articles, self.top_k).await?;
        let prompt = build_prompt(question, &top);
        let answer = self.provider.ask(&prompt).await?;

        Ok(AnswerResult {
            answer,
            references: references_of(&top),
        })
    }

    /// Streaming question answering.
    ///
    /// Errors before the first event (retrieval, ranking) surface as `Err`;
    /// the caller turns that into a plain HTTP error and no stream starts.
    /// After that the receiver yields `References` first, then `Answer`
    /// fragments verbatim in upstream order, then one `StreamEnd`, also when
    /// the upstream stream breaks off without a done marker. Dropping the
    /// receiver cancels upstream consumption.
    pub async fn stream_question(
        &self,
        question: &str,
    ) -> Result<mpsc::Receiver<ChatEvent>, ApiError> {
        let articles = self.source.search(question).await?;
        let top = rank_articles(self.embedder.as_ref(), question, articles, self.top_k).await?;

        let references = references_of(&top);
        let prompt = build_prompt(question, &top);
        let provider = self.provider.clone();

        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            if tx.send(ChatEvent::References(references)).await.is_err() {
                return;
            }

            let mut fragments = match provider.stream_chat(&prompt).await {
                Ok(fragments) => fragments,
                Err(err) => {
                    // References already went out; close the stream properly
                    // instead of leaving the client waiting.
                    tracing::warn!("{} stream failed to start: {}", provider.name(), err);
                    let _ = tx.send(ChatEvent::StreamEnd).await;
                    return;
                }
            };

            while let Some(fragment) = fragments.recv().await {
                match fragment {
                    Fragment::Content(text) => {
                        if tx.send(ChatEvent::Answer(text)).await.is_err() {
                            // Client went away; stop pulling from upstream.
                            return;
                        }
                    }
                    Fragment::Done => break,
                }
            }

            let _ = tx.send(ChatEvent::StreamEnd).await;
        });

        Ok(rx)
    }
}

fn references_of(articles: &[Article]) -> Vec<Reference> {
    articles
        .iter()
        .map(|article| Reference {
            pmid: article.pmid.clone(),
            title: article.title.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn article(pmid: &str, title: &str) -> Article {
        Article {
            pmid: pmid.to_string(),
            title: title.to_string(),
            abstract_text: String::new(),
            authors: Vec::new(),
        }
    }

    struct FixedSource {
        articles: Result<Vec<Article>, String>,
    }

    #[async_trait]
    impl DocumentSource for FixedSource {
        async fn search(&self, _query: &str) -> Result<Vec<Article>, ApiError> {
            match &self.articles {
                Ok(articles) => Ok(articles.clone()),
                Err(msg) => Err(ApiError::Upstream(msg.clone())),
            }
        }
    }

    struct FixedEmbedder {
        vectors: Vec<Vec<f32>>,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            assert_eq!(inputs.len(), self.vectors.len());
            Ok(self.vectors.clone())
        }
    }

    /// Streams a fixed fragment sequence; optionally withholds `Done` to
    /// simulate an upstream connection dropping mid-answer.
    struct ScriptedProvider {
        fragments: Vec<String>,
        send_done: bool,
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn ask(&self, _prompt: &str) -> Result<String, ApiError> {
            Ok(self.fragments.concat())
        }

        async fn stream_chat(&self, _prompt: &str) -> Result<mpsc::Receiver<Fragment>, ApiError> {
            let (tx, rx) = mpsc::channel(32);
            let fragments = self.fragments.clone();
            let send_done = self.send_done;
            tokio::spawn(async move {
                for fragment in fragments {
                    if tx.send(Fragment::Content(fragment)).await.is_err() {
                        return;
                    }
                }
                if send_done {
                    let _ = tx.send(Fragment::Done).await;
                }
            });
            Ok(rx)
        }
    }

    /// Produces fragments forever, counting each delivered one. Used to
    /// observe whether upstream consumption actually stops.
    struct EndlessProvider {
        delivered: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChatProvider for EndlessProvider {
        fn name(&self) -> &str {
            "endless"
        }

        async fn ask(&self, _prompt: &str) -> Result<String, ApiError> {
            Ok(String::new())
        }

        async fn stream_chat(&self, _prompt: &str) -> Result<mpsc::Receiver<Fragment>, ApiError> {
            let (tx, rx) = mpsc::channel(32);
            let delivered = self.delivered.clone();
            tokio::spawn(async move {
                loop {
                    if tx.send(Fragment::Content("x".to_string())).await.is_err() {
                        return;
                    }
                    delivered.fetch_add(1, Ordering::SeqCst);
                }
            });
            Ok(rx)
        }
    }

    /// Fails every call; models the completions endpoint rejecting the
    /// request after retrieval already succeeded.
    struct FailingProvider;

    #[async_trait]
    impl ChatProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn ask(&self, _prompt: &str) -> Result<String, ApiError> {
            Err(ApiError::Upstream("completions unavailable".to_string()))
        }

        async fn stream_chat(&self, _prompt: &str) -> Result<mpsc::Receiver<Fragment>, ApiError> {
            Err(ApiError::Upstream("completions unavailable".to_string()))
        }
    }

    /// Unit vector whose cosine against [1, 0] equals `score`.
    fn vector_for_score(score: f32) -> Vec<f32> {
        vec![score, (1.0 - score * score).sqrt()]
    }

    fn engine(
        articles: Result<Vec<Article>, String>,
        vectors: Vec<Vec<f32>>,
        fragments: Vec<&str>,
        send_done: bool,
        top_k: usize,
    ) -> RagEngine {
        RagEngine::new(
            Arc::new(FixedSource { articles }),
            Arc::new(FixedEmbedder { vectors }),
            Arc::new(ScriptedProvider {
                fragments: fragments.into_iter().map(String::from).collect(),
                send_done,
            }),
            top_k,
        )
    }

    async fn collect(mut rx: mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn full_pipeline_emits_references_then_answers_then_end() {
        let articles = vec![article("1", "A"), article("2", "B"), article("3", "C")];
        let vectors = vec![
            vec![1.0, 0.0], // question
            vector_for_score(0.9),
            vector_for_score(0.95),
            vector_for_score(0.2),
        ];
        let engine = engine(Ok(articles), vectors, vec!["二甲双胍", "是一线用药"], true, 2);

        let events = collect(engine.stream_question("treatment for diabetes").await.expect("stream"))
            .await;

        assert_eq!(
            events,
            vec![
                ChatEvent::References(vec![
                    Reference {
                        pmid: "2".to_string(),
                        title: "B".to_string()
                    },
                    Reference {
                        pmid: "1".to_string(),
                        title: "A".to_string()
                    },
                ]),
                ChatEvent::Answer("二甲双胍".to_string()),
                ChatEvent::Answer("是一线用药".to_string()),
                ChatEvent::StreamEnd,
            ]
        );
    }

    #[tokio::test]
    async fn retrieval_failure_aborts_before_any_event() {
        let engine = engine(Err("pubmed down".to_string()), vec![], vec![], true, 2);

        let result = engine.stream_question("q").await;

        assert!(matches!(result, Err(ApiError::Upstream(_))));
    }

    #[tokio::test]
    async fn upstream_drop_without_done_still_terminates_the_stream() {
        let articles = vec![article("1", "A")];
        let vectors = vec![vec![1.0, 0.0], vec![0.8, 0.6]];
        let engine = engine(Ok(articles), vectors, vec!["partial"], false, 5);

        let events = collect(engine.stream_question("q").await.expect("stream")).await;

        assert_eq!(events.last(), Some(&ChatEvent::StreamEnd));
        assert!(events.contains(&ChatEvent::Answer("partial".to_string())));
    }

    #[tokio::test]
    async fn dropped_receiver_stops_upstream_consumption() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let engine = RagEngine::new(
            Arc::new(FixedSource {
                articles: Ok(vec![article("1", "A")]),
            }),
            Arc::new(FixedEmbedder {
                vectors: vec![vec![1.0, 0.0], vec![0.8, 0.6]],
            }),
            Arc::new(EndlessProvider {
                delivered: delivered.clone(),
            }),
            5,
        );

        let mut rx = engine.stream_question("q").await.expect("stream");
        assert!(matches!(rx.recv().await, Some(ChatEvent::References(_))));
        assert!(matches!(rx.recv().await, Some(ChatEvent::Answer(_))));
        drop(rx);

        // After the client goes away the relay drains at most the channel
        // slack, then every send fails and the provider task exits.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let settled = delivered.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), settled);
    }

    #[tokio::test]
    async fn provider_start_failure_still_closes_the_stream() {
        let engine = RagEngine::new(
            Arc::new(FixedSource {
                articles: Ok(vec![article("1", "A")]),
            }),
            Arc::new(FixedEmbedder {
                vectors: vec![vec![1.0, 0.0], vec![0.8, 0.6]],
            }),
            Arc::new(FailingProvider),
            5,
        );

        let events = collect(engine.stream_question("q").await.expect("stream")).await;

        assert_eq!(
            events,
            vec![
                ChatEvent::References(vec![Reference {
                    pmid: "1".to_string(),
                    title: "A".to_string()
                }]),
                ChatEvent::StreamEnd,
            ]
        );
    }

    #[tokio::test]
    async fn empty_retrieval_still_streams_with_empty_references() {
        let engine = engine(Ok(Vec::new()), vec![], vec!["没有文献"], true, 10);

        let events = collect(engine.stream_question("q").await.expect("stream")).await;

        assert_eq!(events[0], ChatEvent::References(Vec::new()));
        assert_eq!(events.last(), Some(&ChatEvent::StreamEnd));
    }

    #[tokio::test]
    async fn non_streaming_answer_carries_ranked_references() {
        let articles = vec![article("1", "A"), article("2", "B")];
        let vectors = vec![vec![1.0, 0.0], vector_for_score(0.3), vector_for_score(0.8)];
        let engine = engine(Ok(articles), vectors, vec!["答案"], true, 10);

        let result = engine.answer("q").await.expect("answer");

        assert_eq!(result.answer, "答案");
        let pmids: Vec<&str> = result.references.iter().map(|r| r.pmid.as_str()).collect();
        assert_eq!(pmids, vec!["2", "1"]);
    }
}
