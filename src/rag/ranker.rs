//! Embedding-similarity ranking of retrieved articles.

use std::cmp::Ordering;

use crate::embedding::Embedder;
use crate::errors::ApiError;
use crate::pubmed::Article;

/// Ranks `articles` against `question` and returns the `top_k` best matches,
/// highest similarity first.
///
/// The whole batch (question plus one "title abstract" text per article)
/// goes through a single embedding call. Empty input returns immediately
/// without touching the embedder. Ties keep their original retrieval order
/// (stable sort), and a zero-norm embedding scores as the minimum possible
/// similarity so the article sorts last instead of failing the request.
pub async fn rank_articles(
    embedder: &dyn Embedder,
    question: &str,
    articles: Vec<Article>,
    top_k: usize,
) -> Result<Vec<Article>, ApiError> {
    if articles.is_empty() {
        return Ok(Vec::new());
    }

    let mut inputs = Vec::with_capacity(articles.len() + 1);
    inputs.push(question.to_string());
    for article in &articles {
        inputs.push(format!("{} {}", article.title, article.abstract_text));
    }

    let vectors = embedder.embed(&inputs).await?;
    if vectors.len() != inputs.len() {
        return Err(ApiError::Upstream(format!(
            "Embedding batch mismatch: sent {}, received {}",
            inputs.len(),
            vectors.len()
        )));
    }

    let (question_vec, article_vecs) = vectors.split_first().expect("non-empty batch");

    let mut scored: Vec<(f32, Article)> = article_vecs
        .iter()
        .zip(articles)
        .map(|(vec, article)| (cosine_similarity(question_vec, vec), article))
        .collect();

    // Stable descending sort: equal scores preserve retrieval order.
    scored.sort_by(|left, right| right.0.partial_cmp(&left.0).unwrap_or(Ordering::Equal));
    scored.truncate(top_k);

    Ok(scored.into_iter().map(|(_, article)| article).collect())
}

/// Cosine similarity of two vectors. A zero-norm operand makes the measure
/// undefined; that case yields `NEG_INFINITY` so it ranks below any real
/// score (which can be negative). The same floor applies to any non-finite
/// result (NaN or infinity from degenerate embeddings), keeping the sort
/// comparator total in practice and the ordering deterministic.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return f32::NEG_INFINITY;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        return f32::NEG_INFINITY;
    }

    let score = dot / denom;
    if score.is_finite() {
        score
    } else {
        f32::NEG_INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn article(pmid: &str, title: &str) -> Article {
        Article {
            pmid: pmid.to_string(),
            title: title.to_string(),
            abstract_text: String::new(),
            authors: Vec::new(),
        }
    }

    /// Returns canned vectors in input order: the first for the question,
    /// then one per article. Counts embed calls.
    struct FixedEmbedder {
        vectors: Vec<Vec<f32>>,
        calls: AtomicUsize,
    }

    impl FixedEmbedder {
        fn new(vectors: Vec<Vec<f32>>) -> Self {
            Self {
                vectors,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(AtomicOrdering::SeqCst)
        }
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            assert_eq!(inputs.len(), self.vectors.len());
            Ok(self.vectors.clone())
        }
    }

    #[test]
    fn cosine_is_one_for_identical_vectors() {
        let vec = [1.0, 2.0, 3.0];
        assert!((cosine_similarity(&vec, &vec) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_of_zero_vector_is_minimum() {
        assert_eq!(
            cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]),
            f32::NEG_INFINITY
        );
    }

    #[test]
    fn non_finite_scores_floor_to_minimum() {
        // A NaN component poisons the dot product.
        assert_eq!(
            cosine_similarity(&[f32::NAN, 1.0], &[1.0, 0.0]),
            f32::NEG_INFINITY
        );
        // Overflowing norms make the quotient inf/inf = NaN.
        assert_eq!(
            cosine_similarity(&[f32::MAX, f32::MAX], &[f32::MAX, f32::MAX]),
            f32::NEG_INFINITY
        );
    }

    #[tokio::test]
    async fn empty_input_returns_empty_without_embedding_calls() {
        let embedder = FixedEmbedder::new(vec![]);

        let ranked = rank_articles(&embedder, "anything", Vec::new(), 5)
            .await
            .expect("rank");

        assert!(ranked.is_empty());
        assert_eq!(embedder.call_count(), 0);
    }

    #[tokio::test]
    async fn ranks_descending_with_single_batch_call() {
        let embedder = FixedEmbedder::new(vec![
            vec![1.0, 0.0], // question
            vec![0.2, 0.98],
            vec![0.9, 0.44],
            vec![0.5, 0.87],
        ]);
        let articles = vec![article("1", "a"), article("2", "b"), article("3", "c")];

        let ranked = rank_articles(&embedder, "q", articles, 10).await.expect("rank");

        let pmids: Vec<&str> = ranked.iter().map(|a| a.pmid.as_str()).collect();
        assert_eq!(pmids, vec!["2", "3", "1"]);
        assert_eq!(embedder.call_count(), 1);
    }

    #[tokio::test]
    async fn ties_preserve_retrieval_order() {
        let embedder = FixedEmbedder::new(vec![
            vec![1.0, 0.0], // question
            vec![0.5, 0.5],
            vec![0.5, 0.5],
            vec![1.0, 0.0],
        ]);
        let articles = vec![
            article("first", "a"),
            article("second", "b"),
            article("best", "c"),
        ];

        let ranked = rank_articles(&embedder, "q", articles, 10).await.expect("rank");

        let pmids: Vec<&str> = ranked.iter().map(|a| a.pmid.as_str()).collect();
        assert_eq!(pmids, vec!["best", "first", "second"]);
    }

    #[tokio::test]
    async fn truncates_to_top_k() {
        let embedder = FixedEmbedder::new(vec![
            vec![1.0, 0.0],
            vec![0.9, 0.1],
            vec![0.8, 0.2],
            vec![0.7, 0.3],
        ]);
        let articles = vec![article("1", "a"), article("2", "b"), article("3", "c")];

        let ranked = rank_articles(&embedder, "q", articles.clone(), 2)
            .await
            .expect("rank");
        assert_eq!(ranked.len(), 2);

        let embedder = FixedEmbedder::new(vec![
            vec![1.0, 0.0],
            vec![0.9, 0.1],
            vec![0.8, 0.2],
            vec![0.7, 0.3],
        ]);
        let ranked = rank_articles(&embedder, "q", articles, 100)
            .await
            .expect("rank");
        assert_eq!(ranked.len(), 3);
    }

    #[tokio::test]
    async fn zero_norm_embedding_sorts_last_instead_of_failing() {
        let embedder = FixedEmbedder::new(vec![
            vec![1.0, 0.0], // question
            vec![0.0, 0.0], // degenerate
            vec![0.9, 0.44],
        ]);
        let articles = vec![article("degenerate", "a"), article("normal", "b")];

        let ranked = rank_articles(&embedder, "q", articles, 10).await.expect("rank");

        let pmids: Vec<&str> = ranked.iter().map(|a| a.pmid.as_str()).collect();
        assert_eq!(pmids, vec!["normal", "degenerate"]);
    }
}
