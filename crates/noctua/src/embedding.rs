//! Embedding generation.
//!
//! One [`Embedder`] instance serves both the ingest and query paths of a
//! pipeline, so index-time and query-time encodings never drift. Vectors
//! are returned as raw model output; L2 normalization is the index's
//! responsibility.

use async_trait::async_trait;
use noctua_core::{Error, Result};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

/// Maps text to fixed-dimension `f32` vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a batch of texts, one vector per input, in input order.
    ///
    /// An empty batch returns an empty vector sequence, not an error.
    /// Backend failures surface as [`Error::Upstream`] and are not retried.
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embeds a single text (the query path).
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text]).await?;
        match vectors.pop() {
            Some(vector) if vectors.is_empty() => Ok(vector),
            _ => Err(Error::upstream("backend did not return exactly one embedding")),
        }
    }

    /// Output vector length, fixed by the model at construction.
    fn dimension(&self) -> usize;

    /// Identifier of the backing model.
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible `/v1/embeddings` backend.
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
    api_key: Option<Secret<String>>,
}

impl HttpEmbedder {
    /// Creates an embedder against the default OpenAI endpoint.
    #[must_use]
    pub fn new(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://api.openai.com".to_string(),
            model: model.into(),
            dimension,
            api_key: None,
        }
    }

    /// Points the embedder at a different OpenAI-compatible endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the bearer token sent with every request.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(Secret::new(api_key.into()));
        self
    }
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .json(&EmbeddingsRequest {
                model: &self.model,
                input: texts,
            });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::upstream(format!("embedding request failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::upstream(format!("embedding request rejected: {e}")))?;

        let body: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| Error::upstream(format!("malformed embedding response: {e}")))?;

        if body.data.len() != texts.len() {
            return Err(Error::upstream(format!(
                "embedding count mismatch: sent {}, received {}",
                texts.len(),
                body.data.len()
            )));
        }

        tracing::debug!(count = texts.len(), model = %self.model, "embedded batch");
        Ok(body.data.into_iter().map(|row| row.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Deterministic offline embedder: a hashed bag-of-words projection.
///
/// The same text always maps to the same vector, and texts sharing tokens
/// land in overlapping buckets, giving them positive cosine similarity.
/// Useful for tests and for running the pipeline without a model endpoint.
#[derive(Debug)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Creates a hash embedder with the given output dimension.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `dimension` is zero; every bucket
    /// computation divides by it.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::validation("embedding dimension must be positive"));
        }
        Ok(Self { dimension })
    }

    /// FNV-1a bucket for a token.
    fn bucket(&self, token: &str) -> usize {
        let mut hash = 0xcbf2_9ce4_8422_2325u64;
        for byte in token.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        (hash % self.dimension as u64) as usize
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; self.dimension];
                for token in text
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|t| !t.is_empty())
                {
                    vector[self.bucket(&token.to_lowercase())] += 1.0;
                }
                vector
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "hash-bow"
    }
}

/// Computes cosine similarity between two vectors, `[-1, 1]`.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 1e-10 && norm_b > 1e-10 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

/// Computes the dot product of two equal-length vectors.
#[must_use]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Serves exactly one HTTP exchange on a loopback port, then exits.
    async fn one_shot_server(response: String) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        addr
    }

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    #[tokio::test]
    async fn hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(64).unwrap();
        let first = embedder.embed(&["hello world"]).await.unwrap();
        let second = embedder.embed(&["hello world"]).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0].len(), 64);
    }

    #[tokio::test]
    async fn empty_batch_returns_empty() {
        let embedder = HashEmbedder::new(64).unwrap();
        assert!(embedder.embed(&[]).await.unwrap().is_empty());

        let http = HttpEmbedder::new("text-embedding-3-small", 1536);
        assert!(http.embed(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn shared_tokens_give_positive_similarity() {
        let embedder = HashEmbedder::new(128).unwrap();
        let vectors = embedder
            .embed(&["the sky is blue", "what color is the sky"])
            .await
            .unwrap();

        assert!(cosine_similarity(&vectors[0], &vectors[1]) > 0.0);
    }

    #[tokio::test]
    async fn embed_one_returns_single_vector() {
        let embedder = HashEmbedder::new(32).unwrap();
        let vector = embedder.embed_one("query text").await.unwrap();
        assert_eq!(vector.len(), 32);
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let err = HashEmbedder::new(0).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn request_body_matches_openai_wire_shape() {
        let request = EmbeddingsRequest {
            model: "text-embedding-3-small",
            input: &["first", "second"],
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "model": "text-embedding-3-small",
                "input": ["first", "second"],
            })
        );
    }

    #[test]
    fn response_parsing_ignores_extra_fields() {
        let body: EmbeddingsResponse = serde_json::from_str(
            r#"{
                "object": "list",
                "data": [
                    {"object": "embedding", "index": 0, "embedding": [0.5, -0.5]}
                ],
                "model": "text-embedding-3-small",
                "usage": {"prompt_tokens": 2, "total_tokens": 2}
            }"#,
        )
        .unwrap();

        assert_eq!(body.data.len(), 1);
        assert_eq!(body.data[0].embedding, vec![0.5, -0.5]);
    }

    #[tokio::test]
    async fn short_response_is_a_count_mismatch() {
        let body = r#"{"data":[{"embedding":[0.1,0.2]}]}"#;
        let addr = one_shot_server(http_response("200 OK", body)).await;

        let embedder =
            HttpEmbedder::new("test-model", 2).with_base_url(format!("http://{addr}"));
        let err = embedder.embed(&["one", "two"]).await.unwrap_err();

        assert!(matches!(err, Error::Upstream { .. }));
        assert!(err.to_string().contains("mismatch"));
    }

    #[tokio::test]
    async fn http_error_status_maps_to_upstream() {
        let body = r#"{"error":{"message":"bad key"}}"#;
        let addr = one_shot_server(http_response("401 Unauthorized", body)).await;

        let embedder =
            HttpEmbedder::new("test-model", 2).with_base_url(format!("http://{addr}"));
        let err = embedder.embed(&["one"]).await.unwrap_err();

        assert!(matches!(err, Error::Upstream { .. }));
        assert!(err.to_string().contains("rejected"));
    }

    #[tokio::test]
    async fn successful_response_preserves_batch_order() {
        let body = r#"{"data":[{"embedding":[1.0,0.0]},{"embedding":[0.0,1.0]}]}"#;
        let addr = one_shot_server(http_response("200 OK", body)).await;

        let embedder =
            HttpEmbedder::new("test-model", 2).with_base_url(format!("http://{addr}"));
        let vectors = embedder.embed(&["one", "two"]).await.unwrap();

        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn cosine_similarity_is_symmetric_at_extremes() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);

        let orthogonal = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &orthogonal).abs() < 1e-6);

        let opposite = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &opposite) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn dot_product_matches_by_hand() {
        assert!((dot_product(&[1.0, 2.0], &[3.0, 4.0]) - 11.0).abs() < 1e-6);
        assert_eq!(dot_product(&[1.0], &[1.0, 2.0]), 0.0);
    }
}
