use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, warn};

use crate::entity::types::CandidateAnnotation;
use crate::TARGET_WEB_REQUEST;

/// Maximum number of characters the annotation service processes per request.
pub const MAX_CHUNK_CHARS: usize = 20_000;

/// Fixed timeout for annotation requests.
pub const ANNOTATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Back-off applied when the service signals rate-limiting.
pub const RATE_LIMIT_DELAY: Duration = Duration::from_secs(10 * 60);

/// How rate-limited chunks are retried. The default blocks until the chunk
/// goes through, matching batch-job semantics; callers embedding the client
/// in a service can bound the attempts or shorten the delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: Option<usize>,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: Option<usize>, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: None,
            delay: RATE_LIMIT_DELAY,
        }
    }
}

/// Wire response of the annotate endpoint. A response without an
/// `annotations` array means the request was not processed (rate-limited).
#[derive(Debug, Default, Deserialize)]
pub struct AnnotationResponse {
    #[serde(default)]
    pub annotations: Option<Vec<CandidateAnnotation>>,
}

/// Result of annotating one chunk of text.
#[derive(Debug, Default)]
pub struct AnnotationOutcome {
    pub processed: bool,
    pub annotations: Vec<CandidateAnnotation>,
}

/// Client for the Wikifier span-annotation service.
pub struct WikifierClient {
    client: reqwest::Client,
    endpoint: String,
    user_key: String,
    retry: RetryPolicy,
}

impl WikifierClient {
    pub fn new(endpoint: String, user_key: String, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(ANNOTATION_TIMEOUT)
            .build()
            .context("failed to build annotation HTTP client")?;

        Ok(WikifierClient {
            client,
            endpoint,
            user_key,
            retry,
        })
    }

    /// Annotate a full document, chunking it to the service's maximum length
    /// and aggregating the results.
    ///
    /// Character offsets arrive from the service per chunk and are passed
    /// through untouched. Rate-limited chunks are retried under the client's
    /// retry policy before moving on.
    pub async fn annotate(&self, text: &str, language: &str) -> Vec<CandidateAnnotation> {
        let mut annotations = Vec::new();

        for (index, chunk) in chunk_text(text, MAX_CHUNK_CHARS).into_iter().enumerate() {
            let mut attempts = 0;
            loop {
                let outcome = self.annotate_chunk(chunk, language).await;
                if outcome.processed {
                    debug!(
                        target: TARGET_WEB_REQUEST,
                        "Chunk {} produced {} annotations",
                        index,
                        outcome.annotations.len()
                    );
                    annotations.extend(outcome.annotations);
                    break;
                }

                attempts += 1;
                if let Some(max) = self.retry.max_attempts {
                    if attempts >= max {
                        warn!(
                            target: TARGET_WEB_REQUEST,
                            "Giving up on chunk {} after {} attempts", index, attempts
                        );
                        break;
                    }
                }

                warn!(
                    target: TARGET_WEB_REQUEST,
                    "Annotation service rate limited, sleeping for {:?}", self.retry.delay
                );
                sleep(self.retry.delay).await;
            }
        }

        annotations
    }

    /// One service call for one chunk. Transport errors and malformed
    /// responses are reported as not-processed so the retry policy applies.
    pub async fn annotate_chunk(&self, text: &str, language: &str) -> AnnotationOutcome {
        let form = [
            ("text", text),
            ("lang", language),
            ("userKey", self.user_key.as_str()),
            ("pageRankSqThreshold", "1"),
            ("applyPageRankSqThreshold", "true"),
            ("nTopDfValuesToIgnore", "200"),
            ("nWordsToIgnoreFromList", "200"),
            ("wikiDataClasses", "false"),
            ("wikiDataClassIds", "true"),
            ("support", "true"),
            ("ranges", "false"),
            ("includeCosines", "false"),
            ("maxMentionEntropy", "3"),
        ];

        let response = match self.client.post(&self.endpoint).form(&form).send().await {
            Ok(response) => response,
            Err(err) => {
                error!(
                    target: TARGET_WEB_REQUEST,
                    "Annotation request to {} failed: {}", self.endpoint, err
                );
                return AnnotationOutcome::default();
            }
        };

        match response.json::<AnnotationResponse>().await {
            Ok(AnnotationResponse {
                annotations: Some(annotations),
            }) => AnnotationOutcome {
                processed: true,
                annotations,
            },
            Ok(_) => {
                error!(
                    target: TARGET_WEB_REQUEST,
                    "No valid annotation response from {}", self.endpoint
                );
                AnnotationOutcome::default()
            }
            Err(err) => {
                error!(
                    target: TARGET_WEB_REQUEST,
                    "Failed to parse annotation response: {}", err
                );
                AnnotationOutcome::default()
            }
        }
    }
}

/// Split text into consecutive, non-overlapping chunks of at most `max_chars`
/// characters; the last chunk may be shorter. Splits on char boundaries.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut chars = 0;
    for (idx, _) in text.char_indices() {
        if chars == max_chars {
            chunks.push(&text[start..idx]);
            start = idx;
            chars = 0;
        }
        chars += 1;
    }
    chunks.push(&text[start..]);
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_text_is_split_into_three_chunks() {
        let text = "a".repeat(45_000);
        let chunks = chunk_text(&text, MAX_CHUNK_CHARS);
        let lengths: Vec<usize> = chunks.iter().map(|c| c.chars().count()).collect();
        assert_eq!(lengths, vec![20_000, 20_000, 5_000]);
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        let text = "a".repeat(40_000);
        let chunks = chunk_text(&text, MAX_CHUNK_CHARS);
        let lengths: Vec<usize> = chunks.iter().map(|c| c.chars().count()).collect();
        assert_eq!(lengths, vec![20_000, 20_000]);
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = chunk_text("short text", MAX_CHUNK_CHARS);
        assert_eq!(chunks, vec!["short text"]);
    }

    #[test]
    fn empty_text_produces_no_chunks() {
        assert!(chunk_text("", MAX_CHUNK_CHARS).is_empty());
    }

    #[test]
    fn chunks_respect_char_boundaries() {
        // two-byte characters must not be split mid-encoding
        let text = "ä".repeat(5);
        let chunks = chunk_text(&text, 2);
        assert_eq!(chunks, vec!["ää", "ää", "ä"]);
    }

    #[test]
    fn response_with_annotations_is_processed() {
        let raw = r#"{
            "annotations": [{
                "title": "Berlin",
                "secTitle": "Berlin",
                "wikiDataItemId": "Q64",
                "support": [{"chFrom": 0, "chTo": 6, "pageRank": 0.42}]
            }]
        }"#;
        let parsed: AnnotationResponse = serde_json::from_str(raw).unwrap();
        let annotations = parsed.annotations.expect("processed response");
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].wikidata_id.as_deref(), Some("Q64"));
        assert_eq!(annotations[0].occurrences[0].char_to, 6);
        assert!((annotations[0].occurrences[0].confidence - 0.42).abs() < f64::EPSILON);
    }

    #[test]
    fn error_response_is_not_processed() {
        let parsed: AnnotationResponse =
            serde_json::from_str(r#"{"status": "error", "message": "too many requests"}"#).unwrap();
        assert!(parsed.annotations.is_none());
    }

    #[test]
    fn default_retry_policy_blocks_unbounded() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, None);
        assert_eq!(policy.delay, RATE_LIMIT_DELAY);
    }
}
