use anyhow::{Context, Result};
use serde::Serialize;
use tokio::time::Duration;
use tracing::{debug, error};

use crate::entity::types::Mention;
use crate::{TARGET_PIPELINE, TARGET_WEB_REQUEST};

/// Languages the NER models are available for.
pub const SUPPORTED_LANGUAGES: [&str; 3] = ["en", "de", "pt"];

const NER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct NerRequest<'a> {
    text: &'a str,
    lang: &'a str,
}

/// Client for the external NER service producing mention spans.
pub struct NerClient {
    client: reqwest::Client,
    endpoint: String,
}

impl NerClient {
    pub fn new(endpoint: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(NER_TIMEOUT)
            .build()
            .context("failed to build NER HTTP client")?;

        Ok(NerClient { client, endpoint })
    }

    /// Mention spans for the given text, in document order.
    ///
    /// An unsupported language or a service error degrades to an empty list;
    /// the document is then processed without mentions rather than failing.
    pub async fn extract_mentions(&self, text: &str, language: &str) -> Vec<Mention> {
        if !SUPPORTED_LANGUAGES.contains(&language) {
            error!(
                target: TARGET_PIPELINE,
                "Unsupported language {}. Please use {:?}!", language, SUPPORTED_LANGUAGES
            );
            return Vec::new();
        }

        let request = NerRequest {
            text,
            lang: language,
        };

        let response = match self.client.post(&self.endpoint).json(&request).send().await {
            Ok(response) => response,
            Err(err) => {
                error!(
                    target: TARGET_WEB_REQUEST,
                    "NER request to {} failed: {}", self.endpoint, err
                );
                return Vec::new();
            }
        };

        match response.json::<Vec<Mention>>().await {
            Ok(mentions) => {
                debug!(
                    target: TARGET_WEB_REQUEST,
                    "NER service returned {} mentions",
                    mentions.len()
                );
                mentions
            }
            Err(err) => {
                error!(
                    target: TARGET_WEB_REQUEST,
                    "Failed to parse NER response: {}", err
                );
                Vec::new()
            }
        }
    }
}
