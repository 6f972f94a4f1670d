use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Duration;
use tracing::warn;

use crate::entity::linking::{SearchHit, SearchProvider};
use crate::entity::types::FactBinding;
use crate::entity::typing::FactProvider;
use crate::TARGET_WEB_REQUEST;

/// Explicit timeout for search and fact requests; the underlying transport
/// default would otherwise let a hung call stall the whole batch.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Client for the Wikidata action API (lexical search) and SPARQL endpoint
/// (fact lookup). Both lookups degrade to empty results on service errors.
pub struct WikidataClient {
    client: reqwest::Client,
    api_endpoint: String,
    sparql_endpoint: String,
}

impl WikidataClient {
    pub fn new(api_endpoint: String, sparql_endpoint: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build Wikidata HTTP client")?;

        Ok(WikidataClient {
            client,
            api_endpoint,
            sparql_endpoint,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[async_trait]
impl SearchProvider for WikidataClient {
    async fn search(&self, query: &str, limit: usize, language: &str) -> Vec<SearchHit> {
        let limit = limit.to_string();
        let params = [
            ("action", "wbsearchentities"),
            ("format", "json"),
            ("language", language),
            ("search", query),
            ("limit", limit.as_str()),
        ];

        let response = match self
            .client
            .get(&self.api_endpoint)
            .query(&params)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    target: TARGET_WEB_REQUEST,
                    "Entity search for {:?} failed: {}", query, err
                );
                return Vec::new();
            }
        };

        match response.json::<SearchResponse>().await {
            Ok(parsed) => parsed.search,
            Err(err) => {
                warn!(
                    target: TARGET_WEB_REQUEST,
                    "Failed to parse entity search response for {:?}: {}", query, err
                );
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SparqlResponse {
    #[serde(default)]
    results: SparqlResults,
}

#[derive(Debug, Default, Deserialize)]
struct SparqlResults {
    #[serde(default)]
    bindings: Vec<FactBinding>,
}

fn entity_facts_query(wikidata_id: &str) -> String {
    format!(
        r#"PREFIX schema: <http://schema.org/>
PREFIX wikibase: <http://wikiba.se/ontology#>
PREFIX wd: <http://www.wikidata.org/entity/>
PREFIX wdt: <http://www.wikidata.org/prop/direct/>
SELECT ?entity ?entityLabel ?entityDescription ?instance ?coordinate ?wikipedia_url ?wdimage
WHERE {{
  VALUES (?entity) {{(wd:{wikidata_id})}}
  OPTIONAL {{ ?entity wdt:P31 ?instance . }}
  OPTIONAL {{ ?entity wdt:P625 ?coordinate . }}
  OPTIONAL {{ ?entity wdt:P18 ?wdimage . }}
  OPTIONAL {{
    ?wikipedia_url schema:about ?entity .
    ?wikipedia_url schema:inLanguage "en" .
    ?wikipedia_url schema:isPartOf <https://en.wikipedia.org/> .
  }}
  SERVICE wikibase:label {{ bd:serviceParam wikibase:language "en" . }}
}}"#
    )
}

#[async_trait]
impl FactProvider for WikidataClient {
    async fn entity_facts(&self, wikidata_id: &str) -> Vec<FactBinding> {
        let query = entity_facts_query(wikidata_id);
        let params = [("format", "json"), ("query", query.as_str())];

        let response = match self
            .client
            .get(&self.sparql_endpoint)
            .query(&params)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                // no evidence, never a batch failure
                warn!(
                    target: TARGET_WEB_REQUEST,
                    "Fact lookup for {} failed: {}", wikidata_id, err
                );
                return Vec::new();
            }
        };

        match response.json::<SparqlResponse>().await {
            Ok(parsed) => parsed.results.bindings,
            Err(err) => {
                warn!(
                    target: TARGET_WEB_REQUEST,
                    "Failed to parse fact response for {}: {}", wikidata_id, err
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facts_query_targets_the_entity() {
        let query = entity_facts_query("Q64");
        assert!(query.contains("(wd:Q64)"));
        assert!(query.contains("wdt:P31"));
        assert!(query.contains("wdt:P625"));
        assert!(query.contains("wdt:P18"));
    }

    #[test]
    fn sparql_bindings_parse_into_fact_rows() {
        let raw = r#"{
            "results": {
                "bindings": [{
                    "instance": {"type": "uri", "value": "http://www.wikidata.org/entity/Q5"},
                    "entityDescription": {"type": "literal", "value": "English mathematician"},
                    "wikipedia_url": {"type": "uri", "value": "https://en.wikipedia.org/wiki/Ada_Lovelace"}
                }]
            }
        }"#;
        let parsed: SparqlResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.results.bindings.len(), 1);
        let binding = &parsed.results.bindings[0];
        assert!(binding.asserts_human());
        assert!(!binding.has_coordinate());
        assert_eq!(
            binding.description.as_ref().map(|v| v.value.as_str()),
            Some("English mathematician")
        );
    }

    #[test]
    fn empty_search_response_parses() {
        let parsed: SearchResponse = serde_json::from_str(r#"{"search": []}"#).unwrap();
        assert!(parsed.search.is_empty());
    }
}
