use anyhow::Result;
use clap::Parser;
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

use gazetteer::events::EventRegistry;
use gazetteer::ner::NerClient;
use gazetteer::pipeline::Pipeline;
use gazetteer::wikidata::WikidataClient;
use gazetteer::wikifier::{RetryPolicy, WikifierClient};
use gazetteer::{logging, PipelineConfig, TARGET_PIPELINE};

/// Link named-entity mentions to Wikidata items and classify them by
/// semantic type, one document batch at a time.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory containing input document files
    #[arg(short, long, default_value = "input_dir")]
    input_dir: PathBuf,

    /// Directory for processed output and the checkpoint file
    #[arg(short, long, default_value = "output_dir")]
    output_dir: PathBuf,

    /// Document language (en, de or pt)
    #[arg(short, long, default_value = "en")]
    language: String,

    /// CSV file listing known event identifiers in its first column
    #[arg(short, long, default_value = "event_kg.csv")]
    event_registry: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::configure_logging();

    let cli = Cli::parse();

    info!(target: TARGET_PIPELINE, "Input dir: {}", cli.input_dir.display());
    info!(target: TARGET_PIPELINE, "Output dir: {}", cli.output_dir.display());
    info!(target: TARGET_PIPELINE, "Language: {}", cli.language);

    let ner_url = env::var("NER_URL").unwrap_or_else(|_| "http://localhost:8000/ner".to_string());
    let wikifier_url = env::var("WIKIFIER_URL")
        .unwrap_or_else(|_| "http://www.wikifier.org/annotate-article".to_string());
    let wikifier_key = env::var("WIKIFIER_KEY").unwrap_or_default();
    if wikifier_key.is_empty() {
        warn!(
            target: TARGET_PIPELINE,
            "WIKIFIER_KEY is not set; annotation requests will likely be rejected"
        );
    }
    let wikidata_api_url = env::var("WIKIDATA_API_URL")
        .unwrap_or_else(|_| "https://www.wikidata.org/w/api.php".to_string());
    let wikidata_sparql_url = env::var("WIKIDATA_SPARQL_URL")
        .unwrap_or_else(|_| "https://query.wikidata.org/sparql".to_string());
    // lexical-search fallback historically queries in English regardless of
    // the document language
    let search_language = env::var("SEARCH_LANGUAGE").unwrap_or_else(|_| "en".to_string());

    let registry = EventRegistry::load(&cli.event_registry)?;

    let ner = NerClient::new(ner_url)?;
    let wikifier = WikifierClient::new(wikifier_url, wikifier_key, RetryPolicy::default())?;
    let wikidata = WikidataClient::new(wikidata_api_url, wikidata_sparql_url)?;

    let config = PipelineConfig {
        input_dir: cli.input_dir,
        output_dir: cli.output_dir,
        language: cli.language,
        search_language,
    };

    let pipeline = Pipeline {
        ner: &ner,
        wikifier: &wikifier,
        search: &wikidata,
        facts: &wikidata,
        registry: &registry,
        config: &config,
    };

    pipeline.run().await
}
