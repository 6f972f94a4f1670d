pub mod entity;
pub mod events;
pub mod logging;
pub mod ner;
pub mod pipeline;
pub mod wikidata;
pub mod wikifier;

use std::path::PathBuf;

pub const TARGET_WEB_REQUEST: &str = "web_request";
pub const TARGET_PIPELINE: &str = "pipeline";

/// Run-wide settings shared by the pipeline driver and the linking engine.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Document language for mention extraction and span annotation.
    pub language: String,
    /// Language used for the lexical-search fallback. Historically fixed to
    /// "en" independent of `language`, so it is a separate knob.
    pub search_language: String,
}
