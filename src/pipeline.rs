use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::entity::linking::{link_entities, SearchProvider};
use crate::entity::types::{CandidateAnnotation, Mention, TypedEntity};
use crate::entity::typing::{resolve_types, EntityFactsCache, FactProvider};
use crate::events::EventRegistry;
use crate::ner::NerClient;
use crate::wikifier::WikifierClient;
use crate::{PipelineConfig, TARGET_PIPELINE};

/// Name of the checkpoint file kept next to the output documents.
pub const CHECKPOINT_FILE: &str = "checkpoint.txt";

/// One document inside an input file: `doc_id -> {info: {body}}`.
#[derive(Debug, Deserialize)]
struct DocumentRecord {
    info: DocumentInfo,
}

#[derive(Debug, Deserialize)]
struct DocumentInfo {
    body: String,
}

/// Persisted result for one document.
#[derive(Debug, Serialize)]
struct DocumentOutput {
    text: String,
    entities: Vec<TypedEntity>,
    mentions: Vec<Mention>,
    annotations: Vec<CandidateAnnotation>,
}

/// Newline-delimited list of already-processed input files.
///
/// A file name is appended only after its output has been fully written, so
/// a crash mid-file causes safe reprocessing on restart.
pub struct Checkpoint {
    path: PathBuf,
    processed: Vec<String>,
}

impl Checkpoint {
    /// A missing checkpoint file means no documents are processed yet.
    pub fn load(path: PathBuf) -> Self {
        let processed = match fs::read_to_string(&path) {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => Vec::new(),
        };
        Checkpoint { path, processed }
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.processed.iter().any(|f| f == file_name)
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    pub fn mark_processed(&mut self, file_name: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open checkpoint {}", self.path.display()))?;
        writeln!(file, "{}", file_name)
            .with_context(|| format!("failed to append to checkpoint {}", self.path.display()))?;
        self.processed.push(file_name.to_string());
        Ok(())
    }
}

/// Input files still to be processed, in stable order.
pub fn pending_files<'a>(files: &'a [String], checkpoint: &Checkpoint) -> Vec<&'a str> {
    files
        .iter()
        .map(String::as_str)
        .filter(|f| !checkpoint.contains(f))
        .collect()
}

fn input_files(dir: &Path) -> Result<Vec<String>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read input dir {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    files.sort();
    Ok(files)
}

/// Sequential batch driver: one document at a time, checkpoint after each
/// fully written output file.
pub struct Pipeline<'a, S: SearchProvider, F: FactProvider> {
    pub ner: &'a NerClient,
    pub wikifier: &'a WikifierClient,
    pub search: &'a S,
    pub facts: &'a F,
    pub registry: &'a EventRegistry,
    pub config: &'a PipelineConfig,
}

impl<'a, S: SearchProvider, F: FactProvider> Pipeline<'a, S, F> {
    pub async fn run(&self) -> Result<()> {
        fs::create_dir_all(&self.config.output_dir).with_context(|| {
            format!(
                "failed to create output dir {}",
                self.config.output_dir.display()
            )
        })?;

        let mut checkpoint = Checkpoint::load(self.config.output_dir.join(CHECKPOINT_FILE));
        let files = input_files(&self.config.input_dir)?;

        info!(target: TARGET_PIPELINE, "Total number of documents: {}", files.len());
        info!(target: TARGET_PIPELINE, "Already processed: {}", checkpoint.len());

        // facts cache lives for exactly one run
        let mut cache = EntityFactsCache::new();

        let pending = pending_files(&files, &checkpoint);
        debug!(target: TARGET_PIPELINE, "{} files pending", pending.len());

        for file_name in pending {
            match self.process_file(file_name, &mut cache).await {
                Ok(()) => {
                    checkpoint.mark_processed(file_name)?;
                    info!(
                        target: TARGET_PIPELINE,
                        "Processed: {}/{}",
                        checkpoint.len(),
                        files.len()
                    );
                }
                Err(err) => {
                    // one bad file must not abort the batch
                    error!(
                        target: TARGET_PIPELINE,
                        "Failed to process {}: {:#}", file_name, err
                    );
                }
            }
        }

        info!(
            target: TARGET_PIPELINE,
            "Run complete, {} distinct entities looked up",
            cache.len()
        );

        Ok(())
    }

    async fn process_file(&self, file_name: &str, cache: &mut EntityFactsCache) -> Result<()> {
        let path = self.config.input_dir.join(file_name);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let documents: BTreeMap<String, DocumentRecord> = serde_json::from_str(&content)
            .with_context(|| format!("malformed document file {}", path.display()))?;

        let mut outputs = BTreeMap::new();
        for (doc_id, record) in documents {
            let output = self.process_document(&doc_id, &record.info.body, cache).await;
            outputs.insert(doc_id, output);
        }

        let json = serde_json::to_string(&outputs).context("failed to serialize output")?;
        let output_path = self.config.output_dir.join(file_name);
        fs::write(&output_path, json)
            .with_context(|| format!("failed to write {}", output_path.display()))?;

        Ok(())
    }

    async fn process_document(
        &self,
        doc_id: &str,
        body: &str,
        cache: &mut EntityFactsCache,
    ) -> DocumentOutput {
        let text = body.replace('\n', " ").trim().to_string();

        if text.is_empty() {
            warn!(target: TARGET_PIPELINE, "Document {} has an empty body", doc_id);
        }

        let annotations = self.wikifier.annotate(&text, &self.config.language).await;
        let mentions = self.ner.extract_mentions(&text, &self.config.language).await;

        let linked = link_entities(
            &mentions,
            &annotations,
            self.search,
            &self.config.search_language,
        )
        .await;

        let entities = resolve_types(linked, self.registry, cache, self.facts).await;

        info!(
            target: TARGET_PIPELINE,
            "{}: {} mentions, {} candidate annotations, {} linked entities",
            doc_id,
            mentions.len(),
            annotations.len(),
            entities.len()
        );

        DocumentOutput {
            text,
            entities,
            mentions,
            annotations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_checkpoint_means_nothing_processed() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = Checkpoint::load(dir.path().join(CHECKPOINT_FILE));
        assert!(checkpoint.is_empty());
    }

    #[test]
    fn marked_files_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CHECKPOINT_FILE);

        let mut checkpoint = Checkpoint::load(path.clone());
        checkpoint.mark_processed("doc1.json").unwrap();
        checkpoint.mark_processed("doc2.json").unwrap();

        let reloaded = Checkpoint::load(path);
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("doc1.json"));
        assert!(reloaded.contains("doc2.json"));
        assert!(!reloaded.contains("doc3.json"));
    }

    #[test]
    fn pending_files_skips_checkpointed_work() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CHECKPOINT_FILE);

        let mut checkpoint = Checkpoint::load(path);
        checkpoint.mark_processed("doc1.json").unwrap();

        let files = vec!["doc1.json".to_string(), "doc2.json".to_string()];
        assert_eq!(pending_files(&files, &checkpoint), vec!["doc2.json"]);
    }

    #[test]
    fn input_files_are_sorted_and_exclude_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.json"), "{}").unwrap();
        fs::write(dir.path().join("a.json"), "{}").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let files = input_files(dir.path()).unwrap();
        assert_eq!(files, vec!["a.json", "b.json"]);
    }

    #[test]
    fn document_files_parse_the_corpus_shape() {
        let raw = r#"{"doc1": {"info": {"body": "Angela Merkel\nvisited Paris."}}}"#;
        let documents: BTreeMap<String, DocumentRecord> = serde_json::from_str(raw).unwrap();
        assert_eq!(
            documents.get("doc1").unwrap().info.body,
            "Angela Merkel\nvisited Paris."
        );
    }
}
