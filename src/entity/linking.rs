use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::entity::types::{CandidateAnnotation, DisambiguationMethod, LinkedEntity, Mention};

use super::TARGET_ENTITY;

/// NER labels worth linking; everything else is low-signal or not an entity.
const LINKABLE_LABELS: [&str; 8] = [
    "PER", "PERSON", "FAC", "ORG", "GPE", "LOC", "EVENT", "MISC",
];

/// Tokenization drift allowed between the NER spans and the annotation
/// service's character ranges, in characters on each side.
pub const CHAR_TOLERANCE: usize = 2;

/// Occurrences below this confidence are treated as noise. Intentionally
/// permissive; it only removes near-zero pageRank annotations.
pub const MIN_CONFIDENCE: f64 = 1e-4;

/// One ranked hit from the lexical-search fallback.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub id: String,
    #[serde(default)]
    pub label: String,
}

/// Lexical entity search over the knowledge base.
#[async_trait]
pub trait SearchProvider {
    /// Top-ranked candidates for a verbatim query string. Empty on no match
    /// or service error.
    async fn search(&self, query: &str, limit: usize, language: &str) -> Vec<SearchHit>;
}

/// Link mentions to Wikidata items using the candidate annotations, falling
/// back to lexical search when no annotation aligns.
///
/// Mentions that cannot be resolved are dropped; the output preserves mention
/// order.
pub async fn link_entities<S: SearchProvider>(
    mentions: &[Mention],
    annotations: &[CandidateAnnotation],
    search: &S,
    search_language: &str,
) -> Vec<LinkedEntity> {
    let mut linked = Vec::new();

    for mention in mentions {
        if !is_linkable(mention) {
            debug!(
                target: TARGET_ENTITY,
                "Skipping mention {:?} with label {}", mention.text, mention.label
            );
            continue;
        }

        let candidates = aligned_candidates(mention, annotations);

        if let Some(best) = select_best(&candidates) {
            linked.push(LinkedEntity::from_mention(
                mention,
                best.wikidata_id,
                best.label,
                DisambiguationMethod::AnnotationOverlap,
            ));
            continue;
        }

        // No aligned annotation: one lexical search for the exact mention
        // text, taking the top hit only.
        let hits = search.search(&mention.text, 1, search_language).await;
        match hits.first() {
            Some(hit) => {
                linked.push(LinkedEntity::from_mention(
                    mention,
                    &hit.id,
                    &hit.label,
                    DisambiguationMethod::LexicalSearch,
                ));
            }
            None => {
                debug!(
                    target: TARGET_ENTITY,
                    "Dropping mention {:?}: no aligned annotation and no search hit",
                    mention.text
                );
            }
        }
    }

    info!(
        target: TARGET_ENTITY,
        "Linked {} of {} mentions",
        linked.len(),
        mentions.len()
    );

    linked
}

fn is_linkable(mention: &Mention) -> bool {
    mention.text.chars().count() >= 2 && LINKABLE_LABELS.contains(&mention.label.as_str())
}

struct AlignedCandidate<'a> {
    wikidata_id: &'a str,
    label: &'a str,
    // occurrence-level confidence, not annotation-level
    confidence: f64,
}

/// Collect every annotation occurrence that falls within the mention span,
/// widened by `CHAR_TOLERANCE` on both sides.
fn aligned_candidates<'a>(
    mention: &Mention,
    annotations: &'a [CandidateAnnotation],
) -> Vec<AlignedCandidate<'a>> {
    let window_start = mention.start.saturating_sub(CHAR_TOLERANCE);
    let window_end = mention.end + CHAR_TOLERANCE;

    let mut aligned = Vec::new();
    for annotation in annotations {
        let (Some(wikidata_id), Some(label)) = (&annotation.wikidata_id, &annotation.label) else {
            continue;
        };

        for occurrence in &annotation.occurrences {
            if occurrence.char_from < window_start || occurrence.char_to > window_end {
                continue;
            }
            if occurrence.confidence < MIN_CONFIDENCE {
                continue;
            }
            aligned.push(AlignedCandidate {
                wikidata_id,
                label,
                confidence: occurrence.confidence,
            });
        }
    }
    aligned
}

/// Highest occurrence confidence wins; ties keep the first-seen candidate.
fn select_best<'a, 'b>(candidates: &'b [AlignedCandidate<'a>]) -> Option<&'b AlignedCandidate<'a>> {
    let mut best: Option<&AlignedCandidate> = None;
    for candidate in candidates {
        if best.map_or(true, |b| candidate.confidence > b.confidence) {
            best = Some(candidate);
        }
    }
    best
}
