use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

use crate::entity::types::{FactBinding, FactMetadata, LinkedEntity, TypedEntity};
use crate::events::EventRegistry;

use super::TARGET_ENTITY;

/// Fact lookup for a single knowledge-base entity.
#[async_trait]
pub trait FactProvider {
    /// Fact rows for the given Wikidata ID. Empty on service error; a fault
    /// here never aborts the batch.
    async fn entity_facts(&self, wikidata_id: &str) -> Vec<FactBinding>;
}

/// Per-run memoization of fact lookups: one fetch per distinct ID.
#[derive(Default)]
pub struct EntityFactsCache {
    facts: HashMap<String, Vec<FactBinding>>,
}

impl EntityFactsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub async fn get_or_fetch<F: FactProvider>(
        &mut self,
        wikidata_id: &str,
        provider: &F,
    ) -> &[FactBinding] {
        if !self.facts.contains_key(wikidata_id) {
            let bindings = provider.entity_facts(wikidata_id).await;
            debug!(
                target: TARGET_ENTITY,
                "Fetched {} fact rows for {}",
                bindings.len(),
                wikidata_id
            );
            self.facts.insert(wikidata_id.to_string(), bindings);
        }
        self.facts
            .get(wikidata_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Derive each linked entity's final type from its facts and the event
/// registry, and merge in descriptive metadata.
///
/// Returns one typed entity per input, in input order.
pub async fn resolve_types<F: FactProvider>(
    linked: Vec<LinkedEntity>,
    registry: &EventRegistry,
    cache: &mut EntityFactsCache,
    facts: &F,
) -> Vec<TypedEntity> {
    let mut typed = Vec::with_capacity(linked.len());

    for entity in linked {
        let bindings = cache.get_or_fetch(&entity.wikidata_id, facts).await;

        let is_event = registry.contains(&entity.wikidata_id);
        let mut is_person = false;
        let mut is_location = false;
        let mut metadata = FactMetadata::default();

        for binding in bindings {
            if binding.asserts_human() {
                is_person = true;
            }
            if binding.has_coordinate() {
                is_location = true;
            }
            metadata.merge_binding(binding);
        }

        typed.push(TypedEntity::from_linked(
            entity, is_person, is_location, is_event, metadata,
        ));
    }

    typed
}
