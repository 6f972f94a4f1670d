use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder shown by downstream card views when an entity has no image.
pub const PLACEHOLDER_IMAGE_URL: &str =
    "http://www.jennybeaumont.com/wp-content/uploads/2015/03/placeholder.gif";

/// Suffix of the Wikidata class URI denoting a human (Q5).
pub const HUMAN_CLASS_SUFFIX: &str = "/Q5";

/// Source tag attached to images resolved from Wikidata facts.
pub const IMAGE_SOURCE_WIKIDATA: &str = "wikidata";

/// A named-entity mention produced by the NER service.
///
/// `start` and `end` are character offsets into the source text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mention {
    pub text: String,

    // NER label as emitted by the model (PER, ORG, GPE, ...)
    #[serde(rename = "type")]
    pub label: String,

    pub start: usize,
    pub end: usize,
}

/// One knowledge-base entry proposed by the span-annotation service.
///
/// A single annotation may cover several occurrences of the same entity at
/// different text positions. Entries missing a title or a Wikidata item are
/// kept as-is here and skipped during alignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateAnnotation {
    #[serde(rename = "secTitle", default)]
    pub label: Option<String>,

    #[serde(rename = "wikiDataItemId", default)]
    pub wikidata_id: Option<String>,

    #[serde(rename = "support", default)]
    pub occurrences: Vec<Occurrence>,
}

/// A single text position covered by a candidate annotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Occurrence {
    #[serde(rename = "chFrom")]
    pub char_from: usize,

    #[serde(rename = "chTo")]
    pub char_to: usize,

    // pageRank of this occurrence, used as the alignment confidence
    #[serde(rename = "pageRank")]
    pub confidence: f64,
}

/// How a mention was resolved to its knowledge-base identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisambiguationMethod {
    #[serde(rename = "annotation-overlap")]
    AnnotationOverlap,
    #[serde(rename = "lexical-search")]
    LexicalSearch,
}

impl fmt::Display for DisambiguationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisambiguationMethod::AnnotationOverlap => write!(f, "annotation-overlap"),
            DisambiguationMethod::LexicalSearch => write!(f, "lexical-search"),
        }
    }
}

/// A mention that has been linked to a Wikidata item.
#[derive(Debug, Clone, Serialize)]
pub struct LinkedEntity {
    pub text: String,

    // NER label carried over from the mention
    pub label: String,

    pub start: usize,
    pub end: usize,

    pub wikidata_id: String,
    pub wikidata_label: String,
    pub disambiguation: DisambiguationMethod,
}

impl LinkedEntity {
    pub fn from_mention(
        mention: &Mention,
        wikidata_id: &str,
        wikidata_label: &str,
        disambiguation: DisambiguationMethod,
    ) -> Self {
        LinkedEntity {
            text: mention.text.clone(),
            label: mention.label.clone(),
            start: mention.start,
            end: mention.end,
            wikidata_id: wikidata_id.to_string(),
            wikidata_label: wikidata_label.to_string(),
            disambiguation,
        }
    }
}

/// Final semantic type of a linked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityType {
    #[serde(rename = "PERSON")]
    Person,
    #[serde(rename = "LOCATION")]
    Location,
    #[serde(rename = "EVENT")]
    Event,
    #[serde(rename = "unknown")]
    Unknown,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityType::Person => write!(f, "PERSON"),
            EntityType::Location => write!(f, "LOCATION"),
            EntityType::Event => write!(f, "EVENT"),
            EntityType::Unknown => write!(f, "unknown"),
        }
    }
}

/// An image reference attached to an enriched entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceImage {
    pub url: String,
    pub source: String,
}

/// A linked entity enriched with Wikidata facts and its final type.
#[derive(Debug, Clone, Serialize)]
pub struct TypedEntity {
    pub text: String,
    pub start: usize,
    pub end: usize,

    pub wikidata_id: String,
    pub wikidata_label: String,
    pub disambiguation: DisambiguationMethod,

    pub is_person: bool,
    pub is_location: bool,
    pub is_event: bool,

    // Final semantic type derived from facts and the event registry; replaces
    // the NER label of the underlying mention.
    #[serde(rename = "type")]
    pub entity_type: EntityType,

    pub description: String,
    pub wikipedia_url: String,
    pub image_url: String,
    pub reference_images: Vec<ReferenceImage>,
}

impl TypedEntity {
    pub fn from_linked(
        linked: LinkedEntity,
        is_person: bool,
        is_location: bool,
        is_event: bool,
        metadata: FactMetadata,
    ) -> Self {
        // Priority order, later wins. NOTE: a human with a coordinate fact is
        // still a person, and event-registry membership is authoritative.
        let mut entity_type = EntityType::Unknown;
        if is_location {
            entity_type = EntityType::Location;
        }
        if is_person {
            entity_type = EntityType::Person;
        }
        if is_event {
            entity_type = EntityType::Event;
        }

        let image_url = if metadata.image_url.is_empty() {
            PLACEHOLDER_IMAGE_URL.to_string()
        } else {
            metadata.image_url
        };

        TypedEntity {
            text: linked.text,
            start: linked.start,
            end: linked.end,
            wikidata_id: linked.wikidata_id,
            wikidata_label: linked.wikidata_label,
            disambiguation: linked.disambiguation,
            is_person,
            is_location,
            is_event,
            entity_type,
            description: metadata.description,
            wikipedia_url: metadata.wikipedia_url,
            image_url: image_url.clone(),
            reference_images: vec![ReferenceImage {
                url: image_url,
                source: IMAGE_SOURCE_WIKIDATA.to_string(),
            }],
        }
    }
}

/// One row of the SPARQL fact query for an entity.
///
/// Every field is optional; a row asserts only the facts it binds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FactBinding {
    #[serde(default)]
    pub instance: Option<SparqlValue>,

    #[serde(default)]
    pub coordinate: Option<SparqlValue>,

    #[serde(default)]
    pub wikipedia_url: Option<SparqlValue>,

    #[serde(rename = "entityDescription", default)]
    pub description: Option<SparqlValue>,

    #[serde(rename = "wdimage", default)]
    pub image: Option<SparqlValue>,
}

impl FactBinding {
    pub fn asserts_human(&self) -> bool {
        self.instance
            .as_ref()
            .map_or(false, |v| v.value.ends_with(HUMAN_CLASS_SUFFIX))
    }

    pub fn has_coordinate(&self) -> bool {
        self.coordinate.is_some()
    }
}

/// A bound value in a SPARQL result row.
#[derive(Debug, Clone, Deserialize)]
pub struct SparqlValue {
    pub value: String,
}

/// Descriptive metadata collected from an entity's fact rows.
///
/// Each field keeps the first non-empty value seen; absent facts stay empty.
#[derive(Debug, Clone, Default)]
pub struct FactMetadata {
    pub description: String,
    pub wikipedia_url: String,
    pub image_url: String,
}

impl FactMetadata {
    pub fn merge_binding(&mut self, binding: &FactBinding) {
        if self.description.is_empty() {
            if let Some(v) = &binding.description {
                self.description = v.value.clone();
            }
        }
        if self.wikipedia_url.is_empty() {
            if let Some(v) = &binding.wikipedia_url {
                self.wikipedia_url = v.value.clone();
            }
        }
        if self.image_url.is_empty() {
            if let Some(v) = &binding.image {
                self.image_url = v.value.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mention_uses_wire_field_names() {
        let mention: Mention =
            serde_json::from_str(r#"{"text":"Berlin","type":"GPE","start":10,"end":16}"#)
                .expect("valid mention JSON");
        assert_eq!(mention.label, "GPE");
        assert_eq!(mention.start, 10);
    }

    #[test]
    fn type_priority_person_over_location() {
        let linked = LinkedEntity {
            text: "Ada Lovelace".to_string(),
            label: "PER".to_string(),
            start: 0,
            end: 12,
            wikidata_id: "Q7259".to_string(),
            wikidata_label: "Ada Lovelace".to_string(),
            disambiguation: DisambiguationMethod::AnnotationOverlap,
        };
        let typed = TypedEntity::from_linked(linked, true, true, false, FactMetadata::default());
        assert_eq!(typed.entity_type, EntityType::Person);
        assert!(typed.is_location);
    }

    #[test]
    fn type_priority_event_wins() {
        let linked = LinkedEntity {
            text: "Woodstock".to_string(),
            label: "EVENT".to_string(),
            start: 0,
            end: 9,
            wikidata_id: "Q210542".to_string(),
            wikidata_label: "Woodstock".to_string(),
            disambiguation: DisambiguationMethod::AnnotationOverlap,
        };
        let typed = TypedEntity::from_linked(linked, true, true, true, FactMetadata::default());
        assert_eq!(typed.entity_type, EntityType::Event);
    }

    #[test]
    fn missing_image_falls_back_to_placeholder() {
        let linked = LinkedEntity {
            text: "Atlantis".to_string(),
            label: "LOC".to_string(),
            start: 0,
            end: 8,
            wikidata_id: "Q25373".to_string(),
            wikidata_label: "Atlantis".to_string(),
            disambiguation: DisambiguationMethod::LexicalSearch,
        };
        let typed = TypedEntity::from_linked(linked, false, false, false, FactMetadata::default());
        assert_eq!(typed.entity_type, EntityType::Unknown);
        assert_eq!(typed.image_url, PLACEHOLDER_IMAGE_URL);
        assert_eq!(typed.reference_images.len(), 1);
        assert_eq!(typed.reference_images[0].url, PLACEHOLDER_IMAGE_URL);
        assert_eq!(typed.reference_images[0].source, IMAGE_SOURCE_WIKIDATA);
    }

    #[test]
    fn metadata_keeps_first_value_per_field() {
        let mut metadata = FactMetadata::default();
        metadata.merge_binding(&FactBinding {
            description: Some(SparqlValue {
                value: "first".to_string(),
            }),
            ..FactBinding::default()
        });
        metadata.merge_binding(&FactBinding {
            description: Some(SparqlValue {
                value: "second".to_string(),
            }),
            image: Some(SparqlValue {
                value: "http://example.org/img.jpg".to_string(),
            }),
            ..FactBinding::default()
        });
        assert_eq!(metadata.description, "first");
        assert_eq!(metadata.image_url, "http://example.org/img.jpg");
        assert!(metadata.wikipedia_url.is_empty());
    }
}
