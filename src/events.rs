use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::TARGET_PIPELINE;

/// Known-event Wikidata IDs, loaded once at startup and read-only afterwards.
///
/// The registry file is a CSV export with the entity ID in the first column;
/// remaining columns are ignored.
#[derive(Debug, Default)]
pub struct EventRegistry {
    ids: HashSet<String>,
}

impl EventRegistry {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read event registry {}", path.display()))?;

        let mut ids = HashSet::new();
        for line in content.lines() {
            let id = line.split(',').next().unwrap_or_default().trim();
            if !id.is_empty() {
                ids.insert(id.to_string());
            }
        }

        info!(
            target: TARGET_PIPELINE,
            "Loaded {} event identifiers from {}",
            ids.len(),
            path.display()
        );

        Ok(EventRegistry { ids })
    }

    pub fn contains(&self, wikidata_id: &str) -> bool {
        self.ids.contains(wikidata_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<String> for EventRegistry {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        EventRegistry {
            ids: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_first_column_of_each_row() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Q362,World War II").unwrap();
        writeln!(file, "Q8740,Vietnam War").unwrap();
        writeln!(file).unwrap();

        let registry = EventRegistry::load(file.path()).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("Q362"));
        assert!(registry.contains("Q8740"));
        assert!(!registry.contains("World War II"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = EventRegistry::load(&dir.path().join("nope.csv"));
        assert!(result.is_err());
    }
}
