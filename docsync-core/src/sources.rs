//! Sources Index: short source ids mapped to display name, external URL and
//! the local copy under the sources tree.
//!
//! On disk this is `SOURCES.yaml` with a `sources` mapping of category to a
//! list of `{id, name, url, output}` entries.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SourcesError {
    #[error("failed to read sources index {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid sources index {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    /// Path of the fetched copy, relative to the sources tree root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SourcesFile {
    #[serde(default)]
    sources: BTreeMap<String, serde_yaml::Value>,
}

/// A source reference as it lands in a seed YAML record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSource {
    pub name: String,
    pub url: String,
    pub note: String,
}

pub const PLACEHOLDER_URL: &str = "PLACEHOLDER_URL";

#[derive(Debug, Clone, Default)]
pub struct SourcesIndex {
    // Sorted by id so partial matches resolve the same way every run.
    by_id: BTreeMap<String, SourceEntry>,
    local_by_url: HashMap<String, String>,
}

impl SourcesIndex {
    /// Loads `SOURCES.yaml`; a missing file yields an empty index.
    pub fn load(path: &Path) -> Result<SourcesIndex, SourcesError> {
        if !path.exists() {
            warn!(path = %path.display(), "Sources index not found, source ids will not resolve");
            return Ok(SourcesIndex::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| SourcesError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let index = SourcesIndex::from_yaml(&text).map_err(|source| SourcesError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), entries = index.len(), "Loaded sources index");
        Ok(index)
    }

    pub fn from_yaml(text: &str) -> Result<SourcesIndex, serde_yaml::Error> {
        let file: Option<SourcesFile> = serde_yaml::from_str(text)?;
        let mut entries = Vec::new();
        for (category, list) in file.unwrap_or_default().sources {
            // Categories that are not lists are ignored.
            let Ok(list) = serde_yaml::from_value::<Vec<SourceEntry>>(list) else {
                debug!(category = %category, "Skipping non-list sources category");
                continue;
            };
            entries.extend(list);
        }
        Ok(SourcesIndex::from_entries(entries))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = SourceEntry>) -> SourcesIndex {
        let mut index = SourcesIndex::default();
        for mut entry in entries {
            if entry.id.is_empty() {
                continue;
            }
            if entry.name.is_empty() {
                entry.name = entry.id.clone();
            }
            if let Some(output) = &entry.output {
                if !entry.url.is_empty() {
                    index.local_by_url.insert(entry.url.clone(), output.clone());
                }
            }
            index.by_id.insert(entry.id.clone(), entry);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&SourceEntry> {
        self.by_id.get(id)
    }

    /// Local copy (relative to the sources tree) of an external URL.
    pub fn local_path_for_url(&self, url: &str) -> Option<&str> {
        self.local_by_url.get(url).map(String::as_str)
    }

    /// Exact id hit first, then the first id (in sorted order) that contains
    /// `id` or whose display name contains it case-insensitively.
    pub fn resolve(&self, id: &str) -> ResolvedSource {
        if let Some(entry) = self.by_id.get(id) {
            return ResolvedSource {
                name: entry.name.clone(),
                url: entry.url.clone(),
                note: format!("auto-resolved from {id}"),
            };
        }
        let needle = id.to_lowercase();
        let partial = self
            .by_id
            .iter()
            .find(|(full_id, entry)| {
                full_id.contains(id) || entry.name.to_lowercase().contains(&needle)
            });
        match partial {
            Some((full_id, entry)) => ResolvedSource {
                name: entry.name.clone(),
                url: entry.url.clone(),
                note: format!("auto-resolved from {id} -> {full_id}"),
            },
            None => {
                warn!(source_id = id, "Source id not found in sources index");
                ResolvedSource {
                    name: id.to_string(),
                    url: PLACEHOLDER_URL.to_string(),
                    note: format!("source '{id}' not found, needs manual resolution"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"
sources:
  go:
    - id: go-pgx
      name: pgx PostgreSQL Driver
      url: https://github.com/jackc/pgx
      output: go/pgx.md
    - id: fx
      name: Uber fx
      url: https://uber-go.github.io/fx/
  apis:
    - id: tmdb
      name: TMDb API
      url: https://tmdb.org/api
      output: apis/tmdb.md
    - id: pgx-extra
      name: pgx extras
      url: https://example.com/pgx-extra
  notes: "not a list"
"#;

    #[test]
    fn exact_partial_and_missing_resolution() {
        let index = SourcesIndex::from_yaml(INDEX).unwrap();
        assert_eq!(index.len(), 4);

        let exact = index.resolve("tmdb");
        assert_eq!(exact.url, "https://tmdb.org/api");
        assert_eq!(exact.note, "auto-resolved from tmdb");

        // Both go-pgx and pgx-extra contain "pgx"; sorted order picks go-pgx.
        let partial = index.resolve("pgx");
        assert_eq!(partial.name, "pgx PostgreSQL Driver");
        assert_eq!(partial.note, "auto-resolved from pgx -> go-pgx");

        let by_name = index.resolve("uber");
        assert_eq!(by_name.url, "https://uber-go.github.io/fx/");

        let missing = index.resolve("nope");
        assert_eq!(missing.url, PLACEHOLDER_URL);
        assert!(missing.note.contains("needs manual resolution"));
    }

    #[test]
    fn local_paths_only_for_fetched_sources() {
        let index = SourcesIndex::from_yaml(INDEX).unwrap();
        assert_eq!(index.local_path_for_url("https://tmdb.org/api"), Some("apis/tmdb.md"));
        assert_eq!(index.local_path_for_url("https://uber-go.github.io/fx/"), None);
    }

    #[test]
    fn missing_file_is_an_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let index = SourcesIndex::load(&dir.path().join("SOURCES.yaml")).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn empty_document_is_an_empty_index() {
        assert!(SourcesIndex::from_yaml("").unwrap().is_empty());
    }
}
