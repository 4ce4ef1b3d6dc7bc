//! Known-faces store: index-aligned descriptors and person IDs, loaded once at startup.

use crate::types::{Descriptor, PersonId};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("known-faces file not found: {0}")]
    NotFound(String),
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed known-faces file: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("{descriptors} descriptors but {ids} person IDs")]
    LengthMismatch { descriptors: usize, ids: usize },
    #[error("descriptor {index} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
}

/// Gallery of known faces. `person_ids[i]` is the identity of `descriptors[i]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnownFaces {
    descriptors: Vec<Descriptor>,
    person_ids: Vec<PersonId>,
}

impl KnownFaces {
    /// Build a validated gallery.
    pub fn new(descriptors: Vec<Descriptor>, person_ids: Vec<PersonId>) -> Result<Self, StoreError> {
        let store = Self {
            descriptors,
            person_ids,
        };
        store.validate()?;
        Ok(store)
    }

    /// Load from a JSON file of the form `{"descriptors": [[..], ..], "person_ids": [..]}`.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::NotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let store: KnownFaces = serde_json::from_str(&raw)?;
        store.validate()?;

        tracing::info!(
            path = %path.display(),
            entries = store.len(),
            dims = store.descriptors.first().map(Descriptor::len).unwrap_or(0),
            "loaded known faces"
        );
        Ok(store)
    }

    /// Write the gallery as JSON, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Append one entry. The descriptor must match the gallery's dimensionality.
    pub fn push(&mut self, person_id: PersonId, descriptor: Descriptor) -> Result<(), StoreError> {
        if let Some(first) = self.descriptors.first() {
            if first.len() != descriptor.len() {
                return Err(StoreError::DimensionMismatch {
                    index: self.descriptors.len(),
                    expected: first.len(),
                    actual: descriptor.len(),
                });
            }
        }
        self.descriptors.push(descriptor);
        self.person_ids.push(person_id);
        Ok(())
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn person_ids(&self) -> &[PersonId] {
        &self.person_ids
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    fn validate(&self) -> Result<(), StoreError> {
        if self.descriptors.len() != self.person_ids.len() {
            return Err(StoreError::LengthMismatch {
                descriptors: self.descriptors.len(),
                ids: self.person_ids.len(),
            });
        }
        let Some(expected) = self.descriptors.first().map(Descriptor::len) else {
            return Ok(());
        };
        for (index, d) in self.descriptors.iter().enumerate() {
            if d.len() != expected {
                return Err(StoreError::DimensionMismatch {
                    index,
                    expected,
                    actual: d.len(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_index_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known.json");
        std::fs::write(
            &path,
            r#"{"descriptors": [[0.1, 0.2], [0.3, 0.4]], "person_ids": ["321654", "852741"]}"#,
        )
        .unwrap();

        let store = KnownFaces::load(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.person_ids()[1].as_str(), "852741");
        assert_eq!(store.descriptors()[1].values, vec![0.3, 0.4]);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known.json");
        let mut store = KnownFaces::default();
        store.push("A".into(), Descriptor::new(vec![1.0, 2.0])).unwrap();
        store.save(&path).unwrap();

        let loaded = KnownFaces::load(&path).unwrap();
        assert_eq!(loaded.person_ids(), store.person_ids());
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let err = KnownFaces::new(vec![Descriptor::new(vec![1.0])], vec![]).unwrap_err();
        assert!(matches!(err, StoreError::LengthMismatch { descriptors: 1, ids: 0 }));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let err = KnownFaces::new(
            vec![Descriptor::new(vec![1.0, 0.0]), Descriptor::new(vec![1.0])],
            vec!["A".into(), "B".into()],
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { index: 1, .. }));
    }

    #[test]
    fn test_push_dimension_mismatch_rejected() {
        let mut store = KnownFaces::default();
        store.push("A".into(), Descriptor::new(vec![1.0, 0.0])).unwrap();
        assert!(store.push("B".into(), Descriptor::new(vec![1.0])).is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_missing_file() {
        let err = KnownFaces::load(Path::new("/nonexistent/known.json")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
