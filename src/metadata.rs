//! Dataset metadata lookups.
//!
//! The readers never talk to a metadata API directly. They go through
//! [`MetadataService`], which lists the parts of a dataset view and resolves
//! each part into fetchable [`ProcessingEntity`]s on demand.
//!
//! [`ManifestMetadata`] answers both questions from a JSON manifest:
//!
//! ```json
//! {
//!   "dataset_view_id": "sales",
//!   "delimiter": ",",
//!   "fields": [{ "name": "qty", "type": "integer" }],
//!   "parts": [
//!     {
//!       "id": "p1",
//!       "entities": [{ "id": "e1", "name": "part-1.csv", "href": "https://..." }]
//!     }
//!   ]
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::record::{FieldType, ProcessingEntity, RemotePart};

/// Restricts which parts are listed
#[derive(Debug, Clone, Default)]
pub struct PartFilter {
    /// Part ids to keep; empty keeps every part
    pub part_ids: Vec<String>,
}

impl PartFilter {
    pub fn matches(&self, part: &RemotePart) -> bool {
        self.part_ids.is_empty() || self.part_ids.iter().any(|id| id == part.id())
    }
}

/// Source of part listings and entity resolution
#[async_trait]
pub trait MetadataService: Send + Sync {
    /// List the parts of a dataset view, in read order
    async fn list_parts(
        &self,
        dataset_view_id: &str,
        filter: &PartFilter,
    ) -> Result<Vec<RemotePart>>;

    /// Resolve the physical files backing one part
    async fn resolve_entities(&self, part: &RemotePart) -> Result<Vec<ProcessingEntity>>;
}

/// Declared field of a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// Dataset-level settings that shape how text rows are read
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    #[serde(default)]
    pub dataset_view_id: String,
    #[serde(default)]
    pub delimiter: Option<String>,
    #[serde(default)]
    pub escape: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Deserialize)]
struct ManifestPart {
    #[serde(flatten)]
    part: RemotePart,
    #[serde(default)]
    entities: Vec<ProcessingEntity>,
}

#[derive(Debug, Clone, Deserialize)]
struct Manifest {
    #[serde(flatten)]
    descriptor: DatasetDescriptor,
    #[serde(default)]
    parts: Vec<ManifestPart>,
}

/// Metadata answered from an in-memory manifest
#[derive(Debug, Clone, Default)]
pub struct ManifestMetadata {
    descriptor: DatasetDescriptor,
    parts: Vec<(RemotePart, Vec<ProcessingEntity>)>,
}

impl ManifestMetadata {
    /// Decode a manifest document
    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(json)?;
        let parts = manifest
            .parts
            .into_iter()
            .map(|p| {
                // A part without explicit entities is backed by its own URL
                let entities = if p.entities.is_empty() && !p.part.url.is_empty() {
                    let mut entity = ProcessingEntity::new(p.part.url.clone());
                    entity.declared_length = p.part.length;
                    vec![entity]
                } else {
                    p.entities
                };
                (p.part, entities)
            })
            .collect();

        Ok(Self {
            descriptor: manifest.descriptor,
            parts,
        })
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }

    /// One single-file part per URL, in the given order
    pub fn from_urls<I, S>(dataset_view_id: &str, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts = urls
            .into_iter()
            .enumerate()
            .map(|(i, url)| {
                let part = RemotePart::new(format!("part-{}", i), url);
                let entity = ProcessingEntity::new(part.url.clone());
                (part, vec![entity])
            })
            .collect();

        Self {
            descriptor: DatasetDescriptor {
                dataset_view_id: dataset_view_id.to_string(),
                ..Default::default()
            },
            parts,
        }
    }

    pub fn descriptor(&self) -> &DatasetDescriptor {
        &self.descriptor
    }
}

#[async_trait]
impl MetadataService for ManifestMetadata {
    async fn list_parts(
        &self,
        dataset_view_id: &str,
        filter: &PartFilter,
    ) -> Result<Vec<RemotePart>> {
        if !self.descriptor.dataset_view_id.is_empty()
            && dataset_view_id != self.descriptor.dataset_view_id
        {
            return Err(Error::Metadata(format!(
                "unknown dataset view {:?}",
                dataset_view_id
            )));
        }

        Ok(self
            .parts
            .iter()
            .map(|(part, _)| part)
            .filter(|part| filter.matches(part))
            .cloned()
            .collect())
    }

    async fn resolve_entities(&self, part: &RemotePart) -> Result<Vec<ProcessingEntity>> {
        self.parts
            .iter()
            .find(|(p, _)| p.id() == part.id())
            .map(|(_, entities)| entities.clone())
            .ok_or_else(|| Error::Metadata(format!("unknown part {:?}", part.id())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "dataset_view_id": "sales",
        "delimiter": ";",
        "fields": [{ "name": "qty", "type": "integer" }],
        "parts": [
            { "id": "p1", "name": "first", "entities": [
                { "id": "e1", "name": "a.csv", "href": "mem://a", "declared_length": 10 },
                { "id": "e2", "name": "b.csv", "href": "mem://b" }
            ]},
            { "id": "p2", "url": "mem://c.csv", "length": 5 }
        ]
    }"#;

    #[tokio::test]
    async fn test_manifest_lists_and_resolves() {
        let metadata = ManifestMetadata::from_json(MANIFEST).unwrap();
        assert_eq!(metadata.descriptor().delimiter.as_deref(), Some(";"));
        assert_eq!(metadata.descriptor().fields[0].field_type, FieldType::Integer);

        let parts = metadata
            .list_parts("sales", &PartFilter::default())
            .await
            .unwrap();
        assert_eq!(parts.len(), 2);

        let entities = metadata.resolve_entities(&parts[0]).await.unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].declared_length, Some(10));

        let implicit = metadata.resolve_entities(&parts[1]).await.unwrap();
        assert_eq!(implicit.len(), 1);
        assert_eq!(implicit[0].href, "mem://c.csv");
        assert_eq!(implicit[0].file_name(), "c.csv");
        assert_eq!(implicit[0].declared_length, Some(5));
    }

    #[tokio::test]
    async fn test_filter_and_unknown_view() {
        let metadata = ManifestMetadata::from_json(MANIFEST).unwrap();
        let filter = PartFilter {
            part_ids: vec!["p2".to_string()],
        };
        let parts = metadata.list_parts("sales", &filter).await.unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].id(), "p2");

        assert!(matches!(
            metadata.list_parts("other", &filter).await,
            Err(Error::Metadata(_))
        ));
    }

    #[test]
    fn test_bad_manifest() {
        assert!(matches!(
            ManifestMetadata::from_json(r#"{"parts": 3}"#),
            Err(Error::Manifest(_))
        ));
    }
}
