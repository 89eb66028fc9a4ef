use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::metadata::{MetadataService, PartFilter};
use crate::record::{ProcessingEntity, RemotePart};

/// Walks the parts of a dataset view, one processing entity at a time.
///
/// Entities are resolved lazily: a part's entities are looked up only when
/// the previous part has been used up. Parts that resolve to no entities
/// are skipped. Once the last entity is passed the sequencer is terminal
/// and [`advance`](Self::advance) keeps returning `false`.
pub struct PartSequencer<M: MetadataService> {
    metadata: Arc<M>,
    parts: Vec<RemotePart>,
    /// Index of the part the current entities belong to
    current_part: Option<usize>,
    /// Index of the next part to resolve
    next_part: usize,
    entities: Vec<ProcessingEntity>,
    entity_index: usize,
    terminal: bool,
}

impl<M: MetadataService> PartSequencer<M> {
    /// List the parts and position on the first entity, if any
    pub async fn new(metadata: Arc<M>, dataset_view_id: &str, filter: &PartFilter) -> Result<Self> {
        let parts = metadata.list_parts(dataset_view_id, filter).await?;
        info!("Dataset view {} has {} parts", dataset_view_id, parts.len());

        let mut sequencer = Self {
            metadata,
            parts,
            current_part: None,
            next_part: 0,
            entities: Vec::new(),
            entity_index: 0,
            terminal: false,
        };
        sequencer.settle().await?;
        Ok(sequencer)
    }

    pub fn current_part(&self) -> Option<&RemotePart> {
        if self.terminal {
            return None;
        }
        self.current_part.map(|i| &self.parts[i])
    }

    pub fn current_entity(&self) -> Option<&ProcessingEntity> {
        if self.terminal {
            return None;
        }
        self.entities.get(self.entity_index)
    }

    /// Move to the next entity, resolving the next part when needed.
    ///
    /// Returns `false` once every part is used up, and forever after.
    pub async fn advance(&mut self) -> Result<bool> {
        if self.terminal {
            return Ok(false);
        }
        self.entity_index += 1;
        self.settle().await
    }

    /// True while another entity may follow the current one
    pub fn has_more(&self) -> bool {
        !self.terminal
            && (self.entity_index + 1 < self.entities.len() || self.next_part < self.parts.len())
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    async fn settle(&mut self) -> Result<bool> {
        while self.entity_index >= self.entities.len() {
            if self.next_part >= self.parts.len() {
                debug!("No parts left");
                self.terminal = true;
                self.entities.clear();
                return Ok(false);
            }

            let part = &self.parts[self.next_part];
            self.entities = self.metadata.resolve_entities(part).await?;
            info!(
                "Part {} ({}/{}) resolved to {} entities",
                part.id(),
                self.next_part + 1,
                self.parts.len(),
                self.entities.len()
            );
            self.current_part = Some(self.next_part);
            self.next_part += 1;
            self.entity_index = 0;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ManifestMetadata;

    const MANIFEST: &str = r#"{
        "parts": [
            { "id": "p1", "entities": [
                { "id": "a", "href": "mem://a.csv" },
                { "id": "b", "href": "mem://b.csv" }
            ]},
            { "id": "empty" },
            { "id": "p3", "entities": [{ "id": "c", "href": "mem://c.csv" }] }
        ]
    }"#;

    #[tokio::test]
    async fn test_walks_entities_and_skips_empty_parts() {
        let metadata = Arc::new(ManifestMetadata::from_json(MANIFEST).unwrap());
        let mut seq = PartSequencer::new(metadata, "", &PartFilter::default())
            .await
            .unwrap();

        assert_eq!(seq.part_count(), 3);
        assert_eq!(seq.current_part().unwrap().id(), "p1");
        assert_eq!(seq.current_entity().unwrap().common.id, "a");
        assert!(seq.has_more());

        assert!(seq.advance().await.unwrap());
        assert_eq!(seq.current_entity().unwrap().common.id, "b");

        assert!(seq.advance().await.unwrap());
        assert_eq!(seq.current_part().unwrap().id(), "p3");
        assert_eq!(seq.current_entity().unwrap().common.id, "c");
        assert!(!seq.has_more());

        assert!(!seq.advance().await.unwrap());
        assert!(seq.is_terminal());
        assert!(seq.current_entity().is_none());
        assert!(seq.current_part().is_none());
        assert!(!seq.advance().await.unwrap());
    }

    #[tokio::test]
    async fn test_no_parts_is_terminal_immediately() {
        let metadata = Arc::new(ManifestMetadata::from_json(r#"{"parts": []}"#).unwrap());
        let seq = PartSequencer::new(metadata, "", &PartFilter::default())
            .await
            .unwrap();
        assert!(seq.is_terminal());
        assert!(!seq.has_more());
        assert!(seq.current_entity().is_none());
    }
}
