use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::{ContentItem, ContentKey, ContentType};

/// The external content catalog. `None` means the content does not exist.
#[async_trait]
pub trait ContentCatalog: Send + Sync {
    async fn resolve(&self, content_type: ContentType, id: &str) -> Option<ContentItem>;
}

/// Catalog held in memory, seeded from JSON or registered one item at a time.
#[derive(Default)]
pub struct InMemoryCatalog {
    items: DashMap<ContentKey, ContentItem>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON array of content items.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let items: Vec<ContentItem> = serde_json::from_str(json)?;
        let catalog = Self::new();
        for item in items {
            catalog.register(item);
        }
        Ok(catalog)
    }

    pub fn load_json_file(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Insert or replace. Already-scheduled ads keep the duration they were booked with.
    pub fn register(&self, item: ContentItem) -> Option<ContentItem> {
        let key = ContentKey::new(item.content_type, item.id.clone());
        self.items.insert(key, item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sorted by type then id.
    pub fn list(&self) -> Vec<ContentItem> {
        let mut items: Vec<ContentItem> = self.items.iter().map(|e| e.value().clone()).collect();
        items.sort_by(|a, b| {
            a.content_type
                .as_str()
                .cmp(b.content_type.as_str())
                .then_with(|| a.id.cmp(&b.id))
        });
        items
    }
}

#[async_trait]
impl ContentCatalog for InMemoryCatalog {
    async fn resolve(&self, content_type: ContentType, id: &str) -> Option<ContentItem> {
        self.items
            .get(&ContentKey::new(content_type, id))
            .map(|e| e.value().clone())
    }
}
