use std::collections::HashMap;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bson::Document;

use crate::backends::{DocumentCursor, DocumentSource};

/// 📦 A database that fits in a `Vec`. Collections come back in the order they were added.
///
/// 🧪 Fault injection: `fail_once_at("orders", 2)` makes the next cursor over `orders`
/// blow up right before yielding document #2 (absolute index). Once. Then it behaves.
#[derive(Debug, Default)]
pub(crate) struct InMemorySource {
    collections: Vec<(String, Vec<Document>)>,
    /// 🧨 armed failures, consumed by the next `open_cursor` on that collection
    armed_failures: Vec<(String, usize)>,
    /// 🔢 how many times each collection's cursor was opened. Tests peek at this.
    pub(crate) cursor_opens: HashMap<String, usize>,
}

impl InMemorySource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 🏗️ Add a collection. Builder style, because test setup should read like a recipe.
    pub(crate) fn with_collection(mut self, name: &str, documents: Vec<Document>) -> Self {
        self.collections.push((name.to_string(), documents));
        self
    }

    pub(crate) fn fail_once_at(mut self, collection: &str, index: usize) -> Self {
        self.armed_failures.push((collection.to_string(), index));
        self
    }

    pub(crate) fn opens_for(&self, collection: &str) -> usize {
        self.cursor_opens.get(collection).copied().unwrap_or(0)
    }
}

/// 📜 Walks a cloned slice of the collection. Restartable by construction: it's a Vec.
#[derive(Debug)]
pub(crate) struct InMemoryCursor {
    documents: std::vec::IntoIter<Document>,
    position: usize,
    fail_at: Option<usize>,
}

#[async_trait]
impl DocumentCursor for InMemoryCursor {
    async fn next_document(&mut self) -> Result<Option<Document>> {
        if self.fail_at == Some(self.position) {
            self.fail_at = None;
            return Err(anyhow!(
                "💀 injected cursor failure at document #{}",
                self.position
            ));
        }
        let next = self.documents.next();
        if next.is_some() {
            self.position += 1;
        }
        Ok(next)
    }
}

#[async_trait]
impl DocumentSource for InMemorySource {
    type Cursor = InMemoryCursor;

    async fn list_collection_names(&mut self) -> Result<Vec<String>> {
        Ok(self.collections.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn open_cursor(&mut self, collection: &str, skip: u64) -> Result<InMemoryCursor> {
        let documents = self
            .collections
            .iter()
            .find(|(name, _)| name == collection)
            .map(|(_, docs)| docs.clone())
            .ok_or_else(|| anyhow!("💀 no collection named '{collection}' in RAM"))?;
        *self.cursor_opens.entry(collection.to_string()).or_default() += 1;

        let fail_at = self
            .armed_failures
            .iter()
            .position(|(name, _)| name == collection)
            .map(|i| self.armed_failures.remove(i).1);

        let skip = skip as usize;
        Ok(InMemoryCursor {
            documents: documents
                .into_iter()
                .skip(skip)
                .collect::<Vec<_>>()
                .into_iter(),
            position: skip,
            fail_at,
        })
    }
}
