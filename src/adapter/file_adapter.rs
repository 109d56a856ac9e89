//! CSV-file policy adapter.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{Adapter, Filter, parse_policy_line, section_of, serialize_store};
use crate::error::Result;
use crate::policy::PolicyStore;

/// Adapter backed by a CSV-like policy file (`p, alice, data1, read`).
///
/// Loads and full saves only; incremental operations report
/// [`crate::Error::UnsupportedByAdapter`], so auto-save should stay off
/// when this adapter backs the enforcer. `save_policy` serializes the
/// whole store and writes it in one call, policy tables before grouping
/// tables; per-table rule order is preserved across a save/load
/// round-trip, while interleaving between different tables is not.
#[derive(Debug, Clone)]
pub struct FileAdapter {
    path: PathBuf,
    filtered: bool,
}

impl FileAdapter {
    /// Adapter reading and writing `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            filtered: false,
        }
    }

    /// The backing file path.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn load_with(&mut self, store: &mut PolicyStore, filter: Option<&Filter>) -> Result<()> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let mut loaded = 0usize;
        for line in text.lines() {
            let Some((ptype, rule)) = parse_policy_line(line) else {
                continue;
            };
            let sec = section_of(&ptype)?;
            if filter.is_some_and(|f| !f.keeps(sec, &rule)) {
                continue;
            }
            // Set semantics: a repeated line in the file is dropped.
            if store.add(sec, &ptype, rule).is_ok() {
                loaded += 1;
            }
        }
        tracing::debug!(
            path = %self.path.display(),
            rules = loaded,
            filtered = filter.is_some(),
            "loaded policy file"
        );
        Ok(())
    }
}

#[async_trait]
impl Adapter for FileAdapter {
    async fn load_policy(&mut self, store: &mut PolicyStore) -> Result<()> {
        self.filtered = false;
        self.load_with(store, None).await
    }

    async fn load_filtered_policy(
        &mut self,
        store: &mut PolicyStore,
        filter: Filter,
    ) -> Result<()> {
        self.filtered = !filter.is_empty();
        self.load_with(store, Some(&filter)).await
    }

    async fn save_policy(&mut self, store: &PolicyStore) -> Result<()> {
        let text = serialize_store(store);
        tokio::fs::write(&self.path, text).await?;
        tracing::debug!(path = %self.path.display(), "saved policy file");
        Ok(())
    }

    fn is_filtered(&self) -> bool {
        self.filtered
    }
}
