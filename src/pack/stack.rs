//! Layered resolution across several packs.
//!
//! Packs are overlaid by their declared priority: a base pack at priority 0
//! can be patched by a mod pack at priority 10 that ships replacement entries
//! under the same names. Lookups consult layers from the highest priority
//! down and stop at the first pack that contains the name.

use std::path::Path;

use crate::error::{Error, Result};
use crate::io::ReadAt;

use super::reader::{ArchiveReader, OpenOptions};
use super::structures::{PACK_EXTENSION, PackMetadata};

/// An ordered set of packs, highest priority first.
#[derive(Default)]
pub struct PackStack {
    layers: Vec<ArchiveReader<dyn ReadAt>>,
}

impl PackStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pack. Among packs with equal priority the one pushed first stays
    /// in front.
    pub fn push(&mut self, pack: ArchiveReader<dyn ReadAt>) {
        tracing::debug!(
            name = %pack.metadata().name,
            priority = pack.metadata().priority,
            "adding layer"
        );
        self.layers.push(pack);
        // sort_by is stable, which keeps insertion order for ties
        self.layers
            .sort_by(|a, b| b.metadata().priority.cmp(&a.metadata().priority));
    }

    /// Open every `*.lpack` file directly inside `dir` and add it as a layer.
    ///
    /// Files are visited in name order, which decides ties in priority. A pack
    /// that fails to open is logged and skipped; only failing to list `dir`
    /// itself is an error. Returns the number of layers added.
    pub async fn push_dir(&mut self, dir: &Path, options: &OpenOptions) -> Result<usize> {
        let mut paths = Vec::new();
        let mut listing = tokio::fs::read_dir(dir).await?;
        while let Some(item) = listing.next_entry().await? {
            let path = item.path();
            if path.extension().is_some_and(|ext| ext == PACK_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut added = 0;
        for path in paths {
            match ArchiveReader::open_path_with(&path, options.clone()).await {
                Ok(pack) => {
                    self.push(pack.into_dyn());
                    added += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable pack");
                }
            }
        }
        Ok(added)
    }

    /// Layers in resolution order.
    pub fn layers(&self) -> &[ArchiveReader<dyn ReadAt>] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// The layer that `name` resolves to, if any.
    pub fn find(&self, name: &str) -> Option<&ArchiveReader<dyn ReadAt>> {
        self.layers.iter().find(|pack| pack.contains(name))
    }

    /// Read `name` from the highest-priority layer that has it.
    ///
    /// A failure while reading from that layer is returned as is; lower
    /// layers are not consulted as a fallback.
    pub async fn resolve(&self, name: &str) -> Result<Vec<u8>> {
        let pack = self
            .find(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        tracing::trace!(name, layer = %pack.metadata().name, "resolved entry");
        pack.read(name).await
    }

    /// Metadata of every layer containing `name`, highest priority first.
    pub fn layers_for(&self, name: &str) -> Vec<&PackMetadata> {
        self.layers
            .iter()
            .filter(|pack| pack.contains(name))
            .map(|pack| pack.metadata())
            .collect()
    }

    /// Union of entry names across all layers, each listed once, in
    /// resolution order.
    pub fn list(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.layers
            .iter()
            .flat_map(|pack| pack.list())
            .filter(|name| seen.insert(*name))
            .collect()
    }
}
