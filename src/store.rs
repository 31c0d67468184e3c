//! Artifact store: at most one compressed output per preset for the current
//! document.

use std::path::PathBuf;

use linked_hash_map::LinkedHashMap;

use crate::pipeline::CompressionMetrics;
use crate::preset::Preset;

#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub preset: Preset,
    pub filename: String,
    /// Location of the payload in the session workspace.
    pub path: PathBuf,
    pub metrics: CompressionMetrics,
}

/// What the presentation layer renders for one artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactSummary {
    pub preset: Preset,
    pub filename: String,
    pub size_bytes: u64,
    pub original_size_bytes: u64,
    pub compression_ratio: f64,
    pub compression_percent: f64,
}

impl Artifact {
    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            preset: self.preset,
            filename: self.filename.clone(),
            size_bytes: self.metrics.compressed_size_bytes,
            original_size_bytes: self.metrics.original_size_bytes,
            compression_ratio: self.metrics.compression_ratio(),
            compression_percent: self.metrics.compression_percent(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ArtifactStore {
    entries: LinkedHashMap<Preset, Artifact>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. A replaced entry keeps its position.
    pub fn put(&mut self, artifact: Artifact) -> Option<Artifact> {
        match self.entries.get_mut(&artifact.preset) {
            Some(slot) => Some(std::mem::replace(slot, artifact)),
            None => {
                self.entries.insert(artifact.preset, artifact);
                None
            }
        }
    }

    pub fn get(&self, preset: Preset) -> Option<&Artifact> {
        self.entries.get(&preset)
    }

    /// Entries in insertion order.
    pub fn list(&self) -> impl Iterator<Item = &Artifact> {
        self.entries.values()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(preset: Preset, size: u64) -> Artifact {
        Artifact {
            preset,
            filename: format!("report-{}.pdf", preset),
            path: PathBuf::from(format!("/tmp/report-{}.pdf", preset)),
            metrics: CompressionMetrics::new(1000, size).unwrap(),
        }
    }

    #[test]
    fn put_replaces_and_keeps_position() {
        let mut store = ArtifactStore::new();
        store.put(artifact(Preset::Small, 500));
        store.put(artifact(Preset::Medium, 800));
        let old = store.put(artifact(Preset::Small, 400));

        assert_eq!(old.map(|a| a.metrics.compressed_size_bytes), Some(500));
        assert_eq!(store.len(), 2);
        let order: Vec<_> = store.list().map(|a| (a.preset, a.metrics.compressed_size_bytes)).collect();
        assert_eq!(order, vec![(Preset::Small, 400), (Preset::Medium, 800)]);
    }

    #[test]
    fn summary_reports_ratio_and_percent() {
        let summary = artifact(Preset::Tiny, 250).summary();
        assert_eq!(summary.filename, "report-tiny.pdf");
        assert_eq!(summary.size_bytes, 250);
        assert!((summary.compression_ratio - 0.25).abs() < 1e-9);
        assert!((summary.compression_percent - 75.0).abs() < 1e-9);
    }

    #[test]
    fn clear_empties_the_store() {
        let mut store = ArtifactStore::new();
        store.put(artifact(Preset::Tiny, 10));
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.list().count(), 0);
    }
}
