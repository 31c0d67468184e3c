//! PDF codec capability used by the compression pipeline.
//!
//! The pipeline only talks to [`PdfCodec`]; [`LopdfCodec`] is the
//! implementation shipped with the crate.

use anyhow::Result;

mod content;
mod images;
mod lopdf_codec;

pub use lopdf_codec::LopdfCodec;

/// Counters reported by the image stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageStats {
    pub requantized: usize,
    pub skipped: usize,
}

/// Byte-level PDF transforms.
///
/// Implementations must be shareable across threads: a session runs the
/// pipeline on whichever thread drives the job.
pub trait PdfCodec: Send + Sync {
    type Document;

    /// Parse a document from memory.
    fn open(&self, bytes: &[u8]) -> Result<Self::Document>;

    /// Re-encode every raster image in every page at `quality` (1-100).
    /// Page structure and metadata must stay unchanged.
    fn requantize_images(&self, doc: &mut Self::Document, quality: u8) -> Result<ImageStats>;

    /// Recompress every page's content streams at `level` (0-9).
    /// Returns the number of streams rewritten.
    fn recompress_content_streams(&self, doc: &mut Self::Document, level: u32) -> Result<usize>;

    /// Serialise the document.
    fn write(&self, doc: Self::Document) -> Result<Vec<u8>>;
}
