//! Preset-based PDF compression sessions.
//!
//! Load one PDF into a [`Session`], apply any of the fixed [`Preset`]s and
//! collect one compressed artifact per preset. Each run re-encodes embedded
//! images as JPEG and then recompresses page content streams.
//!
//! ```no_run
//! use pdf_preset_compressor::{Preset, Session, SessionConfig};
//!
//! # fn main() -> Result<(), pdf_preset_compressor::SessionError> {
//! let session = Session::new(SessionConfig::default())?;
//! session.load_document_from_path("report.pdf".as_ref())?;
//! let small = session.apply_preset(Preset::Small)?;
//! println!("{}: {:.1}% smaller", small.filename, small.compression_percent);
//! let download = session.prepare_download(Preset::Small)?;
//! std::fs::write(&download.file_name, &download.payload).ok();
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod guard;
pub mod pipeline;
pub mod preset;
pub mod session;
pub mod store;
pub mod tempfiles;

pub use codec::{ImageStats, LopdfCodec, PdfCodec};
pub use config::SessionConfig;
pub use error::{LoadError, ProcessingError, Result, SessionError};
pub use guard::{ConcurrencyGuard, GuardPermit, GuardState};
pub use pipeline::{CompressionMetrics, CompressionPipeline, PipelineError, PipelineOutput};
pub use preset::{Preset, PresetConfig};
pub use session::{DocumentSummary, Download, Session, SessionStatus, PDF_MIME_TYPE};
pub use store::{Artifact, ArtifactStore, ArtifactSummary};
pub use tempfiles::{CleanupReport, TempFileSet};
