//! Session controller.
//!
//! A [`Session`] owns the currently loaded document, the artifacts derived
//! from it and the files both live in. Methods take `&self` so a job can run
//! on one thread while another observes [`Session::status`]; the short-lived
//! state lock is never held across the pipeline. Single-flight comes from the
//! [`ConcurrencyGuard`], and loading or resetting is refused while it is busy.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::codec::{LopdfCodec, PdfCodec};
use crate::config::{SessionConfig, Workspace};
use crate::error::{Result, SessionError};
use crate::guard::{ConcurrencyGuard, GuardPermit, GuardState};
use crate::pipeline::{CompressionPipeline, PipelineError};
use crate::preset::Preset;
use crate::store::{Artifact, ArtifactStore, ArtifactSummary};
use crate::tempfiles::{
    artifact_filename, has_pdf_extension, safe_filename, write_atomic, CleanupReport,
    TempFileSet,
};

pub const PDF_MIME_TYPE: &str = "application/pdf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSummary {
    pub name: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub document: Option<DocumentSummary>,
    pub is_processing: bool,
    pub active_preset: Option<Preset>,
}

/// An artifact ready to hand to a save action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub mime_type: &'static str,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
struct LoadedDocument {
    name: String,
    bytes: Arc<Vec<u8>>,
}

impl LoadedDocument {
    fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            name: self.name.clone(),
            size_bytes: self.bytes.len() as u64,
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    document: Option<LoadedDocument>,
    artifacts: ArtifactStore,
    temp_files: TempFileSet,
    /// Bumped whenever the document and its artifacts are discarded.
    epoch: u64,
    closed: bool,
}

impl SessionState {
    /// Drop the document and every artifact, then delete all tracked files.
    fn discard(&mut self) -> CleanupReport {
        self.artifacts.clear();
        self.document = None;
        self.epoch += 1;
        self.temp_files.cleanup(&BTreeSet::new())
    }
}

/// A granted compression request, detached from the state lock.
struct Job {
    permit: GuardPermit,
    source: Arc<Vec<u8>>,
    name: String,
    epoch: u64,
}

pub struct Session<C = LopdfCodec> {
    pipeline: CompressionPipeline<C>,
    guard: Arc<ConcurrencyGuard>,
    state: Mutex<SessionState>,
    workspace: Workspace,
}

impl Session<LopdfCodec> {
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::with_codec(config, LopdfCodec)
    }
}

impl<C> Session<C> {
    /// Directory holding the source copy and the artifacts.
    pub fn work_dir(&self) -> &Path {
        self.workspace.path()
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.state.lock();
        let active_preset = match self.guard.state() {
            GuardState::Busy(preset) => Some(preset),
            GuardState::Idle => None,
        };
        SessionStatus {
            document: state.document.as_ref().map(LoadedDocument::summary),
            is_processing: active_preset.is_some(),
            active_preset,
        }
    }

    /// Artifacts of the current document in the order they were first produced.
    pub fn artifacts(&self) -> Vec<ArtifactSummary> {
        self.state.lock().artifacts.list().map(Artifact::summary).collect()
    }

    /// Paths currently tracked for cleanup.
    pub fn temp_files(&self) -> Vec<PathBuf> {
        self.state.lock().temp_files.paths().cloned().collect()
    }

    /// Read an artifact back for saving.
    pub fn prepare_download(&self, preset: Preset) -> Result<Download> {
        let (file_name, path) = {
            let state = self.state.lock();
            let artifact = state
                .artifacts
                .get(preset)
                .ok_or(SessionError::ArtifactNotFound(preset))?;
            (artifact.filename.clone(), artifact.path.clone())
        };
        let payload =
            std::fs::read(&path).map_err(|e| SessionError::io("reading artifact", e))?;
        Ok(Download {
            file_name,
            mime_type: PDF_MIME_TYPE,
            payload,
        })
    }

    /// Forget the document and its artifacts and delete their files.
    ///
    /// Refused with [`SessionError::OperationInProgress`] while a job runs.
    pub fn reset_session(&self) -> Result<()> {
        let mut state = self.state.lock();
        if self.guard.is_busy() {
            warn!("Reset requested while processing, refusing");
            return Err(SessionError::OperationInProgress);
        }
        let report = state.discard();
        info!(
            "Application reset to clean state ({} files removed, {} failed)",
            report.removed.len(),
            report.failed.len()
        );
        Ok(())
    }

    /// Final cleanup at shutdown. Runs regardless of a job in flight, never
    /// fails, and is safe to call more than once. Also runs on drop.
    pub fn teardown(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        if self.guard.is_busy() {
            warn!("Tearing down while processing; the running job's output will be discarded");
        }
        let report = state.discard();
        for path in &report.failed {
            error!("Could not remove {:?} during teardown", path);
        }
        debug!("Session torn down");
    }
}

impl<C: PdfCodec> Session<C> {
    pub fn with_codec(config: SessionConfig, codec: C) -> Result<Self> {
        Ok(Self {
            pipeline: CompressionPipeline::new(codec),
            guard: ConcurrencyGuard::new(),
            state: Mutex::new(SessionState::default()),
            workspace: Workspace::create(&config)?,
        })
    }

    /// Make `bytes` the current document, discarding the previous one and
    /// everything derived from it.
    ///
    /// A non-PDF name is rejected before anything else is touched.
    pub fn load_document(&self, name: &str, bytes: Vec<u8>) -> Result<DocumentSummary> {
        let name = Path::new(name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        if !has_pdf_extension(&name) {
            warn!("Not a PDF file: {}", name);
            return Err(SessionError::InvalidFileType(name));
        }

        let mut state = self.state.lock();
        if state.closed {
            return Err(SessionError::SessionClosed);
        }
        if self.guard.is_busy() {
            warn!("Load of {} requested while processing, refusing", name);
            return Err(SessionError::OperationInProgress);
        }

        let report = state.discard();
        debug!("Discarded previous document ({} files removed)", report.removed.len());

        let path = self.workspace.path().join(safe_filename(&name));
        write_atomic(&path, &bytes).map_err(|e| SessionError::io("saving source copy", e))?;
        state.temp_files.register(path);

        let document = LoadedDocument {
            name,
            bytes: Arc::new(bytes),
        };
        let summary = document.summary();
        state.document = Some(document);
        info!("Loaded {} ({} bytes)", summary.name, summary.size_bytes);
        Ok(summary)
    }

    /// Read a PDF from disk and load it.
    pub fn load_document_from_path(&self, path: &Path) -> Result<DocumentSummary> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !has_pdf_extension(&name) {
            warn!("Not a PDF file: {:?}", path);
            return Err(SessionError::InvalidFileType(name));
        }
        let bytes = std::fs::read(path).map_err(|e| SessionError::io("reading input", e))?;
        self.load_document(&name, bytes)
    }

    /// Compress the current document with `preset` on the calling thread.
    ///
    /// Fails immediately with [`SessionError::AlreadyProcessing`] if another
    /// job holds the guard. On success the artifact for `preset` is stored,
    /// replacing any earlier one.
    pub fn apply_preset(&self, preset: Preset) -> Result<ArtifactSummary> {
        let job = self.begin(preset)?;
        self.run_job(job)
    }

    fn begin(&self, preset: Preset) -> Result<Job> {
        let state = self.state.lock();
        if state.closed {
            return Err(SessionError::SessionClosed);
        }
        let document = state
            .document
            .as_ref()
            .ok_or(SessionError::NoDocumentLoaded)?;
        let permit = self.guard.try_acquire(preset).map_err(|e| {
            warn!("Please wait for the current processing to finish");
            e
        })?;
        Ok(Job {
            permit,
            source: Arc::clone(&document.bytes),
            name: document.name.clone(),
            epoch: state.epoch,
        })
    }

    fn run_job(&self, job: Job) -> Result<ArtifactSummary> {
        let preset = job.permit.preset();
        let config = preset.config();
        info!(
            "Processing {} with preset {} (quality={}, level={})",
            job.name,
            preset.display_name(),
            config.image_quality,
            config.stream_compression_level
        );

        let output = self.pipeline.run(&job.source, config).map_err(|e| match e {
            PipelineError::InvalidSourceSize => SessionError::InvalidSourceSize,
            e @ PipelineError::Stage { .. } => {
                error!("Error processing PDF: {}", e);
                SessionError::CompressionFailed(e.to_string())
            }
        })?;

        let filename = artifact_filename(&job.name, preset);
        let path = self.workspace.path().join(&filename);
        debug!("Writing compressed file: {}", filename);
        write_atomic(&path, &output.bytes)
            .map_err(|e| SessionError::io("writing artifact", e))?;

        let mut state = self.state.lock();
        if state.epoch != job.epoch {
            // Torn down while the pipeline ran.
            if let Err(e) = std::fs::remove_file(&path) {
                error!("Error removing file {:?}: {}", path, e);
            }
            return Err(SessionError::SessionClosed);
        }
        state.temp_files.register(path.clone());
        let artifact = Artifact {
            preset,
            filename,
            path,
            metrics: output.metrics,
        };
        let summary = artifact.summary();
        if state.artifacts.put(artifact).is_some() {
            debug!("Replaced previous {} artifact", preset);
        }
        info!(
            "PDF compressed successfully with {} preset! Saved {:.1}% of space",
            preset.display_name(),
            summary.compression_percent
        );
        Ok(summary)
    }
}

impl<C: PdfCodec + 'static> Session<C> {
    /// Start a job on a background thread.
    ///
    /// The guard is taken before returning, so a denial is reported right
    /// here rather than from the thread.
    pub fn spawn_preset(
        self: &Arc<Self>,
        preset: Preset,
    ) -> Result<JoinHandle<Result<ArtifactSummary>>> {
        let job = self.begin(preset)?;
        let session = Arc::clone(self);
        thread::Builder::new()
            .name(format!("compress-{}", preset))
            .spawn(move || session.run_job(job))
            .map_err(|e| SessionError::io("spawning compression worker", e))
    }
}

impl<C> Drop for Session<C> {
    fn drop(&mut self) {
        self.teardown();
    }
}
