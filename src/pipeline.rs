//! Two-stage compression pipeline: image requantization, then content-stream
//! recompression. Pure with respect to session state; everything it touches
//! arrives as arguments.

use std::fmt;
use std::time::Instant;

use log::info;
use thiserror::Error;

use crate::codec::{ImageStats, PdfCodec};
use crate::preset::PresetConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Open,
    ImageRequantization,
    ContentRecompression,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Open => "open",
            Stage::ImageRequantization => "image requantization",
            Stage::ContentRecompression => "content-stream recompression",
            Stage::Write => "write",
        })
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("source document is empty")]
    InvalidSourceSize,

    #[error("{stage} stage failed: {source:#}")]
    Stage {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },
}

/// Size metrics of one compression run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionMetrics {
    pub original_size_bytes: u64,
    pub compressed_size_bytes: u64,
}

impl CompressionMetrics {
    /// Fails with [`PipelineError::InvalidSourceSize`] when the ratio would
    /// divide by zero.
    pub fn new(original_size_bytes: u64, compressed_size_bytes: u64) -> Result<Self, PipelineError> {
        if original_size_bytes == 0 {
            return Err(PipelineError::InvalidSourceSize);
        }
        Ok(Self {
            original_size_bytes,
            compressed_size_bytes,
        })
    }

    /// compressed / original
    pub fn compression_ratio(&self) -> f64 {
        self.compressed_size_bytes as f64 / self.original_size_bytes as f64
    }

    /// Space saved in percent; negative when the output grew.
    pub fn compression_percent(&self) -> f64 {
        (1.0 - self.compression_ratio()) * 100.0
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub bytes: Vec<u8>,
    pub metrics: CompressionMetrics,
    pub images: ImageStats,
    pub streams_recompressed: usize,
}

fn failed_at(stage: Stage) -> impl FnOnce(anyhow::Error) -> PipelineError {
    move |source| PipelineError::Stage { stage, source }
}

pub struct CompressionPipeline<C> {
    codec: C,
}

impl<C: PdfCodec> CompressionPipeline<C> {
    pub fn new(codec: C) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Run both stages over `source`. Any failure aborts the whole run and
    /// nothing is produced.
    pub fn run(&self, source: &[u8], config: PresetConfig) -> Result<PipelineOutput, PipelineError> {
        if source.is_empty() {
            return Err(PipelineError::InvalidSourceSize);
        }
        let start = Instant::now();

        let mut doc = self.codec.open(source).map_err(failed_at(Stage::Open))?;

        info!("Reducing image quality to {}", config.image_quality);
        let images = self
            .codec
            .requantize_images(&mut doc, config.image_quality)
            .map_err(failed_at(Stage::ImageRequantization))?;

        info!("Compressing content streams with level {}", config.stream_compression_level);
        let streams_recompressed = self
            .codec
            .recompress_content_streams(&mut doc, config.stream_compression_level)
            .map_err(failed_at(Stage::ContentRecompression))?;

        let bytes = self.codec.write(doc).map_err(failed_at(Stage::Write))?;
        let metrics = CompressionMetrics::new(source.len() as u64, bytes.len() as u64)?;

        info!(
            "Compressed {} -> {} bytes ({:.1}% smaller) in {:.2?}",
            metrics.original_size_bytes,
            metrics.compressed_size_bytes,
            metrics.compression_percent(),
            start.elapsed()
        );

        Ok(PipelineOutput {
            bytes,
            metrics,
            images,
            streams_recompressed,
        })
    }
}
