use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use pdf_preset_compressor::{Preset, Session, SessionConfig};

/// Compress a PDF with one or more presets
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Input PDF file
    input: PathBuf,

    /// Preset to apply (medium, small, tiny); repeat for several
    #[arg(long = "preset", value_name = "PRESET")]
    presets: Vec<Preset>,

    /// Directory the compressed files are saved to
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Working directory for intermediate files (defaults to a temporary one)
    #[arg(long)]
    work_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let presets = if args.presets.is_empty() {
        Preset::ALL.to_vec()
    } else {
        args.presets
    };

    let session = Session::new(SessionConfig {
        work_dir: args.work_dir,
    })?;

    println!("Loading PDF: {:?}", args.input);
    let document = session.load_document_from_path(&args.input)?;
    println!(
        "Original size: {:.2} MB",
        document.size_bytes as f64 / 1_048_576.0
    );

    for preset in presets {
        let start = Instant::now();
        match session.apply_preset(preset) {
            Ok(artifact) => println!(
                "{:<8} {:>10.2} MB  {:>6.1}% smaller  ({:.2?})",
                preset.display_name(),
                artifact.size_bytes as f64 / 1_048_576.0,
                artifact.compression_percent,
                start.elapsed()
            ),
            Err(e) => eprintln!("{:<8} failed: {}", preset.display_name(), e),
        }
    }

    let saved = save_artifacts(&session, &args.out_dir);
    session.teardown();
    saved?;
    Ok(())
}

/// Write every artifact of `session` into `out_dir`. An empty session is an
/// error: every requested preset failed.
fn save_artifacts(session: &Session, out_dir: &Path) -> Result<usize> {
    let artifacts = session.artifacts();
    if artifacts.is_empty() {
        bail!("No preset produced a compressed file");
    }
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {:?}", out_dir))?;
    for artifact in &artifacts {
        let download = session.prepare_download(artifact.preset)?;
        let target = out_dir.join(&download.file_name);
        std::fs::write(&target, &download.payload)
            .with_context(|| format!("Failed to save {:?}", target))?;
        println!("Saved {:?}", target);
    }
    Ok(artifacts.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_to_save_is_an_error() {
        let out = tempfile::tempdir().unwrap();
        let session = Session::new(SessionConfig::default()).unwrap();
        session
            .load_document("broken.pdf", b"not a pdf at all".to_vec())
            .unwrap();
        for preset in Preset::ALL {
            assert!(session.apply_preset(preset).is_err());
        }

        let err = save_artifacts(&session, &out.path().join("saved")).unwrap_err();
        assert!(err.to_string().contains("No preset produced"));
        assert!(!out.path().join("saved").exists());
    }
}
