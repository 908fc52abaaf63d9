//! Optional external PNG optimisation.
//!
//! Binaries are invoked with argument vectors only. Every failure keeps the
//! encoder's bytes and is logged, never surfaced.

use std::{
    fs, io,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    time::Instant,
};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("failed to stage PNG for optimisation: {0}")]
    Io(#[from] io::Error),
    #[error("{tool} exited with {exit_code:?}: {stderr}")]
    Tool {
        tool: &'static str,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("{tool} produced no output")]
    EmptyOutput { tool: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PngOptimizer {
    /// `optipng -o1 <file>`, rewriting in place.
    Optipng { path: PathBuf },
    /// `pngcrush <in> <out>`, kept only when smaller.
    Pngcrush { path: PathBuf },
}

impl PngOptimizer {
    /// First enabled optimiser whose binary exists.
    pub fn select(settings: &crate::config::OptimizerSettings) -> Option<Self> {
        if settings.optipng_enabled && settings.optipng_path.is_file() {
            return Some(PngOptimizer::Optipng {
                path: settings.optipng_path.clone(),
            });
        }
        if settings.pngcrush_enabled && settings.pngcrush_path.is_file() {
            return Some(PngOptimizer::Pngcrush {
                path: settings.pngcrush_path.clone(),
            });
        }
        None
    }

    fn tool(&self) -> &'static str {
        match self {
            PngOptimizer::Optipng { .. } => "optipng",
            PngOptimizer::Pngcrush { .. } => "pngcrush",
        }
    }

    /// Run the optimiser, falling back to `png` on any failure.
    pub fn optimize(&self, png: Vec<u8>) -> Vec<u8> {
        let started_at = Instant::now();
        match self.try_optimize(&png) {
            Ok(Some(optimized)) => {
                debug!(
                    target = "thumbd::transform::optimize",
                    op = "optimize::png",
                    result = "ok",
                    tool = self.tool(),
                    before_bytes = png.len(),
                    after_bytes = optimized.len(),
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "PNG optimised"
                );
                optimized
            }
            Ok(None) => png,
            Err(err) => {
                warn!(
                    target = "thumbd::transform::optimize",
                    op = "optimize::png",
                    result = "error",
                    tool = self.tool(),
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error = %err,
                    "PNG optimiser failed; keeping encoder output"
                );
                png
            }
        }
    }

    fn try_optimize(&self, png: &[u8]) -> Result<Option<Vec<u8>>, OptimizeError> {
        let input = tempfile::Builder::new().suffix(".png").tempfile()?;
        fs::write(input.path(), png)?;

        match self {
            PngOptimizer::Optipng { path } => {
                let mut command = Command::new(path);
                command.arg("-o1").arg(input.path());
                run(self.tool(), command)?;
                let optimized = fs::read(input.path())?;
                if optimized.is_empty() {
                    return Err(OptimizeError::EmptyOutput { tool: self.tool() });
                }
                Ok(Some(optimized))
            }
            PngOptimizer::Pngcrush { path } => {
                let output = sibling_output(&input)?;
                let mut command = Command::new(path);
                command.arg(input.path()).arg(output.path());
                run(self.tool(), command)?;
                let crushed = fs::read(output.path())?;
                if crushed.is_empty() {
                    return Err(OptimizeError::EmptyOutput { tool: self.tool() });
                }
                Ok((crushed.len() < png.len()).then_some(crushed))
            }
        }
    }
}

fn sibling_output(input: &NamedTempFile) -> io::Result<NamedTempFile> {
    let directory = input.path().parent().unwrap_or(Path::new("."));
    tempfile::Builder::new()
        .suffix(".png")
        .tempfile_in(directory)
}

fn run(tool: &'static str, mut command: Command) -> Result<(), OptimizeError> {
    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|err| match err.kind() {
            ErrorKind::NotFound => OptimizeError::Tool {
                tool,
                exit_code: None,
                stderr: err.to_string(),
            },
            _ => OptimizeError::Io(err),
        })?;
    if output.status.success() {
        Ok(())
    } else {
        Err(OptimizeError::Tool {
            tool,
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
