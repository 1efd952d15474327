use std::io::ErrorKind;
use std::process::Command;

use super::{TileJob, Tiler, TilingError};
use crate::progress::TileProgress;

/// Shells out to `vips dzsave`. Reports no progress.
#[derive(Debug, Clone)]
pub struct VipsCliTiler {
    program: String,
}

impl VipsCliTiler {
    pub fn new(program: String) -> Self {
        Self { program }
    }

    pub fn command(&self, job: &TileJob) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("dzsave")
            .arg(&job.source)
            .arg(&job.output_base)
            .args(["--layout", "dz"])
            .args(["--tile-size", &job.params.tile_size.to_string()])
            .args(["--overlap", &job.params.overlap.to_string()])
            .args(["--suffix", &job.params.vips_suffix()]);
        command
    }
}

impl Tiler for VipsCliTiler {
    fn name(&self) -> &'static str {
        "vips"
    }

    fn tile(&self, job: &TileJob, _progress: &dyn Fn(TileProgress)) -> Result<(), TilingError> {
        tracing::info!(program = %self.program, source = %job.source.display(), "running vips dzsave");
        let output = self.command(job).output().map_err(|err| match err.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => TilingError::ToolUnavailable {
                tool: self.program.clone(),
                source: err,
            },
            _ => TilingError::Io(err),
        })?;
        if !output.status.success() {
            return Err(TilingError::ToolFailed {
                tool: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
