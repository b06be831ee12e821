use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};

use super::DecoderCommandBuilder;
use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::DecoderLauncher;
use crate::domain::value_objects::CameraConfig;

/// Spawns ffmpeg (or a compatible binary) per camera
pub struct FfmpegLauncher {
    program: PathBuf,
}

impl FfmpegLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

impl Default for FfmpegLauncher {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl DecoderLauncher for FfmpegLauncher {
    fn launch(&self, camera: &CameraConfig) -> Result<Child> {
        let args = DecoderCommandBuilder::build_args(camera);
        tracing::debug!(program = %self.program.display(), args = ?args, "Spawning decoder");

        Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| DomainError::ProcessSpawnFailure {
                camera: camera.source().to_string(),
                reason: format!("{}: {}", self.program.display(), err),
            })
    }
}
