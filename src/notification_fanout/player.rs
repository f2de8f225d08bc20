//! Local audio playback via an external player process

use crate::error::{Error, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// External audio player command (e.g. `afplay`, `ffplay -nodisp -autoexit`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPlayer {
    program: String,
    args: Vec<String>,
}

impl AudioPlayer {
    /// Parse a command line such as `ffplay -nodisp -autoexit`
    pub fn parse(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| Error::Config("audio player command is empty".to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }

    /// Start playback and return immediately; the process is reaped in the background
    pub fn spawn_detached(&self, path: &Path) -> Result<()> {
        let mut cmd = self.command(path);
        cmd.stderr(Stdio::null());
        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Internal(format!("{} spawn failed: {}", self.program, e)))?;

        let program = self.program.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if !status.success() => {
                    tracing::warn!(player = %program, status = %status, "Audio player exited with error");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(player = %program, error = %e, "Audio player wait failed");
                }
            }
        });

        Ok(())
    }

    /// Play to completion, killing the player if it exceeds `timeout`
    pub async fn play(&self, path: &Path, timeout: Duration) -> Result<()> {
        let child = self
            .command(path)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Internal(format!("{} spawn failed: {}", self.program, e)))?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(Error::Internal(format!(
                    "{} failed: {}",
                    self.program,
                    stderr.trim()
                )))
            }
            Ok(Err(e)) => Err(Error::Internal(format!("{} execution failed: {}", self.program, e))),
            Err(_) => {
                tracing::warn!(
                    player = %self.program,
                    timeout_sec = timeout.as_secs(),
                    "Playback timeout, process killed via kill_on_drop"
                );
                Err(Error::Internal(format!(
                    "{} timeout ({}s)",
                    self.program,
                    timeout.as_secs()
                )))
            }
        }
    }
}
