//! Tesseract command-line backend
//!
//! Pipes the PNG into `tesseract stdin stdout -l <lang>` and reads the
//! recognized text back. The child is killed if the call is dropped.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::OcrEngine;

pub struct TesseractCli {
    program: String,
}

impl TesseractCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, language: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, png: &[u8], language: &str) -> Result<String> {
        let mut child = self
            .command(language)
            .spawn()
            .with_context(|| format!("Failed to start {}", self.program))?;

        let mut stdin = child
            .stdin
            .take()
            .context("Failed to open tesseract stdin")?;

        let feed = async move {
            stdin.write_all(png).await?;
            stdin.shutdown().await
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());

        let output = output.context("Failed to wait for tesseract")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("tesseract exited with {}: {}", output.status, stderr.trim());
        }
        fed.context("Failed to write image to tesseract")?;

        debug!(bytes = output.stdout.len(), "tesseract finished");
        String::from_utf8(output.stdout).context("tesseract produced invalid UTF-8")
    }
}
