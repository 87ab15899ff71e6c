//! Vision/OCR Layer
//!
//! Runs text recognition over captured frames. The engine sits behind the
//! [`OcrEngine`] trait so a different backend (another local program, a
//! remote service) can be dropped in without touching the pipeline.
//!
//! The [`RecognitionAdapter`] owns the parts of the contract that are
//! artifacts of the engine's output format: line breaks are folded into
//! single spaces and the text is trimmed before anyone else sees it.

#[cfg(test)]
pub mod mock;
pub mod tesseract;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::capture::{CapturedFrame, FrameId};

pub use tesseract::TesseractCli;

/// Recognition language. The pipeline only reads English sidewalls.
pub const RECOGNITION_LANGUAGE: &str = "eng";

/// A text recognition backend
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Recognize text in a PNG-encoded image
    async fn recognize(&self, png: &[u8], language: &str) -> anyhow::Result<String>;
}

/// Recognition did not produce text
#[derive(Debug, Error)]
pub enum RecognitionError {
    /// The engine ran and failed
    #[error("OCR engine failed: {0:#}")]
    Engine(anyhow::Error),
    /// The engine did not answer in time
    #[error("OCR timed out after {0:?}")]
    Timeout(Duration),
    /// The frame cannot be fed to the engine
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),
}

/// Normalized text recognized in one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionResult {
    pub frame: FrameId,
    pub text: String,
}

/// Fold engine line breaks into single spaces and trim the ends
pub fn normalize_text(raw: &str) -> String {
    raw.replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .trim()
        .to_string()
}

/// Single-shot, no-retry wrapper around an [`OcrEngine`]
pub struct RecognitionAdapter {
    engine: Arc<dyn OcrEngine>,
    timeout: Duration,
}

impl RecognitionAdapter {
    pub fn new(engine: Arc<dyn OcrEngine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Recognize the text in `frame`
    pub async fn recognize(
        &self,
        frame: &CapturedFrame,
    ) -> Result<RecognitionResult, RecognitionError> {
        if frame.png().is_empty() {
            return Err(RecognitionError::UnsupportedInput(
                "frame has no encoded image".to_string(),
            ));
        }

        let start = Instant::now();
        debug!(frame = %frame.id(), engine = self.engine.name(), "Dispatching recognition");

        let raw = tokio::time::timeout(
            self.timeout,
            self.engine.recognize(frame.png(), RECOGNITION_LANGUAGE),
        )
        .await
        .map_err(|_| RecognitionError::Timeout(self.timeout))
        .and_then(|outcome| outcome.map_err(RecognitionError::Engine))
        .inspect_err(|e| error!(frame = %frame.id(), "Error processing image: {}", e))?;

        let text = normalize_text(&raw);
        info!(
            frame = %frame.id(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            since_capture_ms = frame.timestamp().elapsed().as_millis() as u64,
            "Extracted text: {}",
            text
        );

        Ok(RecognitionResult {
            frame: frame.id(),
            text,
        })
    }
}
