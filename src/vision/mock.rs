//! Scripted OCR engine for tests

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::oneshot;

use super::OcrEngine;

/// Answers from a queue of scripted responses. Calls can be held pending
/// until the test releases them.
#[derive(Default)]
pub struct MockOcr {
    responses: Mutex<VecDeque<Result<String, String>>>,
    holds: Mutex<VecDeque<oneshot::Receiver<()>>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    last_language: Mutex<Option<String>>,
    panic_next: AtomicBool,
}

impl MockOcr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue recognized text for the next call
    pub fn push_text(&self, text: &str) {
        self.responses.lock().push_back(Ok(text.to_string()));
    }

    /// Queue an engine failure for the next call
    pub fn push_failure(&self, message: &str) {
        self.responses.lock().push_back(Err(message.to_string()));
    }

    /// Make the next call panic inside the engine
    pub fn panic_next(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    /// Keep the next call pending until the returned sender fires (or is dropped)
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.holds.lock().push_back(rx);
        tx
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn last_language(&self) -> Option<String> {
        self.last_language.lock().clone()
    }
}

/// Decrements the in-flight counter even if the call is aborted
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl OcrEngine for MockOcr {
    fn name(&self) -> &str {
        "mock"
    }

    async fn recognize(&self, _png: &[u8], language: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);
        *self.last_language.lock() = Some(language.to_string());

        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("mock OCR engine crashed");
        }

        let hold = self.holds.lock().pop_front();
        if let Some(hold) = hold {
            if hold.await.is_err() {
                // Sender dropped without releasing: stay pending forever
                std::future::pending::<()>().await;
            }
        }

        let response = self.responses.lock().pop_front();
        match response {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(String::new()),
        }
    }
}
