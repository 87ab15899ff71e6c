//! Pipeline driver
//!
//! Executes the effects requested by the [`PipelineMachine`] against the
//! camera and OCR backends. Everything runs on one task: commands and
//! completion events are applied strictly one at a time, while camera
//! opens and recognitions run as spawned tasks that report back over a
//! channel. The backends run on an inner task of their own, so a backend
//! that panics still reports a failed outcome.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info, warn};

use super::state::{Effect, Event, PipelineMachine, PipelineSnapshot};
use crate::camera::{DeviceAccessError, FacingMode, SessionError, SessionManager};
use crate::capture::{CaptureError, FrameCapturer, FrameId};
use crate::shared::UiCommand;
use crate::vision::{RecognitionAdapter, RecognitionError};

/// How often stream readiness is re-checked while nothing else happens
const READINESS_POLL: Duration = Duration::from_millis(100);

/// Run backend work on its own task. Aborting the outer task drops the
/// handle, which aborts the work with it.
fn spawn_inner<F>(work: F) -> AbortOnDropHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    AbortOnDropHandle::new(tokio::spawn(work))
}

/// Turn a backend task that died into an error the pipeline can show
fn task_failure(what: &str, e: JoinError) -> anyhow::Error {
    if e.is_panic() {
        error!("{} panicked", what);
        anyhow::anyhow!("{} panicked", what)
    } else {
        error!("{} task stopped: {}", what, e);
        anyhow::anyhow!("{} task stopped: {}", what, e)
    }
}

pub struct PipelineDriver {
    machine: PipelineMachine,
    sessions: Arc<SessionManager>,
    capturer: FrameCapturer,
    recognizer: Arc<RecognitionAdapter>,
    facing: FacingMode,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    /// Pending camera open
    open_task: Option<JoinHandle<()>>,
    /// In-flight recognition and the frame it belongs to
    recognition: Option<(FrameId, JoinHandle<()>)>,
}

impl PipelineDriver {
    pub fn new(
        sessions: Arc<SessionManager>,
        recognizer: Arc<RecognitionAdapter>,
        facing: FacingMode,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            machine: PipelineMachine::new(),
            sessions,
            capturer: FrameCapturer::new(),
            recognizer,
            facing,
            events_tx,
            events_rx,
            open_task: None,
            recognition: None,
        }
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        self.machine.snapshot(self.sessions.is_ready())
    }

    /// Apply a UI request
    pub fn handle_command(&mut self, command: UiCommand) {
        debug!(?command, "UI command");
        match command {
            UiCommand::OpenCamera => self.dispatch(Event::OpenCamera),
            UiCommand::Capture => {
                if !self.sessions.is_ready() {
                    warn!("Capture requested before the camera produced a frame");
                    return;
                }
                self.dispatch(Event::Capture);
            }
            UiCommand::Reset => self.dispatch(Event::Reset),
            UiCommand::Shutdown => self.shutdown(),
        }
    }

    /// Feed one event through the machine and carry out its effects
    pub fn dispatch(&mut self, event: Event) {
        match &event {
            Event::SessionOpened(_) => self.open_task = None,
            Event::RecognitionFinished { frame, .. } => {
                if self.recognition.as_ref().is_some_and(|(id, _)| id == frame) {
                    self.recognition = None;
                }
            }
            _ => {}
        }

        for effect in self.machine.update(event) {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::OpenSession => {
                let sessions = self.sessions.clone();
                let events = self.events_tx.clone();
                let facing = self.facing;
                let task = tokio::spawn(async move {
                    let open = spawn_inner(async move { sessions.open(facing).await });
                    let outcome = open.await.unwrap_or_else(|e| {
                        Err(SessionError::DeviceAccess(DeviceAccessError::Stream(
                            task_failure("camera open", e),
                        )))
                    });
                    let _ = events.send(Event::SessionOpened(outcome));
                });
                if let Some(previous) = self.open_task.replace(task) {
                    // The session manager coalesces overlapping opens
                    debug!(finished = previous.is_finished(), "Replacing camera open task");
                }
            }
            Effect::CaptureFrame => {
                let outcome = self
                    .sessions
                    .with_session(|session| self.capturer.capture(session))
                    .unwrap_or(Err(CaptureError::NotReady));
                self.dispatch(Event::FrameCaptured(outcome));
            }
            Effect::Recognize(frame) => {
                let id = frame.id();
                let recognizer = self.recognizer.clone();
                let events = self.events_tx.clone();
                let task = tokio::spawn(async move {
                    let recognition =
                        spawn_inner(async move { recognizer.recognize(&frame).await });
                    let outcome = recognition.await.unwrap_or_else(|e| {
                        Err(RecognitionError::Engine(task_failure("recognition", e)))
                    });
                    let _ = events.send(Event::RecognitionFinished { frame: id, outcome });
                });
                if let Some((stale, handle)) = self.recognition.replace((id, task)) {
                    warn!(frame = %stale, "Aborting recognition for a superseded frame");
                    handle.abort();
                }
                self.dispatch(Event::RecognitionDispatched(id));
            }
            Effect::CancelRecognition(id) => match self.recognition.take() {
                Some((running, handle)) if running == id => {
                    info!(frame = %id, "Cancelling recognition");
                    handle.abort();
                }
                other => {
                    debug!(frame = %id, "No recognition running for cancelled frame");
                    self.recognition = other;
                }
            },
        }
    }

    /// Process events until `done` accepts the current snapshot
    pub async fn run_until(
        &mut self,
        mut done: impl FnMut(&PipelineSnapshot) -> bool,
    ) -> PipelineSnapshot {
        loop {
            let snapshot = self.snapshot();
            if done(&snapshot) {
                return snapshot;
            }
            tokio::select! {
                Some(event) = self.events_rx.recv() => self.dispatch(event),
                _ = tokio::time::sleep(READINESS_POLL) => {}
            }
        }
    }

    /// Serve UI commands until shutdown, publishing a snapshot after every
    /// change.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<UiCommand>,
        shutdown: CancellationToken,
        mut publish: impl FnMut(PipelineSnapshot),
    ) {
        let mut last_ready = self.sessions.is_ready();
        publish(self.snapshot());

        let mut poll = tokio::time::interval(READINESS_POLL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Pipeline driver running");
        loop {
            let changed = tokio::select! {
                _ = shutdown.cancelled() => break,
                command = commands.recv() => match command {
                    Some(UiCommand::Shutdown) | None => break,
                    Some(command) => {
                        self.handle_command(command);
                        true
                    }
                },
                Some(event) = self.events_rx.recv() => {
                    self.dispatch(event);
                    true
                }
                // Stream readiness changes without an event
                _ = poll.tick() => self.sessions.is_ready() != last_ready,
            };

            if changed {
                let snapshot = self.snapshot();
                last_ready = snapshot.session_ready;
                publish(snapshot);
            }
        }

        self.shutdown();
    }

    /// Stop pending work and release the camera
    pub fn shutdown(&mut self) {
        if let Some(task) = self.open_task.take() {
            task.abort();
        }
        if let Some((id, task)) = self.recognition.take() {
            debug!(frame = %id, "Aborting recognition on shutdown");
            task.abort();
        }
        self.sessions.close();
        info!("Pipeline driver stopped");
    }
}
