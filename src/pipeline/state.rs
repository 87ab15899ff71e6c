//! Pipeline state machine
//!
//! [`PipelineMachine`] is a plain value with one entry point,
//! [`PipelineMachine::update`]. It never performs I/O: it decides the next
//! state and returns the [`Effect`]s the driver must carry out. Completion
//! of those effects comes back in as further [`Event`]s.

use serde::{Serialize, Serializer};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::analysis::{self, TireDimensions, TireSize};
use crate::camera::{SessionError, SessionInfo};
use crate::capture::{CaptureError, CapturedFrame, FrameId};
use crate::vision::{RecognitionError, RecognitionResult};

/// Why the pipeline is showing an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Camera missing or access denied
    DeviceAccess,
    /// The live frame could not be captured
    CaptureFailure,
    /// The OCR engine failed to run
    RecognitionFailure,
    /// Text was read but held no tire size
    NoMatch,
}

impl ErrorKind {
    /// Single-line message shown to the user
    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::DeviceAccess => {
                "Unable to access the camera. Please check permissions and retry."
            }
            ErrorKind::CaptureFailure => "Failed to capture image. Please retry.",
            ErrorKind::RecognitionFailure => "Failed to extract text from image.",
            ErrorKind::NoMatch => "No valid tire size detected. Please retry.",
        }
    }
}

/// The single observable pipeline state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "name", content = "detail", rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    SessionOpen,
    /// A still was just taken; recognition not yet dispatched
    Captured,
    Processing,
    Resolved(TireSize),
    Failed(ErrorKind),
}

impl PipelineState {
    /// Whether a captured frame must exist in this state
    pub fn has_frame(&self) -> bool {
        matches!(
            self,
            PipelineState::Captured
                | PipelineState::Processing
                | PipelineState::Resolved(_)
                | PipelineState::Failed(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::SessionOpen => "session_open",
            PipelineState::Captured => "captured",
            PipelineState::Processing => "processing",
            PipelineState::Resolved(_) => "resolved",
            PipelineState::Failed(_) => "failed",
        }
    }
}

/// Inputs to the state machine: user requests and effect completions
#[derive(Debug)]
pub enum Event {
    OpenCamera,
    SessionOpened(Result<SessionInfo, SessionError>),
    Capture,
    FrameCaptured(Result<CapturedFrame, CaptureError>),
    RecognitionDispatched(FrameId),
    RecognitionFinished {
        frame: FrameId,
        outcome: Result<RecognitionResult, RecognitionError>,
    },
    Reset,
}

/// Work the driver must perform on the machine's behalf
#[derive(Debug)]
pub enum Effect {
    /// (Re)open the camera session
    OpenSession,
    /// Snapshot the live stream and report back with `FrameCaptured`
    CaptureFrame,
    /// Start recognition for this frame and report `RecognitionDispatched`
    Recognize(Arc<CapturedFrame>),
    /// Stop waiting on recognition for a discarded frame
    CancelRecognition(FrameId),
}

/// What the UI renders from
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSnapshot {
    pub state: PipelineState,
    /// Serialized as a PNG data URL
    #[serde(rename = "picture", serialize_with = "serialize_picture")]
    pub frame: Option<Arc<CapturedFrame>>,
    pub frame_id: Option<FrameId>,
    pub frame_size: Option<(u32, u32)>,
    /// Numeric fields of a resolved size
    pub tire_dimensions: Option<TireDimensions>,
    pub session_ready: bool,
    pub opening: bool,
    pub can_open: bool,
    pub can_capture: bool,
    pub can_reset: bool,
    pub error: Option<ErrorKind>,
    pub error_message: Option<&'static str>,
}

fn serialize_picture<S: Serializer>(
    frame: &Option<Arc<CapturedFrame>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match frame {
        Some(frame) => serializer.serialize_some(&frame.data_url()),
        None => serializer.serialize_none(),
    }
}

impl PipelineSnapshot {
    pub fn tire_size(&self) -> Option<&TireSize> {
        match &self.state {
            PipelineState::Resolved(size) => Some(size),
            _ => None,
        }
    }

    /// Recognition is pending for the shown frame
    pub fn is_processing(&self) -> bool {
        matches!(
            self.state,
            PipelineState::Captured | PipelineState::Processing
        )
    }
}

impl Default for PipelineSnapshot {
    fn default() -> Self {
        PipelineMachine::new().snapshot(false)
    }
}

/// Exclusively-owned pipeline state plus the frame it refers to
#[derive(Debug)]
pub struct PipelineMachine {
    state: PipelineState,
    frame: Option<Arc<CapturedFrame>>,
    /// Error surfaced while no frame exists (device access, capture)
    error: Option<ErrorKind>,
    /// A session open is pending
    opening: bool,
}

impl Default for PipelineMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMachine {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            frame: None,
            error: None,
            opening: false,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    #[cfg(test)]
    pub fn frame(&self) -> Option<&Arc<CapturedFrame>> {
        self.frame.as_ref()
    }

    #[cfg(test)]
    pub fn is_opening(&self) -> bool {
        self.opening
    }

    /// Current error, whichever state carries it
    pub fn error(&self) -> Option<ErrorKind> {
        match self.state {
            PipelineState::Failed(kind) => Some(kind),
            _ => self.error,
        }
    }

    pub fn can_open(&self) -> bool {
        self.state == PipelineState::Idle && !self.opening
    }

    /// Capture is only offered from an open session with no frame held and
    /// no re-open pending.
    pub fn can_capture(&self) -> bool {
        self.state == PipelineState::SessionOpen && !self.opening
    }

    pub fn can_reset(&self) -> bool {
        self.state.has_frame()
    }

    /// UI projection; `session_ready` comes from the session manager
    pub fn snapshot(&self, session_ready: bool) -> PipelineSnapshot {
        let error = self.error();
        PipelineSnapshot {
            state: self.state.clone(),
            frame: self.frame.clone(),
            frame_id: self.frame.as_ref().map(|f| f.id()),
            frame_size: self.frame.as_ref().map(|f| f.dimensions()),
            tire_dimensions: match &self.state {
                PipelineState::Resolved(size) => Some(size.dimensions()),
                _ => None,
            },
            session_ready,
            opening: self.opening,
            can_open: self.can_open(),
            can_capture: self.can_capture() && session_ready,
            can_reset: self.can_reset(),
            error,
            error_message: error.map(|kind| kind.message()),
        }
    }

    /// Apply one event and return the effects it requires
    pub fn update(&mut self, event: Event) -> Vec<Effect> {
        let effects = match event {
            Event::OpenCamera => self.on_open_camera(),
            Event::SessionOpened(outcome) => self.on_session_opened(outcome),
            Event::Capture => self.on_capture(),
            Event::FrameCaptured(outcome) => self.on_frame_captured(outcome),
            Event::RecognitionDispatched(id) => self.on_recognition_dispatched(id),
            Event::RecognitionFinished { frame, outcome } => {
                self.on_recognition_finished(frame, outcome)
            }
            Event::Reset => self.on_reset(),
        };

        debug_assert_eq!(self.state.has_frame(), self.frame.is_some());
        effects
    }

    fn on_open_camera(&mut self) -> Vec<Effect> {
        if !self.can_open() {
            debug!(state = self.state.name(), opening = self.opening, "Open camera ignored");
            return vec![];
        }
        self.opening = true;
        self.error = None;
        vec![Effect::OpenSession]
    }

    fn on_session_opened(&mut self, outcome: Result<SessionInfo, SessionError>) -> Vec<Effect> {
        if !self.opening {
            warn!("Camera open completed with no open pending");
            return vec![];
        }

        match outcome {
            Ok(info) => {
                self.opening = false;
                if self.state == PipelineState::Idle {
                    self.state = PipelineState::SessionOpen;
                }
                info!(session = %info.id, "Camera ready for capture");
            }
            Err(SessionError::OpenPending) => {
                // The earlier request will report its own outcome
                debug!("Duplicate camera open coalesced");
            }
            Err(SessionError::DeviceAccess(e)) => {
                self.opening = false;
                error!("Camera unavailable: {}", e);
                self.state = PipelineState::Idle;
                self.frame = None;
                self.error = Some(ErrorKind::DeviceAccess);
            }
        }
        vec![]
    }

    fn on_capture(&mut self) -> Vec<Effect> {
        if !self.can_capture() {
            warn!(state = self.state.name(), opening = self.opening, "Capture rejected");
            return vec![];
        }
        self.error = None;
        vec![Effect::CaptureFrame]
    }

    fn on_frame_captured(&mut self, outcome: Result<CapturedFrame, CaptureError>) -> Vec<Effect> {
        if self.state != PipelineState::SessionOpen {
            warn!(state = self.state.name(), "Dropping frame captured outside an open session");
            return vec![];
        }

        match outcome {
            Ok(frame) => {
                let frame = Arc::new(frame);
                info!(frame = %frame.id(), "Captured {}x{} frame", frame.dimensions().0, frame.dimensions().1);
                self.frame = Some(frame.clone());
                self.state = PipelineState::Captured;
                vec![Effect::Recognize(frame)]
            }
            Err(e) => {
                error!("Error capturing frame: {}", e);
                self.error = Some(ErrorKind::CaptureFailure);
                vec![]
            }
        }
    }

    fn on_recognition_dispatched(&mut self, id: FrameId) -> Vec<Effect> {
        if self.state == PipelineState::Captured && self.current_frame_id() == Some(id) {
            self.state = PipelineState::Processing;
        } else {
            debug!(frame = %id, state = self.state.name(), "Dispatch notice for a superseded frame");
        }
        vec![]
    }

    fn on_recognition_finished(
        &mut self,
        id: FrameId,
        outcome: Result<RecognitionResult, RecognitionError>,
    ) -> Vec<Effect> {
        if self.state != PipelineState::Processing || self.current_frame_id() != Some(id) {
            info!(frame = %id, state = self.state.name(), "Discarding stale recognition result");
            return vec![];
        }

        self.state = match outcome {
            Ok(result) => match analysis::extract(&result.text) {
                Ok(size) => {
                    info!(frame = %id, "Detected tire size {}", size);
                    PipelineState::Resolved(size)
                }
                Err(e) => {
                    warn!(frame = %id, "No valid tire size detected: {}", e);
                    PipelineState::Failed(ErrorKind::NoMatch)
                }
            },
            Err(e) => {
                error!(frame = %id, "Recognition failed: {}", e);
                PipelineState::Failed(ErrorKind::RecognitionFailure)
            }
        };
        vec![]
    }

    fn on_reset(&mut self) -> Vec<Effect> {
        if !self.can_reset() {
            debug!(state = self.state.name(), "Reset ignored");
            return vec![];
        }

        let was_pending = matches!(
            self.state,
            PipelineState::Captured | PipelineState::Processing
        );

        // Clear everything before asking for the camera again
        let discarded = self.frame.take().map(|f| f.id());
        self.state = PipelineState::SessionOpen;
        self.error = None;
        self.opening = true;

        let mut effects = Vec::with_capacity(2);
        if let (true, Some(id)) = (was_pending, discarded) {
            effects.push(Effect::CancelRecognition(id));
        }
        effects.push(Effect::OpenSession);
        effects
    }

    fn current_frame_id(&self) -> Option<FrameId> {
        self.frame.as_ref().map(|f| f.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{DeviceAccessError, FacingMode};
    use image::RgbaImage;
    use uuid::Uuid;

    fn session() -> SessionInfo {
        SessionInfo {
            id: Uuid::new_v4(),
            facing: FacingMode::Environment,
        }
    }

    fn frame() -> CapturedFrame {
        CapturedFrame::new(RgbaImage::new(8, 8), vec![1])
    }

    fn recognized(id: FrameId, text: &str) -> Event {
        Event::RecognitionFinished {
            frame: id,
            outcome: Ok(RecognitionResult {
                frame: id,
                text: text.to_string(),
            }),
        }
    }

    fn open_machine() -> PipelineMachine {
        let mut machine = PipelineMachine::new();
        machine.update(Event::OpenCamera);
        machine.update(Event::SessionOpened(Ok(session())));
        machine
    }

    /// Drive an open machine into Processing and return the frame id
    fn processing_machine() -> (PipelineMachine, FrameId) {
        let mut machine = open_machine();
        assert!(matches!(
            machine.update(Event::Capture).as_slice(),
            [Effect::CaptureFrame]
        ));
        let effects = machine.update(Event::FrameCaptured(Ok(frame())));
        let id = match effects.as_slice() {
            [Effect::Recognize(frame)] => frame.id(),
            other => panic!("unexpected effects {other:?}"),
        };
        assert_eq!(machine.state(), &PipelineState::Captured);
        machine.update(Event::RecognitionDispatched(id));
        assert_eq!(machine.state(), &PipelineState::Processing);
        (machine, id)
    }

    #[test]
    fn test_initial_state() {
        let machine = PipelineMachine::new();
        assert_eq!(machine.state(), &PipelineState::Idle);
        assert!(machine.can_open());
        assert!(!machine.can_capture());
        assert!(machine.error().is_none());
    }

    #[test]
    fn test_open_requests_session_once() {
        let mut machine = PipelineMachine::new();

        assert!(matches!(
            machine.update(Event::OpenCamera).as_slice(),
            [Effect::OpenSession]
        ));
        assert!(machine.is_opening());
        assert!(machine.update(Event::OpenCamera).is_empty());

        machine.update(Event::SessionOpened(Ok(session())));
        assert_eq!(machine.state(), &PipelineState::SessionOpen);
        assert!(machine.can_capture());
    }

    #[test]
    fn test_denied_camera_stays_idle_with_error() {
        let mut machine = PipelineMachine::new();
        machine.update(Event::OpenCamera);
        machine.update(Event::SessionOpened(Err(SessionError::DeviceAccess(
            DeviceAccessError::PermissionDenied {
                device: "/dev/video0".to_string(),
            },
        ))));

        assert_eq!(machine.state(), &PipelineState::Idle);
        assert_eq!(machine.error(), Some(ErrorKind::DeviceAccess));
        assert!(machine.frame().is_none());

        // Retry clears the error and asks for the camera again
        assert!(matches!(
            machine.update(Event::OpenCamera).as_slice(),
            [Effect::OpenSession]
        ));
        assert!(machine.error().is_none());
    }

    #[test]
    fn test_pending_open_rejection_is_coalesced() {
        let mut machine = PipelineMachine::new();
        machine.update(Event::OpenCamera);
        machine.update(Event::SessionOpened(Err(SessionError::OpenPending)));

        assert!(machine.is_opening());
        assert_eq!(machine.state(), &PipelineState::Idle);
        assert!(machine.error().is_none());
    }

    #[test]
    fn test_capture_from_idle_rejected() {
        let mut machine = PipelineMachine::new();
        assert!(machine.update(Event::Capture).is_empty());
        assert_eq!(machine.state(), &PipelineState::Idle);
    }

    #[test]
    fn test_recognized_size_resolves() {
        let (mut machine, id) = processing_machine();

        machine.update(recognized(id, "MICHELIN  205/55R16 91V"));

        let size = match machine.state() {
            PipelineState::Resolved(size) => size.clone(),
            other => panic!("expected resolved, got {other:?}"),
        };
        assert_eq!(size.as_str(), "205/55R16");
        assert!(machine.frame().is_some());
        assert!(machine.error().is_none());
    }

    #[test]
    fn test_text_without_size_fails_with_no_match() {
        let (mut machine, id) = processing_machine();

        machine.update(recognized(id, "ALL SEASON TIRE"));

        assert_eq!(machine.state(), &PipelineState::Failed(ErrorKind::NoMatch));
        assert_eq!(machine.error(), Some(ErrorKind::NoMatch));
        // Frame kept for inspection
        assert_eq!(machine.frame().map(|f| f.id()), Some(id));
    }

    #[test]
    fn test_engine_failure_fails_with_recognition_failure() {
        let (mut machine, id) = processing_machine();

        machine.update(Event::RecognitionFinished {
            frame: id,
            outcome: Err(RecognitionError::Engine(anyhow::anyhow!("boom"))),
        });

        assert_eq!(
            machine.state(),
            &PipelineState::Failed(ErrorKind::RecognitionFailure)
        );
        assert!(machine.frame().is_some());
    }

    #[test]
    fn test_second_capture_while_processing_rejected() {
        let (mut machine, _) = processing_machine();

        assert!(!machine.can_capture());
        assert!(machine.update(Event::Capture).is_empty());
        assert!(machine.update(Event::FrameCaptured(Ok(frame()))).is_empty());
        assert_eq!(machine.state(), &PipelineState::Processing);
    }

    #[test]
    fn test_reset_from_resolved_clears_everything() {
        let (mut machine, id) = processing_machine();
        machine.update(recognized(id, "205/55R16"));

        let effects = machine.update(Event::Reset);

        assert!(matches!(effects.as_slice(), [Effect::OpenSession]));
        assert_eq!(machine.state(), &PipelineState::SessionOpen);
        assert!(machine.frame().is_none());
        assert!(machine.error().is_none());
        assert!(machine.snapshot(true).tire_size().is_none());
    }

    #[test]
    fn test_reset_from_failed_clears_everything() {
        let (mut machine, id) = processing_machine();
        machine.update(recognized(id, "nothing here"));

        machine.update(Event::Reset);

        assert_eq!(machine.state(), &PipelineState::SessionOpen);
        assert!(machine.frame().is_none());
        assert!(machine.error().is_none());
    }

    #[test]
    fn test_capture_blocked_until_reopen_completes() {
        let (mut machine, id) = processing_machine();
        machine.update(recognized(id, "205/55R16"));
        machine.update(Event::Reset);

        assert!(!machine.can_capture());
        assert!(machine.update(Event::Capture).is_empty());

        machine.update(Event::SessionOpened(Ok(session())));
        assert!(machine.can_capture());
    }

    #[test]
    fn test_failed_reopen_returns_to_idle() {
        let (mut machine, id) = processing_machine();
        machine.update(recognized(id, "205/55R16"));
        machine.update(Event::Reset);

        machine.update(Event::SessionOpened(Err(SessionError::DeviceAccess(
            DeviceAccessError::Unavailable {
                facing: FacingMode::Environment,
                reason: "unplugged".to_string(),
            },
        ))));

        assert_eq!(machine.state(), &PipelineState::Idle);
        assert_eq!(machine.error(), Some(ErrorKind::DeviceAccess));
        assert!(machine.can_open());
    }

    #[test]
    fn test_reset_during_processing_cancels_and_discards_late_result() {
        let (mut machine, id) = processing_machine();

        let effects = machine.update(Event::Reset);
        assert!(matches!(
            effects.as_slice(),
            [Effect::CancelRecognition(cancelled), Effect::OpenSession] if *cancelled == id
        ));

        machine.update(recognized(id, "205/55R16"));
        assert_eq!(machine.state(), &PipelineState::SessionOpen);
        assert!(machine.frame().is_none());
    }

    #[test]
    fn test_late_result_for_superseded_frame_ignored() {
        let (mut machine, old_id) = processing_machine();
        machine.update(Event::Reset);
        machine.update(Event::SessionOpened(Ok(session())));

        // New capture cycle in flight
        machine.update(Event::Capture);
        let effects = machine.update(Event::FrameCaptured(Ok(frame())));
        let new_id = match effects.as_slice() {
            [Effect::Recognize(frame)] => frame.id(),
            other => panic!("unexpected effects {other:?}"),
        };
        machine.update(Event::RecognitionDispatched(new_id));

        machine.update(recognized(old_id, "205/55R16"));
        assert_eq!(machine.state(), &PipelineState::Processing);

        machine.update(recognized(new_id, "225/45R17"));
        assert_eq!(
            machine.snapshot(true).tire_size().map(TireSize::as_str),
            Some("225/45R17")
        );
    }

    #[test]
    fn test_capture_failure_surfaces_error_in_open_session() {
        let mut machine = open_machine();
        machine.update(Event::Capture);
        machine.update(Event::FrameCaptured(Err(CaptureError::NotReady)));

        assert_eq!(machine.state(), &PipelineState::SessionOpen);
        assert_eq!(machine.error(), Some(ErrorKind::CaptureFailure));
        assert!(machine.can_capture());

        machine.update(Event::Capture);
        assert!(machine.error().is_none());
    }

    #[test]
    fn test_reset_ignored_without_frame() {
        let mut machine = open_machine();
        assert!(machine.update(Event::Reset).is_empty());
        assert_eq!(machine.state(), &PipelineState::SessionOpen);
    }

    #[test]
    fn test_snapshot_affordances() {
        let machine = open_machine();

        let ready = machine.snapshot(true);
        assert!(ready.can_capture);
        assert!(!ready.can_open);
        assert!(!ready.can_reset);

        let warming_up = machine.snapshot(false);
        assert!(!warming_up.can_capture);

        let (machine, id) = processing_machine();
        let snapshot = machine.snapshot(true);
        assert!(snapshot.is_processing());
        assert!(!snapshot.can_capture);
        assert!(snapshot.can_reset);
        assert_eq!(snapshot.frame_id, Some(id));
        assert_eq!(snapshot.frame_size, Some((8, 8)));
    }

    #[test]
    fn test_snapshot_error_message() {
        let (mut machine, id) = processing_machine();
        machine.update(recognized(id, "ALL SEASON TIRE"));

        let snapshot = machine.snapshot(true);
        assert_eq!(
            snapshot.error_message,
            Some("No valid tire size detected. Please retry.")
        );
    }

    #[test]
    fn test_snapshot_serializes_state_tag() {
        let (mut machine, id) = processing_machine();
        machine.update(recognized(id, "205/55R16"));

        let json = serde_json::to_value(machine.snapshot(true)).unwrap();
        assert_eq!(json["state"]["name"], "resolved");
        assert_eq!(json["state"]["detail"], "205/55R16");
        assert_eq!(json["tire_dimensions"]["width_mm"], 205);
        assert_eq!(json["tire_dimensions"]["aspect_ratio"], 55);
        assert_eq!(json["tire_dimensions"]["rim_inches"], 16);
        assert_eq!(json["picture"], "data:image/png;base64,AQ==");
        assert!(json.get("frame").is_none());
    }
}
