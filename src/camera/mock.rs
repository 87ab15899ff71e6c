//! In-memory camera backend for tests

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use tokio::sync::oneshot;

use super::{CameraBackend, DeviceAccessError, FacingMode, VideoStream};

/// Scriptable camera: serves a fixed frame, can deny access or panic, and
/// can hold an acquisition pending until released.
pub struct MockCamera {
    frame: Option<Arc<RgbaImage>>,
    deny: bool,
    panic: bool,
    acquisitions: AtomicUsize,
    stops: Arc<AtomicUsize>,
    stop_threads: Arc<Mutex<Vec<ThreadId>>>,
    last_facing: Mutex<Option<FacingMode>>,
    hold: Mutex<Option<oneshot::Receiver<()>>>,
}

impl MockCamera {
    fn build(frame: Option<Arc<RgbaImage>>, deny: bool) -> Self {
        Self {
            frame,
            deny,
            panic: false,
            acquisitions: AtomicUsize::new(0),
            stops: Arc::new(AtomicUsize::new(0)),
            stop_threads: Arc::new(Mutex::new(Vec::new())),
            last_facing: Mutex::new(None),
            hold: Mutex::new(None),
        }
    }

    /// Camera whose stream already has a `width` x `height` frame decoded
    pub fn with_frame(width: u32, height: u32) -> Self {
        let image = RgbaImage::from_pixel(width, height, Rgba([200, 200, 200, 255]));
        Self::build(Some(Arc::new(image)), false)
    }

    /// Camera whose stream never produces a frame
    pub fn without_frames() -> Self {
        Self::build(None, false)
    }

    /// Camera whose stream reports a decoded frame of zero size
    pub fn with_empty_frame() -> Self {
        Self::build(Some(Arc::new(RgbaImage::new(0, 0))), false)
    }

    /// Camera that always refuses access
    pub fn denied() -> Self {
        Self::build(None, true)
    }

    /// Camera whose backend panics while acquiring
    pub fn panicking() -> Self {
        Self {
            panic: true,
            ..Self::build(None, false)
        }
    }

    /// Block the next `acquire` until the returned sender fires
    pub fn hold_next_acquire(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.hold.lock() = Some(rx);
        tx
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Threads that stopped a stream, in order
    pub fn stop_threads(&self) -> Vec<ThreadId> {
        self.stop_threads.lock().clone()
    }

    pub fn last_facing(&self) -> Option<FacingMode> {
        *self.last_facing.lock()
    }

    /// A stream wired to this camera's stop counter
    pub fn stream(&self) -> Box<dyn VideoStream> {
        Box::new(MockStream {
            frame: self.frame.clone(),
            stops: self.stops.clone(),
            stop_threads: self.stop_threads.clone(),
            stopped: false,
        })
    }
}

#[async_trait]
impl CameraBackend for MockCamera {
    async fn acquire(&self, facing: FacingMode) -> Result<Box<dyn VideoStream>, DeviceAccessError> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        *self.last_facing.lock() = Some(facing);

        let hold = self.hold.lock().take();
        if let Some(hold) = hold {
            let _ = hold.await;
        }

        if self.panic {
            panic!("mock camera backend crashed");
        }
        if self.deny {
            return Err(DeviceAccessError::PermissionDenied {
                device: "mock".to_string(),
            });
        }
        Ok(self.stream())
    }
}

struct MockStream {
    frame: Option<Arc<RgbaImage>>,
    stops: Arc<AtomicUsize>,
    stop_threads: Arc<Mutex<Vec<ThreadId>>>,
    stopped: bool,
}

impl VideoStream for MockStream {
    fn latest_frame(&self) -> Option<Arc<RgbaImage>> {
        if self.stopped {
            None
        } else {
            self.frame.clone()
        }
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.stop_threads.lock().push(std::thread::current().id());
        }
    }
}
