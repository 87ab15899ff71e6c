//! ffmpeg-backed live camera
//!
//! Runs `ffmpeg` against a V4L2 device and reads the frames it emits as a
//! stream of BMP images on stdout. Only the newest decoded frame is kept.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use image::{ImageFormat, RgbaImage};
use parking_lot::Mutex;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{CameraBackend, DeviceAccessError, FacingMode, VideoStream};
use crate::config::CameraSettings;

/// How long `acquire` waits for the first frame before handing the stream
/// back not-yet-ready.
const STARTUP_GRACE: Duration = Duration::from_secs(3);

/// Frames per second requested from ffmpeg
const STREAM_FPS: u32 = 10;

/// BMP file header: "BM" magic followed by the little-endian file size
const BMP_HEADER_LEN: usize = 14;

/// Camera backend that shells out to ffmpeg
pub struct FfmpegCamera {
    settings: CameraSettings,
    device_override: Option<String>,
}

impl FfmpegCamera {
    pub fn new(settings: &CameraSettings) -> Self {
        Self {
            settings: settings.clone(),
            device_override: None,
        }
    }

    /// Use `device` regardless of facing mode
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device_override = Some(device.into());
        self
    }

    fn device_for(&self, facing: FacingMode) -> &str {
        match &self.device_override {
            Some(device) => device,
            None => self.settings.device_for(facing),
        }
    }

    fn command(&self, device: &str) -> Command {
        let mut cmd = Command::new(&self.settings.ffmpeg_path);
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-f")
            .arg("video4linux2")
            .arg("-i")
            .arg(device)
            .arg("-r")
            .arg(STREAM_FPS.to_string())
            .arg("-f")
            .arg("image2pipe")
            .arg("-c:v")
            .arg("bmp")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        cmd
    }
}

/// Map a failure to open the device node onto the camera error taxonomy
fn check_device(device: &str, facing: FacingMode) -> Result<(), DeviceAccessError> {
    if !Path::new(device).exists() {
        return Err(DeviceAccessError::Unavailable {
            facing,
            reason: format!("{device} does not exist"),
        });
    }

    match std::fs::File::open(device) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            Err(DeviceAccessError::PermissionDenied {
                device: device.to_string(),
            })
        }
        Err(e) => Err(DeviceAccessError::Unavailable {
            facing,
            reason: e.to_string(),
        }),
    }
}

#[async_trait]
impl CameraBackend for FfmpegCamera {
    async fn acquire(&self, facing: FacingMode) -> Result<Box<dyn VideoStream>, DeviceAccessError> {
        let device = self.device_for(facing).to_string();
        check_device(&device, facing)?;

        let mut child = self
            .command(&device)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.settings.ffmpeg_path))
            .map_err(DeviceAccessError::Stream)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DeviceAccessError::Stream(anyhow!("failed to capture ffmpeg stdout")))?;

        let latest = Arc::new(Mutex::new(None));
        let (startup_tx, startup_rx) = bounded(1);
        let reader = {
            let latest = latest.clone();
            let device = device.clone();
            thread::Builder::new()
                .name("camera-reader".to_string())
                .spawn(move || read_loop(stdout, latest, startup_tx, &device))
                .context("failed to spawn camera reader thread")
                .map_err(DeviceAccessError::Stream)?
        };

        let mut stream = FfmpegStream {
            child: Some(child),
            reader: Some(reader),
            latest,
        };

        let startup = tokio::task::spawn_blocking(move || startup_rx.recv_timeout(STARTUP_GRACE))
            .await
            .map_err(|e| DeviceAccessError::Stream(e.into()))?;

        match startup {
            Ok(Ok(())) => info!(%device, "Camera stream delivering frames"),
            Ok(Err(e)) => {
                stream.stop();
                return Err(DeviceAccessError::Stream(e));
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(%device, "Camera stream has not produced a frame yet")
            }
            Err(RecvTimeoutError::Disconnected) => {
                stream.stop();
                return Err(DeviceAccessError::Stream(anyhow!(
                    "camera reader exited before reporting status"
                )));
            }
        }

        Ok(Box::new(stream))
    }
}

/// Reads BMP frames until ffmpeg closes stdout
fn read_loop(
    mut stdout: impl Read,
    latest: Arc<Mutex<Option<Arc<RgbaImage>>>>,
    startup: Sender<Result<()>>,
    device: &str,
) {
    let mut delivered = 0u64;
    loop {
        match read_bmp_frame(&mut stdout) {
            Ok(Some(frame)) => {
                *latest.lock() = Some(Arc::new(frame));
                if delivered == 0 {
                    let _ = startup.try_send(Ok(()));
                }
                delivered += 1;
            }
            Ok(None) => {
                if delivered == 0 {
                    let _ = startup.try_send(Err(anyhow!(
                        "ffmpeg exited before {device} produced a frame"
                    )));
                }
                break;
            }
            Err(e) => {
                warn!(%device, "Camera stream decode error: {:#}", e);
                if delivered == 0 {
                    let _ = startup.try_send(Err(e));
                }
                break;
            }
        }
    }
    debug!(%device, delivered, "Camera reader finished");
}

/// Read one BMP image from the pipe. `Ok(None)` on a clean end of stream.
fn read_bmp_frame(reader: &mut impl Read) -> Result<Option<RgbaImage>> {
    let mut header = [0u8; BMP_HEADER_LEN];
    match reader.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    if &header[0..2] != b"BM" {
        bail!("unexpected bytes in camera stream (no BMP header)");
    }
    let file_len = u32::from_le_bytes([header[2], header[3], header[4], header[5]]) as usize;
    if file_len <= BMP_HEADER_LEN {
        bail!("invalid BMP length {file_len}");
    }

    let mut file = vec![0u8; file_len];
    file[..BMP_HEADER_LEN].copy_from_slice(&header);
    reader
        .read_exact(&mut file[BMP_HEADER_LEN..])
        .context("camera stream ended mid-frame")?;

    let image = image::load_from_memory_with_format(&file, ImageFormat::Bmp)
        .context("failed to decode BMP frame")?;
    Ok(Some(image.to_rgba8()))
}

struct FfmpegStream {
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    latest: Arc<Mutex<Option<Arc<RgbaImage>>>>,
}

impl VideoStream for FfmpegStream {
    fn latest_frame(&self) -> Option<Arc<RgbaImage>> {
        self.latest.lock().clone()
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        // Killing ffmpeg closes the pipe, so the reader sees EOF
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        *self.latest.lock() = None;
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        self.stop();
    }
}
