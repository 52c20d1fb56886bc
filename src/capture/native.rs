//! Native webcam capture using nokhwa
//!
//! Acquiring a camera opens it on a dedicated device thread, since
//! `nokhwa::Camera` is not `Send`. That thread owns the device until the
//! stream's tracks are stopped. An encoder attaches to the running device,
//! pipes its frames into an FFmpeg child process, and streams FFmpeg's stdout
//! back as encoded chunks.

use super::codec::PLATFORM_DEFAULT_CODEC;
use super::traits::{
    CameraConstraints, CameraInfo, CaptureBackend, CaptureError, CaptureResult, Encoder,
    EncoderEvent, EncoderState, MediaStream, Resolution,
};
use async_trait::async_trait;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const READ_BUFFER_SIZE: usize = 64 * 1024;
const FRAME_WAIT: Duration = Duration::from_millis(200);

/// Get list of available cameras
pub fn list_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .map(|info| {
                let id = match info.index() {
                    CameraIndex::Index(i) => i.to_string(),
                    CameraIndex::String(s) => s.to_string(),
                };

                CameraInfo {
                    id,
                    name: info.human_name().to_string(),
                    supported_resolutions: vec![
                        Resolution {
                            width: 1920,
                            height: 1080,
                        },
                        Resolution {
                            width: 1280,
                            height: 720,
                        },
                        Resolution {
                            width: 640,
                            height: 480,
                        },
                    ],
                }
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

fn ffmpeg_available() -> bool {
    Command::new("ffmpeg").arg("-version").output().is_ok()
}

/// FFmpeg output arguments for a container string
fn output_args(mime_type: &str) -> Option<Vec<&'static str>> {
    let args = match mime_type {
        "video/webm;codecs=vp9,opus" | "video/webm;codecs=vp9" => {
            vec!["-c:v", "libvpx-vp9", "-deadline", "realtime", "-f", "webm"]
        }
        "video/webm;codecs=vp8,opus" | "video/webm;codecs=vp8" | "video/webm" => {
            vec!["-c:v", "libvpx", "-deadline", "realtime", "-f", "webm"]
        }
        "video/mp4" => vec![
            "-c:v",
            "libx264",
            "-preset",
            "veryfast",
            "-pix_fmt",
            "yuv420p",
            // Fragmented MP4 so it can be written to a pipe
            "-movflags",
            "frag_keyframe+empty_moov",
            "-f",
            "mp4",
        ],
        _ => return None,
    };
    Some(args)
}

/// Classify a camera open failure by the driver's message
fn open_error(message: String) -> CaptureError {
    let lower = message.to_ascii_lowercase();
    if ["permission", "denied", "not authorized", "unauthorized"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        CaptureError::PermissionDenied(message)
    } else if ["busy", "in use", "resource temporarily unavailable"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        CaptureError::DeviceBusy(message)
    } else {
        CaptureError::DeviceNotFound(message)
    }
}

fn camera_index(id: &str) -> CameraIndex {
    match id.parse::<u32>() {
        Ok(idx) => CameraIndex::Index(idx),
        Err(_) => CameraIndex::String(id.to_string()),
    }
}

/// Negotiated format of an opened camera
#[derive(Debug, Clone)]
struct DeviceFormat {
    width: u32,
    height: u32,
    fps: u32,
    frame_format: FrameFormat,
}

impl DeviceFormat {
    /// FFmpeg input arguments for frames in this format, read from stdin
    fn input_args(&self) -> Vec<String> {
        let mut input: Vec<String> = match self.frame_format {
            FrameFormat::MJPEG => vec!["-f".into(), "mjpeg".into()],
            other => {
                let pix_fmt = match other {
                    FrameFormat::YUYV => "yuyv422",
                    FrameFormat::NV12 => "nv12",
                    FrameFormat::RAWRGB => "rgb24",
                    _ => {
                        tracing::warn!("Unknown camera format {:?}, falling back to yuyv422", other);
                        "yuyv422"
                    }
                };
                vec![
                    "-f".into(),
                    "rawvideo".into(),
                    "-pixel_format".into(),
                    pix_fmt.into(),
                    "-video_size".into(),
                    format!("{}x{}", self.width, self.height),
                ]
            }
        };
        input.extend([
            "-framerate".to_string(),
            self.fps.to_string(),
            "-i".to_string(),
            "-".to_string(),
        ]);
        input
    }
}

/// An opened camera, owned by its device thread
struct DeviceFeed {
    format: DeviceFormat,
    live: AtomicBool,
    /// Frame sink of the attached encoder, if any
    sink: Mutex<Option<std_mpsc::Sender<Vec<u8>>>>,
}

impl DeviceFeed {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn attach(&self) -> std_mpsc::Receiver<Vec<u8>> {
        let (tx, rx) = std_mpsc::channel();
        *self.sink.lock() = Some(tx);
        rx
    }

    fn detach(&self) {
        self.sink.lock().take();
    }
}

/// Open the camera on a new thread and keep reading frames until the feed
/// is no longer live. Reports the open result through `opened`.
fn spawn_device(
    index: CameraIndex,
    opened: oneshot::Sender<CaptureResult<Arc<DeviceFeed>>>,
) {
    std::thread::spawn(move || {
        let format = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestResolution);
        let mut camera = match Camera::new(index, format) {
            Ok(camera) => camera,
            Err(e) => {
                let _ = opened.send(Err(open_error(format!("Failed to open camera: {e}"))));
                return;
            }
        };
        if let Err(e) = camera.open_stream() {
            let _ = opened.send(Err(open_error(format!("Failed to open camera stream: {e}"))));
            return;
        }

        let camera_format = camera.camera_format();
        let feed = Arc::new(DeviceFeed {
            format: DeviceFormat {
                width: camera_format.resolution().width(),
                height: camera_format.resolution().height(),
                fps: camera_format.frame_rate(),
                frame_format: camera_format.format(),
            },
            live: AtomicBool::new(true),
            sink: Mutex::new(None),
        });

        if opened.send(Ok(feed.clone())).is_err() {
            // Acquirer went away before the device came up
            feed.live.store(false, Ordering::SeqCst);
        }

        while feed.is_live() {
            match camera.frame() {
                Ok(frame) => {
                    let mut sink = feed.sink.lock();
                    let gone = match sink.as_ref() {
                        Some(tx) => tx.send(frame.buffer().to_vec()).is_err(),
                        None => false,
                    };
                    if gone {
                        sink.take();
                    }
                }
                Err(e) => tracing::debug!("Failed to capture frame: {:?}", e),
            }
        }

        feed.detach();
        if let Err(e) = camera.stop_stream() {
            tracing::warn!("Error stopping camera stream: {:?}", e);
        }
        tracing::info!("Camera device thread stopped");
    });
}

/// Camera + FFmpeg backend
pub struct NativeCaptureBackend {
    ffmpeg: bool,
    /// Opened devices by camera id
    devices: Mutex<HashMap<String, Weak<DeviceFeed>>>,
}

impl NativeCaptureBackend {
    pub fn new() -> Self {
        let ffmpeg = ffmpeg_available();
        if !ffmpeg {
            tracing::warn!("FFmpeg not found; native capture cannot encode");
        }
        Self {
            ffmpeg,
            devices: Mutex::new(HashMap::new()),
        }
    }

    fn live_device(&self, id: &str) -> Option<Arc<DeviceFeed>> {
        self.devices
            .lock()
            .get(id)
            .and_then(Weak::upgrade)
            .filter(|feed| feed.is_live())
    }
}

impl Default for NativeCaptureBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureBackend for NativeCaptureBackend {
    async fn acquire(&self, constraints: &CameraConstraints) -> CaptureResult<Arc<dyn MediaStream>> {
        let cameras = tokio::task::spawn_blocking(list_cameras)
            .await
            .map_err(|e| CaptureError::DeviceNotFound(format!("camera query panicked: {e}")))?;

        let info = match &constraints.device_id {
            Some(id) => cameras.into_iter().find(|c| &c.id == id),
            None => cameras.into_iter().next(),
        }
        .ok_or_else(|| CaptureError::DeviceNotFound("No cameras found".to_string()))?;

        if self.live_device(&info.id).is_some() {
            return Err(CaptureError::DeviceBusy(format!(
                "camera {} is already open",
                info.id
            )));
        }

        let (opened_tx, opened_rx) = oneshot::channel();
        spawn_device(camera_index(&info.id), opened_tx);
        let feed = opened_rx
            .await
            .map_err(|_| CaptureError::DeviceNotFound("camera thread exited".to_string()))??;

        self.devices.lock().insert(info.id.clone(), Arc::downgrade(&feed));

        tracing::info!(
            "Acquired camera {} ({}): {}x{} @ {}fps {:?}",
            info.name,
            info.id,
            feed.format.width,
            feed.format.height,
            feed.format.fps,
            feed.format.frame_format
        );

        Ok(Arc::new(NativeStream { info, feed }))
    }

    fn supports_codec(&self, mime_type: &str) -> bool {
        self.ffmpeg && output_args(mime_type).is_some()
    }

    fn default_codec(&self) -> &str {
        PLATFORM_DEFAULT_CODEC
    }

    fn start_encoder(
        &self,
        stream: Arc<dyn MediaStream>,
        mime_type: Option<&str>,
        events: mpsc::UnboundedSender<EncoderEvent>,
    ) -> CaptureResult<Box<dyn Encoder>> {
        if !self.ffmpeg {
            return Err(CaptureError::Encoder(
                "FFmpeg not found. Please install FFmpeg".to_string(),
            ));
        }

        let feed = self
            .live_device(&stream.info().id)
            .ok_or_else(|| CaptureError::Encoder("stream has no live tracks".to_string()))?;

        let mime_type = mime_type.unwrap_or(PLATFORM_DEFAULT_CODEC).to_string();
        let args = output_args(&mime_type)
            .ok_or_else(|| CaptureError::Encoder(format!("unsupported codec {mime_type}")))?;

        let state = Arc::new(Mutex::new(EncoderState::Recording));
        let running = Arc::new(AtomicBool::new(true));

        let thread_state = state.clone();
        let thread_running = running.clone();
        std::thread::spawn(move || {
            if let Err(message) = encode_loop(&feed, &args, &thread_running, &events) {
                tracing::error!("Native capture failed: {}", message);
                let _ = events.send(EncoderEvent::Error(message));
            }
            *thread_state.lock() = EncoderState::Stopped;
            let _ = events.send(EncoderEvent::Stopped);
        });

        Ok(Box::new(NativeEncoder {
            mime_type,
            state,
            running,
        }))
    }
}

struct NativeStream {
    info: CameraInfo,
    feed: Arc<DeviceFeed>,
}

impl MediaStream for NativeStream {
    fn info(&self) -> &CameraInfo {
        &self.info
    }

    /// Ends the device thread, which closes the camera
    fn stop_tracks(&self) {
        if self.feed.live.swap(false, Ordering::SeqCst) {
            self.feed.detach();
            tracing::debug!("Camera {} tracks stopped", self.info.id);
        }
    }

    fn is_live(&self) -> bool {
        self.feed.is_live()
    }
}

impl Drop for NativeStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

struct NativeEncoder {
    mime_type: String,
    state: Arc<Mutex<EncoderState>>,
    running: Arc<AtomicBool>,
}

impl Encoder for NativeEncoder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn state(&self) -> EncoderState {
        *self.state.lock()
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let mut state = self.state.lock();
        if *state == EncoderState::Recording {
            *state = EncoderState::Stopped;
        }
    }
}

/// Runs on the encoder thread until stopped or the device goes away
fn encode_loop(
    feed: &DeviceFeed,
    output: &[&str],
    running: &AtomicBool,
    events: &mpsc::UnboundedSender<EncoderEvent>,
) -> Result<(), String> {
    let mut ffmpeg = Command::new("ffmpeg")
        .arg("-y")
        .args(feed.format.input_args())
        .args(output)
        .arg("-")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| format!("Failed to start FFmpeg: {e}"))?;

    tracing::info!(
        "Native capture started: {}x{} format={:?}",
        feed.format.width,
        feed.format.height,
        feed.format.frame_format
    );

    let mut stdout = ffmpeg
        .stdout
        .take()
        .ok_or_else(|| "FFmpeg stdout unavailable".to_string())?;
    let chunk_events = events.clone();
    let reader = std::thread::spawn(move || {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            match stdout.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let _ = chunk_events.send(EncoderEvent::Chunk(buf[..n].to_vec()));
                }
                Err(e) => {
                    tracing::warn!("Error reading FFmpeg output: {}", e);
                    break;
                }
            }
        }
    });

    let frames = feed.attach();
    let mut failure = None;
    if let Some(mut stdin) = ffmpeg.stdin.take() {
        while running.load(Ordering::SeqCst) && feed.is_live() {
            match frames.recv_timeout(FRAME_WAIT) {
                Ok(frame) => {
                    if let Err(e) = stdin.write_all(&frame) {
                        failure = Some(format!("FFmpeg rejected frame: {e}"));
                        break;
                    }
                }
                Err(std_mpsc::RecvTimeoutError::Timeout) => {}
                Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        // stdin dropped here, FFmpeg sees EOF
    }
    feed.detach();

    let status = ffmpeg
        .wait()
        .map_err(|e| format!("Failed to wait for FFmpeg: {e}"))?;
    let _ = reader.join();

    if let Some(message) = failure {
        return Err(message);
    }
    if !status.success() {
        return Err(format!("FFmpeg exited with status {status}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_errors_classified() {
        assert!(matches!(
            open_error("Failed to open camera: Permission denied".into()),
            CaptureError::PermissionDenied(_)
        ));
        assert!(matches!(
            open_error("Could not open device: Device or resource busy".into()),
            CaptureError::DeviceBusy(_)
        ));
        assert!(matches!(
            open_error("Failed to open camera: no such device".into()),
            CaptureError::DeviceNotFound(_)
        ));
    }

    #[test]
    fn test_output_args() {
        assert!(output_args("video/webm;codecs=vp9,opus").is_some());
        assert!(output_args("video/mp4").is_some());
        assert!(output_args("video/ogg").is_none());
    }

    #[test]
    fn test_raw_input_args() {
        let format = DeviceFormat {
            width: 1280,
            height: 720,
            fps: 30,
            frame_format: FrameFormat::YUYV,
        };
        let args = format.input_args();
        assert!(args.windows(2).any(|w| w == ["-pixel_format", "yuyv422"]));
        assert!(args.windows(2).any(|w| w == ["-video_size", "1280x720"]));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }
}
