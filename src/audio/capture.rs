//! Server-side system audio capture using CPAL.
//!
//! Captures the machine's loopback/monitor device (the remote participant's
//! audio as played through the speakers), frames it, and feeds the frames
//! into a source pipeline exactly as if they had arrived over the socket.
//! Only compiled with the `capture` feature.

use crate::audio::frame::AudioFrame;
use crate::audio::framer::{FrameBuilder, FramerConfig};
use crate::error::{InterscribeError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends. The messages are harmless but confusing to users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Name patterns identifying loopback/monitor devices across backends.
///
/// PipeWire and PulseAudio expose playback streams as "Monitor of ..."
/// sources; Windows drivers commonly call theirs "Stereo Mix".
const LOOPBACK_PATTERNS: &[&str] = &["monitor", "loopback", "stereo mix", "what u hear"];

/// Device name patterns that are never useful as a capture source.
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_loopback_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    LOOPBACK_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// List capture devices, with loopback/monitor candidates marked.
///
/// # Errors
/// Returns `InterscribeError::AudioCapture` if device enumeration fails.
pub fn list_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices();
        (host, devices)
    });
    let _ = host; // keep host alive while iterating devices
    let devices = devices.map_err(|e| InterscribeError::AudioCapture {
        message: format!("failed to enumerate capture devices: {}", e),
    })?;

    let mut names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_loopback_device(&name) {
                names.push(format!("{} [loopback]", name));
            } else {
                names.push(name);
            }
        }
    }
    Ok(names)
}

/// Find the capture device for system audio.
///
/// An explicit name is matched exactly; otherwise the first loopback/monitor
/// device wins, falling back to the system default input.
fn find_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Some(name) = device_name {
            let devices = host
                .input_devices()
                .map_err(|e| InterscribeError::AudioCapture {
                    message: format!("failed to enumerate capture devices: {}", e),
                })?;
            for device in devices {
                if device.name().is_ok_and(|n| n == name) {
                    return Ok(device);
                }
            }
            return Err(InterscribeError::AudioDeviceNotFound {
                device: name.to_string(),
            });
        }

        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if device.name().is_ok_and(|n| is_loopback_device(&n)) {
                    return Ok(device);
                }
            }
        }

        host.default_input_device()
            .ok_or_else(|| InterscribeError::AudioDeviceNotFound {
                device: "default".to_string(),
            })
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched from the owning handle, never shared;
/// the Mutex gives exclusive access for the pause on stop.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// A running system audio capture; dropping or stopping it ends the stream.
pub struct CaptureHandle {
    stream: Mutex<Option<SendableStream>>,
    raw_tx: Mutex<Option<crossbeam_channel::Sender<Vec<i16>>>>,
    device_name: String,
}

impl CaptureHandle {
    /// Stops the capture stream and lets the bridge thread drain out.
    pub fn stop(&self) {
        if let Ok(mut guard) = self.stream.lock()
            && let Some(stream) = guard.take()
        {
            if let Err(e) = stream.0.pause() {
                debug!("pausing capture stream failed: {}", e);
            }
        }
        // Disconnecting the raw channel makes the bridge thread flush and exit
        if let Ok(mut guard) = self.raw_tx.lock() {
            guard.take();
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Starts capturing system audio into `frame_tx`.
///
/// The CPAL callback pushes raw sample chunks onto a bounded crossbeam
/// channel; a bridge thread mixes to mono, resamples, frames, and forwards
/// to the pipeline. Both hops drop rather than block when full, so a stalled
/// pipeline can never back up into the audio callback. A message is sent on
/// `status_tx` if the stream dies on its own.
pub fn start_system_capture(
    device_name: Option<&str>,
    config: FramerConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
    status_tx: mpsc::Sender<String>,
) -> Result<CaptureHandle> {
    let device = find_device(device_name)?;
    let name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let supported = device
        .default_input_config()
        .map_err(|e| InterscribeError::AudioCapture {
            message: format!("failed to query config for '{}': {}", name, e),
        })?;
    let native_rate = supported.sample_rate().0;
    let native_channels = supported.channels() as usize;
    let stream_config: cpal::StreamConfig = supported.clone().into();

    // Callback side: bounded, never blocks the realtime thread
    let (raw_tx, raw_rx) = crossbeam_channel::bounded::<Vec<i16>>(64);

    spawn_bridge_thread(
        raw_rx,
        FramerConfig {
            native_rate,
            ..config
        },
        native_channels,
        frame_tx,
    );

    let error_status = status_tx.clone();
    let err_callback = move |err: cpal::StreamError| {
        let _ = error_status.try_send(format!("system audio stream error: {}", err));
    };

    let stream = match supported.sample_format() {
        cpal::SampleFormat::I16 => {
            let tx = raw_tx.clone();
            device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let _ = tx.try_send(data.to_vec());
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| InterscribeError::AudioCapture {
                    message: format!("failed to build i16 stream on '{}': {}", name, e),
                })?
        }
        cpal::SampleFormat::F32 => {
            let tx = raw_tx.clone();
            device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let converted: Vec<i16> = data
                            .iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                            .collect();
                        let _ = tx.try_send(converted);
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| InterscribeError::AudioCapture {
                    message: format!("failed to build f32 stream on '{}': {}", name, e),
                })?
        }
        fmt => {
            return Err(InterscribeError::AudioCapture {
                message: format!("unsupported sample format {:?} on '{}'", fmt, name),
            });
        }
    };

    stream.play().map_err(|e| InterscribeError::AudioCapture {
        message: format!("failed to start capture on '{}': {}", name, e),
    })?;

    info!(
        device = %name,
        native_rate,
        native_channels,
        "system audio capture started"
    );

    Ok(CaptureHandle {
        stream: Mutex::new(Some(SendableStream(stream))),
        raw_tx: Mutex::new(Some(raw_tx)),
        device_name: name,
    })
}

/// Converts raw device chunks into pipeline frames on a plain thread.
///
/// Exits when the raw channel disconnects (capture stopped), flushing the
/// partial final frame first.
fn spawn_bridge_thread(
    raw_rx: crossbeam_channel::Receiver<Vec<i16>>,
    config: FramerConfig,
    native_channels: usize,
    frame_tx: mpsc::Sender<AudioFrame>,
) {
    std::thread::Builder::new()
        .name("capture-bridge".to_string())
        .spawn(move || {
            let mut builder = FrameBuilder::new(config);
            while let Ok(chunk) = raw_rx.recv() {
                let mono = mix_to_mono(&chunk, native_channels);
                for frame in builder.push(&mono) {
                    if frame_tx.try_send(frame).is_err() {
                        // Pipeline is full or gone; the segmenter treats the
                        // hole as silence
                    }
                }
            }
            if let Some(frame) = builder.flush() {
                let _ = frame_tx.try_send(frame);
            }
            debug!("capture bridge thread finished");
        })
        .map_err(|e| warn!("failed to spawn capture bridge thread: {}", e))
        .ok();
}

/// Mix interleaved multi-channel audio down to mono by averaging.
fn mix_to_mono(samples: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|group| {
            let sum: i32 = group.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}
