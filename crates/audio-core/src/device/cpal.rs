//! CPAL-based audio device
//!
//! CPAL streams are not `Send`, so each stream lives on its own thread and is
//! controlled through a shutdown channel. The stream is dropped (and stops)
//! when that thread exits.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use super::{AudioIoPort, CaptureSink};
use crate::error::{AudioError, AudioResult};
use crate::format::AudioFormat;

/// Playback queue limit (one second of audio)
const MAX_PLAYBACK_SAMPLES: usize = 48_000;

struct StreamThread {
    shutdown: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl StreamThread {
    fn stop(self) {
        let _ = self.shutdown.send(());
        if self.handle.join().is_err() {
            warn!("Audio stream thread panicked");
        }
    }
}

/// [`AudioIoPort`] on the default CPAL host's default devices
pub struct CpalAudioPort {
    name: String,
    format: AudioFormat,
    capture: Mutex<Option<StreamThread>>,
    playback: Mutex<Option<StreamThread>>,
    playback_queue: Arc<Mutex<VecDeque<i16>>>,
    capturing: Arc<AtomicBool>,
}

impl CpalAudioPort {
    /// Open the default host; fails when it has no input device
    pub fn open_default() -> AudioResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AudioError::unavailable("default", "no input device"))?;
        let name = device.name().unwrap_or_else(|_| "default".to_string());
        Ok(Self {
            name,
            format: AudioFormat::voice(),
            capture: Mutex::new(None),
            playback: Mutex::new(None),
            playback_queue: Arc::new(Mutex::new(VecDeque::new())),
            capturing: Arc::new(AtomicBool::new(false)),
        })
    }

    fn stream_config(&self) -> cpal::StreamConfig {
        cpal::StreamConfig {
            channels: self.format.channels,
            sample_rate: cpal::SampleRate(self.format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        }
    }

    fn ensure_playback(&self) -> AudioResult<()> {
        let mut playback = self.playback.lock();
        if playback.is_some() {
            return Ok(());
        }

        let config = self.stream_config();
        let queue = self.playback_queue.clone();
        let name = self.name.clone();
        let (ready_tx, ready_rx) = mpsc::channel::<AudioResult<()>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = std::thread::spawn(move || {
            let host = cpal::default_host();
            let Some(device) = host.default_output_device() else {
                let _ = ready_tx.send(Err(AudioError::unavailable(&name, "no output device")));
                return;
            };
            let stream = device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut queue = queue.lock();
                    for slot in data.iter_mut() {
                        *slot = queue.pop_front().map_or(0.0, |s| s as f32 / 32768.0);
                    }
                },
                |err| error!("Audio playback error: {}", err),
                None,
            );
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(AudioError::unavailable(&name, e.to_string())));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::device(&name, "play", e.to_string())));
                return;
            }
            let _ = ready_tx.send(Ok(()));
            info!("Started audio playback on device: {}", name);

            let _ = shutdown_rx.recv();
            info!("Stopped audio playback on device: {}", name);
        });

        ready_rx
            .recv()
            .map_err(|_| AudioError::unavailable(&self.name, "playback thread exited"))??;
        *playback = Some(StreamThread {
            shutdown: shutdown_tx,
            handle,
        });
        Ok(())
    }
}

impl AudioIoPort for CpalAudioPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn start_capture(&self, sink: CaptureSink) -> AudioResult<()> {
        let mut capture = self.capture.lock();
        if capture.is_some() {
            return Ok(());
        }

        let config = self.stream_config();
        let name = self.name.clone();
        let capturing = self.capturing.clone();
        let (ready_tx, ready_rx) = mpsc::channel::<AudioResult<()>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = std::thread::spawn(move || {
            let host = cpal::default_host();
            let Some(device) = host.default_input_device() else {
                let _ = ready_tx.send(Err(AudioError::unavailable(&name, "no input device")));
                return;
            };
            let mut pcm = Vec::new();
            let stream = device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    pcm.clear();
                    for sample in data {
                        let s = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
                        pcm.extend_from_slice(&s.to_le_bytes());
                    }
                    sink(&pcm);
                },
                |err| error!("Audio capture error: {}", err),
                None,
            );
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(AudioError::FormatUnsupported {
                        format: format!("{} ({})", AudioFormat::voice().description(), e),
                    }));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::device(&name, "play", e.to_string())));
                return;
            }
            capturing.store(true, Ordering::SeqCst);
            let _ = ready_tx.send(Ok(()));
            info!("Started audio capture on device: {}", name);

            let _ = shutdown_rx.recv();
            capturing.store(false, Ordering::SeqCst);
            info!("Stopped audio capture on device: {}", name);
        });

        ready_rx
            .recv()
            .map_err(|_| AudioError::unavailable(&self.name, "capture thread exited"))??;
        *capture = Some(StreamThread {
            shutdown: shutdown_tx,
            handle,
        });
        Ok(())
    }

    fn stop_capture(&self) -> AudioResult<()> {
        if let Some(thread) = self.capture.lock().take() {
            thread.stop();
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn write(&self, pcm: &[u8]) -> AudioResult<()> {
        self.ensure_playback()?;
        let mut queue = self.playback_queue.lock();
        queue.extend(
            pcm.chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
        );
        let overflow = queue.len().saturating_sub(MAX_PLAYBACK_SAMPLES);
        if overflow > 0 {
            queue.drain(..overflow);
        }
        Ok(())
    }
}

impl Drop for CpalAudioPort {
    fn drop(&mut self) {
        if let Some(thread) = self.capture.get_mut().take() {
            thread.stop();
        }
        if let Some(thread) = self.playback.get_mut().take() {
            thread.stop();
        }
    }
}
