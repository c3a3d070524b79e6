//! Speech playback session.
//!
//! One lifecycle per spoken response: request synthesized audio, decode it,
//! play it through the output device. Stopping cancels the in-flight
//! synthesis request if audio has not started, or halts output immediately
//! if it has; both paths release the stream.

use crate::audio::{decode, resample_linear};
use crate::config::AudioConfig;
use crate::error::{Result, VoiceError};
use crate::synth::SynthesisClient;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Lifecycle notices delivered to the owning coordinator.
///
/// Cancellation produces no notice: a superseded or stopped playback is
/// not an error and the stopping side already knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackNotice {
    /// Audio has started coming out of the speaker.
    Started,
    /// Playback reached the natural end of the audio.
    Finished,
    /// Synthesis, decoding, or audio output failed.
    Failed(String),
}

/// How a playback task ended.
enum PlaybackEnd {
    Completed,
    Cancelled,
}

/// One speech-audio lifecycle. At most one instance is alive at a time.
pub struct PlaybackSession {
    cancel: CancellationToken,
    speaking: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

impl PlaybackSession {
    /// Begin speaking `text`, posting lifecycle notices to `on_event`.
    ///
    /// Returns `None` without doing anything for empty or whitespace-only
    /// text. The caller enforces supersede semantics by stopping any
    /// previous session first.
    pub fn speak(
        synth: SynthesisClient,
        audio: &AudioConfig,
        text: String,
        mut on_event: impl FnMut(PlaybackNotice) + Send + 'static,
    ) -> Option<Self> {
        if text.trim().is_empty() {
            return None;
        }

        let cancel = CancellationToken::new();
        let speaking = Arc::new(AtomicBool::new(false));

        let task = {
            let cancel = cancel.clone();
            let speaking = Arc::clone(&speaking);
            let output_rate = audio.output_sample_rate;
            let output_device = audio.output_device.clone();
            tokio::spawn(async move {
                let result = run_playback(
                    &synth,
                    &text,
                    output_rate,
                    output_device,
                    &cancel,
                    &speaking,
                    &mut on_event,
                )
                .await;
                speaking.store(false, Ordering::Relaxed);
                match result {
                    Ok(PlaybackEnd::Completed) => on_event(PlaybackNotice::Finished),
                    Ok(PlaybackEnd::Cancelled) => debug!("playback cancelled"),
                    Err(e) => on_event(PlaybackNotice::Failed(e.to_string())),
                }
            })
        };

        Some(Self {
            cancel,
            speaking,
            task,
        })
    }

    /// Whether audio is currently playing.
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Relaxed)
    }

    /// Cancel synthesis or halt playback, releasing the output stream.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

async fn run_playback(
    synth: &SynthesisClient,
    text: &str,
    output_rate: u32,
    output_device: Option<String>,
    cancel: &CancellationToken,
    speaking: &Arc<AtomicBool>,
    on_event: &mut impl FnMut(PlaybackNotice),
) -> Result<PlaybackEnd> {
    // Synthesis is the cancellable pre-play phase.
    let bytes = tokio::select! {
        () = cancel.cancelled() => return Ok(PlaybackEnd::Cancelled),
        res = synth.synthesize(text) => res?,
    };

    let (samples, src_rate) = tokio::task::spawn_blocking(move || decode::decode_to_mono_f32(bytes))
        .await
        .map_err(|e| VoiceError::Synthesis(format!("decode task panicked: {e}")))??;

    if cancel.is_cancelled() {
        return Ok(PlaybackEnd::Cancelled);
    }

    let samples = resample_linear(&samples, src_rate, output_rate);
    let total = samples.len();

    let host = cpal::default_host();
    let device = if let Some(ref name) = output_device {
        host.output_devices()
            .map_err(|e| VoiceError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| VoiceError::Audio(format!("output device '{name}' not found")))?
    } else {
        host.default_output_device()
            .ok_or_else(|| VoiceError::Audio("no default output device".into()))?
    };

    let stream_config = StreamConfig {
        channels: 1,
        sample_rate: output_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let buffer = Arc::new(Mutex::new(PlaybackBuffer {
        samples,
        position: 0,
        finished: false,
    }));

    let buffer_cb = Arc::clone(&buffer);
    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                if let Ok(mut buf) = buffer_cb.lock() {
                    buf.fill_output(data);
                }
            },
            move |err| {
                error!("audio output stream error: {err}");
            },
            None,
        )
        .map_err(|e| VoiceError::Audio(format!("failed to build output stream: {e}")))?;

    stream
        .play()
        .map_err(|e| VoiceError::Audio(format!("failed to start output stream: {e}")))?;

    speaking.store(true, Ordering::Relaxed);
    on_event(PlaybackNotice::Started);
    info!(
        "speaking {total} samples ({:.1}s)",
        total as f32 / output_rate as f32
    );

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                drop(stream);
                return Ok(PlaybackEnd::Cancelled);
            }
            () = tokio::time::sleep(Duration::from_millis(10)) => {
                let finished = buffer.lock().map(|b| b.finished).unwrap_or(true);
                if finished {
                    break;
                }
            }
        }
    }

    drop(stream);
    Ok(PlaybackEnd::Completed)
}

/// Internal buffer for tracking playback progress.
struct PlaybackBuffer {
    samples: Vec<f32>,
    position: usize,
    finished: bool,
}

impl PlaybackBuffer {
    /// Copy the next samples into the output callback buffer, padding with
    /// silence once the audio is exhausted.
    fn fill_output(&mut self, data: &mut [f32]) {
        for sample in data.iter_mut() {
            if self.position < self.samples.len() {
                *sample = self.samples[self.position];
                self.position += 1;
            } else {
                *sample = 0.0;
                self.finished = true;
            }
        }
    }
}
