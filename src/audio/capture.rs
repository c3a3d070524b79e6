//! Microphone capture session.
//!
//! Captures at the device's native sample rate, downmixes to mono and
//! downsamples to the configured rate, buffering audio in fixed time
//! slices. Each completed slice feeds the live analysis handle (RMS plus
//! FFT magnitude bins) that drives recording visualization. Stopping the
//! session finalizes everything captured into a single WAV payload.

use crate::audio::{downmix_mono, resample_linear};
use crate::config::AudioConfig;
use crate::error::{Result, VoiceError};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rustfft::FftPlanner;
use rustfft::num_complex::Complex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A finalized capture, ready for the transcription endpoint.
#[derive(Debug, Clone)]
pub struct RecordedAudio {
    /// Complete WAV file bytes (16-bit PCM mono).
    pub wav: Vec<u8>,
    /// Sample rate of the encoded audio in Hz.
    pub sample_rate: u32,
    /// Recorded duration in seconds.
    pub duration_secs: f32,
}

/// Live analysis feed for recording visualization.
///
/// Cloneable; reads are lock-cheap and safe from a render loop. Values are
/// updated once per completed capture slice and stop changing once the
/// owning session ends.
#[derive(Debug, Clone)]
pub struct AnalysisHandle {
    feed: Arc<AnalysisFeed>,
}

impl AnalysisHandle {
    /// RMS level of the most recent capture slice, in `[0, 1]`.
    pub fn rms(&self) -> f32 {
        f32::from_bits(self.feed.rms.load(Ordering::Relaxed))
    }

    /// FFT magnitude bins of the most recent capture slice.
    ///
    /// `fft_size / 2` bins ordered from low to high frequency.
    pub fn frequency_bins(&self) -> Vec<f32> {
        self.feed
            .bins
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug)]
struct AnalysisFeed {
    rms: AtomicU32,
    bins: Mutex<Vec<f32>>,
}

impl AnalysisFeed {
    fn new(fft_size: usize) -> Self {
        Self {
            rms: AtomicU32::new(0.0_f32.to_bits()),
            bins: Mutex::new(vec![0.0; fft_size / 2]),
        }
    }
}

/// Per-slice analyzer run on the audio callback thread.
struct SliceAnalyzer {
    fft: Arc<dyn rustfft::Fft<f32>>,
    fft_size: usize,
    feed: Arc<AnalysisFeed>,
}

impl SliceAnalyzer {
    fn new(fft_size: usize, feed: Arc<AnalysisFeed>) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        Self {
            fft,
            fft_size,
            feed,
        }
    }

    fn analyze(&self, slice: &[f32]) {
        if slice.is_empty() {
            return;
        }

        let rms =
            (slice.iter().map(|s| s * s).sum::<f32>() / slice.len() as f32).sqrt();
        self.feed.rms.store(rms.to_bits(), Ordering::Relaxed);

        if slice.len() < self.fft_size {
            return;
        }

        // Hann-windowed FFT over the tail of the slice.
        let tail = &slice[slice.len() - self.fft_size..];
        let mut windowed: Vec<Complex<f32>> = tail
            .iter()
            .enumerate()
            .map(|(n, &s)| {
                let w = 0.5
                    * (1.0
                        - (2.0 * std::f32::consts::PI * n as f32
                            / (self.fft_size - 1) as f32)
                            .cos());
                Complex::new(s * w, 0.0)
            })
            .collect();
        self.fft.process(&mut windowed);

        let scale = 1.0 / self.fft_size as f32;
        if let Ok(mut bins) = self.feed.bins.lock() {
            for (bin, c) in bins.iter_mut().zip(windowed.iter()) {
                *bin = (c.re * c.re + c.im * c.im).sqrt() * scale;
            }
        }
    }
}

/// One microphone-capture lifecycle.
///
/// At most one instance is alive at a time, owned by the coordinator.
/// Stopping consumes the session, which makes the finalize-exactly-once
/// contract structural.
pub struct CaptureSession {
    cancel: CancellationToken,
    analysis: AnalysisHandle,
    collected: Arc<Mutex<Vec<f32>>>,
    sample_rate: u32,
    task: tokio::task::JoinHandle<()>,
}

impl CaptureSession {
    /// Acquire the input device and begin recording.
    ///
    /// Must be called from within a tokio runtime; the stream is parked on
    /// a task that holds it alive until the session is stopped or aborted.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::PermissionDenied`] when the platform refuses
    /// microphone access, and a generic audio error for any other
    /// acquisition failure.
    pub fn start(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.input_device {
            host.input_devices()
                .map_err(|e| VoiceError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| VoiceError::Audio(format!("input device '{name}' not found")))?
        } else {
            host.default_input_device()
                .ok_or_else(|| VoiceError::Audio("no default input device".into()))?
        };

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using input device: {device_name}");

        let default_config = device
            .default_input_config()
            .map_err(|e| classify_device_error("no default input config", &e.to_string()))?;

        let native_rate = default_config.sample_rate();
        let native_channels = default_config.channels();
        let target_rate = config.input_sample_rate;

        let stream_config = StreamConfig {
            channels: native_channels,
            sample_rate: native_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let slice_len = (target_rate as u64 * u64::from(config.slice_ms) / 1000).max(1) as usize;
        let collected = Arc::new(Mutex::new(Vec::new()));
        let feed = Arc::new(AnalysisFeed::new(config.analysis_fft_size));
        let analyzer = SliceAnalyzer::new(config.analysis_fft_size, Arc::clone(&feed));

        let collected_cb = Arc::clone(&collected);
        let mut pending: Vec<f32> = Vec::with_capacity(slice_len * 2);

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let mono = if native_channels > 1 {
                        downmix_mono(data, native_channels)
                    } else {
                        data.to_vec()
                    };
                    let samples = if native_rate != target_rate {
                        resample_linear(&mono, native_rate, target_rate)
                    } else {
                        mono
                    };

                    pending.extend_from_slice(&samples);
                    while pending.len() >= slice_len {
                        let slice: Vec<f32> = pending.drain(..slice_len).collect();
                        analyzer.analyze(&slice);
                        if let Ok(mut all) = collected_cb.lock() {
                            all.extend_from_slice(&slice);
                        }
                    }
                },
                move |err| {
                    error!("audio input stream error: {err}");
                },
                None,
            )
            .map_err(|e| classify_device_error("failed to build input stream", &e.to_string()))?;

        stream
            .play()
            .map_err(|e| VoiceError::Audio(format!("failed to start input stream: {e}")))?;

        info!("capture started: native {native_rate}Hz -> target {target_rate}Hz, {slice_len}-sample slices");

        let cancel = CancellationToken::new();
        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                // Hold the stream alive until cancelled.
                cancel.cancelled().await;
                drop(stream);
                debug!("capture stream released");
            })
        };

        Ok(Self {
            cancel,
            analysis: AnalysisHandle { feed },
            collected,
            sample_rate: target_rate,
            task,
        })
    }

    /// The live analysis feed for this recording.
    pub fn analysis(&self) -> AnalysisHandle {
        self.analysis.clone()
    }

    /// Stop recording and finalize the buffered slices into one payload.
    ///
    /// The device and stream are released before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the WAV payload cannot be encoded.
    pub async fn stop(self) -> Result<RecordedAudio> {
        self.cancel.cancel();
        let _ = self.task.await;

        let samples = self
            .collected
            .lock()
            .map(|mut s| std::mem::take(&mut *s))
            .map_err(|_| VoiceError::Audio("capture buffer lock poisoned".into()))?;

        let duration_secs = samples.len() as f32 / self.sample_rate as f32;
        let wav = encode_wav(&samples, self.sample_rate)?;
        info!("capture finalized: {duration_secs:.1}s, {} bytes", wav.len());

        Ok(RecordedAudio {
            wav,
            sample_rate: self.sample_rate,
            duration_secs,
        })
    }

    /// Stop recording and discard everything captured.
    pub async fn abort(self) {
        self.cancel.cancel();
        let _ = self.task.await;
        debug!("capture aborted, buffered audio discarded");
    }
}

/// Map a device acquisition failure, distinguishing permission denial.
fn classify_device_error(context: &str, detail: &str) -> VoiceError {
    let lowered = detail.to_lowercase();
    if lowered.contains("permission")
        || lowered.contains("denied")
        || lowered.contains("not permitted")
    {
        VoiceError::PermissionDenied(detail.to_owned())
    } else {
        VoiceError::Audio(format!("{context}: {detail}"))
    }
}

/// Encode mono f32 samples as a 16-bit PCM WAV file in memory.
pub(crate) fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buf = std::io::Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut buf, spec)
        .map_err(|e| VoiceError::Audio(format!("failed to create wav writer: {e}")))?;
    for &s in samples {
        let clamped = s.clamp(-1.0, 1.0);
        let v = (clamped * f32::from(i16::MAX)).round() as i16;
        writer
            .write_sample(v)
            .map_err(|e| VoiceError::Audio(format!("failed to write wav sample: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| VoiceError::Audio(format!("failed to finalize wav: {e}")))?;

    Ok(buf.into_inner())
}
