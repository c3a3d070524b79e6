//! Synthesized-audio decoding.
//!
//! The synthesis endpoint streams compressed audio (MPEG by default); this
//! module decodes a complete payload into mono f32 samples for playback.

use crate::error::{Result, VoiceError};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decode an in-memory audio payload to mono f32 samples.
///
/// Returns the samples and their native sample rate. Multi-channel audio is
/// downmixed by averaging.
///
/// # Errors
///
/// Returns an error if the container cannot be probed or the audio cannot
/// be decoded.
pub fn decode_to_mono_f32(data: Vec<u8>) -> Result<(Vec<f32>, u32)> {
    let mss = MediaSourceStream::new(
        Box::new(std::io::Cursor::new(data)),
        Default::default(),
    );

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| VoiceError::Synthesis(format!("failed to probe audio: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| VoiceError::Synthesis("no default audio track".into()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| VoiceError::Synthesis("unknown sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| VoiceError::Synthesis(format!("failed to create decoder: {e}")))?;

    let mut out: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(e)) => {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    break;
                }
                return Err(VoiceError::Synthesis(format!("audio read error: {e}")));
            }
            Err(e) => return Err(VoiceError::Synthesis(format!("audio read error: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // Individual bad frames are skipped, matching the decoder's
            // own recoverability contract.
            Err(SymphError::DecodeError(_)) => continue,
            Err(e) => return Err(VoiceError::Synthesis(format!("audio decode error: {e}"))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let frames = decoded.frames() as u64;

        let frames_usize = usize::try_from(frames).unwrap_or(usize::MAX);
        let required = frames_usize.saturating_mul(channels);
        let needs_new = match sample_buf.as_ref() {
            Some(b) => b.capacity() < required,
            None => true,
        };

        if needs_new {
            sample_buf = Some(SampleBuffer::<f32>::new(frames, spec));
        } else if let Some(b) = sample_buf.as_mut() {
            b.clear();
        }

        if let Some(b) = sample_buf.as_mut() {
            b.copy_interleaved_ref(decoded);
        }

        let data = match sample_buf.as_ref() {
            Some(b) => b.samples(),
            None => &[],
        };
        if channels <= 1 {
            out.extend_from_slice(data);
        } else {
            for frame in data.chunks_exact(channels) {
                let mut sum = 0.0f32;
                for s in frame {
                    sum += *s;
                }
                out.push(sum / channels as f32);
            }
        }
    }

    Ok((out, sample_rate))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::audio::capture::encode_wav;

    #[test]
    fn decodes_wav_payload_round_trip() {
        let samples: Vec<f32> = (0..4800)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 24_000.0).sin() * 0.25)
            .collect();
        let wav = encode_wav(&samples, 24_000).unwrap();

        let (decoded, rate) = decode_to_mono_f32(wav).unwrap();
        assert_eq!(rate, 24_000);
        assert_eq!(decoded.len(), samples.len());
        // 16-bit quantization allows small error.
        for (a, b) in decoded.iter().zip(samples.iter()) {
            assert!((a - b).abs() < 0.01);
        }
    }

    #[test]
    fn garbage_payload_errors() {
        let result = decode_to_mono_f32(vec![0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]);
        assert!(matches!(result, Err(VoiceError::Synthesis(_))));
    }

    #[test]
    fn empty_payload_errors() {
        assert!(decode_to_mono_f32(Vec::new()).is_err());
    }
}
