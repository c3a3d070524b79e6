//! Transcription and Synthesis Endpoint Contract Tests
//!
//! Verify the HTTP contracts of the speech-to-text and text-to-speech
//! collaborators: request format, success payloads, and error mapping.

use sibyl::RecordedAudio;
use sibyl::VoiceError;
use sibyl::config::{SynthesisConfig, TranscribeConfig};
use sibyl::synth::SynthesisClient;
use sibyl::transcribe::TranscribeClient;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn recorded_audio() -> RecordedAudio {
    RecordedAudio {
        wav: b"RIFF....WAVEfmt ".to_vec(),
        sample_rate: 16_000,
        duration_secs: 1.2,
    }
}

// ── transcription ─────────────────────────────────────────────

#[tokio::test]
async fn transcribe_posts_wav_and_returns_transcript() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/voice/transcribe"))
        .and(header("Content-Type", "audio/wav"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "transcript": "show me the worlds"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = TranscribeClient::new(&TranscribeConfig {
        url: format!("{}/voice/transcribe", mock_server.uri()),
    });

    let transcript = client
        .transcribe(&recorded_audio())
        .await
        .expect("transcription should succeed");
    assert_eq!(transcript, "show me the worlds");

    let requests = mock_server.received_requests().await.expect("requests recorded");
    assert_eq!(requests[0].body, recorded_audio().wav);
}

#[tokio::test]
async fn transcribe_missing_field_is_empty_transcript() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&mock_server)
        .await;

    let client = TranscribeClient::new(&TranscribeConfig {
        url: mock_server.uri(),
    });

    let transcript = client
        .transcribe(&recorded_audio())
        .await
        .expect("empty transcript is not an error");
    assert!(transcript.is_empty());
}

#[tokio::test]
async fn transcribe_error_status_maps_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(serde_json::json!({"error": "Empty audio data"})),
        )
        .mount(&mock_server)
        .await;

    let client = TranscribeClient::new(&TranscribeConfig {
        url: mock_server.uri(),
    });

    let result = client.transcribe(&recorded_audio()).await;
    let Err(VoiceError::Transcribe(message)) = result else {
        panic!("expected transcription error, got {result:?}");
    };
    assert!(message.contains("400"), "message: {message}");
    assert!(message.contains("Empty audio data"), "message: {message}");
}

#[tokio::test]
async fn transcribe_unconfigured_service_maps_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_json(serde_json::json!({"error": "transcription not configured"})),
        )
        .mount(&mock_server)
        .await;

    let client = TranscribeClient::new(&TranscribeConfig {
        url: mock_server.uri(),
    });

    let result = client.transcribe(&recorded_audio()).await;
    let Err(VoiceError::Transcribe(message)) = result else {
        panic!("expected transcription error, got {result:?}");
    };
    assert!(message.contains("503"), "message: {message}");
}

// ── synthesis ─────────────────────────────────────────────────

#[tokio::test]
async fn synthesize_posts_text_and_returns_audio_bytes() {
    let mock_server = MockServer::start().await;

    let audio_bytes = vec![0xFF, 0xFB, 0x90, 0x00, 0x01, 0x02];
    Mock::given(method("POST"))
        .and(path("/voice/tts"))
        .and(body_json(serde_json::json!({"text": "Hello there."})))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(audio_bytes.clone(), "audio/mpeg"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = SynthesisClient::new(&SynthesisConfig {
        url: format!("{}/voice/tts", mock_server.uri()),
    });

    let bytes = client
        .synthesize("Hello there.")
        .await
        .expect("synthesis should succeed");
    assert_eq!(bytes, audio_bytes);
}

#[tokio::test]
async fn synthesize_error_status_maps_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_json(serde_json::json!({"error": "synthesis not configured"})),
        )
        .mount(&mock_server)
        .await;

    let client = SynthesisClient::new(&SynthesisConfig {
        url: mock_server.uri(),
    });

    let result = client.synthesize("hello").await;
    let Err(VoiceError::Synthesis(message)) = result else {
        panic!("expected synthesis error, got {result:?}");
    };
    assert!(message.contains("503"), "message: {message}");
    assert!(message.contains("synthesis not configured"), "message: {message}");
}

#[tokio::test]
async fn synthesize_empty_payload_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(Vec::new(), "audio/mpeg"))
        .mount(&mock_server)
        .await;

    let client = SynthesisClient::new(&SynthesisConfig {
        url: mock_server.uri(),
    });

    assert!(matches!(
        client.synthesize("hello").await,
        Err(VoiceError::Synthesis(_))
    ));
}
