//! Provider client tests against a local HTTP stand-in
//!
//! Each client is pointed at an axum server that records the request and
//! replies with a canned body, so request building and response handling run
//! without touching the real services.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use secrecy::SecretString;
use tokio::net::TcpListener;

use codecoach::Error;
use codecoach::llm::{GeminiGenerator, OpenAiGenerator, TextGenerator};
use codecoach::stt::{DeepgramTranscriber, Transcriber, TranscriptionHint, WhisperTranscriber};
use codecoach::tts::{MurfSpeech, OpenAiSpeech, SpeechProvider, Synthesizer};

/// One request as the stand-in saw it
#[derive(Debug, Clone)]
struct Seen {
    method: Method,
    path: String,
    query: String,
    headers: HeaderMap,
    body: Bytes,
}

impl Seen {
    fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

type Reply = Arc<dyn Fn() -> Response + Send + Sync>;

#[derive(Clone)]
struct StandIn {
    seen: Arc<Mutex<Vec<Seen>>>,
    reply: Reply,
}

impl StandIn {
    /// Serve `reply` for every request on an ephemeral port
    async fn start(reply: impl Fn() -> Response + Send + Sync + 'static) -> (String, Self) {
        let stand_in = Self {
            seen: Arc::default(),
            reply: Arc::new(reply),
        };
        let app = Router::new().fallback(record).with_state(stand_in.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (base_url, stand_in)
    }

    async fn json(status: StatusCode, body: &'static str) -> (String, Self) {
        Self::start(move || (status, [(CONTENT_TYPE, "application/json")], body).into_response()).await
    }

    fn last(&self) -> Seen {
        self.seen.lock().unwrap().last().cloned().unwrap()
    }
}

async fn record(
    State(stand_in): State<StandIn>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    stand_in.seen.lock().unwrap().push(Seen {
        method,
        path: uri.path().to_string(),
        query: uri.query().unwrap_or_default().to_string(),
        headers,
        body,
    });
    (stand_in.reply)()
}

fn key(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

fn hint() -> TranscriptionHint {
    TranscriptionHint {
        language: "en".to_string(),
    }
}

#[tokio::test]
async fn test_deepgram_request_and_transcript() {
    let (base, stand_in) = StandIn::json(
        StatusCode::OK,
        r#"{"results":{"channels":[{"alternatives":[{"transcript":"use a hash map","confidence":0.98}]}]}}"#,
    )
    .await;
    let deepgram = DeepgramTranscriber::new(key("dg-key"), "nova-2".to_string())
        .unwrap()
        .with_base_url(&base);

    let text = deepgram.transcribe(b"RIFF-fake-wav", &hint()).await.unwrap();

    assert_eq!(text, "use a hash map");
    let seen = stand_in.last();
    assert_eq!(seen.method, Method::POST);
    assert_eq!(seen.path, "/v1/listen");
    assert!(seen.query.contains("model=nova-2"));
    assert!(seen.query.contains("smart_format=true"));
    assert!(seen.query.contains("language=en"));
    assert_eq!(seen.header("authorization"), "Token dg-key");
    assert_eq!(seen.header("content-type"), "audio/wav");
    assert_eq!(&seen.body[..], b"RIFF-fake-wav");
}

#[tokio::test]
async fn test_deepgram_without_alternatives_is_blank() {
    let (base, _stand_in) =
        StandIn::json(StatusCode::OK, r#"{"results":{"channels":[{"alternatives":[]}]}}"#).await;
    let deepgram = DeepgramTranscriber::new(key("dg-key"), "nova-2".to_string())
        .unwrap()
        .with_base_url(&base);

    assert_eq!(deepgram.transcribe(b"wav", &hint()).await.unwrap(), "");
}

#[tokio::test]
async fn test_deepgram_rejection_is_stt_error() {
    let (base, _stand_in) = StandIn::json(StatusCode::UNAUTHORIZED, r#"{"err_code":"INVALID_AUTH"}"#).await;
    let deepgram = DeepgramTranscriber::new(key("bad"), "nova-2".to_string())
        .unwrap()
        .with_base_url(&base);

    match deepgram.transcribe(b"wav", &hint()).await {
        Err(Error::Stt(message)) => {
            assert!(message.contains("401"));
            assert!(message.contains("INVALID_AUTH"));
        }
        other => panic!("expected STT error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_whisper_sends_multipart_form() {
    let (base, stand_in) = StandIn::json(StatusCode::OK, r#"{"text":"a binary heap"}"#).await;
    let whisper = WhisperTranscriber::new(key("oa-key"), "whisper-1".to_string())
        .unwrap()
        .with_base_url(&base);

    let text = whisper.transcribe(b"RIFF-fake-wav", &hint()).await.unwrap();

    assert_eq!(text, "a binary heap");
    let seen = stand_in.last();
    assert_eq!(seen.path, "/v1/audio/transcriptions");
    assert_eq!(seen.header("authorization"), "Bearer oa-key");
    assert!(seen.header("content-type").starts_with("multipart/form-data"));

    let form = String::from_utf8_lossy(&seen.body);
    assert!(form.contains(r#"name="file"; filename="audio.wav""#));
    assert!(form.contains("RIFF-fake-wav"));
    assert!(form.contains(r#"name="model""#));
    assert!(form.contains("whisper-1"));
    assert!(form.contains(r#"name="language""#));
}

#[tokio::test]
async fn test_whisper_server_error_is_stt_error() {
    let (base, _stand_in) = StandIn::json(StatusCode::INTERNAL_SERVER_ERROR, "{}").await;
    let whisper = WhisperTranscriber::new(key("oa-key"), "whisper-1".to_string())
        .unwrap()
        .with_base_url(&base);

    assert!(matches!(
        whisper.transcribe(b"wav", &hint()).await,
        Err(Error::Stt(_))
    ));
}

#[tokio::test]
async fn test_gemini_generate_content() {
    let (base, stand_in) = StandIn::json(
        StatusCode::OK,
        r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"What is "},{"text":"a JOIN?"}]}}]}"#,
    )
    .await;
    let gemini = GeminiGenerator::new(key("gm-key"), "gemini-2.0-flash".to_string())
        .unwrap()
        .with_base_url(&base);

    let reply = gemini.generate("User says: ready").await.unwrap();

    assert_eq!(reply, "What is a JOIN?");
    let seen = stand_in.last();
    assert_eq!(seen.path, "/v1beta/models/gemini-2.0-flash:generateContent");
    assert_eq!(seen.header("x-goog-api-key"), "gm-key");
    assert_eq!(seen.json()["contents"][0]["parts"][0]["text"], "User says: ready");
}

#[tokio::test]
async fn test_gemini_failures_are_llm_errors() {
    let (base, _stand_in) = StandIn::json(StatusCode::TOO_MANY_REQUESTS, "{}").await;
    let limited = GeminiGenerator::new(key("gm-key"), "gemini-2.0-flash".to_string())
        .unwrap()
        .with_base_url(&base);
    assert!(matches!(limited.generate("hi").await, Err(Error::Llm(_))));

    let (base, _stand_in) =
        StandIn::json(StatusCode::OK, r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).await;
    let blocked = GeminiGenerator::new(key("gm-key"), "gemini-2.0-flash".to_string())
        .unwrap()
        .with_base_url(&base);
    assert!(matches!(blocked.generate("hi").await, Err(Error::Llm(_))));
}

#[tokio::test]
async fn test_openai_chat_completion() {
    let (base, stand_in) = StandIn::json(
        StatusCode::OK,
        r#"{"choices":[{"message":{"role":"assistant","content":"Explain a B-tree."}}]}"#,
    )
    .await;
    let openai = OpenAiGenerator::new(key("oa-key"), "gpt-4o-mini".to_string())
        .unwrap()
        .with_base_url(&base);

    let reply = openai.generate("User says: ready").await.unwrap();

    assert_eq!(reply, "Explain a B-tree.");
    let seen = stand_in.last();
    assert_eq!(seen.path, "/v1/chat/completions");
    assert_eq!(seen.header("authorization"), "Bearer oa-key");
    let body = seen.json();
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["messages"][0]["content"], "User says: ready");
}

#[tokio::test]
async fn test_murf_stream_collects_into_one_artifact() {
    let (base, stand_in) = StandIn::start(|| {
        let chunks = ["ID3", "frame-one", "frame-two"]
            .map(|c| Ok::<_, std::io::Error>(Bytes::from_static(c.as_bytes())));
        let body = Body::from_stream(futures::stream::iter(chunks));
        ([(CONTENT_TYPE, "audio/mpeg")], body).into_response()
    })
    .await;
    let murf = MurfSpeech::new(
        key("mf-key"),
        "en-US-caleb".to_string(),
        "FALCON".to_string(),
        "en-US".to_string(),
    )
    .unwrap()
    .with_base_url(&base);
    let synthesizer = Synthesizer::new(Box::new(murf), Duration::from_secs(5));

    let artifact = synthesizer.synthesize("What is a heap?").await.unwrap();

    assert_eq!(artifact.bytes, b"ID3frame-oneframe-two");
    assert_eq!(artifact.source_text, "What is a heap?");
    let seen = stand_in.last();
    assert_eq!(seen.path, "/v1/speech/stream");
    assert_eq!(seen.header("api-key"), "mf-key");
    let body = seen.json();
    assert_eq!(body["voiceId"], "en-US-caleb");
    assert_eq!(body["text"], "What is a heap?");
    assert_eq!(body["format"], "MP3");
    assert_eq!(body["multiNativeLocale"], "en-US");
}

#[tokio::test]
async fn test_murf_rejection_is_tts_error() {
    let (base, _stand_in) = StandIn::json(StatusCode::FORBIDDEN, r#"{"errorMessage":"quota"}"#).await;
    let murf = MurfSpeech::new(
        key("mf-key"),
        "en-US-caleb".to_string(),
        "FALCON".to_string(),
        "en-US".to_string(),
    )
    .unwrap()
    .with_base_url(&base);

    assert!(matches!(murf.stream("hello").await, Err(Error::Tts(_))));
}

#[tokio::test]
async fn test_murf_empty_body_fails_synthesis() {
    let (base, _stand_in) = StandIn::start(|| ([(CONTENT_TYPE, "audio/mpeg")], Body::empty()).into_response()).await;
    let murf = MurfSpeech::new(
        key("mf-key"),
        "en-US-caleb".to_string(),
        "FALCON".to_string(),
        "en-US".to_string(),
    )
    .unwrap()
    .with_base_url(&base);
    let synthesizer = Synthesizer::new(Box::new(murf), Duration::from_secs(5));

    assert!(matches!(
        synthesizer.synthesize("hello").await,
        Err(Error::SynthesisFailed(_))
    ));
}

#[tokio::test]
async fn test_openai_speech_request() {
    let (base, stand_in) =
        StandIn::start(|| ([(CONTENT_TYPE, "audio/mpeg")], b"ID3openai".as_slice()).into_response()).await;
    let openai = OpenAiSpeech::new(key("oa-key"), "alloy".to_string(), "tts-1".to_string())
        .unwrap()
        .with_base_url(&base);
    let synthesizer = Synthesizer::new(Box::new(openai), Duration::from_secs(5));

    let artifact = synthesizer.synthesize("Next question.").await.unwrap();

    assert_eq!(artifact.bytes, b"ID3openai");
    let seen = stand_in.last();
    assert_eq!(seen.path, "/v1/audio/speech");
    assert_eq!(seen.header("authorization"), "Bearer oa-key");
    let body = seen.json();
    assert_eq!(body["model"], "tts-1");
    assert_eq!(body["voice"], "alloy");
    assert_eq!(body["input"], "Next question.");
    assert_eq!(body["response_format"], "mp3");
}
