use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use codecoach::api::ApiServer;
use codecoach::pipeline::{StoredAudio, TurnInput, TurnOrchestrator, is_exit_command};
use codecoach::tts::Synthesizer;
use codecoach::voice::{AudioCapture, AudioPlayback, DecodedAudio, play_mp3_blocking, rms};
use codecoach::{Config, TurnFailureReason};

/// Session id used by the console interview
const CONSOLE_SESSION: &str = "console";

/// CodeCoach - voice interview practice assistant
#[derive(Parser)]
#[command(name = "codecoach", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable microphone and speaker (for headless servers without audio hardware)
    #[arg(long, env = "CODECOACH_DISABLE_VOICE")]
    disable_voice: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Run the HTTP API (default)
    Serve {
        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run a spoken interview in the terminal
    Interview {
        /// Practice topic
        #[arg(short, long)]
        topic: Option<String>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env must be loaded before clap reads env-backed flags
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,codecoach=info",
        1 => "info,codecoach=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    if let Err(e) = dotenv {
        if !e.not_found() {
            tracing::warn!(error = %e, "failed to read .env file");
        }
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        None => serve(cli.disable_voice, None).await,
        Some(Command::Serve { port }) => serve(cli.disable_voice, port).await,
        Some(Command::Interview { topic }) => interview(topic).await,
        Some(Command::TestMic { duration }) => test_mic(duration).await,
        Some(Command::TestSpeaker) => test_speaker().await,
        Some(Command::TestTts { text }) => test_tts(&text).await,
    }
}

/// Load and validate configuration, failing fast on missing credentials
fn load_config(disable_voice: bool) -> anyhow::Result<Config> {
    let config = Config::load_with_options(disable_voice)?;
    tracing::debug!(?config, "loaded configuration");
    config.validate()?;
    Ok(config)
}

/// Run the HTTP API until interrupted
async fn serve(disable_voice: bool, port: Option<u16>) -> anyhow::Result<()> {
    let config = load_config(disable_voice)?;
    let port = port.unwrap_or(config.server.port);

    let orchestrator = TurnOrchestrator::from_config(&config)?;
    let providers = orchestrator.providers();
    tracing::info!(
        port,
        stt = ?providers.transcription,
        llm = providers.generation,
        tts = providers.synthesis,
        capture = providers.capture,
        "starting codecoach"
    );

    if !config.voice_enabled {
        tracing::info!("voice disabled: /process_interaction needs text or use /process_audio");
    }

    ApiServer::new(orchestrator, port)
        .static_dir(config.server.static_dir.clone())
        .run()
        .await?;

    Ok(())
}

/// Console interview: speak, listen, reply, and report on exit
async fn interview(topic: Option<String>) -> anyhow::Result<()> {
    let config = load_config(false)?;
    let persona = config.interview.persona_name.clone();
    let orchestrator = TurnOrchestrator::from_config(&config)?;

    if let Some(topic) = topic.filter(|t| !t.trim().is_empty()) {
        let session = orchestrator.sessions().get_or_create(CONSOLE_SESSION).await;
        session.lock().await.set_topic(topic.trim());
    }

    println!("--- {persona} Started (Voice: {}) ---", config.tts.voice);
    println!("Tip: Say 'Exit' or 'Stop' to end the interview and get feedback.\n");

    let intro = orchestrator.introduce(CONSOLE_SESSION).await;
    println!("{persona}: {}", intro.text);
    play(intro.audio).await;

    loop {
        let recognized = tokio::select! {
            result = orchestrator.recognize(TurnInput::Capture) => result,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };

        let recognized = match recognized {
            Ok(recognized) => recognized,
            Err(failure) => {
                tracing::debug!(%failure, "nothing recognized, listening again");
                continue;
            }
        };

        println!("You: {}", recognized.text);

        if is_exit_command(&recognized.text) {
            break;
        }

        match orchestrator.respond(CONSOLE_SESSION, recognized).await {
            Ok(turn) => {
                println!("{persona}: {}", turn.reply_text);
                play(Some(turn.audio)).await;
            }
            Err(failure) if failure.reason == TurnFailureReason::AudioGenerationFailed => {
                eprintln!("{}", failure.message);
            }
            Err(failure) => tracing::warn!(%failure, "turn failed"),
        }
    }

    println!("\nGenerating feedback report...");
    let feedback = orchestrator.end_session(CONSOLE_SESSION, true).await;

    println!("\n--- FEEDBACK REPORT ---");
    println!("{}", feedback.report.text);
    if let Some(score) = feedback.report.score {
        println!("Score: {score}/10");
    }
    println!("-----------------------");
    play(feedback.audio).await;

    Ok(())
}

/// Play stored audio, logging rather than failing
async fn play(audio: Option<StoredAudio>) {
    let Some(audio) = audio else {
        return;
    };
    if let Err(e) = play_mp3_blocking(audio.artifact.bytes).await {
        tracing::warn!(artifact = %audio.artifact.id, error = %e, "playback failed");
    }
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    let sample_rate = capture.sample_rate();
    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.peek_buffer();
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );

        capture.clear_buffer();
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = 24_000_u32;
    let frequency = 440.0_f32;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    let tone = DecodedAudio {
        samples,
        sample_rate,
    };
    tokio::task::spawn_blocking(move || AudioPlayback::new()?.play(&tone)).await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Test TTS output with the configured speech provider
async fn test_tts(text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load()?;
    let synthesizer = Synthesizer::from_config(&config)?;

    println!("Synthesizing speech with {}...", synthesizer.provider_name());
    let artifact = synthesizer.synthesize(text).await?;
    println!("Got {} bytes of audio data", artifact.bytes.len());

    if let Some(header) = artifact.bytes.get(..4) {
        println!(
            "First 4 bytes: {:02x} {:02x} {:02x} {:02x}",
            header[0], header[1], header[2], header[3]
        );
    }

    println!("Playing audio...");
    play_mp3_blocking(artifact.bytes).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
