use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voice_dots::api::ApiServer;
use voice_dots::voice::{AudioCapture, AudioPlayback, MicrophoneProvider, SynthesizedSpeaker};
use voice_dots::{
    ActivityAnimator, ChatClient, Command as TurnCommand, Config, HttpChatClient, SpeechPlayback,
    VoiceTurnController,
};

/// voice-dots - talk to a chat backend and hear it answer
#[derive(Parser)]
#[command(name = "voice-dots", version, about)]
struct Cli {
    /// Control API port
    #[arg(long, env = "VOICE_DOTS_PORT")]
    port: Option<u16>,

    /// Chat backend base URL
    #[arg(long, env = "VOICE_DOTS_CHAT_URL")]
    chat_url: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Start listening immediately
    #[arg(long)]
    listen: bool,

    /// Disable voice features (for machines without audio hardware)
    #[arg(long, env = "VOICE_DOTS_DISABLE_VOICE")]
    disable_voice: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Synthesize and speak a line of text
    Say {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Send one prompt to the chat backend and print the reply
    Ask {
        /// Prompt to send
        prompt: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,voice_dots=info",
        1 => "info,voice_dots=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

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
    let mut config = Config::load_with_options(cli.disable_voice);
    if let Some(port) = cli.port {
        config.api_server.port = port;
    }
    if let Some(url) = cli.chat_url {
        config.chat.url = url;
    }

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::Say { text } => say(&config, &text).await,
            Command::Ask { prompt } => ask(&config, &prompt).await,
        };
    }

    tracing::info!(
        chat = %config.chat_endpoint(),
        port = config.api_server.port,
        voice = config.voice.enabled,
        "starting voice-dots"
    );

    let provider = Arc::new(MicrophoneProvider::from_config(&config));
    let chat = Arc::new(HttpChatClient::from_config(&config)?);
    let speaker = Arc::new(SynthesizedSpeaker::from_config(&config));
    let animator = ActivityAnimator::new(config.animator);

    let controller = VoiceTurnController::new(provider, chat, speaker, animator);
    let handle = controller.handle();

    if config.api_server.enabled {
        let server = ApiServer::new(handle.clone(), config.api_server.port).spawn();
        tokio::spawn(async move {
            match server.await {
                Ok(Err(e)) => tracing::error!(error = %e, "control server stopped"),
                Err(e) => tracing::error!(error = %e, "control server task failed"),
                Ok(Ok(())) => {}
            }
        });
    }

    let mut views = handle.subscribe();
    tokio::spawn(async move {
        let mut last = views.borrow().clone();
        while views.changed().await.is_ok() {
            let view = views.borrow_and_update().clone();
            if view.state != last.state {
                tracing::info!(status = view.status_label(), "{:?}", view.state);
            }
            if view.transcript != last.transcript && !view.transcript.is_empty() {
                tracing::info!(transcript = %view.transcript, "heard");
            }
            if view.reply != last.reply && !view.reply.is_empty() {
                tracing::info!(reply = %view.reply, "reply");
            }
            if view.notice != last.notice {
                if let Some(notice) = &view.notice {
                    tracing::warn!(kind = ?notice.kind, "{}", notice.message);
                }
            }
            last = view;
        }
    });

    if cli.listen {
        handle.send(TurnCommand::Start)?;
    }

    tracing::info!("voice-dots ready");

    tokio::select! {
        () = controller.run() => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("shutting down");
        }
    }

    Ok(())
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

        let samples = capture.take_buffer();
        let energy = calculate_rms(&samples);
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

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = 24000_i32;
    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (sample_rate as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    tokio::task::spawn_blocking(move || AudioPlayback::new()?.play_blocking(samples)).await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Speak a line through the configured synthesis engine
async fn say(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Speaking: \"{text}\"");
    SynthesizedSpeaker::from_config(config).speak(text).await?;
    println!("Done");
    Ok(())
}

/// One round trip to the chat backend
async fn ask(config: &Config, prompt: &str) -> anyhow::Result<()> {
    let client = HttpChatClient::from_config(config)?;
    tracing::debug!(endpoint = client.endpoint(), "asking");
    let reply = client.send(prompt).await?;
    println!("{reply}");
    Ok(())
}
