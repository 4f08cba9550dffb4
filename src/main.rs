use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use carebot::voice::{AudioCapture, SAMPLE_RATE, rms};
use carebot::{
    Config, Conversation, ConversationLog, OpenAiChatClient, PromptSource, Session, Speaker,
    TextPrompt, VoicePrompt,
};

/// Carebot - a caretaker assistant you can type or talk to
#[derive(Parser)]
#[command(name = "carebot", version, about, args_conflicts_with_subcommands = true)]
struct Cli {
    /// Input mode
    #[arg(value_enum)]
    mode: Option<Mode>,

    /// Ask how the user is doing before taking prompts
    #[arg(long)]
    check_in: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (defaults to ~/.config/carebot/config.toml)
    #[arg(long, env = "CAREBOT_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Type prompts
    #[value(alias = "t")]
    Text,
    /// Speak prompts
    #[value(alias = "v")]
    Voice,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speech output
    TestSpeech {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the speech output.")]
        text: String,
    },
}

/// How the program ended
enum Outcome {
    Finished,
    Interrupted,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    // Bad or missing arguments show usage without an error status
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    let filter = match cli.verbose {
        0 => "warn,carebot=info",
        1 => "info,carebot=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(Outcome::Finished) => ExitCode::SUCCESS,
        Ok(Outcome::Interrupted) => {
            // A pending stdin read would hold up runtime shutdown
            let _ = std::io::stdout().flush();
            std::process::exit(0);
        }
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<Outcome> {
    if let Some(cmd) = cli.command {
        match cmd {
            Command::TestMic { duration } => test_mic(duration).await?,
            Command::TestSpeech { text } => test_speech(cli.config.as_deref(), &text).await?,
        }
        return Ok(Outcome::Finished);
    }

    let Some(mode) = cli.mode else {
        Cli::command().print_help()?;
        return Ok(Outcome::Finished);
    };

    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    let mut source: Box<dyn PromptSource> = match mode {
        Mode::Text => Box::new(TextPrompt::stdin()),
        Mode::Voice => Box::new(VoicePrompt::new(&config).await?),
    };

    let completer = OpenAiChatClient::new(
        config.credential(),
        config.model.clone(),
        config.api_base_url.clone(),
        config.output_limit,
    )?;
    let speaker = Speaker::from_config(&config)?;
    let conversation = Conversation::new(
        config.persona.priming_turns(),
        config.budget(),
        ConversationLog::new(&config.conversation_log),
    )?;

    tracing::info!(model = %config.model, "starting carebot");

    let mut session = Session::start(conversation, Box::new(completer), speaker);
    let interrupted = session
        .run_until(source.as_mut(), cli.check_in, interrupt())
        .await;
    if interrupted {
        println!();
    }

    session.finish();

    Ok(if interrupted {
        Outcome::Interrupted
    } else {
        Outcome::Finished
    })
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    println!("Sample rate: {SAMPLE_RATE} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.drain();
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

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
    println!("Speech needs an RMS above the energy threshold (0.12 by default).");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: arecord -l (to list devices)");
    println!("  3. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Test the configured speech engine
#[allow(clippy::future_not_send)]
async fn test_speech(config_path: Option<&std::path::Path>, text: &str) -> anyhow::Result<()> {
    println!("Testing speech with text: \"{text}\"\n");

    let config = Config::load(config_path)?;
    println!("Engine: {:?}", config.speech.engine);

    let mut speaker = Speaker::from_config(&config)?;
    speaker.speak(Some(text)).await;

    println!("\n---");
    println!("If you heard the speech, speech output is working!");
    Ok(())
}
