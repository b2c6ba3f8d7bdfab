use std::path::PathBuf;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use futures::{StreamExt, stream};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use edge_speech::core::tts::Path as ResponsePath;
use edge_speech::{
    ClientConfig, EdgeTts, Granularity, Message, Rate, SmartSplit, SplitOptions, Volume,
};

/// Edge Speech - read-aloud speech synthesis client
#[derive(Parser, Debug)]
#[command(name = "edge-speech")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synthesize text into an audio file
    Speak {
        /// Text to speak (reads --file or stdin when omitted)
        #[arg(short = 't', long = "text", conflicts_with = "file")]
        text: Option<String>,

        /// File to read text from
        #[arg(short = 'f', long = "file", value_name = "FILE")]
        file: Option<PathBuf>,

        /// Where to write the audio
        #[arg(short = 'o', long = "output", value_name = "FILE")]
        output: PathBuf,

        /// Voice name, overrides the configuration
        #[arg(long)]
        voice: Option<String>,

        /// Speaking rate such as +10% or -20%
        #[arg(long, allow_hyphen_values = true)]
        rate: Option<Rate>,

        /// Volume such as +50% or -10%
        #[arg(long, allow_hyphen_values = true)]
        volume: Option<Volume>,

        /// Finest boundary used when splitting long text
        #[arg(long)]
        granularity: Option<Granularity>,
    },

    /// List available voices
    Voices {
        /// Only show voices whose locale starts with this prefix
        #[arg(short = 'l', long = "locale")]
        locale: Option<String>,
    },

    /// Split a text file into chunks and print them
    Split {
        /// File to split
        #[arg(short = 'f', long = "file", value_name = "FILE")]
        file: PathBuf,

        /// Maximum chunk size in bytes
        #[arg(short = 'b', long = "budget")]
        budget: usize,

        #[arg(short = 'g', long = "granularity", default_value = "grapheme")]
        granularity: Granularity,

        /// Locale hints, may be repeated
        #[arg(long = "locale")]
        locales: Vec<String>,

        /// Treat the input as already XML-escaped
        #[arg(long)]
        escaped: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    // Must be installed before any TLS connection is attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            ClientConfig::from_file(path)?
        }
        None => ClientConfig::from_env()?,
    };

    match cli.command {
        Commands::Speak {
            text,
            file,
            output,
            voice,
            rate,
            volume,
            granularity,
        } => {
            let mut config = config;
            if let Some(voice) = voice {
                config.voice = voice;
            }
            if let Some(rate) = rate {
                config.rate = rate;
            }
            if let Some(volume) = volume {
                config.volume = volume;
            }
            if let Some(granularity) = granularity {
                config.granularity = granularity;
            }
            let text = read_input(text, file).await?;
            speak(config, text, output).await
        }
        Commands::Voices { locale } => voices(config, locale).await,
        Commands::Split {
            file,
            budget,
            granularity,
            locales,
            escaped,
        } => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let options = SplitOptions::new(budget)?
                .with_granularity(granularity)
                .with_locales(locales)
                .escaped(escaped);
            for (index, chunk) in SmartSplit::new(text.split_inclusive('\n'), options).enumerate() {
                let chunk = chunk?;
                println!("--- chunk {} ({} bytes) ---", index + 1, chunk.len());
                println!("{chunk}");
            }
            Ok(())
        }
    }
}

async fn read_input(text: Option<String>, file: Option<PathBuf>) -> anyhow::Result<String> {
    if let Some(text) = text {
        return Ok(text);
    }
    if let Some(file) = file {
        return tokio::fs::read_to_string(&file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()));
    }
    let mut text = String::new();
    tokio::io::stdin()
        .read_to_string(&mut text)
        .await
        .context("Failed to read stdin")?;
    Ok(text)
}

async fn speak(config: ClientConfig, text: String, output: PathBuf) -> anyhow::Result<()> {
    let tts = EdgeTts::new(config)?;

    // Lines go in as separate fragments so splitting can start before the
    // whole input is escaped
    let fragments: Vec<String> = text.split_inclusive('\n').map(str::to_string).collect();
    let mut messages = tts.synthesize(stream::iter(fragments)).await?;

    let mut file = File::create(&output)
        .await
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut audio_bytes = 0usize;
    let mut turns = 0usize;

    while let Some(message) = messages.next().await {
        match message? {
            Message::Audio { data, .. } => {
                audio_bytes += data.len();
                file.write_all(&data).await?;
            }
            message @ Message::Control { .. } => match message.path() {
                Some(ResponsePath::TurnEnd) => turns += 1,
                Some(ResponsePath::AudioMetadata) => {
                    for boundary in message.boundaries() {
                        debug!(
                            offset = boundary.offset,
                            duration = boundary.duration,
                            "{:?}: {}",
                            boundary.kind,
                            boundary.text
                        );
                    }
                }
                _ => {}
            },
        }
    }
    file.flush().await?;

    info!(
        "Wrote {} bytes of audio from {} request(s) to {}",
        audio_bytes,
        turns,
        output.display()
    );
    Ok(())
}

async fn voices(config: ClientConfig, locale: Option<String>) -> anyhow::Result<()> {
    let tts = EdgeTts::new(config)?;
    let mut voices = tts.list_voices().await?;
    if let Some(prefix) = locale {
        voices.retain(|v| v.locale.starts_with(&prefix));
    }
    voices.sort_by(|a, b| a.short_name.cmp(&b.short_name));

    for voice in &voices {
        println!("{:<40} {:<8} {}", voice.short_name, voice.gender, voice.locale);
    }
    info!("{} voice(s)", voices.len());
    Ok(())
}
