use clap::Parser;
use open_speech::client::capture::AudioStream;
use open_speech::client::{
    ApiClient, ClientError, FileMicrophone, FileSink, Microphone, Playback, SessionSettings, VoiceSession,
};
use open_speech::models::chat::MessageType;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "voice-client", version, about = "Talk to an open-speech server with prerecorded utterances")]
struct Cli {
    /// Recorded utterances, one turn per file, in order
    recordings: Vec<PathBuf>,

    /// Server base URL
    #[arg(long, env = "OPEN_SPEECH_URL", default_value = "http://localhost:3000")]
    server: String,

    /// Account email
    #[arg(short, long, env = "OPEN_SPEECH_EMAIL")]
    email: String,

    /// Account password; prompted for when not set
    #[arg(long, env = "OPEN_SPEECH_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Create the account instead of signing in
    #[arg(long)]
    sign_up: bool,

    /// Directory reply audio is written to
    #[arg(long, default_value = "replies")]
    output_dir: PathBuf,

    /// Ask for text replies only
    #[arg(long)]
    no_voice: bool,

    /// Longest utterance in seconds
    #[arg(long, default_value_t = 10)]
    record_limit_secs: u64,

    /// Client-side timeout for one reply in seconds
    #[arg(long, default_value_t = 110)]
    timeout_secs: u64,

    /// Retries after a service-unavailable answer
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Bytes handed over per recorder timeslice
    #[arg(long, default_value_t = 16 * 1024)]
    segment_bytes: usize,

    /// Print the conversation so far before talking
    #[arg(long)]
    history: bool,

    /// Delete the whole conversation before talking
    #[arg(long)]
    clear: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Opens the recordings one after another, one per turn.
struct Playlist {
    microphones: Vec<FileMicrophone>,
    next: AtomicUsize,
}

impl Microphone for Playlist {
    fn open(&self) -> Result<Box<dyn AudioStream>, ClientError> {
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        match self.microphones.get(index) {
            Some(microphone) => microphone.open(),
            None => Err(ClientError::Capture("no more recordings".to_string())),
        }
    }
}

fn init_logging(verbose: u8) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default = match verbose {
        0 => "warn,open_speech=info",
        1 => "info,open_speech=debug",
        _ => "debug,open_speech=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let password = match cli.password.clone() {
        Some(password) => password,
        None => {
            print!("Password: ");
            io::stdout().flush()?;
            rpassword::read_password()?
        }
    };

    let mut api = ApiClient::new(&cli.server);
    let user = if cli.sign_up {
        api.sign_up(&cli.email, &password).await
    } else {
        api.sign_in(&cli.email, &password).await
    };
    let user = match user {
        Ok(user) => user,
        Err(e) => {
            eprintln!("Sign-in failed: {}", e.notice());
            std::process::exit(1);
        }
    };
    println!("Signed in as {}", user.email);

    let microphone = Playlist {
        microphones: cli
            .recordings
            .iter()
            .map(|path| FileMicrophone::new(path, cli.segment_bytes, Duration::from_secs(1)))
            .collect(),
        next: AtomicUsize::new(0),
    };

    let settings = SessionSettings {
        record_limit: Duration::from_secs(cli.record_limit_secs),
        request_timeout: Duration::from_secs(cli.timeout_secs),
        max_retries: cli.retries,
        enable_voice: !cli.no_voice,
        ..SessionSettings::default()
    };

    let mut session = VoiceSession::new(
        Arc::new(api.clone()),
        Arc::new(microphone),
        Arc::new(FileSink::new(&cli.output_dir)),
        settings,
    );

    let cancel = session.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    if cli.clear {
        let deleted = session.clear_history().await?;
        println!("Deleted {} messages", deleted);
    }

    if cli.history {
        session.load_history(0).await?;
        while session.log().has_more() {
            session.load_more().await?;
        }
        for message in session.messages() {
            let speaker = match message.kind {
                MessageType::User => "You",
                MessageType::Assistant => "Assistant",
            };
            println!("[{}] {}: {}", message.created_at.format("%Y-%m-%d %H:%M"), speaker, message.content);
        }
    }

    for path in &cli.recordings {
        println!("Speaking {}...", path.display());
        match session.run_turn(&CancellationToken::new()).await {
            Ok(turn) => {
                println!("You: {}", turn.transcript.text);
                println!("Assistant: {}", turn.reply.text);
                match turn.playback {
                    Playback::Played => println!("(reply audio saved to {})", cli.output_dir.display()),
                    Playback::SpeechUnavailable => println!("(reply generated, but speech was not)"),
                    Playback::Failed(reason) => println!("(reply generated, but playback failed: {})", reason),
                    Playback::Silent => {}
                }
            }
            Err(ClientError::Cancelled) => {
                eprintln!("Cancelled");
                break;
            }
            Err(e) => eprintln!("{}", e.notice()),
        }
    }

    if let Err(e) = api.sign_out().await {
        tracing::warn!(error = %e, "sign-out failed");
    }
    Ok(())
}
