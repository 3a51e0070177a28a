//! scrobd — Last.fm scrobbler daemon for the local music player
//!
//! Watches the player, records plays, and submits them to Last.fm
//! through a durable queue. Also publishes the current track as rich
//! presence when enabled.

use anyhow::Context;
use clap::{Parser, Subcommand};
use scrobd_common::config::{self, Config};
use scrobd_daemon::daemon::{Daemon, DaemonConfig};
use scrobd_daemon::player::{AppleMusicSource, PlayerSource};
use scrobd_daemon::queue::ScrobbleQueue;
use scrobd_daemon::submit::LastFmSubmitter;
use scrobd_lastfm::{Client, ClientConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// scrobd - Last.fm scrobbler for the local music player
#[derive(Parser, Debug)]
#[command(name = "scrobd", version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the scrobbler daemon
    Daemon,
    /// Authorize scrobd against your Last.fm account
    Auth,
    /// Print the currently playing track
    Now,
    /// Inspect the scrobble queue
    Queue {
        /// Include already-submitted entries
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    init_tracing(&config, cli.verbose);

    match cli.command {
        Commands::Daemon => run_daemon(config).await,
        Commands::Auth => run_auth(config, cli.config).await,
        Commands::Now => run_now().await,
        Commands::Queue { all } => run_queue(all).await,
    }
}

fn init_tracing(config: &Config, verbose: bool) {
    let level = if verbose {
        "debug"
    } else if config.logging.level.is_empty() {
        "info"
    } else {
        config.logging.level.as_str()
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("scrobd={},scrobd_daemon={},scrobd_lastfm={}", level, level, level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run_daemon(config: Config) -> anyhow::Result<()> {
    info!("scrobd starting");

    if config.lastfm.api_key.is_empty() || config.lastfm.api_secret.is_empty() {
        anyhow::bail!("last.fm API key and secret are required; run `scrobd auth` first");
    }
    if config.lastfm.session_key.is_empty() {
        // Keep running so plays queue up; nothing submits until the
        // user authorizes.
        warn!("no last.fm session key; scrobbles will queue until you run `scrobd auth`");
    }

    let client = Client::new(ClientConfig {
        api_key: config.lastfm.api_key.clone(),
        api_secret: config.lastfm.api_secret.clone(),
        session_key: (!config.lastfm.session_key.is_empty())
            .then(|| config.lastfm.session_key.clone()),
        ..Default::default()
    })?;

    let data_dir = config::data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;

    let daemon_config = DaemonConfig {
        poll_interval: Duration::from_secs(config.poll_interval),
        process_interval: Duration::from_secs(config.process_interval),
        state_file: Some(data_dir.join("state.json")),
        queue_db: data_dir.join("queue.db"),
    };

    let player: Arc<dyn PlayerSource> = Arc::new(AppleMusicSource);
    let submitter = Arc::new(LastFmSubmitter::new(client));
    let daemon = Arc::new(Daemon::new(daemon_config, player, submitter).await?);

    if config.discord.enabled {
        spawn_presence(&config, &daemon);
    }

    daemon.run().await?;
    Ok(())
}

#[cfg(unix)]
fn spawn_presence(config: &Config, daemon: &Arc<Daemon>) {
    use scrobd_daemon::presence::{DiscordIpc, Presence};

    let app_id = config.discord.app_id.clone();
    if app_id.is_empty() {
        warn!("discord presence enabled but discord.app_id is not set");
        return;
    }

    let events = daemon.events().subscribe();
    let shutdown = daemon.shutdown_watch();
    tokio::spawn(async move {
        let presence = Presence::new(Box::new(DiscordIpc::new(app_id)), "Apple Music");
        presence.run(events, shutdown).await;
    });
}

#[cfg(not(unix))]
fn spawn_presence(_config: &Config, _daemon: &Arc<Daemon>) {
    warn!("discord presence is only supported on unix platforms");
}

async fn run_auth(mut config: Config, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    use tokio::io::{AsyncBufReadExt, BufReader};

    println!("Last.fm Authentication");
    println!("======================");
    println!();
    println!("You can get API credentials from: https://www.last.fm/api/account/create");
    println!();

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    if config.lastfm.api_key.is_empty() {
        print_flushed("Enter your Last.fm API Key: ")?;
        config.lastfm.api_key = read_trimmed(&mut stdin).await?;
    }
    if config.lastfm.api_secret.is_empty() {
        print_flushed("Enter your Last.fm API Secret: ")?;
        config.lastfm.api_secret = read_trimmed(&mut stdin).await?;
    }
    if config.lastfm.api_key.is_empty() || config.lastfm.api_secret.is_empty() {
        anyhow::bail!("API key and secret are required");
    }

    let client = Client::new(ClientConfig {
        api_key: config.lastfm.api_key.clone(),
        api_secret: config.lastfm.api_secret.clone(),
        ..Default::default()
    })?;

    println!("\nGenerating authentication token...");
    let token = client.auth_get_token().await?;

    println!("\nPlease visit this URL to authorize scrobd:");
    println!("\n  {}\n", client.auth_url(&token.token));
    println!("After authorizing, press Enter to continue...");
    let _ = stdin.next_line().await;

    println!("Retrieving session key...");
    let session = get_session_with_retries(&client, &token.token).await?;

    config.lastfm.session_key = session.key;
    config
        .save(config_path.as_deref())
        .context("failed to save config")?;

    println!("\nAuthenticated as {}.", session.username);
    println!("Session key saved. You can now run `scrobd daemon`.");
    Ok(())
}

async fn get_session_with_retries(
    client: &Client,
    token: &str,
) -> anyhow::Result<scrobd_lastfm::Session> {
    const MAX_RETRIES: u32 = 3;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let mut last_err = None;
    for attempt in 1..=MAX_RETRIES {
        match client.auth_get_session(token).await {
            Ok(session) => return Ok(session),
            Err(e) => {
                if attempt < MAX_RETRIES {
                    println!(
                        "Failed to retrieve session (attempt {}/{}). Retrying in {:?}...",
                        attempt, MAX_RETRIES, RETRY_DELAY
                    );
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                last_err = Some(e);
            }
        }
    }

    Err(anyhow::anyhow!(
        "failed to get session key after {} attempts: {}",
        MAX_RETRIES,
        last_err.expect("at least one attempt")
    ))
}

async fn run_now() -> anyhow::Result<()> {
    let player = AppleMusicSource;
    match player.current_track().await? {
        Some(track) => {
            let position = track.position.as_secs();
            let duration = track.duration.as_secs();
            println!(
                "{} - {} [{}] ({}:{:02}/{}:{:02}, {})",
                track.artist,
                track.name,
                track.album,
                position / 60,
                position % 60,
                duration / 60,
                duration % 60,
                track.state
            );
        }
        None => println!("Nothing playing"),
    }
    Ok(())
}

async fn run_queue(all: bool) -> anyhow::Result<()> {
    let queue_db = config::data_dir().join("queue.db");
    if !queue_db.exists() {
        println!("Queue is empty (no database at {}).", queue_db.display());
        return Ok(());
    }

    let queue = ScrobbleQueue::open(&queue_db).await?;
    let entries = if all {
        queue.all().await?
    } else {
        queue.pending(0).await?
    };

    if entries.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    for entry in &entries {
        let status = if entry.submitted {
            "submitted"
        } else if entry.error.is_empty() {
            "pending"
        } else {
            "failed"
        };
        println!(
            "#{:<5} {}  {} - {}  [{}]{}",
            entry.id,
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.artist,
            entry.track_name,
            status,
            if entry.error.is_empty() {
                String::new()
            } else {
                format!("  ({})", entry.error)
            }
        );
    }

    let pending = queue.count(false).await?;
    let total = queue.count(true).await?;
    println!("\n{} pending, {} total", pending, total);

    queue.close().await;
    Ok(())
}

fn print_flushed(prompt: &str) -> anyhow::Result<()> {
    use std::io::Write;
    print!("{}", prompt);
    std::io::stdout().flush()?;
    Ok(())
}

async fn read_trimmed(
    stdin: &mut tokio::io::Lines<tokio::io::BufReader<tokio::io::Stdin>>,
) -> anyhow::Result<String> {
    Ok(stdin.next_line().await?.unwrap_or_default().trim().to_string())
}
