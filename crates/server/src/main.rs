//! Hosts or joins a lockstep session over TCP.
//!
//! Run with: `game-server host` or `game-server join <host[:port][#player]>`.
//! Timing and limits come from `LOCKSTEP_*` environment variables (a `.env`
//! file is honoured); logging follows `RUST_LOG`.
mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use game_core::{GameConfig, PlayerId};
use runtime::{ConnectionString, DEFAULT_PORT, Event, Runtime, RuntimeConfig, SyncEvent, Topic};

#[derive(Parser)]
#[command(name = "game-server")]
#[command(about = "Lockstep session host and follower", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Host a session as the authority
    Host {
        /// Address to listen on
        #[arg(long, default_value_t = format!("0.0.0.0:{DEFAULT_PORT}"))]
        bind: String,

        /// Participant slot played by the host
        #[arg(long, default_value_t = 0)]
        player: u8,

        /// Number of active participants
        #[arg(long, default_value_t = GameConfig::DEFAULT_ACTIVE_PLAYERS)]
        players: u8,

        /// World seed as two 32-bit words
        #[arg(long, num_args = 2, value_names = ["SEED1", "SEED2"])]
        seed: Option<Vec<u32>>,
    },
    /// Join a running session
    Join {
        /// `host[:port][#player]`
        address: ConnectionString,

        /// Name shown to other peers
        #[arg(long, default_value = "player")]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _guard = logging::init()?;
    let cli = Cli::parse();
    let config = RuntimeConfig::from_env();

    let runtime = match cli.command {
        Command::Host {
            bind,
            player,
            players,
            seed,
        } => {
            let mut game_config = GameConfig::default();
            game_config.active_players = players;
            if let Some(seed) = seed.as_deref().and_then(|s| <[u32; 2]>::try_from(s).ok()) {
                game_config = game_config.with_seed(seed);
            }
            let runtime = Runtime::builder()
                .config(config)
                .game_config(game_config)
                .player(PlayerId(player))
                .host(bind.as_str())
                .await
                .with_context(|| format!("failed to host on {bind}"))?;
            if let Some(addr) = runtime.local_addr() {
                info!(%addr, "hosting session");
            }
            runtime
        }
        Command::Join { address, name } => Runtime::builder()
            .config(config)
            .name(name)
            .join(&address)
            .await
            .with_context(|| format!("failed to join {address}"))?,
    };

    run(runtime).await
}

/// Runs until Ctrl-C or until the session ends on its own.
async fn run(runtime: Runtime) -> Result<()> {
    let handle = runtime.handle();
    let mut sync_rx = handle.subscribe(Topic::Sync);

    let reporter = tokio::spawn(async move {
        while let Ok(event) = sync_rx.recv().await {
            if let Event::Sync(SyncEvent::Desync {
                frame,
                local,
                expected,
                ..
            }) = event
            {
                warn!(frame, %local, %expected, "session desynchronized");
            }
        }
    });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("interrupted, leaving session");
            runtime.shutdown().await?;
        }
        () = wait_for_end(&handle) => {
            runtime.wait().await.context("session failed")?;
        }
    }

    reporter.abort();
    Ok(())
}

/// Resolves once the session worker stops answering.
async fn wait_for_end(handle: &runtime::RuntimeHandle) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
    loop {
        ticker.tick().await;
        match handle.info().await {
            Ok(info) => tracing::debug!(frame = info.frame, fingerprint = %info.fingerprint, "status"),
            Err(err) => {
                info!(reason = %err, "session ended");
                return;
            }
        }
    }
}
