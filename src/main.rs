use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use nodereplay::options::split_option_args;
use nodereplay::pgn::GameReader;
use nodereplay::{BatchedExecutionPool, EngineCommand, ReplayContext, ReplayVerifier, SessionPolicy};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "nodereplay",
    about = "Replay recorded games through an engine and report any move or score that differs",
    after_help = "Engine options are forwarded with --option.Name=Value"
)]
struct Args {
    /// Path to the engine binary
    #[arg(long)]
    engine: PathBuf,

    /// PGN file with node counts in the move comments
    #[arg(long)]
    pgn: PathBuf,

    /// Name of the player (White/Black tag) whose moves are replayed
    #[arg(long)]
    player: String,

    /// Number of engine processes running in parallel
    #[arg(long, default_value_t = 15)]
    threads: usize,

    /// Games queued per batch
    #[arg(long, default_value_t = 256)]
    batch_size: usize,

    /// Keep one engine per worker instead of one per game
    #[arg(long)]
    reuse_engine: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let (argv, options) = split_option_args(std::env::args());
    let args = Args::parse_from(argv);

    let file = File::open(&args.pgn).with_context(|| format!("opening {}", args.pgn.display()))?;
    let games = GameReader::new(BufReader::new(file)).filter_map(|game| match game {
        Ok(g) => Some(g),
        Err(e) => { warn!("skipping unreadable game: {}", e); None }
    });

    let ctx = Arc::new(ReplayContext {
        launcher: Arc::new(EngineCommand::new(&args.engine)),
        player: args.player.clone(),
        options,
        policy: if args.reuse_engine { SessionPolicy::PerWorker } else { SessionPolicy::PerGame },
    });
    info!("replaying games of {} with {} ({} engine options)", ctx.player, args.engine.display(), ctx.options.len());

    let pool = BatchedExecutionPool::new(args.threads, args.batch_size);
    let results = pool.execute(games, move |_| ReplayVerifier::new(Arc::clone(&ctx)))?;
    for result in results {
        match result {
            Ok(verdict) => {
                if let Some(line) = verdict.report() { println!("{}", line); }
            }
            Err(e) => error!("{}", e),
        }
    }
    Ok(())
}
