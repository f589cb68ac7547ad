use anyhow::Context;
use clap::{ArgGroup, Parser};
use nodereplay::options::split_option_args;
use nodereplay::pgn::GameReader;
use nodereplay::script::{reproduce, SearchLimit};
use shakmaty::Color;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

/// Print the UCI commands that recreate an engine's searches from a recorded game.
#[derive(Parser, Debug)]
#[command(
    name = "reproduce",
    about = "Emit a UCI command script replaying one side of a PGN game",
    group(ArgGroup::new("side").required(true).args(["white", "black"])),
    group(ArgGroup::new("limit").required(true).args(["nodes", "depth"])),
)]
struct Args {
    /// PGN file; only its first game is used
    #[arg(long)]
    pgn: PathBuf,
    /// Generate commands using "go nodes"
    #[arg(long)]
    nodes: bool,
    /// Generate commands using "go depth"
    #[arg(long)]
    depth: bool,
    /// Generate commands for White
    #[arg(long)]
    white: bool,
    /// Generate commands for Black
    #[arg(long)]
    black: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let (argv, options) = split_option_args(std::env::args());
    let a = Args::parse_from(argv);
    let file = File::open(&a.pgn).with_context(|| format!("opening {}", a.pgn.display()))?;
    let game = GameReader::new(BufReader::new(file))
        .next()
        .context("empty PGN file")??;
    let side = if a.white { Color::White } else { Color::Black };
    let limit = if a.nodes { SearchLimit::Nodes } else { SearchLimit::Depth };
    for line in reproduce(&game, side, limit, &options) {
        println!("{}", line);
    }
    Ok(())
}
