//! ChompChamps master - hosts one game and reports the result.

// The master is a CLI binary; the summary goes to stdout.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{ArgAction, Parser};

use chompchamps::game::Outcome;
use chompchamps::master::{self, MasterConfig};

/// Host a ChompChamps game.
///
/// `-h` is the board height, so the automatic help flag is remapped to
/// `--help` only.
#[derive(Parser, Debug)]
#[command(name = "master", version, disable_help_flag = true)]
struct Args {
    /// Board width in cells
    #[arg(short = 'w', long = "width", default_value_t = 10)]
    width: u16,

    /// Board height in cells
    #[arg(short = 'h', long = "height", default_value_t = 10)]
    height: u16,

    /// Delay between applied moves, in milliseconds
    #[arg(short = 'd', long = "delay", default_value_t = 200)]
    delay_ms: u64,

    /// Idle timeout: end the game after this many seconds without an
    /// accepted move
    #[arg(short = 't', long = "timeout", default_value_t = 10)]
    timeout_sec: u64,

    /// Board seed (default: wall time)
    #[arg(short = 's', long = "seed")]
    seed: Option<u64>,

    /// View executable
    #[arg(short = 'v', long = "view")]
    view: Option<PathBuf>,

    /// Player executable (repeatable, 1..9 players)
    #[arg(short = 'p', long = "player", action = ArgAction::Append)]
    players: Vec<PathBuf>,

    /// Additional player executables
    #[arg(value_name = "PLAYER")]
    extra_players: Vec<PathBuf>,

    /// Print help
    #[arg(long, action = ArgAction::HelpLong)]
    help: Option<bool>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut players = args.players;
    players.extend(args.extra_players);

    let seed = args.seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs())
    });

    let config = MasterConfig {
        width: args.width,
        height: args.height,
        delay: Duration::from_millis(args.delay_ms),
        timeout: Duration::from_secs(args.timeout_sec),
        seed,
        view: args.view,
        players,
    };

    match master::run(config) {
        Ok(report) => {
            for player in &report.players {
                println!(
                    "{}: {}, score {} ({} valid, {} invalid)",
                    player.name, player.exit, player.score, player.valid_moves, player.invalid_moves
                );
            }
            match report.outcome {
                Outcome::Winner(index) => {
                    let winner = &report.players[index];
                    println!("Winner: {} with {} points", winner.name, winner.score);
                }
                Outcome::Tie => println!("Tie"),
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("master: {err}");
            ExitCode::FAILURE
        }
    }
}
