//! ChompChamps Monte-Carlo player.
//!
//! Same choreography as the reference player with a flat Monte-Carlo policy;
//! the per-move budget comes from `PLAYER_TIME_MS` (milliseconds, default
//! 120).

#![allow(clippy::print_stderr)]

use std::process::ExitCode;

use clap::Parser;

use chompchamps::player::{MonteCarlo, PlayerRuntime};

/// Monte-Carlo ChompChamps player.
#[derive(Parser, Debug)]
#[command(name = "player-montecarlo")]
struct Args {
    /// Board width in cells
    width: u16,
    /// Board height in cells
    height: u16,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut runtime = match PlayerRuntime::connect(args.width, args.height) {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("player-montecarlo: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut policy = MonteCarlo::from_env();
    match runtime.run(&mut policy) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("player-montecarlo: {err}");
            ExitCode::FAILURE
        }
    }
}
