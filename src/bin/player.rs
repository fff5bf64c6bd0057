//! ChompChamps reference player: greedy with liberties.
//!
//! Spawned by the master with the board width and height as its two
//! arguments. Protocol bytes go to stdout; diagnostics go to stderr.

#![allow(clippy::print_stderr)]

use std::process::ExitCode;

use clap::Parser;

use chompchamps::player::{Greedy, PlayerRuntime};

/// Greedy ChompChamps player.
#[derive(Parser, Debug)]
#[command(name = "player")]
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
            eprintln!("player: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.run(&mut Greedy) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("player: {err}");
            ExitCode::FAILURE
        }
    }
}
