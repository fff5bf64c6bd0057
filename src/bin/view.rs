//! ChompChamps view - renders the live board and scoreboard.
//!
//! Spawned by the master with the board width and height as its two
//! arguments; paced entirely by the master/view handshake semaphores.

#![allow(clippy::print_stderr)]

use std::process::ExitCode;

use clap::Parser;

use chompchamps::view;

/// ChompChamps board viewer.
#[derive(Parser, Debug)]
#[command(name = "view")]
struct Args {
    /// Board width in cells
    width: u16,
    /// Board height in cells
    height: u16,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match view::run(args.width, args.height) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("view: {err}");
            ExitCode::FAILURE
        }
    }
}
