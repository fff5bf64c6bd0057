//! End-to-end scenarios: the real master binary, real players, real shared
//! memory.
//!
//! The region names are fixed (`/game_state`, `/game_sync`), so every test
//! that spawns a master holds one lock. Expected scores are recomputed with
//! `game::new_game`, which is exactly what the master writes at setup.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::sync::Mutex;

use chompchamps::game::new_game;

static MASTER_LOCK: Mutex<()> = Mutex::new(());

fn master_exe() -> &'static str {
    env!("CARGO_BIN_EXE_master")
}

fn player_exe() -> &'static str {
    env!("CARGO_BIN_EXE_player")
}

fn montecarlo_exe() -> &'static str {
    env!("CARGO_BIN_EXE_player-montecarlo")
}

fn run_master(args: &[&str]) -> Output {
    let _guard = MASTER_LOCK.lock().unwrap();
    Command::new(master_exe())
        .args(args)
        .output()
        .expect("master spawns")
}

/// Drop a tiny scripted player into a per-test directory.
fn script_player(name: &str, body: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("chompchamps-e2e-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "master failed\nstdout: {}\nstderr: {}",
        stdout_of(output),
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn one_by_one_board_ends_on_first_check() {
    let output = run_master(&[
        "-w", "1", "-h", "1", "-s", "5", "-d", "10", "-t", "2", "-p", player_exe(),
    ]);
    assert_success(&output);
    let text = stdout_of(&output);

    // The only cell is claimed at placement; the score is its seeded reward
    // and no move is ever accepted.
    let expected = new_game(5, 1, 1, 1).players[0].score;
    assert!(text.contains("(0 valid"), "unexpected output: {text}");
    assert!(
        text.contains(&format!("Winner: Player1 with {expected} points")),
        "unexpected output: {text}"
    );
}

#[test]
fn greedy_player_consumes_a_two_by_two_board() {
    let output = run_master(&[
        "-w", "2", "-h", "2", "-s", "1", "-d", "10", "-t", "5", "-p", player_exe(),
    ]);
    assert_success(&output);
    let text = stdout_of(&output);

    // Three accepted moves consume the three non-initial cells; the final
    // score is the sum of all four seeded rewards.
    let initial = new_game(1, 2, 2, 1);
    let placement = initial.players[0].score;
    let free_total: u32 = initial
        .board
        .iter()
        .filter(|cell| cell.is_free())
        .map(|cell| cell.value() as u32)
        .sum();
    let expected = placement + free_total;
    assert!(text.contains("(3 valid"), "unexpected output: {text}");
    assert!(
        text.contains(&format!("Winner: Player1 with {expected} points")),
        "unexpected output: {text}"
    );
}

#[test]
fn always_up_from_the_corner_only_misses() {
    // Raw byte 0 is UP; from the (0, 0) placement every attempt leaves the
    // board, so the idle timeout ends the game.
    let script = script_player(
        "always-up.sh",
        "#!/bin/sh\nwhile printf '\\000'; do sleep 0.1; done\n",
    );
    let output = run_master(&[
        "-w", "3", "-h", "3", "-s", "1", "-d", "10", "-t", "1",
        "-p", script.to_str().unwrap(),
    ]);
    assert_success(&output);
    let text = stdout_of(&output);
    assert!(text.contains("(0 valid"), "unexpected output: {text}");
    assert!(!text.contains("(0 valid, 0 invalid)"), "no invalid move was counted: {text}");
}

#[test]
fn ascii_digit_is_an_invalid_move() {
    // '3' is byte 51, not direction 3. It must count as invalid and leave
    // the board unchanged; the EOF afterwards blocks the player.
    let script = script_player("ascii-three.sh", "#!/bin/sh\nprintf '3'\nsleep 1\n");
    let output = run_master(&[
        "-w", "3", "-h", "3", "-s", "7", "-d", "10", "-t", "10",
        "-p", script.to_str().unwrap(),
    ]);
    assert_success(&output);
    let text = stdout_of(&output);

    let expected = new_game(7, 3, 3, 1).players[0].score;
    assert!(text.contains("(0 valid"), "unexpected output: {text}");
    assert!(!text.contains("(0 valid, 0 invalid)"), "no invalid move was counted: {text}");
    assert!(
        text.contains(&format!("Winner: Player1 with {expected} points")),
        "unexpected output: {text}"
    );
}

#[test]
fn two_greedy_players_finish_and_are_ranked() {
    let output = run_master(&[
        "-w", "4", "-h", "4", "-s", "3", "-d", "10", "-t", "5",
        "-p", player_exe(), "-p", player_exe(),
    ]);
    assert_success(&output);
    let text = stdout_of(&output);
    assert!(text.contains("Player1:"), "unexpected output: {text}");
    assert!(text.contains("Player2:"), "unexpected output: {text}");
    assert!(
        text.contains("Winner:") || text.contains("Tie"),
        "unexpected output: {text}"
    );
}

#[test]
fn montecarlo_player_completes_a_game() {
    let _guard = MASTER_LOCK.lock().unwrap();
    let output = Command::new(master_exe())
        .args([
            "-w", "3", "-h", "3", "-s", "11", "-d", "10", "-t", "5",
            "-p", montecarlo_exe(),
        ])
        .env("PLAYER_TIME_MS", "20")
        .output()
        .expect("master spawns");
    assert_success(&output);
    let text = stdout_of(&output);
    assert!(text.contains("Winner: Player1"), "unexpected output: {text}");
}

#[test]
fn positional_player_arguments_are_accepted() {
    let output = run_master(&[
        "-w", "2", "-h", "2", "-s", "1", "-d", "10", "-t", "5", player_exe(),
    ]);
    assert_success(&output);
    assert!(stdout_of(&output).contains("Player1:"));
}

#[test]
fn ten_players_are_rejected_at_the_cli() {
    let players: Vec<&str> = std::iter::repeat(player_exe()).take(10).collect();
    let mut args = vec!["-w", "10", "-h", "10"];
    for player in &players {
        args.push("-p");
        args.push(player);
    }
    let output = run_master(&args);
    assert!(!output.status.success());
}

#[test]
fn missing_player_executable_fails_cleanly() {
    let output = run_master(&[
        "-w", "3", "-h", "3", "-p", "/nonexistent/chompchamps-player",
    ]);
    assert!(!output.status.success());

    // The cleanup path must have unlinked both regions: a fresh run on the
    // same names succeeds.
    let output = run_master(&[
        "-w", "2", "-h", "2", "-s", "1", "-d", "10", "-t", "5", "-p", player_exe(),
    ]);
    assert_success(&output);
}

#[test]
fn no_players_at_all_is_a_usage_error() {
    let output = run_master(&["-w", "3", "-h", "3"]);
    assert!(!output.status.success());
}
