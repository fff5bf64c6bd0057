//! Board and scoreboard rendering.

use std::io::Write;

use crossterm::style::{Color, Stylize};
use crossterm::{cursor, execute, terminal};

use crate::game::{decide_winner, Outcome, PlayerRecord, Snapshot};

/// Per-player display colour, cycling through the terminal palette.
fn player_color(index: usize) -> Color {
    match index % 9 {
        0 => Color::Red,
        1 => Color::Blue,
        2 => Color::Green,
        3 => Color::Yellow,
        4 => Color::Magenta,
        5 => Color::Cyan,
        6 => Color::DarkRed,
        7 => Color::DarkBlue,
        _ => Color::DarkGreen,
    }
}

/// Redraw the whole screen from a snapshot.
pub fn draw(out: &mut impl Write, snap: &Snapshot) -> std::io::Result<()> {
    execute!(
        out,
        terminal::Clear(terminal::ClearType::All),
        cursor::MoveTo(0, 0)
    )?;
    writeln!(out, "Board:")?;
    draw_board(out, snap)?;
    writeln!(out)?;
    writeln!(out, "Players:")?;
    draw_scoreboard(out, snap)?;
    out.flush()
}

/// Final board, standings, and the winner line.
pub fn draw_final(out: &mut impl Write, snap: &Snapshot) -> std::io::Result<()> {
    writeln!(out)?;
    writeln!(out, "=== Game over ===")?;
    draw_board(out, snap)?;
    writeln!(out)?;
    draw_scoreboard(out, snap)?;
    match decide_winner(&snap.players) {
        Outcome::Winner(index) => {
            let winner = &snap.players[index];
            writeln!(
                out,
                "Winner: {} with {} points",
                winner.name_str(),
                winner.score
            )?;
        }
        Outcome::Tie => writeln!(out, "Tie")?,
    }
    out.flush()
}

fn draw_board(out: &mut impl Write, snap: &Snapshot) -> std::io::Result<()> {
    for y in 0..snap.height {
        for x in 0..snap.width {
            let cell = snap.cell(x, y);
            match cell.owner() {
                None => write!(out, "{:>2} ", cell.value())?,
                Some(owner) => {
                    let glyph = format!("P{}", owner + 1);
                    let head = snap
                        .players
                        .get(owner)
                        .is_some_and(|p| (p.x, p.y) == (x, y));
                    let styled = if head {
                        glyph.with(player_color(owner)).bold().reverse()
                    } else {
                        glyph.with(player_color(owner))
                    };
                    write!(out, "{styled} ")?;
                }
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

fn draw_scoreboard(out: &mut impl Write, snap: &Snapshot) -> std::io::Result<()> {
    let mut order: Vec<(usize, &PlayerRecord)> = snap.players.iter().enumerate().collect();
    order.sort_by_key(|(_, p)| (std::cmp::Reverse(p.score), p.valid_moves, p.invalid_moves));

    for (index, player) in order {
        let status = if player.blocked { "BLOCKED" } else { "ACTIVE" };
        let name = player.name_str().with(player_color(index)).bold();
        writeln!(
            out,
            "{name}: score={} valid={} invalid={} head=({}, {}) {status}",
            player.score, player.valid_moves, player.invalid_moves, player.x, player.y
        )?;
    }
    Ok(())
}
