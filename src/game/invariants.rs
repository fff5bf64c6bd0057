//! Game invariants - sanity checks that detect bugs.
//!
//! With a correct master these never trigger: every mutation happens under
//! the single writer lock and follows the same bookkeeping. If one fires, it
//! indicates a bug in move application or in the snapshot path, not a
//! gameplay condition.

use crate::game::Snapshot;

/// Invariant violation error.
#[derive(Debug, Clone)]
pub struct InvariantViolation {
    /// Description of the violated invariant.
    pub message: String,
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invariant violation: {}", self.message)
    }
}

impl std::error::Error for InvariantViolation {}

/// Check all snapshot invariants.
///
/// Returns the violations found, empty if the snapshot is consistent:
/// - every claimed cell names a real player slot
/// - each player owns exactly `valid_moves + 1` cells (moves plus placement)
/// - each head sits on a cell the player owns, inside the board
/// - heads are pairwise distinct
/// - scores are bounded by the owned-cell count (each consumed reward is 1..=9)
#[must_use]
pub fn check_invariants(snap: &Snapshot) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let mut owned = vec![0u32; snap.players.len()];

    for (idx, cell) in snap.board.iter().enumerate() {
        if let Some(owner) = cell.owner() {
            if owner >= snap.players.len() {
                violations.push(InvariantViolation {
                    message: format!(
                        "cell {idx} claims owner {owner} but only {} players exist",
                        snap.players.len()
                    ),
                });
            } else {
                owned[owner] += 1;
            }
        }
    }

    for (i, player) in snap.players.iter().enumerate() {
        if !snap.in_bounds(player.x, player.y) {
            violations.push(InvariantViolation {
                message: format!(
                    "player {i} head ({}, {}) is off the {}x{} board",
                    player.x, player.y, snap.width, snap.height
                ),
            });
            continue;
        }

        let head = snap.cell(player.x, player.y);
        if head.owner() != Some(i) {
            violations.push(InvariantViolation {
                message: format!(
                    "player {i} head ({}, {}) holds {} instead of the player's claim",
                    player.x,
                    player.y,
                    head.value()
                ),
            });
        }

        if owned[i] != player.valid_moves + 1 {
            violations.push(InvariantViolation {
                message: format!(
                    "player {i} owns {} cells but has {} accepted moves (+1 placement)",
                    owned[i], player.valid_moves
                ),
            });
        }

        // Every consumed cell (placement included) was worth 1..=9.
        let cells = player.valid_moves + 1;
        if player.score < cells || player.score > cells * 9 {
            violations.push(InvariantViolation {
                message: format!(
                    "player {i} score {} is outside [{}, {}] for {cells} consumed cells",
                    player.score,
                    cells,
                    cells * 9
                ),
            });
        }
    }

    for i in 0..snap.players.len() {
        for j in (i + 1)..snap.players.len() {
            let a = &snap.players[i];
            let b = &snap.players[j];
            if (a.x, a.y) == (b.x, b.y) {
                violations.push(InvariantViolation {
                    message: format!("players {i} and {j} share head ({}, {})", a.x, a.y),
                });
            }
        }
    }

    violations
}

/// Panic on the first invariant violation. Debug/test helper.
pub fn assert_invariants(snap: &Snapshot) {
    let violations = check_invariants(snap);
    assert!(
        violations.is_empty(),
        "{}",
        violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    );
}
