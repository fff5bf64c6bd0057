//! The master runtime: region lifecycle, child processes, and the
//! event-driven scheduler.

use std::fmt;
use std::io::{self, Read};
use std::os::fd::AsRawFd;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rustix::fs::Mode;
use thiserror::Error;

use crate::game::{
    any_valid_move, decide_winner, new_game, state_region_size, step, Cell, Direction, Outcome,
};
use crate::ipc::{
    SemError, SharedRegion, ShmError, StateError, StateView, SyncBlock, STATE_REGION_NAME,
    SYNC_REGION_NAME,
};
use crate::master::MasterConfig;

/// How long the terminal view handshake may block before the master gives the
/// view up for dead.
const FINAL_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from hosting a game.
#[derive(Debug, Error)]
pub enum MasterError {
    /// Unusable configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Shared-region failure.
    #[error(transparent)]
    Shm(#[from] ShmError),

    /// Semaphore failure.
    #[error(transparent)]
    Sem(#[from] SemError),

    /// State-region layout failure.
    #[error(transparent)]
    State(#[from] StateError),

    /// A child executable could not be started.
    #[error("failed to spawn `{path}`: {source}")]
    Spawn {
        /// The executable path.
        path: String,
        /// The OS error.
        source: io::Error,
    },

    /// Pipe or poll failure.
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    /// SIGINT/SIGTERM received; resources were cleaned up.
    #[error("interrupted by signal")]
    Interrupted,
}

/// How a reaped child exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitSummary {
    /// Normal exit with this code.
    Code(i32),
    /// Killed by this signal.
    Signal(i32),
    /// Neither code nor signal could be determined.
    Unknown,
}

impl ExitSummary {
    fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            ExitSummary::Code(code)
        } else if let Some(signal) = status.signal() {
            ExitSummary::Signal(signal)
        } else {
            ExitSummary::Unknown
        }
    }
}

impl fmt::Display for ExitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitSummary::Code(code) => write!(f, "exit code {code}"),
            ExitSummary::Signal(signal) => write!(f, "signal {signal}"),
            ExitSummary::Unknown => write!(f, "unknown exit"),
        }
    }
}

/// Final standing of one player.
#[derive(Debug, Clone)]
pub struct PlayerReport {
    /// Display name.
    pub name: String,
    /// Final score.
    pub score: u32,
    /// Accepted moves.
    pub valid_moves: u32,
    /// Rejected moves.
    pub invalid_moves: u32,
    /// How the child exited.
    pub exit: ExitSummary,
}

/// Result of a hosted game.
#[derive(Debug, Clone)]
pub struct GameReport {
    /// One entry per player, in slot order.
    pub players: Vec<PlayerReport>,
    /// Winner or tie, per the lexicographic tiebreak.
    pub outcome: Outcome,
}

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn request_shutdown(_signal: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

fn install_shutdown_handler() {
    let handler = request_shutdown as extern "C" fn(libc::c_int) as libc::sighandler_t;
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }
}

/// Both shared regions plus in-place semaphore teardown on drop.
///
/// Dropping this destroys the sync semaphores first, then each region unmaps
/// and unlinks itself, so even an error path leaves a clean namespace.
struct MasterRegions {
    state: SharedRegion,
    sync: SharedRegion,
}

impl MasterRegions {
    fn create(config: &MasterConfig) -> Result<Self, MasterError> {
        let mode = Mode::RUSR | Mode::WUSR | Mode::RGRP | Mode::WGRP | Mode::ROTH | Mode::WOTH;
        let state = SharedRegion::create(
            STATE_REGION_NAME,
            state_region_size(config.width, config.height),
            mode,
            false,
            0,
        )?;
        let sync = SharedRegion::create(SYNC_REGION_NAME, SyncBlock::region_size(), mode, false, 0)?;
        unsafe {
            SyncBlock::init(SyncBlock::raw_from_region(&sync).as_ptr())?;
        }
        Ok(Self { state, sync })
    }
}

impl Drop for MasterRegions {
    fn drop(&mut self) {
        unsafe {
            SyncBlock::destroy(SyncBlock::raw_from_region(&self.sync).as_ptr());
        }
    }
}

/// One spawned player child and the read end of its move pipe.
struct PlayerPipe {
    child: Child,
    stdout: Option<ChildStdout>,
}

/// Host one complete game: create regions, spawn children, schedule moves,
/// report the result. All resources are released on every path.
pub fn run(config: MasterConfig) -> Result<GameReport, MasterError> {
    config.validate()?;
    install_shutdown_handler();

    let regions = MasterRegions::create(&config)?;
    let state = StateView::init(
        &regions.state,
        config.width,
        config.height,
        config.players.len() as u32,
    )?;
    let sync = SyncBlock::from_region(&regions.sync)?;

    populate_state(&config, &state);

    let mut scheduler = Scheduler {
        config: &config,
        state: &state,
        sync,
        pipes: Vec::new(),
        view: None,
        last_valid: Instant::now(),
    };

    let result = scheduler.drive();
    if result.is_err() {
        // Children must not stay parked on turn tokens after a failure.
        state.set_game_over();
        for index in 0..config.players.len() {
            let _ = sync.grant_turn(index);
        }
    }
    result
}

/// Seed the board and place the players.
///
/// Placement consumes the starting cell: the player is credited its reward
/// and the cell is claimed, so every owned cell (placement included) was
/// worth 1..=9 points.
fn populate_state(config: &MasterConfig, state: &StateView<'_>) {
    let initial = new_game(
        config.seed,
        config.width,
        config.height,
        config.players.len(),
    );
    state.write_board(&initial.board);
    for (index, record) in initial.players.iter().enumerate() {
        state.update_player(index, |player| *player = *record);
    }
}

struct Scheduler<'a> {
    config: &'a MasterConfig,
    state: &'a StateView<'a>,
    sync: &'a SyncBlock,
    pipes: Vec<PlayerPipe>,
    view: Option<Child>,
    last_valid: Instant,
}

impl Scheduler<'_> {
    fn drive(&mut self) -> Result<GameReport, MasterError> {
        self.spawn_view()?;
        self.spawn_players()?;

        // Every live player may compute and send exactly one move.
        for index in 0..self.pipes.len() {
            self.sync.grant_turn(index)?;
        }

        self.last_valid = Instant::now();
        self.event_loop()?;
        self.finish()
    }

    fn spawn_view(&mut self) -> Result<(), MasterError> {
        let Some(path) = &self.config.view else {
            return Ok(());
        };
        let child = spawn(path, self.config, Stdio::inherit())?;
        self.view = Some(child);
        // One initial handshake so the view renders the starting board.
        self.sync.signal_view()?;
        self.sync.await_view_done()?;
        Ok(())
    }

    fn spawn_players(&mut self) -> Result<(), MasterError> {
        for (index, path) in self.config.players.iter().enumerate() {
            let mut child = spawn(path, self.config, Stdio::piped())?;
            let stdout = child.stdout.take();
            debug_assert!(stdout.is_some());

            // Slot assignment is the master's: the pid lands in the record
            // before the child can usefully observe the slot.
            let pid = child.id() as i32;
            {
                let _guard = self.sync.write()?;
                self.state.update_player(index, |player| player.pid = pid);
            }
            self.pipes.push(PlayerPipe { child, stdout });
        }
        Ok(())
    }

    fn event_loop(&mut self) -> Result<(), MasterError> {
        let poll_timeout = self.config.delay.as_millis().min(i32::MAX as u128) as i32;

        loop {
            if SHUTDOWN.load(Ordering::SeqCst) {
                return Err(MasterError::Interrupted);
            }

            let mut poll_fds = Vec::with_capacity(self.pipes.len());
            let mut slots = Vec::with_capacity(self.pipes.len());
            for (index, pipe) in self.pipes.iter().enumerate() {
                if let Some(stdout) = &pipe.stdout {
                    poll_fds.push(libc::pollfd {
                        fd: stdout.as_raw_fd(),
                        events: libc::POLLIN,
                        revents: 0,
                    });
                    slots.push(index);
                }
            }

            if poll_fds.is_empty() {
                // All pipes closed; keep pacing so the termination checks run.
                thread::sleep(self.config.delay);
            } else {
                let ready = unsafe {
                    libc::poll(
                        poll_fds.as_mut_ptr(),
                        poll_fds.len() as libc::nfds_t,
                        poll_timeout,
                    )
                };
                if ready == -1 {
                    let err = io::Error::last_os_error();
                    if err.raw_os_error() != Some(libc::EINTR) {
                        return Err(MasterError::Io(err));
                    }
                } else if ready > 0 {
                    for (fd_slot, poll_fd) in poll_fds.iter().enumerate() {
                        let events = poll_fd.revents;
                        if events & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
                            self.service_player(slots[fd_slot])?;
                        }
                    }
                }
            }

            if self.should_end()? {
                return Ok(());
            }
        }
    }

    /// Read exactly one byte from a readable pipe and act on it.
    fn service_player(&mut self, index: usize) -> Result<(), MasterError> {
        let mut byte = [0u8; 1];
        let read = match self.pipes[index].stdout.as_mut() {
            Some(stdout) => stdout.read(&mut byte),
            None => return Ok(()),
        };

        match read {
            // EOF: the player gave up its remaining turns.
            Ok(0) => {
                {
                    let _guard = self.sync.write()?;
                    self.state.update_player(index, |player| player.blocked = true);
                }
                self.pipes[index].stdout = None;
                Ok(())
            }
            Ok(_) => {
                self.apply_byte(index, byte[0])?;
                self.view_handshake()?;
                thread::sleep(self.config.delay);
                // Only now may the player emit its next byte.
                self.sync.grant_turn(index)?;
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => Ok(()),
            Err(err) => Err(MasterError::Io(err)),
        }
    }

    /// Validate and apply one wire byte under the writer lock.
    fn apply_byte(&mut self, index: usize, byte: u8) -> Result<(), MasterError> {
        let _guard = self.sync.write()?;

        let accepted = match Direction::from_byte(byte) {
            None => false,
            Some(dir) => {
                let record = self.state.player(index);
                match step(record.x, record.y, dir, self.state.width(), self.state.height()) {
                    Some((tx, ty)) if self.state.cell(tx, ty).is_free() => {
                        let reward = self.state.cell(tx, ty).value();
                        self.state.set_cell(tx, ty, Cell::claimed_by(index));
                        self.state.update_player(index, |player| {
                            player.score += reward as u32;
                            player.valid_moves += 1;
                            player.x = tx;
                            player.y = ty;
                        });
                        true
                    }
                    _ => false,
                }
            }
        };

        if accepted {
            self.last_valid = Instant::now();
        } else {
            self.state
                .update_player(index, |player| player.invalid_moves += 1);
        }
        Ok(())
    }

    fn view_handshake(&mut self) -> Result<(), MasterError> {
        if self.view.is_some() {
            self.sync.signal_view()?;
            self.sync.await_view_done()?;
        }
        Ok(())
    }

    /// Termination conditions, checked in order; first match wins.
    fn should_end(&self) -> Result<bool, MasterError> {
        // The master is the sole writer, so it may read its own state
        // without entering the readers' protocol.
        let snap = self.state.snapshot();
        if !any_valid_move(&snap) {
            return Ok(true);
        }
        if self.last_valid.elapsed() >= self.config.timeout {
            return Ok(true);
        }
        if snap.players.iter().all(|player| player.blocked) {
            return Ok(true);
        }
        Ok(false)
    }

    fn finish(&mut self) -> Result<GameReport, MasterError> {
        {
            let _guard = self.sync.write()?;
            self.state.set_game_over();
        }

        // Wake anyone parked on a token so reaping cannot deadlock.
        for index in 0..self.pipes.len() {
            let _ = self.sync.grant_turn(index);
        }

        // One last handshake so the view can show the terminal state; bounded
        // in case the view died early.
        if self.view.is_some() {
            self.sync.signal_view()?;
            let _ = self.sync.await_view_done_timeout(FINAL_HANDSHAKE_TIMEOUT)?;
        }

        // Closing the read ends turns any in-flight emission into EPIPE.
        for pipe in &mut self.pipes {
            pipe.stdout = None;
        }

        let mut players = Vec::with_capacity(self.pipes.len());
        let mut records = Vec::with_capacity(self.pipes.len());
        for (index, pipe) in self.pipes.iter_mut().enumerate() {
            let status = pipe.child.wait()?;
            let record = self.state.player(index);
            records.push(record);
            players.push(PlayerReport {
                name: record.name_str().to_string(),
                score: record.score,
                valid_moves: record.valid_moves,
                invalid_moves: record.invalid_moves,
                exit: ExitSummary::from_status(status),
            });
        }

        if let Some(view) = &mut self.view {
            let _ = view.wait();
        }

        Ok(GameReport {
            outcome: decide_winner(&records),
            players,
        })
    }
}

fn spawn(path: &Path, config: &MasterConfig, stdout: Stdio) -> Result<Child, MasterError> {
    Command::new(path)
        .arg(config.width.to_string())
        .arg(config.height.to_string())
        .stdout(stdout)
        .spawn()
        .map_err(|source| MasterError::Spawn {
            path: path.display().to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_summary_formatting() {
        assert_eq!(ExitSummary::Code(0).to_string(), "exit code 0");
        assert_eq!(ExitSummary::Signal(9).to_string(), "signal 9");
    }
}
