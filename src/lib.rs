// Allow unwrap in tests (test code is not production)
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! ChompChamps: a multi-process arena game.
//!
//! A master process hosts a `W x H` reward board in POSIX shared memory; up
//! to nine player processes eat numbered cells and an optional view renders
//! the live state. Coordination runs entirely over two named shared regions:
//!
//! ```text
//! +--------------------------------------+
//! |      master (single writer)          |
//! |  event-driven pipe scheduler         |
//! +-------------------+------------------+
//!           | /game_state  /game_sync |
//! +---------v---------+  +-------------v--+
//! |  players (readers) |  | view (reader) |
//! |  one byte per turn |  | redraw loop   |
//! +--------------------+  +---------------+
//! ```
//!
//! - [`game`]: board rules, independent of any process concern
//! - [`ipc`]: shared regions, semaphores, the reader/writer protocol
//! - [`master`], [`player`], [`view`]: the three process roles

pub mod game;
pub mod ipc;
pub mod master;
pub mod player;
pub mod view;

pub use game::{Cell, Direction, Outcome, PlayerRecord, Snapshot, MAX_PLAYERS};
